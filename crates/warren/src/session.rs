//! Per-connection session: greeting, dispatch loop, and script replay.
//!
//! A session owns its transport, an immutable handle to the [`Jail`], and
//! two pieces of mutable state: the working directory (only a fully
//! successful `CD` moves it) and the script replay depth. The state machine
//! is Greeting → Ready → Closing; script replay is not a separate state but
//! a re-entrant call into the same dispatch function, which is why the depth
//! bound is essential.
//!
//! Every protocol-level failure is reported as an `ERROR:` line and the
//! session continues; only transport I/O failures end it.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadHalf, WriteHalf,
};
use tokio::sync::watch;
use tracing::debug;

use crate::command::Command;
use crate::jail::Jail;
use crate::limits::{self, MAX_LINE_BYTES, MAX_SCRIPT_DEPTH};
use crate::list::Lister;

/// Whether the session continues after a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep receiving commands.
    Continue,
    /// The command asked the session to end (QUIT).
    Terminate,
}

/// Why a session ended cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent QUIT.
    Quit,
    /// The client closed the connection.
    Eof,
    /// A server-wide shutdown was requested.
    Shutdown,
}

/// Per-connection protocol state and dispatch loop.
pub struct Session<T> {
    reader: BufReader<ReadHalf<T>>,
    writer: WriteHalf<T>,
    jail: Arc<Jail>,
    cwd: PathBuf,
    script_depth: u32,
    welcome: String,
    shutdown: watch::Receiver<bool>,
    peer: String,
}

impl<T> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("cwd", &self.cwd)
            .field("script_depth", &self.script_depth)
            .finish_non_exhaustive()
    }
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    /// Create a session over `transport`, starting at the jail root.
    ///
    /// `shutdown` is observed between commands only; a session never aborts
    /// mid-command.
    pub fn new(
        transport: T,
        jail: Arc<Jail>,
        welcome: String,
        shutdown: watch::Receiver<bool>,
        peer: String,
    ) -> Self {
        let cwd = jail.root().to_path_buf();
        let (read_half, write_half) = tokio::io::split(transport);
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            jail,
            cwd,
            script_depth: 0,
            welcome,
            shutdown,
            peer,
        }
    }

    /// The session's current working directory (canonical, always in-jail).
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Drive the session to completion: send the greeting, then receive and
    /// dispatch lines until QUIT, EOF, shutdown, or a transport failure.
    pub async fn run(mut self) -> io::Result<CloseReason> {
        // Greeting. The welcome string is a complete message on its own and
        // carries no trailing newline.
        write_raw(&mut self.writer, &self.welcome).await?;
        loop {
            let line = tokio::select! {
                received = recv_line(&mut self.reader) => match received? {
                    Some(line) => line,
                    None => return Ok(CloseReason::Eof),
                },
                _ = self.shutdown.changed() => return Ok(CloseReason::Shutdown),
            };
            debug!(peer = %self.peer, %line, "received");
            if self.dispatch(&line).await? == Flow::Terminate {
                return Ok(CloseReason::Quit);
            }
        }
    }

    /// Dispatch one line and send its response(s).
    ///
    /// Never fails on malformed input; the only error that propagates is a
    /// transport write failure, which is session-fatal. The future is boxed
    /// because script replay re-enters dispatch for every scripted line, so
    /// the recursion needs a concrete (type-erased) return type.
    pub fn dispatch<'a>(
        &'a mut self,
        line: &'a str,
    ) -> Pin<Box<dyn Future<Output = io::Result<Flow>> + Send + 'a>> {
        Box::pin(async move {
            match Command::parse(line) {
                Command::Echo(text) => write_line(&mut self.writer, &text).await?,
                Command::Quit => {
                    write_line(&mut self.writer, "BYE").await?;
                    return Ok(Flow::Terminate);
                }
                Command::Info => write_raw(&mut self.writer, &self.welcome).await?,
                Command::Cd(arg) => self.handle_cd(&arg).await?,
                Command::List => self.handle_list().await?,
                Command::Script(name) => return self.run_script(&name).await,
                Command::Unknown(name) => {
                    write_line(&mut self.writer, &format!("ERROR: Unknown command: {name}"))
                        .await?;
                }
                Command::Empty => {}
            }
            Ok(Flow::Continue)
        })
    }

    /// `CD`: resolve, jail-check, and commit the new working directory.
    ///
    /// A failed CD always reports a typed `ERROR:` line and leaves the
    /// working directory untouched; there is no silent variant.
    async fn handle_cd(&mut self, arg: &str) -> io::Result<()> {
        if arg.is_empty() {
            return write_line(&mut self.writer, "ERROR: CD: Missing directory argument").await;
        }
        match self.jail.resolve_dir(arg, &self.cwd).await {
            Ok(dir) => {
                let display = self.jail.display(&dir);
                self.cwd = dir;
                write_line(&mut self.writer, &display).await
            }
            Err(err) => write_line(&mut self.writer, &format!("ERROR: CD: {err}")).await,
        }
    }

    /// `LIST`: stream one line per entry of the working directory.
    async fn handle_list(&mut self) -> io::Result<()> {
        let mut lister = match Lister::open(&self.jail, &self.cwd).await {
            Ok(lister) => lister,
            Err(err) => {
                let shown = self.jail.project(&self.cwd);
                return write_line(
                    &mut self.writer,
                    &format!("ERROR: LIST: Cannot open directory {shown}: {err}"),
                )
                .await;
            }
        };
        while let Some(line) = lister.next_line().await {
            write_line(&mut self.writer, &line).await?;
        }
        Ok(())
    }

    /// `@file`: replay commands from an in-jail regular file.
    ///
    /// The depth increment is paired with a decrement on every exit of the
    /// replay body, including transport failures mid-script, so the depth
    /// always returns to its pre-invocation value.
    async fn run_script(&mut self, name: &str) -> io::Result<Flow> {
        if self.script_depth >= MAX_SCRIPT_DEPTH {
            write_line(
                &mut self.writer,
                &format!("ERROR: Script recursion limit ({MAX_SCRIPT_DEPTH}) exceeded"),
            )
            .await?;
            return Ok(Flow::Continue);
        }
        if name.is_empty() {
            write_line(&mut self.writer, "ERROR: Script: Missing filename").await?;
            return Ok(Flow::Continue);
        }
        let path = match self.jail.resolve_file(name, &self.cwd).await {
            Ok(path) => path,
            Err(err) => {
                write_line(&mut self.writer, &format!("ERROR: Script: {err}")).await?;
                return Ok(Flow::Continue);
            }
        };
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(err) => {
                write_line(&mut self.writer, &format!("ERROR: Script: {err}")).await?;
                return Ok(Flow::Continue);
            }
        };
        self.script_depth += 1;
        let result = self.replay(file).await;
        self.script_depth -= 1;
        result
    }

    /// Feed each script line back through [`Session::dispatch`].
    ///
    /// Blank lines are skipped; every other line is echoed to the client
    /// with a `script> ` prefix before it runs. A QUIT inside the script
    /// aborts both the script and the session.
    async fn replay(&mut self, file: File) -> io::Result<Flow> {
        let mut lines = BufReader::new(file).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(Flow::Continue),
                Err(err) => {
                    // Script read failure is recoverable; the session goes on.
                    write_line(&mut self.writer, &format!("ERROR: Script: read failed: {err}"))
                        .await?;
                    return Ok(Flow::Continue);
                }
            };
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let echo = format!(
                "script> {}",
                limits::truncate(line, MAX_LINE_BYTES - "script> ".len() - 1)
            );
            write_line(&mut self.writer, &echo).await?;
            if self.dispatch(line).await? == Flow::Terminate {
                return Ok(Flow::Terminate);
            }
        }
    }
}

/// Receive one line, stripped of trailing CR/LF and bounded by the protocol
/// line ceiling. `None` on clean EOF. Bytes beyond the ceiling are left in
/// the buffer and surface as the next line, as a fixed-size receive buffer
/// would.
async fn recv_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Send + Unpin,
{
    let mut raw = Vec::new();
    let read = reader
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', &mut raw)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    let mut text = String::from_utf8_lossy(&raw).into_owned();
    while text.ends_with('\n') || text.ends_with('\r') {
        text.pop();
    }
    Ok(Some(text))
}

/// Send one `\n`-terminated response line, bounded by the line ceiling.
async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = limits::truncate(line, MAX_LINE_BYTES - 1);
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Send text verbatim, without newline termination (the welcome string).
async fn write_raw<W>(writer: &mut W, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await
}
