//! Warren CLI - interactive client for the warren line protocol
//!
//! Connects to a warren server, forwards stdin lines as commands, and
//! prints responses. The protocol has no end-of-response marker for
//! multi-line output (`LIST`), so the client drains the socket until a
//! short receive pause. The prompt tracks the working directory from `CD`
//! responses: `dir_A> ` inside `dir_A`, a bare `> ` at the jail root.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::time::timeout;

use warren::limits::CLIENT_RECV_TIMEOUT;

/// Warren client - browse a jailed directory tree served over TCP
#[derive(Parser, Debug)]
#[command(name = "warren")]
#[command(about = "Interactive client for the warren line protocol")]
struct Args {
    /// Server address to connect to
    #[arg(default_value = "127.0.0.1:4040")]
    addr: SocketAddr,
}

/// Everything the server sent before pausing, or `None` once it closed the
/// connection.
async fn drain_responses(reader: &mut OwnedReadHalf) -> anyhow::Result<Option<String>> {
    let mut collected = String::new();
    let mut buf = [0u8; 4096];
    loop {
        match timeout(CLIENT_RECV_TIMEOUT, reader.read(&mut buf)).await {
            // Pause: the response is complete as far as we can tell.
            Err(_) => return Ok(Some(collected)),
            Ok(Ok(0)) => {
                if collected.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(collected));
            }
            Ok(Ok(read)) => collected.push_str(&String::from_utf8_lossy(&buf[..read])),
            Ok(Err(err)) => return Err(err).context("reading from server"),
        }
    }
}

fn print_chunk(chunk: &str) {
    print!("{chunk}");
    if !chunk.is_empty() && !chunk.ends_with('\n') {
        println!();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let stream = TcpStream::connect(args.addr)
        .await
        .with_context(|| format!("failed to connect to {}", args.addr))?;
    let (mut reader, mut writer) = stream.into_split();

    // The welcome message is not newline-terminated; wait for the first
    // bytes, then drain the rest like any other response.
    let mut buf = [0u8; 4096];
    let read = reader.read(&mut buf).await.context("reading welcome")?;
    if read == 0 {
        anyhow::bail!("server closed the connection before greeting");
    }
    let mut welcome = String::from_utf8_lossy(&buf[..read]).into_owned();
    if let Some(rest) = drain_responses(&mut reader).await? {
        welcome.push_str(&rest);
    }
    print_chunk(&welcome);

    let mut prompt = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        {
            use std::io::Write;
            print!("{prompt}> ");
            std::io::stdout().flush().ok();
        }
        let Some(line) = stdin.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        writer.write_all(line.as_bytes()).await.context("sending command")?;
        writer.write_all(b"\n").await.context("sending command")?;

        let Some(response) = drain_responses(&mut reader).await? else {
            println!("Connection closed by server.");
            return Ok(());
        };
        print_chunk(&response);

        if line == "QUIT" {
            return Ok(());
        }
        // A successful CD answers with the new display path on one line;
        // adopt it as the prompt. Errors keep the old prompt.
        if line.starts_with("CD ") {
            let answer = response.trim_end_matches('\n');
            if !answer.contains('\n') && !answer.starts_with("ERROR: ") {
                prompt = answer.to_string();
            }
        }
    }
    Ok(())
}
