//! Directory listing with symlink-chain resolution.
//!
//! `LIST` output is streamed: one formatted line per entry, in whatever
//! order the platform enumerates the directory. The order is deliberately
//! never re-sorted so behavior stays reproducible against a fixture.
//!
//! Symlinks are the interesting case. The immediate target is read with
//! `readlink` and resolved against the link's containing directory; whether
//! that immediate target is itself a symlink decides the marker (`-->>` for
//! a chain, `-->` for a direct link). The ultimate target is canonicalized
//! and jail-checked before being projected; anything unresolvable or outside
//! the jail renders the raw target text with an `[unresolved/external]`
//! marker, so out-of-jail structure never leaks.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::ReadDir;

use crate::jail::Jail;
use crate::limits::{self, MAX_NAME_BYTES};

/// Classification of a directory entry in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file, or anything that is neither a directory nor a symlink.
    File,
    /// Directory, rendered with a trailing `/`.
    Directory,
    /// Symbolic link, rendered with a resolution marker.
    Symlink,
}

/// Lazily yields one formatted listing line per directory entry.
///
/// The directory handle is held only as long as the `Lister` lives and is
/// released on every exit path when it drops.
#[derive(Debug)]
pub struct Lister<'a> {
    jail: &'a Jail,
    entries: ReadDir,
    failed: bool,
}

impl<'a> Lister<'a> {
    /// Open `dir` for enumeration.
    ///
    /// The caller reports an open failure as a single `ERROR:` line; it is
    /// never connection-fatal.
    pub async fn open(jail: &'a Jail, dir: &Path) -> io::Result<Lister<'a>> {
        let entries = tokio::fs::read_dir(dir).await?;
        Ok(Self {
            jail,
            entries,
            failed: false,
        })
    }

    /// The next formatted line, or `None` at end of directory.
    ///
    /// A read error mid-enumeration yields one final `ERROR:` line and then
    /// `None`; entries whose metadata cannot be read are skipped.
    pub async fn next_line(&mut self) -> Option<String> {
        if self.failed {
            return None;
        }
        loop {
            let entry = match self.entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => return None,
                Err(err) => {
                    self.failed = true;
                    return Some(format!(
                        "ERROR: LIST: Error reading directory contents: {err}"
                    ));
                }
            };
            let name_os = entry.file_name();
            let name_text = name_os.to_string_lossy();
            let name = limits::truncate(&name_text, MAX_NAME_BYTES);
            // file_type never follows symlinks, matching lstat.
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(_) => continue,
            };
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_symlink() {
                EntryKind::Symlink
            } else {
                EntryKind::File
            };
            return Some(match kind {
                EntryKind::Directory => format!("{name}/"),
                EntryKind::Symlink => self.symlink_line(name, &entry.path()).await,
                EntryKind::File => name.to_string(),
            });
        }
    }

    /// Render one symlink entry, resolving the chain through the jail.
    async fn symlink_line(&self, name: &str, link_path: &Path) -> String {
        let target = match tokio::fs::read_link(link_path).await {
            Ok(target) => target,
            Err(_) => return format!("{name} -> [broken link]"),
        };
        let immediate = immediate_target(link_path, &target);
        // One hop is all that matters for the marker: a link to a link
        // renders the same however deep the rest of the chain goes.
        let via_intermediate = matches!(
            tokio::fs::symlink_metadata(&immediate).await,
            Ok(meta) if meta.file_type().is_symlink()
        );
        match tokio::fs::canonicalize(&immediate).await {
            Ok(resolved) if self.jail.contains(&resolved) => {
                let display = self.jail.project(&resolved);
                if via_intermediate {
                    format!("{name} -->> {display}")
                } else {
                    format!("{name} --> {display}")
                }
            }
            _ => {
                let target_text = target.to_string_lossy();
                let target_text = limits::truncate(&target_text, MAX_NAME_BYTES);
                format!("{name} -> {target_text} [unresolved/external]")
            }
        }
    }
}

/// Absolute path of a link's immediate target. Relative targets resolve
/// against the directory containing the link, not the session cwd.
fn immediate_target(link_path: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        return target.to_path_buf();
    }
    match link_path.parent() {
        Some(parent) => parent.join(target),
        None => target.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    async fn collect(jail: &Jail, dir: &Path) -> Vec<String> {
        let mut lister = Lister::open(jail, dir).await.unwrap();
        let mut lines = Vec::new();
        while let Some(line) = lister.next_line().await {
            lines.push(line);
        }
        // Enumeration order is platform-defined; sort for assertion only.
        lines.sort();
        lines
    }

    #[tokio::test]
    async fn files_and_directories_are_marked() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("dir_A")).unwrap();
        std::fs::write(tmp.path().join("root_file.txt"), "r").unwrap();
        let jail = Jail::new(tmp.path()).await.unwrap();
        let lines = collect(&jail, jail.root()).await;
        assert_eq!(lines, vec!["dir_A/".to_string(), "root_file.txt".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn direct_symlink_gets_single_marker() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("dir_A")).unwrap();
        std::os::unix::fs::symlink("dir_A", tmp.path().join("link_to_dir_A")).unwrap();
        let jail = Jail::new(tmp.path()).await.unwrap();
        let lines = collect(&jail, jail.root()).await;
        assert!(lines.contains(&"link_to_dir_A --> /dir_A".to_string()), "{lines:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn chained_symlink_gets_transitive_marker() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("file"), "x").unwrap();
        std::os::unix::fs::symlink("file", tmp.path().join("b")).unwrap();
        std::os::unix::fs::symlink("b", tmp.path().join("a")).unwrap();
        let jail = Jail::new(tmp.path()).await.unwrap();
        let lines = collect(&jail, jail.root()).await;
        assert!(lines.contains(&"a -->> /file".to_string()), "{lines:?}");
        assert!(lines.contains(&"b --> /file".to_string()), "{lines:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn external_symlink_never_leaks_its_resolution() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), "s").unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let secret = outside.path().join("secret");
        std::os::unix::fs::symlink(&secret, tmp.path().join("out")).unwrap();
        let jail = Jail::new(tmp.path()).await.unwrap();
        let lines = collect(&jail, jail.root()).await;
        assert_eq!(
            lines,
            vec![format!("out -> {} [unresolved/external]", secret.display())]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dangling_symlink_is_unresolved() {
        let tmp = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("nowhere", tmp.path().join("dangling")).unwrap();
        let jail = Jail::new(tmp.path()).await.unwrap();
        let lines = collect(&jail, jail.root()).await;
        assert_eq!(lines, vec!["dangling -> nowhere [unresolved/external]".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn relative_target_resolves_against_link_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("dir_A")).unwrap();
        std::fs::write(tmp.path().join("dir_A/file_A.txt"), "a").unwrap();
        // Link in dir_A with a target relative to dir_A, listed from dir_A.
        std::os::unix::fs::symlink("file_A.txt", tmp.path().join("dir_A/link")).unwrap();
        let jail = Jail::new(tmp.path()).await.unwrap();
        let lines = collect(&jail, &jail.root().join("dir_A")).await;
        assert!(
            lines.contains(&"link --> /dir_A/file_A.txt".to_string()),
            "{lines:?}"
        );
    }

    #[tokio::test]
    async fn open_failure_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let jail = Jail::new(tmp.path()).await.unwrap();
        let missing = jail.root().join("gone");
        assert!(Lister::open(&jail, &missing).await.is_err());
    }
}
