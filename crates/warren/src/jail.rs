//! The jail: canonicalizing path resolution with explicit containment.
//!
//! Client paths are resolved in two steps. First the candidate is joined
//! onto the jail root (for `/`-prefixed arguments) or the session's working
//! directory, and canonicalized with the platform primitive, which resolves
//! `.`, `..`, and every symlink. Then containment is checked textually
//! against the canonical root. The textual check is sound only because
//! canonicalization has already eliminated symlinks; the path library alone
//! only normalizes and must not be trusted to enforce the jail.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failure to resolve a client-supplied path inside the jail.
///
/// All of these are locally recoverable: the session reports an `ERROR:`
/// line and continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A path segment does not exist, or canonicalization failed.
    #[error("No such file or directory")]
    NotFound,
    /// The canonical path falls outside the served subtree.
    #[error("Path is outside the served directory")]
    OutsideJail,
    /// The path exists but is not a directory (`CD` target).
    #[error("Not a directory")]
    NotADirectory,
    /// The path exists but is not a regular file (script target).
    #[error("Not a regular file")]
    NotAFile,
}

/// The served directory subtree. Immutable for the life of the server.
#[derive(Debug, Clone)]
pub struct Jail {
    root: PathBuf,
}

impl Jail {
    /// Canonicalize `root` and verify it is a directory.
    pub async fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = tokio::fs::canonicalize(root.as_ref()).await?;
        let meta = tokio::fs::metadata(&root).await?;
        if !meta.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    /// The canonical jail root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a client path argument onto the jail, before canonicalization.
    ///
    /// A leading `/` addresses the jail root, not the real filesystem root:
    /// `/` maps to the root itself and `/x` to `root/x`. The whole run of
    /// leading slashes is consumed — a remainder starting with `/` would
    /// make `join` replace the root rather than append to it.
    fn candidate(&self, arg: &str, cwd: &Path) -> PathBuf {
        if let Some(rest) = arg.strip_prefix('/') {
            let rest = rest.trim_start_matches('/');
            if rest.is_empty() {
                self.root.clone()
            } else {
                self.root.join(rest)
            }
        } else {
            cwd.join(arg)
        }
    }

    /// Resolve a client path to a canonical in-jail path.
    ///
    /// Canonicalization failure of any kind reports [`ResolveError::NotFound`];
    /// a canonical result outside the jail reports [`ResolveError::OutsideJail`].
    pub async fn resolve(&self, arg: &str, cwd: &Path) -> Result<PathBuf, ResolveError> {
        let candidate = self.candidate(arg, cwd);
        let resolved = tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|_| ResolveError::NotFound)?;
        if self.contains(&resolved) {
            Ok(resolved)
        } else {
            Err(ResolveError::OutsideJail)
        }
    }

    /// [`Jail::resolve`], additionally requiring an existing directory.
    pub async fn resolve_dir(&self, arg: &str, cwd: &Path) -> Result<PathBuf, ResolveError> {
        let resolved = self.resolve(arg, cwd).await?;
        let meta = tokio::fs::metadata(&resolved)
            .await
            .map_err(|_| ResolveError::NotFound)?;
        if meta.is_dir() {
            Ok(resolved)
        } else {
            Err(ResolveError::NotADirectory)
        }
    }

    /// [`Jail::resolve`], additionally requiring an existing regular file.
    pub async fn resolve_file(&self, arg: &str, cwd: &Path) -> Result<PathBuf, ResolveError> {
        let resolved = self.resolve(arg, cwd).await?;
        let meta = tokio::fs::metadata(&resolved)
            .await
            .map_err(|_| ResolveError::NotFound)?;
        if meta.is_file() {
            Ok(resolved)
        } else {
            Err(ResolveError::NotAFile)
        }
    }

    /// Textual containment check on an already-canonical path.
    ///
    /// True when `canonical` equals the root or has `root + "/"` as a
    /// literal prefix.
    pub fn contains(&self, canonical: &Path) -> bool {
        let root = self.root.as_os_str().as_encoded_bytes();
        let path = canonical.as_os_str().as_encoded_bytes();
        if !path.starts_with(root) {
            return false;
        }
        // The prefix must end on a path boundary: /srv/jail must not
        // contain /srv/jailbreak.
        path.len() == root.len() || root == b"/" || path[root.len()] == b'/'
    }

    /// Project an in-jail canonical path to the client-facing form rooted at
    /// `/`. The jail root projects to `/` itself.
    ///
    /// Never fails for paths produced by [`Jail::resolve`].
    pub fn project(&self, canonical: &Path) -> String {
        let rest = canonical.strip_prefix(&self.root).unwrap_or(canonical);
        if rest.as_os_str().is_empty() {
            "/".to_string()
        } else if rest.is_absolute() {
            rest.to_string_lossy().into_owned()
        } else {
            format!("/{}", rest.to_string_lossy())
        }
    }

    /// Prompt form of [`Jail::project`]: the leading `/` is stripped, so the
    /// jail root displays as the empty string.
    pub fn display(&self, canonical: &Path) -> String {
        let projected = self.project(canonical);
        match projected.strip_prefix('/') {
            Some(rest) => rest.to_string(),
            None => projected,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    async fn jail_fixture() -> (tempfile::TempDir, Jail) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("dir_A")).unwrap();
        std::fs::write(tmp.path().join("dir_A/file_A.txt"), "a").unwrap();
        std::fs::write(tmp.path().join("root_file.txt"), "r").unwrap();
        let jail = Jail::new(tmp.path()).await.unwrap();
        (tmp, jail)
    }

    #[tokio::test]
    async fn slash_addresses_the_jail_root() {
        let (_tmp, jail) = jail_fixture().await;
        let cwd = jail.root().join("dir_A");
        let resolved = jail.resolve("/", &cwd).await.unwrap();
        assert_eq!(resolved, jail.root());
        let resolved = jail.resolve("/dir_A", jail.root()).await.unwrap();
        assert_eq!(resolved, jail.root().join("dir_A"));
    }

    #[tokio::test]
    async fn doubled_slashes_still_map_onto_the_root() {
        let (_tmp, jail) = jail_fixture().await;
        let root = jail.root().to_path_buf();
        assert_eq!(jail.resolve("//dir_A", &root).await.unwrap(), root.join("dir_A"));
        assert_eq!(jail.resolve("///dir_A", &root).await.unwrap(), root.join("dir_A"));
        assert_eq!(jail.resolve("//", &root).await.unwrap(), root);
        assert_eq!(
            jail.resolve("//..", &root).await,
            Err(ResolveError::OutsideJail)
        );
    }

    #[tokio::test]
    async fn relative_paths_resolve_against_cwd() {
        let (_tmp, jail) = jail_fixture().await;
        let root = jail.root().to_path_buf();
        let resolved = jail.resolve("dir_A", &root).await.unwrap();
        assert_eq!(resolved, root.join("dir_A"));
        let back = jail.resolve("..", &resolved).await.unwrap();
        assert_eq!(back, root);
    }

    #[tokio::test]
    async fn dotdot_past_the_root_is_outside() {
        let (_tmp, jail) = jail_fixture().await;
        let root = jail.root().to_path_buf();
        assert_eq!(jail.resolve("..", &root).await, Err(ResolveError::OutsideJail));
        assert_eq!(
            jail.resolve("../../../../etc", &root).await,
            Err(ResolveError::OutsideJail)
        );
        assert_eq!(jail.resolve("/..", &root).await, Err(ResolveError::OutsideJail));
        assert_eq!(
            jail.resolve("/../..", &root).await,
            Err(ResolveError::OutsideJail)
        );
    }

    #[tokio::test]
    async fn missing_segments_are_not_found() {
        let (_tmp, jail) = jail_fixture().await;
        let root = jail.root().to_path_buf();
        assert_eq!(
            jail.resolve("no_such_dir", &root).await,
            Err(ResolveError::NotFound)
        );
        assert_eq!(
            jail.resolve("no_such_dir/deeper", &root).await,
            Err(ResolveError::NotFound)
        );
    }

    #[tokio::test]
    async fn resolve_dir_rejects_files() {
        let (_tmp, jail) = jail_fixture().await;
        let root = jail.root().to_path_buf();
        assert_eq!(
            jail.resolve_dir("root_file.txt", &root).await,
            Err(ResolveError::NotADirectory)
        );
        assert!(jail.resolve_dir("dir_A", &root).await.is_ok());
    }

    #[tokio::test]
    async fn resolve_file_rejects_directories() {
        let (_tmp, jail) = jail_fixture().await;
        let root = jail.root().to_path_buf();
        assert_eq!(
            jail.resolve_file("dir_A", &root).await,
            Err(ResolveError::NotAFile)
        );
        assert!(jail.resolve_file("root_file.txt", &root).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escape_is_outside_jail() {
        let outside = tempfile::tempdir().unwrap();
        let (tmp, jail) = jail_fixture().await;
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("escape")).unwrap();
        let root = jail.root().to_path_buf();
        assert_eq!(
            jail.resolve("escape", &root).await,
            Err(ResolveError::OutsideJail)
        );
    }

    #[tokio::test]
    async fn containment_requires_a_path_boundary() {
        let (tmp, jail) = jail_fixture().await;
        let sibling = PathBuf::from(format!("{}break", tmp.path().display()));
        assert!(!jail.contains(&sibling));
        assert!(jail.contains(jail.root()));
        assert!(jail.contains(&jail.root().join("dir_A")));
    }

    #[tokio::test]
    async fn projection_and_display() {
        let (_tmp, jail) = jail_fixture().await;
        let dir = jail.root().join("dir_A");
        assert_eq!(jail.project(jail.root()), "/");
        assert_eq!(jail.project(&dir), "/dir_A");
        assert_eq!(jail.display(jail.root()), "");
        assert_eq!(jail.display(&dir), "dir_A");
        assert_eq!(jail.display(&dir.join("file_A.txt")), "dir_A/file_A.txt");
    }
}
