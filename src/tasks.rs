//! Request-scoped resources. Every file or directory a retrieval creates is
//! owned by exactly one guard and released when that guard goes away.

use crate::error::RetrievalError;
use rand::{distributions::Alphanumeric, Rng};
use std::{
    io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, error};

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// `<unix-millis>-<user-id>-<random>`. The random tail keeps two messages
/// from the same user in the same millisecond apart.
pub fn request_basename(user_id: u64) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{millis}-{user_id}-{}", random_suffix(6))
}

pub fn validate_basename(basename: &str) -> Result<(), RetrievalError> {
    let valid = !basename.is_empty()
        && !basename.starts_with('.')
        && basename
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RetrievalError::InvalidBasename(basename.to_string()))
    }
}

/// Deletes the file at `path` unless disarmed. Owners call
/// [`OutputGuard::remove`]; dropping the guard removes the file synchronously
/// and is only reached when the owner was cancelled or panicked.
#[derive(Debug)]
pub struct OutputGuard {
    path: Option<PathBuf>,
}

impl OutputGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Hands the file over to the caller; it will no longer be removed.
    pub fn disarm(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }

    /// Removes the file now and reports the outcome. A file that is already
    /// gone counts as removed.
    pub async fn remove(mut self) -> io::Result<()> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(event = "output_removed", path = %path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(event = "output_removed", path = %path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                error!(event = "output_remove_failed", path = %path.display(), error = %err)
            }
        }
    }
}

/// A uniquely named working directory. Owners call [`ScratchDir::remove`];
/// dropping it instead (a cancelled or panicking owner) removes it
/// synchronously as a last resort.
#[derive(Debug)]
pub struct ScratchDir {
    path: Option<PathBuf>,
}

impl ScratchDir {
    /// Creates `<parent>/<prefix>-<random>`. Creation is exclusive: an
    /// existing directory with the same name is an error, never reused.
    pub async fn create(parent: &Path, prefix: &str) -> io::Result<Self> {
        tokio::fs::create_dir_all(parent).await?;
        let path = parent.join(format!("{prefix}-{}", random_suffix(8)));
        tokio::fs::create_dir(&path).await?;
        debug!(event = "scratch_dir_created", path = %path.display());
        Ok(Self { path: Some(path) })
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Removes the directory and its contents off the async worker threads.
    pub async fn remove(mut self) -> io::Result<()> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                debug!(event = "scratch_dir_removed", path = %path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_dir_all(&path) {
            Ok(()) => debug!(event = "scratch_dir_removed", path = %path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                error!(event = "scratch_dir_remove_failed", path = %path.display(), error = %err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basenames_are_unique_and_valid() {
        let a = request_basename(42);
        let b = request_basename(42);
        assert_ne!(a, b);
        assert!(a.contains("-42-"));
        validate_basename(&a).unwrap();
    }

    #[test]
    fn rejects_unsafe_basenames() {
        for bad in ["", "../etc", "a/b", ".hidden", "name with space", "a\\b"] {
            assert!(
                matches!(validate_basename(bad), Err(RetrievalError::InvalidBasename(_))),
                "{bad:?}"
            );
        }
        validate_basename("1700000000-7_x.y").unwrap();
    }

    #[test]
    fn output_guard_removes_unless_disarmed() {
        let dir = tempfile::tempdir().unwrap();
        let dropped = dir.path().join("dropped.mp4");
        let kept = dir.path().join("kept.mp4");
        std::fs::write(&dropped, b"x").unwrap();
        std::fs::write(&kept, b"x").unwrap();

        drop(OutputGuard::new(dropped.clone()));
        let path = OutputGuard::new(kept.clone()).disarm();

        assert!(!dropped.exists());
        assert_eq!(path, kept);
        assert!(kept.exists());
    }

    #[tokio::test]
    async fn output_guard_remove_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let guard = OutputGuard::new(dir.path().join("never-created.png"));
        guard.remove().await.unwrap();
    }

    #[tokio::test]
    async fn scratch_dir_is_unique_and_removed_with_contents() {
        let parent = tempfile::tempdir().unwrap();
        let first = ScratchDir::create(parent.path(), "job").await.unwrap();
        let second = ScratchDir::create(parent.path(), "job").await.unwrap();
        assert_ne!(first.path(), second.path());

        std::fs::write(first.path().join("track.mp3"), b"data").unwrap();
        let first_path = first.path().to_path_buf();
        drop(first);
        drop(second);

        assert!(!first_path.exists());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn scratch_dir_remove_clears_contents_and_tolerates_missing() {
        let parent = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(parent.path(), "job").await.unwrap();
        std::fs::create_dir(scratch.path().join("nested")).unwrap();
        std::fs::write(scratch.path().join("nested/track.mp3"), b"data").unwrap();
        let path = scratch.path().to_path_buf();

        scratch.remove().await.unwrap();
        assert!(!path.exists());

        let gone = ScratchDir::create(parent.path(), "job").await.unwrap();
        std::fs::remove_dir(gone.path()).unwrap();
        gone.remove().await.unwrap();
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }
}
