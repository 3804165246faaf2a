use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::traits::LedgerBackend;

/// Stores the ledger in a file on disk.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so the file always holds either the old or the new content.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileBackend { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl LedgerBackend for FileBackend {
    fn read(&self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&mut self, contents: &[u8]) -> io::Result<()> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;

        debug!(path = %self.path.display(), bytes = contents.len(), "ledger file replaced");
        Ok(())
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }
}

/// Keeps the ledger in memory; used for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    contents: Option<Vec<u8>>,
    writes: usize,
    fail_writes: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with the given file content already present.
    pub fn with_contents(contents: impl Into<Vec<u8>>) -> Self {
        MemoryBackend {
            contents: Some(contents.into()),
            ..Self::default()
        }
    }

    pub fn contents(&self) -> Option<&[u8]> {
        self.contents.as_deref()
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Makes every following write fail without touching the stored content.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl LedgerBackend for MemoryBackend {
    fn read(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.contents.clone())
    }

    fn write(&mut self, contents: &[u8]) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::other("injected write failure"));
        }
        self.contents = Some(contents.to_vec());
        self.writes += 1;
        Ok(())
    }

    fn location(&self) -> PathBuf {
        PathBuf::from(":memory:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_file_backend_missing_file_reads_none() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = FileBackend::new(dir.path().join("expenses.csv"));
        assert!(backend.read()?.is_none());
        Ok(())
    }

    #[test]
    fn test_file_backend_write_replaces_content() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("expenses.csv");
        let mut backend = FileBackend::new(&path);

        backend.write(b"first")?;
        backend.write(b"second")?;

        assert_eq!(fs::read(&path)?, b"second");
        assert_eq!(backend.read()?.as_deref(), Some(&b"second"[..]));
        assert_eq!(fs::read_dir(path.parent().unwrap())?.count(), 1);
        Ok(())
    }

    #[test]
    fn test_file_backend_surfaces_unreadable_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        // A directory at the ledger path exists but cannot be read as a file.
        let backend = FileBackend::new(dir.path());
        assert!(backend.read().is_err());
        Ok(())
    }

    #[test]
    fn test_memory_backend_failure_keeps_content() -> Result<()> {
        let mut backend = MemoryBackend::with_contents("old");
        backend.fail_writes(true);
        assert!(backend.write(b"new").is_err());
        assert_eq!(backend.contents(), Some(&b"old"[..]));
        assert_eq!(backend.writes(), 0);
        Ok(())
    }
}
