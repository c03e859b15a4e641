//! Test utilities for creating temporary log files and reshaping them the
//! way log rotation tools do.

#[cfg(test)]
use std::fs::{self, File, OpenOptions};
#[cfg(test)]
use std::io::Write;
#[cfg(test)]
use std::path::{Path, PathBuf};

#[cfg(test)]
pub struct TempLogFile {
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

#[cfg(test)]
impl TempLogFile {
    /// Create a new empty temporary log file for testing
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("test.log");

        File::create(&path)?;

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a temporary log file with initial content
    pub fn with_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append_content(content)?;
        Ok(temp_file)
    }

    /// Append a line (content plus newline) to the temporary log file
    pub fn append_content(&self, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;

        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(())
    }

    /// Append raw bytes without a trailing newline
    pub fn append_raw(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(bytes)?;
        file.flush()
    }

    /// Truncate the file in place, keeping its identity
    pub fn truncate(&self) -> std::io::Result<()> {
        OpenOptions::new().write(true).open(&self.path)?.set_len(0)
    }

    /// Move the file aside to `<name>.1`, leaving the path empty
    pub fn rotate(&self) -> std::io::Result<PathBuf> {
        let mut rotated = self.path.clone().into_os_string();
        rotated.push(".1");
        let rotated = PathBuf::from(rotated);
        fs::rename(&self.path, &rotated)?;
        Ok(rotated)
    }

    /// Create a new file at the path holding a single line
    pub fn recreate_with(&self, content: &str) -> std::io::Result<()> {
        let mut file = File::create(&self.path)?;
        writeln!(file, "{}", content)?;
        file.flush()
    }

    /// Delete the file
    pub fn remove(&self) -> std::io::Result<()> {
        fs::remove_file(&self.path)
    }

    /// Get the path to the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
    }

    #[tokio::test]
    async fn test_temp_log_file_with_content() {
        let temp_file = TempLogFile::with_content("test line").unwrap();

        let file_content = fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(file_content, "test line\n");
    }

    #[tokio::test]
    async fn test_append_content() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.append_content("line 1").unwrap();
        temp_file.append_raw(b"line 2").unwrap();

        let content = fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "line 1\nline 2");
    }

    #[tokio::test]
    async fn test_truncate() {
        let temp_file = TempLogFile::with_content("initial content").unwrap();
        temp_file.truncate().unwrap();

        let content = fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn test_rotate_and_recreate() {
        let temp_file = TempLogFile::with_content("old").unwrap();

        let rotated = temp_file.rotate().unwrap();
        assert!(!temp_file.path().exists());
        assert_eq!(fs::read_to_string(&rotated).unwrap(), "old\n");

        temp_file.recreate_with("new").unwrap();
        assert_eq!(fs::read_to_string(temp_file.path()).unwrap(), "new\n");
    }

    #[tokio::test]
    async fn test_remove() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.remove().unwrap();
        assert!(!temp_file.path().exists());
    }
}
