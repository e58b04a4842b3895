//! Interruption inbox: a single-slot, last-write-wins mailbox read between steps

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
#[cfg(test)]
use parking_lot::Mutex;

/// Non-blocking source of out-of-band messages
pub trait Inbox: Send + Sync {
    /// Drain the pending message, if any. Whitespace-only content counts as empty.
    fn take(&self) -> Result<Option<String>>;
}

/// Inbox backed by a plain-text file; nonzero size means a message is pending
#[derive(Debug, Clone)]
pub struct FileInbox {
    path: PathBuf,
}

impl FileInbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the slot with `message`
    pub fn post(&self, message: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, message)
            .with_context(|| format!("Failed to write inbox {}", self.path.display()))
    }
}

impl Inbox for FileInbox {
    fn take(&self) -> Result<Option<String>> {
        let pending = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() > 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to stat inbox {}", self.path.display()))
            }
        };
        if !pending {
            return Ok(None);
        }

        let bytes = fs::read(&self.path)
            .with_context(|| format!("Failed to read inbox {}", self.path.display()))?;
        fs::write(&self.path, "")
            .with_context(|| format!("Failed to clear inbox {}", self.path.display()))?;

        let content = String::from_utf8_lossy(&bytes);
        let content = content.trim();
        Ok((!content.is_empty()).then(|| content.to_string()))
    }
}

/// In-memory inbox for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryInbox {
    slot: Mutex<Option<String>>,
}

#[cfg(test)]
impl MemoryInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot with `message`
    pub fn post(&self, message: impl Into<String>) {
        *self.slot.lock() = Some(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

#[cfg(test)]
impl Inbox for MemoryInbox {
    fn take(&self) -> Result<Option<String>> {
        let taken = self.slot.lock().take();
        Ok(taken
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_inbox_take_clears() {
        let dir = TempDir::new().unwrap();
        let inbox = FileInbox::new(dir.path().join("interrupt.txt"));

        assert_eq!(inbox.take().unwrap(), None);

        inbox.post("focus on the summary\n").unwrap();
        assert_eq!(inbox.take().unwrap().as_deref(), Some("focus on the summary"));
        assert_eq!(fs::metadata(inbox.path()).unwrap().len(), 0);
        assert_eq!(inbox.take().unwrap(), None);
    }

    #[test]
    fn test_file_inbox_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let inbox = FileInbox::new(dir.path().join("interrupt.txt"));

        inbox.post("first").unwrap();
        inbox.post("second").unwrap();
        assert_eq!(inbox.take().unwrap().as_deref(), Some("second"));
        assert_eq!(inbox.take().unwrap(), None);
    }

    #[test]
    fn test_file_inbox_whitespace_is_empty() {
        let dir = TempDir::new().unwrap();
        let inbox = FileInbox::new(dir.path().join("interrupt.txt"));

        inbox.post("  \n\t").unwrap();
        assert_eq!(inbox.take().unwrap(), None);
        assert_eq!(fs::metadata(inbox.path()).unwrap().len(), 0);
    }

    #[test]
    fn test_file_inbox_invalid_utf8_is_consumed() {
        let dir = TempDir::new().unwrap();
        let inbox = FileInbox::new(dir.path().join("interrupt.txt"));
        fs::write(inbox.path(), [0xff, 0xfe, b'h', b'i']).unwrap();

        let message = inbox.take().unwrap().unwrap();
        assert!(message.ends_with("hi"));
        assert_eq!(fs::metadata(inbox.path()).unwrap().len(), 0);
        assert_eq!(inbox.take().unwrap(), None);
    }

    #[test]
    fn test_memory_inbox() {
        let inbox = MemoryInbox::new();
        assert_eq!(inbox.take().unwrap(), None);

        inbox.post("one");
        inbox.post("two");
        assert!(!inbox.is_empty());
        assert_eq!(inbox.take().unwrap().as_deref(), Some("two"));
        assert!(inbox.is_empty());
    }
}
