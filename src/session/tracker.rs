use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use teloxide::types::{ChatId, MessageId};

use crate::transport::ChatTransport;

/// Transient bot messages and scratch files of one session.
///
/// [`purge_all`](Self::purge_all) is the only place they get removed.
#[derive(Debug)]
pub struct EphemeralTracker {
    messages: Vec<MessageId>,
    files: Vec<PathBuf>,
    protected: PathBuf,
}

impl EphemeralTracker {
    /// `protected` is never deleted, whatever gets tracked.
    pub fn new(protected: impl Into<PathBuf>) -> Self {
        Self {
            messages: Vec::new(),
            files: Vec::new(),
            protected: protected.into(),
        }
    }

    pub fn track_message(&mut self, id: MessageId) {
        self.messages.push(id);
    }

    pub fn track_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if path == self.protected {
            log::warn!("Refusing to track protected file {}", path.display());
            return;
        }
        if !self.files.contains(&path) {
            self.files.push(path);
        }
    }

    pub fn messages(&self) -> &[MessageId] {
        &self.messages
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.files.is_empty()
    }

    async fn is_protected(&self, path: &Path) -> bool {
        if path == self.protected {
            return true;
        }
        match (
            tokio::fs::canonicalize(path).await,
            tokio::fs::canonicalize(&self.protected).await,
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Deletes every tracked message and file. Failures are logged and
    /// skipped; both lists are empty afterwards.
    pub async fn purge_all(&mut self, transport: &dyn ChatTransport, chat: ChatId) {
        for id in std::mem::take(&mut self.messages) {
            if let Err(e) = transport.delete_message(chat, id).await {
                log::debug!("Could not delete message {} in chat {}: {}", id.0, chat, e);
            }
        }

        for path in std::mem::take(&mut self.files) {
            if self.is_protected(&path).await {
                log::warn!("Skipping protected file {}", path.display());
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => log::debug!("Removed {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove file {:?}: {}", path, e),
            }
        }
    }
}
