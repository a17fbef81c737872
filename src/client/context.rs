use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

use crate::backup::{BackupResult, DataDomain, ProgressEvent, RestoreOptions, SelectedFileSet};

/// The single "current progress" slot a UI observes.
///
/// Each event replaces the previous one; nothing accumulates.
#[derive(Debug, Clone)]
pub struct ProgressSlot {
    tx: Arc<watch::Sender<Option<ProgressEvent>>>,
}

impl Default for ProgressSlot {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }
}

impl ProgressSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, event: ProgressEvent) {
        self.tx.send_replace(Some(event));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub fn current(&self) -> Option<ProgressEvent> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ProgressEvent>> {
        self.tx.subscribe()
    }
}

/// State of one restore session: the chosen parts, the domain toggles and the
/// progress slot the session reports into.
#[derive(Debug, Clone)]
pub struct RestoreContext {
    pub options: RestoreOptions,
    selection: Option<SelectedFileSet>,
    progress: ProgressSlot,
}

impl RestoreContext {
    pub fn new(progress: ProgressSlot) -> Self {
        Self {
            options: RestoreOptions::default(),
            selection: None,
            progress,
        }
    }

    /// Validates and orders the picked files. A rejected pick leaves the
    /// previous selection untouched.
    pub async fn select<P: AsRef<Path>>(&mut self, paths: &[P]) -> BackupResult<&SelectedFileSet> {
        let set = SelectedFileSet::from_paths(paths).await?;
        Ok(self.selection.insert(set))
    }

    pub fn set_selection(&mut self, selection: SelectedFileSet) {
        self.selection = Some(selection);
    }

    pub fn selection(&self) -> Option<&SelectedFileSet> {
        self.selection.as_ref()
    }

    pub fn toggle(&mut self, domain: DataDomain) {
        let enabled = self.options.includes(domain);
        self.options.set(domain, !enabled);
    }

    pub fn progress(&self) -> &ProgressSlot {
        &self.progress
    }

    /// Back to defaults once a restore has been submitted.
    pub fn reset(&mut self) {
        self.options = RestoreOptions::default();
        self.selection = None;
    }
}
