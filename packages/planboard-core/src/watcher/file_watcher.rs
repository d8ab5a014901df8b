/// File watcher using notify-debouncer-full.
///
/// Watches the parent directory of one target file (the plan document, or
/// the ref file of a git line) and emits at most one PlanEvent per debounced
/// batch via broadcast channel.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use tokio::sync::broadcast;

use super::types::PlanEvent;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Canonical form of a path that may not exist: canonical parent + file name.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Collapse the event kinds seen for the target in one batch into a single
/// notification. `exists` is whether the target exists after the batch.
pub fn classify_batch(kinds: &[EventKind], exists: bool) -> Option<PlanEvent> {
    let touched = kinds
        .iter()
        .any(|k| matches!(k, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)));
    if !touched {
        return None;
    }
    if !exists {
        return Some(PlanEvent::Deleted);
    }

    let created = kinds.iter().any(|k| matches!(k, EventKind::Create(_)));
    let modified = kinds
        .iter()
        .any(|k| matches!(k, EventKind::Modify(_) | EventKind::Remove(_)));
    if created && !modified {
        Some(PlanEvent::Created)
    } else {
        Some(PlanEvent::Changed)
    }
}

/// Watches a single file for changes.
pub struct PlanWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher, RecommendedCache>,
    target: PathBuf,
}

impl PlanWatcher {
    /// Start watching `target`. Its parent directory is created if missing.
    /// Returns the watcher and a broadcast receiver for events.
    pub fn new(
        target: &Path,
        debounce: Duration,
    ) -> Result<(Self, broadcast::Receiver<PlanEvent>), notify::Error> {
        let (event_tx, event_rx) = broadcast::channel(256);

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(notify::Error::io)?;
        }
        let target = normalize(target);

        let target_clone = target.clone();
        let mut debouncer = new_debouncer(
            debounce,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => handle_batch(&events, &target_clone, &event_tx),
                Err(errors) => {
                    for e in errors {
                        log::error!("[planboard.watcher.error] Watch error: {}", e);
                    }
                }
            },
        )?;

        if let Some(parent) = target.parent() {
            debouncer.watch(parent, RecursiveMode::NonRecursive)?;
        }
        log::info!("[planboard.watcher.plan] Watching {:?}", target);

        Ok((
            Self {
                _debouncer: debouncer,
                target,
            },
            event_rx,
        ))
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

}

fn handle_batch(events: &[DebouncedEvent], target: &Path, tx: &broadcast::Sender<PlanEvent>) {
    let kinds: Vec<EventKind> = events
        .iter()
        .filter(|event| event.paths.iter().any(|p| normalize(p) == target))
        .map(|event| event.kind)
        .collect();

    if let Some(plan_event) = classify_batch(&kinds, target.exists()) {
        log::debug!("[planboard.watcher.plan] {:?} for {:?}", plan_event, target);
        if let Err(e) = tx.send(plan_event) {
            log::warn!("[planboard.watcher.send] No receivers: {}", e);
        }
    }
}
