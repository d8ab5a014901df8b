/// Outstanding self-write tracker.
///
/// Before every internal document write: register it (the outstanding count
/// goes up by one). On a change notification: if anything is outstanding,
/// acknowledge it and report the change as internal; otherwise it came from
/// outside.
///
/// Notifications are assumed to arrive in write order. A debounced watcher
/// may fold several writes into one notification, so each entry carries the
/// content fingerprint: a notification showing the content of write k
/// acknowledges writes 1..=k at once.
/// TTL (10s) is cleanup only, for notifications that never arrive.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::types::{ContentFingerprint, WriteOrigin};

const WRITE_TTL: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct PendingWrite {
    token: u64,
    fingerprint: ContentFingerprint,
    registered_at: Instant,
}

#[derive(Debug, Default)]
pub struct WriteTracker {
    outstanding: VecDeque<PendingWrite>,
    next_token: u64,
}

impl WriteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an internal write (called before writing). Returns its token.
    pub fn register(&mut self, content: &str) -> u64 {
        self.next_token += 1;
        let token = self.next_token;
        self.outstanding.push_back(PendingWrite {
            token,
            fingerprint: ContentFingerprint::from_content(content),
            registered_at: Instant::now(),
        });
        token
    }

    /// Forget a registered write that never reached the backend.
    pub fn cancel(&mut self, token: u64) {
        self.outstanding.retain(|w| w.token != token);
    }

    /// Number of writes whose notification has not arrived yet.
    pub fn pending(&self) -> usize {
        self.outstanding.len()
    }

    /// Classify a change notification. `current` is the document content
    /// observed after the change.
    ///
    /// When `current` matches an outstanding write, that write and every
    /// older one are acknowledged together: their notifications were folded
    /// into this one. Otherwise only the oldest write is acknowledged.
    pub fn classify(&mut self, current: Option<&str>) -> WriteOrigin {
        if self.outstanding.is_empty() {
            return WriteOrigin::External;
        }

        let matched = current.and_then(|content| {
            let fingerprint = ContentFingerprint::from_content(content);
            self.outstanding
                .iter()
                .position(|w| w.fingerprint == fingerprint)
        });

        match matched {
            Some(idx) => {
                let acknowledged = self.outstanding.drain(..=idx).count();
                if acknowledged > 1 {
                    log::debug!(
                        "[planboard.watcher.self_write] One notification covered {} writes",
                        acknowledged
                    );
                }
            }
            None => {
                if let Some(write) = self.outstanding.pop_front() {
                    if current.is_some() {
                        log::warn!(
                            "[planboard.watcher.self_write] Write #{} acknowledged but content matches none of our writes; an external edit may have been folded in",
                            write.token
                        );
                    }
                }
            }
        }
        WriteOrigin::Internal
    }

    /// Drop writes whose notification never arrived.
    pub fn cleanup_expired(&mut self) {
        let now = Instant::now();
        let before = self.outstanding.len();
        self.outstanding
            .retain(|w| now.duration_since(w.registered_at) < WRITE_TTL);
        let dropped = before - self.outstanding.len();
        if dropped > 0 {
            log::debug!(
                "[planboard.watcher.self_write] Expired {} unacknowledged writes",
                dropped
            );
        }
    }
}
