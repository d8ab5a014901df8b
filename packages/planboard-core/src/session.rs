/// Plan store session.
///
/// Owns everything one open plan needs: the document backend, the audit log,
/// the artifact index, the outstanding-write tracker and the last loaded
/// snapshot. Every mutation reloads the document, edits a throwaway board,
/// writes it back and logs what it did; nothing but the snapshot survives
/// between operations.
///
/// Change notifications are classified by the write tracker. Our own writes
/// only trigger a reload; anything else is diffed against the snapshot and
/// logged under the external actor.

use crate::audit_log::AuditLog;
use crate::diff::{created_entry, deleted_entry, diff_boards, diff_card, status_changed_entry};
use crate::parser::{empty_plan, generate_plan, parse_plan};
use crate::storage::artifacts::{annotate_docs, ArtifactIndex};
use crate::storage::{DocumentBackend, StorageError};
use crate::types::{slugify, Board, Card, LogEntry};
use crate::watcher::self_write::WriteTracker;
use crate::watcher::types::{PlanEvent, WriteOrigin};

/// Result of a mutating operation that did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The write happened; the freshly reloaded board.
    Applied(Board),
    /// Nothing was written; message for the user.
    Warning(String),
}

pub struct PlanSession {
    backend: Box<dyn DocumentBackend>,
    locator: String,
    audit: AuditLog,
    artifacts: Box<dyn ArtifactIndex>,
    actor: String,
    external_actor: String,
    writes: WriteTracker,
    last_snapshot: Option<Board>,
}

/// Trim host-supplied fields so they survive a write/read cycle unchanged.
fn normalize_card(mut card: Card) -> Card {
    card.title = card.title.split_whitespace().collect::<Vec<_>>().join(" ");
    card.branch = card
        .branch
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty());
    card.description = card
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    card.actions = card.actions.filter(|a| !a.is_empty());
    card.has_doc = false;
    card
}

impl PlanSession {
    pub fn new(
        backend: Box<dyn DocumentBackend>,
        locator: &str,
        audit: AuditLog,
        artifacts: Box<dyn ArtifactIndex>,
        actor: &str,
    ) -> Self {
        Self {
            backend,
            locator: locator.to_string(),
            audit,
            artifacts,
            actor: actor.to_string(),
            external_actor: "External".to_string(),
            writes: WriteTracker::new(),
            last_snapshot: None,
        }
    }

    pub fn with_external_actor(mut self, label: &str) -> Self {
        self.external_actor = label.to_string();
        self
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn backend(&self) -> &dyn DocumentBackend {
        self.backend.as_ref()
    }

    /// Internal writes whose change notification has not been seen yet.
    pub fn pending_writes(&self) -> usize {
        self.writes.pending()
    }

    pub fn last_snapshot(&self) -> Option<&Board> {
        self.last_snapshot.as_ref()
    }

    pub fn cleanup_expired_writes(&mut self) {
        self.writes.cleanup_expired();
    }

    /// Decode the current document; absent reads as the empty board.
    async fn read_board(&self) -> Result<Board, StorageError> {
        let content = self.backend.read_document(&self.locator).await?;
        Ok(content.as_deref().map(parse_plan).unwrap_or_default())
    }

    /// Decode, annotate and remember a board as the new snapshot.
    async fn remember(&mut self, mut board: Board) -> Board {
        annotate_docs(&mut board, self.artifacts.as_ref()).await;
        self.last_snapshot = Some(board.clone());
        board
    }

    /// Load the board for display and replace the snapshot.
    pub async fn load(&mut self) -> Result<Board, StorageError> {
        let board = self.read_board().await?;
        Ok(self.remember(board).await)
    }

    /// Write through the backend as an internal write.
    async fn persist_text(&mut self, text: &str) -> Result<(), StorageError> {
        let token = self.writes.register(text);
        if let Err(e) = self.backend.write_document(&self.locator, text).await {
            self.writes.cancel(token);
            log::error!(
                "[planboard.session.write] Write to {} failed: {}",
                self.backend.describe(),
                e
            );
            return Err(e);
        }
        Ok(())
    }

    async fn persist(&mut self, board: &Board) -> Result<(), StorageError> {
        let text = generate_plan(board);
        self.persist_text(&text).await
    }

    /// Write a fresh plan with no cards.
    pub async fn init_document(&mut self) -> Result<Board, StorageError> {
        self.persist_text(&empty_plan()).await?;
        log::info!("[planboard.session.init] Initialized plan on {}", self.backend.describe());
        self.load().await
    }

    /// Move a card to the end of the column matching `target` (title,
    /// case-insensitive, or column id).
    pub async fn move_card(
        &mut self,
        card_id: &str,
        target: &str,
    ) -> Result<MutationOutcome, StorageError> {
        let mut board = self.read_board().await?;

        let Some((card, from_title)) = board.take_card(card_id) else {
            return Ok(MutationOutcome::Warning(format!("Card \"{}\" not found.", card_id)));
        };
        let Some(column) = board.column_for_target_mut(target) else {
            return Ok(MutationOutcome::Warning(format!("Column \"{}\" not found.", target)));
        };
        let to_title = column.title.clone();
        let (id, title) = (card.id.clone(), card.title.clone());
        column.cards.push(card);

        self.persist(&board).await?;
        if from_title != to_title {
            self.audit
                .append(&id, &title, &self.actor, &[status_changed_entry(&from_title, &to_title)])
                .await;
        }
        log::info!("[planboard.session.move] {} {} -> {}", id, from_title, to_title);

        Ok(MutationOutcome::Applied(self.load().await?))
    }

    /// Replace the card with `updated.id` in place. A title edit changes the
    /// card id; its audit log follows it to the new id.
    pub async fn update_card(&mut self, updated: Card) -> Result<MutationOutcome, StorageError> {
        let old_id = updated.id.clone();
        let updated = normalize_card(updated);
        if updated.title.is_empty() {
            return Ok(MutationOutcome::Warning("Card title cannot be empty.".to_string()));
        }
        let new_id = slugify(&updated.title);

        let mut board = self.read_board().await?;
        if new_id != old_id && board.find_card(&new_id).is_some() {
            return Ok(MutationOutcome::Warning(format!(
                "A card with id \"{}\" already exists.",
                new_id
            )));
        }

        let Some(slot) = board.cards_mut().find(|c| c.id == old_id) else {
            return Ok(MutationOutcome::Warning(format!("Card \"{}\" not found.", old_id)));
        };
        let old_card = std::mem::replace(
            slot,
            Card {
                id: new_id.clone(),
                ..updated
            },
        );
        let entries = diff_card(&old_card, slot);
        let title = slot.title.clone();

        self.persist(&board).await?;
        if new_id != old_id {
            self.audit.rename(&old_id, &new_id).await;
        }
        self.audit.append(&new_id, &title, &self.actor, &entries).await;
        log::info!(
            "[planboard.session.update] {} updated ({} changes)",
            new_id,
            entries.len()
        );

        Ok(MutationOutcome::Applied(self.load().await?))
    }

    /// Append a new card to the column with `column_id`.
    pub async fn add_card(
        &mut self,
        column_id: &str,
        title: &str,
    ) -> Result<MutationOutcome, StorageError> {
        let card = normalize_card(Card::new(title));
        if card.title.is_empty() {
            return Ok(MutationOutcome::Warning("Card title cannot be empty.".to_string()));
        }
        let card = Card::new(&card.title);

        let mut board = self.read_board().await?;
        if board.find_card(&card.id).is_some() {
            return Ok(MutationOutcome::Warning(format!(
                "A card with id \"{}\" already exists.",
                card.id
            )));
        }
        let Some(column) = board.column_by_id_mut(column_id) else {
            return Ok(MutationOutcome::Warning(format!("Column \"{}\" not found.", column_id)));
        };
        let column_title = column.title.clone();
        let (id, title) = (card.id.clone(), card.title.clone());
        column.cards.push(card);

        self.persist(&board).await?;
        self.audit
            .append(&id, &title, &self.actor, &[created_entry(&column_title)])
            .await;
        log::info!("[planboard.session.add] {} created in {}", id, column_title);

        Ok(MutationOutcome::Applied(self.load().await?))
    }

    /// Remove a card. Its audit log is kept.
    pub async fn delete_card(&mut self, card_id: &str) -> Result<MutationOutcome, StorageError> {
        let mut board = self.read_board().await?;
        let Some((card, from_title)) = board.take_card(card_id) else {
            return Ok(MutationOutcome::Warning(format!("Card \"{}\" not found.", card_id)));
        };

        self.persist(&board).await?;
        self.audit
            .append(&card.id, &card.title, &self.actor, &[deleted_entry(&from_title)])
            .await;
        log::info!("[planboard.session.delete] {} deleted from {}", card.id, from_title);

        Ok(MutationOutcome::Applied(self.load().await?))
    }

    /// A card's audit log, newest first.
    pub async fn read_log(&self, card_id: &str) -> Vec<LogEntry> {
        self.audit.read(card_id).await
    }

    /// React to a change notification for the document and return the board
    /// to display.
    pub async fn handle_event(&mut self, event: PlanEvent) -> Result<Board, StorageError> {
        if event != PlanEvent::Changed {
            log::debug!("[planboard.session.event] {:?}, reloading", event);
            return self.load().await;
        }

        let content = self.backend.read_document(&self.locator).await;
        let observed = content.as_ref().ok().and_then(|c| c.as_deref());
        let origin = self.writes.classify(observed);
        let board = content?.as_deref().map(parse_plan).unwrap_or_default();

        match origin {
            WriteOrigin::Internal => {
                log::debug!(
                    "[planboard.session.event] Own write acknowledged, {} outstanding",
                    self.writes.pending()
                );
            }
            WriteOrigin::External => self.log_external_changes(&board).await,
        }

        Ok(self.remember(board).await)
    }

    async fn log_external_changes(&self, board: &Board) {
        let Some(previous) = self.last_snapshot.as_ref() else {
            log::debug!("[planboard.session.external] No snapshot yet, nothing to diff");
            return;
        };

        let changes = diff_boards(previous, board);
        for change in &changes {
            self.audit
                .append(
                    &change.card_id,
                    &change.card_title,
                    &self.external_actor,
                    &change.entries,
                )
                .await;
        }
        if !changes.is_empty() {
            log::info!(
                "[planboard.session.external] Logged external changes to {} cards",
                changes.len()
            );
        }
    }
}
