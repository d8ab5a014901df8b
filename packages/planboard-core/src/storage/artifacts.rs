/// Lookup for per-card artifacts backing the derived `has_doc` flag.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::audit_log::card_file_name;
use crate::types::Board;

#[async_trait]
pub trait ArtifactIndex: Send + Sync {
    async fn has_doc(&self, card_id: &str) -> bool;
}

/// Artifacts stored as `<dir>/<card id>.md`.
#[derive(Debug, Clone)]
pub struct ExecuteDirIndex {
    dir: PathBuf,
}

impl ExecuteDirIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn doc_path(&self, card_id: &str) -> PathBuf {
        self.dir.join(card_file_name(card_id))
    }
}

#[async_trait]
impl ArtifactIndex for ExecuteDirIndex {
    async fn has_doc(&self, card_id: &str) -> bool {
        tokio::fs::try_exists(self.doc_path(card_id))
            .await
            .unwrap_or(false)
    }
}

/// Recompute `has_doc` for every card on the board.
pub async fn annotate_docs(board: &mut Board, index: &dyn ArtifactIndex) {
    for card in board.cards_mut() {
        card.has_doc = index.has_doc(&card.id).await;
    }
}
