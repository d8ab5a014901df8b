/// Host message protocol between a board view and the plan session.
///
/// Both directions are JSON objects tagged on `type`:
///   view -> host: ready, initProject, moveFeature, updateCard, addCard,
///                 deleteCard, getLog
///   host -> view: updateView, logData, warning, error
use serde::{Deserialize, Serialize};

use crate::session::{MutationOutcome, PlanSession};
use crate::storage::StorageError;
use crate::types::{Board, Card, LogEntry};
use crate::watcher::types::PlanEvent;

/// Messages sent from the view to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Ready,
    InitProject,
    MoveFeature { feature_id: String, new_status: String },
    UpdateCard { card: Card },
    AddCard { column_id: String, title: String },
    DeleteCard { card_id: String },
    GetLog { card_id: String },
}

/// Messages sent from the host to the view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostMessage {
    UpdateView { data: Board },
    LogData { card_id: String, entries: Vec<LogEntry> },
    Warning { message: String },
    Error { message: String },
}

fn storage_failure(op: &str, e: StorageError) -> HostMessage {
    log::error!("[planboard.protocol.{}] {}", op, e);
    HostMessage::Error {
        message: format!("{} failed: {}", op, e),
    }
}

fn outcome(op: &str, result: Result<MutationOutcome, StorageError>) -> HostMessage {
    match result {
        Ok(MutationOutcome::Applied(board)) => HostMessage::UpdateView { data: board },
        Ok(MutationOutcome::Warning(message)) => {
            log::warn!("[planboard.protocol.{}] {}", op, message);
            HostMessage::Warning { message }
        }
        Err(e) => storage_failure(op, e),
    }
}

fn view(op: &str, result: Result<Board, StorageError>) -> HostMessage {
    match result {
        Ok(board) => HostMessage::UpdateView { data: board },
        Err(e) => storage_failure(op, e),
    }
}

/// Apply one view message to the session and return what to send back.
pub async fn dispatch(session: &mut PlanSession, message: ClientMessage) -> Vec<HostMessage> {
    let reply = match message {
        ClientMessage::Ready => view("ready", session.load().await),
        ClientMessage::InitProject => view("initProject", session.init_document().await),
        ClientMessage::MoveFeature {
            feature_id,
            new_status,
        } => outcome("moveFeature", session.move_card(&feature_id, &new_status).await),
        ClientMessage::UpdateCard { card } => outcome("updateCard", session.update_card(card).await),
        ClientMessage::AddCard { column_id, title } => {
            outcome("addCard", session.add_card(&column_id, &title).await)
        }
        ClientMessage::DeleteCard { card_id } => {
            outcome("deleteCard", session.delete_card(&card_id).await)
        }
        ClientMessage::GetLog { card_id } => {
            let entries = session.read_log(&card_id).await;
            HostMessage::LogData { card_id, entries }
        }
    };
    vec![reply]
}

/// Feed a watcher notification through the session and return the refreshed
/// view.
pub async fn on_plan_event(session: &mut PlanSession, event: PlanEvent) -> HostMessage {
    view("watch", session.handle_event(event).await)
}
