/// Plain-text rendering for the CLI.
use planboard_core::types::{Board, LogEntry};

pub fn board(board: &Board) -> String {
    let mut out = String::new();
    for column in &board.columns {
        out.push_str(&format!("{} [{}] ({})\n", column.title, column.id, column.cards.len()));
        for card in &column.cards {
            out.push_str(&format!("  - {}  {}", card.id, card.title));
            if let Some(branch) = &card.branch {
                out.push_str(&format!("  <{}>", branch));
            }
            if card.has_doc {
                out.push_str("  +doc");
            }
            out.push('\n');
            for action in card.actions() {
                out.push_str(&format!(
                    "      > {} | {} | {}\n",
                    action.kind, action.description, action.status
                ));
            }
        }
    }
    out
}

pub fn log(entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return "No log entries.\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!("{}  {}\n", entry.timestamp, entry.actor));
        for item in &entry.items {
            out.push_str(&format!("  - {}\n", item));
        }
    }
    out
}
