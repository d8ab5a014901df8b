/// Card-level diff between two board versions.
///
/// Cards are matched by id (the title slug). Each change is rendered as a
/// short markdown line for the audit log. Actions are compared by position,
/// so inserting an action at the front reports every later action as changed.

use indexmap::IndexMap;

use crate::types::{Action, Board, Card, CardChange};

/// Descriptions longer than this are cut in log entries.
const DESCRIPTION_PREVIEW_CHARS: usize = 100;

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{}…", cut)
    } else {
        text.to_string()
    }
}

pub fn status_changed_entry(old_column: &str, new_column: &str) -> String {
    format!("Status changed: `{}` → `{}`", old_column, new_column)
}

pub fn created_entry(column: &str) -> String {
    format!("Card created in `{}`", column)
}

pub fn removed_entry(column: &str) -> String {
    format!("Card removed from `{}`", column)
}

pub fn deleted_entry(column: &str) -> String {
    format!("Card deleted from `{}`", column)
}

/// Index-aligned action comparison.
pub fn diff_actions(old_actions: &[Action], new_actions: &[Action]) -> Vec<String> {
    let mut entries = Vec::new();
    let max = old_actions.len().max(new_actions.len());

    for i in 0..max {
        match (old_actions.get(i), new_actions.get(i)) {
            (None, Some(n)) => entries.push(format!(
                "Action added: `{}` — {} [{}]",
                n.kind, n.description, n.status
            )),
            (Some(o), None) => {
                entries.push(format!("Action removed: `{}` — {}", o.kind, o.description))
            }
            (Some(o), Some(n)) => {
                if o.kind != n.kind {
                    entries.push(format!("Action type changed: `{}` → `{}`", o.kind, n.kind));
                }
                if o.status != n.status {
                    entries.push(format!(
                        "Action `{}` status: `{}` → `{}`",
                        n.kind, o.status, n.status
                    ));
                }
                if o.description != n.description {
                    entries.push(format!("Action `{}` description: {}", n.kind, n.description));
                }
            }
            (None, None) => {}
        }
    }

    entries
}

/// Compare the editable fields of one card. `has_doc` is derived and ignored.
pub fn diff_card(old_card: &Card, new_card: &Card) -> Vec<String> {
    let mut entries = Vec::new();

    if old_card.title != new_card.title {
        entries.push(format!("Title: `{}` → `{}`", old_card.title, new_card.title));
    }

    let old_branch = old_card.branch.as_deref().unwrap_or("");
    let new_branch = new_card.branch.as_deref().unwrap_or("");
    if old_branch != new_branch {
        if new_branch.is_empty() {
            entries.push("Branch removed".to_string());
        } else {
            entries.push(format!("Branch set: `{}`", new_branch));
        }
    }

    let old_description = old_card.description.as_deref().unwrap_or("");
    let new_description = new_card.description.as_deref().unwrap_or("");
    if old_description != new_description {
        if new_description.is_empty() {
            entries.push("Description cleared".to_string());
        } else {
            entries.push(format!(
                "Description: {}",
                truncate(new_description, DESCRIPTION_PREVIEW_CHARS)
            ));
        }
    }

    if old_card.actions() != new_card.actions() {
        entries.extend(diff_actions(old_card.actions(), new_card.actions()));
    }

    entries
}

/// Card id -> (card, owning column title), in document order.
fn index_board(board: &Board) -> IndexMap<&str, (&Card, &str)> {
    let mut map = IndexMap::new();
    for (column, card) in board.cards() {
        map.insert(card.id.as_str(), (card, column.title.as_str()));
    }
    map
}

/// Compute per-card changes between two snapshots.
///
/// Order: created cards (new document order), removed cards (old document
/// order), then changed cards (new document order). When ids collide within
/// one snapshot the last occurrence wins.
pub fn diff_boards(old_board: &Board, new_board: &Board) -> Vec<CardChange> {
    let old_map = index_board(old_board);
    let new_map = index_board(new_board);
    let mut changes = Vec::new();

    for (id, (card, column)) in &new_map {
        if !old_map.contains_key(id) {
            changes.push(CardChange {
                card_id: id.to_string(),
                card_title: card.title.clone(),
                entries: vec![created_entry(column)],
            });
        }
    }

    for (id, (card, column)) in &old_map {
        if !new_map.contains_key(id) {
            changes.push(CardChange {
                card_id: id.to_string(),
                card_title: card.title.clone(),
                entries: vec![removed_entry(column)],
            });
        }
    }

    for (id, (new_card, new_column)) in &new_map {
        let Some((old_card, old_column)) = old_map.get(id) else {
            continue;
        };

        let mut entries = Vec::new();
        if old_column != new_column {
            entries.push(status_changed_entry(old_column, new_column));
        }
        entries.extend(diff_card(old_card, new_card));

        if !entries.is_empty() {
            changes.push(CardChange {
                card_id: id.to_string(),
                card_title: new_card.title.clone(),
                entries,
            });
        }
    }

    changes
}
