use serde::{Deserialize, Serialize};

/// Workflow statuses every plan starts with, in display order.
/// Column headings are resolved against these case-insensitively.
pub const KNOWN_STATUSES: &[&str] = &[
    "Backlog",
    "Ready",
    "In Progress",
    "Review",
    "Testing",
    "Done",
    "Blocked",
];

/// Title line written at the top of every generated plan.
pub const PLAN_TITLE: &str = "# Feature Plan";

/// Deterministic id for a column or card title: lowercase, whitespace runs
/// collapsed to a single hyphen.
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub status: String,
}

impl Action {
    pub fn new(kind: &str, description: &str, status: &str) -> Self {
        Self {
            kind: kind.to_string(),
            description: description.to_string(),
            status: status.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
    /// Derived on every load from the per-card artifact index; never written
    /// into the plan document.
    #[serde(default)]
    pub has_doc: bool,
}

impl Card {
    /// A bare card whose id is derived from its title.
    pub fn new(title: &str) -> Self {
        Self {
            id: slugify(title),
            title: title.to_string(),
            branch: None,
            description: None,
            actions: None,
            has_doc: false,
        }
    }

    pub fn actions(&self) -> &[Action] {
        self.actions.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub title: String,
    pub cards: Vec<Card>,
}

impl Column {
    pub fn new(title: &str) -> Self {
        Self {
            id: slugify(title),
            title: title.to_string(),
            cards: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub columns: Vec<Column>,
}

impl Default for Board {
    /// The board an absent or empty document decodes to: every known status,
    /// no cards.
    fn default() -> Self {
        Self {
            columns: KNOWN_STATUSES.iter().map(|s| Column::new(s)).collect(),
        }
    }
}

impl Board {
    /// Find a card and the index of the column that owns it.
    pub fn find_card(&self, card_id: &str) -> Option<(usize, &Card)> {
        self.columns.iter().enumerate().find_map(|(col_idx, col)| {
            col.cards
                .iter()
                .find(|c| c.id == card_id)
                .map(|card| (col_idx, card))
        })
    }

    /// Remove a card from whichever column holds it.
    /// Returns the card and the title of the column it was taken from.
    pub fn take_card(&mut self, card_id: &str) -> Option<(Card, String)> {
        for col in &mut self.columns {
            if let Some(pos) = col.cards.iter().position(|c| c.id == card_id) {
                let card = col.cards.remove(pos);
                return Some((card, col.title.clone()));
            }
        }
        None
    }

    /// Resolve a move target: a column title (case-insensitive) or a column id.
    pub fn column_for_target_mut(&mut self, target: &str) -> Option<&mut Column> {
        let lowered = target.to_lowercase();
        self.columns
            .iter_mut()
            .find(|c| c.title.to_lowercase() == lowered || c.id == target)
    }

    pub fn column_by_id_mut(&mut self, column_id: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.id == column_id)
    }

    pub fn cards(&self) -> impl Iterator<Item = (&Column, &Card)> {
        self.columns
            .iter()
            .flat_map(|col| col.cards.iter().map(move |card| (col, card)))
    }

    pub fn cards_mut(&mut self) -> impl Iterator<Item = &mut Card> {
        self.columns.iter_mut().flat_map(|col| col.cards.iter_mut())
    }
}

/// One block of a per-card audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub actor: String,
    pub items: Vec<String>,
}

/// Diff output for a single card. Only ever handed to the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardChange {
    pub card_id: String,
    pub card_title: String,
    pub entries: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("In Progress"), "in-progress");
        assert_eq!(slugify("Add  OAuth\tlogin"), "add-oauth-login");
        assert_eq!(slugify("done"), "done");
    }

    #[test]
    fn test_default_board_has_known_statuses() {
        let board = Board::default();
        let titles: Vec<&str> = board.columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, KNOWN_STATUSES);
        assert_eq!(board.columns[2].id, "in-progress");
    }

    #[test]
    fn test_take_card_and_target_lookup() {
        let mut board = Board::default();
        board.columns[0].cards.push(Card::new("Login page"));

        assert!(board.column_for_target_mut("in progress").is_some());
        assert!(board.column_for_target_mut("in-progress").is_some());
        assert!(board.column_for_target_mut("Shipped").is_none());

        let (card, from) = board.take_card("login-page").unwrap();
        assert_eq!(card.title, "Login page");
        assert_eq!(from, "Backlog");
        assert!(board.find_card("login-page").is_none());
    }

    #[test]
    fn test_card_serializes_action_type_field() {
        let mut card = Card::new("Deploy");
        card.actions = Some(vec![Action::new("build", "compile", "open")]);
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["actions"][0]["type"], "build");
        assert_eq!(json["hasDoc"], false);
    }
}
