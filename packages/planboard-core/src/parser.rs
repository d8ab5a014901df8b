/// Plan document codec.
///
/// Handles the plan format:
///   # Feature Plan
///   ## #Status            column heading
///   ### Card title        card heading
///   git-branch: name      branch field
///   > type | description | status   action line
///   anything else         description text
///
/// Lines inside a description are not escaped: a description line that
/// starts with `## #`, `### `, `git-branch:` or `>` is read back as structure.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Action, Board, Card, Column, PLAN_TITLE};

static COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^##\s+#(.+)$").unwrap());
static CARD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^###\s+(.+)$").unwrap());
static BRANCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^git-branch:(.*)$").unwrap());

/// Card under construction while its body lines are scanned.
struct PendingCard {
    card: Card,
    description: Vec<String>,
    actions: Vec<Action>,
}

impl PendingCard {
    fn open(title: &str) -> Self {
        Self {
            card: Card::new(title),
            description: Vec::new(),
            actions: Vec::new(),
        }
    }

    fn finish(self) -> Card {
        let mut card = self.card;
        let description = self.description.join("\n");
        let description = description.trim();
        card.description = if description.is_empty() {
            None
        } else {
            Some(description.to_string())
        };
        card.actions = if self.actions.is_empty() {
            None
        } else {
            Some(self.actions)
        };
        card
    }
}

/// Parse an action line body (the text after `>`).
/// The type ends at the first `|` and the status starts after the last one;
/// everything in between, inner pipes included, is the description. Missing
/// segments come back empty.
pub fn parse_action(body: &str) -> Action {
    let Some((kind, rest)) = body.split_once('|') else {
        return Action::new(body.trim(), "", "");
    };
    match rest.rsplit_once('|') {
        Some((description, status)) => Action::new(kind.trim(), description.trim(), status.trim()),
        None => Action::new(kind.trim(), rest.trim(), ""),
    }
}

/// Parse plan text into a board. Never fails: unknown headings become new
/// columns and cards that appear before any column heading are dropped.
pub fn parse_plan(content: &str) -> Board {
    let content = content.replace("\r\n", "\n").replace('\r', "\n");

    let mut board = Board::default();
    let mut column_index: HashMap<String, usize> = board
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.title.to_lowercase(), i))
        .collect();

    let mut current_column: Option<usize> = None;
    let mut current_card: Option<PendingCard> = None;

    fn flush(board: &mut Board, column: Option<usize>, card: &mut Option<PendingCard>) {
        if let Some(pending) = card.take() {
            match column {
                Some(idx) => board.columns[idx].cards.push(pending.finish()),
                None => log::debug!(
                    "[planboard.parser.orphan] Dropping card {:?} outside any column",
                    pending.card.title
                ),
            }
        }
    }

    for line in content.split('\n') {
        if let Some(caps) = COLUMN_RE.captures(line) {
            flush(&mut board, current_column, &mut current_card);
            let status = caps[1].trim();
            let key = status.to_lowercase();
            let idx = match column_index.get(&key) {
                Some(idx) => *idx,
                None => {
                    board.columns.push(Column::new(status));
                    let idx = board.columns.len() - 1;
                    column_index.insert(key, idx);
                    idx
                }
            };
            current_column = Some(idx);
            continue;
        }

        if let Some(caps) = CARD_RE.captures(line) {
            flush(&mut board, current_column, &mut current_card);
            current_card = Some(PendingCard::open(caps[1].trim()));
            continue;
        }

        let Some(pending) = current_card.as_mut() else {
            continue;
        };

        if let Some(caps) = BRANCH_RE.captures(line) {
            let branch = caps[1].trim();
            pending.card.branch = (!branch.is_empty()).then(|| branch.to_string());
        } else if let Some(body) = line.strip_prefix('>') {
            pending.actions.push(parse_action(body));
        } else {
            pending.description.push(line.to_string());
        }
    }
    flush(&mut board, current_column, &mut current_card);

    board
}

/// Format an action the way `parse_action` reads it back.
pub fn format_action(action: &Action) -> String {
    format!(
        "> {} | {} | {}",
        action.kind, action.description, action.status
    )
}

/// Generate plan text from a board. `has_doc` is never written.
pub fn generate_plan(board: &Board) -> String {
    let mut lines: Vec<String> = vec![PLAN_TITLE.to_string(), String::new()];

    for column in &board.columns {
        lines.push(format!("## #{}", column.title));
        for card in &column.cards {
            lines.push(format!("### {}", card.title));
            if let Some(branch) = card.branch.as_deref().filter(|b| !b.is_empty()) {
                lines.push(format!("git-branch: {}", branch));
            }
            if let Some(description) = card.description.as_deref().filter(|d| !d.is_empty()) {
                lines.push(description.to_string());
            }
            for action in card.actions() {
                lines.push(format_action(action));
            }
            lines.push(String::new());
        }
    }

    let mut markdown = lines.join("\n");
    if !markdown.ends_with('\n') {
        markdown.push('\n');
    }
    markdown
}

/// The document written for a fresh plan: title line only.
pub fn empty_plan() -> String {
    format!("{}\n", PLAN_TITLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KNOWN_STATUSES;

    const SAMPLE_PLAN: &str = "\
# Feature Plan

## #Backlog
### Login page
git-branch: feature/login
Build the login form.

Needs design review.
> build | compile the form | open
> test | e2e login | done

### Dark mode

## #in progress
### Search
> spike | evaluate engines

## #Shipped
### Onboarding
Welcome flow.
";

    #[test]
    fn test_parse_basic_plan() {
        let board = parse_plan(SAMPLE_PLAN);
        assert_eq!(board.columns.len(), KNOWN_STATUSES.len() + 1);

        let backlog = &board.columns[0];
        assert_eq!(backlog.cards.len(), 2);
        let login = &backlog.cards[0];
        assert_eq!(login.id, "login-page");
        assert_eq!(login.branch.as_deref(), Some("feature/login"));
        assert_eq!(
            login.description.as_deref(),
            Some("Build the login form.\n\nNeeds design review.")
        );
        assert_eq!(
            login.actions(),
            &[
                Action::new("build", "compile the form", "open"),
                Action::new("test", "e2e login", "done"),
            ]
        );

        let dark = &backlog.cards[1];
        assert!(dark.description.is_none());
        assert!(dark.actions.is_none());
        assert!(dark.branch.is_none());
    }

    #[test]
    fn test_known_status_is_case_insensitive() {
        let board = parse_plan(SAMPLE_PLAN);
        let in_progress = &board.columns[2];
        assert_eq!(in_progress.title, "In Progress");
        assert_eq!(in_progress.cards[0].title, "Search");
    }

    #[test]
    fn test_unknown_status_appends_column() {
        let board = parse_plan(SAMPLE_PLAN);
        let shipped = board.columns.last().unwrap();
        assert_eq!(shipped.id, "shipped");
        assert_eq!(shipped.title, "Shipped");
        assert_eq!(shipped.cards[0].description.as_deref(), Some("Welcome flow."));
    }

    #[test]
    fn test_malformed_action_fields_are_empty() {
        let board = parse_plan(SAMPLE_PLAN);
        let search = &board.columns[2].cards[0];
        assert_eq!(search.actions(), &[Action::new("spike", "evaluate engines", "")]);

        assert_eq!(parse_action(" lint "), Action::new("lint", "", ""));
        assert_eq!(
            parse_action(" doc | a | b | draft"),
            Action::new("doc", "a | b", "draft")
        );
        assert_eq!(parse_action(""), Action::default());
    }

    #[test]
    fn test_action_description_with_pipes_roundtrips() {
        let mut board = Board::default();
        let mut card = Card::new("Pipes");
        card.actions = Some(vec![Action::new("run", "grep x | wc -l", "open")]);
        board.columns[0].cards.push(card);

        let reparsed = parse_plan(&generate_plan(&board));
        assert_eq!(reparsed, board);
    }

    #[test]
    fn test_empty_branch_is_absent() {
        let board = parse_plan("## #Ready\n### Task\ngit-branch: \n### Other\ngit-branch:\n");
        assert!(board.columns[1].cards[0].branch.is_none());
        assert!(board.columns[1].cards[1].branch.is_none());
        assert!(board.columns[1].cards[1].description.is_none());
        assert_eq!(parse_plan(&generate_plan(&board)), board);
    }

    #[test]
    fn test_card_before_column_is_dropped() {
        let board = parse_plan("### Stray\nsome text\n## #Done\n### Kept\n");
        assert_eq!(board.cards().count(), 1);
        assert_eq!(board.columns[5].cards[0].title, "Kept");
    }

    #[test]
    fn test_empty_document_is_default_board() {
        assert_eq!(parse_plan(""), Board::default());
        assert_eq!(parse_plan(&empty_plan()), Board::default());
    }

    #[test]
    fn test_crlf_input() {
        let board = parse_plan("## #Ready\r\n### Task\r\ngit-branch: fix\r\n");
        assert_eq!(board.columns[1].cards[0].branch.as_deref(), Some("fix"));
    }

    #[test]
    fn test_roundtrip() {
        let board = parse_plan(SAMPLE_PLAN);
        let regenerated = generate_plan(&board);
        let reparsed = parse_plan(&regenerated);
        assert_eq!(board, reparsed);
        assert_eq!(generate_plan(&reparsed), regenerated);
    }

    #[test]
    fn test_generate_layout() {
        let mut board = Board::default();
        let mut card = Card::new("Login page");
        card.branch = Some("feature/login".to_string());
        card.description = Some("Form".to_string());
        card.actions = Some(vec![Action::new("build", "x", "open")]);
        card.has_doc = true;
        board.columns[0].cards.push(card);

        let text = generate_plan(&board);
        assert!(text.starts_with("# Feature Plan\n\n## #Backlog\n### Login page\n"));
        assert!(text.contains("git-branch: feature/login\nForm\n> build | x | open\n\n## #Ready"));
        assert!(text.ends_with("## #Blocked\n"));
        assert!(!text.contains("hasDoc"));

        let reparsed = parse_plan(&text);
        assert!(!reparsed.columns[0].cards[0].has_doc);
    }

    #[test]
    fn test_description_with_reserved_prefix_is_misread() {
        let mut board = Board::default();
        let mut card = Card::new("Notes");
        card.description = Some("> quoted text".to_string());
        board.columns[0].cards.push(card);

        let reparsed = parse_plan(&generate_plan(&board));
        let notes = &reparsed.columns[0].cards[0];
        assert!(notes.description.is_none());
        assert_eq!(notes.actions().len(), 1);
    }
}
