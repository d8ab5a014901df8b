/// Per-card audit log.
///
/// One markdown file per card id under the logs directory:
///
///   # Log: <card title>
///
///   ## 2026-01-31 09:15:02 — User (alice)
///   - Status changed: `Backlog` → `Ready`
///
/// Blocks are appended oldest-first and read back newest-first. Writing
/// never fails the caller: errors are logged and dropped.

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::storage::local::atomic_write;
use crate::types::LogEntry;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const HEADER_SEPARATOR: &str = " — ";

/// File name used for per-card files (logs and artifacts). Path separators in
/// the id are flattened so an id can never escape its directory.
pub fn card_file_name(card_id: &str) -> String {
    let stem: String = card_id
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{}.md", stem)
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Render one appended block, leading newline included.
pub fn format_block(timestamp: &str, actor: &str, entries: &[String]) -> String {
    let mut block = format!("\n## {}{}{}\n", timestamp, HEADER_SEPARATOR, actor);
    for entry in entries {
        block.push_str("- ");
        block.push_str(entry);
        block.push('\n');
    }
    block
}

fn parse_block(header: &str, body: &[&str]) -> Option<LogEntry> {
    let rest = header.strip_prefix("## ")?;
    let (timestamp, actor) = rest.split_once(HEADER_SEPARATOR)?;
    if timestamp.is_empty() || actor.is_empty() {
        return None;
    }

    let items: Vec<String> = body
        .iter()
        .filter_map(|line| line.strip_prefix("- "))
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    if items.is_empty() {
        return None;
    }

    Some(LogEntry {
        timestamp: timestamp.to_string(),
        actor: actor.trim_end().to_string(),
        items,
    })
}

/// Parse a log file into entries, newest first. Blocks without list items
/// are skipped.
pub fn parse_log(content: &str) -> Vec<LogEntry> {
    let content = content.replace("\r\n", "\n");
    let mut entries = Vec::new();
    let mut header: Option<&str> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in content.split('\n') {
        if line.starts_with("## ") {
            if let Some(h) = header.take() {
                entries.extend(parse_block(h, &body));
            }
            header = Some(line);
            body.clear();
        } else if header.is_some() {
            body.push(line);
        }
    }
    if let Some(h) = header {
        entries.extend(parse_block(h, &body));
    }

    entries.reverse();
    entries
}

/// Append-only store of per-card change logs rooted at one directory.
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn log_path(&self, card_id: &str) -> PathBuf {
        self.dir.join(card_file_name(card_id))
    }

    /// Append a block stamped with the current UTC time. No-op when `entries`
    /// is empty. Failures are logged, never returned.
    pub async fn append(&self, card_id: &str, card_title: &str, actor: &str, entries: &[String]) {
        self.append_at(Utc::now(), card_id, card_title, actor, entries)
            .await;
    }

    pub async fn append_at(
        &self,
        at: DateTime<Utc>,
        card_id: &str,
        card_title: &str,
        actor: &str,
        entries: &[String],
    ) {
        if entries.is_empty() {
            return;
        }
        if let Err(e) = self.try_append(at, card_id, card_title, actor, entries).await {
            log::warn!(
                "[planboard.audit.append] Failed to log {} entries for card {}: {}",
                entries.len(),
                card_id,
                e
            );
        }
    }

    async fn try_append(
        &self,
        at: DateTime<Utc>,
        card_id: &str,
        card_title: &str,
        actor: &str,
        entries: &[String],
    ) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.log_path(card_id);

        let mut content = match tokio::fs::read_to_string(&path).await {
            Ok(existing) => existing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => format!("# Log: {}\n", card_title),
            Err(e) => return Err(e),
        };
        content.push_str(&format_block(&format_timestamp(at), actor, entries));

        atomic_write(&path, &content).await?;
        log::debug!(
            "[planboard.audit.append] {} entries for card {} by {}",
            entries.len(),
            card_id,
            actor
        );
        Ok(())
    }

    /// Read a card's log, newest first. A missing or unreadable file yields
    /// an empty list.
    pub async fn read(&self, card_id: &str) -> Vec<LogEntry> {
        let path = self.log_path(card_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => parse_log(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                log::warn!("[planboard.audit.read] Failed to read {:?}: {}", path, e);
                Vec::new()
            }
        }
    }

    /// Move a card's log to a new id after a rename. Leaves both files alone
    /// when the target already has a log. Best effort, like appends.
    pub async fn rename(&self, old_id: &str, new_id: &str) {
        if old_id == new_id {
            return;
        }
        let from = self.log_path(old_id);
        let to = self.log_path(new_id);

        if tokio::fs::try_exists(&to).await.unwrap_or(false) {
            log::warn!(
                "[planboard.audit.rename] Log for {} already exists, keeping {} separate",
                new_id,
                old_id
            );
            return;
        }
        match tokio::fs::rename(&from, &to).await {
            Ok(()) => log::info!("[planboard.audit.rename] Moved log {} -> {}", old_id, new_id),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "[planboard.audit.rename] Failed to move log {} -> {}: {}",
                old_id,
                new_id,
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn entries(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_format_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(format_timestamp(at), "2026-03-04 05:06:07");
    }

    #[test]
    fn test_parse_log_newest_first() {
        let content = "# Log: Search\n\
                       \n## 2026-01-01 10:00:00 — User (alice)\n- a\n- b\n\
                       \n## 2026-01-02 10:00:00 — External\n- c\n";
        let parsed = parse_log(content);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].actor, "External");
        assert_eq!(parsed[0].items, vec!["c"]);
        assert_eq!(parsed[1].timestamp, "2026-01-01 10:00:00");
        assert_eq!(parsed[1].actor, "User (alice)");
        assert_eq!(parsed[1].items, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_log_skips_empty_and_malformed_blocks() {
        let content = "# Log: X\n\n## no separator here\n- lost\n\n## 2026-01-01 00:00:00 — Bot\nplain text\n-\n";
        assert!(parse_log(content).is_empty());
    }

    #[test]
    fn test_card_file_name_flattens_separators() {
        assert_eq!(card_file_name("feature/login"), "feature_login.md");
        assert_eq!(card_file_name("search"), "search.md");
    }

    #[tokio::test]
    async fn test_append_then_read() {
        let tmp = TempDir::new().unwrap();
        let log = AuditLog::new(tmp.path().join("logs"));

        log.append("search", "Search", "User (alice)", &entries(&["a", "b"]))
            .await;
        let read = log.read("search").await;
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].items, vec!["a", "b"]);
        assert_eq!(read[0].actor, "User (alice)");

        log.append("search", "Search", "External", &entries(&["c"])).await;
        let read = log.read("search").await;
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].items, vec!["c"]);
        assert_eq!(read[1].items, vec!["a", "b"]);

        let raw = std::fs::read_to_string(log.log_path("search")).unwrap();
        assert!(raw.starts_with("# Log: Search\n\n## "));
    }

    #[tokio::test]
    async fn test_append_exact_block() {
        let tmp = TempDir::new().unwrap();
        let log = AuditLog::new(tmp.path());
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();

        log.append_at(at, "deploy", "Deploy", "User (bob)", &entries(&["x"]))
            .await;
        let raw = std::fs::read_to_string(log.log_path("deploy")).unwrap();
        assert_eq!(raw, "# Log: Deploy\n\n## 2026-01-02 03:04:05 — User (bob)\n- x\n");
    }

    #[tokio::test]
    async fn test_empty_entries_is_noop() {
        let tmp = TempDir::new().unwrap();
        let log = AuditLog::new(tmp.path().join("logs"));
        log.append("search", "Search", "User (alice)", &[]).await;
        assert!(!tmp.path().join("logs").exists());
    }

    #[tokio::test]
    async fn test_missing_log_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let log = AuditLog::new(tmp.path());
        assert!(log.read("nothing").await.is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_location_is_swallowed() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("logs");
        std::fs::write(&blocker, "not a directory").unwrap();

        let log = AuditLog::new(&blocker);
        log.append("search", "Search", "User (alice)", &entries(&["a"]))
            .await;
        assert!(log.read("search").await.is_empty());
    }

    #[tokio::test]
    async fn test_rename_moves_log() {
        let tmp = TempDir::new().unwrap();
        let log = AuditLog::new(tmp.path());
        log.append("search", "Search", "User (alice)", &entries(&["a"]))
            .await;

        log.rename("search", "search-bar").await;
        assert!(log.read("search").await.is_empty());
        assert_eq!(log.read("search-bar").await[0].items, vec!["a"]);
    }
}
