/// Git object-store backend.
///
/// Keeps the plan on a dedicated line (branch) of the repository and never
/// touches the checked-out files or the working index:
/// - reads resolve `<line>^{tree}` and cat the blob at the locator
/// - writes build a commit in an isolated index (GIT_INDEX_FILE) and only
///   become visible when `update-ref` moves the line
/// - `update-ref` is given the expected parent, so a concurrent writer makes
///   the publish fail and the whole pipeline is retried
///
/// Every git invocation captures stderr; a non-zero exit surfaces it as
/// `StorageError::Git`.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{check_locator, DocumentBackend, StorageError};

const MAX_WRITE_ATTEMPTS: usize = 3;
const FILE_MODE: &str = "100644";

/// A commit created by `stage_write` that no ref points at yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
    pub commit: String,
    pub parent: String,
    pub path: String,
}

/// Plan storage on an isolated git line.
#[derive(Debug, Clone)]
pub struct GitBackend {
    repo_root: PathBuf,
    common_dir: PathBuf,
    line: String,
    identity: Option<(String, String)>,
}

/// Locator as a git tree path: forward slashes, no `.` components.
pub fn git_path(locator: &str) -> Result<String, StorageError> {
    let path = check_locator(locator)?;
    let parts: Vec<String> = path
        .iter()
        .map(|c| c.to_string_lossy().into_owned())
        .filter(|c| c != ".")
        .collect();
    if parts.is_empty() {
        return Err(StorageError::InvalidLocator(locator.to_string()));
    }
    Ok(parts.join("/"))
}

impl GitBackend {
    /// Open a backend on the repository containing `repo_root`.
    /// Fails when `repo_root` is not inside a git repository or `line` is not
    /// a valid branch name.
    pub async fn open(repo_root: impl Into<PathBuf>, line: &str) -> Result<Self, StorageError> {
        let repo_root = repo_root.into();
        let mut backend = Self {
            common_dir: repo_root.join(".git"),
            repo_root,
            line: line.to_string(),
            identity: None,
        };

        // Branch refs live in the common dir, which differs from the git dir
        // inside a linked worktree.
        let common_dir = backend.git(&["rev-parse", "--git-common-dir"]).await?;
        let common_dir = backend.repo_root.join(common_dir.trim());
        backend.common_dir = tokio::fs::canonicalize(&common_dir).await?;
        backend
            .git(&["check-ref-format", &backend.ref_name()])
            .await?;
        Ok(backend)
    }

    /// Author and committer used for plan commits instead of the repository
    /// configuration.
    pub fn with_identity(mut self, name: &str, email: &str) -> Self {
        self.identity = Some((name.to_string(), email.to_string()));
        self
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    fn ref_name(&self) -> String {
        format!("refs/heads/{}", self.line)
    }

    async fn git_output(
        &self,
        args: &[&str],
        index: Option<&Path>,
        stdin: Option<&[u8]>,
    ) -> Result<Output, StorageError> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.repo_root)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(index) = index {
            cmd.env("GIT_INDEX_FILE", index);
        }
        if let Some((name, email)) = &self.identity {
            cmd.env("GIT_AUTHOR_NAME", name)
                .env("GIT_AUTHOR_EMAIL", email)
                .env("GIT_COMMITTER_NAME", name)
                .env("GIT_COMMITTER_EMAIL", email);
        }

        let mut child = cmd.spawn()?;
        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input).await?;
            }
        }
        Ok(child.wait_with_output().await?)
    }

    async fn git_with(
        &self,
        args: &[&str],
        index: Option<&Path>,
        stdin: Option<&[u8]>,
    ) -> Result<String, StorageError> {
        let output = self.git_output(args, index, stdin).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            log::warn!(
                "[planboard.storage.git] git {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                stderr
            );
            return Err(StorageError::Git {
                command: args.join(" "),
                stderr,
            });
        }
        String::from_utf8(output.stdout).map_err(|e| {
            StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("git {} output is not valid UTF-8: {}", args.join(" "), e),
            ))
        })
    }

    async fn git(&self, args: &[&str]) -> Result<String, StorageError> {
        self.git_with(args, None, None).await
    }

    /// Resolve a revision, `None` when it does not exist.
    async fn rev_parse_optional(&self, rev: &str) -> Result<Option<String>, StorageError> {
        let args = ["rev-parse", "--verify", "--quiet", rev];
        let output = self.git_output(&args, None, None).await?;
        if output.status.success() {
            return Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ));
        }
        if output.status.code() == Some(1) {
            return Ok(None);
        }
        Err(StorageError::Git {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Current head commit of the line.
    pub async fn head(&self) -> Result<Option<String>, StorageError> {
        self.rev_parse_optional(&self.ref_name()).await
    }

    pub async fn line_exists(&self) -> Result<bool, StorageError> {
        Ok(self.head().await?.is_some())
    }

    /// Create the line with a single empty commit if it does not exist yet.
    /// Returns true when the line was created.
    ///
    /// Built from plumbing only (empty tree, parentless commit, create-only
    /// ref update), so the working tree and index stay untouched. Not
    /// reentrant: two processes initializing the same line race on the final
    /// ref creation and the loser gets a `StorageError::Git`.
    pub async fn ensure_line(&self) -> Result<bool, StorageError> {
        if self.line_exists().await? {
            return Ok(false);
        }

        let empty_tree = self.git_with(&["mktree"], None, Some(b"")).await?;
        let message = format!("chore: init {} line", self.line);
        let commit = self
            .git(&["commit-tree", empty_tree.trim(), "-m", &message])
            .await?;
        self.git(&[
            "update-ref",
            "-m",
            &message,
            &self.ref_name(),
            commit.trim(),
            "",
        ])
        .await?;

        log::info!(
            "[planboard.storage.git] Created line {} at {}",
            self.line,
            commit.trim()
        );
        Ok(true)
    }

    /// Steps 1-6 of a write: blob, tree and commit objects on top of the
    /// current line head. Nothing is visible until `publish`.
    pub async fn stage_write(
        &self,
        locator: &str,
        content: &str,
    ) -> Result<PendingCommit, StorageError> {
        let path = git_path(locator)?;

        let blob = self
            .git_with(&["hash-object", "-w", "--stdin"], None, Some(content.as_bytes()))
            .await?;
        let blob = blob.trim();

        let parent = self
            .head()
            .await?
            .ok_or_else(|| StorageError::LineMissing(self.line.clone()))?;
        let tree = self.git(&["rev-parse", &format!("{}^{{tree}}", parent)]).await?;

        let scratch = tempfile::Builder::new()
            .prefix("planboard-index-")
            .tempdir()?;
        let index = scratch.path().join("index");

        self.git_with(&["read-tree", tree.trim()], Some(&index), None)
            .await?;
        let cacheinfo = format!("{},{},{}", FILE_MODE, blob, path);
        self.git_with(
            &["update-index", "--add", "--cacheinfo", &cacheinfo],
            Some(&index),
            None,
        )
        .await?;
        let new_tree = self.git_with(&["write-tree"], Some(&index), None).await?;

        let message = format!("update {}", path);
        let commit = self
            .git(&["commit-tree", new_tree.trim(), "-p", &parent, "-m", &message])
            .await?;

        Ok(PendingCommit {
            commit: commit.trim().to_string(),
            parent,
            path,
        })
    }

    /// Step 7: move the line to the pending commit if it still points at the
    /// commit's parent. Returns false when another writer moved it first.
    pub async fn publish(&self, pending: &PendingCommit) -> Result<bool, StorageError> {
        let message = format!("planboard: update {}", pending.path);
        let result = self
            .git(&[
                "update-ref",
                "-m",
                &message,
                &self.ref_name(),
                &pending.commit,
                &pending.parent,
            ])
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => match self.head().await? {
                Some(head) if head != pending.parent => {
                    log::warn!(
                        "[planboard.storage.git] Line {} moved to {} before publish of {}",
                        self.line,
                        head,
                        pending.commit
                    );
                    Ok(false)
                }
                _ => Err(err),
            },
        }
    }
}

#[async_trait]
impl DocumentBackend for GitBackend {
    async fn read_document(&self, locator: &str) -> Result<Option<String>, StorageError> {
        let path = git_path(locator)?;
        let Some(tree) = self
            .rev_parse_optional(&format!("{}^{{tree}}", self.ref_name()))
            .await?
        else {
            return Ok(None);
        };

        let listing = self.git(&["ls-tree", &tree, "--", &path]).await?;
        let Some(entry) = listing.lines().next() else {
            return Ok(None);
        };
        // <mode> SP <type> SP <object> TAB <path>
        let meta = entry.split('\t').next().unwrap_or_default();
        let mut fields = meta.split_whitespace();
        let (Some(_mode), Some(kind), Some(object)) = (fields.next(), fields.next(), fields.next())
        else {
            return Ok(None);
        };
        if kind != "blob" {
            log::warn!(
                "[planboard.storage.git] {} on line {} is a {}, not a file",
                path,
                self.line,
                kind
            );
            return Ok(None);
        }

        Ok(Some(self.git(&["cat-file", "blob", object]).await?))
    }

    async fn write_document(&self, locator: &str, content: &str) -> Result<(), StorageError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let pending = self.stage_write(locator, content).await?;
            if self.publish(&pending).await? {
                log::debug!(
                    "[planboard.storage.git] Line {} now at {} (attempt {})",
                    self.line,
                    pending.commit,
                    attempt
                );
                return Ok(());
            }
        }
        Err(StorageError::RefContention {
            line: self.line.clone(),
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    fn watch_target(&self, _locator: &str) -> Option<PathBuf> {
        Some(self.common_dir.join(self.ref_name()))
    }

    fn describe(&self) -> String {
        format!("git:{}@{}", self.line, self.repo_root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PLAN: &str = ".feature/PLAN.md";

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn run(dir: &Path, args: &[&str]) -> String {
        let out = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "git {:?}: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).into_owned()
    }

    fn run_with_stdin(dir: &Path, args: &[&str], input: &[u8]) -> String {
        use std::io::Write;
        let mut child = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        child.stdin.take().unwrap().write_all(input).unwrap();
        let out = child.wait_with_output().unwrap();
        assert!(out.status.success(), "git {:?}", args);
        String::from_utf8_lossy(&out.stdout).into_owned()
    }

    /// Repository with one commit on its default branch, or None without git.
    async fn scratch_repo() -> Option<(TempDir, GitBackend)> {
        if !git_available() {
            eprintln!("git not available, skipping");
            return None;
        }
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        run(dir, &["init", "-q"]);
        run(dir, &["config", "user.name", "Test"]);
        run(dir, &["config", "user.email", "test@localhost"]);
        run(dir, &["config", "commit.gpgsign", "false"]);
        std::fs::write(dir.join("README.md"), "hello\n").unwrap();
        run(dir, &["add", "README.md"]);
        run(dir, &["commit", "-q", "-m", "initial"]);

        let backend = GitBackend::open(dir, "feature-plan")
            .await
            .unwrap()
            .with_identity("planboard", "planboard@localhost");
        Some((tmp, backend))
    }

    #[test]
    fn test_git_path() {
        assert_eq!(git_path("./.feature/PLAN.md").unwrap(), ".feature/PLAN.md");
        assert!(git_path("../PLAN.md").is_err());
        assert!(git_path(".").is_err());
    }

    #[tokio::test]
    async fn test_ensure_line_is_idempotent_and_leaves_worktree() {
        let Some((tmp, backend)) = scratch_repo().await else {
            return;
        };
        let branch_before = run(tmp.path(), &["rev-parse", "--abbrev-ref", "HEAD"]);

        assert!(backend.ensure_line().await.unwrap());
        assert!(!backend.ensure_line().await.unwrap());

        assert_eq!(
            run(tmp.path(), &["rev-parse", "--abbrev-ref", "HEAD"]),
            branch_before
        );
        assert!(run(tmp.path(), &["status", "--porcelain"]).trim().is_empty());
        assert!(tmp.path().join("README.md").exists());
        let files = run(tmp.path(), &["ls-tree", "-r", "--name-only", "feature-plan"]);
        assert!(files.trim().is_empty());
    }

    #[tokio::test]
    async fn test_read_missing() {
        let Some((_tmp, backend)) = scratch_repo().await else {
            return;
        };
        assert!(backend.read_document(PLAN).await.unwrap().is_none());
        backend.ensure_line().await.unwrap();
        assert!(backend.read_document(PLAN).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_without_touching_worktree() {
        let Some((tmp, backend)) = scratch_repo().await else {
            return;
        };
        backend.ensure_line().await.unwrap();

        backend.write_document(PLAN, "# Feature Plan\n").await.unwrap();
        assert_eq!(
            backend.read_document(PLAN).await.unwrap().as_deref(),
            Some("# Feature Plan\n")
        );
        assert!(!tmp.path().join(".feature").exists());
        assert!(run(tmp.path(), &["status", "--porcelain"]).trim().is_empty());

        backend.write_document("notes.md", "notes\n").await.unwrap();
        assert_eq!(
            backend.read_document(PLAN).await.unwrap().as_deref(),
            Some("# Feature Plan\n")
        );
        let log = run(tmp.path(), &["rev-list", "--count", "feature-plan"]);
        assert_eq!(log.trim(), "3");
    }

    #[tokio::test]
    async fn test_unpublished_write_is_invisible() {
        let Some((_tmp, backend)) = scratch_repo().await else {
            return;
        };
        backend.ensure_line().await.unwrap();
        backend.write_document(PLAN, "v1\n").await.unwrap();

        let pending = backend.stage_write(PLAN, "v2\n").await.unwrap();
        assert_eq!(backend.read_document(PLAN).await.unwrap().as_deref(), Some("v1\n"));

        assert!(backend.publish(&pending).await.unwrap());
        assert_eq!(backend.read_document(PLAN).await.unwrap().as_deref(), Some("v2\n"));
    }

    #[tokio::test]
    async fn test_stale_parent_is_rejected() {
        let Some((_tmp, backend)) = scratch_repo().await else {
            return;
        };
        backend.ensure_line().await.unwrap();

        let first = backend.stage_write(PLAN, "first\n").await.unwrap();
        let second = backend.stage_write(PLAN, "second\n").await.unwrap();
        assert_eq!(first.parent, second.parent);

        assert!(backend.publish(&first).await.unwrap());
        assert!(!backend.publish(&second).await.unwrap());
        assert_eq!(
            backend.read_document(PLAN).await.unwrap().as_deref(),
            Some("first\n")
        );

        backend.write_document(PLAN, "second\n").await.unwrap();
        assert_eq!(
            backend.read_document(PLAN).await.unwrap().as_deref(),
            Some("second\n")
        );
    }

    #[tokio::test]
    async fn test_write_without_line_fails() {
        let Some((_tmp, backend)) = scratch_repo().await else {
            return;
        };
        let result = backend.write_document(PLAN, "x\n").await;
        assert!(matches!(result, Err(StorageError::LineMissing(_))));
    }

    #[tokio::test]
    async fn test_open_outside_repo_surfaces_stderr() {
        if !git_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("not-a-repo");
        std::fs::create_dir_all(&dir).unwrap();
        // Stop discovery at the scratch dir so an enclosing repository is not found.
        std::env::set_var("GIT_CEILING_DIRECTORIES", tmp.path());

        match GitBackend::open(&dir, "feature-plan").await {
            Err(StorageError::Git { stderr, .. }) => assert!(!stderr.is_empty()),
            other => panic!("expected git error, got {:?}", other.map(|b| b.describe())),
        }
    }

    #[tokio::test]
    async fn test_watch_target_is_loose_ref() {
        let Some((_tmp, backend)) = scratch_repo().await else {
            return;
        };
        backend.ensure_line().await.unwrap();
        let target = backend.watch_target(PLAN).unwrap();
        assert!(target.ends_with("refs/heads/feature-plan"));
        assert!(target.exists());
    }

    #[tokio::test]
    async fn test_watch_target_from_linked_worktree() {
        let Some((tmp, _backend)) = scratch_repo().await else {
            return;
        };
        let outside = TempDir::new().unwrap();
        let worktree = outside.path().join("wt");
        run(
            tmp.path(),
            &["worktree", "add", "-q", "-b", "wt-branch", worktree.to_str().unwrap()],
        );

        let backend = GitBackend::open(&worktree, "feature-plan")
            .await
            .unwrap()
            .with_identity("planboard", "planboard@localhost");
        backend.ensure_line().await.unwrap();
        backend.write_document(PLAN, "# Feature Plan\n").await.unwrap();

        let target = backend.watch_target(PLAN).unwrap();
        assert!(target.exists(), "{:?} does not exist", target);
        assert_eq!(
            target,
            std::fs::canonicalize(tmp.path().join(".git"))
                .unwrap()
                .join("refs/heads/feature-plan")
        );
    }

    #[tokio::test]
    async fn test_read_rejects_non_utf8_blob() {
        let Some((tmp, backend)) = scratch_repo().await else {
            return;
        };
        let blob = run_with_stdin(tmp.path(), &["hash-object", "-w", "--stdin"], &[0x66, 0xff, 0xfe]);
        let listing = format!("100644 blob {}\tPLAN.md\n", blob.trim());
        let tree = run_with_stdin(tmp.path(), &["mktree"], listing.as_bytes());
        let commit = run(tmp.path(), &["commit-tree", tree.trim(), "-m", "binary"]);
        run(
            tmp.path(),
            &["update-ref", "refs/heads/feature-plan", commit.trim()],
        );

        match backend.read_document("PLAN.md").await {
            Err(StorageError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::InvalidData),
            other => panic!("expected invalid data, got {:?}", other),
        }
    }
}
