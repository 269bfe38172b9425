//! The git collaborator against a throwaway repository.

use std::path::Path;

use git2::{Repository, Signature};
use revu::git::GitHandle;
use revu_core::types::{DiffLineKind, FileStatus};

fn commit_all(repo: &Repository, message: &str) {
    let mut index = repo.index().unwrap();
    index.add_all(["*"], git2::IndexAddOption::DEFAULT, None).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("revu", "revu@example.test").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents).unwrap();
}

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

#[tokio::test]
async fn lists_changes_against_head() {
    let dir = tempfile::TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    write(dir.path(), "plan.md", "one\ntwo\n");
    write(dir.path(), "gone.rs", "fn gone() {}\n");
    commit_all(&repo, "init");

    write(dir.path(), "plan.md", "one\ntwo\nthree\n");
    std::fs::remove_file(dir.path().join("gone.rs")).unwrap();
    write(dir.path(), "fresh.rs", "fn fresh() {}\n");

    let git = GitHandle::spawn(&dir.path().to_string_lossy()).unwrap();
    let mut changed = git.changed_files("HEAD").await.unwrap();
    changed.sort_by(|a, b| a.path.cmp(&b.path));
    let summary: Vec<(&str, FileStatus)> =
        changed.iter().map(|c| (c.path.as_str(), c.status)).collect();
    assert_eq!(
        summary,
        vec![
            ("fresh.rs", FileStatus::Untracked),
            ("gone.rs", FileStatus::Deleted),
            ("plan.md", FileStatus::Modified),
        ]
    );
    let plan = changed.iter().find(|c| c.path == "plan.md").unwrap();
    assert_eq!((plan.added, plan.removed), (1, 0));

    let hunks = git.file_diff("plan.md", "HEAD").await.unwrap();
    assert_eq!(hunks.len(), 1);
    let added: Vec<&str> = hunks[0]
        .lines
        .iter()
        .filter(|l| l.kind == DiffLineKind::Add)
        .map(|l| l.content.as_str())
        .collect();
    assert_eq!(added, vec!["three"]);

    assert!(git.branch_name().await.is_some());
}

#[tokio::test]
async fn unborn_branch_diffs_against_empty_tree() {
    let dir = tempfile::TempDir::new().unwrap();
    Repository::init(dir.path()).unwrap();
    write(dir.path(), "notes.md", "first\n");

    let git = GitHandle::spawn(&dir.path().to_string_lossy()).unwrap();
    let changed = git.changed_files("HEAD").await.unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].path, "notes.md");
    assert_eq!(changed[0].status, FileStatus::Untracked);
}

#[test]
fn spawn_outside_repository_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist");
    assert!(GitHandle::spawn(&missing.to_string_lossy()).is_err());
}
