//! SystemGit against real repositories on disk.

use std::path::Path;
use std::process::Command;

use githooks_utils_git::{GitCommands, GitError, SystemGit};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args([
            "-c",
            "user.name=githooks",
            "-c",
            "user.email=githooks@example.com",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap()
        .status;
    assert!(status.success(), "git {:?} failed", args);
}

/// A bare "origin" and a clone with one commit on main.
fn setup() -> (TempDir, std::path::PathBuf) {
    let temp = TempDir::new().unwrap();
    let remote = temp.path().join("remote.git");
    let work = temp.path().join("work");
    std::fs::create_dir_all(&remote).unwrap();
    std::fs::create_dir_all(&work).unwrap();

    git(&remote, &["init", "--bare"]);
    git(&work, &["init"]);
    git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    std::fs::write(work.join("README"), "hello\n").unwrap();
    git(&work, &["add", "README"]);
    git(&work, &["commit", "-m", "initial"]);
    git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
    git(&work, &["push", "origin", "main"]);

    (temp, work)
}

#[tokio::test]
async fn test_create_push_and_probe() {
    if !git_available() {
        return;
    }
    let (_temp, work) = setup();
    let git = SystemGit::new(&work);

    assert!(git.is_git_repo().await);
    assert_eq!(git.current_branch().await.as_deref(), Some("main"));
    assert!(git.local_branch_exists("main").await.unwrap());
    assert!(!git.local_branch_exists("feature/x").await.unwrap());
    assert!(!git.remote_branch_exists("origin", "feature/x").await.unwrap());

    let created = git.create_branch("feature/x", Some("main")).await.unwrap();
    assert!(created.success(), "{}", created.combined());
    assert!(git.local_branch_exists("feature/x").await.unwrap());
    assert_eq!(git.current_branch().await.as_deref(), Some("feature/x"));

    let pushed = git.push_branch("origin", "feature/x").await.unwrap();
    assert!(pushed.success(), "{}", pushed.combined());
    assert!(git.remote_branch_exists("origin", "feature/x").await.unwrap());

    let back = git.checkout("main").await.unwrap();
    assert!(back.success());
}

#[tokio::test]
async fn test_unknown_remote_is_command_error() {
    if !git_available() {
        return;
    }
    let (_temp, work) = setup();
    let git = SystemGit::new(&work);

    let err = git
        .remote_branch_exists("no-such-remote", "main")
        .await
        .unwrap_err();
    assert!(matches!(err, GitError::Command { .. }));

    let push = git.push_branch("no-such-remote", "main").await.unwrap();
    assert!(!push.success());
}

#[tokio::test]
async fn test_outside_a_repository() {
    if !git_available() {
        return;
    }
    let temp = TempDir::new().unwrap();
    let git = SystemGit::new(temp.path());
    assert!(!git.is_git_repo().await);
    assert_eq!(git.current_branch().await, None);
}
