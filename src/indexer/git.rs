//! Version-control metadata from the `git` CLI.
//!
//! Everything here is best effort: a directory that is not a repository, or
//! a machine without git installed, yields the repository name only.
use std::path::Path;
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitInfo {
    /// Abbreviated to 8 characters.
    pub sha: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GitInfo {
    pub repo_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_commit: Option<CommitInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

/// Repository name for `root`: its final path component after resolving
/// `.` and symlinks.
pub fn repo_name(root: &Path) -> String {
    let resolved = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| resolved.display().to_string())
}

pub fn probe(root: &Path) -> GitInfo {
    let mut info = GitInfo {
        repo_name: repo_name(root),
        ..Default::default()
    };

    let Some(branch) = git(root, &["rev-parse", "--abbrev-ref", "HEAD"]) else {
        debug!("{} is not a git work tree", root.display());
        return info;
    };
    info.branch = Some(branch);
    info.latest_commit =
        git(root, &["log", "-1", "--format=%H%n%an%n%ct%n%s"]).and_then(|out| parse_commit(&out));
    info.remote_url = git(root, &["remote", "get-url", "origin"]);
    info
}

fn git(root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn parse_commit(output: &str) -> Option<CommitInfo> {
    let mut lines = output.lines();
    let sha = lines.next()?.trim();
    if sha.is_empty() {
        return None;
    }
    let author = lines.next().unwrap_or_default().trim().to_string();
    let date = lines
        .next()
        .and_then(|ts| ts.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    let message = lines.next().unwrap_or_default().trim().to_string();

    Some(CommitInfo {
        sha: sha.chars().take(8).collect(),
        author,
        date,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_commit() {
        let out = "0123456789abcdef0123\nAda Lovelace\n1700000000\nAdd engine\n";
        let commit = parse_commit(out).unwrap();
        assert_eq!(commit.sha, "01234567");
        assert_eq!(commit.author, "Ada Lovelace");
        assert_eq!(commit.date.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(commit.message, "Add engine");
    }

    #[test]
    fn test_parse_commit_tolerates_missing_fields() {
        let commit = parse_commit("abc\n").unwrap();
        assert_eq!(commit.sha, "abc");
        assert!(commit.date.is_none());
        assert!(parse_commit("").is_none());
    }

    #[test]
    fn test_probe_outside_repository() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("plain-project");
        std::fs::create_dir(&project).unwrap();

        let info = probe(&project);
        assert_eq!(info.repo_name, "plain-project");
        assert!(info.latest_commit.is_none());
        assert!(info.remote_url.is_none());
    }
}
