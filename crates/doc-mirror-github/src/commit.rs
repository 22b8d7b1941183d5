use doc_mirror::{ChangeKind, ChangedFile};
use serde::Deserialize;

/// Response from GitHub's Commits API.
/// `GET /repos/{owner}/{repo}/commits/{ref}`
#[derive(Debug, Deserialize)]
pub struct CommitResponse {
    pub sha: String,
    pub commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
pub struct CommitDetail {
    pub committer: Option<CommitSignature>,
}

#[derive(Debug, Deserialize)]
pub struct CommitSignature {
    pub date: Option<String>,
}

/// Response from GitHub's Compare API.
/// `GET /repos/{owner}/{repo}/compare/{base}...{head}`
#[derive(Debug, Deserialize)]
pub struct CompareResponse {
    #[serde(default)]
    pub files: Vec<CompareFile>,
}

#[derive(Debug, Deserialize)]
pub struct CompareFile {
    pub filename: String,
    pub status: String,
    pub previous_filename: Option<String>,
}

impl From<CompareFile> for ChangedFile {
    fn from(file: CompareFile) -> Self {
        let change = match file.status.as_str() {
            "added" => ChangeKind::Added,
            "removed" => ChangeKind::Removed,
            "renamed" => ChangeKind::Renamed,
            // "modified", "changed", "copied"
            _ => ChangeKind::Modified,
        };

        ChangedFile {
            path: file.filename,
            change,
            previous_path: file.previous_filename,
        }
    }
}
