use serde::Deserialize;

/// Response from GitHub's Contents API.
/// `GET /repos/{owner}/{repo}/contents/{path}?ref={ref}`
///
/// A directory comes back as an array of items, a file as a single object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ContentsResponse {
    Directory(Vec<ContentItem>),
    File(ContentFile),
}

/// One child in a directory listing.
#[derive(Debug, Deserialize)]
pub struct ContentItem {
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    /// `file`, `dir`, `symlink` or `submodule`.
    #[serde(rename = "type")]
    pub item_type: String,
}

/// A single file with its (base64) content.
#[derive(Debug, Deserialize)]
pub struct ContentFile {
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    pub content: Option<String>,
    pub encoding: Option<String>,
    /// Raw download location. Used when the file is too large to inline.
    pub download_url: Option<String>,
}
