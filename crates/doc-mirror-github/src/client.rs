use base64::Engine;
use reqwest::{StatusCode, Url};

use doc_mirror::{
    Blob, ChangedFile, CommitInfo, EntryKind, FetchOutcome, Headers, RemoteEntry, RemoteError,
    RemoteRepository, RepoLocation,
};

use crate::commit::{CommitResponse, CompareResponse};
use crate::content::{ContentFile, ContentsResponse};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "doc-mirror";

/// Configuration for the GitHub transport.
#[derive(Debug, Clone, Default)]
pub struct GitHubConfig {
    pub token: Option<String>,
    /// Override for GitHub Enterprise or tests.
    pub api_base_url: Option<String>,
}

/// GitHub REST transport for the remote repository capability.
pub struct GitHubClient {
    config: GitHubConfig,
    client: reqwest::Client,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_base(&self) -> &str {
        self.config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
    }

    /// `{api}/repos/{owner}/{repo}/{segments...}`, each segment escaped.
    fn repo_url<'a>(
        &self,
        location: &RepoLocation,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, RemoteError> {
        let mut url = Url::parse(self.api_base())
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {e}", self.api_base())))?;

        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(format!("{} cannot be a base", self.api_base())))?
            .pop_if_empty()
            .extend(["repos", location.owner.as_str(), location.repo.as_str()])
            .extend(segments);

        Ok(url)
    }

    fn contents_url(&self, location: &RepoLocation, path: &str) -> Result<Url, RemoteError> {
        let segments = std::iter::once("contents").chain(path.split('/').filter(|s| !s.is_empty()));
        let mut url = self.repo_url(location, segments)?;
        url.query_pairs_mut().append_pair("ref", &location.git_ref);
        Ok(url)
    }

    fn build_request(&self, url: Url) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json");

        if let Some(token) = &self.config.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        req
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        req.send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))
    }

    /// Map 404 and other non-success statuses to errors. 304 passes through.
    async fn check(
        &self,
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(what.to_owned()));
        }
        if !status.is_success() && status != StatusCode::NOT_MODIFIED {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".into());
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    fn decode_content(&self, file: &ContentFile) -> Result<Option<Vec<u8>>, RemoteError> {
        let Some(encoded) = file.content.as_deref().filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        if file.encoding.as_deref().is_some_and(|e| e != "base64") {
            return Ok(None);
        }

        // GitHub returns base64 with newlines embedded
        let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

        base64::engine::general_purpose::STANDARD
            .decode(&cleaned)
            .map(Some)
            .map_err(|e| RemoteError::Parse(format!("base64 decode failed for {}: {e}", file.path)))
    }

    /// Large files are not inlined by the Contents API; fetch them raw.
    async fn download(&self, file: &ContentFile) -> Result<Vec<u8>, RemoteError> {
        let url = file
            .download_url
            .as_deref()
            .ok_or_else(|| RemoteError::Parse(format!("no content for {}", file.path)))?;
        let url = Url::parse(url).map_err(|e| RemoteError::InvalidUrl(format!("{url}: {e}")))?;

        let response = self.send(self.build_request(url)).await?;
        let response = self.check(response, &file.path).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

fn validators(response: &reqwest::Response) -> Headers {
    let mut headers = Headers::new();
    for name in [doc_mirror::cache::ETAG, doc_mirror::cache::LAST_MODIFIED] {
        if let Some(value) = response.headers().get(name).and_then(|v| v.to_str().ok()) {
            headers.insert(name, value);
        }
    }
    headers
}

#[async_trait::async_trait]
impl RemoteRepository for GitHubClient {
    async fn list_children(
        &self,
        location: &RepoLocation,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, RemoteError> {
        let url = self.contents_url(location, path)?;
        tracing::debug!(%url, "listing directory");

        let response = self.send(self.build_request(url)).await?;
        let response = self.check(response, path).await?;

        let listing: ContentsResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;

        let ContentsResponse::Directory(items) = listing else {
            return Err(RemoteError::NotFound(format!("{path} is not a directory")));
        };

        Ok(items
            .into_iter()
            .map(|item| RemoteEntry {
                kind: match item.item_type.as_str() {
                    "file" => EntryKind::File,
                    "dir" => EntryKind::Directory,
                    _ => EntryKind::Other,
                },
                path: item.path,
                sha: item.sha,
                size: item.size,
            })
            .collect())
    }

    async fn fetch_blob(
        &self,
        location: &RepoLocation,
        path: &str,
        headers: &Headers,
    ) -> Result<FetchOutcome, RemoteError> {
        let url = self.contents_url(location, path)?;
        tracing::debug!(%url, conditional = !headers.is_empty(), "fetching file");

        let mut req = self.build_request(url);
        for (name, value) in headers.iter() {
            req = req.header(name, value);
        }

        let response = self.send(req).await?;
        let response = self.check(response, path).await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }

        let response_headers = validators(&response);
        let contents: ContentsResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;

        let ContentsResponse::File(file) = contents else {
            return Err(RemoteError::Parse(format!("{path} is a directory")));
        };

        let bytes = match self.decode_content(&file)? {
            Some(bytes) => bytes,
            None => self.download(&file).await?,
        };

        Ok(FetchOutcome::Fetched(Blob {
            bytes,
            headers: response_headers,
        }))
    }

    async fn latest_commit(&self, location: &RepoLocation) -> Result<CommitInfo, RemoteError> {
        let url = self.repo_url(location, ["commits", location.git_ref.as_str()])?;

        let response = self.send(self.build_request(url)).await?;
        let response = self.check(response, &location.git_ref).await?;

        let commit: CommitResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;

        Ok(CommitInfo {
            sha: commit.sha,
            date: commit.commit.committer.and_then(|c| c.date),
        })
    }

    async fn compare_commits(
        &self,
        location: &RepoLocation,
        base: &str,
        head: &str,
    ) -> Result<Vec<ChangedFile>, RemoteError> {
        let range = format!("{base}...{head}");
        let url = self.repo_url(location, ["compare", range.as_str()])?;

        let response = self.send(self.build_request(url)).await?;
        let response = self.check(response, &range).await?;

        let compare: CompareResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;

        Ok(compare.files.into_iter().map(ChangedFile::from).collect())
    }
}
