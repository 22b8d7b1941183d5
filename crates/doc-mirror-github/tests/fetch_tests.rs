use base64::Engine;
use doc_mirror::{FetchOutcome, Headers, RemoteError, RemoteRepository, RepoLocation};
use doc_mirror_github::{GitHubClient, GitHubConfig};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, token: Option<&str>) -> GitHubClient {
    GitHubClient::new(GitHubConfig {
        token: token.map(str::to_owned),
        api_base_url: Some(server.uri()),
    })
}

fn location() -> RepoLocation {
    RepoLocation {
        owner: "test-owner".into(),
        repo: "test-repo".into(),
        git_ref: "main".into(),
    }
}

fn file_body(path: &str, content: &str) -> serde_json::Value {
    // GitHub wraps base64 at 60 columns.
    let encoded = base64::engine::general_purpose::STANDARD.encode(content);
    let wrapped: Vec<String> = encoded
        .as_bytes()
        .chunks(60)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();

    serde_json::json!({
        "name": path.rsplit('/').next().unwrap(),
        "path": path,
        "sha": "3d21ec53a331a6f037a91c368710b99387d012c1",
        "size": content.len(),
        "type": "file",
        "content": wrapped.join("\n"),
        "encoding": "base64",
        "download_url": null
    })
}

#[tokio::test]
async fn fetch_decodes_content_and_returns_validators() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/contents/docs/features/accounts.md"))
        .and(query_param("ref", "main"))
        .and(header("User-Agent", "doc-mirror"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"abc123\"")
                .insert_header("Last-Modified", "Tue, 01 Oct 2024 10:00:00 GMT")
                .set_body_json(file_body("docs/features/accounts.md", "# Accounts\n\nManage accounts.\n")),
        )
        .mount(&server)
        .await;

    let outcome = client_for(&server, None)
        .fetch_blob(&location(), "docs/features/accounts.md", &Headers::new())
        .await
        .unwrap();

    let FetchOutcome::Fetched(blob) = outcome else {
        panic!("expected content");
    };
    assert_eq!(blob.bytes, b"# Accounts\n\nManage accounts.\n");
    assert_eq!(blob.headers.get("etag"), Some("\"abc123\""));
    assert_eq!(
        blob.headers.get("last-modified"),
        Some("Tue, 01 Oct 2024 10:00:00 GMT")
    );
}

#[tokio::test]
async fn fetch_sends_conditional_headers_and_maps_304() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/contents/docs/tasks.md"))
        .and(header("If-None-Match", "\"abc123\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let headers = Headers::new().with("If-None-Match", "\"abc123\"");
    let outcome = client_for(&server, None)
        .fetch_blob(&location(), "docs/tasks.md", &headers)
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome::NotModified);
}

#[tokio::test]
async fn fetch_sends_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/contents/README.md"))
        .and(header("Authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_body("README.md", "hi")))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client_for(&server, Some("secret-token"))
        .fetch_blob(&location(), "README.md", &Headers::new())
        .await
        .unwrap();

    assert!(matches!(outcome, FetchOutcome::Fetched(_)));
}

#[tokio::test]
async fn large_files_fall_back_to_download_url() {
    let server = MockServer::start().await;
    let download_url = format!("{}/raw/test-owner/test-repo/main/docs/big.md", server.uri());

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/contents/docs/big.md"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "big.md",
            "path": "docs/big.md",
            "sha": "ffe1",
            "size": 2_000_000,
            "type": "file",
            "content": "",
            "encoding": "none",
            "download_url": download_url,
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/raw/test-owner/test-repo/main/docs/big.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string("# Big\n"))
        .mount(&server)
        .await;

    let outcome = client_for(&server, None)
        .fetch_blob(&location(), "docs/big.md", &Headers::new())
        .await
        .unwrap();

    let FetchOutcome::Fetched(blob) = outcome else {
        panic!("expected content");
    };
    assert_eq!(blob.bytes, b"# Big\n");
}

#[tokio::test]
async fn fetch_returns_not_found_for_404() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/contents/docs/missing.md"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = client_for(&server, None)
        .fetch_blob(&location(), "docs/missing.md", &Headers::new())
        .await;

    assert!(matches!(result, Err(RemoteError::NotFound(_))));
}

#[tokio::test]
async fn fetch_maps_rate_limit_to_status_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/contents/docs/limited.md"))
        .respond_with(
            ResponseTemplate::new(403).set_body_string(r#"{"message":"API rate limit exceeded"}"#),
        )
        .mount(&server)
        .await;

    let result = client_for(&server, None)
        .fetch_blob(&location(), "docs/limited.md", &Headers::new())
        .await;

    match result {
        Err(RemoteError::Status { status, message }) => {
            assert_eq!(status, 403);
            assert!(message.contains("rate limit"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}
