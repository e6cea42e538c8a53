//! reqwest-backed [`HostingApi`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::types::{ApiErrorBody, Comment, Issue, NewPullRequest, PullRequest, Repository};
use super::HostingApi;
use crate::error::HostingError;

/// GitHub REST API base URL.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GitHubClient {
    http_client: Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Creates a client against `api_base`, authenticating with `token` when
    /// one is given.
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Result<Self, HostingError> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("xwgit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HostingError::RequestFailed(e.to_string()))?;

        Ok(Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, HostingError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self
            .authorize(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| HostingError::RequestFailed(e.to_string()))?;
        decode(response, path).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, HostingError> {
        let url = self.url(path);
        debug!(%url, "POST");
        let response = self
            .authorize(self.http_client.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| HostingError::RequestFailed(e.to_string()))?;
        decode(response, path).await
    }
}

#[async_trait]
impl HostingApi for GitHubClient {
    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, HostingError> {
        self.get_json(&format!("repos/{}/{}", owner, repo)).await
    }

    async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, HostingError> {
        self.get_json(&format!("repos/{}/{}/issues/{}", owner, repo, number))
            .await
    }

    async fn list_issue_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Comment>, HostingError> {
        self.get_json(&format!(
            "repos/{}/{}/issues/{}/comments?per_page=100",
            owner, repo, number
        ))
        .await
    }

    async fn add_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<Comment, HostingError> {
        self.post_json(
            &format!("repos/{}/{}/issues/{}/comments", owner, repo, number),
            &serde_json::json!({ "body": body }),
        )
        .await
    }

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, HostingError> {
        self.post_json(&format!("repos/{}/{}/pulls", owner, repo), pull)
            .await
    }
}

async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, HostingError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| HostingError::RequestFailed(e.to_string()))?;

    if !status.is_success() {
        return Err(status_error(status, &text, path));
    }
    serde_json::from_str(&text).map_err(|e| HostingError::ParseError(e.to_string()))
}

/// Maps a non-2xx response to a [`HostingError`], preferring the API's own
/// `message` over the raw body.
pub(crate) fn status_error(status: StatusCode, body: &str, path: &str) -> HostingError {
    match status {
        StatusCode::UNAUTHORIZED => HostingError::Unauthorized,
        StatusCode::NOT_FOUND => HostingError::NotFound(path.to_string()),
        _ => {
            let message = serde_json::from_str::<ApiErrorBody>(body)
                .map(|b| b.message)
                .unwrap_or_else(|_| body.trim().to_string());
            HostingError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "", "repos/o/r"),
            HostingError::Unauthorized
        ));
        match status_error(StatusCode::NOT_FOUND, "", "repos/o/r/issues/9") {
            HostingError::NotFound(path) => assert_eq!(path, "repos/o/r/issues/9"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_status_error_uses_api_message() {
        let body = r#"{"message": "Validation Failed", "errors": []}"#;
        match status_error(StatusCode::UNPROCESSABLE_ENTITY, body, "repos/o/r/pulls") {
            HostingError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Validation Failed");
            }
            other => panic!("unexpected {other:?}"),
        }

        match status_error(StatusCode::BAD_GATEWAY, " upstream down \n", "x") {
            HostingError::Api { message, .. } => assert_eq!(message, "upstream down"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_url_joining() {
        let client = GitHubClient::new("https://ghe.example.com/api/v3/", None).expect("client");
        assert_eq!(client.api_base(), "https://ghe.example.com/api/v3");
        assert_eq!(
            client.url("/repos/o/r"),
            "https://ghe.example.com/api/v3/repos/o/r"
        );
        assert!(!client.has_token());
    }
}
