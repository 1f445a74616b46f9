//! GitHub Actions OIDC identity tokens.
//!
//! The runner exposes a token endpoint through `ACTIONS_ID_TOKEN_REQUEST_URL`
//! and `ACTIONS_ID_TOKEN_REQUEST_TOKEN` when the workflow has the
//! `id-token: write` permission.

use edgedeploy_protocol::constants::audience_path;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::ApiError;

pub const REQUEST_URL_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_URL";
pub const REQUEST_TOKEN_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_TOKEN";

#[derive(Deserialize)]
struct TokenResponse {
    value: String,
}

/// Audience a deploy token must be minted for: `{origin}/projects/{id}`.
pub fn audience_for(origin: &str, project_id: &str) -> String {
    format!(
        "{}{}",
        origin.trim_end_matches('/'),
        audience_path(project_id)
    )
}

/// Fetches identity tokens from the Actions runtime.
pub struct GithubOidc {
    http: reqwest::Client,
    request_url: String,
    request_token: String,
}

impl GithubOidc {
    pub fn new(request_url: impl Into<String>, request_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            request_url: request_url.into(),
            request_token: request_token.into(),
        }
    }

    /// Reads the runner's token endpoint through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let missing = |var: &str| {
            ApiError::Oidc(format!(
                "{var} is not set; the workflow needs `permissions: id-token: write`"
            ))
        };
        let url = lookup(REQUEST_URL_VAR).ok_or_else(|| missing(REQUEST_URL_VAR))?;
        let token = lookup(REQUEST_TOKEN_VAR).ok_or_else(|| missing(REQUEST_TOKEN_VAR))?;
        Ok(Self::new(url, token))
    }

    /// Token endpoint URL with the `audience` query parameter appended.
    pub fn token_url(&self, audience: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.request_url).map_err(|e| ApiError::InvalidUrl {
            url: self.request_url.clone(),
            message: e.to_string(),
        })?;
        url.query_pairs_mut().append_pair("audience", audience);
        Ok(url)
    }

    /// Requests a token for `audience`.
    pub async fn fetch(&self, audience: &str) -> Result<String, ApiError> {
        let url = self.token_url(audience)?;
        debug!(audience, "requesting identity token");

        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.request_token))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Oidc(format!(
                "token endpoint returned {}: {body}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = serde_json::from_slice(&resp.bytes().await?)?;
        if token.value.is_empty() {
            return Err(ApiError::InvalidToken);
        }
        Ok(token.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn audience_joins_origin_and_project() {
        assert_eq!(
            audience_for("https://deploy.example", "p1"),
            "https://deploy.example/projects/p1"
        );
        assert_eq!(
            audience_for("https://deploy.example/", "p1"),
            "https://deploy.example/projects/p1"
        );
    }

    #[test]
    fn token_url_keeps_existing_query() {
        let oidc = GithubOidc::new("https://token.actions.example/t?api-version=2.0", "secret");
        let url = oidc
            .token_url("https://deploy.example/projects/p1")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://token.actions.example/t?api-version=2.0&audience=https%3A%2F%2Fdeploy.example%2Fprojects%2Fp1"
        );
    }

    #[test]
    fn invalid_request_url_is_reported() {
        let oidc = GithubOidc::new("not a url", "secret");
        assert!(matches!(
            oidc.token_url("aud"),
            Err(ApiError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn missing_runtime_variables() {
        let env: HashMap<&str, &str> = HashMap::from([(REQUEST_URL_VAR, "https://t.example")]);
        let err = GithubOidc::from_lookup(|k| env.get(k).map(|v| v.to_string()))
            .err()
            .unwrap();
        assert!(err.to_string().contains(REQUEST_TOKEN_VAR));
    }
}
