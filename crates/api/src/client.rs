//! Deploy API client.
//!
//! Async HTTP client using `reqwest`, authenticated with an OIDC identity
//! token sent as `Authorization: GitHubOIDC <token>`.

use std::time::Duration;

use edgedeploy_protocol::constants::{
    AUTH_SCHEME, FILE_FIELD, NDJSON_CONTENT_TYPE, PROGRESS_CHANNEL_CAPACITY, REQUEST_FIELD,
    deploy_path, negotiate_path,
};
use edgedeploy_protocol::{ApiErrorBody, DeployRequest, Digest, Manifest, NegotiateResponse};
use edgedeploy_push::{DeployApi, ProgressStream, RemoteError, RemoteFuture};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::ndjson;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("edgedeploy/", env!("CARGO_PKG_VERSION"));

/// Deploy API client bound to one origin and one token.
pub struct ApiClient {
    http: reqwest::Client,
    origin: Url,
}

impl ApiClient {
    /// Creates a client for `origin` authenticated with `token`.
    pub fn new(origin: &str, token: &str) -> Result<Self, ApiError> {
        let origin = Url::parse(origin).map_err(|e| ApiError::InvalidUrl {
            url: origin.to_string(),
            message: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("{AUTH_SCHEME} {token}"))
            .map_err(|_| ApiError::InvalidToken)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self { http, origin })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.origin.join(path).map_err(|e| ApiError::InvalidUrl {
            url: format!("{}{path}", self.origin),
            message: e.to_string(),
        })
    }

    /// Posts the manifest and returns the digests the remote lacks.
    pub async fn negotiate(
        &self,
        project_id: &str,
        manifest: &Manifest,
    ) -> Result<Vec<Digest>, ApiError> {
        let url = self.endpoint(&negotiate_path(project_id))?;
        debug!(%url, assets = manifest.len(), "negotiating assets");

        let resp = self.http.post(url).json(manifest).send().await?;
        let resp = check_status(resp).await?;
        let needed: NegotiateResponse = serde_json::from_slice(&resp.bytes().await?)?;
        needed
            .into_iter()
            .map(|hex| Digest::from_hex(hex).map_err(ApiError::from))
            .collect()
    }

    /// Starts a deployment and returns its progress stream.
    ///
    /// The body is multipart: the JSON request first, then one part per file
    /// in the given order.
    pub async fn push(
        &self,
        project_id: &str,
        request: &DeployRequest,
        files: Vec<Vec<u8>>,
    ) -> Result<ProgressStream, ApiError> {
        let url = self.endpoint(&deploy_path(project_id))?;
        debug!(%url, files = files.len(), "pushing deployment");

        let resp = self
            .http
            .post(url)
            .header(ACCEPT, NDJSON_CONTENT_TYPE)
            .multipart(multipart_body(request, files)?)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        tokio::spawn(ndjson::pump(Box::pin(resp.bytes_stream()), tx));
        Ok(rx)
    }
}

fn multipart_body(request: &DeployRequest, files: Vec<Vec<u8>>) -> Result<Form, ApiError> {
    let mut form = Form::new().text(REQUEST_FIELD, serde_json::to_string(request)?);
    for data in files {
        form = form.part(FILE_FIELD, Part::bytes(data).file_name("blob"));
    }
    Ok(form)
}

/// Converts a non-2xx response into [`ApiError::Api`].
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(error_from_body(status.as_u16(), &body))
}

fn error_from_body(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if !parsed.message.is_empty() || !parsed.code.is_empty() => ApiError::Api {
            status,
            code: parsed.code,
            message: parsed.message,
        },
        _ => ApiError::Api {
            status,
            code: String::new(),
            message: body.trim().to_string(),
        },
    }
}

impl DeployApi for ApiClient {
    fn negotiate_assets<'a>(
        &'a self,
        project_id: &'a str,
        manifest: &'a Manifest,
    ) -> RemoteFuture<'a, Vec<Digest>> {
        Box::pin(async move {
            self.negotiate(project_id, manifest)
                .await
                .map_err(RemoteError::from)
        })
    }

    fn push_deploy<'a>(
        &'a self,
        project_id: &'a str,
        request: &'a DeployRequest,
        files: Vec<Vec<u8>>,
    ) -> RemoteFuture<'a, ProgressStream> {
        Box::pin(async move {
            self.push(project_id, request, files)
                .await
                .map_err(RemoteError::from)
        })
    }
}
