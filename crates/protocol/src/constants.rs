/// Origin used when `DEPLOY_API_ENDPOINT` is not set.
pub const DEFAULT_ORIGIN: &str = "https://dash.deno.com";

/// Synthetic root that local entrypoints are rewritten under.
///
/// The remote mounts the uploaded tree here, so `./main.ts` inside the
/// working tree becomes `file:///src/main.ts`.
pub const VIRTUAL_ROOT: &str = "file:///src";

/// Authorization scheme prefix for OIDC-authenticated requests.
pub const AUTH_SCHEME: &str = "GitHubOIDC";

/// Content type of the progress stream.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Multipart field carrying the JSON deploy request.
pub const REQUEST_FIELD: &str = "request";

/// Multipart field carrying each uploaded file.
pub const FILE_FIELD: &str = "file";

/// Capacity of the bounded progress event channel.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Path of the asset negotiation endpoint for a project.
pub fn negotiate_path(project_id: &str) -> String {
    format!("/api/projects/{project_id}/assets/negotiate")
}

/// Path of the deploy push endpoint for a project.
pub fn deploy_path(project_id: &str) -> String {
    format!("/api/projects/{project_id}/deployment_with_assets")
}

/// Path used as the identity token audience for a project.
pub fn audience_path(project_id: &str) -> String {
    format!("/projects/{project_id}")
}
