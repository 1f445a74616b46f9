//! edgedeploy action entry point.

mod config;
mod outputs;

use std::future::Future;
use std::process::ExitCode;

use anyhow::Context;
use edgedeploy_api::{ApiClient, GithubOidc, audience_for};
use edgedeploy_push::{DeployConfig, DeployEvent, DeployOutcome, DeployRunner};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{ActionConfig, FileConfig, read_event_context};
use crate::outputs::write_outputs;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<DeployOutcome> {
    let lookup = |name: &str| std::env::var(name).ok();

    let process_cwd = std::env::current_dir().context("failed to read current directory")?;
    let config = ActionConfig::from_lookup(lookup, &process_cwd)?;
    info!("Project: {}", config.project);

    let cwd = config
        .cwd
        .canonicalize()
        .with_context(|| format!("working directory {} not found", config.cwd.display()))?;
    let file_config = FileConfig::load(&cwd)?;
    let event_context = read_event_context(config.event_path.as_deref())?;
    let deploy_config = config.deploy_config(cwd, file_config, event_context);

    let mut runner = DeployRunner::new();
    let audience = audience_for(&config.origin, &config.project);
    let token = authorize(&runner, &deploy_config, move || async move {
        GithubOidc::from_lookup(lookup)?
            .fetch(&audience)
            .await
            .context("failed to obtain identity token")
    })
    .await?;
    let client = ApiClient::new(&config.origin, &token)?;

    let mut events = runner
        .take_events()
        .context("deploy event receiver already taken")?;

    let cancel = runner.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling deployment");
            cancel.cancel();
        }
    });

    let run = runner.run(&client, &deploy_config);
    tokio::pin!(run);
    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            Some(event) = events.recv() => report(&event),
        }
    };
    while let Ok(event) = events.try_recv() {
        report(&event);
    }

    let outcome = result?;
    write_outputs(
        config.output_path.as_deref(),
        &[
            ("deployment-id", &outcome.deployment_id),
            ("url", &outcome.url),
        ],
    )?;
    Ok(outcome)
}

/// Checks the entrypoint, then fetches a token with `fetch_token`.
///
/// A bad entrypoint never costs a token request.
async fn authorize<F, Fut>(
    runner: &DeployRunner,
    config: &DeployConfig,
    fetch_token: F,
) -> anyhow::Result<String>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<String>>,
{
    let entrypoint = runner.preflight(config)?;
    info!("Entrypoint: {}", entrypoint.url);
    fetch_token().await
}

/// Prints the user-facing progress line for an event.
fn report(event: &DeployEvent) {
    match event {
        DeployEvent::Resolved { url } => tracing::debug!(%url, "entrypoint resolved"),
        DeployEvent::Discovered { assets } => tracing::debug!("Discovered {assets} assets"),
        DeployEvent::Negotiated { files, total_bytes } => {
            info!("Uploading {files} file(s) (total {total_bytes} bytes)");
        }
        DeployEvent::Uploading { files, percent } => {
            info!("Uploading {files} asset(s) ({percent:.1}%)");
        }
        DeployEvent::Building { percent } => info!("Deploying... ({percent:.1}%)"),
        DeployEvent::Finishing => info!("Finishing deployment..."),
        DeployEvent::Completed { deployment } => {
            info!("Deployment complete.");
            info!("View at:");
            for url in deployment.urls() {
                info!(" - {url}");
            }
        }
        // The error itself is reported by `main`.
        DeployEvent::Failed { .. } => {}
    }
}
