//! Deploy runner: resolve, walk, negotiate, push, and follow progress.
//!
//! Publishes [`DeployEvent`]s for reporting and supports cancellation at
//! every suspension point.

use std::future::Future;

use edgedeploy_assets::{AssetError, ResolvedEntrypoint, WalkOutput, resolve_entrypoint, walk};
use edgedeploy_protocol::{DeployRequest, Deployment};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::error::DeployError;
use crate::negotiate::{build_upload_plan, negotiate_assets};
use crate::progress::{PushProgress, Step};
use crate::remote::{DeployApi, ProgressStream};
use crate::types::{DeployConfig, DeployEvent, DeployOutcome};

/// Capacity of the reporting channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Runs one deployment.
pub struct DeployRunner {
    events_tx: mpsc::Sender<DeployEvent>,
    events_rx: Option<mpsc::Receiver<DeployEvent>>,
    cancel: CancellationToken,
}

impl Default for DeployRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl DeployRunner {
    /// Creates a new runner.
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<DeployEvent>> {
        self.events_rx.take()
    }

    /// Returns a cancellation token for this run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves the entrypoint without doing any other work.
    ///
    /// Lets a caller reject a bad entrypoint before it spends a network call
    /// on credentials; [`run`](Self::run) repeats the check.
    pub fn preflight(&self, config: &DeployConfig) -> Result<ResolvedEntrypoint, DeployError> {
        Ok(resolve_entrypoint(&config.entrypoint, &config.cwd)?)
    }

    /// Runs the full pipeline against `api`.
    ///
    /// A cancelled run never reports a deployment, partial progress is discarded.
    pub async fn run(
        &self,
        api: &dyn DeployApi,
        config: &DeployConfig,
    ) -> Result<DeployOutcome, DeployError> {
        match self.run_inner(api, config).await {
            Ok(deployment) => {
                info!(project = %config.project_id, id = %deployment.id, "deployment complete");
                self.emit(DeployEvent::Completed {
                    deployment: deployment.clone(),
                });
                DeployOutcome::from_deployment(deployment).ok_or_else(|| {
                    DeployError::ProtocolViolation("deployment has no domain mappings".into())
                })
            }
            Err(e) => {
                error!(project = %config.project_id, error = %e, "deployment failed");
                self.emit(DeployEvent::Failed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        api: &dyn DeployApi,
        config: &DeployConfig,
    ) -> Result<Deployment, DeployError> {
        self.check_cancelled()?;

        // Sandbox violations surface before any work or network call.
        let entrypoint = self.preflight(config)?;
        let url = entrypoint.url.to_string();
        match &entrypoint.local_path {
            Some(path) => debug!(%url, path = %path.display(), "resolved local entrypoint"),
            None => debug!(%url, "resolved remote entrypoint"),
        }
        self.emit(DeployEvent::Resolved { url: url.clone() });

        debug!(cwd = %config.cwd.display(), "discovering assets");
        let WalkOutput { manifest, index } = self.cancellable(walk_blocking(config)).await??;
        debug!(assets = manifest.len(), "discovered assets");
        self.emit(DeployEvent::Discovered {
            assets: manifest.len(),
        });

        let needed = self
            .cancellable(negotiate_assets(api, &config.project_id, &manifest))
            .await??;
        let plan = self
            .cancellable(build_upload_plan(&needed, &manifest, &index))
            .await??;
        let files = plan.len();
        info!(files, total_bytes = plan.total_bytes(), "uploading files");
        self.emit(DeployEvent::Negotiated {
            files,
            total_bytes: plan.total_bytes(),
        });

        if let Ok(json) = serde_json::to_string_pretty(&manifest) {
            debug!(manifest = %json, "manifest");
        }

        let request = DeployRequest {
            url,
            manifest,
            event_context: config.event_context.clone(),
        };
        let stream = self
            .cancellable(api.push_deploy(&config.project_id, &request, plan.into_bytes()))
            .await?
            .map_err(DeployError::Push)?;

        let deployment = self.consume(stream, files).await?;
        // A cancel racing the terminal event still wins.
        self.check_cancelled()?;
        Ok(deployment)
    }

    /// Reads events until the terminal one, then drops the stream.
    async fn consume(
        &self,
        mut stream: ProgressStream,
        files: usize,
    ) -> Result<Deployment, DeployError> {
        let mut progress = PushProgress::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(DeployError::Cancelled),
                next = stream.recv() => next,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => return Err(DeployError::Push(e)),
                None => return Err(DeployError::UnexpectedEndOfStream),
            };
            trace!(kind = event.kind(), "progress event");

            match progress.apply(event)? {
                Step::Uploading { percent } => {
                    self.emit(DeployEvent::Uploading { files, percent });
                }
                Step::Building { percent } => {
                    self.emit(DeployEvent::Building { percent });
                }
                Step::UploadComplete => self.emit(DeployEvent::Finishing),
                Step::Done(deployment) => return Ok(deployment),
            }
        }
    }

    /// Awaits `fut` unless the run is cancelled first.
    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, DeployError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DeployError::Cancelled),
            out = fut => Ok(out),
        }
    }

    fn check_cancelled(&self) -> Result<(), DeployError> {
        if self.cancel.is_cancelled() {
            Err(DeployError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Publishes a reporting event without ever stalling the run.
    fn emit(&self, event: DeployEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            trace!(error = %e, "dropped deploy event");
        }
    }
}

/// Walks the working tree off the async runtime.
async fn walk_blocking(config: &DeployConfig) -> Result<WalkOutput, DeployError> {
    let cwd = config.cwd.clone();
    let options = config.walk.clone();
    tokio::task::spawn_blocking(move || walk(&cwd, &cwd, &options))
        .await
        .map_err(|e| AssetError::Io {
            path: config.cwd.clone(),
            source: std::io::Error::other(e),
        })?
        .map_err(DeployError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, RemoteError};
    use crate::remote::mock::MockApi;
    use edgedeploy_assets::hash_bytes;
    use edgedeploy_protocol::{DomainMapping, ProgressEvent};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn work_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("main.ts"),
            b"export default { fetch: () => new Response() }",
        )
        .unwrap();
        fs::write(dir.path().join("a.txt"), b"same").unwrap();
        fs::write(dir.path().join("b.txt"), b"same").unwrap();
        dir
    }

    fn test_config(dir: &Path) -> DeployConfig {
        DeployConfig {
            project_id: "p1".into(),
            entrypoint: "./main.ts".into(),
            cwd: dir.to_path_buf(),
            walk: Default::default(),
            event_context: serde_json::json!({"ref": "refs/heads/main"}),
        }
    }

    fn success(id: &str, domain: &str) -> ProgressEvent {
        ProgressEvent::Success(Deployment {
            id: id.into(),
            domain_mappings: vec![DomainMapping {
                domain: domain.into(),
            }],
        })
    }

    fn happy_stream() -> Vec<ProgressEvent> {
        vec![
            ProgressEvent::StaticFile {
                current_bytes: 50,
                total_bytes: 100,
            },
            ProgressEvent::StaticFile {
                current_bytes: 100,
                total_bytes: 100,
            },
            ProgressEvent::UploadComplete,
            ProgressEvent::Load { seen: 1, total: 1 },
            success("d1", "x.example"),
        ]
    }

    fn collect(rx: &mut mpsc::Receiver<DeployEvent>) -> Vec<DeployEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[tokio::test]
    async fn full_pipeline_reports_id_and_url() {
        let dir = work_tree();
        let h1 = hash_bytes(b"same");
        let api = MockApi::new(vec![h1.clone()], happy_stream());

        let mut runner = DeployRunner::new();
        let mut events_rx = runner.take_events().unwrap();
        let outcome = runner.run(&api, &test_config(dir.path())).await.unwrap();

        assert_eq!(outcome.deployment_id, "d1");
        assert_eq!(outcome.url, "https://x.example/");

        // Duplicate content goes up once, covering both paths.
        let pushed = api.pushed.lock().unwrap();
        let (project, request, files) = &pushed[0];
        assert_eq!(project, "p1");
        assert_eq!(files, &vec![b"same".to_vec()]);
        assert_eq!(request.url, "file:///src/main.ts");
        assert_eq!(request.manifest.get("a.txt"), Some(&h1));
        assert_eq!(request.manifest.get("b.txt"), Some(&h1));
        assert_eq!(request.event_context["ref"], "refs/heads/main");

        let events = collect(&mut events_rx);
        assert!(matches!(events.first(), Some(DeployEvent::Resolved { .. })));
        assert!(events.contains(&DeployEvent::Discovered { assets: 3 }));
        assert!(events.contains(&DeployEvent::Negotiated {
            files: 1,
            total_bytes: 4
        }));
        assert!(events.contains(&DeployEvent::Finishing));
        assert!(matches!(events.last(), Some(DeployEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn uploaded_count_matches_negotiation() {
        let dir = work_tree();
        let needed = vec![
            hash_bytes(b"same"),
            hash_bytes(b"export default { fetch: () => new Response() }"),
        ];
        let api = MockApi::new(needed.clone(), happy_stream());

        let runner = DeployRunner::new();
        runner.run(&api, &test_config(dir.path())).await.unwrap();

        let pushed = api.pushed.lock().unwrap();
        let files = &pushed[0].2;
        assert_eq!(files.len(), needed.len());
        assert_eq!(hash_bytes(&files[0]), needed[0]);
        assert_eq!(hash_bytes(&files[1]), needed[1]);
    }

    #[tokio::test]
    async fn entrypoint_outside_tree_fails_before_network() {
        let dir = work_tree();
        let api = MockApi::new(Vec::new(), happy_stream());
        let config = DeployConfig {
            entrypoint: "/etc/passwd".into(),
            ..test_config(dir.path())
        };

        let err = DeployRunner::new().run(&api, &config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathOutsideWorkingTree);
        assert!(api.negotiated.lock().unwrap().is_empty());
        assert_eq!(api.push_count(), 0);
    }

    #[tokio::test]
    async fn failed_negotiation_uploads_nothing() {
        let dir = work_tree();
        let api = MockApi::failing_negotiation(RemoteError::Transport("unreachable".into()));

        let err = DeployRunner::new()
            .run(&api, &test_config(dir.path()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Negotiation);
        assert_eq!(api.push_count(), 0);
    }

    #[tokio::test]
    async fn unknown_digest_aborts_before_push() {
        let dir = work_tree();
        let api = MockApi::new(vec![hash_bytes(b"not in the tree")], happy_stream());

        let err = DeployRunner::new()
            .run(&api, &test_config(dir.path()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert_eq!(api.push_count(), 0);
    }

    #[tokio::test]
    async fn push_rejection_is_reported() {
        let dir = work_tree();
        let api = MockApi::new(Vec::new(), Vec::new()).with_push_error(RemoteError::Api {
            status: 403,
            code: "forbidden".into(),
            message: "no access".into(),
        });

        let err = DeployRunner::new()
            .run(&api, &test_config(dir.path()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Push);
    }

    #[tokio::test]
    async fn error_event_stops_consumption() {
        let dir = work_tree();
        let api = MockApi::new(
            Vec::new(),
            vec![
                ProgressEvent::Load { seen: 1, total: 2 },
                ProgressEvent::Error {
                    ctx: serde_json::json!("Uncaught SyntaxError"),
                },
                success("never", "x.example"),
            ],
        )
        .keep_stream_open();

        let mut runner = DeployRunner::new();
        let mut events_rx = runner.take_events().unwrap();
        let err = runner
            .run(&api, &test_config(dir.path()))
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Stream { ref ctx } if ctx == "Uncaught SyntaxError"));
        assert!(api.stream_closed_by_consumer());
        let events = collect(&mut events_rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, DeployEvent::Completed { .. })));
        assert!(matches!(events.last(), Some(DeployEvent::Failed { .. })));
    }

    #[tokio::test]
    async fn success_stops_consumption_without_waiting() {
        let dir = work_tree();
        let api = MockApi::new(Vec::new(), vec![success("d2", "y.example")]).keep_stream_open();

        let outcome = DeployRunner::new()
            .run(&api, &test_config(dir.path()))
            .await
            .unwrap();
        assert_eq!(outcome.deployment_id, "d2");
        assert!(api.stream_closed_by_consumer());
    }

    #[tokio::test]
    async fn stream_without_terminal_event_fails() {
        let dir = work_tree();
        let api = MockApi::new(Vec::new(), vec![ProgressEvent::UploadComplete]);

        let err = DeployRunner::new()
            .run(&api, &test_config(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::UnexpectedEndOfStream));
    }

    #[tokio::test]
    async fn transport_failure_mid_stream_fails() {
        let dir = work_tree();
        let api = MockApi::new(Vec::new(), Vec::new()).with_stream_items(vec![
            Ok(ProgressEvent::UploadComplete),
            Err(RemoteError::Decode("bad line".into())),
        ]);

        let err = DeployRunner::new()
            .run(&api, &test_config(dir.path()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Push);
    }

    #[tokio::test]
    async fn progress_reported_is_monotonic() {
        let dir = work_tree();
        let api = MockApi::new(vec![hash_bytes(b"same")], happy_stream());

        let mut runner = DeployRunner::new();
        let mut events_rx = runner.take_events().unwrap();
        runner.run(&api, &test_config(dir.path())).await.unwrap();

        let mut last = -1.0f64;
        for event in collect(&mut events_rx) {
            if let DeployEvent::Uploading { percent, files } = event {
                assert_eq!(files, 1);
                assert!(percent >= last, "{last} -> {percent}");
                last = percent;
            }
        }
        assert_eq!(last, 100.0);
    }

    #[tokio::test]
    async fn cancelled_run_reports_no_deployment() {
        let dir = work_tree();
        let api = MockApi::new(Vec::new(), happy_stream());

        let runner = DeployRunner::new();
        runner.cancel_token().cancel();
        let err = runner
            .run(&api, &test_config(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Cancelled));
        assert!(api.negotiated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_while_waiting_for_events() {
        let dir = work_tree();
        let api = MockApi::new(Vec::new(), vec![ProgressEvent::UploadComplete]).keep_stream_open();

        let mut runner = DeployRunner::new();
        let mut events_rx = runner.take_events().unwrap();
        let cancel = runner.cancel_token();
        let config = test_config(dir.path());

        // Cancel only once the push is live and the runner is waiting on the stream.
        let (result, mut seen) = tokio::join!(runner.run(&api, &config), async {
            let mut seen = Vec::new();
            while let Some(event) = events_rx.recv().await {
                let finishing = event == DeployEvent::Finishing;
                seen.push(event);
                if finishing {
                    cancel.cancel();
                    break;
                }
            }
            seen
        });
        seen.extend(collect(&mut events_rx));

        assert!(matches!(result, Err(DeployError::Cancelled)));
        assert_eq!(api.push_count(), 1);
        assert!(api.stream_closed_by_consumer());
        assert!(seen.contains(&DeployEvent::Finishing));
        assert!(
            !seen
                .iter()
                .any(|e| matches!(e, DeployEvent::Completed { .. }))
        );
        assert!(matches!(seen.last(), Some(DeployEvent::Failed { .. })));
    }

    #[test]
    fn preflight_rejects_entrypoint_outside_tree() {
        let dir = work_tree();
        let config = DeployConfig {
            entrypoint: "../outside.ts".into(),
            ..test_config(dir.path())
        };
        let err = DeployRunner::new().preflight(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathOutsideWorkingTree);
    }

    #[test]
    fn preflight_resolves_local_entrypoint() {
        let dir = work_tree();
        let resolved = DeployRunner::new()
            .preflight(&test_config(dir.path()))
            .unwrap();
        assert_eq!(resolved.url.as_str(), "file:///src/main.ts");
        assert_eq!(resolved.local_path, Some(dir.path().join("main.ts")));
    }

    #[tokio::test]
    async fn take_events_once() {
        let mut runner = DeployRunner::new();
        assert!(runner.take_events().is_some());
        assert!(runner.take_events().is_none());
    }
}
