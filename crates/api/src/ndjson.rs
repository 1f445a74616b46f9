//! Newline-delimited JSON progress stream decoding.

use std::fmt::Display;

use edgedeploy_protocol::ProgressEvent;
use edgedeploy_push::RemoteError;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Upper bound for a single buffered line.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Incremental decoder for a body split into arbitrary chunks.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every complete line decoded so far.
    /// Blank lines are skipped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<ProgressEvent, RemoteError>> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(item) = decode_line(&line) {
                out.push(item);
            }
        }

        if self.buf.len() > MAX_LINE_BYTES {
            self.buf.clear();
            out.push(Err(RemoteError::Decode(format!(
                "progress line exceeds {MAX_LINE_BYTES} bytes"
            ))));
        }
        out
    }

    /// Decodes whatever is left once the body ends without a final newline.
    pub fn finish(&mut self) -> Option<Result<ProgressEvent, RemoteError>> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest)
    }
}

fn decode_line(line: &[u8]) -> Option<Result<ProgressEvent, RemoteError>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }
    Some(
        serde_json::from_slice(line)
            .map_err(|e| RemoteError::Decode(format!("invalid progress event: {e}"))),
    )
}

/// Forwards decoded events from `body` into `tx`.
///
/// Stops after a terminal event, the first error, the end of the body, or
/// once the receiver is dropped.
pub(crate) async fn pump<S, B, E>(mut body: S, tx: mpsc::Sender<Result<ProgressEvent, RemoteError>>)
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut decoder = NdjsonDecoder::new();

    loop {
        let chunk = tokio::select! {
            _ = tx.closed() => {
                debug!("progress consumer went away, closing stream");
                return;
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for item in decoder.feed(bytes.as_ref()) {
                    let last = match &item {
                        Ok(event) => event.is_terminal(),
                        Err(_) => true,
                    };
                    if tx.send(item).await.is_err() || last {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                let _ = tx
                    .send(Err(RemoteError::Transport(format!(
                        "progress stream interrupted: {e}"
                    ))))
                    .await;
                return;
            }
            None => {
                if let Some(item) = decoder.finish() {
                    let _ = tx.send(item).await;
                }
                return;
            }
        }
    }
}
