//! EmbeddingClient — talks to an external embedding provider over a Unix domain socket.
//!
//! Newline-delimited JSON requests/responses, the same NDJSON shape as the IPC transport
//! ConaryLabs-Mira's hooks use to reach its MCP server, adapted here for a single `embed` /
//! `batch_embed` surface instead of goal/session/team operations.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::error::{MemoriaError, Result};

use super::math::Embedding;

const MAX_RESPONSE_SAMPLES: usize = 20;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Request<'a> {
    Embed { text: &'a str },
    BatchEmbed { texts: &'a [String] },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Response {
    Processing {
        #[allow(dead_code)]
        status: ProcessingMarker,
    },
    Embedding {
        embedding: Vec<f32>,
    },
    Batch {
        embeddings: Vec<Vec<f32>>,
        #[serde(default)]
        errors: Vec<Option<String>>,
    },
    Error {
        error: String,
    },
}

#[derive(Debug, Deserialize)]
enum ProcessingMarker {
    #[serde(rename = "processing")]
    Processing,
}

/// Adaptive timeout tracker: bounded window of the last N round-trip times, used to size the
/// next call's deadline so a slow-but-healthy provider isn't killed by a fixed timeout while a
/// truly stuck one is caught quickly.
struct TimeoutTracker {
    samples: VecDeque<f64>,
    min: Duration,
    max: Duration,
    initial: Duration,
}

impl TimeoutTracker {
    fn new(min: Duration, max: Duration, initial: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(MAX_RESPONSE_SAMPLES),
            min,
            max,
            initial,
        }
    }

    fn record(&mut self, elapsed: Duration) {
        if self.samples.len() == MAX_RESPONSE_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed.as_secs_f64());
    }

    fn next_timeout(&self) -> Duration {
        if self.samples.len() < 3 {
            return self.initial;
        }
        let n = self.samples.len() as f64;
        let mean = self.samples.iter().sum::<f64>() / n;
        let variance = self.samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let stddev = variance.sqrt();
        let target = mean + 3.0 * stddev;
        Duration::from_secs_f64(target.clamp(self.min.as_secs_f64(), self.max.as_secs_f64()))
    }
}

/// Client for the external embedding provider reachable at `<project>/.memoria/sockets/
/// embeddings.sock`. One client per project; dimension is learned from the first successful
/// call and cached for the client's lifetime.
pub struct EmbeddingClient {
    socket_path: PathBuf,
    timeout: Mutex<TimeoutTracker>,
    dimension: Mutex<Option<usize>>,
}

impl EmbeddingClient {
    pub fn new(socket_path: impl Into<PathBuf>, min: Duration, max: Duration, initial: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Mutex::new(TimeoutTracker::new(min, max, initial)),
            dimension: Mutex::new(None),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// The provider's embedding dimension, if a call has succeeded at least once.
    pub fn dimension(&self) -> Option<usize> {
        *self.dimension.lock().unwrap()
    }

    /// Embed one string, retrying transient transport errors with exponential backoff up to
    /// `MAX_RETRIES` times before giving up — callers should fall through to EmbeddingQueue
    /// when this still fails.
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut backoff = Duration::from_millis(100);
        let mut last_err = None;

        for attempt in 0..=MAX_RETRIES {
            match self.embed_once(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                    tracing::warn!(attempt, error = %e, "embedding call failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or(MemoriaError::EmbeddingUnavailable(
            "embedding provider unreachable".to_string(),
        )))
    }

    async fn embed_once(&self, text: &str) -> Result<Embedding> {
        let deadline = self.timeout.lock().unwrap().next_timeout();
        let started = std::time::Instant::now();

        let result = tokio::time::timeout(deadline, self.call(Request::Embed { text })).await;

        match result {
            Err(_) => Err(MemoriaError::EmbeddingTimeout(deadline.as_secs_f64())),
            Ok(Err(e)) => Err(e),
            Ok(Ok(Response::Embedding { embedding })) => {
                self.timeout.lock().unwrap().record(started.elapsed());
                self.remember_dimension(embedding.len());
                Ok(Embedding::new(embedding))
            }
            Ok(Ok(Response::Error { error })) => {
                Err(MemoriaError::EmbeddingUnavailable(error))
            }
            Ok(Ok(_)) => Err(MemoriaError::Internal(
                "unexpected response shape for embed request".to_string(),
            )),
        }
    }

    /// Batch-embed a list of strings. On whole-batch transport failure, falls back to
    /// sequential `embed` calls; per-item errors inside a successful batch response are
    /// reported individually rather than failing the whole call.
    pub async fn batch_embed(&self, texts: &[String]) -> Vec<Result<Embedding>> {
        if texts.is_empty() {
            return Vec::new();
        }

        let deadline = self.timeout.lock().unwrap().next_timeout();
        let started = std::time::Instant::now();

        let result = tokio::time::timeout(deadline, self.call(Request::BatchEmbed { texts })).await;

        match result {
            Ok(Ok(Response::Batch { embeddings, errors })) => {
                self.timeout.lock().unwrap().record(started.elapsed());
                embeddings
                    .into_iter()
                    .enumerate()
                    .map(|(i, embedding)| match errors.get(i).cloned().flatten() {
                        Some(error) => Err(MemoriaError::EmbeddingUnavailable(error)),
                        None => {
                            self.remember_dimension(embedding.len());
                            Ok(Embedding::new(embedding))
                        }
                    })
                    .collect()
            }
            _ => {
                tracing::warn!("batch_embed failed, falling back to sequential calls");
                let mut out = Vec::with_capacity(texts.len());
                for text in texts {
                    out.push(self.embed(text).await);
                }
                out
            }
        }
    }

    fn remember_dimension(&self, dim: usize) {
        let mut guard = self.dimension.lock().unwrap();
        if guard.is_none() {
            *guard = Some(dim);
        }
    }

    /// Open the socket, send one request, and read responses until a terminal message —
    /// `{"status":"processing"}` heartbeats are skipped as a first-class decoder state, not an
    /// ad-hoc branch.
    async fn call(&self, req: Request<'_>) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            MemoriaError::EmbeddingUnavailable(format!(
                "cannot connect to {}: {e}",
                self.socket_path.display()
            ))
        })?;

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut line = serde_json::to_string(&req)
            .map_err(|e| MemoriaError::Internal(e.to_string()))?;
        line.push('\n');
        write_half
            .write_all(line.as_bytes())
            .await
            .map_err(|e| MemoriaError::EmbeddingUnavailable(e.to_string()))?;
        write_half
            .flush()
            .await
            .map_err(|e| MemoriaError::EmbeddingUnavailable(e.to_string()))?;

        loop {
            let mut buf = String::new();
            let n = reader
                .read_line(&mut buf)
                .await
                .map_err(|e| MemoriaError::EmbeddingUnavailable(e.to_string()))?;
            if n == 0 {
                return Err(MemoriaError::EmbeddingUnavailable(
                    "embedding provider closed the connection".to_string(),
                ));
            }

            let response: Response = serde_json::from_str(buf.trim())
                .map_err(|e| MemoriaError::Internal(format!("malformed response: {e}")))?;

            if matches!(response, Response::Processing { .. }) {
                continue;
            }
            return Ok(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_tracker_uses_initial_below_three_samples() {
        let tracker = TimeoutTracker::new(
            Duration::from_millis(500),
            Duration::from_secs(30),
            Duration::from_secs(5),
        );
        assert_eq!(tracker.next_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn timeout_tracker_clamps_to_configured_bounds() {
        let mut tracker = TimeoutTracker::new(
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_secs(5),
        );
        // Near-constant fast samples push mean+3*stddev below the floor.
        for _ in 0..5 {
            tracker.record(Duration::from_millis(50));
        }
        assert_eq!(tracker.next_timeout(), Duration::from_millis(100));

        // A wildly varying, slow sample pushes mean+3*stddev above the ceiling.
        tracker.record(Duration::from_secs(10));
        assert_eq!(tracker.next_timeout(), Duration::from_millis(200));
    }
}
