//! Server side of the event stream: framing, the per-run emitter and the
//! task that drives a run under its wall-clock budget.

use std::convert::Infallible;
use std::future::Future;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderValue};
use axum::response::Response;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::GenerationError;
use crate::transport::{ProgressPayload, StreamEvent};

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Frames one event. `complete` is followed by the `[DONE]` sentinel.
pub fn encode_event(event: &StreamEvent) -> Bytes {
    let json = serde_json::to_string(event).unwrap_or_else(|e| {
        format!(r#"{{"type":"error","message":"failed to encode event: {e}"}}"#)
    });
    let mut frame = format!("data: {json}\n\n");
    if matches!(event, StreamEvent::Complete { .. }) {
        frame.push_str(DONE_FRAME);
    }
    Bytes::from(frame)
}

/// Sending half handed to a run. A failed send means the caller went away.
#[derive(Clone)]
pub struct Emitter {
    tx: mpsc::Sender<StreamEvent>,
}

impl Emitter {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    pub async fn emit(&self, event: StreamEvent) -> Result<(), GenerationError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| GenerationError::Cancelled)
    }

    pub async fn progress(&self, payload: ProgressPayload) -> Result<(), GenerationError> {
        self.emit(StreamEvent::Progress(payload)).await
    }
}

/// Spawns `run` and returns the streaming response immediately.
///
/// The run gets an [`Emitter`] and a fresh token. The token is cancelled when
/// the caller disconnects or `budget` elapses; the latter also produces an
/// in-band `error`. The channel holds a single event so a slow reader
/// throttles the run.
pub fn stream_generation<F, Fut>(budget: Duration, run: F) -> Response
where
    F: FnOnce(Emitter, CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, GenerationError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<StreamEvent>(1);
    let cancel = CancellationToken::new();

    tokio::spawn(async move {
        let started = Instant::now();
        if tx.send(StreamEvent::Start).await.is_err() {
            return;
        }

        let emitter = Emitter::new(tx.clone());
        let outcome = tokio::select! {
            _ = tx.closed() => {
                cancel.cancel();
                info!("client disconnected after {:?}, run cancelled", started.elapsed());
                return;
            }
            outcome = tokio::time::timeout(budget, run(emitter, cancel.clone())) => outcome,
        };

        let terminal = match outcome {
            Ok(Ok(result)) => StreamEvent::Complete {
                result,
                duration: started.elapsed().as_millis() as u64,
            },
            Ok(Err(e)) => {
                warn!("generation failed: {e}");
                StreamEvent::Error {
                    message: e.to_string(),
                }
            }
            Err(_) => {
                cancel.cancel();
                warn!("generation exceeded its {}s budget", budget.as_secs());
                StreamEvent::Error {
                    message: format!(
                        "generation did not finish within {} seconds",
                        budget.as_secs()
                    ),
                }
            }
        };
        // Err here only means the caller already left.
        let _ = tx.send(terminal).await;
    });

    let frames = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(encode_event(&event)));
    let mut response = Response::new(Body::from_stream(frames));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::events::{ProgressDetail, StepUpdate};
    use crate::transport::reader::{EventStreamReader, StreamFrame};
    use axum::body::to_bytes;

    async fn read_frames(response: Response) -> Vec<StreamFrame> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut reader = EventStreamReader::new();
        reader.push(&bytes)
    }

    fn step(n: usize) -> ProgressPayload {
        ProgressPayload {
            current: n,
            total: 3,
            category: "fetch_page".into(),
            detail: ProgressDetail::Step(StepUpdate {
                capability: "fetch_page".into(),
                status: "loading".into(),
                output: None,
                error: None,
            }),
        }
    }

    #[test]
    fn test_complete_frame_carries_done_sentinel() {
        let frame = encode_event(&StreamEvent::Complete {
            result: serde_json::json!({"ok": true}),
            duration: 12,
        });
        let text = String::from_utf8(frame.to_vec()).unwrap();
        assert!(text.starts_with("data: {\"type\":\"complete\""));
        assert!(text.ends_with("\n\ndata: [DONE]\n\n"));

        let error = encode_event(&StreamEvent::Error {
            message: "x".into(),
        });
        assert!(!String::from_utf8(error.to_vec()).unwrap().contains("[DONE]"));
    }

    #[tokio::test]
    async fn test_successful_run_streams_start_progress_complete_done() {
        let response = stream_generation(Duration::from_secs(5), |emitter, _cancel| async move {
            emitter.progress(step(1)).await?;
            emitter.progress(step(2)).await?;
            Ok(serde_json::json!({"answer": 42}))
        });
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");

        let frames = read_frames(response).await;
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0], StreamFrame::Event(StreamEvent::Start));
        assert!(matches!(&frames[1], StreamFrame::Event(StreamEvent::Progress(p)) if p.current == 1));
        assert!(matches!(
            &frames[3],
            StreamFrame::Event(StreamEvent::Complete { result, .. }) if result["answer"] == 42
        ));
        assert_eq!(frames[4], StreamFrame::Done);
    }

    #[tokio::test]
    async fn test_failed_run_ends_with_error_and_no_done() {
        let response = stream_generation(Duration::from_secs(5), |_emitter, _cancel| async move {
            Err(GenerationError::InvalidOutput("weight missing".into()))
        });
        let frames = read_frames(response).await;
        assert_eq!(frames.len(), 2);
        assert!(matches!(
            &frames[1],
            StreamFrame::Event(StreamEvent::Error { message }) if message.contains("weight missing")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_expiry_cancels_and_reports_error() {
        let (token_tx, token_rx) = tokio::sync::oneshot::channel();
        let response = stream_generation(Duration::from_secs(2), move |_emitter, cancel| {
            let _ = token_tx.send(cancel.clone());
            async move {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(Value::Null)
            }
        });
        let frames = read_frames(response).await;
        let token = token_rx.await.unwrap();

        assert!(token.is_cancelled());
        assert_eq!(frames.len(), 2);
        assert!(matches!(
            &frames[1],
            StreamFrame::Event(StreamEvent::Error { message }) if message.contains("2 seconds")
        ));
    }

    #[tokio::test]
    async fn test_disconnect_cancels_run() {
        let (token_tx, token_rx) = tokio::sync::oneshot::channel();
        let response = stream_generation(Duration::from_secs(30), move |_emitter, cancel| {
            let _ = token_tx.send(cancel.clone());
            async move {
                cancel.cancelled().await;
                Err(GenerationError::Cancelled)
            }
        });
        let token = token_rx.await.unwrap();
        drop(response);

        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("run was not cancelled after disconnect");
    }
}
