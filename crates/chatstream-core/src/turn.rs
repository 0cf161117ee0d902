use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument as _, debug, info, info_span, warn};

use crate::adapters::{AdapterId, AdapterRegistry, ModelAdapter};
use crate::config::PipelineConfig;
use crate::errors::ChatStreamError;
use crate::pipeline::{Pipeline, PipelineMode};
use crate::stream::StreamEvent;

const DEFAULT_STREAM_BUFFER_CAPACITY: usize = 64;

/// Handle used to cancel a running turn.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation. The turn discards its buffered input and
    /// emits nothing further; `finish()` reports `TurnOutcome::Cancelled`.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// How a turn ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The backend signalled completion.
    Completed,
    /// The body ended without a completion signal.
    StreamClosed,
    Cancelled,
    /// Reading the body failed mid-stream.
    TransportFailed(String),
}

/// Final result of a turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnSummary {
    /// Concatenated `Content` text, markers included.
    pub text: String,
    pub outcome: TurnOutcome,
}

/// Configures and starts one chat turn.
pub struct TurnBuilder {
    registry: AdapterRegistry,
    adapter: AdapterId,
    text: Option<String>,
    session_id: Option<String>,
    reasoning: bool,
    stream_buffer_capacity: usize,
}

impl TurnBuilder {
    pub(crate) fn new(registry: AdapterRegistry, adapter: AdapterId) -> Self {
        Self {
            registry,
            adapter,
            text: None,
            session_id: None,
            reasoning: true,
            stream_buffer_capacity: DEFAULT_STREAM_BUFFER_CAPACITY,
        }
    }

    /// Sets the user message.
    pub fn user_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Conversation the turn belongs to (used by the local backend).
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Enables the stateful reasoning transducer (default on). When off,
    /// each reasoning delta is wrapped in its own marker pair.
    pub fn reasoning(mut self, enabled: bool) -> Self {
        self.reasoning = enabled;
        self
    }

    /// Sets the bounded buffer between the turn task and the consumer.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    /// Validates the builder and starts the turn on a background task.
    pub async fn start(self) -> Result<TurnStream, ChatStreamError> {
        let text = match self.text {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                return Err(ChatStreamError::Validation(
                    "user text must not be empty".into(),
                ));
            }
        };
        if self.stream_buffer_capacity == 0 {
            return Err(ChatStreamError::Validation(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        let adapter = self
            .registry
            .get(self.adapter.as_str())
            .ok_or_else(|| ChatStreamError::AdapterNotFound {
                adapter: self.adapter.clone(),
            })?;

        let (tx, rx) = mpsc::channel(self.stream_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        let consumer_abort_rx = abort_tx.subscribe();

        let turn_id = uuid::Uuid::new_v4();
        let request = TurnRequest {
            turn_id,
            text,
            session_id: self.session_id.filter(|s| !s.trim().is_empty()),
            mode: adapter.pipeline_mode(self.reasoning),
            pipeline: self.registry.pipeline_config().clone(),
        };
        let span = info_span!("turn", turn_id = %turn_id, adapter = %self.adapter);
        tokio::spawn(turn_task(adapter, request, tx, final_tx, abort_rx).instrument(span));

        Ok(TurnStream {
            turn_id,
            adapter: self.adapter,
            rx,
            final_rx,
            abort_handle: AbortHandle { tx: abort_tx },
            abort_rx: consumer_abort_rx,
        })
    }

    /// Runs the turn to the end and returns the concatenated text.
    pub async fn collect_text(self) -> Result<String, ChatStreamError> {
        Ok(self.start().await?.finish().await?.text)
    }
}

struct TurnRequest {
    turn_id: uuid::Uuid,
    text: String,
    session_id: Option<String>,
    mode: PipelineMode,
    pipeline: PipelineConfig,
}

/// Streaming handle returned by [`TurnBuilder::start`].
pub struct TurnStream {
    turn_id: uuid::Uuid,
    adapter: AdapterId,
    rx: mpsc::Receiver<StreamEvent>,
    final_rx: oneshot::Receiver<TurnSummary>,
    abort_handle: AbortHandle,
    abort_rx: watch::Receiver<bool>,
}

impl TurnStream {
    pub fn turn_id(&self) -> uuid::Uuid {
        self.turn_id
    }

    pub fn adapter_id(&self) -> &AdapterId {
        &self.adapter
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Next event, or `None` once the turn has ended or was aborted.
    /// Events still buffered at abort time are not delivered.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        tokio::select! {
            biased;
            _ = wait_for_abort(&mut self.abort_rx) => None,
            event = self.rx.recv() => event,
        }
    }

    /// Drains remaining events and returns the turn summary.
    pub async fn finish(mut self) -> Result<TurnSummary, ChatStreamError> {
        while self.rx.recv().await.is_some() {}
        self.final_rx.await.map_err(|_| {
            ChatStreamError::protocol_msg(format!(
                "turn task ended without a summary (adapter={})",
                self.adapter
            ))
        })
    }
}

struct TurnState {
    tx: mpsc::Sender<StreamEvent>,
    text: String,
}

impl TurnState {
    /// Forwards events in order. Returns false once the turn was aborted or
    /// the consumer is gone; the remaining events are dropped.
    async fn emit(
        &mut self,
        events: Vec<StreamEvent>,
        abort_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        for event in events {
            let text = event.text().map(str::to_owned);
            tokio::select! {
                biased;
                _ = wait_for_abort(abort_rx) => return false,
                sent = self.tx.send(event) => {
                    if sent.is_err() {
                        return false;
                    }
                }
            }
            if let Some(text) = text {
                self.text.push_str(&text);
            }
        }
        true
    }
}

async fn turn_task(
    adapter: Arc<ModelAdapter>,
    request: TurnRequest,
    tx: mpsc::Sender<StreamEvent>,
    final_tx: oneshot::Sender<TurnSummary>,
    mut abort_rx: watch::Receiver<bool>,
) {
    info!(mode = ?request.mode, "turn started");

    let mut state = TurnState {
        tx,
        text: String::new(),
    };
    let outcome = run_turn(&adapter, &request, &mut state, &mut abort_rx).await;

    info!(outcome = ?outcome, text_len = state.text.len(), "turn finished");
    let _ = final_tx.send(TurnSummary {
        text: state.text,
        outcome,
    });
}

async fn run_turn(
    adapter: &ModelAdapter,
    request: &TurnRequest,
    state: &mut TurnState,
    abort_rx: &mut watch::Receiver<bool>,
) -> TurnOutcome {
    let response = tokio::select! {
        biased;
        _ = wait_for_abort(abort_rx) => return TurnOutcome::Cancelled,
        response = adapter.request(&request.text, request.session_id.as_deref()) => response,
    };
    debug!(status = response.status, content_type = response.content_type().unwrap_or_default(), "response received");

    let mut pipeline =
        Pipeline::for_content_type(&request.pipeline, request.mode, response.content_type());
    let mut body = response.body;
    loop {
        tokio::select! {
            biased;
            _ = wait_for_abort(abort_rx) => {
                pipeline.reset();
                return TurnOutcome::Cancelled;
            }
            next = body.next() => match next {
                Some(Ok(chunk)) => {
                    let events = pipeline.push_chunk(&chunk);
                    if !state.emit(events, abort_rx).await {
                        pipeline.reset();
                        return TurnOutcome::Cancelled;
                    }
                    if pipeline.is_done() {
                        return TurnOutcome::Completed;
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "response body failed; ending turn");
                    pipeline.reset();
                    return TurnOutcome::TransportFailed(err.to_string());
                }
                None => {
                    let events = pipeline.finish();
                    let _ = state.emit(events, abort_rx).await;
                    return TurnOutcome::StreamClosed;
                }
            }
        }
    }
}

/// Resolves once an abort was requested. Never resolves if the handle is
/// dropped without aborting.
async fn wait_for_abort(abort_rx: &mut watch::Receiver<bool>) {
    loop {
        if *abort_rx.borrow_and_update() {
            return;
        }
        if abort_rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}
