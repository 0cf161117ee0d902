use std::collections::VecDeque;

use futures::{Stream, StreamExt as _};
use tracing::{debug, warn};

use super::classify::Classifier;
use super::normalize::{EventNormalizer, Normalized};
use super::reasoning::{Delta, ReasoningMarkers, ReasoningTransducer, render_stateless};
use super::splitter::{FrameDelimiter, FrameSplitter, RawFrame};
use crate::adapters::local::LocalTransform;
use crate::config::PipelineConfig;
use crate::stream::{ByteStream, StreamEvent};

/// Which normalization path a turn uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineMode {
    /// Classifier + normalizer, with or without the stateful reasoning
    /// transducer.
    Shared { reasoning: bool },
    /// Shared path plus the local backend's flag mapping; reasoning deltas
    /// render statelessly.
    Local,
}

impl Default for PipelineMode {
    fn default() -> Self {
        Self::Shared { reasoning: true }
    }
}

/// Read-only snapshot of the per-turn state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineState {
    pub buffer: String,
    pub keep_alive_shown: bool,
    pub is_thinking: bool,
}

struct FrameProcessor {
    classifier: Classifier,
    normalizer: EventNormalizer,
    reasoning: Reasoning,
    local: Option<LocalTransform>,
}

enum Reasoning {
    Stateful(ReasoningTransducer),
    Stateless(ReasoningMarkers),
}

impl Reasoning {
    fn render(&mut self, delta: &Delta) -> String {
        match self {
            Self::Stateful(transducer) => transducer.transform(delta),
            Self::Stateless(markers) => render_stateless(delta, markers),
        }
    }
}

impl FrameProcessor {
    fn new(config: &PipelineConfig, mode: PipelineMode) -> Self {
        let (reasoning, local) = match mode {
            PipelineMode::Shared { reasoning: true } => (
                Reasoning::Stateful(ReasoningTransducer::new(config.markers.clone())),
                None,
            ),
            PipelineMode::Shared { reasoning: false } => {
                (Reasoning::Stateless(config.markers.clone()), None)
            }
            PipelineMode::Local => (
                Reasoning::Stateless(config.markers.clone()),
                Some(LocalTransform),
            ),
        };
        Self {
            classifier: Classifier::new(config.noise.clone(), config.keep_alive.clone()),
            normalizer: EventNormalizer::new(config.noise.clone()),
            reasoning,
            local,
        }
    }

    fn process(&mut self, frame: &RawFrame) -> Option<StreamEvent> {
        let mut payload = self.classifier.classify(frame);
        if let Some(local) = &self.local {
            payload = local.apply(payload);
        }
        match self.normalizer.normalize(payload)? {
            Normalized::Event(event) => Some(event),
            Normalized::Delta(delta) => Some(StreamEvent::content(self.reasoning.render(&delta))),
        }
    }

    /// Closing marker for a reasoning segment left open.
    fn close_reasoning(&mut self) -> Option<String> {
        match &mut self.reasoning {
            Reasoning::Stateful(transducer) => transducer.finish(),
            Reasoning::Stateless(_) => None,
        }
    }

    fn is_thinking(&self) -> bool {
        matches!(&self.reasoning, Reasoning::Stateful(t) if t.is_thinking())
    }

    fn reset(&mut self) {
        self.normalizer.reset();
        if let Reasoning::Stateful(transducer) = &mut self.reasoning {
            transducer.reset();
        }
    }
}

/// One turn's worth of stream normalization: splitter, classifier,
/// normalizer and reasoning state composed into a push-based state machine.
///
/// Input after `Done` is ignored until [`Pipeline::reset`].
pub struct Pipeline {
    splitter: FrameSplitter,
    processor: FrameProcessor,
    done: bool,
}

impl Pipeline {
    /// Builds a pipeline that splits on the configured SSE delimiter.
    pub fn new(config: &PipelineConfig, mode: PipelineMode) -> Self {
        Self {
            splitter: FrameSplitter::new(config.sse_delimiter.clone()),
            processor: FrameProcessor::new(config, mode),
            done: false,
        }
    }

    /// Builds a pipeline whose delimiter follows the response content type.
    pub fn for_content_type(
        config: &PipelineConfig,
        mode: PipelineMode,
        content_type: Option<&str>,
    ) -> Self {
        Self::new(config, mode).with_delimiter(config.delimiter_for(content_type).clone())
    }

    /// Replaces the frame delimiter. Buffered input is discarded.
    pub fn with_delimiter(mut self, delimiter: FrameDelimiter) -> Self {
        self.splitter = FrameSplitter::new(delimiter);
        self
    }

    /// Feeds one byte chunk and returns the events it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        let frames = self.splitter.feed_bytes(chunk);
        self.process_frames(frames)
    }

    /// Feeds one already-decoded text chunk.
    pub fn push_text(&mut self, chunk: &str) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        let frames = self.splitter.feed(chunk);
        self.process_frames(frames)
    }

    /// Ends the input: processes the unterminated tail and closes a
    /// reasoning segment left open. Per-turn state is cleared afterwards.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        let mut events = match self.splitter.flush() {
            Some(frame) => self.process_frames(vec![frame]),
            None => Vec::new(),
        };
        if !self.done
            && let Some(close) = self.processor.close_reasoning()
        {
            events.push(StreamEvent::content(close));
        }
        self.splitter.reset();
        self.processor.reset();
        events
    }

    /// Restores the initial state so the instance can serve a new turn.
    pub fn reset(&mut self) {
        self.splitter.reset();
        self.processor.reset();
        self.done = false;
    }

    pub fn state(&self) -> PipelineState {
        PipelineState {
            buffer: self.splitter.buffered().to_string(),
            keep_alive_shown: self.processor.normalizer.keep_alive_shown(),
            is_thinking: self.processor.is_thinking(),
        }
    }

    /// True once `Done` was emitted.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn process_frames(&mut self, frames: Vec<RawFrame>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for frame in frames {
            match self.processor.process(&frame) {
                Some(StreamEvent::Done) => {
                    if let Some(close) = self.processor.close_reasoning() {
                        events.push(StreamEvent::content(close));
                    }
                    events.push(StreamEvent::Done);
                    self.complete();
                    break;
                }
                Some(event) => events.push(event),
                None => debug!(frame_len = frame.as_str().len(), "frame produced no event"),
            }
        }
        events
    }

    fn complete(&mut self) {
        self.done = true;
        self.splitter.reset();
        self.processor.reset();
    }
}

struct NormalizeState {
    body: ByteStream,
    pipeline: Pipeline,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

/// Lazily normalizes a byte stream. The sequence ends after `Done`, after
/// the body ends (tail flushed), or after a read failure.
pub fn normalize_stream(body: ByteStream, pipeline: Pipeline) -> impl Stream<Item = StreamEvent> {
    let state = NormalizeState {
        body,
        pipeline,
        pending: VecDeque::new(),
        finished: false,
    };
    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.finished || state.pipeline.is_done() {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let events = state.pipeline.push_chunk(&chunk);
                    state.pending.extend(events);
                }
                Some(Err(err)) => {
                    warn!(error = %err, "response body failed mid-stream; ending turn");
                    state.pipeline.reset();
                    state.finished = true;
                }
                None => {
                    let events = state.pipeline.finish();
                    state.pending.extend(events);
                    state.finished = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;
    use bytes::Bytes;
    use futures::StreamExt as _;

    fn shared() -> Pipeline {
        Pipeline::new(&PipelineConfig::default(), PipelineMode::default())
    }

    fn feed_all(pipeline: &mut Pipeline, chunks: &[&str]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(pipeline.push_chunk(chunk.as_bytes()));
        }
        events.extend(pipeline.finish());
        events
    }

    fn byte_stream(chunks: Vec<Result<&'static str, TransportError>>) -> ByteStream {
        Box::pin(futures::stream::iter(chunks.into_iter().map(|chunk| {
            chunk.map(|text| Bytes::from_static(text.as_bytes()))
        })))
    }

    #[test]
    fn reasoning_scenario_wraps_segment_then_completes() {
        let mut p = shared();
        let events = feed_all(
            &mut p,
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":null,\"reasoning_content\":\"thinking...\"}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"answer\",\"reasoning_content\":null}}]}\n",
                "data: [DONE]\n",
            ],
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::content("<think>thinking..."),
                StreamEvent::content("</think><br><br>answer"),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn done_sentinel_alone_yields_exactly_done() {
        let mut p = shared();
        assert_eq!(feed_all(&mut p, &["data: [DONE]\n"]), vec![StreamEvent::Done]);
    }

    #[test]
    fn truncated_tail_is_repaired_at_flush() {
        let mut p = shared();
        assert_eq!(
            feed_all(&mut p, &["data: {\"content\":\"hello\""]),
            vec![StreamEvent::content("hello")]
        );
    }

    #[test]
    fn truncated_json_split_across_pushes_is_rejoined() {
        let mut p = shared();
        assert!(p.push_text("data: {\"content\":\"hel").is_empty());
        assert!(p.push_text("lo\"}").is_empty());
        assert_eq!(p.state().buffer, "data: {\"content\":\"hello\"}");
        assert_eq!(p.finish(), vec![StreamEvent::content("hello")]);
        assert_eq!(p.state(), PipelineState::default());
    }

    #[test]
    fn repeated_keep_alive_surfaces_once() {
        let mut p = shared();
        assert_eq!(
            feed_all(&mut p, &[": keep-alive\n: keep-alive\n"]),
            vec![StreamEvent::WaitQueuing]
        );
    }

    #[test]
    fn empty_delta_between_keep_alives_stays_quiet() {
        let mut p = shared();
        let events = feed_all(
            &mut p,
            &[": keep-alive\ndata: {\"choices\":[{\"delta\":{\"content\":null,\"reasoning_content\":null}}]}\n: keep-alive\n"],
        );
        assert_eq!(events, vec![StreamEvent::WaitQueuing, StreamEvent::content("")]);
    }

    #[test]
    fn completion_halts_the_turn() {
        let mut p = shared();
        let events = p.push_chunk(
            b"data: {\"content\":\"a\"}\nevent: done\ndata: {\"content\":\"late\"}\n",
        );
        assert_eq!(events, vec![StreamEvent::content("a"), StreamEvent::Done]);
        assert!(p.is_done());
        assert!(p.push_chunk(b"data: {\"content\":\"more\"}\n").is_empty());
        assert!(p.finish().is_empty());
        assert_eq!(
            events.iter().filter(|e| e.is_done()).count(),
            1,
            "exactly one Done"
        );
    }

    #[test]
    fn every_completion_signal_ends_with_one_done() {
        for frame in [
            "data: [DONE]\n",
            "event:done\n",
            "data: {\"name\":\"done\"}\n",
            "data: {\"done\":true}\n",
            "data: {\"finished\":true}\n",
            "{\"complete\":true}\n",
        ] {
            let mut p = shared();
            let events = feed_all(&mut p, &["data: {\"content\":\"x\"}\n", frame]);
            assert_eq!(
                events,
                vec![StreamEvent::content("x"), StreamEvent::Done],
                "frame {frame:?}"
            );
        }
    }

    #[test]
    fn output_does_not_depend_on_chunk_boundaries() {
        let input = concat!(
            ": keep-alive\n",
            "data: {\"choices\":[{\"delta\":{\"content\":null,\"reasoning_content\":\"思考\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"答案\",\"reasoning_content\":null}}]}\n",
            "plain words\n",
            "data: [DONE]\n",
        );
        let expected = feed_all(&mut shared(), &[input]);
        let bytes = input.as_bytes();
        for split in 0..=bytes.len() {
            let mut p = shared();
            let mut events = p.push_chunk(&bytes[..split]);
            events.extend(p.push_chunk(&bytes[split..]));
            events.extend(p.finish());
            assert_eq!(events, expected, "split at byte {split}");
        }
        let mut p = shared();
        let mut bytewise = Vec::new();
        for byte in bytes {
            bytewise.extend(p.push_chunk(std::slice::from_ref(byte)));
        }
        bytewise.extend(p.finish());
        assert_eq!(bytewise, expected);
    }

    #[test]
    fn open_segment_is_closed_before_done_and_at_end() {
        let mut p = shared();
        let events = feed_all(
            &mut p,
            &["data: {\"type\":\"think\",\"data\":\"r\"}\ndata: [DONE]\n"],
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::content("<think>r"),
                StreamEvent::content("</think>"),
                StreamEvent::Done,
            ]
        );

        let mut p = shared();
        let events = feed_all(&mut p, &["data: {\"type\":\"think\",\"data\":\"r\"}\n"]);
        assert_eq!(
            events,
            vec![
                StreamEvent::content("<think>r"),
                StreamEvent::content("</think>"),
            ]
        );
    }

    #[test]
    fn stateless_mode_wraps_each_reasoning_delta() {
        let mut p = Pipeline::new(
            &PipelineConfig::default(),
            PipelineMode::Shared { reasoning: false },
        );
        let events = feed_all(
            &mut p,
            &["data: {\"delta\":{\"content\":null,\"reasoning_content\":\"r\"}}\ndata: {\"delta\":{\"content\":\"a\",\"reasoning_content\":null}}\n"],
        );
        assert_eq!(
            events,
            vec![StreamEvent::content("<think>r</think>"), StreamEvent::content("a")]
        );
    }

    #[test]
    fn state_snapshot_and_reset() {
        let mut p = shared();
        p.push_chunk(b": keep-alive\ndata: {\"type\":\"think\",\"data\":\"r\"}\ndata: {\"con");
        // The think frame resets the keep-alive period.
        assert_eq!(
            p.state(),
            PipelineState {
                buffer: "data: {\"con".into(),
                keep_alive_shown: false,
                is_thinking: true,
            }
        );
        p.reset();
        assert_eq!(p.state(), PipelineState::default());
        assert!(!p.is_done());
    }

    #[test]
    fn reset_after_done_serves_a_new_turn() {
        let mut p = shared();
        p.push_chunk(b"data: [DONE]\n");
        assert!(p.is_done());
        p.reset();
        assert_eq!(
            p.push_chunk(b"data: {\"content\":\"next\"}\n"),
            vec![StreamEvent::content("next")]
        );
    }

    #[test]
    fn local_mode_uses_the_private_transform() {
        let mut p = Pipeline::new(&PipelineConfig::default(), PipelineMode::Local);
        let events = feed_all(
            &mut p,
            &["{\"isWaitQueuing\":true}\n{\"content\":\"hi\"}\n{\"done\":true}\n"],
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::WaitQueuing,
                StreamEvent::content("hi"),
                StreamEvent::Done
            ]
        );
    }

    #[test]
    fn plain_content_type_uses_plain_delimiter() {
        let config = PipelineConfig::default()
            .plain_delimiter(FrameDelimiter::new("\n\n").expect("delimiter"));
        let mut p = Pipeline::for_content_type(&config, PipelineMode::default(), Some("text/plain"));
        let events = feed_all(&mut p, &["line one\nline two\n\nnext"]);
        assert_eq!(
            events,
            vec![
                StreamEvent::content("line one\nline two"),
                StreamEvent::content("next"),
            ]
        );
    }

    #[tokio::test]
    async fn normalize_stream_stops_after_done() {
        let body = byte_stream(vec![
            Ok("data: {\"content\":\"a\"}\nda"),
            Ok("ta: [DONE]\n"),
            Ok("data: {\"content\":\"never\"}\n"),
        ]);
        let events: Vec<_> = normalize_stream(body, shared()).collect().await;
        assert_eq!(events, vec![StreamEvent::content("a"), StreamEvent::Done]);
    }

    #[tokio::test]
    async fn normalize_stream_flushes_on_close_without_done() {
        let body = byte_stream(vec![Ok("data: {\"content\":\"a\"}\n"), Ok("tail")]);
        let events: Vec<_> = normalize_stream(body, shared()).collect().await;
        assert_eq!(
            events,
            vec![StreamEvent::content("a"), StreamEvent::content("tail")]
        );
    }

    #[tokio::test]
    async fn normalize_stream_ends_on_read_error() {
        let body = byte_stream(vec![
            Ok("data: {\"content\":\"a\"}\npartial"),
            Err(TransportError::read("connection reset")),
            Ok("data: {\"content\":\"b\"}\n"),
        ]);
        let events: Vec<_> = normalize_stream(body, shared()).collect().await;
        assert_eq!(events, vec![StreamEvent::content("a")]);
    }
}
