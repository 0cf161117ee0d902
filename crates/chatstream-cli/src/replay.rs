use std::path::Path;

use bytes::Bytes;
use chatstream_core::{ByteStream, Pipeline, PipelineConfig, PipelineMode, StreamEvent, normalize_stream};
use futures::Stream;

/// Splits a recorded body into fixed-size chunks, as a network would.
pub fn chunked_body(data: Vec<u8>, chunk_size: usize) -> ByteStream {
    let data = Bytes::from(data);
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<_> = (0..data.len())
        .step_by(chunk_size)
        .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

/// Reads a recorded body and normalizes it through a fresh pipeline.
pub async fn replay_file(
    path: &Path,
    config: &PipelineConfig,
    mode: PipelineMode,
    chunk_size: usize,
) -> std::io::Result<impl Stream<Item = StreamEvent>> {
    let data = tokio::fs::read(path).await?;
    tracing::debug!(path = %path.display(), bytes = data.len(), chunk_size, "replaying transcript");
    Ok(normalize_stream(
        chunked_body(data, chunk_size),
        Pipeline::new(config, mode),
    ))
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use futures::StreamExt as _;

    use super::*;

    #[tokio::test]
    async fn chunks_cover_the_input() {
        let chunks: Vec<_> = chunked_body(b"abcdefg".to_vec(), 3).collect().await;
        let chunks: Vec<Bytes> = chunks.into_iter().map(|c| c.expect("chunk")).collect();
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"abc"),
                Bytes::from_static(b"def"),
                Bytes::from_static(b"g")
            ]
        );
    }

    #[tokio::test]
    async fn replays_recorded_transcript() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            "data: {{\"choices\":[{{\"delta\":{{\"content\":null,\"reasoning_content\":\"想一想\"}}}}]}}\n\
             data: {{\"choices\":[{{\"delta\":{{\"content\":\"好的\",\"reasoning_content\":null}}}}]}}\n\
             data: [DONE]\n"
        )
        .expect("write");

        let events: Vec<_> = replay_file(
            file.path(),
            &PipelineConfig::default(),
            PipelineMode::default(),
            5,
        )
        .await
        .expect("replay")
        .collect()
        .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::content("<think>想一想"),
                StreamEvent::content("</think><br><br>好的"),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let config = PipelineConfig::default();
        let result = replay_file(
            Path::new("/definitely/not/here.sse"),
            &config,
            PipelineMode::Local,
            8,
        )
        .await;
        assert!(result.is_err());
    }
}
