use std::sync::Arc;
use std::time::Duration;

use chatstream_core::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ChatStreamError> {
    chatstream_core::init_observability();

    let registry = AdapterRegistry::standard(
        StandardAdapters::new(
            DeepSeekConfig::new(""),
            LocalModelConfig::default(),
            Arc::new(MemoryCredentialStore::default()),
        )
        .mock(MockConfig::default().chunk_interval(Duration::from_millis(80))),
    )?;

    let mut turn = registry
        .turn("standard")
        .user_text("Stream a greeting.")
        .start()
        .await?;

    while let Some(event) = turn.next_event().await {
        match event {
            StreamEvent::Content { text } => print!("{text}"),
            StreamEvent::WaitQueuing => eprintln!("(waiting for the model...)"),
            StreamEvent::Done => println!(),
        }
    }

    let summary = turn.finish().await?;
    eprintln!("outcome: {:?}", summary.outcome);
    Ok(())
}
