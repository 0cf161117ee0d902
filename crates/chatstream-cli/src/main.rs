//! `chatstream`: terminal renderer for normalized chat streams.

mod cli;
mod render;
mod replay;

use std::process::ExitCode;
use std::sync::Arc;

use chatstream_core::{
    AdapterRegistry, DeepSeekConfig, LocalModelConfig, MemoryCredentialStore, ObservabilityConfig,
    PipelineConfig, PipelineMode, StandardAdapters, init_with,
};
use clap::Parser as _;
use futures::StreamExt as _;
use tracing::warn;

use crate::cli::{ChatArgs, Cli, Command, ModeArg, ReplayArgs};
use crate::render::Renderer;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_with(ObservabilityConfig::from_env().verbosity(cli.verbose));
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let pipeline = load_pipeline_config(&cli)?;
    match cli.command {
        Command::List => {
            let registry = build_registry(&cli, pipeline)?;
            list(&registry);
            Ok(())
        }
        Command::Chat(ref args) => {
            let registry = build_registry(&cli, pipeline)?;
            chat(&registry, args).await
        }
        Command::Replay(ref args) => replay(&pipeline, args).await,
    }
}

fn load_pipeline_config(cli: &Cli) -> CliResult<PipelineConfig> {
    match &cli.pipeline_config {
        Some(path) => Ok(PipelineConfig::from_json_str(&std::fs::read_to_string(path)?)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn build_registry(cli: &Cli, pipeline: PipelineConfig) -> CliResult<AdapterRegistry> {
    let locale = cli.locale.unwrap_or_default();
    let deepseek = DeepSeekConfig::from_env().unwrap_or_else(|err| {
        warn!(error = %err, "deepseek-v3 has no API key; its turns will report the rejection");
        DeepSeekConfig::new("")
    });
    let local = LocalModelConfig::from_env()?.locale(locale);
    let credentials = Arc::new(MemoryCredentialStore::from_optional(
        std::env::var("CHATSTREAM_TOKEN").ok(),
    ));
    let adapters =
        StandardAdapters::new(deepseek.locale(locale), local, credentials).pipeline(pipeline);
    Ok(AdapterRegistry::standard(adapters)?)
}

fn list(registry: &AdapterRegistry) {
    for adapter in registry.iter() {
        let marker = if registry.default_id() == Some(adapter.id()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<14} {}", adapter.id(), adapter.display_name());
    }
}

async fn chat(registry: &AdapterRegistry, args: &ChatArgs) -> CliResult<()> {
    let adapter = args
        .adapter
        .clone()
        .or_else(|| registry.default_id().map(ToString::to_string))
        .ok_or("no adapters registered")?;
    let mut builder = registry
        .turn(adapter)
        .user_text(args.text.clone())
        .reasoning(!args.no_reasoning);
    if let Some(session) = &args.session {
        builder = builder.session_id(session.clone());
    }
    let mut turn = builder.start().await?;

    let abort = turn.abort_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let mut renderer = Renderer::new(std::io::stdout(), args.json);
    while let Some(event) = turn.next_event().await {
        renderer.render(&event)?;
    }
    ctrl_c.abort();

    let summary = turn.finish().await?;
    renderer.finish(&summary.outcome)?;
    Ok(())
}

async fn replay(pipeline: &PipelineConfig, args: &ReplayArgs) -> CliResult<()> {
    let mode = match args.adapter_mode {
        ModeArg::Shared => PipelineMode::Shared {
            reasoning: !args.no_reasoning,
        },
        ModeArg::Local => PipelineMode::Local,
    };
    let mut events =
        Box::pin(replay::replay_file(&args.file, pipeline, mode, usize::from(args.chunk_size)).await?);
    let mut renderer = Renderer::new(std::io::stdout(), args.json);
    while let Some(event) = events.next().await {
        renderer.render(&event)?;
    }
    renderer.finish(&chatstream_core::TurnOutcome::StreamClosed)?;
    Ok(())
}
