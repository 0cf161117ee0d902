use std::path::PathBuf;

use chatstream_core::MessageLocale;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

/// Stream chat turns from LLM backends and render the normalized events.
#[derive(Parser, Debug)]
#[command(name = "chatstream", version, about)]
pub struct Cli {
    /// JSON file overriding pipeline heuristics (delimiters, noise filter,
    /// reasoning markers, keep-alive literal).
    #[arg(long, global = true, value_name = "FILE")]
    pub pipeline_config: Option<PathBuf>,

    /// Language of synthesized failure notices (`zh` or `en`).
    #[arg(long, global = true)]
    pub locale: Option<MessageLocale>,

    /// Increase log verbosity on stderr (-v turn lifecycle, -vv dropped
    /// frame diagnostics, -vvv trace). `CHATSTREAM_LOG_LEVEL` overrides it.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered adapters; the default is marked with `*`.
    List,
    /// Run one chat turn and print content as it arrives. Ctrl-C aborts.
    Chat(ChatArgs),
    /// Feed a recorded response body through the pipeline offline.
    Replay(ReplayArgs),
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Adapter id; defaults to the registry default.
    #[arg(long, short = 'a')]
    pub adapter: Option<String>,

    /// Conversation id forwarded to backends that keep history.
    #[arg(long, short = 's')]
    pub session: Option<String>,

    /// Wrap each reasoning delta separately instead of one segment.
    #[arg(long, default_value_t = false)]
    pub no_reasoning: bool,

    /// Print events as JSON lines.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// The user message.
    pub text: String,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Normalization path to replay through.
    #[arg(long, value_enum, default_value_t = ModeArg::Shared)]
    pub adapter_mode: ModeArg,

    #[arg(long, default_value_t = false)]
    pub no_reasoning: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Bytes per simulated network chunk.
    #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(u16).range(1..))]
    pub chunk_size: u16,

    /// Recorded response body.
    pub file: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Shared,
    Local,
}
