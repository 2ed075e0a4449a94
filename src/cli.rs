use clap::{Parser, ValueEnum};

/// One of the three interchangeable concurrency strategies this front-end
/// can run under. Aliases mirror the ones the retrieved Python original's
/// `main.py` accepts on its own `--strategy` flag.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Strategy {
    #[value(name = "thread-per-client", alias = "tpc")]
    ThreadPerClient,
    #[value(name = "thread-per-request", alias = "tpr")]
    ThreadPerRequest,
    #[value(name = "cooperative", aliases = ["sync", "purely-sync"])]
    Cooperative,
}

#[derive(Debug, Parser)]
#[command(name = "ravel", about = "A configurable HTTP front-end")]
pub struct Args {
    /// Integer key selecting one of the built-in settings presets.
    #[arg(short = 's', long = "settings")]
    pub settings: u32,

    /// Which concurrency strategy to run the listener under.
    #[arg(short = 't', long = "strategy", value_enum)]
    pub strategy: Strategy,

    /// Override the listen port from the selected preset.
    #[arg(long)]
    pub port: Option<u16>,
}
