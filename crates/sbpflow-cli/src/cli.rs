use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "sbpflow", version, about = "Operator inference and actor pipeline runner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Infer blob descs, batch flags and SBP signatures for a job file
    Infer {
        /// Path to the JSON job
        #[arg(long)]
        job: PathBuf,

        /// Number of workers the signatures are checked against
        #[arg(long, default_value_t = 1)]
        parallel_num: usize,

        /// Log level (RUST_LOG)
        #[arg(long, default_value = "warn")]
        log: String,
    },

    /// Push payloads through a compute -> copy-comm-net -> copy-comm-net pipeline
    Run {
        /// Number of payloads to inject
        #[arg(long, default_value_t = 16)]
        messages: u32,

        /// Inbox capacity of every actor
        #[arg(long, default_value_t = 128)]
        capacity: usize,

        /// Device of the compute actor (cpu or cuda:N)
        #[arg(long, default_value = "cpu")]
        device: String,

        /// Log level (RUST_LOG)
        #[arg(long, default_value = "info")]
        log: String,
    },
}
