mod cli;
mod job;
mod pipeline;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use sbpflow_core::Device;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Infer {
            job,
            parallel_num,
            log,
        } => {
            init_tracing(&log);
            let reports = job::infer_job(job::load_job(&job)?, parallel_num)?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
            Ok(())
        }
        Command::Run {
            messages,
            capacity,
            device,
            log,
        } => {
            init_tracing(&log);
            let device = parse_device(&device)?;
            tracing::info!(messages, capacity, ?device, "starting pipeline");
            let report = pipeline::run_pipeline(messages, capacity, device).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn init_tracing(log: &str) {
    std::env::set_var("RUST_LOG", log);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn parse_device(raw: &str) -> Result<Device> {
    if raw.eq_ignore_ascii_case("cpu") {
        return Ok(Device::Cpu);
    }

    if let Some(rest) = raw.strip_prefix("cuda:") {
        let device_id: u32 = rest.parse().context("invalid cuda device id")?;
        return Ok(Device::Cuda { device_id });
    }

    anyhow::bail!("unsupported device: {raw} (expected cpu or cuda:N)");
}
