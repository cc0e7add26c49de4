use anyhow::{Context, Result};
use clap::Parser;
use time::UtcOffset;
use tracing::error;

use testvisor::{Cli, Config, ExitProcess, Orchestrator, OsSignals, logger};

fn main() -> Result<()> {
    // Reading the local offset is only sound while the process is single-threaded.
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    let cli = Cli::parse();
    let cfg = cli.into_config()?.with_local_offset(offset);
    logger::init(&cfg.logger).context("initializing logger")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building runtime")?;
    runtime.block_on(run(cfg))
}

async fn run(cfg: Config) -> Result<()> {
    let orchestrator = Orchestrator::builder(cfg).build()?;
    let signals = OsSignals::new().context("binding interrupt signals")?;

    if let Err(e) = orchestrator.run(signals, ExitProcess).await {
        error!(target: "testvisor", label = e.as_label(), error = %e, "run failed");
        std::process::exit(1);
    }
    Ok(())
}
