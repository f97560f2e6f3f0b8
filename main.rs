use anyhow::Context;
use clap::Parser;
use log::info;
use tokio_util::sync::CancellationToken;

mod config;
mod error;
mod extractor;
mod frame;
mod sink;
mod station;
mod structs;
use config::Config;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::parse();

    // The ingest loop blocks on serial reads, so it runs off the runtime
    // thread and polls the token between reads.
    let cancel = CancellationToken::new();
    let mut worker = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || station::run(&config, &cancel)
    });

    let finished = tokio::select! {
        joined = &mut worker => Some(joined),
        signal = tokio::signal::ctrl_c() => {
            cancel.cancel();
            signal.context("failed to listen for interrupt")?;
            info!("interrupted, shutting down");
            None
        }
    };
    let joined = match finished {
        Some(joined) => joined,
        None => worker.await,
    };

    let totals = joined
        .context("ingest worker panicked")?
        .context("ingest stopped")?;
    info!(
        "{} lines read, {} samples written ({} duplicates, {} discarded, {} at midnight)",
        totals.lines, totals.emitted, totals.duplicates, totals.discarded, totals.suppressed
    );
    Ok(())
}
