use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rolling_index::{api, config::Settings, scheduler::RollScheduler, store::ElasticStore, IndexRoller, RotationRequest};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Rolling index retention for search clusters")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run REST gateway (PUT/POST /_rollindex)
    Serve,
    /// Roll an index series once and print the result
    Rotate(RollArgs),
    /// Roll an index series on a cron schedule until interrupted
    Schedule {
        #[command(flatten)]
        roll: RollArgs,
        /// 5-field cron expression, e.g. "0 0 * * *"
        #[arg(long)]
        cron: String,
    },
}

#[derive(Args)]
struct RollArgs {
    #[arg(long)]
    index_prefix: String,
    #[arg(long, default_value_t = rolling_index::defaults::DEFAULT_ROLL_INDICES)]
    roll_indices: usize,
    #[arg(long, default_value_t = rolling_index::defaults::DEFAULT_SEARCH_INDICES)]
    search_indices: usize,
    #[arg(long)]
    delete_after_roll: bool,
    /// Mark expired indices with the `<prefix>_closed` alias instead of closing them
    #[arg(long, conflicts_with = "delete_after_roll")]
    keep_open: bool,
    #[arg(long, default_value = rolling_index::defaults::DEFAULT_TIMESTAMP_PATTERN)]
    timestamp_pattern: String,
    /// JSON creation payload for the new index
    #[arg(long)]
    index_spec: Option<String>,
}

impl RollArgs {
    fn into_request(self) -> anyhow::Result<RotationRequest> {
        let spec = match self.index_spec {
            Some(raw) => serde_json::from_str(&raw).context("--index-spec is not valid JSON")?,
            None => serde_json::json!({}),
        };
        Ok(RotationRequest::new(self.index_prefix, self.roll_indices, self.search_indices)
            .delete_after_roll(self.delete_after_roll)
            .close_after_roll(!self.delete_after_roll && !self.keep_open)
            .timestamp_pattern(self.timestamp_pattern)
            .new_index_spec(spec))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env();
    tracing::info!("🚀 rolling-index {} starting", rolling_index::VERSION);

    match Cli::parse().cmd {
        Cmd::Serve => api::run(&settings).await?,
        Cmd::Rotate(args) => {
            let roller = roller(&settings)?;
            let request = args.into_request()?;
            match roller.rotate(&request).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(e) => {
                    if let Some(partial) = e.partial() {
                        eprintln!("partially applied: {}", serde_json::to_string_pretty(partial)?);
                    }
                    return Err(e).context(format!("rolling {} failed", request.index_prefix));
                }
            }
        }
        Cmd::Schedule { roll, cron } => {
            let scheduler = RollScheduler::new(roller(&settings)?);
            scheduler.schedule_rolling_cron(roll.into_request()?, &cron)?;
            tokio::signal::ctrl_c().await?;
            tracing::info!("shutting down");
            scheduler.shutdown().await;
        }
    }
    Ok(())
}

fn roller(settings: &Settings) -> anyhow::Result<IndexRoller> {
    let store = ElasticStore::new(&settings.store_url, settings.store_timeout)?;
    Ok(IndexRoller::new(Arc::new(store)))
}
