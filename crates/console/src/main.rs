//! `dataflow-console` -- live terminal client for the DataFlow platform.
//!
//! # Environment variables
//!
//! | Variable                         | Default                        | Description                 |
//! |----------------------------------|--------------------------------|-----------------------------|
//! | `DATAFLOW_API_URL`               | `http://localhost:8000/api/v1` | REST API base               |
//! | `DATAFLOW_STREAM_URL`            | `DATAFLOW_API_URL`             | Push stream base            |
//! | `DATAFLOW_API_TOKEN`             | --                             | Optional bearer token       |
//! | `DATAFLOW_RECONNECT_DELAY_SECS`  | `3`                            | Stream reconnect delay      |
//! | `DATAFLOW_REFRESH_INTERVAL_SECS` | `30`                           | Dashboard refresh cadence   |
//! | `RUST_LOG`                       | `dataflow_console=info,...`    | Log filter                  |

use anyhow::{Context, Result};
use clap::Parser;

use dataflow_console::{init_tracing, run, Cli};
use dataflow_live::LiveConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = LiveConfig::from_env().context("Invalid configuration")?;
    tracing::debug!(
        api_url = %config.api_url,
        stream_url = %config.stream_url,
        "Loaded configuration",
    );

    run(cli.command, &config).await
}
