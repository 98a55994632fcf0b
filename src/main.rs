//! TutorLink - tutoring server
//!
//! Routes learner questions to grounded answers, learning reports and the
//! quiz site over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutorlink::{App, Config};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Address to listen on (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Passage index file (overrides config)
    #[arg(short, long)]
    index: Option<String>,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(index) = args.index {
        config.retrieval.index_path = index.into();
    }

    let bind = config.server.bind.clone();
    let app = Arc::new(App::new(config).context("assembling application")?);
    info!(model = app.model_name(), "starting tutorlink");

    let sweeper = app.spawn_sweeper();
    let result = tutorlink::server::serve(app, &bind).await;
    sweeper.abort();

    result.context("serving HTTP")
}
