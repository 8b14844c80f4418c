use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use onepager_core::{
    shutdown_channel, Config, GeminiSummarizer, HttpAssetFetcher, NotionClient, PdfRenderer,
    Pipeline,
};
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE: &str = "main_automation.log";

#[derive(Parser)]
#[command(
    name = "onepager",
    version,
    about = "Publishes a generated one-pager once the tracked feature reaches its target status"
)]
struct Cli {
    /// Keep polling the release tracker until a run completes or Ctrl-C is pressed.
    #[arg(long, default_value_t = false)]
    monitor: bool,

    /// Directory for the log file.
    #[arg(long, env = "ONEPAGER_LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,
}

fn init_tracing(log_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("cannot create log directory {}", log_dir.display()))?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))
        .context("cannot open log file")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();
    Ok(())
}

async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = Config::from_env().context("configuration is incomplete")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        target = %config.target_functionality,
        status = %config.target_status,
        monitor = cli.monitor,
        "onepager boot"
    );

    let store = NotionClient::new(config.notion_api_key.as_str());
    let assets = HttpAssetFetcher::new().context("cannot build download client")?;
    let summarizer =
        GeminiSummarizer::new(config.gemini_api_key.as_str()).with_model(config.gemini_model.as_str());
    let interval = config.polling_interval;
    let pipeline = Pipeline::new(store, assets, summarizer, PdfRenderer::default(), config);

    if !cli.monitor {
        return Ok(pipeline.run_once().await);
    }

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping monitor");
            trigger.trigger();
        }
    });

    let summary = pipeline.monitor(interval, shutdown).await;
    info!(
        attempts = summary.attempts,
        status_changes = summary.status_changes,
        "monitor finished"
    );
    Ok(summary.completed || summary.cancelled)
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the process environment may already be complete.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(err) = init_tracing(&cli.log_dir) {
        eprintln!("onepager: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("run did not complete, see the log for details");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "onepager failed");
            ExitCode::FAILURE
        }
    }
}
