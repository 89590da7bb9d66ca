use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use panelsync::daemon::{Confirm, Daemon, StdinConfirm};
use panelsync::export::{CsvExporter, SheetsExporter, TableExporter};
use panelsync::selfcheck;
use panelsync_cache::PanelStore;
use panelsync_client::{IolClient, TokenManager};
use panelsync_models::config::panel_override_from_env;
use panelsync_models::{ExportTarget, PanelsyncConfig, Secrets, TradingWindow};

#[derive(Parser, Debug)]
#[command(
    name = "panelsync",
    about = "Session-aware market panel publisher - pulls IOL quote panels during trading hours and republishes them to a spreadsheet"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/panelsync.toml")]
    config: String,

    /// Run the fixed session-gate self-check and exit
    #[arg(long)]
    test: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: PanelsyncConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse config")?;

    if cli.test || std::env::var("PANELSYNC_TEST").ok().as_deref() == Some("1") {
        std::process::exit(selfcheck::run(&config.schedule));
    }

    config.validate().context("Invalid configuration")?;
    let window = TradingWindow::from_schedule(&config.schedule).context("Invalid schedule")?;
    let secrets = Secrets::from_env(&config.export.target).context("Missing credentials")?;

    let client = IolClient::new(config.source.base_url.clone())
        .context("Failed to build HTTP client")?;
    let tokens = TokenManager::new(
        client.http_client(),
        config.source.base_url.clone(),
        secrets.iol_username.clone(),
        secrets.iol_password.clone(),
    );
    let store = PanelStore::new(&config.cache.panel_path, config.cache.ttl_hours);

    let exporter: Arc<dyn TableExporter> = match config.export.target {
        ExportTarget::Sheets => {
            let google = secrets
                .google
                .clone()
                .context("Google credentials missing for the sheets target")?;
            Arc::new(SheetsExporter::new(
                client.http_client(),
                config.sheets.spreadsheet_id.clone(),
                config.sheets.clear_before_write,
                google,
            ))
        }
        ExportTarget::Csv => Arc::new(CsvExporter::new(&config.export.csv_dir)),
    };

    // The forced-run offer only makes sense with a human on the other end.
    let confirm: Option<Arc<dyn Confirm>> =
        if std::io::stdin().is_terminal() && std::io::stdout().is_terminal() {
            Some(Arc::new(StdinConfirm))
        } else {
            None
        };

    let mut daemon = Daemon::new(
        config,
        window,
        panel_override_from_env(),
        store,
        Box::new(tokens),
        Arc::new(client),
        exporter,
        confirm,
    );

    // Handle shutdown signals
    let cancel = daemon.cancel_token();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        cancel.cancel();
    });

    let exit = daemon.run().await;
    tracing::info!(?exit, "panelsync finished");

    Ok(())
}
