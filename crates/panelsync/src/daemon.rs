use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use panelsync_cache::PanelStore;
use panelsync_client::{ClientError, MarketSource, TokenProvider};
use panelsync_models::{DataTable, PanelsyncConfig, SessionStatus, TradingWindow};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::export::TableExporter;
use crate::normalize;
use crate::panel::{resolve_panel, PanelError};

/// Poll interval while waiting for the session to open.
const BEFORE_OPEN_POLL: Duration = Duration::from_secs(60);

/// How a daemon run ended. Both variants are clean exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonExit {
    /// The session is over (or today is not a trading day).
    DoneForToday,
    /// Shutdown was requested while the loop was running or sleeping.
    Cancelled,
}

/// Errors that abort a whole cycle. Everything else inside a cycle is
/// logged and survived so one dataset cannot take down the other.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Credential acquisition failed: {0}")]
    Auth(#[from] ClientError),
}

/// Interactive yes/no capability. Absent in non-interactive deployments,
/// which disables the forced-run offer entirely.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Reads an answer from stdin. Only wired up when the process has a
/// terminal on both ends.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        loop {
            print!("{prompt}");
            let _ = std::io::stdout().flush();
            let mut answer = String::new();
            if std::io::stdin().read_line(&mut answer).is_err() {
                return false;
            }
            match answer.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" | "s" | "si" => return true,
                "n" | "no" | "" => return false,
                _ => println!("Please answer y or n."),
            }
        }
    }
}

/// The session-gated sync daemon.
///
/// One logical loop: classify the current instant against the trading
/// window, run a sync cycle while the session is open, poll while waiting
/// for the open, and stop for the day once the session is over. Cycles run
/// strictly sequentially; the only suspension points are the timed sleeps
/// and, at most once per process, the interactive forced-run prompt.
pub struct Daemon {
    config: PanelsyncConfig,
    window: TradingWindow,
    panel_override: Option<String>,
    store: PanelStore,
    tokens: Box<dyn TokenProvider>,
    source: Arc<dyn MarketSource>,
    exporter: Arc<dyn TableExporter>,
    confirm: Option<Arc<dyn Confirm>>,
    cancel: CancellationToken,
}

impl Daemon {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PanelsyncConfig,
        window: TradingWindow,
        panel_override: Option<String>,
        store: PanelStore,
        tokens: Box<dyn TokenProvider>,
        source: Arc<dyn MarketSource>,
        exporter: Arc<dyn TableExporter>,
        confirm: Option<Arc<dyn Confirm>>,
    ) -> Self {
        Self {
            config,
            window,
            panel_override,
            store,
            tokens,
            source,
            exporter,
            confirm,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a CancellationToken that can be used to trigger shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until the session is over for the day or shutdown is requested.
    pub async fn run(&mut self) -> DaemonExit {
        tracing::info!(
            start = %self.window.start,
            end = %self.window.end,
            tz = %self.window.tz,
            "panelsync daemon starting"
        );

        let mut first_check = true;
        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Stopped by user");
                return DaemonExit::Cancelled;
            }

            match self.window.status_at_utc(Utc::now()) {
                SessionStatus::InSession => {
                    if let Err(e) = self.run_cycle().await {
                        tracing::error!(error = %e, "Cycle failed, waiting for the next one");
                    }
                    let minutes = self.config.schedule.every_minutes;
                    tracing::info!(minutes, "Sleeping until next cycle");
                    if self.sleep_cancellable(Duration::from_secs(minutes * 60)).await {
                        tracing::info!("Stopped by user");
                        return DaemonExit::Cancelled;
                    }
                }
                SessionStatus::BeforeOpen => {
                    tracing::info!("Session not open yet, checking again in 60s");
                    if self.sleep_cancellable(BEFORE_OPEN_POLL).await {
                        tracing::info!("Stopped by user");
                        return DaemonExit::Cancelled;
                    }
                }
                SessionStatus::Closed => {
                    if first_check && self.offer_forced_run().await {
                        if let Err(e) = self.run_cycle().await {
                            tracing::error!(error = %e, "Forced cycle failed");
                        }
                    }
                    tracing::info!("Outside the trading session. Done for today.");
                    return DaemonExit::DoneForToday;
                }
            }
            first_check = false;
        }
    }

    /// One full sync: refresh the credential, then fetch/normalize/export
    /// each dataset independently.
    pub async fn run_cycle(&mut self) -> Result<(), CycleError> {
        let token = self.tokens.bearer().await?;
        self.sync_bonds(&token).await;
        self.sync_equities(&token).await;
        Ok(())
    }

    async fn sync_bonds(&self, token: &str) {
        let country = self.config.source.country.clone();
        match self.source.panel_quotes(token, "Bonos", "BYMA", &country).await {
            Ok(table) if table.is_empty() => {
                tracing::warn!("No bond data arrived, skipping export");
            }
            Ok(mut table) => {
                normalize::normalize_table(&mut table);
                self.export(&table, &self.config.sheets.bonds_tab).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Bond fetch failed");
            }
        }
    }

    async fn sync_equities(&self, token: &str) {
        let country = self.config.source.country.clone();
        let panel = match resolve_panel(
            self.panel_override.as_deref(),
            &self.store,
            self.source.as_ref(),
            token,
            &country,
            "Acciones",
        )
        .await
        {
            Ok(panel) => panel,
            Err(PanelError::NoCandidates) => {
                tracing::warn!("No equity panels available, skipping dataset");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Panel resolution failed, skipping dataset");
                return;
            }
        };

        match self.source.panel_quotes(token, "Acciones", &panel, &country).await {
            Ok(table) if table.is_empty() => {
                tracing::warn!(panel = %panel, "Empty equities table, skipping export");
            }
            Ok(table) => {
                tracing::info!(panel = %panel, rows = table.len(), cols = table.columns().len(), "Fetched equities");
                self.export(&table, &self.config.sheets.equities_tab).await;
            }
            Err(e) => {
                tracing::error!(panel, error = %e, "Equities fetch failed");
            }
        }
    }

    async fn export(&self, table: &DataTable, tab: &str) {
        if table.is_empty() {
            tracing::warn!(tab, "Empty table, nothing to export");
            return;
        }
        if let Err(e) = self.exporter.export(table, tab).await {
            tracing::error!(tab, error = %e, "Export failed");
        }
    }

    /// Offer a single forced cycle when started outside the session. The
    /// prompt blocks on its own thread so a shutdown request still wins.
    async fn offer_forced_run(&self) -> bool {
        let Some(confirm) = self.confirm.clone() else {
            return false;
        };
        tracing::warn!("Outside trading hours on startup");
        let answer = tokio::task::spawn_blocking(move || {
            confirm.confirm("Run one sync cycle now anyway? [y/N]: ")
        });
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            answer = answer => answer.unwrap_or(false),
        }
    }

    /// True when the sleep ended because shutdown was requested.
    async fn sleep_cancellable(&self, wait: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(wait) => false,
        }
    }
}
