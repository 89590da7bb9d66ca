//! Integration tests for the sync daemon: dataset independence, credential
//! failures, panel discovery, the forced-run offer, and clean shutdown.
//!
//! These drive the real daemon with mocked collaborators, so no network or
//! terminal is involved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use panelsync::daemon::{Confirm, CycleError, Daemon, DaemonExit};
use panelsync::export::{ExportError, TableExporter};
use panelsync_cache::PanelStore;
use panelsync_client::{ClientError, MarketSource, TokenProvider};
use panelsync_models::{DataTable, PanelsyncConfig, TradingWindow};

fn row(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn bond_rows() -> DataTable {
    DataTable::from_rows(vec![row(&[
        ("simbolo", json!("AL30")),
        ("ultimoPrecio", json!(45.5)),
        ("puntas", json!("{cantidadCompra: 100, precioCompra: 45,5, precioVenta: 46,0, cantidadVenta: 200}")),
        ("mercado", json!("bcba")),
    ])])
}

fn equity_rows() -> DataTable {
    DataTable::from_rows(vec![
        row(&[("simbolo", json!("GGAL")), ("ultimoPrecio", json!(1250.0))]),
        row(&[("simbolo", json!("YPFD")), ("ultimoPrecio", json!(9800.0))]),
    ])
}

/// Quote API stub with per-dataset payloads and a call log.
struct MockSource {
    bonds: DataTable,
    equities: DataTable,
    panels: Vec<String>,
    quote_calls: Mutex<Vec<String>>,
}

impl MockSource {
    fn new(bonds: DataTable, equities: DataTable, panels: &[&str]) -> Self {
        Self {
            bonds,
            equities,
            panels: panels.iter().map(|p| p.to_string()).collect(),
            quote_calls: Mutex::new(Vec::new()),
        }
    }

    fn quote_calls(&self) -> Vec<String> {
        self.quote_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketSource for MockSource {
    async fn list_panels(
        &self,
        _token: &str,
        _country: &str,
        _instrument: &str,
    ) -> Result<Vec<String>, ClientError> {
        Ok(self.panels.clone())
    }

    async fn panel_quotes(
        &self,
        _token: &str,
        instrument: &str,
        panel: &str,
        _country: &str,
    ) -> Result<DataTable, ClientError> {
        self.quote_calls
            .lock()
            .unwrap()
            .push(format!("{instrument}/{panel}"));
        match instrument {
            "Bonos" => Ok(self.bonds.clone()),
            _ => Ok(self.equities.clone()),
        }
    }
}

struct MockTokens {
    fail: bool,
}

#[async_trait]
impl TokenProvider for MockTokens {
    async fn bearer(&mut self) -> Result<String, ClientError> {
        if self.fail {
            Err(ClientError::Auth {
                status: 401,
                body: "bad credentials".to_string(),
            })
        } else {
            Ok("tok".to_string())
        }
    }
}

#[derive(Default)]
struct RecordingExporter {
    exports: Mutex<Vec<(String, DataTable)>>,
}

impl RecordingExporter {
    fn exports(&self) -> Vec<(String, DataTable)> {
        self.exports.lock().unwrap().clone()
    }

    fn tabs(&self) -> Vec<String> {
        self.exports().into_iter().map(|(tab, _)| tab).collect()
    }
}

#[async_trait]
impl TableExporter for RecordingExporter {
    async fn export(&self, table: &DataTable, tab: &str) -> Result<(), ExportError> {
        self.exports
            .lock()
            .unwrap()
            .push((tab.to_string(), table.clone()));
        Ok(())
    }
}

struct Always {
    answer: bool,
    asked: AtomicBool,
}

impl Always {
    fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicBool::new(false),
        }
    }
}

impl Confirm for Always {
    fn confirm(&self, _prompt: &str) -> bool {
        self.asked.store(true, Ordering::SeqCst);
        self.answer
    }
}

struct Harness {
    daemon: Daemon,
    source: Arc<MockSource>,
    exporter: Arc<RecordingExporter>,
    store_dir: tempfile::TempDir,
}

impl Harness {
    fn store(&self) -> PanelStore {
        PanelStore::new(self.store_dir.path().join("panel.json"), 24)
    }
}

fn harness(
    source: MockSource,
    tokens: MockTokens,
    panel_override: Option<String>,
    days: Vec<String>,
    confirm: Option<Arc<dyn Confirm>>,
) -> Harness {
    let mut config: PanelsyncConfig = toml::from_str("").unwrap();
    config.schedule.days = days;
    let window = TradingWindow::from_schedule(&config.schedule).unwrap();

    let store_dir = tempfile::tempdir().unwrap();
    let store = PanelStore::new(store_dir.path().join("panel.json"), 24);

    let source = Arc::new(source);
    let exporter = Arc::new(RecordingExporter::default());

    let daemon = Daemon::new(
        config,
        window,
        panel_override,
        store,
        Box::new(tokens),
        source.clone(),
        exporter.clone(),
        confirm,
    );

    Harness {
        daemon,
        source,
        exporter,
        store_dir,
    }
}

fn all_days() -> Vec<String> {
    ["mon", "tue", "wed", "thu", "fri", "sat", "sun"]
        .iter()
        .map(|d| d.to_string())
        .collect()
}

#[tokio::test]
async fn cycle_exports_both_datasets() {
    let mut h = harness(
        MockSource::new(bond_rows(), equity_rows(), &["Merval"]),
        MockTokens { fail: false },
        None,
        all_days(),
        None,
    );

    h.daemon.run_cycle().await.unwrap();

    assert_eq!(h.exporter.tabs(), vec!["BONOS", "ACCIONES"]);

    let exports = h.exporter.exports();

    // The bonds table went through the composite-field normalizer.
    let (_, bonds) = &exports[0];
    let first = &bonds.rows()[0];
    assert_eq!(first["puntas_2"], json!(45.5));
    assert!(!first.contains_key("puntas"));
    assert!(!first.contains_key("mercado"));

    // The equities table is exported as fetched.
    let (_, equities) = &exports[1];
    assert_eq!(equities.len(), 2);
    assert_eq!(equities.rows()[0]["simbolo"], json!("GGAL"));
}

#[tokio::test]
async fn empty_bonds_does_not_block_equities() {
    let mut h = harness(
        MockSource::new(DataTable::new(), equity_rows(), &["Merval"]),
        MockTokens { fail: false },
        None,
        all_days(),
        None,
    );

    h.daemon.run_cycle().await.unwrap();
    assert_eq!(h.exporter.tabs(), vec!["ACCIONES"]);
}

#[tokio::test]
async fn empty_equities_does_not_block_bonds() {
    let mut h = harness(
        MockSource::new(bond_rows(), DataTable::new(), &["Merval"]),
        MockTokens { fail: false },
        None,
        all_days(),
        None,
    );

    h.daemon.run_cycle().await.unwrap();
    assert_eq!(h.exporter.tabs(), vec!["BONOS"]);
}

#[tokio::test]
async fn auth_failure_aborts_the_cycle_without_exports() {
    let mut h = harness(
        MockSource::new(bond_rows(), equity_rows(), &["Merval"]),
        MockTokens { fail: true },
        None,
        all_days(),
        None,
    );

    let result = h.daemon.run_cycle().await;
    assert!(matches!(result, Err(CycleError::Auth(_))));
    assert!(h.exporter.exports().is_empty());
    assert!(h.source.quote_calls().is_empty());
}

#[tokio::test]
async fn discovered_panel_is_persisted_and_preferred() {
    let mut h = harness(
        MockSource::new(bond_rows(), equity_rows(), &["Galpones", "Merval", "General"]),
        MockTokens { fail: false },
        None,
        all_days(),
        None,
    );

    h.daemon.run_cycle().await.unwrap();

    assert_eq!(h.store().load(), Some("Merval".to_string()));
    assert!(h
        .source
        .quote_calls()
        .contains(&"Acciones/Merval".to_string()));
}

#[tokio::test]
async fn panel_override_bypasses_discovery() {
    let mut h = harness(
        MockSource::new(bond_rows(), equity_rows(), &["Merval"]),
        MockTokens { fail: false },
        Some("Panel lideres".to_string()),
        all_days(),
        None,
    );

    h.daemon.run_cycle().await.unwrap();

    assert!(h
        .source
        .quote_calls()
        .contains(&"Acciones/Panel lideres".to_string()));
    // Nothing was persisted since the cache was never consulted.
    assert_eq!(h.store().load(), None);
}

#[tokio::test]
async fn no_panel_candidates_skips_equities_only() {
    let mut h = harness(
        MockSource::new(bond_rows(), equity_rows(), &[]),
        MockTokens { fail: false },
        None,
        all_days(),
        None,
    );

    h.daemon.run_cycle().await.unwrap();
    assert_eq!(h.exporter.tabs(), vec!["BONOS"]);
}

#[tokio::test]
async fn closed_window_finishes_for_today_without_exports() {
    // No trading days at all, so every instant classifies as closed.
    let mut h = harness(
        MockSource::new(bond_rows(), equity_rows(), &["Merval"]),
        MockTokens { fail: false },
        None,
        Vec::new(),
        None,
    );

    let exit = h.daemon.run().await;
    assert_eq!(exit, DaemonExit::DoneForToday);
    assert!(h.exporter.exports().is_empty());
}

#[tokio::test]
async fn forced_run_executes_one_cycle_when_accepted() {
    let confirm = Arc::new(Always::new(true));
    let mut h = harness(
        MockSource::new(bond_rows(), equity_rows(), &["Merval"]),
        MockTokens { fail: false },
        None,
        Vec::new(),
        Some(confirm.clone()),
    );

    let exit = h.daemon.run().await;
    assert_eq!(exit, DaemonExit::DoneForToday);
    assert!(confirm.asked.load(Ordering::SeqCst));
    assert_eq!(h.exporter.tabs(), vec!["BONOS", "ACCIONES"]);
}

#[tokio::test]
async fn forced_run_declined_exports_nothing() {
    let confirm = Arc::new(Always::new(false));
    let mut h = harness(
        MockSource::new(bond_rows(), equity_rows(), &["Merval"]),
        MockTokens { fail: false },
        None,
        Vec::new(),
        Some(confirm.clone()),
    );

    let exit = h.daemon.run().await;
    assert_eq!(exit, DaemonExit::DoneForToday);
    assert!(confirm.asked.load(Ordering::SeqCst));
    assert!(h.exporter.exports().is_empty());
}

#[tokio::test]
async fn cancellation_wins_before_the_first_gate_check() {
    let mut h = harness(
        MockSource::new(bond_rows(), equity_rows(), &["Merval"]),
        MockTokens { fail: false },
        None,
        all_days(),
        None,
    );

    h.daemon.cancel_token().cancel();
    let exit = h.daemon.run().await;
    assert_eq!(exit, DaemonExit::Cancelled);
    assert!(h.exporter.exports().is_empty());
}
