use panelsync_cache::PanelStore;
use panelsync_client::{ClientError, MarketSource};
use thiserror::Error;

/// When discovery returns several panels, this one wins if present.
const PREFERRED_PANEL: &str = "Merval";

#[derive(Error, Debug)]
pub enum PanelError {
    /// Discovery returned no candidates; the dependent dataset is skipped
    /// for this cycle rather than retried immediately.
    #[error("No panels available for discovery")]
    NoCandidates,

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Resolve the panel label for a dataset, cheapest source first:
/// a configured override bypasses everything, then the durable cache,
/// then remote discovery. A fresh discovery result is persisted, but a
/// failed persist only warns; the label is still returned.
pub async fn resolve_panel(
    override_label: Option<&str>,
    store: &PanelStore,
    source: &dyn MarketSource,
    token: &str,
    country: &str,
    instrument: &str,
) -> Result<String, PanelError> {
    if let Some(label) = override_label.map(str::trim).filter(|l| !l.is_empty()) {
        tracing::info!(panel = label, "Using configured panel override");
        return Ok(label.to_string());
    }

    if let Some(cached) = store.load() {
        tracing::info!(panel = %cached, "Using cached panel");
        return Ok(cached);
    }

    let candidates = source.list_panels(token, country, instrument).await?;
    if candidates.is_empty() {
        return Err(PanelError::NoCandidates);
    }

    let selected = if candidates.iter().any(|c| c == PREFERRED_PANEL) {
        PREFERRED_PANEL.to_string()
    } else {
        candidates[0].clone()
    };

    if let Err(e) = store.save(&selected) {
        tracing::warn!(error = %e, "Could not persist panel cache");
    }
    tracing::info!(panel = %selected, "Panel selected from discovery");

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use panelsync_models::DataTable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Discovery stub that counts how often it gets called.
    struct StubSource {
        panels: Vec<String>,
        list_calls: AtomicUsize,
    }

    impl StubSource {
        fn with_panels(panels: &[&str]) -> Self {
            Self {
                panels: panels.iter().map(|p| p.to_string()).collect(),
                list_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MarketSource for StubSource {
        async fn list_panels(
            &self,
            _token: &str,
            _country: &str,
            _instrument: &str,
        ) -> Result<Vec<String>, ClientError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.panels.clone())
        }

        async fn panel_quotes(
            &self,
            _token: &str,
            _instrument: &str,
            _panel: &str,
            _country: &str,
        ) -> Result<DataTable, ClientError> {
            Ok(DataTable::new())
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> PanelStore {
        PanelStore::new(dir.path().join("panel.json"), 24)
    }

    async fn resolve(
        override_label: Option<&str>,
        store: &PanelStore,
        source: &StubSource,
    ) -> Result<String, PanelError> {
        resolve_panel(override_label, store, source, "tok", "argentina", "Acciones").await
    }

    #[tokio::test]
    async fn override_bypasses_cache_and_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save("Cached").unwrap();
        let source = StubSource::with_panels(&["Merval"]);

        let panel = resolve(Some("Panel lideres"), &store, &source).await.unwrap();
        assert_eq!(panel, "Panel lideres");
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_override_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let source = StubSource::with_panels(&["General"]);

        let panel = resolve(Some("   "), &store, &source).await.unwrap();
        assert_eq!(panel, "General");
    }

    #[tokio::test]
    async fn cached_label_skips_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save("Merval").unwrap();
        let source = StubSource::with_panels(&["General"]);

        let panel = resolve(None, &store, &source).await.unwrap();
        assert_eq!(panel, "Merval");
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn preferred_panel_wins_the_tie_break() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let source = StubSource::with_panels(&["Galpones", "Merval", "General"]);

        let panel = resolve(None, &store, &source).await.unwrap();
        assert_eq!(panel, "Merval");
    }

    #[tokio::test]
    async fn first_candidate_wins_without_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let source = StubSource::with_panels(&["General", "Otro"]);

        let panel = resolve(None, &store, &source).await.unwrap();
        assert_eq!(panel, "General");
    }

    #[tokio::test]
    async fn discovery_result_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let source = StubSource::with_panels(&["Galpones", "Merval"]);

        resolve(None, &store, &source).await.unwrap();
        assert_eq!(store.load(), Some("Merval".to_string()));

        // A second resolve hits the cache, not discovery.
        let panel = resolve(None, &store, &source).await.unwrap();
        assert_eq!(panel, "Merval");
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_candidates_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let source = StubSource::with_panels(&[]);

        assert!(matches!(
            resolve(None, &store, &source).await,
            Err(PanelError::NoCandidates)
        ));
    }

    #[tokio::test]
    async fn failed_persist_still_returns_the_label() {
        let dir = tempfile::tempdir().unwrap();
        // The cache path is a directory, so saving must fail.
        let store = PanelStore::new(dir.path(), 24);
        let source = StubSource::with_panels(&["General"]);

        let panel = resolve(None, &store, &source).await.unwrap();
        assert_eq!(panel, "General");
    }
}
