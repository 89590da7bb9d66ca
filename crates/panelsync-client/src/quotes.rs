use std::time::Duration;

use async_trait::async_trait;
use panelsync_models::DataTable;
use serde_json::Value;

use crate::error::ClientError;
use crate::truncate_body;

/// Read access to the quote API. Mockable for testing.
///
/// Both operations degrade to an empty result on non-success status or a
/// malformed payload; only transport failures surface as errors.
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn list_panels(
        &self,
        token: &str,
        country: &str,
        instrument: &str,
    ) -> Result<Vec<String>, ClientError>;

    async fn panel_quotes(
        &self,
        token: &str,
        instrument: &str,
        panel: &str,
        country: &str,
    ) -> Result<DataTable, ClientError>;
}

/// HTTP client for the InvertirOnline v2 API.
pub struct IolClient {
    client: reqwest::Client,
    base_url: String,
}

impl IolClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn http_client(&self) -> reqwest::Client {
        self.client.clone()
    }
}

#[async_trait]
impl MarketSource for IolClient {
    /// Available panel labels for an instrument, in the API's order.
    async fn list_panels(
        &self,
        token: &str,
        country: &str,
        instrument: &str,
    ) -> Result<Vec<String>, ClientError> {
        let endpoint = format!("{country}/Titulos/Cotizacion/Paneles/{instrument}");
        let url = format!("{}/api/v2/{endpoint}", self.base_url);

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let status = response.status();
        tracing::info!(endpoint = %endpoint, status = status.as_u16(), "IOL GET");

        if !status.is_success() {
            let body = truncate_body(&response.text().await.unwrap_or_default());
            tracing::error!(status = status.as_u16(), body = %body, "Failed listing panels");
            return Ok(Vec::new());
        }

        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(endpoint = %endpoint, error = %e, "Panel list is not valid JSON");
                return Ok(Vec::new());
            }
        };

        Ok(panels_from_json(&data))
    }

    /// Quote rows for one panel. 404 means "no data", not an error.
    async fn panel_quotes(
        &self,
        token: &str,
        instrument: &str,
        panel: &str,
        country: &str,
    ) -> Result<DataTable, ClientError> {
        let endpoint = format!("Cotizaciones/{instrument}/{panel}/{country}");
        let url = format!("{}/api/v2/{endpoint}", self.base_url);

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let status = response.status();
        tracing::info!(endpoint = %endpoint, status = status.as_u16(), "IOL GET");

        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::warn!(endpoint = %endpoint, "Endpoint not found (404), treating as no data");
            return Ok(DataTable::new());
        }

        if !status.is_success() {
            let body = truncate_body(&response.text().await.unwrap_or_default());
            tracing::error!(status = status.as_u16(), endpoint = %endpoint, body = %body, "IOL error");
            return Ok(DataTable::new());
        }

        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(endpoint = %endpoint, error = %e, "Response is not valid JSON");
                return Ok(DataTable::new());
            }
        };

        match table_from_json(&data) {
            Some(table) => Ok(table),
            None => {
                tracing::error!(
                    endpoint = %endpoint,
                    body = %truncate_body(&data.to_string()),
                    "Unexpected payload without 'titulos'"
                );
                Ok(DataTable::new())
            }
        }
    }
}

/// The panel listing comes back either as a plain list of strings or as a
/// list of objects keyed by one of several label fields.
fn panels_from_json(data: &Value) -> Vec<String> {
    if let Some(list) = data.as_array() {
        match list.first() {
            None => return Vec::new(),
            Some(Value::String(_)) => {
                return list
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect();
            }
            Some(Value::Object(first)) => {
                for key in ["panel", "nombre", "name", "descripcion"] {
                    if first.contains_key(key) {
                        return list
                            .iter()
                            .filter_map(|v| v.get(key).and_then(Value::as_str))
                            .map(String::from)
                            .collect();
                    }
                }
            }
            Some(_) => {}
        }
    }

    tracing::warn!(
        body = %truncate_body(&data.to_string()),
        "Unexpected panel list payload"
    );
    Vec::new()
}

fn table_from_json(data: &Value) -> Option<DataTable> {
    let titulos = data.get("titulos")?.as_array()?;
    Some(DataTable::from_rows(
        titulos
            .iter()
            .filter_map(|v| v.as_object().cloned())
            .collect(),
    ))
}
