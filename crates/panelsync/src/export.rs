use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use panelsync_client::{token::REFRESH_BUFFER_SECS, truncate_body};
use panelsync_models::config::GoogleSecrets;
use panelsync_models::DataTable;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sheets auth failed with {status}: {body}")]
    Auth { status: u16, body: String },

    #[error("Sheets API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for normalized tables. Mockable for testing.
///
/// Implementations treat an empty table as a logged no-op, write rows
/// starting at A1 with a header row, and optionally clear the destination
/// first.
#[async_trait]
pub trait TableExporter: Send + Sync {
    async fn export(&self, table: &DataTable, tab: &str) -> Result<(), ExportError>;
}

// ---------------------------------------------------------------------------
// Google Sheets
// ---------------------------------------------------------------------------

struct SheetsToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct OauthResponse {
    access_token: String,
    expires_in: i64,
}

/// Writes tables to a Google spreadsheet through the Sheets v4 REST API.
///
/// Access tokens come from the OAuth2 refresh-token grant and are cached
/// until their remaining lifetime drops below the same buffer the quote API
/// credential uses. A missing worksheet is created and the write retried
/// once.
pub struct SheetsExporter {
    client: reqwest::Client,
    spreadsheet_id: String,
    clear_before_write: bool,
    oauth: GoogleSecrets,
    access: tokio::sync::Mutex<Option<SheetsToken>>,
}

impl SheetsExporter {
    pub fn new(
        client: reqwest::Client,
        spreadsheet_id: impl Into<String>,
        clear_before_write: bool,
        oauth: GoogleSecrets,
    ) -> Self {
        Self {
            client,
            spreadsheet_id: spreadsheet_id.into(),
            clear_before_write,
            oauth,
            access: tokio::sync::Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, ExportError> {
        let mut guard = self.access.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at - Utc::now() > Duration::seconds(REFRESH_BUFFER_SECS) {
                return Ok(token.access_token.clone());
            }
        }

        let response = self
            .client
            .post(OAUTH_TOKEN_URL)
            .form(&[
                ("client_id", self.oauth.client_id.as_str()),
                ("client_secret", self.oauth.client_secret.as_str()),
                ("refresh_token", self.oauth.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = truncate_body(&response.text().await.unwrap_or_default());
            tracing::error!(status = status.as_u16(), body = %body, "Sheets token refresh failed");
            return Err(ExportError::Auth {
                status: status.as_u16(),
                body,
            });
        }

        let payload: OauthResponse = response.json().await?;
        let token = SheetsToken {
            access_token: payload.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(payload.expires_in),
        };
        *guard = Some(token);
        Ok(payload.access_token)
    }

    async fn clear_tab(&self, token: &str, tab: &str) -> Result<(), ExportError> {
        let url = format!("{SHEETS_BASE_URL}/{}/values/{tab}:clear", self.spreadsheet_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = truncate_body(&response.text().await.unwrap_or_default());
            return Err(ExportError::Api {
                status: status.as_u16(),
                body,
            });
        }
        tracing::info!(tab, "Cleared tab before export");
        Ok(())
    }

    async fn put_values(
        &self,
        token: &str,
        tab: &str,
        values: &Value,
    ) -> Result<(u16, String), ExportError> {
        let url = format!(
            "{SHEETS_BASE_URL}/{}/values/{tab}!A1?valueInputOption=RAW",
            self.spreadsheet_id
        );
        let body = serde_json::json!({
            "range": format!("{tab}!A1"),
            "majorDimension": "ROWS",
            "values": values,
        });
        let response = self
            .client
            .put(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let text = if response.status().is_success() {
            String::new()
        } else {
            truncate_body(&response.text().await.unwrap_or_default())
        };
        Ok((status, text))
    }

    async fn add_sheet(&self, token: &str, tab: &str) -> Result<(), ExportError> {
        let url = format!("{SHEETS_BASE_URL}/{}:batchUpdate", self.spreadsheet_id);
        let body = serde_json::json!({
            "requests": [{"addSheet": {"properties": {"title": tab}}}]
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = truncate_body(&response.text().await.unwrap_or_default());
            return Err(ExportError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TableExporter for SheetsExporter {
    async fn export(&self, table: &DataTable, tab: &str) -> Result<(), ExportError> {
        if table.is_empty() {
            tracing::warn!(tab, "Empty table, nothing to export");
            return Ok(());
        }

        let token = self.access_token().await?;
        if self.clear_before_write {
            self.clear_tab(&token, tab).await?;
        }

        let values = sheet_values(table);
        let (status, body) = self.put_values(&token, tab, &values).await?;

        let (status, body) = if status == 400 && body.contains("Unable to parse range") {
            tracing::warn!(tab, "Worksheet does not exist, creating it");
            self.add_sheet(&token, tab).await?;
            self.put_values(&token, tab, &values).await?
        } else {
            (status, body)
        };

        if !(200..300).contains(&status) {
            tracing::error!(status, tab, body = %body, "Sheets write failed");
            return Err(ExportError::Api { status, body });
        }

        tracing::info!(
            spreadsheet = %self.spreadsheet_id,
            tab,
            rows = table.len(),
            cols = table.columns().len(),
            "Exported table to Google Sheets"
        );
        Ok(())
    }
}

/// Grid cells for the Sheets API: nulls become empty strings, scalars pass
/// through, anything structured is flattened to its JSON text.
fn sheet_values(table: &DataTable) -> Value {
    let grid: Vec<Vec<Value>> = table
        .to_grid()
        .into_iter()
        .map(|row| row.into_iter().map(sheet_cell).collect())
        .collect();
    Value::Array(grid.into_iter().map(Value::Array).collect())
}

fn sheet_cell(value: Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => value,
        other => Value::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV (local runs and tests)
// ---------------------------------------------------------------------------

/// Writes each tab as `{dir}/{tab}.csv`.
pub struct CsvExporter {
    dir: PathBuf,
}

impl CsvExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl TableExporter for CsvExporter {
    async fn export(&self, table: &DataTable, tab: &str) -> Result<(), ExportError> {
        if table.is_empty() {
            tracing::warn!(tab, "Empty table, nothing to export");
            return Ok(());
        }

        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{tab}.csv"));
        let mut writer = csv::Writer::from_path(&path)?;
        for row in table.to_grid() {
            writer.write_record(row.iter().map(csv_cell))?;
        }
        writer.flush()?;

        tracing::info!(path = %path.display(), rows = table.len(), "Exported table to CSV");
        Ok(())
    }
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
