use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Startup configuration errors. These are the only errors allowed to
/// terminate the process; everything after startup is logged and survived.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid time '{value}' for {field}, expected HH:MM")]
    InvalidTime { field: &'static str, value: String },

    #[error("Trading window start {start} is after end {end}")]
    WindowOrder { start: String, end: String },

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Unknown weekday: {0}")]
    UnknownWeekday(String),

    #[error("schedule.every_minutes must be at least 1")]
    ZeroInterval,

    #[error("sheets.spreadsheet_id is required when export.target = \"sheets\"")]
    MissingSpreadsheetId,
}

/// Which exporter the daemon hands normalized tables to.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportTarget {
    #[default]
    Sheets,
    Csv,
}

/// Top-level configuration for panelsync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelsyncConfig {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Trading-session schedule. Times are local to `timezone`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Session open, HH:MM.
    #[serde(default = "default_start")]
    pub start: String,
    /// Session close, HH:MM.
    #[serde(default = "default_end")]
    pub end: String,
    /// Minutes to sleep between in-session cycles.
    #[serde(default = "default_every_minutes")]
    pub every_minutes: u64,
    /// IANA timezone the window is expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Trading days, short weekday names.
    #[serde(default = "default_days")]
    pub days: Vec<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            start: default_start(),
            end: default_end(),
            every_minutes: default_every_minutes(),
            timezone: default_timezone(),
            days: default_days(),
        }
    }
}

/// Quote API endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_country")]
    pub country: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            country: default_country(),
        }
    }
}

/// Destination spreadsheet settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default = "default_bonds_tab")]
    pub bonds_tab: String,
    #[serde(default = "default_equities_tab")]
    pub equities_tab: String,
    /// Clear the destination tab before each write.
    #[serde(default)]
    pub clear_before_write: bool,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            bonds_tab: default_bonds_tab(),
            equities_tab: default_equities_tab(),
            clear_before_write: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub target: ExportTarget,
    /// Output directory for the csv target.
    #[serde(default = "default_csv_dir")]
    pub csv_dir: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            target: ExportTarget::default(),
            csv_dir: default_csv_dir(),
        }
    }
}

/// Durable panel-label cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path of the JSON cache file shared across process runs.
    #[serde(default = "default_panel_path")]
    pub panel_path: String,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            panel_path: default_panel_path(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl PanelsyncConfig {
    /// Cross-field validation that serde defaults cannot express.
    /// The trading window itself is validated by `TradingWindow::from_schedule`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule.every_minutes == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.export.target == ExportTarget::Sheets && self.sheets.spreadsheet_id.is_empty() {
            return Err(ConfigError::MissingSpreadsheetId);
        }
        Ok(())
    }
}

/// Secrets are never written to the config file; they come from the
/// environment (a local `.env` is loaded during development).
#[derive(Debug, Clone)]
pub struct Secrets {
    pub iol_username: String,
    pub iol_password: String,
    pub google: Option<GoogleSecrets>,
}

/// OAuth2 client credentials for the Sheets exporter (refresh-token grant).
#[derive(Debug, Clone)]
pub struct GoogleSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl Secrets {
    pub fn from_env(target: &ExportTarget) -> Result<Self, ConfigError> {
        let google = match target {
            ExportTarget::Sheets => Some(GoogleSecrets {
                client_id: require_env("GOOGLE_CLIENT_ID")?,
                client_secret: require_env("GOOGLE_CLIENT_SECRET")?,
                refresh_token: require_env("GOOGLE_REFRESH_TOKEN")?,
            }),
            ExportTarget::Csv => None,
        };

        Ok(Self {
            iol_username: require_env("IOL_USERNAME")?,
            iol_password: require_env("IOL_PASSWORD")?,
            google,
        })
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv(name)),
    }
}

/// Optional override for the equities panel label. A non-empty value
/// bypasses both the cache and remote discovery.
pub fn panel_override_from_env() -> Option<String> {
    match std::env::var("EQUITY_PANEL") {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn default_start() -> String {
    "11:00".to_string()
}
fn default_end() -> String {
    "17:00".to_string()
}
fn default_every_minutes() -> u64 {
    15
}
fn default_timezone() -> String {
    "America/Argentina/Buenos_Aires".to_string()
}
fn default_days() -> Vec<String> {
    ["mon", "tue", "wed", "thu", "fri"]
        .iter()
        .map(|d| d.to_string())
        .collect()
}
fn default_base_url() -> String {
    "https://api.invertironline.com".to_string()
}
fn default_country() -> String {
    "argentina".to_string()
}
fn default_bonds_tab() -> String {
    "BONOS".to_string()
}
fn default_equities_tab() -> String {
    "ACCIONES".to_string()
}
fn default_csv_dir() -> String {
    "out".to_string()
}
fn default_panel_path() -> String {
    ".cache/equity_panel.json".to_string()
}
fn default_ttl_hours() -> u64 {
    24
}
