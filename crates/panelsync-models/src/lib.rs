pub mod config;
pub mod session;
pub mod table;

pub use config::{ConfigError, ExportTarget, PanelsyncConfig, Secrets};
pub use session::{SessionStatus, TradingWindow};
pub use table::DataTable;
