//! panelsync - session-aware market panel publisher.
//!
//! Pulls instrument quote panels from the InvertirOnline API during trading
//! hours and republishes them to a spreadsheet. The daemon gates every cycle
//! on a configured trading window, keeps the API credential fresh across
//! cycles, caches the discovered equities panel on disk, and normalizes the
//! composite `puntas` quote field into plain numeric columns.

pub mod daemon;
pub mod export;
pub mod normalize;
pub mod panel;
pub mod selfcheck;

pub use daemon::{Confirm, CycleError, Daemon, DaemonExit, StdinConfirm};
pub use export::{CsvExporter, ExportError, SheetsExporter, TableExporter};
pub use panel::{resolve_panel, PanelError};
