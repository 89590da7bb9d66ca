pub mod error;
pub mod quotes;
pub mod token;

pub use error::ClientError;
pub use quotes::{IolClient, MarketSource};
pub use token::{AuthToken, TokenManager, TokenProvider};

/// Cap a response body for logging. Bodies can be large HTML error pages;
/// 300 chars is enough to diagnose.
pub fn truncate_body(body: &str) -> String {
    body.chars().take(300).collect()
}
