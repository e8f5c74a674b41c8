pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod web;

/// The `User-Agent` sent on every outbound fetch, identifying this
/// aggregator and carrying a contact URL per spec §4.2/§6.
///
/// Format: "planetd/X.Y.Z (+https://github.com/planetd/planetd)"
pub fn user_agent() -> String {
    format!(
        "planetd/{} (+https://github.com/planetd/planetd)",
        env!("CARGO_PKG_VERSION")
    )
}
