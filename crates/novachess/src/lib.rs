//! # Novachess server
//!
//! The server side of the Novachess protocol: matchmaking, per-game
//! sessions with clocks, draw negotiation, and connection liveness.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use novachess::{init_tracing, ChessServerBuilder};
//! use novachess_game::ScriptedRules;
//! use novachess_registry::MemoryAccountStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), novachess::ServerError> {
//!     init_tracing();
//!     let server = ChessServerBuilder::new()
//!         .bind("0.0.0.0:8080")
//!         .build(MemoryAccountStore::new(), ScriptedRules::new())
//!         .await?;
//!     server.run().await
//! }
//! ```
//!
//! Plug in a real [`AccountStore`](novachess_registry::AccountStore)
//! and [`RulesEngine`](novachess_game::RulesEngine) for production use.

mod error;
mod handler;
mod server;

pub use error::ServerError;
pub use server::{ChessServer, ChessServerBuilder, ServerConfig};

/// Installs the global tracing subscriber, filtered by `RUST_LOG`
/// (default `info`).
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
