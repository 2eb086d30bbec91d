//! `ChessServer` builder and server loop.
//!
//! This is the entry point for running a Novachess server. It ties
//! together all the layers: transport → protocol → registry →
//! matchmaker → game.

use std::sync::Arc;
use std::time::Duration;

use novachess_game::{GameManager, GameOver, RulesEngine};
use novachess_matchmaker::MatchQueue;
use novachess_protocol::{Codec, JsonCodec};
use novachess_registry::{AccountStore, SharedRegistry};
use novachess_transport::{Listener, WebSocketListener};
use tokio::sync::{mpsc, Mutex};

use crate::handler::handle_connection;
use crate::ServerError;

/// Liveness and teardown policy for every connection and game.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Keepalive period. Doubles as the liveness window: a connection
    /// with no inbound traffic for one full period after a keepalive
    /// is dead, and an unacknowledged packet older than one period is
    /// retransmitted once.
    pub keepalive: Duration,
    /// How long an abandoned game (both players offline) is held before
    /// being torn down without a result. `None` holds it indefinitely.
    pub abandon_after: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(5),
            abandon_after: None,
        }
    }
}

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Interior
/// mutability via `Mutex` where needed; the registry carries its own
/// lock.
pub(crate) struct ServerState<S: AccountStore, R: RulesEngine, C: Codec> {
    pub(crate) registry: SharedRegistry,
    pub(crate) queue: Mutex<MatchQueue>,
    pub(crate) games: Mutex<GameManager>,
    pub(crate) accounts: S,
    pub(crate) rules: Arc<R>,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
    /// Every game actor reports its terminal result here; the results
    /// task records and cleans up.
    pub(crate) done_tx: mpsc::UnboundedSender<GameOver>,
}

/// Builder for configuring and starting a Novachess server.
///
/// # Example
///
/// ```rust,ignore
/// let server = ChessServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(my_store, my_rules)
///     .await?;
/// server.run().await
/// ```
pub struct ChessServerBuilder {
    bind_addr: String,
    config: ServerConfig,
}

impl ChessServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the keepalive period (also the liveness window).
    pub fn keepalive(mut self, period: Duration) -> Self {
        self.config.keepalive = period;
        self
    }

    /// Sets how long an abandoned game is held before teardown.
    pub fn abandon_after(mut self, hold: Option<Duration>) -> Self {
        self.config.abandon_after = hold;
        self
    }

    /// Builds and starts the server with the given account store and
    /// rules engine. Uses `JsonCodec` and the WebSocket transport.
    pub async fn build<S: AccountStore, R: RulesEngine>(
        self,
        accounts: S,
        rules: R,
    ) -> Result<ChessServer<S, R, JsonCodec>, ServerError> {
        let listener = WebSocketListener::bind(&self.bind_addr).await?;
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let state = Arc::new(ServerState {
            registry: SharedRegistry::default(),
            queue: Mutex::new(MatchQueue::new()),
            games: Mutex::new(GameManager::new()),
            accounts,
            rules: Arc::new(rules),
            codec: JsonCodec,
            config: self.config,
            done_tx,
        });
        tokio::spawn(run_results_task(Arc::clone(&state), done_rx));

        Ok(ChessServer { listener, state })
    }
}

impl Default for ChessServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Novachess server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ChessServer<S: AccountStore, R: RulesEngine, C: Codec> {
    listener: WebSocketListener,
    state: Arc<ServerState<S, R, C>>,
}

impl<S, R, C> ChessServer<S, R, C>
where
    S: AccountStore,
    R: RulesEngine,
    C: Codec + Clone,
{
    pub fn builder() -> ChessServerBuilder {
        ChessServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections and spawns a handler task for each.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), ServerError> {
        tracing::info!("Novachess server running");

        loop {
            match self.listener.accept().await {
                Ok(link) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(link, state).await
                        {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Consumes terminal-game reports: records the result against the
/// account store, frees both identities' game slots, and drops the
/// manager entry.
async fn run_results_task<S: AccountStore, R: RulesEngine, C: Codec>(
    state: Arc<ServerState<S, R, C>>,
    mut done_rx: mpsc::UnboundedReceiver<GameOver>,
) {
    while let Some(over) = done_rx.recv().await {
        tracing::info!(
            game = %over.game,
            termination = ?over.termination,
            "recording finished game"
        );
        if let Err(e) =
            state.accounts.record_result(&over.game, over.outcome).await
        {
            tracing::error!(
                game = %over.game,
                error = %e,
                "failed to record game result"
            );
        }
        state.registry.clear_game(&over.white);
        state.registry.clear_game(&over.black);
        state.games.lock().await.remove(&over.game);
    }
}
