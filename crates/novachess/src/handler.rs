//! Per-connection handler: logon, packet routing, and liveness.
//!
//! Each accepted connection gets its own Tokio task running this
//! handler. The flow is:
//!   1. Receive `logon_account` or `logon_anon` → bind identity
//!   2. Reply `acknowledge_logon { games }` (doubles as the reconnect
//!      state refresh)
//!   3. Loop: inbound packets, registry deliveries, and the 5-second
//!      keepalive tick
//!
//! Teardown — clean, dead, or unreliable — unbinds the identity and
//! withdraws any queued match request. An in-flight game session is
//! never touched: it stays resumable by the same identity.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use novachess_game::{GameError, GameHandle, RulesEngine};
use novachess_matchmaker::{MatchError, MatchRequest, Pairing};
use novachess_protocol::{
    ClientBody, ClientPacket, Codec, Color, GameId, GameSummary, Packet,
    PacketId, RatingRange, ServerBody, ServerPacket, TimeControl,
};
use novachess_registry::{
    generate_temp_identity, AccountStore, Delivery, Identity,
    OutboundSender, Profile, RegistryError,
};
use novachess_transport::{Link, TransportError};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::ServerError;

/// Profile used for anonymous and temp-id users, who have no account
/// behind them.
const ANON_USERNAME: &str = "anonymous";
const ANON_RATING: u16 = 1200;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<L, S, R, C>(
    link: L,
    state: Arc<ServerState<S, R, C>>,
) -> Result<(), ServerError>
where
    L: Link<Error = TransportError>,
    S: AccountStore,
    R: RulesEngine,
    C: Codec,
{
    let conn_id = link.id();
    tracing::debug!(%conn_id, "handling new connection");

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let mut conn = Conn {
        link: &link,
        state: &state,
        out_tx,
        identity: None,
        profile: Profile {
            username: ANON_USERNAME.to_string(),
            rating: ANON_RATING,
        },
        next_id: 1,
        pending: HashMap::new(),
        last_inbound: Instant::now(),
    };

    let result = conn.run(out_rx).await;

    // Teardown, on every exit path. The game slot survives in the
    // registry so the identity can reconnect into it.
    if let Some(identity) = conn.identity.take() {
        state.registry.unbind(&identity);
        state.queue.lock().await.withdraw(&identity);
        tracing::info!(%conn_id, %identity, "connection torn down");
    }
    let _ = link.close().await;
    result
}

/// One outbound packet awaiting its `acknowledge`.
struct PendingAck {
    packet: ServerPacket,
    sent_at: Instant,
    retransmitted: bool,
}

/// Per-connection state: who this is and what they still owe us.
struct Conn<'a, L, S: AccountStore, R: RulesEngine, C: Codec> {
    link: &'a L,
    state: &'a Arc<ServerState<S, R, C>>,
    /// The sender bound into the registry; registry deliveries come
    /// back to this connection through its receiver half.
    out_tx: OutboundSender,
    /// `None` until logon (and, for anonymous users, until their first
    /// game request assigns a temp id).
    identity: Option<Identity>,
    profile: Profile,
    next_id: u64,
    pending: HashMap<PacketId, PendingAck>,
    last_inbound: Instant,
}

impl<L, S, R, C> Conn<'_, L, S, R, C>
where
    L: Link<Error = TransportError>,
    S: AccountStore,
    R: RulesEngine,
    C: Codec,
{
    async fn run(
        &mut self,
        mut out_rx: mpsc::UnboundedReceiver<ServerBody>,
    ) -> Result<(), ServerError> {
        self.logon().await?;

        let link = self.link;
        let mut keepalive =
            tokio::time::interval(self.state.config.keepalive);
        // The first tick completes immediately; skip it so the first
        // keepalive goes out one full period after logon.
        keepalive.tick().await;

        loop {
            tokio::select! {
                frame = link.recv() => match frame? {
                    Some(data) => {
                        self.last_inbound = Instant::now();
                        if self.handle_frame(&data).await? {
                            tracing::debug!(
                                conn = %link.id(),
                                "client terminated the connection"
                            );
                            return Ok(());
                        }
                    }
                    None => {
                        tracing::debug!(
                            conn = %link.id(),
                            "connection closed cleanly"
                        );
                        return Ok(());
                    }
                },
                delivery = out_rx.recv() => {
                    // `self` holds a sender clone, so the channel can
                    // never report closed here.
                    if let Some(body) = delivery {
                        self.send_body(body).await?;
                    }
                }
                _ = keepalive.tick() => {
                    self.keepalive_tick().await?;
                }
            }
        }
    }

    // --- logon -----------------------------------------------------------

    /// Waits for the mandatory first packet: `logon_account` or
    /// `logon_anon`. Anything else (or silence for a full keepalive
    /// window) ends the connection.
    async fn logon(&mut self) -> Result<(), ServerError> {
        let window = self.state.config.keepalive;
        let data = match tokio::time::timeout(window, self.link.recv()).await
        {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                return Err(ServerError::Liveness(
                    "closed before logon".into(),
                ));
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ServerError::Liveness("logon timed out".into()));
            }
        };
        self.last_inbound = Instant::now();

        let packet: ClientPacket = match self.state.codec.decode(&data) {
            Ok(packet) => packet,
            Err(e) => {
                self.send_err("malformed packet", e.to_string()).await?;
                return Err(e.into());
            }
        };

        match packet.body {
            ClientBody::LogonAccount { uid } => {
                let identity = self.resolve_logon_uid(&uid).await?;
                let resumed = self
                    .state
                    .registry
                    .bind(identity.clone(), self.out_tx.clone());
                self.identity = Some(identity.clone());

                let games = self.game_summaries().await;
                self.send_body(ServerBody::AcknowledgeLogon { games })
                    .await?;
                tracing::info!(conn = %self.link.id(), %identity, "logged on");

                // Reconnecting mid-game: re-serve the turn if it is
                // theirs.
                if let Some(gameid) = resumed {
                    if let Some(handle) = self.game_handle(&gameid).await {
                        let _ = handle.resume(identity).await;
                    }
                }
                Ok(())
            }
            ClientBody::LogonAnon {} => {
                // No identity yet — a temp id is assigned the moment
                // this user requests a game.
                self.send_body(ServerBody::AcknowledgeLogon {
                    games: Vec::new(),
                })
                .await?;
                tracing::info!(conn = %self.link.id(), "anonymous logon");
                Ok(())
            }
            other => {
                self.send_err(
                    "logon required",
                    format!("first packet must be a logon, got {}", other.cmd()),
                )
                .await?;
                Err(ServerError::Liveness("no logon received".into()))
            }
        }
    }

    /// A `logon_account` uid is either a known account or a still-live
    /// temp id (an anonymous player reconnecting into their game).
    async fn resolve_logon_uid(
        &mut self,
        uid: &str,
    ) -> Result<Identity, ServerError> {
        match self.state.accounts.lookup(uid).await {
            Ok(profile) => {
                self.profile = profile;
                Ok(Identity::Account(uid.to_string()))
            }
            Err(RegistryError::UnknownUser(_)) => {
                let temp = Identity::Temp(uid.to_string());
                if self.state.registry.active_game(&temp).is_some() {
                    Ok(temp)
                } else {
                    self.send_err(
                        "unknown user",
                        format!("no account or live temp id {uid}"),
                    )
                    .await?;
                    Err(RegistryError::UnknownUser(uid.to_string()).into())
                }
            }
            Err(e) => {
                self.send_err("account store failure", e.to_string())
                    .await?;
                Err(e.into())
            }
        }
    }

    // --- inbound routing -------------------------------------------------

    /// Decodes and routes one inbound frame. Returns `true` if the
    /// client asked to terminate the connection.
    async fn handle_frame(&mut self, data: &[u8]) -> Result<bool, ServerError> {
        let packet: ClientPacket = match self.state.codec.decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                // A malformed packet never drops the connection.
                self.send_err("malformed packet", e.to_string()).await?;
                return Ok(false);
            }
        };

        // Receipt acknowledgement, before any routing. Semantic
        // rejections still arrive separately as `server_err`.
        if packet.body.wants_ack() {
            self.send_body(ServerBody::Acknowledge { pid: packet.id })
                .await?;
        }

        match packet.body {
            ClientBody::Acknowledge { pid } => {
                // Acknowledging an already-acknowledged id is a no-op.
                self.pending.remove(&pid);
            }
            ClientBody::TerminateConnection {} => return Ok(true),
            ClientBody::LogonAccount { .. } | ClientBody::LogonAnon {} => {
                self.send_err(
                    "already logged on",
                    "logon is only valid as the first packet".into(),
                )
                .await?;
            }
            ClientBody::RequestGameVsUser { ratingrange, timecontrol } => {
                self.handle_request_game(ratingrange, timecontrol).await?;
            }
            ClientBody::MakeMove { mv, gameid } => {
                self.route_to_game(gameid, |handle, identity| async move {
                    handle.make_move(identity, mv).await.map(|_| ())
                })
                .await?;
            }
            ClientBody::OfferDraw { gameid } => {
                self.route_to_game(gameid, |handle, identity| async move {
                    handle.offer_draw(identity).await
                })
                .await?;
            }
            ClientBody::AcceptDraw { gameid } => {
                self.route_to_game(gameid, |handle, identity| async move {
                    handle.accept_draw(identity).await
                })
                .await?;
            }
            ClientBody::DeclineDraw { gameid } => {
                self.route_to_game(gameid, |handle, identity| async move {
                    handle.decline_draw(identity).await
                })
                .await?;
            }
            ClientBody::Resign { gameid } => {
                self.route_to_game(gameid, |handle, identity| async move {
                    handle.resign(identity).await
                })
                .await?;
            }
        }
        Ok(false)
    }

    // --- matchmaking -----------------------------------------------------

    async fn handle_request_game(
        &mut self,
        range: RatingRange,
        control: TimeControl,
    ) -> Result<(), ServerError> {
        // Anonymous users get their temp id here, announced before any
        // game packet can mention it.
        let identity = match self.identity.clone() {
            Some(identity) => identity,
            None => {
                let identity = generate_temp_identity();
                self.state
                    .registry
                    .bind(identity.clone(), self.out_tx.clone());
                self.identity = Some(identity.clone());
                self.send_body(ServerBody::AssignTempId {
                    temp_id: identity.as_str().to_string(),
                })
                .await?;
                identity
            }
        };

        if self.state.registry.active_game(&identity).is_some() {
            self.send_err(
                "already in a game",
                format!("{identity} has an active game"),
            )
            .await?;
            return Ok(());
        }

        let request = MatchRequest {
            identity,
            username: self.profile.username.clone(),
            rating: self.profile.rating,
            range,
            control,
        };
        let paired = self.state.queue.lock().await.enqueue(request);
        match paired {
            Ok(Some(pairing)) => self.start_game(pairing).await,
            Ok(None) => Ok(()),
            Err(e @ MatchError::AlreadyQueued(_)) => {
                self.send_err("already queued", e.to_string()).await
            }
        }
    }

    /// Spawns the game for a fresh pairing, claims both identities'
    /// game slots, and announces `game_found` to both sides.
    async fn start_game(&mut self, pairing: Pairing) -> Result<(), ServerError> {
        let state = self.state;
        let white = pairing.white.clone();
        let black = pairing.black.clone();

        let gameid = state.games.lock().await.create(
            novachess_game::Seat {
                identity: white.identity.clone(),
                user: white.quick_user(),
            },
            novachess_game::Seat {
                identity: black.identity.clone(),
                user: black.quick_user(),
            },
            pairing.control,
            Arc::clone(&state.rules),
            state.registry.clone(),
            state.done_tx.clone(),
        );

        // Both slots or neither: a failed claim must not disturb a slot
        // some concurrent pairing already owns.
        if let Err(e) = state.registry.set_game_pair(
            &white.identity,
            &black.identity,
            gameid.clone(),
        ) {
            // Both sides were queue-resident moments ago; losing this
            // race means a concurrent pairing won.
            tracing::error!(error = %e, "pairing lost a race");
            if let Some(handle) = state.games.lock().await.remove(&gameid) {
                let _ = handle.shutdown().await;
            }
            self.send_err("matchmaking failed", e.to_string()).await?;
            return Ok(());
        }

        state.registry.deliver(
            &white.identity,
            ServerBody::GameFound {
                opponent: black.quick_user(),
                elo_change: pairing.elo_for_white(),
                play: Color::White,
                gameid: gameid.clone(),
            },
        );
        state.registry.deliver(
            &black.identity,
            ServerBody::GameFound {
                opponent: white.quick_user(),
                elo_change: pairing.elo_for_black(),
                play: Color::Black,
                gameid: gameid.clone(),
            },
        );

        // White's first turn, served after both game_found packets are
        // in flight.
        if let Some(handle) = self.game_handle(&gameid).await {
            let _ = handle.resume(white.identity).await;
        }
        Ok(())
    }

    // --- game routing ----------------------------------------------------

    async fn game_handle(&self, gameid: &GameId) -> Option<GameHandle> {
        self.state.games.lock().await.handle(gameid)
    }

    /// Routes a game command to the addressed game's actor; any game
    /// error comes back to this connection only, as `server_err`.
    async fn route_to_game<F, Fut>(
        &mut self,
        gameid: GameId,
        op: F,
    ) -> Result<(), ServerError>
    where
        F: FnOnce(GameHandle, Identity) -> Fut,
        Fut: Future<Output = Result<(), GameError>>,
    {
        let Some(identity) = self.identity.clone() else {
            self.send_err(
                "not in a game",
                "no identity bound to this connection".into(),
            )
            .await?;
            return Ok(());
        };
        let Some(handle) = self.game_handle(&gameid).await else {
            self.send_err("unknown game", format!("no such game {gameid}"))
                .await?;
            return Ok(());
        };
        if let Err(e) = op(handle, identity).await {
            self.send_err(&e.to_string(), format!("{e:?}")).await?;
        }
        Ok(())
    }

    // --- liveness --------------------------------------------------------

    /// One keepalive period elapsed: check liveness, retransmit stale
    /// unacknowledged packets (once), and send `keep_alive`.
    async fn keepalive_tick(&mut self) -> Result<(), ServerError> {
        let window = self.state.config.keepalive;

        if self.last_inbound.elapsed() > window {
            self.terminate().await;
            return Err(ServerError::Liveness(format!(
                "no inbound traffic for {:?}",
                self.last_inbound.elapsed()
            )));
        }

        let stale: Vec<PacketId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.sent_at.elapsed() > window)
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            let Some(already) =
                self.pending.get(&id).map(|p| p.retransmitted)
            else {
                continue;
            };
            if already {
                self.terminate().await;
                return Err(ServerError::Liveness(format!(
                    "{id} unacknowledged after retransmission"
                )));
            }
            let bytes = match self.pending.get(&id) {
                Some(entry) => self.state.codec.encode(&entry.packet)?,
                None => continue,
            };
            tracing::debug!(conn = %self.link.id(), %id, "retransmitting");
            self.link.send(&bytes).await?;
            if let Some(entry) = self.pending.get_mut(&id) {
                entry.retransmitted = true;
                entry.sent_at = Instant::now();
            }
        }

        let games = self.game_summaries().await;
        self.send_body(ServerBody::KeepAlive { games }).await
    }

    /// Best-effort `terminate_connection` notice before a teardown the
    /// client may not see coming.
    async fn terminate(&mut self) {
        let _ = self.send_body(ServerBody::TerminateConnection {}).await;
    }

    // --- outbound --------------------------------------------------------

    /// The state-refresh payload for `keep_alive` and
    /// `acknowledge_logon`: every game this identity participates in
    /// (at most one).
    async fn game_summaries(&self) -> Vec<GameSummary> {
        let Some(identity) = &self.identity else {
            return Vec::new();
        };
        let Some(gameid) = self.state.registry.active_game(identity) else {
            return Vec::new();
        };
        let Some(handle) = self.game_handle(&gameid).await else {
            return Vec::new();
        };
        match handle.summary(identity.clone()).await {
            Ok(summary) => vec![summary],
            Err(_) => Vec::new(),
        }
    }

    /// Assigns the next packet id, sends, and — for packets that expect
    /// an acknowledgement — joins the pending-ack set.
    async fn send_body(&mut self, body: ServerBody) -> Result<(), ServerError> {
        let id = PacketId(self.next_id);
        self.next_id += 1;

        let packet: ServerPacket = Packet { id, body };
        let bytes = self.state.codec.encode(&packet)?;
        self.link.send(&bytes).await?;

        if packet.body.wants_ack() {
            self.pending.insert(
                id,
                PendingAck {
                    packet,
                    sent_at: Instant::now(),
                    retransmitted: false,
                },
            );
        }
        Ok(())
    }

    async fn send_err(
        &mut self,
        msg: &str,
        debug_msg: String,
    ) -> Result<(), ServerError> {
        self.send_body(ServerBody::ServerErr {
            msg: msg.to_string(),
            debug_msg,
        })
        .await
    }
}
