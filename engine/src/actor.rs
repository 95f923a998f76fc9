//! `GameActor`: the Tokio task that owns one [`GameState`] exclusively.
//!
//! A bounded mpsc mailbox, one `oneshot` reply per request, and a `Handle`
//! that is just a clone of the mailbox sender. Unlike a relay that forwards
//! opaque bytes between a host and its clients, this actor owns the
//! authoritative game state itself and replies with structured outcomes.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use protocol::{ActionError, ConstructionError, Coordinate, Frame, GameActorConfig, PlayerId};
use rand::rngs::StdRng;
use rand::SeedableRng;
use state::GameState;
use tokio::sync::{mpsc, oneshot};

use crate::client::ClientHandle;

type JoinReply = oneshot::Sender<Result<Frame, ActionError>>;
type ActionReply = oneshot::Sender<Result<(), ActionError>>;

enum Command {
    Join {
        player_id: PlayerId,
        client: ClientHandle,
        reply: JoinReply,
    },
    Move {
        player_id: PlayerId,
        destination: Coordinate,
        client: ClientHandle,
        reply: ActionReply,
    },
    Attack {
        player_id: PlayerId,
        client: ClientHandle,
        reply: ActionReply,
    },
    /// Self-message scheduled after `respawn_delay` following a kill.
    Respawn { ids: Vec<PlayerId> },
    /// Self-message delivered when a subscribing client's receiver drops.
    MonitorDown { monitor_id: u64 },
    Snapshot { reply: oneshot::Sender<GameSnapshot> },
    Shutdown,
}

/// A point-in-time view of a game, cheap enough to compute on every
/// `Fleet::list` call.
#[derive(Debug, Clone, Copy)]
pub struct GameSnapshot {
    pub player_count: usize,
    pub sequence: u64,
}

/// Handle to a running `GameActor`. Cloning is cheap — it's just the
/// mailbox sender.
#[derive(Clone)]
pub struct GameActorHandle {
    name: std::sync::Arc<str>,
    command_tx: mpsc::Sender<Command>,
}

impl GameActorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while the actor's mailbox is still open. Cheap and synchronous;
    /// used by `Fleet`'s watchdog and `list` without a round trip.
    pub fn is_alive(&self) -> bool {
        !self.command_tx.is_closed()
    }

    /// Resolves once this actor's mailbox has closed (the task has
    /// terminated, for any reason). Used by `PlaySession` to install a
    /// liveness monitor on the game it is joined to.
    pub(crate) async fn closed(&self) {
        self.command_tx.closed().await;
    }

    /// Joins `player_id` into the game under `client`'s identity. A
    /// reconnect (the id is already present) is silently treated as
    /// success by the actor; only `max_players` ever surfaces here.
    pub async fn join(
        &self,
        player_id: PlayerId,
        client: ClientHandle,
        timeout: Duration,
    ) -> Result<Frame, crate::error::RpcError<ActionError>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Join {
            player_id,
            client,
            reply: reply_tx,
        })
        .await?;
        self.await_reply(reply_rx, timeout)
            .await?
            .map_err(crate::error::RpcError::Action)
    }

    pub async fn move_to(
        &self,
        player_id: PlayerId,
        destination: Coordinate,
        client: ClientHandle,
        timeout: Duration,
    ) -> Result<(), crate::error::RpcError<ActionError>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Move {
            player_id,
            destination,
            client,
            reply: reply_tx,
        })
        .await?;
        self.await_reply(reply_rx, timeout)
            .await?
            .map_err(crate::error::RpcError::Action)
    }

    pub async fn attack(
        &self,
        player_id: PlayerId,
        client: ClientHandle,
        timeout: Duration,
    ) -> Result<(), crate::error::RpcError<ActionError>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Attack {
            player_id,
            client,
            reply: reply_tx,
        })
        .await?;
        self.await_reply(reply_rx, timeout)
            .await?
            .map_err(crate::error::RpcError::Action)
    }

    pub async fn snapshot(&self, timeout: Duration) -> Result<GameSnapshot, protocol::TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Snapshot { reply: reply_tx }).await?;
        self.await_reply(reply_rx, timeout).await
    }

    /// Requests the actor to stop. Best-effort: if the mailbox is already
    /// closed there is nothing to do.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown).await;
    }

    async fn send(&self, command: Command) -> Result<(), protocol::TransportError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| protocol::TransportError::ActorUnavailable)
    }

    async fn await_reply<T>(
        &self,
        reply_rx: oneshot::Receiver<T>,
        timeout: Duration,
    ) -> Result<T, protocol::TransportError> {
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(protocol::TransportError::ActorUnavailable),
            Err(_) => Err(protocol::TransportError::RequestTimedOut),
        }
    }
}

/// The actor's private state. Never exposed outside this module; every
/// external interaction goes through [`GameActorHandle`].
struct GameActorState {
    name: std::sync::Arc<str>,
    state: GameState,
    subscribers: HashMap<PlayerId, HashSet<ClientHandle>>,
    monitors: HashMap<u64, (PlayerId, u64)>,
    next_monitor_id: u64,
    sequence: u64,
    rng: StdRng,
    respawn_delay: Duration,
    self_tx: mpsc::Sender<Command>,
    command_rx: mpsc::Receiver<Command>,
}

/// Spawns a new `GameActor` task and returns a handle plus its join handle
/// (the latter is what `Fleet` awaits to notice termination).
pub fn spawn_game_actor(
    name: impl Into<std::sync::Arc<str>>,
    config: GameActorConfig,
) -> Result<(GameActorHandle, tokio::task::JoinHandle<()>), ConstructionError> {
    let name = name.into();
    let state = GameState::new(config.options)?;
    let (command_tx, command_rx) = mpsc::channel(config.mailbox_capacity);

    let actor = GameActorState {
        name: name.clone(),
        state,
        subscribers: HashMap::new(),
        monitors: HashMap::new(),
        next_monitor_id: 0,
        sequence: 0,
        rng: StdRng::from_entropy(),
        respawn_delay: config.respawn_delay,
        self_tx: command_tx.clone(),
        command_rx,
    };

    let join_handle = tokio::spawn(actor.run());
    Ok((GameActorHandle { name, command_tx }, join_handle))
}

impl GameActorState {
    async fn run(mut self) {
        tracing::info!(game = %self.name, "game actor started");

        while let Some(command) = self.command_rx.recv().await {
            match command {
                Command::Join { player_id, client, reply } => {
                    self.handle_join(player_id, client, reply);
                }
                Command::Move {
                    player_id,
                    destination,
                    client,
                    reply,
                } => {
                    self.handle_move(player_id, destination, client, reply);
                }
                Command::Attack { player_id, client, reply } => {
                    self.handle_attack(player_id, client, reply);
                }
                Command::Respawn { ids } => self.handle_respawn(ids),
                Command::MonitorDown { monitor_id } => self.handle_monitor_down(monitor_id),
                Command::Snapshot { reply } => {
                    let _ = reply.send(GameSnapshot {
                        player_count: self.state.players().len(),
                        sequence: self.sequence,
                    });
                }
                Command::Shutdown => {
                    tracing::info!(game = %self.name, "game actor shutting down");
                    break;
                }
            }
        }

        tracing::info!(game = %self.name, "game actor stopped");
    }

    fn handle_join(&mut self, player_id: PlayerId, client: ClientHandle, reply: JoinReply) {
        let (new_state, result) = self.state.spawn_player(player_id.clone(), &mut self.rng);
        match result {
            Err(ActionError::MaxPlayers) => {
                tracing::warn!(game = %self.name, player = %player_id, "join rejected: max_players");
                let _ = reply.send(Err(ActionError::MaxPlayers));
                return;
            }
            Err(ActionError::AlreadySpawned) => {
                tracing::debug!(game = %self.name, player = %player_id, "reconnect: already_spawned");
                self.state = new_state;
            }
            Ok(()) => {
                tracing::info!(game = %self.name, player = %player_id, "player spawned");
                self.state = new_state;
            }
            Err(other) => unreachable!("spawn_player produced an impossible error: {other:?}"),
        }

        self.attach_subscriber(player_id, client);
        let frame = self.broadcast();
        let _ = reply.send(Ok(frame));
    }

    fn handle_move(&mut self, player_id: PlayerId, destination: Coordinate, client: ClientHandle, reply: ActionReply) {
        let (new_state, result) = self.state.move_player(&player_id, destination);
        self.state = new_state;
        self.attach_subscriber(player_id.clone(), client);
        self.broadcast();

        if let Err(err) = &result {
            tracing::debug!(game = %self.name, player = %player_id, error = %err, "move rejected");
        }
        let _ = reply.send(result);
    }

    fn handle_attack(&mut self, player_id: PlayerId, client: ClientHandle, reply: ActionReply) {
        let (new_state, result) = self.state.player_attack(&player_id);
        self.state = new_state;
        self.attach_subscriber(player_id.clone(), client);

        if result.is_ok() {
            let killed = self
                .state
                .last_effects()
                .map(|effects| effects.killed.clone())
                .unwrap_or_default();
            if !killed.is_empty() {
                tracing::info!(game = %self.name, player = %player_id, killed = ?killed, "attack resolved");
                self.schedule_respawn(killed);
            }
        } else if let Some(err) = result.as_ref().err() {
            tracing::debug!(game = %self.name, player = %player_id, error = %err, "attack rejected");
        }

        self.broadcast();
        let _ = reply.send(result);
    }

    /// Drops any player whose subscriber set is currently empty, then
    /// attempts to respawn every id in `ids` that survived that purge.
    fn handle_respawn(&mut self, ids: Vec<PlayerId>) {
        let abandoned: Vec<PlayerId> = self
            .subscribers
            .iter()
            .filter(|(_, clients)| clients.is_empty())
            .map(|(id, _)| id.clone())
            .collect();

        if !abandoned.is_empty() {
            self.state = self.state.drop_players(&abandoned);
            for id in &abandoned {
                self.subscribers.remove(id);
            }
            tracing::info!(game = %self.name, evicted = ?abandoned, "evicted disconnected players at respawn tick");
        }

        for id in ids {
            if abandoned.contains(&id) {
                continue;
            }
            let (new_state, result) = self.state.respawn_player(&id, &mut self.rng);
            match result {
                Ok(()) => {
                    self.state = new_state;
                    tracing::info!(game = %self.name, player = %id, "player respawned");
                }
                Err(ActionError::InvalidPlayer) => {}
                Err(other) => unreachable!("respawn_player produced an impossible error: {other:?}"),
            }
        }

        self.broadcast();
    }

    fn handle_monitor_down(&mut self, monitor_id: u64) {
        let Some((player_id, client_id)) = self.monitors.remove(&monitor_id) else {
            return;
        };
        if let Some(clients) = self.subscribers.get_mut(&player_id) {
            clients.retain(|client| client.id() != client_id);
        }
        tracing::debug!(game = %self.name, player = %player_id, client_id, "subscriber monitor fired");
    }

    /// Records `client` as a subscriber of `player_id`'s frames. If this is
    /// a new client identity for that player, installs a liveness monitor
    /// that delivers `MonitorDown` back into this actor's own mailbox once
    /// the client's receiver is dropped.
    fn attach_subscriber(&mut self, player_id: PlayerId, client: ClientHandle) {
        let client_id = client.id();
        let is_new = self.subscribers.entry(player_id.clone()).or_default().insert(client.clone());
        if !is_new {
            return;
        }

        let monitor_id = self.next_monitor_id;
        self.next_monitor_id += 1;
        self.monitors.insert(monitor_id, (player_id, client_id));

        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            client.closed().await;
            let _ = self_tx.send(Command::MonitorDown { monitor_id }).await;
        });
    }

    fn schedule_respawn(&self, ids: Vec<PlayerId>) {
        let self_tx = self.self_tx.clone();
        let delay = self.respawn_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = self_tx.send(Command::Respawn { ids }).await;
        });
    }

    /// Coalesces the current state into a new, strictly-sequenced frame and
    /// delivers it once to every distinct subscribing client.
    ///
    /// `GameState::coalesce` panics on a corrupt invariant; that panic
    /// unwinds through here and aborts this task, which is deliberate (see
    /// `GameActor`'s failure model in the design notes) — `Fleet` notices
    /// through the actor's mailbox closing.
    fn broadcast(&mut self) -> Frame {
        self.sequence += 1;
        let frame = Frame {
            sequence: self.sequence,
            board_state: self.state.coalesce(),
            dimensions: self.state.board().dimensions(),
        };

        let mut delivered = HashSet::new();
        for clients in self.subscribers.values() {
            for client in clients {
                if delivered.insert(client.id()) && client.send(frame.clone()).is_err() {
                    tracing::debug!(game = %self.name, client_id = client.id(), "frame dropped: client gone");
                }
            }
        }

        frame
    }
}
