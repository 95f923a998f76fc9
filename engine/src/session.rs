//! `PlaySession`: a per-client task that owns the caller's view of one
//! game. It holds the viewer's latest known position/status, enforces
//! frame ordering, and owns the reconnect loop when its `GameActor` dies.
//!
//! Shaped on the same actor-plus-handle idiom as [`crate::actor`], but its
//! "game" is another actor rather than a `GameState` — this is the
//! supervision layer a per-connection task plays over a remote session,
//! reacting to both inbound commands and inbound broadcast traffic.

use protocol::{ActionError, CoalescedCell, Coordinate, Dimensions, Direction, Frame, PlayerId, PlayerStatus, SessionConfig};
use tokio::sync::{mpsc, oneshot};

use crate::actor::GameActorHandle;
use crate::client::{client_channel, ClientHandle};
use crate::error::RpcError;
use crate::fleet::FleetHandle;

/// The viewer's last-known position and status, as derived from the most
/// recently applied frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayerState {
    pub position: Option<Coordinate>,
    pub status: Option<PlayerStatus>,
}

/// A snapshot of the board the session has most recently applied, enough
/// to answer `game_info` without a round trip to the game actor.
#[derive(Debug, Clone)]
pub struct GameInfo {
    pub sequence: u64,
    pub dimensions: Dimensions,
}

/// Raised by [`start_session`] when a session cannot be established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartSessionError {
    /// No game is registered under the requested name.
    InvalidGame,
    /// The initial join itself failed.
    Join(RpcError<ActionError>),
}

enum SessionCommand {
    Move {
        direction: Direction,
        reply: oneshot::Sender<Result<(), RpcError<ActionError>>>,
    },
    Attack {
        reply: oneshot::Sender<Result<(), RpcError<ActionError>>>,
    },
    PlayerState {
        reply: oneshot::Sender<PlayerState>,
    },
    GameInfo {
        reply: oneshot::Sender<Option<GameInfo>>,
    },
    Render {
        reply: oneshot::Sender<String>,
    },
}

/// Handle to a running session. Cloning lets several callers share one
/// client's view of a game (e.g. an RPC layer and a test harness).
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn move_direction(&self, direction: Direction) -> Result<(), RpcError<ActionError>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Move { direction, reply: reply_tx })
            .await
            .map_err(|_| RpcError::Transport(protocol::TransportError::ActorUnavailable))?;
        reply_rx
            .await
            .map_err(|_| RpcError::Transport(protocol::TransportError::ActorUnavailable))?
    }

    pub async fn attack(&self) -> Result<(), RpcError<ActionError>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Attack { reply: reply_tx })
            .await
            .map_err(|_| RpcError::Transport(protocol::TransportError::ActorUnavailable))?;
        reply_rx
            .await
            .map_err(|_| RpcError::Transport(protocol::TransportError::ActorUnavailable))?
    }

    pub async fn player_state(&self) -> Result<PlayerState, protocol::TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::PlayerState { reply: reply_tx })
            .await
            .map_err(|_| protocol::TransportError::ActorUnavailable)?;
        reply_rx.await.map_err(|_| protocol::TransportError::ActorUnavailable)
    }

    pub async fn game_info(&self) -> Result<Option<GameInfo>, protocol::TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::GameInfo { reply: reply_tx })
            .await
            .map_err(|_| protocol::TransportError::ActorUnavailable)?;
        reply_rx.await.map_err(|_| protocol::TransportError::ActorUnavailable)
    }

    pub async fn render(&self) -> Result<String, protocol::TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Render { reply: reply_tx })
            .await
            .map_err(|_| protocol::TransportError::ActorUnavailable)?;
        reply_rx.await.map_err(|_| protocol::TransportError::ActorUnavailable)
    }
}

/// Resolves `game_name` through `fleet`, joins as `player_id`, and spawns
/// the session task. Fails outright if the game doesn't exist or the join
/// itself is rejected — there is no retry before the session has ever
/// successfully started.
pub async fn start_session(
    fleet: FleetHandle,
    game_name: impl Into<String>,
    player_id: PlayerId,
    config: SessionConfig,
) -> Result<SessionHandle, StartSessionError> {
    let game_name = game_name.into();
    let game = fleet.whereis(&game_name).await.ok_or(StartSessionError::InvalidGame)?;

    let (client, frame_rx) = client_channel();
    let frame = game
        .join(player_id.clone(), client.clone(), config.request_timeout)
        .await
        .map_err(StartSessionError::Join)?;

    let down_rx = spawn_actor_monitor(&game);
    let (command_tx, command_rx) = mpsc::channel(32);
    let mut actor = SessionActor {
        fleet,
        game_name,
        player_id,
        config,
        game,
        client,
        frame_rx,
        command_rx,
        down_rx,
        latest_sequence: 0,
        latest_frame: None,
        viewer_position: None,
        viewer_status: None,
    };
    actor.apply_frame(frame);

    tokio::spawn(actor.run());
    Ok(SessionHandle { command_tx })
}

struct SessionActor {
    fleet: FleetHandle,
    game_name: String,
    player_id: PlayerId,
    config: SessionConfig,
    game: GameActorHandle,
    client: ClientHandle,
    frame_rx: mpsc::UnboundedReceiver<Frame>,
    command_rx: mpsc::Receiver<SessionCommand>,
    down_rx: oneshot::Receiver<()>,
    latest_sequence: u64,
    latest_frame: Option<Frame>,
    viewer_position: Option<Coordinate>,
    viewer_status: Option<PlayerStatus>,
}

impl SessionActor {
    async fn run(mut self) {
        tracing::info!(game = %self.game_name, player = %self.player_id, "session started");

        loop {
            tokio::select! {
                maybe_command = self.command_rx.recv() => {
                    match maybe_command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    }
                }
                maybe_frame = self.frame_rx.recv() => {
                    if let Some(frame) = maybe_frame {
                        self.apply_frame(frame);
                    }
                }
                _ = &mut self.down_rx => {
                    tracing::warn!(game = %self.game_name, player = %self.player_id, "game actor down, reconnecting");
                    if self.reconnect().await {
                        self.down_rx = spawn_actor_monitor(&self.game);
                    } else {
                        tracing::error!(game = %self.game_name, player = %self.player_id, "reconnect attempts exhausted");
                        break;
                    }
                }
            }
        }

        tracing::info!(game = %self.game_name, player = %self.player_id, "session stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Move { direction, reply } => {
                let destination = match self.viewer_position {
                    Some(position) => direction.apply(position),
                    None => {
                        let _ = reply.send(Err(RpcError::Action(ActionError::InvalidPlayer)));
                        return;
                    }
                };
                let result = self
                    .game
                    .move_to(self.player_id.clone(), destination, self.client.clone(), self.config.request_timeout)
                    .await;
                let _ = reply.send(result);
            }
            SessionCommand::Attack { reply } => {
                let result = self
                    .game
                    .attack(self.player_id.clone(), self.client.clone(), self.config.request_timeout)
                    .await;
                let _ = reply.send(result);
            }
            SessionCommand::PlayerState { reply } => {
                let _ = reply.send(PlayerState {
                    position: self.viewer_position,
                    status: self.viewer_status,
                });
            }
            SessionCommand::GameInfo { reply } => {
                let info = self.latest_frame.as_ref().map(|frame| GameInfo {
                    sequence: frame.sequence,
                    dimensions: frame.dimensions,
                });
                let _ = reply.send(info);
            }
            SessionCommand::Render { reply } => {
                let picture = match &self.latest_frame {
                    Some(frame) => render::render(&frame.board_state, frame.dimensions, &self.player_id),
                    None => String::new(),
                };
                let _ = reply.send(picture);
            }
        }
    }

    /// Applies `frame` unless it is no newer than the last one this session
    /// has already exposed — out-of-order or duplicate frames (a possible
    /// artifact of the broadcast fan-out racing a reconnect) are dropped
    /// silently. Never regresses `viewer_position`/`viewer_status`.
    fn apply_frame(&mut self, frame: Frame) {
        if frame.sequence <= self.latest_sequence {
            tracing::debug!(
                game = %self.game_name,
                player = %self.player_id,
                sequence = frame.sequence,
                latest = self.latest_sequence,
                "dropping stale frame"
            );
            return;
        }

        self.latest_sequence = frame.sequence;
        if let Some((position, status)) = find_viewer(&frame.board_state, &self.player_id) {
            self.viewer_position = Some(position);
            self.viewer_status = Some(status);
        }
        self.latest_frame = Some(frame);
    }

    /// Waits `reconnect_delay`, re-resolves the game by name, and attempts
    /// to rejoin. Retries up to `reconnect_attempts` times; returns `false`
    /// once they're exhausted.
    async fn reconnect(&mut self) -> bool {
        for attempt in 1..=self.config.reconnect_attempts {
            tokio::time::sleep(self.config.reconnect_delay).await;

            let Some(game) = self.fleet.whereis(&self.game_name).await else {
                tracing::warn!(game = %self.game_name, attempt, "reconnect: game no longer registered");
                continue;
            };

            let (client, frame_rx) = client_channel();
            match game
                .join(self.player_id.clone(), client.clone(), self.config.request_timeout)
                .await
            {
                Ok(frame) => {
                    tracing::info!(game = %self.game_name, player = %self.player_id, attempt, "reconnected");
                    self.game = game;
                    self.client = client;
                    self.frame_rx = frame_rx;
                    // A fresh actor instance starts its own sequence space;
                    // the next frame from it is authoritative regardless of
                    // what this session had already seen.
                    self.latest_sequence = 0;
                    self.apply_frame(frame);
                    return true;
                }
                Err(err) => {
                    tracing::warn!(game = %self.game_name, player = %self.player_id, attempt, error = %err, "reconnect join failed");
                }
            }
        }
        false
    }
}

/// Spawns a detached task that resolves a oneshot the moment `handle`'s
/// actor terminates. Owns its own clone of `handle` so it never borrows
/// from the caller's `SessionActor`.
fn spawn_actor_monitor(handle: &GameActorHandle) -> oneshot::Receiver<()> {
    let handle = handle.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        handle.closed().await;
        let _ = tx.send(());
    });
    rx
}

fn find_viewer(board_state: &protocol::CoalescedBoard, viewer: &PlayerId) -> Option<(Coordinate, PlayerStatus)> {
    board_state.iter().find_map(|(coord, cell)| match cell {
        CoalescedCell::Occupied(occupants) => occupants.get(viewer).map(|status| (*coord, *status)),
        CoalescedCell::Empty(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::spawn_game_actor;
    use protocol::{FleetConfig, GameActorConfig};
    use std::collections::HashMap;

    fn occupied_by(viewer: &str, status: PlayerStatus) -> CoalescedCell {
        let mut occupants = HashMap::new();
        occupants.insert(viewer.to_string(), status);
        CoalescedCell::Occupied(occupants)
    }

    /// Builds a bare `SessionActor` without going through `start_session`,
    /// so `apply_frame` can be driven directly with hand-picked sequence
    /// numbers to exercise frame-ordering behavior in isolation.
    async fn bare_actor() -> SessionActor {
        let (handle, _join) = spawn_game_actor("frame-ordering-test", GameActorConfig::default()).expect("valid config");
        let (client, frame_rx) = client_channel();
        let (_command_tx, command_rx) = mpsc::channel(1);
        let (_down_tx, down_rx) = oneshot::channel();

        SessionActor {
            fleet: FleetHandle::new(FleetConfig::default()),
            game_name: "frame-ordering-test".to_string(),
            player_id: "viewer".to_string(),
            config: SessionConfig::default(),
            game: handle,
            client,
            frame_rx,
            command_rx,
            down_rx,
            latest_sequence: 0,
            latest_frame: None,
            viewer_position: None,
            viewer_status: None,
        }
    }

    #[tokio::test]
    async fn stale_frames_are_dropped_without_regressing_viewer_state() {
        let mut actor = bare_actor().await;

        let mut first_board = protocol::CoalescedBoard::new();
        first_board.insert(Coordinate::new(0, 0), occupied_by("viewer", PlayerStatus::Alive));
        actor.apply_frame(Frame {
            sequence: 5,
            board_state: first_board,
            dimensions: Dimensions { rows: 1, cols: 1 },
        });
        assert_eq!(actor.latest_sequence, 5);
        assert_eq!(actor.viewer_position, Some(Coordinate::new(0, 0)));

        // A frame with sequence <= latest is dropped: no change at all.
        let mut stale_board = protocol::CoalescedBoard::new();
        stale_board.insert(Coordinate::new(3, 3), occupied_by("viewer", PlayerStatus::Dead));
        actor.apply_frame(Frame {
            sequence: 3,
            board_state: stale_board,
            dimensions: Dimensions { rows: 4, cols: 4 },
        });
        assert_eq!(actor.latest_sequence, 5);
        assert_eq!(actor.viewer_position, Some(Coordinate::new(0, 0)));
        assert_eq!(actor.viewer_status, Some(PlayerStatus::Alive));

        // A duplicate of the same sequence is dropped too.
        actor.apply_frame(Frame {
            sequence: 5,
            board_state: protocol::CoalescedBoard::new(),
            dimensions: Dimensions { rows: 1, cols: 1 },
        });
        assert_eq!(actor.viewer_position, Some(Coordinate::new(0, 0)));

        // A later in-order frame still applies normally.
        let mut next_board = protocol::CoalescedBoard::new();
        next_board.insert(Coordinate::new(0, 1), occupied_by("viewer", PlayerStatus::Alive));
        actor.apply_frame(Frame {
            sequence: 6,
            board_state: next_board,
            dimensions: Dimensions { rows: 1, cols: 2 },
        });
        assert_eq!(actor.latest_sequence, 6);
        assert_eq!(actor.viewer_position, Some(Coordinate::new(0, 1)));
    }
}
