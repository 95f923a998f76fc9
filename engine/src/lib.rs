//! The concurrency and lifecycle layer: one [`actor::GameActor`] task per
//! running game, one [`session::PlaySession`] task per connected client,
//! and the [`fleet::Fleet`] registry tying names to running games.
//!
//! `board` and `state` are pure; everything in this crate is where time,
//! randomness, and task supervision actually happen.

mod actor;
mod client;
mod error;
mod fleet;
mod session;

pub use actor::{spawn_game_actor, GameActorHandle, GameSnapshot};
pub use client::{client_channel, ClientHandle};
pub use error::RpcError;
pub use fleet::{CatalogEntry, CatalogError, FleetHandle, GameSummary};
pub use session::{start_session, GameInfo, PlayerState, SessionHandle, StartSessionError};

pub use protocol::{
    ActionError, Cell, CoalescedBoard, CoalescedCell, ConstructionError, Coordinate, Dimensions, Direction, FleetConfig, Frame,
    GameActorConfig, GameOptions, PlayerId, PlayerRecord, PlayerStatus, SessionConfig, TransportError,
};
