//! `Fleet`: the name-keyed registry of running games.
//!
//! A `Mutex`/`RwLock`-guarded map of named entries, a periodic sweep that
//! drops dead ones, a listing function, and hot-reloadable named presets
//! read from a small JSON catalog.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use protocol::{FleetConfig, FleetError, GameActorConfig, GameOptions};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::actor::{spawn_game_actor, GameActorHandle};

/// One entry in the hot-reloadable catalog of named presets
/// (`name`, `max_players`, `max_board_dimension`).
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub max_players: Option<u32>,
    pub max_board_dimension: Option<u32>,
}

/// Raised by [`FleetHandle::reload_catalog`] when the supplied text isn't a
/// valid catalog.
#[derive(Debug, Clone)]
pub struct CatalogError(String);

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CatalogError {}

/// A listing row, as returned by [`FleetHandle::list`].
#[derive(Debug, Clone)]
pub struct GameSummary {
    pub name: String,
    pub player_count: usize,
    pub is_alive: bool,
}

struct FleetInner {
    games: RwLock<HashMap<String, GameActorHandle>>,
    catalog: RwLock<HashMap<String, CatalogEntry>>,
    config: FleetConfig,
}

/// Handle to the fleet registry. Cheap to clone; every clone shares the
/// same underlying map.
#[derive(Clone)]
pub struct FleetHandle {
    inner: Arc<FleetInner>,
}

impl FleetHandle {
    pub fn new(config: FleetConfig) -> Self {
        FleetHandle {
            inner: Arc::new(FleetInner {
                games: RwLock::new(HashMap::new()),
                catalog: RwLock::new(HashMap::new()),
                config,
            }),
        }
    }

    /// Registers a new game under `name` with explicit `options`. Rejects a
    /// name already in use or a full fleet before ever constructing a
    /// `GameState`.
    pub async fn new_game(&self, name: impl Into<String>, options: GameOptions) -> Result<GameActorHandle, FleetError> {
        let name = name.into();
        let mut games = self.inner.games.write().await;
        if games.contains_key(&name) {
            return Err(FleetError::NameTaken);
        }
        if let Some(max_games) = self.inner.config.max_games {
            if games.len() as u32 >= max_games {
                return Err(FleetError::MaxGames);
            }
        }

        let config = GameActorConfig {
            options,
            ..GameActorConfig::default()
        };
        let (handle, join_handle) = spawn_game_actor(name.clone(), config)?;
        games.insert(name.clone(), handle.clone());
        drop(games);

        tracing::info!(game = %name, "game registered");
        self.spawn_reaper(name, join_handle);
        Ok(handle)
    }

    /// Registers a new game under `name` using a preset looked up in the
    /// hot-reloaded catalog by `preset`.
    pub async fn new_game_from_preset(&self, name: impl Into<String>, preset: &str) -> Result<GameActorHandle, FleetError> {
        let entry = {
            let catalog = self.inner.catalog.read().await;
            catalog.get(preset).cloned()
        };
        let Some(entry) = entry else {
            return Err(FleetError::Construction(protocol::ConstructionError::InvalidOption("preset")));
        };

        let options = GameOptions {
            board: None,
            max_players: entry.max_players,
            max_board_dimension: entry.max_board_dimension,
        };
        self.new_game(name, options).await
    }

    pub async fn whereis(&self, name: &str) -> Option<GameActorHandle> {
        self.inner.games.read().await.get(name).cloned()
    }

    /// Lists every currently-registered game, including ones whose task has
    /// already died but hasn't been reaped yet.
    pub async fn list(&self) -> Vec<GameSummary> {
        let games = self.inner.games.read().await;
        let mut summaries = Vec::with_capacity(games.len());
        for (name, handle) in games.iter() {
            let is_alive = handle.is_alive();
            let player_count = if is_alive {
                handle
                    .snapshot(std::time::Duration::from_millis(500))
                    .await
                    .map(|snapshot| snapshot.player_count)
                    .unwrap_or(0)
            } else {
                0
            };
            summaries.push(GameSummary {
                name: name.clone(),
                player_count,
                is_alive,
            });
        }
        summaries
    }

    /// Shuts down and unregisters the named game, if it exists. Returns
    /// `false` if no game was registered under that name.
    pub async fn terminate(&self, name: &str) -> bool {
        let handle = self.inner.games.read().await.get(name).cloned();
        match handle {
            Some(handle) => {
                handle.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Sweeps every registered game and drops the ones whose actor has
    /// died. Automatic unregistration (see [`Self::spawn_reaper`]) makes
    /// this redundant in the common case; it exists as a periodic backstop
    /// in case a reaper task is ever slow to run.
    pub async fn reap_dead_games(&self) {
        let mut games = self.inner.games.write().await;
        games.retain(|name, handle| {
            let alive = handle.is_alive();
            if !alive {
                tracing::info!(game = %name, "removing dead game");
            }
            alive
        });
    }

    /// Replaces the catalog wholesale from a JSON array of
    /// `{name, max_players, max_board_dimension}` objects.
    pub async fn reload_catalog(&self, json_text: &str) -> Result<(), CatalogError> {
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(json_text).map_err(|err| CatalogError(format!("failed to parse catalog: {err}")))?;
        let new_catalog: HashMap<String, CatalogEntry> = entries.into_iter().map(|entry| (entry.name.clone(), entry)).collect();

        let mut catalog = self.inner.catalog.write().await;
        *catalog = new_catalog;
        Ok(())
    }

    /// The currently loaded catalog, keyed by preset name.
    pub async fn catalog(&self) -> HashMap<String, CatalogEntry> {
        self.inner.catalog.read().await.clone()
    }

    /// Automatically unregisters `name` the moment its actor task
    /// terminates, whatever the cause — a fatal invariant panic included.
    fn spawn_reaper(&self, name: String, join_handle: tokio::task::JoinHandle<()>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _ = join_handle.await;
            let mut games = inner.games.write().await;
            if games.remove(&name).is_some() {
                tracing::info!(game = %name, "game actor terminated, unregistered");
            }
        });
    }
}
