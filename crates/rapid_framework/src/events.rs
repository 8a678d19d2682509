//! Chunk-level player movement events.
//!
//! Movement packets arrive many times per second; most plugins only care when
//! a player enters a different chunk (area claims, region greetings...).
//! [`ChunkLocationTracker`] turns raw positions into a
//! [`PlayerChunkLocationEvent`] that fires only on chunk boundary crossings.

use crate::types::PlayerId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

/// Blocks per chunk edge, as a shift.
const CHUNK_SHIFT: i32 = 4;

/// A chunk of a world, addressed by chunk coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkLocation {
    pub world: String,
    pub i: i32,
    pub j: i32,
}

impl ChunkLocation {
    pub fn new(world: impl Into<String>, i: i32, j: i32) -> Self {
        Self {
            world: world.into(),
            i,
            j,
        }
    }

    /// Chunk containing block column (`x`, `z`).
    pub fn from_block(world: impl Into<String>, x: i32, z: i32) -> Self {
        Self::new(world, x >> CHUNK_SHIFT, z >> CHUNK_SHIFT)
    }

    /// Chunk containing the entity position (`x`, `z`).
    pub fn from_position(world: impl Into<String>, x: f64, z: f64) -> Self {
        Self::from_block(world, x.floor() as i32, z.floor() as i32)
    }
}

impl std::fmt::Display for ChunkLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{},{}", self.world, self.i, self.j)
    }
}

/// A player moved from one chunk to another. Handlers may cancel the move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerChunkLocationEvent {
    pub player: PlayerId,
    pub from: ChunkLocation,
    pub to: ChunkLocation,
    #[serde(default)]
    cancelled: bool,
}

impl PlayerChunkLocationEvent {
    pub fn new(player: PlayerId, from: ChunkLocation, to: ChunkLocation) -> Self {
        Self {
            player,
            from,
            to,
            cancelled: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

type ChunkHandler = Arc<dyn Fn(&mut PlayerChunkLocationEvent) + Send + Sync>;

/// Remembers the chunk of every online player and emits
/// [`PlayerChunkLocationEvent`]s to the registered handlers.
#[derive(Default)]
pub struct ChunkLocationTracker {
    last_chunk: DashMap<PlayerId, ChunkLocation>,
    handlers: RwLock<Vec<ChunkHandler>>,
}

impl ChunkLocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Handlers run in registration order; every handler
    /// sees the event, including ones already cancelled.
    pub fn on_chunk_change<F>(&self, handler: F)
    where
        F: Fn(&mut PlayerChunkLocationEvent) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.push(Arc::new(handler));
    }

    /// Feeds a movement of `player` to (`x`, `z`) in `world`.
    ///
    /// Returns `false` if the move crossed a chunk boundary and a handler
    /// cancelled it; the remembered chunk is left unchanged in that case.
    /// The first position seen for a player only records the chunk.
    pub fn handle_move(&self, player: PlayerId, world: &str, x: f64, z: f64) -> bool {
        let to = ChunkLocation::from_position(world, x, z);

        let from = match self.last_chunk.get(&player) {
            Some(current) if *current == to => return true,
            Some(current) => current.clone(),
            None => {
                trace!("First chunk of {} is {}", player, to);
                self.last_chunk.insert(player, to);
                return true;
            }
        };

        let mut event = PlayerChunkLocationEvent::new(player, from, to);
        let handlers: Vec<ChunkHandler> = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for handler in &handlers {
            handler(&mut event);
        }

        if event.is_cancelled() {
            debug!("Chunk move of {} from {} to {} cancelled", player, event.from, event.to);
            return false;
        }

        self.last_chunk.insert(player, event.to);
        true
    }

    /// The chunk `player` was last seen in.
    pub fn current_chunk(&self, player: PlayerId) -> Option<ChunkLocation> {
        self.last_chunk.get(&player).map(|chunk| chunk.clone())
    }

    /// Drops the remembered chunk of a player (on quit).
    pub fn forget(&self, player: PlayerId) {
        self.last_chunk.remove(&player);
    }
}

impl std::fmt::Debug for ChunkLocationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkLocationTracker")
            .field("tracked_players", &self.last_chunk.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_chunk_from_block_handles_negatives() {
        assert_eq!(ChunkLocation::from_block("world", 0, 15), ChunkLocation::new("world", 0, 0));
        assert_eq!(ChunkLocation::from_block("world", 16, -1), ChunkLocation::new("world", 1, -1));
        assert_eq!(ChunkLocation::from_position("world", -0.5, -16.0), ChunkLocation::new("world", -1, -1));
        assert_eq!(ChunkLocation::new("nether", 2, -3).to_string(), "nether@2,-3");
    }

    #[test]
    fn test_event_only_fires_on_chunk_change() {
        let tracker = ChunkLocationTracker::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        tracker.on_chunk_change(move |event| {
            s.lock().unwrap().push((event.from.clone(), event.to.clone()));
        });

        let player = PlayerId::new();
        assert!(tracker.handle_move(player, "world", 1.0, 1.0));
        assert!(tracker.handle_move(player, "world", 8.0, 15.9));
        assert!(seen.lock().unwrap().is_empty());

        assert!(tracker.handle_move(player, "world", 16.2, 1.0));
        assert!(tracker.handle_move(player, "world_nether", 16.2, 1.0));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (ChunkLocation::new("world", 0, 0), ChunkLocation::new("world", 1, 0)),
                (ChunkLocation::new("world", 1, 0), ChunkLocation::new("world_nether", 1, 0)),
            ]
        );
    }

    #[test]
    fn test_cancelled_move_keeps_old_chunk() {
        let tracker = ChunkLocationTracker::new();
        let calls = Arc::new(AtomicUsize::new(0));
        tracker.on_chunk_change(|event| {
            if event.to.i >= 2 {
                event.set_cancelled(true);
            }
        });
        let c = calls.clone();
        tracker.on_chunk_change(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let player = PlayerId::new();
        tracker.handle_move(player, "world", 0.0, 0.0);
        assert!(!tracker.handle_move(player, "world", 40.0, 0.0));
        assert_eq!(tracker.current_chunk(player), Some(ChunkLocation::new("world", 0, 0)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(tracker.handle_move(player, "world", 20.0, 0.0));
        assert_eq!(tracker.current_chunk(player), Some(ChunkLocation::new("world", 1, 0)));

        tracker.forget(player);
        assert_eq!(tracker.current_chunk(player), None);
    }
}
