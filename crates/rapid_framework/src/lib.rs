//! # Rapid Framework
//!
//! Building blocks for block-game server plugins:
//!
//! - [`offer`] - time-boxed offers a player must accept or decline
//! - [`tasks`] - worker pool / synchronous "main tick" task supervision
//! - [`command`] - sub-commands, argument mappers and dispatch
//! - [`events`] - chunk-boundary movement events
//! - [`serialize`] - JSON adapters for persisted plugin data
//! - [`runtime`] - plugin lifecycle
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rapid_framework::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (context, sync) = SyncContext::new(DEFAULT_TICK_INTERVAL);
//!     tokio::spawn(context.run(std::future::pending::<()>()));
//!
//!     let offers = OfferScheduler::new(Arc::new(TokioTaskSupervisor::current(sync)?));
//!     let player = PlayerId::from_name("Steve");
//!
//!     offers.send_default(
//!         player,
//!         |left| { println!("{}s left to answer", left / 1000); Ok(()) },
//!         || { println!("trade accepted"); Ok(()) },
//!         || { println!("trade request expired"); Ok(()) },
//!     );
//!     offers.accept(player);
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod error;
pub mod events;
pub mod offer;
pub mod runtime;
pub mod serialize;
pub mod tasks;
pub mod trie;
pub mod types;

pub use command::{
    ArgValue, ArgumentMapper, Arguments, CommandRegistry, CommandSender, FromArgValue, SubCommand,
    SubCommandBuilder,
};
pub use error::{CommandError, InvalidArgumentError, PluginError, PluginResult, SerializeError, TaskError, TaskResult};
pub use events::{ChunkLocation, ChunkLocationTracker, PlayerChunkLocationEvent};
pub use offer::{OfferConfig, OfferScheduler, Thresholds, DEFAULT_THRESHOLDS, DEFAULT_WAITING_WINDOW};
pub use runtime::{PluginLifecycle, PluginRuntime, PluginState};
pub use serialize::{CustomAdapter, DefaultSerializer};
pub use tasks::{
    SyncContext, SyncHandle, SyncJob, SyncReceipt, TaskHandle, TaskSupervisor, TokioTaskSupervisor,
    DEFAULT_TICK_INTERVAL,
};
pub use trie::Trie;
pub use types::PlayerId;
