//! # SKIRMISH Economy
//!
//! Authoritative match settlement for SKIRMISH: experience, currency and
//! loot, granted exactly once per player per match.
//!
//! ## Design Principles
//!
//! 1. **One commit per action** - every effect is prepared into a
//!    [`PendingBatch`] and lands through a single atomic multi-update
//! 2. **Integer math only** - tokens are counted in half-units
//! 3. **Write before read** - match consensus needs no referee and no lock
//! 4. **External configuration** - all balance data in one TOML file
//!
//! ## Layers
//!
//! ```text
//! rpc ──► lifecycle ──► progression / tokens / loot ──► batch ──► commit
//!                                                                   │
//!                                  store traits ◄───────────────────┘
//!                                  (memory + journal reference backend)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skirmish_economy::{EconomyConfig, MatchService, MemoryNotifier, MemoryStore};
//!
//! let config = Arc::new(EconomyConfig::load("data/economy.toml")?);
//! let service = MatchService::new(config, Arc::new(MemoryStore::new()), Arc::new(MemoryNotifier::new()));
//!
//! service.notify_match_start("player-1", &NotifyMatchStartRequest::versus("m-42", "player-2"))?;
//! // ... at least 10 seconds later
//! let settlement = service.submit_match_result("player-1", &request)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod batch;
pub mod clock;
pub mod commit;
pub mod config;
pub mod error;
pub mod journal;
pub mod lifecycle;
pub mod loot;
pub mod memory;
pub mod progression;
pub mod rpc;
pub mod store;
pub mod tokens;

pub use batch::PendingBatch;
pub use clock::{Clock, ManualClock, SystemClock};
pub use commit::commit_batch;
pub use config::{EconomyConfig, LootConfig, MatchEconomyConfig};
pub use error::{EconomyError, EconomyResult, ErrorKind};
pub use journal::{CommitJournal, JournalOp};
pub use lifecycle::{ConsensusRole, MatchService, MatchSettlement};
pub use loot::{IdGenerator, LootContainer};
pub use memory::{MemoryNotifier, MemoryStore};
pub use progression::{ItemProgression, LevelChange, LevelCurve, LevelReward, LeveledItem};
pub use rpc::{rpc_notify_match_start, rpc_submit_match_result, RpcError};
pub use store::{
    AtomicCommitter, Backend, Ledger, LedgerDelta, Notifier, ObjectStore, StorageKey,
    StorageWrite, StoredObject, Version, WriteCondition,
};
pub use tokens::{compute_tokens_earned, resolve_exchange, ExchangeOutcome};
