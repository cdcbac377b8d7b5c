//! # SKIRMISH Shared
//!
//! Wire types exchanged between the game client and the economy server.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER perform I/O. It only describes:
//! - Inbound request payloads (`protocol`)
//! - The outward reward notification (`reward`)
//! - Storage collection names and wallet currency keys (`constants`)
//!
//! If you need storage, put it in `skirmish_economy`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod protocol;
pub mod reward;

pub use protocol::{NotifyMatchStartRequest, RoundResult, SubmitMatchResultRequest};
pub use reward::{
    ContainerGrant, ContainerTier, ProgressionDelta, ProgressionUnlock, RewardMeta, RewardPayload,
    UnlockKind, WalletDelta,
};
