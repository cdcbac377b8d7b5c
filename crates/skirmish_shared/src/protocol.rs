//! # RPC Protocol
//!
//! Inbound payloads for the two match actions the client may invoke.
//!
//! ## Trust Model
//!
//! NEVER trust these fields. The client says "I won 3 rounds in 40 seconds".
//! The server checks:
//! 1. Is there an active match with this id, started long enough ago?
//! 2. Does the opponent's claim agree with ours?
//! 3. Are the round counts consistent with the round history?

use serde::{Deserialize, Serialize};

/// Signals that the calling player has started a match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyMatchStartRequest {
    /// Client-generated match identifier, shared by both participants.
    pub match_id: String,
    /// Opponent player id. Absent for solo sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_id: Option<String>,
}

impl NotifyMatchStartRequest {
    /// Creates a solo match start request.
    #[must_use]
    pub fn solo(match_id: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            opponent_id: None,
        }
    }

    /// Creates a two-player match start request.
    #[must_use]
    pub fn versus(match_id: impl Into<String>, opponent_id: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            opponent_id: Some(opponent_id.into()),
        }
    }
}

/// One round of a finished match, as reported by the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    /// 1-based round number.
    pub round_number: u32,
    /// Whether the reporting player won this round.
    pub player_won: bool,
    /// Round wall-clock duration in seconds.
    #[serde(default)]
    pub duration_sec: u32,
}

/// Post-hoc summary of a finished match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitMatchResultRequest {
    /// Match identifier given at start.
    pub match_id: String,
    /// Claimed outcome.
    pub won: bool,
    /// Reported final score.
    #[serde(default)]
    pub final_score: i64,
    /// Reported opponent score (informational).
    #[serde(default)]
    pub opponent_score: i64,
    /// Reported match duration (informational; the server uses its own clock).
    #[serde(default)]
    pub match_duration_sec: u32,
    /// Aggregate rounds won. Superseded by `rounds` when present.
    #[serde(default)]
    pub rounds_won: u32,
    /// Aggregate rounds lost. Superseded by `rounds` when present.
    #[serde(default)]
    pub rounds_lost: u32,
    /// Per-round history. Legacy clients leave this empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rounds: Vec<RoundResult>,
    /// Pet equipped during the match.
    pub equipped_pet_id: u32,
    /// Class equipped during the match.
    pub equipped_class_id: u32,
}

impl SubmitMatchResultRequest {
    /// Returns true if the client sent per-round detail.
    #[inline]
    #[must_use]
    pub fn has_round_history(&self) -> bool {
        !self.rounds.is_empty()
    }
}
