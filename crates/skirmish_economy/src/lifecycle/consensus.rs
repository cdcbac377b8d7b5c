//! # Write-First Consensus
//!
//! Two players report the same match with no referee. Each player only ever
//! writes its *own* claim record, and always before reading the opponent's:
//!
//! ```text
//! write own claim (IfAbsent, reused on retry)
//!        │
//! read opponent ──► absent ─────────────────────────────► Pending
//!        │      ──► resolved ───────────────────────────► Resolved
//!        │      ──► both claim a win ───────────────────► Conflict
//!        ▼
//! write settlement marker (IfAbsent)
//!        │
//!        ├──► written, or ours from an earlier attempt ─► Ok  (claim marked resolved)
//!        └──► held by the opponent ─────────────────────► Resolved
//! ```
//!
//! A player that finds no opposing claim is `Pending`, and the opponent will
//! see its claim. Players that see each other's claims race on the marker,
//! where the store admits one `IfAbsent` write. Unless both claim the win,
//! exactly one player ends up `Ok`.

use std::fmt;

use serde::{Deserialize, Serialize};
use skirmish_shared::constants::{
    COLLECTION_MATCH_RESULTS, COLLECTION_MATCH_SETTLEMENTS, SYSTEM_USER_ID,
};

use crate::error::{EconomyError, EconomyResult};
use crate::store::{read_json, ObjectStore, StorageKey, StorageWrite, Version, WriteCondition};

/// Outcome of the protocol for one submitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConsensusRole {
    /// First submitter; opponent not in yet.
    Pending,
    /// Second submitter; settlement is ours.
    Ok,
    /// Opponent already settled.
    Resolved,
    /// Both claimed a win.
    Conflict,
}

impl ConsensusRole {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ok => "ok",
            Self::Resolved => "resolved",
            Self::Conflict => "conflict",
        }
    }

    /// Only `Ok` honors a claimed win.
    #[inline]
    #[must_use]
    pub const fn honors_win(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for ConsensusRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One player's claim for one match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResultRecord {
    /// Claiming player.
    pub user_id: String,
    /// Claimed win.
    pub claimed_win: bool,
    /// Reported score.
    pub score: i64,
    /// Submission time, epoch ms.
    pub submitted_at: i64,
    /// Set by the submitter that settled the match.
    pub resolved: bool,
}

/// Result of [`resolve_consensus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Consensus {
    /// Assigned role.
    pub role: ConsensusRole,
    /// The claim on record. A retry cannot change it.
    pub claimed_win: bool,
}

/// Storage key of a claim record.
#[must_use]
pub fn claim_key(match_id: &str, owner: &str) -> StorageKey {
    StorageKey::new(COLLECTION_MATCH_RESULTS, format!("{match_id}_{owner}"), owner)
}

/// Storage key of the settlement marker of a match.
#[must_use]
pub fn settlement_key(match_id: &str) -> StorageKey {
    StorageKey::new(COLLECTION_MATCH_SETTLEMENTS, match_id, SYSTEM_USER_ID)
}

/// Who settled a match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementMarker {
    /// Player that took the `Ok` role.
    pub settled_by: String,
    /// Time of settlement, epoch ms.
    pub settled_at: i64,
}

/// Runs the protocol for `owner`. Solo sessions are always `Ok`.
///
/// # Errors
///
/// Any storage failure aborts the submission before rewards are computed.
pub fn resolve_consensus<S>(
    store: &S,
    owner: &str,
    opponent: Option<&str>,
    match_id: &str,
    claimed_win: bool,
    score: i64,
    now_ms: i64,
) -> EconomyResult<Consensus>
where
    S: ObjectStore + ?Sized,
{
    let Some(opponent) = opponent else {
        return Ok(Consensus {
            role: ConsensusRole::Ok,
            claimed_win,
        });
    };

    let own_key = claim_key(match_id, owner);
    let (mut claim, version) = write_claim(store, &own_key, owner, claimed_win, score, now_ms)?;
    let recorded_win = claim.claimed_win;
    let finish = move |role| Consensus {
        role,
        claimed_win: recorded_win,
    };

    let their_key = claim_key(match_id, opponent);
    let Some((theirs, _)) = read_json::<MatchResultRecord, _>(store, &their_key)? else {
        return Ok(finish(ConsensusRole::Pending));
    };
    if theirs.resolved {
        return Ok(finish(ConsensusRole::Resolved));
    }
    if recorded_win && theirs.claimed_win {
        tracing::warn!(
            "Conflict in match {}: both {} and {} claimed victory",
            match_id,
            owner,
            opponent
        );
        return Ok(finish(ConsensusRole::Conflict));
    }

    if !claim_settlement(store, match_id, owner, now_ms)? {
        tracing::info!("Match {} already settled by {}", match_id, opponent);
        return Ok(finish(ConsensusRole::Resolved));
    }

    if !claim.resolved {
        claim.resolved = true;
        store.write(StorageWrite::json(
            own_key,
            &claim,
            WriteCondition::IfVersion(version),
        )?)?;
    }
    Ok(finish(ConsensusRole::Ok))
}

/// Takes the settlement marker. `true` if `owner` holds it, now or from an
/// earlier attempt.
fn claim_settlement<S>(store: &S, match_id: &str, owner: &str, now_ms: i64) -> EconomyResult<bool>
where
    S: ObjectStore + ?Sized,
{
    let key = settlement_key(match_id);
    let marker = SettlementMarker {
        settled_by: owner.to_string(),
        settled_at: now_ms,
    };

    match store.write(StorageWrite::json(key.clone(), &marker, WriteCondition::IfAbsent)?) {
        Ok(_) => Ok(true),
        Err(EconomyError::VersionConflict { .. }) => {
            let (held, _) = read_json::<SettlementMarker, _>(store, &key)?.ok_or_else(|| {
                EconomyError::StorageRead(format!("settlement {key} vanished after conflict"))
            })?;
            Ok(held.settled_by == owner)
        }
        Err(e) => Err(e),
    }
}

fn write_claim<S>(
    store: &S,
    key: &StorageKey,
    owner: &str,
    claimed_win: bool,
    score: i64,
    now_ms: i64,
) -> EconomyResult<(MatchResultRecord, Version)>
where
    S: ObjectStore + ?Sized,
{
    let claim = MatchResultRecord {
        user_id: owner.to_string(),
        claimed_win,
        score,
        submitted_at: now_ms,
        resolved: false,
    };

    match store.write(StorageWrite::json(key.clone(), &claim, WriteCondition::IfAbsent)?) {
        Ok(version) => Ok((claim, version)),
        Err(EconomyError::VersionConflict { .. }) => {
            let stored = read_json::<MatchResultRecord, _>(store, key)?.ok_or_else(|| {
                EconomyError::StorageRead(format!("claim {key} vanished after conflict"))
            })?;
            if stored.0.claimed_win != claimed_win {
                tracing::warn!(
                    "{} resubmitted match claim with a different outcome; keeping the stored claim",
                    owner
                );
            }
            Ok(stored)
        }
        Err(e) => Err(e),
    }
}
