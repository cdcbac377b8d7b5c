//! Active match registration and timing gates.

use serde::{Deserialize, Serialize};
use skirmish_shared::constants::{COLLECTION_ACTIVE_MATCH, KEY_CURRENT_MATCH};
use skirmish_shared::NotifyMatchStartRequest;

use crate::config::MatchEconomyConfig;
use crate::error::{EconomyError, EconomyResult};
use crate::store::{read_json, ObjectStore, StorageKey, StorageWrite, WriteCondition};

/// The one in-flight match of a player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMatch {
    /// Match id.
    pub match_id: String,
    /// Server time at registration, epoch ms.
    pub start_time: i64,
    /// Opponent. `None` for solo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_id: Option<String>,
}

impl ActiveMatch {
    /// True for a solo session.
    #[inline]
    #[must_use]
    pub const fn is_solo(&self) -> bool {
        self.opponent_id.is_none()
    }
}

fn active_key(owner: &str) -> StorageKey {
    StorageKey::new(COLLECTION_ACTIVE_MATCH, KEY_CURRENT_MATCH, owner)
}

/// Registers a match, replacing any previous one.
///
/// # Errors
///
/// [`EconomyError::InvalidInput`] for an empty match id or a self-match,
/// storage errors otherwise.
pub fn start_match<S>(
    store: &S,
    owner: &str,
    request: &NotifyMatchStartRequest,
    now_ms: i64,
) -> EconomyResult<ActiveMatch>
where
    S: ObjectStore + ?Sized,
{
    if request.match_id.is_empty() {
        return Err(EconomyError::InvalidInput("match_id is required".to_string()));
    }
    let opponent_id = request.opponent_id.clone().filter(|o| !o.is_empty());
    if opponent_id.as_deref() == Some(owner) {
        return Err(EconomyError::InvalidInput("cannot play against yourself".to_string()));
    }

    let active = ActiveMatch {
        match_id: request.match_id.clone(),
        start_time: now_ms,
        opponent_id,
    };
    store.write(StorageWrite::json(
        active_key(owner),
        &active,
        WriteCondition::Unconditional,
    )?)?;

    tracing::info!(
        "Match start for {}: match_id={} opponent={}",
        owner,
        active.match_id,
        active.opponent_id.as_deref().unwrap_or("-")
    );
    Ok(active)
}

/// Checks a submission against the registered match.
///
/// A match past its ceiling is cleared before the rejection is returned.
///
/// # Errors
///
/// [`EconomyError::NoActiveMatch`], [`EconomyError::MatchMismatch`],
/// [`EconomyError::MatchTooShort`], [`EconomyError::StaleMatch`], or a
/// storage error.
pub fn validate_active_match<S>(
    store: &S,
    owner: &str,
    match_id: &str,
    now_ms: i64,
    config: &MatchEconomyConfig,
) -> EconomyResult<ActiveMatch>
where
    S: ObjectStore + ?Sized,
{
    let Some((active, _)) = read_json::<ActiveMatch, _>(store, &active_key(owner))? else {
        return Err(EconomyError::NoActiveMatch);
    };

    if active.match_id != match_id {
        return Err(EconomyError::MatchMismatch {
            expected: active.match_id,
            claimed: match_id.to_string(),
        });
    }

    let elapsed_ms = now_ms.saturating_sub(active.start_time);
    if elapsed_ms < config.min_match_duration_ms {
        return Err(EconomyError::MatchTooShort {
            elapsed_ms,
            min_ms: config.min_match_duration_ms,
        });
    }

    let max_ms = config.max_duration_ms(active.is_solo());
    if elapsed_ms > max_ms {
        clear_active_match(store, owner);
        return Err(EconomyError::StaleMatch { elapsed_ms, max_ms });
    }

    Ok(active)
}

/// Deletes the active match record. Failures are logged, never returned.
pub fn clear_active_match<S>(store: &S, owner: &str)
where
    S: ObjectStore + ?Sized,
{
    if let Err(e) = store.delete(&active_key(owner)) {
        tracing::error!("Failed to clear active match for {}: {}", owner, e);
    }
}
