//! # Match Lifecycle
//!
//! ```text
//!  notify_match_start            submit_match_result
//!         │                             │
//!         ▼                             ▼
//!  ┌─────────────┐   cache hit?  ──► cached response (byte-identical)
//!  │   ACTIVE    │                      │
//!  └─────────────┘   validate request ◄─┘   (bad id / too short / stale)
//!                           │
//!                    write-first consensus  ──► pending | ok | resolved | conflict
//!                           │
//!                    prepare settlement (XP, tokens, exchange, cache write)
//!                           │
//!                    ONE atomic commit
//!                           │
//!                    clear active match + notify   (best effort, logged)
//! ```
//!
//! All coordination goes through the store. [`MatchService`] holds no
//! per-match state and is shared freely across threads.

pub mod active;
pub mod consensus;
pub mod rounds;
pub mod settlement;

use std::sync::Arc;

use skirmish_shared::constants::{COLLECTION_RESULT_CACHE, SOURCE_XP_GRANT};
use skirmish_shared::{NotifyMatchStartRequest, RewardPayload, SubmitMatchResultRequest};

use crate::batch::PendingBatch;
use crate::clock::{Clock, SystemClock};
use crate::commit::commit_batch;
use crate::config::EconomyConfig;
use crate::error::{EconomyError, EconomyResult};
use crate::loot::IdGenerator;
use crate::progression::{prepare_experience, LevelChange, LeveledItem};
use crate::store::{Backend, Notifier, StorageKey, StorageWrite, WriteCondition};

pub use active::{clear_active_match, start_match, validate_active_match, ActiveMatch};
pub use consensus::{
    claim_key, resolve_consensus, settlement_key, Consensus, ConsensusRole, MatchResultRecord,
    SettlementMarker,
};
pub use rounds::{validate_rounds, RoundAudit};
pub use settlement::{prepare_settlement, DailyCounter, SettlementContext};

/// Response to a result submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchSettlement {
    /// JSON response, identical for every retry.
    pub response: String,
    /// Freshly committed payload. `None` when served from the cache.
    pub payload: Option<RewardPayload>,
    /// Consensus role. `None` when served from the cache.
    pub role: Option<ConsensusRole>,
}

impl MatchSettlement {
    /// True if this response was replayed from the result cache.
    #[inline]
    #[must_use]
    pub const fn from_cache(&self) -> bool {
        self.payload.is_none()
    }

    fn cached(response: String) -> Self {
        Self {
            response,
            payload: None,
            role: None,
        }
    }
}

/// Entry point for match actions.
pub struct MatchService {
    config: Arc<EconomyConfig>,
    store: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    ids: IdGenerator,
}

impl MatchService {
    /// Creates a service on the system clock.
    #[must_use]
    pub fn new(
        config: Arc<EconomyConfig>,
        store: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_parts(config, store, notifier, Arc::new(SystemClock), IdGenerator::from_time())
    }

    /// Creates a service with an explicit clock and id source.
    #[must_use]
    pub fn with_parts(
        config: Arc<EconomyConfig>,
        store: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        ids: IdGenerator,
    ) -> Self {
        Self {
            config,
            store,
            notifier,
            clock,
            ids,
        }
    }

    /// The loaded configuration.
    #[must_use]
    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// Registers the start of a match for `owner`.
    ///
    /// # Errors
    ///
    /// Validation or storage errors.
    pub fn notify_match_start(
        &self,
        owner: &str,
        request: &NotifyMatchStartRequest,
    ) -> EconomyResult<ActiveMatch> {
        require_identity(owner)?;
        start_match(self.store.as_ref(), owner, request, self.clock.now_ms())
    }

    /// Settles a match result for `owner`, exactly once.
    ///
    /// # Errors
    ///
    /// - validation: identity, match id, pet or class id
    /// - rejection: no/mismatched/too-short/stale active match
    /// - infrastructure: storage or commit failure (nothing applied)
    pub fn submit_match_result(
        &self,
        owner: &str,
        request: &SubmitMatchResultRequest,
    ) -> EconomyResult<MatchSettlement> {
        require_identity(owner)?;
        if request.match_id.is_empty() {
            return Err(EconomyError::InvalidInput("match_id is required".to_string()));
        }

        let store = self.store.as_ref();
        let cache_key = StorageKey::new(
            COLLECTION_RESULT_CACHE,
            format!("{}_{owner}", request.match_id),
            owner,
        );
        // A settled match answers the same even if the catalog changed since.
        if let Some(cached) = store.read(&cache_key)? {
            tracing::debug!(
                "Returning cached result for match {} user {}",
                request.match_id,
                owner
            );
            return Ok(MatchSettlement::cached(cached.value));
        }
        self.validate_equipment(request)?;

        let economy = &self.config.match_economy;
        let mut request = request.clone();
        validate_rounds(&mut request, economy.suspicious_round_sec);

        let now_ms = self.clock.now_ms();
        let active = validate_active_match(store, owner, &request.match_id, now_ms, economy)
            .map_err(|e| {
                tracing::warn!("Match validation failed for {}: {}", owner, e);
                e
            })?;

        let consensus = resolve_consensus(
            store,
            owner,
            active.opponent_id.as_deref(),
            &request.match_id,
            request.won,
            request.final_score,
            now_ms,
        )?;
        let honored_win = consensus.role.honors_win() && consensus.claimed_win;
        match consensus.role {
            ConsensusRole::Ok => {}
            ConsensusRole::Conflict => tracing::warn!(
                "Match {}: both players claimed victory, voiding win for {}",
                request.match_id,
                owner
            ),
            role => tracing::info!(
                "Match {}: {} settles as {}, participation rewards only",
                request.match_id,
                owner,
                role
            ),
        }

        let ctx = SettlementContext {
            owner,
            request: &request,
            solo: active.is_solo(),
            honored_win,
            role: consensus.role,
            now_ms,
        };
        let (mut batch, exchange) = prepare_settlement(store, &self.config, &self.ids, &ctx)?;
        batch.stamp_payload(&self.ids.reward_id(), now_ms);

        let response = match batch.payload() {
            Some(payload) => serde_json::to_string(payload)?,
            None => "{}".to_string(),
        };
        batch.add_write(StorageWrite {
            key: cache_key.clone(),
            value: response.clone(),
            condition: WriteCondition::IfAbsent,
        });

        let payload = match commit_batch(store, batch) {
            Ok(payload) => payload,
            Err(e) => {
                // A concurrent duplicate may have landed first.
                if let Ok(Some(cached)) = store.read(&cache_key) {
                    tracing::info!(
                        "Concurrent submission already settled match {} for {}",
                        request.match_id,
                        owner
                    );
                    return Ok(MatchSettlement::cached(cached.value));
                }
                return Err(e);
            }
        };

        clear_active_match(store, owner);
        if let Some(payload) = &payload {
            self.deliver(owner, payload);
        }

        tracing::info!(
            "Match result processed for {}: match={} role={} won={} tokens_earned={} exchange={}",
            owner,
            request.match_id,
            consensus.role,
            honored_win,
            exchange.earned,
            exchange.triggered
        );

        Ok(MatchSettlement {
            response,
            payload,
            role: Some(consensus.role),
        })
    }

    /// Grants experience to a pet, class or the player outside a match.
    ///
    /// # Errors
    ///
    /// Validation, progression, or commit errors.
    pub fn grant_item_experience(
        &self,
        owner: &str,
        item: LeveledItem,
        amount: u64,
    ) -> EconomyResult<(LevelChange, Option<RewardPayload>)> {
        require_identity(owner)?;

        let mut batch = PendingBatch::new();
        let change = prepare_experience(
            self.store.as_ref(),
            &self.config,
            owner,
            item,
            amount,
            &mut batch,
        )?;
        if change.experience_added > 0 {
            // Level-up sub-batches may have created the payload first.
            let payload = batch.payload_mut(SOURCE_XP_GRANT);
            payload.source = Some(SOURCE_XP_GRANT.to_string());
            payload.progression_mut().xp_granted = Some(change.experience_added);
        }
        batch.stamp_payload(&self.ids.reward_id(), self.clock.now_ms());

        let payload = commit_batch(self.store.as_ref(), batch)?;
        if let Some(payload) = &payload {
            self.deliver(owner, payload);
        }
        Ok((change, payload))
    }

    fn validate_equipment(&self, request: &SubmitMatchResultRequest) -> EconomyResult<()> {
        let catalog = &self.config.catalog;
        if catalog.pet(request.equipped_pet_id).is_none() {
            tracing::warn!("Invalid pet id in match result: {}", request.equipped_pet_id);
            return Err(EconomyError::InvalidItemId {
                category: "pet",
                id: request.equipped_pet_id,
            });
        }
        if catalog.class(request.equipped_class_id).is_none() {
            tracing::warn!("Invalid class id in match result: {}", request.equipped_class_id);
            return Err(EconomyError::InvalidItemId {
                category: "class",
                id: request.equipped_class_id,
            });
        }
        Ok(())
    }

    fn deliver(&self, owner: &str, payload: &RewardPayload) {
        if let Err(e) = self.notifier.notify(owner, payload) {
            tracing::error!("Failed to deliver reward {} to {}: {}", payload.reward_id, owner, e);
        }
    }
}

fn require_identity(owner: &str) -> EconomyResult<()> {
    if owner.is_empty() {
        return Err(EconomyError::MissingIdentity);
    }
    Ok(())
}
