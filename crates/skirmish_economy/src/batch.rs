//! # Pending Batch
//!
//! **Deferred, mergeable writes**
//!
//! Every reward path prepares its effects into a [`PendingBatch`] instead of
//! touching storage. Sub-operations (XP, level rewards, token exchange, loot)
//! each prepare their own batch and the caller merges them into one, which is
//! then handed to [`crate::commit::commit_batch`] exactly once.
//!
//! ## Merge Rules
//!
//! | Part            | Rule                                            |
//! |-----------------|-------------------------------------------------|
//! | object writes   | concatenated in order                           |
//! | ledger deltas   | summed per (owner, currency)                    |
//! | wallet payload  | summed                                          |
//! | lists           | appended (unlocks, containers)                  |
//! | singular fields | first value wins; later merges never overwrite  |
//!
//! A batch never validates what it is given. That is the caller's job.

use std::collections::BTreeMap;

use skirmish_shared::reward::{ProgressionDelta, RewardMeta, RewardPayload};

use crate::store::{LedgerDelta, StorageWrite};

/// Writes, ledger deltas and one notification payload, not yet committed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingBatch {
    /// Object writes in insertion order.
    writes: Vec<StorageWrite>,
    /// owner -> currency -> summed delta.
    ledger: BTreeMap<String, BTreeMap<String, i64>>,
    /// Outward notification.
    payload: Option<RewardPayload>,
}

impl PendingBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an object write.
    pub fn add_write(&mut self, write: StorageWrite) {
        self.writes.push(write);
    }

    /// Adds signed currency deltas for one owner.
    pub fn add_ledger_delta<'a, I>(&mut self, owner: &str, changes: I)
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        let wallet = self.ledger.entry(owner.to_string()).or_default();
        for (currency, delta) in changes {
            let slot = wallet.entry(currency.to_string()).or_insert(0);
            *slot = slot.saturating_add(delta);
        }
    }

    /// Unions `other` into `self`. See the module docs for the rules.
    pub fn merge(&mut self, other: Self) {
        self.writes.extend(other.writes);

        for (owner, changes) in other.ledger {
            self.add_ledger_delta(&owner, changes.iter().map(|(c, d)| (c.as_str(), *d)));
        }

        if let Some(theirs) = other.payload {
            match self.payload.as_mut() {
                Some(ours) => merge_payload(ours, theirs),
                None => self.payload = Some(theirs),
            }
        }
    }

    /// True if committing would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.ledger.values().all(|w| w.values().all(|d| *d == 0))
    }

    /// Pending object writes.
    #[must_use]
    pub fn writes(&self) -> &[StorageWrite] {
        &self.writes
    }

    /// Summed delta for one (owner, currency). Zero if none.
    #[must_use]
    pub fn ledger_delta(&self, owner: &str, currency: &str) -> i64 {
        self.ledger
            .get(owner)
            .and_then(|w| w.get(currency))
            .copied()
            .unwrap_or(0)
    }

    /// Non-zero deltas grouped per owner.
    #[must_use]
    pub fn ledger_deltas(&self) -> Vec<LedgerDelta> {
        self.ledger
            .iter()
            .filter_map(|(owner, changes)| {
                let changes: BTreeMap<String, i64> = changes
                    .iter()
                    .filter(|(_, d)| **d != 0)
                    .map(|(c, d)| (c.clone(), *d))
                    .collect();
                (!changes.is_empty()).then(|| LedgerDelta {
                    owner: owner.clone(),
                    changes,
                })
            })
            .collect()
    }

    /// The notification payload, if any sub-operation produced one.
    #[must_use]
    pub fn payload(&self) -> Option<&RewardPayload> {
        self.payload.as_ref()
    }

    /// The notification payload, created with `source` if absent.
    pub fn payload_mut(&mut self, source: &str) -> &mut RewardPayload {
        self.payload
            .get_or_insert_with(|| RewardPayload::new(String::new(), 0, source))
    }

    /// Stamps identity onto the payload if it has none yet.
    pub fn stamp_payload(&mut self, reward_id: &str, created_at: i64) {
        if let Some(payload) = self.payload.as_mut() {
            if payload.reward_id.is_empty() {
                payload.reward_id = reward_id.to_string();
                payload.created_at = created_at;
            }
        }
    }

    /// Splits the batch into writes, deltas and payload.
    #[must_use]
    pub fn into_parts(self) -> (Vec<StorageWrite>, Vec<LedgerDelta>, Option<RewardPayload>) {
        let deltas = self.ledger_deltas();
        (self.writes, deltas, self.payload)
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn merge_payload(ours: &mut RewardPayload, theirs: RewardPayload) {
    fill(&mut ours.source, theirs.source);
    fill(&mut ours.reason_key, theirs.reason_key);

    if let Some(wallet) = theirs.wallet {
        let sum = ours.wallet_mut();
        sum.gold = sum.gold.saturating_add(wallet.gold);
        sum.gems = sum.gems.saturating_add(wallet.gems);
    }

    if let Some(progression) = theirs.progression {
        merge_progression(ours.progression_mut(), progression);
    }

    ours.containers.extend(theirs.containers);

    if let Some(meta) = theirs.meta {
        merge_meta(ours.meta_mut(), meta);
    }
}

fn merge_progression(ours: &mut ProgressionDelta, theirs: ProgressionDelta) {
    fill(&mut ours.xp_granted, theirs.xp_granted);
    fill(&mut ours.xp_base, theirs.xp_base);
    fill(&mut ours.new_player_level, theirs.new_player_level);
    fill(&mut ours.new_pet_level, theirs.new_pet_level);
    fill(&mut ours.new_class_level, theirs.new_class_level);
    ours.unlocks.extend(theirs.unlocks);
}

fn merge_meta(ours: &mut RewardMeta, theirs: RewardMeta) {
    fill(&mut ours.drops_remaining, theirs.drops_remaining);
    fill(&mut ours.daily_matches, theirs.daily_matches);
    fill(&mut ours.round_tokens, theirs.round_tokens);
    fill(&mut ours.tokens_earned, theirs.tokens_earned);
    fill(&mut ours.consensus, theirs.consensus);
}
