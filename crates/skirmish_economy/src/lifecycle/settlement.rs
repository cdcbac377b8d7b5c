//! # Match Settlement
//!
//! Builds the one batch a submission commits:
//!
//! ```text
//! daily counter write (OCC)
//! + player progression write (OCC) + level rewards
//! + round-token / drop-slot deltas (+ container write on exchange)
//! + payload meta
//! ```
//!
//! Balances are read fresh here, right before the exchange is sized.

use serde::{Deserialize, Serialize};
use skirmish_shared::constants::{
    COLLECTION_DAILY, CURRENCY_DROPS_LEFT, CURRENCY_ROUND_TOKENS, KEY_DAILY_MATCHES,
    REASON_MATCH_COMPLETE, SOURCE_MATCH,
};
use skirmish_shared::SubmitMatchResultRequest;

use crate::batch::PendingBatch;
use crate::clock::utc_midnight_secs;
use crate::config::{EconomyConfig, MatchEconomyConfig};
use crate::error::EconomyResult;
use crate::lifecycle::consensus::ConsensusRole;
use crate::loot::{prepare_container, IdGenerator};
use crate::progression::{prepare_experience, LeveledItem};
use crate::store::{read_json, Backend, StorageKey, StorageWrite, WriteCondition};
use crate::tokens::{compute_tokens_earned, resolve_exchange, ExchangeOutcome};

/// Matches settled in the current UTC day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounter {
    /// Settled matches.
    pub count: u32,
    /// UTC midnight the count belongs to, epoch seconds.
    pub reset_unix: i64,
}

/// Everything settlement needs to know about one submission.
#[derive(Clone, Copy, Debug)]
pub struct SettlementContext<'a> {
    /// Submitting player.
    pub owner: &'a str,
    /// Request, with round counts already audited.
    pub request: &'a SubmitMatchResultRequest,
    /// Solo session.
    pub solo: bool,
    /// Win honored by consensus.
    pub honored_win: bool,
    /// Consensus role, reported in the payload.
    pub role: ConsensusRole,
    /// Server time, epoch ms.
    pub now_ms: i64,
}

/// Base XP before diminishing returns.
#[must_use]
pub fn base_match_xp(config: &MatchEconomyConfig, honored_win: bool, solo: bool) -> u64 {
    let xp = if honored_win {
        config.win_xp
    } else {
        config.loss_xp
    };
    if solo {
        (xp / 2).max(1)
    } else {
        xp
    }
}

/// XP after the daily schedule for the `index`-th match of the day. At least 1.
#[must_use]
pub fn diminished_xp(config: &MatchEconomyConfig, base: u64, index: u32) -> u64 {
    (base.saturating_mul(u64::from(config.daily_xp_percent(index))) / 100).max(1)
}

/// Prepares the full settlement of one submission.
///
/// # Errors
///
/// Storage read failures and progression errors. Nothing is written.
pub fn prepare_settlement<S>(
    store: &S,
    config: &EconomyConfig,
    ids: &IdGenerator,
    ctx: &SettlementContext<'_>,
) -> EconomyResult<(PendingBatch, ExchangeOutcome)>
where
    S: Backend + ?Sized,
{
    let economy = &config.match_economy;
    let mut batch = PendingBatch::new();
    batch.payload_mut(SOURCE_MATCH).reason_key = Some(REASON_MATCH_COMPLETE.to_string());

    // XP
    let matches_today = prepare_daily_counter(store, ctx.owner, ctx.now_ms, &mut batch)?;
    let base_xp = base_match_xp(economy, ctx.honored_win, ctx.solo);
    let xp = diminished_xp(economy, base_xp, matches_today);
    {
        let progression = batch.payload_mut(SOURCE_MATCH).progression_mut();
        progression.xp_granted = Some(xp);
        progression.xp_base = Some(base_xp);
    }
    prepare_experience(store, config, ctx.owner, LeveledItem::Player, xp, &mut batch)?;

    // Tokens
    let balances = store.balances(ctx.owner)?;
    let prior_tokens = balances.get(CURRENCY_ROUND_TOKENS).copied().unwrap_or(0);
    let drops = balances.get(CURRENCY_DROPS_LEFT).copied().unwrap_or(0);

    let earned = compute_tokens_earned(ctx.request, ctx.solo, economy);
    let exchange = resolve_exchange(prior_tokens, earned, drops, economy.token_exchange_threshold);

    batch.add_ledger_delta(
        ctx.owner,
        [
            (CURRENCY_ROUND_TOKENS, exchange.token_delta),
            (CURRENCY_DROPS_LEFT, exchange.drop_delta),
        ],
    );
    if exchange.triggered {
        let tier = config.loot.tier_for(ctx.honored_win);
        let container =
            prepare_container(ids, ctx.owner, tier, ctx.now_ms, SOURCE_MATCH, &mut batch)?;
        tracing::info!(
            "Token exchange for {}: {} container {} ({} drops left)",
            ctx.owner,
            tier,
            container.id,
            exchange.drops_remaining
        );
    }

    let meta = batch.payload_mut(SOURCE_MATCH).meta_mut();
    meta.drops_remaining = Some(exchange.drops_remaining);
    meta.daily_matches = Some(matches_today);
    meta.round_tokens = Some(exchange.reported_balance);
    meta.tokens_earned = Some(exchange.earned);
    meta.consensus = Some(ctx.role.as_str().to_string());

    Ok((batch, exchange))
}

/// Increments today's match counter inside `batch`. Returns the new count.
fn prepare_daily_counter<S>(
    store: &S,
    owner: &str,
    now_ms: i64,
    batch: &mut PendingBatch,
) -> EconomyResult<u32>
where
    S: Backend + ?Sized,
{
    let key = StorageKey::new(COLLECTION_DAILY, KEY_DAILY_MATCHES, owner);
    let today = utc_midnight_secs(now_ms);

    let (stored, version) = match read_json::<DailyCounter, _>(store, &key)? {
        Some((counter, version)) => (counter, Some(version)),
        None => (DailyCounter::default(), None),
    };
    let count = if stored.reset_unix == today {
        stored.count.saturating_add(1)
    } else {
        1
    };

    batch.add_write(StorageWrite::json(
        key,
        &DailyCounter {
            count,
            reset_unix: today,
        },
        WriteCondition::expecting(version),
    )?);
    Ok(count)
}
