//! # Round-Token Economy
//!
//! **Pure computation, no I/O**
//!
//! Rounds earn half-token units; accumulated tokens plus a free drop slot
//! exchange into one sealed loot container.
//!
//! ```text
//! rounds ──► eligible (1..=round_cap) ──► units ──► min(sweep cap) ──► min(absolute cap)
//!
//! prior + earned >= threshold  AND  drops >= 1   ─►  exchange
//!     tokens  += earned - threshold   (excess carries over)
//!     drops   -= 1
//! ```
//!
//! With no drop slot left nothing is earned and the balance is held at the
//! threshold, so progress cannot be banked indefinitely.

use skirmish_shared::SubmitMatchResultRequest;

use crate::config::MatchEconomyConfig;

/// Half-token units earned by one match.
///
/// Uses the round history when present; otherwise falls back to the
/// aggregate won/lost counts trimmed to the round cap.
#[must_use]
pub fn compute_tokens_earned(
    request: &SubmitMatchResultRequest,
    solo: bool,
    config: &MatchEconomyConfig,
) -> u32 {
    let cap = config.token_round_cap;

    let earned = if request.has_round_history() {
        request
            .rounds
            .iter()
            .filter(|r| (1..=cap).contains(&r.round_number))
            .fold(0u32, |acc, r| {
                let units = if solo {
                    config.tokens_per_solo_round
                } else if r.player_won {
                    config.tokens_per_round_win
                } else {
                    config.tokens_per_round_loss
                };
                acc.saturating_add(units)
            })
    } else {
        let (won, lost) = trim_to_cap(request.rounds_won, request.rounds_lost, cap);
        if solo {
            won.saturating_add(lost)
                .saturating_mul(config.tokens_per_solo_round)
        } else {
            won.saturating_mul(config.tokens_per_round_win)
                .saturating_add(lost.saturating_mul(config.tokens_per_round_loss))
        }
    };

    earned.min(config.sweep_cap()).min(config.absolute_cap())
}

/// Trims a (won, lost) pair so it sums to at most `cap`.
/// Losses are cut first, then wins.
#[inline]
#[must_use]
pub const fn trim_to_cap(won: u32, lost: u32, cap: u32) -> (u32, u32) {
    let total = won.saturating_add(lost);
    if total <= cap {
        return (won, lost);
    }
    let excess = total - cap;
    if lost >= excess {
        (won, lost - excess)
    } else {
        (won.saturating_sub(excess - lost), 0)
    }
}

/// Decision of one token exchange, computed from freshly read balances.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExchangeOutcome {
    /// Units earned after the drop-slot gate.
    pub earned: i64,
    /// Token balance after commit.
    pub post_balance: i64,
    /// Whether a container is granted.
    pub triggered: bool,
    /// Ledger delta for round tokens.
    pub token_delta: i64,
    /// Ledger delta for drop slots (0 or -1).
    pub drop_delta: i64,
    /// Token balance shown to the player.
    pub reported_balance: i64,
    /// Drop slots shown to the player.
    pub drops_remaining: i64,
}

/// Resolves the exchange for one settlement.
#[must_use]
pub fn resolve_exchange(
    prior_tokens: i64,
    earned: u32,
    drops_available: i64,
    threshold: u32,
) -> ExchangeOutcome {
    let threshold = i64::from(threshold);
    let earned = if drops_available <= 0 { 0 } else { i64::from(earned) };
    let post = prior_tokens.saturating_add(earned);

    if post >= threshold && drops_available >= 1 {
        let token_delta = earned - threshold;
        return ExchangeOutcome {
            earned,
            post_balance: prior_tokens.saturating_add(token_delta),
            triggered: true,
            token_delta,
            drop_delta: -1,
            reported_balance: threshold,
            drops_remaining: drops_available - 1,
        };
    }

    let post = if drops_available <= 0 && post > threshold {
        threshold
    } else {
        post
    };
    let token_delta = (post - prior_tokens).max(0);

    ExchangeOutcome {
        earned,
        post_balance: prior_tokens + token_delta,
        triggered: false,
        token_delta,
        drop_delta: 0,
        reported_balance: post,
        drops_remaining: drops_available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_shared::RoundResult;

    fn rounds(outcomes: &[(u32, bool)]) -> SubmitMatchResultRequest {
        SubmitMatchResultRequest {
            rounds: outcomes
                .iter()
                .map(|&(round_number, player_won)| RoundResult {
                    round_number,
                    player_won,
                    duration_sec: 30,
                })
                .collect(),
            ..SubmitMatchResultRequest::default()
        }
    }

    fn aggregate(won: u32, lost: u32) -> SubmitMatchResultRequest {
        SubmitMatchResultRequest {
            rounds_won: won,
            rounds_lost: lost,
            ..SubmitMatchResultRequest::default()
        }
    }

    #[test]
    fn test_only_capped_rounds_earn() {
        let config = MatchEconomyConfig::default();
        let request = rounds(&[(1, true), (2, false), (3, true), (4, true), (5, true)]);
        assert_eq!(compute_tokens_earned(&request, false, &config), 2 + 1 + 2);
    }

    #[test]
    fn test_round_zero_is_ineligible() {
        let config = MatchEconomyConfig::default();
        let request = rounds(&[(0, true), (1, false)]);
        assert_eq!(compute_tokens_earned(&request, false, &config), 1);
    }

    #[test]
    fn test_solo_rate_ignores_outcome() {
        let config = MatchEconomyConfig::default();
        let request = rounds(&[(1, true), (2, false), (3, true)]);
        assert_eq!(compute_tokens_earned(&request, true, &config), 3);
    }

    #[test]
    fn test_repeated_round_numbers_hit_sweep_cap() {
        let config = MatchEconomyConfig::default();
        let request = rounds(&[(1, true); 50]);
        assert_eq!(compute_tokens_earned(&request, false, &config), config.sweep_cap());
    }

    #[test]
    fn test_legacy_trim_losses_first() {
        assert_eq!(trim_to_cap(2, 3, 3), (2, 1));
        assert_eq!(trim_to_cap(4, 1, 3), (3, 0));
        assert_eq!(trim_to_cap(1, 1, 3), (1, 1));
        assert_eq!(trim_to_cap(50, 0, 3), (3, 0));

        let config = MatchEconomyConfig::default();
        assert_eq!(compute_tokens_earned(&aggregate(2, 3), false, &config), 2 * 2 + 1);
    }

    #[test]
    fn test_empty_history_respects_absolute_cap() {
        let config = MatchEconomyConfig {
            token_round_cap: 10,
            ..MatchEconomyConfig::default()
        };
        let earned = compute_tokens_earned(&aggregate(50, 0), false, &config);
        assert!(earned <= config.absolute_cap());
        assert_eq!(earned, 20);
    }

    #[test]
    fn test_absolute_cap_binds_below_sweep_cap() {
        let config = MatchEconomyConfig {
            token_round_cap: 5,
            max_rounds_per_match: 2,
            ..MatchEconomyConfig::default()
        };
        assert!(config.absolute_cap() < config.sweep_cap());

        let history = rounds(&[(1, true), (2, true), (3, true), (4, true), (5, true)]);
        assert_eq!(compute_tokens_earned(&history, false, &config), 4);
        assert_eq!(compute_tokens_earned(&aggregate(5, 0), false, &config), 4);
    }

    #[test]
    fn test_exchange_below_threshold_banks() {
        let outcome = resolve_exchange(2, 3, 3, 6);
        assert!(!outcome.triggered);
        assert_eq!(outcome.token_delta, 3);
        assert_eq!(outcome.post_balance, 5);
        assert_eq!(outcome.drops_remaining, 3);
    }

    #[test]
    fn test_exchange_carries_excess() {
        let outcome = resolve_exchange(5, 3, 2, 6);
        assert!(outcome.triggered);
        assert_eq!(outcome.token_delta, 3 - 6);
        assert_eq!(outcome.post_balance, 2);
        assert_eq!(outcome.drop_delta, -1);
        assert_eq!(outcome.reported_balance, 6);
        assert_eq!(outcome.drops_remaining, 1);
    }

    #[test]
    fn test_exactly_at_threshold_exchanges() {
        let outcome = resolve_exchange(0, 6, 1, 6);
        assert!(outcome.triggered);
        assert_eq!(outcome.post_balance, 0);
    }

    #[test]
    fn test_no_drops_discards_and_clamps() {
        let outcome = resolve_exchange(4, 5, 0, 6);
        assert!(!outcome.triggered);
        assert_eq!(outcome.earned, 0);
        assert_eq!(outcome.token_delta, 0);

        let overfull = resolve_exchange(9, 5, 0, 6);
        assert_eq!(overfull.reported_balance, 6);
        assert_eq!(overfull.token_delta, 0);
        assert_eq!(overfull.drop_delta, 0);
    }
}
