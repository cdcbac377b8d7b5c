//! Round-history plausibility.
//!
//! Not a trust boundary. Mismatches are logged and healed from the round
//! list; the hard gates are the match timing and the token caps.

use skirmish_shared::SubmitMatchResultRequest;

/// What the audit found.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoundAudit {
    /// Won rounds counted from the history.
    pub derived_won: u32,
    /// Lost rounds counted from the history.
    pub derived_lost: u32,
    /// Whether the aggregate counts were replaced.
    pub corrected: bool,
    /// Round numbers shorter than the suspicious threshold.
    pub suspicious_rounds: Vec<u32>,
}

/// Audits the round history and rewrites `rounds_won`/`rounds_lost` from it.
/// Requests without history are left alone.
pub fn validate_rounds(request: &mut SubmitMatchResultRequest, suspicious_sec: u32) -> RoundAudit {
    let mut audit = RoundAudit::default();
    if !request.has_round_history() {
        return audit;
    }

    for round in &request.rounds {
        if round.player_won {
            audit.derived_won += 1;
        } else {
            audit.derived_lost += 1;
        }
        if round.duration_sec < suspicious_sec {
            tracing::warn!(
                "Suspiciously short round {}: {}s (match {})",
                round.round_number,
                round.duration_sec,
                request.match_id
            );
            audit.suspicious_rounds.push(round.round_number);
        }
    }

    if audit.derived_won != request.rounds_won || audit.derived_lost != request.rounds_lost {
        tracing::warn!(
            "Round count mismatch in match {}: claimed {}/{}, derived {}/{}; using round history",
            request.match_id,
            request.rounds_won,
            request.rounds_lost,
            audit.derived_won,
            audit.derived_lost
        );
        request.rounds_won = audit.derived_won;
        request.rounds_lost = audit.derived_lost;
        audit.corrected = true;
    }

    audit
}
