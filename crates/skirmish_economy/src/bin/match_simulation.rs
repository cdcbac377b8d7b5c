//! # Match Simulation
//!
//! Plays a handful of matches against the in-memory backend and prints what
//! each player was granted.
//!
//! Usage: `match_simulation [config.toml] [--journal <path>]`
//!
//! Set `RUST_LOG=skirmish_economy=debug` for the full settlement trace.

use std::sync::Arc;

use skirmish_economy::config::EconomyConfig;
use skirmish_economy::store::{Backend, Ledger};
use skirmish_economy::{
    IdGenerator, ManualClock, MatchService, MemoryNotifier, MemoryStore,
};
use skirmish_shared::constants::{CURRENCY_DROPS_LEFT, CURRENCY_GOLD, CURRENCY_ROUND_TOKENS};
use skirmish_shared::{NotifyMatchStartRequest, RoundResult, SubmitMatchResultRequest};
use tracing_subscriber::EnvFilter;

const START_MS: i64 = 1_700_000_000_000;
const DROPS_PER_DAY: i64 = 3;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         SKIRMISH MATCH SIMULATION                                ║");
    println!("║         write-first consensus + atomic settlement                ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let args: Vec<String> = std::env::args().collect();
    let journal_path = args
        .iter()
        .position(|a| a == "--journal")
        .and_then(|i| args.get(i + 1));
    let config_path = args
        .iter()
        .skip(1)
        .find(|a| !a.starts_with("--") && Some(*a) != journal_path);

    let config = match config_path {
        Some(path) => match EconomyConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                println!("Error: {e}");
                return;
            }
        },
        None => EconomyConfig::default(),
    };

    let store = match journal_path {
        Some(path) => match MemoryStore::recover(path) {
            Ok(store) => store,
            Err(e) => {
                println!("Error: could not open journal: {e}");
                return;
            }
        },
        None => MemoryStore::new(),
    };
    let store = Arc::new(store);
    let clock = Arc::new(ManualClock::new(START_MS));
    let service = MatchService::with_parts(
        Arc::new(config),
        store.clone(),
        Arc::new(MemoryNotifier::new()),
        clock.clone(),
        IdGenerator::with_seed(0x5EED),
    );

    let players = ["alice-0001", "bob-00002"];
    for player in players {
        let mut grant = std::collections::BTreeMap::new();
        grant.insert(CURRENCY_DROPS_LEFT.to_string(), DROPS_PER_DAY);
        if let Err(e) = store.apply_deltas(player, &grant, true) {
            println!("Error: could not seed drops for {player}: {e}");
            return;
        }
    }

    for round in 0..4u32 {
        let match_id = format!("match-{round}");
        let (first, second) = if round % 2 == 0 {
            (players[0], players[1])
        } else {
            (players[1], players[0])
        };

        for (me, them) in [(first, second), (second, first)] {
            if let Err(e) =
                service.notify_match_start(me, &NotifyMatchStartRequest::versus(&match_id, them))
            {
                println!("Error: start failed for {me}: {e}");
                return;
            }
        }
        clock.advance_ms(90_000);

        println!("┌─ {match_id} ───────────────────────────────────────────────────┐");
        for (me, won) in [(first, true), (second, false)] {
            let request = result_request(&match_id, won);
            match service.submit_match_result(me, &request) {
                Ok(settlement) => println!(
                    "│ {me:<12} role={:<9} {}",
                    settlement.role.map_or("cached", |r| r.as_str()),
                    settlement.response
                ),
                Err(e) => println!("│ {me:<12} rejected: {e}"),
            }
        }
        println!("└──────────────────────────────────────────────────────────────────┘");
        clock.advance_ms(60_000);
    }

    println!();
    print_balances(store.as_ref(), &players);
}

fn result_request(match_id: &str, won: bool) -> SubmitMatchResultRequest {
    let rounds: Vec<RoundResult> = (1..=3)
        .map(|round_number| RoundResult {
            round_number,
            player_won: if won { round_number != 2 } else { round_number == 2 },
            duration_sec: 25,
        })
        .collect();
    SubmitMatchResultRequest {
        match_id: match_id.to_string(),
        won,
        final_score: if won { 3 } else { 1 },
        match_duration_sec: 90,
        rounds_won: u32::try_from(rounds.iter().filter(|r| r.player_won).count()).unwrap_or(0),
        rounds_lost: u32::try_from(rounds.iter().filter(|r| !r.player_won).count()).unwrap_or(0),
        rounds,
        equipped_pet_id: 1,
        equipped_class_id: 2,
        ..SubmitMatchResultRequest::default()
    }
}

fn print_balances(store: &dyn Backend, players: &[&str]) {
    println!("┌─ BALANCES ─────────────────────────────────────────────────────┐");
    for player in players {
        match store.balances(player) {
            Ok(wallet) => println!(
                "│ {player:<12} gold={:<6} tokens={:<3} drops={}",
                wallet.get(CURRENCY_GOLD).copied().unwrap_or(0),
                wallet.get(CURRENCY_ROUND_TOKENS).copied().unwrap_or(0),
                wallet.get(CURRENCY_DROPS_LEFT).copied().unwrap_or(0)
            ),
            Err(e) => println!("│ {player:<12} unavailable: {e}"),
        }
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
}
