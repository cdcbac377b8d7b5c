//! Integration tests for match settlement against the in-memory backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use skirmish_economy::config::{EconomyConfig, PLAYER_LEVEL_CURVE};
use skirmish_economy::lifecycle::MatchSettlement;
use skirmish_economy::store::{read_json, Ledger, ObjectStore, StorageKey};
use skirmish_economy::{
    ConsensusRole, EconomyError, IdGenerator, ItemProgression, LevelCurve, LevelReward,
    LeveledItem, LootContainer, ManualClock, MatchService, MemoryNotifier, MemoryStore,
};
use skirmish_shared::constants::{
    COLLECTION_ACTIVE_MATCH, COLLECTION_DAILY, COLLECTION_LOOT_CONTAINERS,
    COLLECTION_MATCH_RESULTS, COLLECTION_PROGRESSION, COLLECTION_RESULT_CACHE,
    CURRENCY_DROPS_LEFT, CURRENCY_GEMS, CURRENCY_GOLD, CURRENCY_ROUND_TOKENS,
};
use skirmish_shared::{
    ContainerTier, NotifyMatchStartRequest, RewardPayload, RoundResult, SubmitMatchResultRequest,
    UnlockKind,
};

const T0: i64 = 1_700_000_000_000;
const ALICE: &str = "alice-0001";
const BOB: &str = "bob-00002";

struct Harness {
    service: MatchService,
    store: Arc<MemoryStore>,
    notifier: Arc<MemoryNotifier>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(EconomyConfig::default())
    }

    fn with_config(config: EconomyConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let clock = Arc::new(ManualClock::new(T0));
        let service = MatchService::with_parts(
            Arc::new(config),
            store.clone(),
            notifier.clone(),
            clock.clone(),
            IdGenerator::with_seed(11),
        );
        Self {
            service,
            store,
            notifier,
            clock,
        }
    }

    fn seed(&self, owner: &str, currency: &str, amount: i64) {
        let mut changes = BTreeMap::new();
        changes.insert(currency.to_string(), amount);
        self.store.apply_deltas(owner, &changes, true).unwrap();
    }

    fn start_versus(&self, a: &str, b: &str, match_id: &str) {
        self.service
            .notify_match_start(a, &NotifyMatchStartRequest::versus(match_id, b))
            .unwrap();
        self.service
            .notify_match_start(b, &NotifyMatchStartRequest::versus(match_id, a))
            .unwrap();
    }

    fn start_solo(&self, owner: &str, match_id: &str) {
        self.service
            .notify_match_start(owner, &NotifyMatchStartRequest::solo(match_id))
            .unwrap();
    }

    fn submit(
        &self,
        owner: &str,
        request: &SubmitMatchResultRequest,
    ) -> Result<MatchSettlement, EconomyError> {
        self.service.submit_match_result(owner, request)
    }
}

fn request(match_id: &str, won: bool, rounds: &[bool]) -> SubmitMatchResultRequest {
    let rounds: Vec<RoundResult> = rounds
        .iter()
        .enumerate()
        .map(|(i, &player_won)| RoundResult {
            round_number: u32::try_from(i + 1).unwrap(),
            player_won,
            duration_sec: 30,
        })
        .collect();
    SubmitMatchResultRequest {
        match_id: match_id.to_string(),
        won,
        final_score: 10,
        rounds_won: u32::try_from(rounds.iter().filter(|r| r.player_won).count()).unwrap(),
        rounds_lost: u32::try_from(rounds.iter().filter(|r| !r.player_won).count()).unwrap(),
        rounds,
        equipped_pet_id: 1,
        equipped_class_id: 1,
        ..SubmitMatchResultRequest::default()
    }
}

fn payload(settlement: &MatchSettlement) -> RewardPayload {
    settlement.payload.clone().expect("fresh settlement carries a payload")
}

fn xp_granted(settlement: &MatchSettlement) -> u64 {
    payload(settlement).progression.unwrap().xp_granted.unwrap()
}

// =============================================================================
// CONSENSUS ROLES
// =============================================================================

#[test]
fn test_first_submitter_pending_second_ok() {
    let h = Harness::new();
    h.seed(ALICE, CURRENCY_DROPS_LEFT, 3);
    h.seed(BOB, CURRENCY_DROPS_LEFT, 3);
    h.start_versus(ALICE, BOB, "m1");
    h.clock.advance_ms(30_000);

    let alice = h.submit(ALICE, &request("m1", false, &[false, true, false])).unwrap();
    assert_eq!(alice.role, Some(ConsensusRole::Pending));
    assert_eq!(xp_granted(&alice), 25);

    let bob = h.submit(BOB, &request("m1", true, &[true, false, true])).unwrap();
    assert_eq!(bob.role, Some(ConsensusRole::Ok));
    assert_eq!(xp_granted(&bob), 100, "second submitter's win is honored");

    let meta = payload(&bob).meta.unwrap();
    assert_eq!(meta.consensus.as_deref(), Some("ok"));
    assert_eq!(meta.tokens_earned, Some(5));

    assert_eq!(h.store.balance(ALICE, CURRENCY_ROUND_TOKENS), 4);
    assert_eq!(h.store.balance(BOB, CURRENCY_ROUND_TOKENS), 5);
    assert_eq!(h.store.count(COLLECTION_ACTIVE_MATCH), 0);
    assert_eq!(h.notifier.delivered_to(BOB).len(), 1);
}

#[test]
fn test_first_submitter_win_is_not_honored() {
    let h = Harness::new();
    h.start_versus(ALICE, BOB, "m1");
    h.clock.advance_ms(30_000);

    let alice = h.submit(ALICE, &request("m1", true, &[true, true])).unwrap();
    assert_eq!(alice.role, Some(ConsensusRole::Pending));
    assert_eq!(xp_granted(&alice), 25);
}

#[test]
fn test_mutual_win_claims_conflict() {
    let h = Harness::new();
    h.seed(ALICE, CURRENCY_DROPS_LEFT, 3);
    h.seed(BOB, CURRENCY_DROPS_LEFT, 3);
    h.start_versus(ALICE, BOB, "m1");
    h.clock.advance_ms(30_000);

    h.submit(ALICE, &request("m1", true, &[true, true, false])).unwrap();
    let bob = h.submit(BOB, &request("m1", true, &[true, true, true])).unwrap();

    assert_eq!(bob.role, Some(ConsensusRole::Conflict));
    assert_eq!(xp_granted(&bob), 25, "conflicting win is voided");
    // Round tokens still come from the player's own history.
    assert_eq!(payload(&bob).meta.unwrap().tokens_earned, Some(6));
}

#[test]
fn test_retry_after_failed_commit_sees_resolved() {
    let h = Harness::new();
    h.start_versus(ALICE, BOB, "m1");
    h.clock.advance_ms(30_000);

    h.store.fail_collection(COLLECTION_PROGRESSION);
    let err = h.submit(ALICE, &request("m1", false, &[false])).unwrap_err();
    assert!(matches!(err, EconomyError::CommitFailed(_)));
    assert_eq!(err.status_code(), 13);
    h.store.heal_collection(COLLECTION_PROGRESSION);

    let bob = h.submit(BOB, &request("m1", true, &[true])).unwrap();
    assert_eq!(bob.role, Some(ConsensusRole::Ok));

    let alice = h.submit(ALICE, &request("m1", false, &[false])).unwrap();
    assert_eq!(alice.role, Some(ConsensusRole::Resolved));
    assert_eq!(xp_granted(&alice), 25);
}

// =============================================================================
// ACTIVE MATCH GATES
// =============================================================================

#[test]
fn test_too_short_then_stale() {
    let h = Harness::new();
    h.start_versus(ALICE, BOB, "m1");

    h.clock.advance_ms(5_000);
    let err = h.submit(ALICE, &request("m1", true, &[true])).unwrap_err();
    assert!(matches!(err, EconomyError::MatchTooShort { .. }));
    assert_eq!(err.status_code(), 9);
    assert_eq!(h.store.count(COLLECTION_MATCH_RESULTS), 0, "rejected before consensus");

    h.clock.advance_ms(11 * 60 * 1000);
    let err = h.submit(ALICE, &request("m1", true, &[true])).unwrap_err();
    assert!(matches!(err, EconomyError::StaleMatch { .. }));

    let err = h.submit(ALICE, &request("m1", true, &[true])).unwrap_err();
    assert_eq!(err, EconomyError::NoActiveMatch);
}

#[test]
fn test_mismatched_match_id() {
    let h = Harness::new();
    h.start_solo(ALICE, "m1");
    h.clock.advance_ms(30_000);

    let err = h.submit(ALICE, &request("m2", true, &[true])).unwrap_err();
    assert!(matches!(err, EconomyError::MatchMismatch { .. }));
}

#[test]
fn test_validation_errors_touch_nothing() {
    let h = Harness::new();
    h.start_versus(ALICE, BOB, "m1");
    h.clock.advance_ms(30_000);

    let mut bad_pet = request("m1", true, &[true]);
    bad_pet.equipped_pet_id = 99;
    assert_eq!(
        h.submit(ALICE, &bad_pet).unwrap_err(),
        EconomyError::InvalidItemId { category: "pet", id: 99 }
    );

    let mut bad_class = request("m1", true, &[true]);
    bad_class.equipped_class_id = 42;
    assert!(matches!(
        h.submit(ALICE, &bad_class),
        Err(EconomyError::InvalidItemId { category: "class", .. })
    ));

    assert_eq!(
        h.submit("", &request("m1", true, &[true])).unwrap_err(),
        EconomyError::MissingIdentity
    );
    assert_eq!(h.store.count(COLLECTION_MATCH_RESULTS), 0);
    assert_eq!(h.store.count(COLLECTION_ACTIVE_MATCH), 2);
}

// =============================================================================
// IDEMPOTENCY & CLEANUP
// =============================================================================

#[test]
fn test_retry_is_served_from_cache() {
    let h = Harness::new();
    h.seed(ALICE, CURRENCY_DROPS_LEFT, 3);
    h.start_solo(ALICE, "m1");
    h.clock.advance_ms(20_000);

    let first = h.submit(ALICE, &request("m1", true, &[true, false, true])).unwrap();
    let tokens = h.store.balance(ALICE, CURRENCY_ROUND_TOKENS);

    h.clock.advance_ms(1_000);
    let second = h.submit(ALICE, &request("m1", true, &[true, false, true])).unwrap();

    assert!(!first.from_cache());
    assert!(second.from_cache());
    assert_eq!(first.response, second.response);
    assert_eq!(h.store.commit_count(), 1);
    assert_eq!(h.store.balance(ALICE, CURRENCY_ROUND_TOKENS), tokens);
    assert_eq!(h.notifier.delivered_to(ALICE).len(), 1);
}

#[test]
fn test_cached_retry_survives_catalog_change() {
    let h = Harness::new();
    h.start_solo(ALICE, "m1");
    h.clock.advance_ms(20_000);
    let first = h.submit(ALICE, &request("m1", true, &[true, true])).unwrap();

    // Pet 1 is retired before the client retries.
    let mut config = EconomyConfig::default();
    config.catalog.pets.retain(|pet| pet.id != 1);
    let reloaded = MatchService::with_parts(
        Arc::new(config),
        h.store.clone(),
        h.notifier.clone(),
        h.clock.clone(),
        IdGenerator::with_seed(11),
    );

    let retry = reloaded
        .submit_match_result(ALICE, &request("m1", true, &[true, true]))
        .unwrap();
    assert!(retry.from_cache());
    assert_eq!(retry.response, first.response);

    // A fresh match with the retired pet is still rejected.
    reloaded
        .notify_match_start(ALICE, &NotifyMatchStartRequest::solo("m2"))
        .unwrap();
    h.clock.advance_ms(20_000);
    let err = reloaded
        .submit_match_result(ALICE, &request("m2", true, &[true]))
        .unwrap_err();
    assert!(matches!(err, EconomyError::InvalidItemId { category: "pet", id: 1 }));
}

#[test]
fn test_cleanup_failure_is_not_surfaced() {
    let h = Harness::new();
    h.start_solo(ALICE, "m1");
    h.clock.advance_ms(20_000);
    h.store.fail_collection(COLLECTION_ACTIVE_MATCH);

    let settlement = h.submit(ALICE, &request("m1", true, &[true])).unwrap();
    assert!(!settlement.from_cache());
    assert_eq!(h.store.count(COLLECTION_ACTIVE_MATCH), 1);

    let retry = h.submit(ALICE, &request("m1", true, &[true])).unwrap();
    assert!(retry.from_cache());
    assert_eq!(h.store.commit_count(), 1);
}

#[test]
fn test_notifier_failure_is_not_surfaced() {
    let h = Harness::new();
    h.notifier.set_failing(true);
    h.start_solo(ALICE, "m1");
    h.clock.advance_ms(20_000);

    h.submit(ALICE, &request("m1", true, &[true])).unwrap();
    assert!(h.notifier.delivered_to(ALICE).is_empty());
    assert_eq!(h.store.count(COLLECTION_RESULT_CACHE), 1);
}

// =============================================================================
// TOKEN EXCHANGE
// =============================================================================

#[test]
fn test_exchange_grants_container_and_carries_excess() {
    let h = Harness::new();
    h.seed(ALICE, CURRENCY_DROPS_LEFT, 2);
    h.seed(ALICE, CURRENCY_ROUND_TOKENS, 4);
    h.start_solo(ALICE, "m1");
    h.clock.advance_ms(20_000);

    let settlement = h.submit(ALICE, &request("m1", true, &[true, true, true])).unwrap();
    let payload = payload(&settlement);

    assert_eq!(h.store.balance(ALICE, CURRENCY_ROUND_TOKENS), 4 + 3 - 6);
    assert_eq!(h.store.balance(ALICE, CURRENCY_DROPS_LEFT), 1);
    assert_eq!(h.store.count(COLLECTION_LOOT_CONTAINERS), 1);

    assert_eq!(payload.containers.len(), 1);
    assert_eq!(payload.containers[0].tier, ContainerTier::Standard);
    let meta = payload.meta.unwrap();
    assert_eq!(meta.round_tokens, Some(6));
    assert_eq!(meta.drops_remaining, Some(1));
    assert_eq!(meta.tokens_earned, Some(3));

    let key = StorageKey::new(COLLECTION_LOOT_CONTAINERS, payload.containers[0].id.clone(), ALICE);
    let (container, _) = read_json::<LootContainer, _>(h.store.as_ref(), &key).unwrap().unwrap();
    assert!(!container.opened);
}

#[test]
fn test_below_threshold_banks_tokens() {
    let h = Harness::new();
    h.seed(ALICE, CURRENCY_DROPS_LEFT, 2);
    h.start_solo(ALICE, "m1");
    h.clock.advance_ms(20_000);

    h.submit(ALICE, &request("m1", true, &[true, true, true])).unwrap();
    assert_eq!(h.store.balance(ALICE, CURRENCY_ROUND_TOKENS), 3);
    assert_eq!(h.store.balance(ALICE, CURRENCY_DROPS_LEFT), 2);
    assert_eq!(h.store.count(COLLECTION_LOOT_CONTAINERS), 0);
}

#[test]
fn test_no_drop_slots_discards_tokens() {
    let h = Harness::new();
    h.seed(ALICE, CURRENCY_ROUND_TOKENS, 5);
    h.start_solo(ALICE, "m1");
    h.clock.advance_ms(20_000);

    let settlement = h.submit(ALICE, &request("m1", true, &[true, true, true])).unwrap();
    let meta = payload(&settlement).meta.unwrap();
    assert_eq!(meta.tokens_earned, Some(0));
    assert_eq!(meta.round_tokens, Some(5));
    assert_eq!(h.store.balance(ALICE, CURRENCY_ROUND_TOKENS), 5);
    assert_eq!(h.store.count(COLLECTION_LOOT_CONTAINERS), 0);
}

#[test]
fn test_failed_commit_applies_nothing() {
    let h = Harness::new();
    h.seed(ALICE, CURRENCY_DROPS_LEFT, 2);
    h.seed(ALICE, CURRENCY_ROUND_TOKENS, 4);
    h.start_solo(ALICE, "m1");
    h.clock.advance_ms(20_000);
    h.store.fail_collection(COLLECTION_LOOT_CONTAINERS);

    let err = h.submit(ALICE, &request("m1", true, &[true, true, true])).unwrap_err();
    assert!(matches!(err, EconomyError::CommitFailed(_)));

    assert_eq!(h.store.balance(ALICE, CURRENCY_ROUND_TOKENS), 4);
    assert_eq!(h.store.balance(ALICE, CURRENCY_DROPS_LEFT), 2);
    assert_eq!(h.store.count(COLLECTION_PROGRESSION), 0);
    assert_eq!(h.store.count(COLLECTION_DAILY), 0);
    assert_eq!(h.store.count(COLLECTION_RESULT_CACHE), 0);
    assert_eq!(h.store.count(COLLECTION_ACTIVE_MATCH), 1, "match stays open for a retry");
    assert!(h.notifier.delivered_to(ALICE).is_empty());

    h.store.heal_collection(COLLECTION_LOOT_CONTAINERS);
    h.submit(ALICE, &request("m1", true, &[true, true, true])).unwrap();
    assert_eq!(h.store.count(COLLECTION_LOOT_CONTAINERS), 1);
    assert_eq!(h.store.balance(ALICE, CURRENCY_DROPS_LEFT), 1);
}

// =============================================================================
// EXPERIENCE
// =============================================================================

#[test]
fn test_solo_win_grants_half_xp() {
    let h = Harness::new();
    h.start_solo(ALICE, "m1");
    h.clock.advance_ms(20_000);

    let settlement = h.submit(ALICE, &request("m1", true, &[true])).unwrap();
    let progression = payload(&settlement).progression.unwrap();
    assert_eq!(progression.xp_granted, Some(50));
    assert_eq!(progression.xp_base, Some(50));
    assert_eq!(settlement.role, Some(ConsensusRole::Ok));
}

#[test]
fn test_daily_xp_diminishes_and_resets_at_midnight() {
    let h = Harness::new();
    let mut granted = Vec::new();
    for i in 0..5 {
        let match_id = format!("m{i}");
        h.start_solo(ALICE, &match_id);
        h.clock.advance_ms(15_000);
        let settlement = h.submit(ALICE, &request(&match_id, true, &[true])).unwrap();
        assert_eq!(payload(&settlement).meta.unwrap().daily_matches, Some(i + 1));
        granted.push(xp_granted(&settlement));
    }
    assert_eq!(granted, vec![50, 40, 30, 20, 12]);

    // T0 is 22:13:20 UTC; two hours later is the next day.
    h.clock.set_ms(T0 + 2 * 60 * 60 * 1000);
    h.start_solo(ALICE, "next-day");
    h.clock.advance_ms(15_000);
    let settlement = h.submit(ALICE, &request("next-day", true, &[true])).unwrap();
    assert_eq!(xp_granted(&settlement), 50);
    assert_eq!(payload(&settlement).meta.unwrap().daily_matches, Some(1));
}

#[test]
fn test_level_rewards_land_in_the_same_commit() {
    let mut config = EconomyConfig::default();
    config.level_curves.insert(
        PLAYER_LEVEL_CURVE.to_string(),
        LevelCurve {
            max_level: 3,
            base_xp: 0,
            level_thresholds: vec![0, 50, 100],
            rewards: vec![],
        }
        .with_reward(LevelReward::currency(2, 100, 0))
        .with_reward(LevelReward::currency(3, 0, 5)),
    );
    let h = Harness::with_config(config);
    h.start_solo(ALICE, "m1");
    h.clock.advance_ms(20_000);

    let settlement = h.submit(ALICE, &request("m1", true, &[true])).unwrap();
    let payload = payload(&settlement);

    assert_eq!(payload.source.as_deref(), Some("match"));
    assert_eq!(payload.progression.unwrap().new_player_level, Some(2));
    assert_eq!(payload.wallet.unwrap().gold, 100);
    assert_eq!(h.store.balance(ALICE, CURRENCY_GOLD), 100);
    assert_eq!(h.store.balance(ALICE, CURRENCY_GEMS), 0);
    assert_eq!(h.store.commit_count(), 1);
}

#[test]
fn test_grant_item_experience_unlocks_ability() {
    let h = Harness::new();

    let (change, payload) = h
        .service
        .grant_item_experience(ALICE, LeveledItem::Pet(1), 350)
        .unwrap();
    assert_eq!((change.old_level, change.new_level), (1, 2));

    let progression = payload.unwrap().progression.unwrap();
    assert_eq!(progression.new_pet_level, Some(2));
    assert_eq!(progression.xp_granted, Some(350));
    assert_eq!(progression.unlocks.len(), 1);
    assert_eq!(progression.unlocks[0].kind, UnlockKind::Ability);

    let key = StorageKey::new(COLLECTION_PROGRESSION, "pet_1", ALICE);
    let (stored, _) = read_json::<ItemProgression, _>(h.store.as_ref(), &key).unwrap().unwrap();
    assert_eq!(stored.level, 2);
    assert_eq!(stored.abilities_unlocked, 2);
    assert_eq!(h.notifier.delivered_to(ALICE).len(), 1);
}

#[test]
fn test_grant_item_experience_rejects_bad_input() {
    let h = Harness::new();
    assert!(matches!(
        h.service.grant_item_experience(ALICE, LeveledItem::Class(77), 10),
        Err(EconomyError::InvalidItemId { category: "class", id: 77 })
    ));
    assert!(matches!(
        h.service.grant_item_experience(ALICE, LeveledItem::Player, 2_000_000),
        Err(EconomyError::InvalidExperience { .. })
    ));
    assert_eq!(h.store.commit_count(), 0);
    assert!(h.store.read(&StorageKey::new(COLLECTION_PROGRESSION, "player_0", ALICE)).unwrap().is_none());
}
