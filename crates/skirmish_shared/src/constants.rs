//! # Storage & Wallet Constants
//!
//! Names shared by the server and any tooling that inspects player storage.
//!
//! **CRITICAL:** Renaming a collection orphans every record already stored
//! under the old name. Treat these as a persisted schema.

// =============================================================================
// OBJECT STORE COLLECTIONS
// =============================================================================

/// Per-player active match lock (one record, key [`KEY_CURRENT_MATCH`]).
pub const COLLECTION_ACTIVE_MATCH: &str = "active_match";

/// Key of the single active match record inside [`COLLECTION_ACTIVE_MATCH`].
pub const KEY_CURRENT_MATCH: &str = "current";

/// Per-(match, player) claim records used by the consensus protocol.
pub const COLLECTION_MATCH_RESULTS: &str = "match_results";

/// Per-match settlement markers. Owned by [`SYSTEM_USER_ID`], written once by
/// whichever player settles the match.
pub const COLLECTION_MATCH_SETTLEMENTS: &str = "match_settlements";

/// Owner of records that belong to no single player.
pub const SYSTEM_USER_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Per-(match, player) cached reward responses (idempotency).
pub const COLLECTION_RESULT_CACHE: &str = "match_results_cache";

/// Per-(player, leveled item) progression records.
pub const COLLECTION_PROGRESSION: &str = "progression";

/// Unopened and opened loot containers.
pub const COLLECTION_LOOT_CONTAINERS: &str = "lootboxes";

/// Daily counters (match count for diminishing XP).
pub const COLLECTION_DAILY: &str = "drops";

/// Key of the daily match counter inside [`COLLECTION_DAILY`].
pub const KEY_DAILY_MATCHES: &str = "daily_matches";

// =============================================================================
// WALLET CURRENCIES
// =============================================================================

/// Primary soft currency.
pub const CURRENCY_GOLD: &str = "gold";

/// Premium currency.
pub const CURRENCY_GEMS: &str = "gems";

/// Daily allowance of loot container exchanges.
pub const CURRENCY_DROPS_LEFT: &str = "dropsLeft";

/// Round tokens in half-token units (2 units = 1.0 token).
pub const CURRENCY_ROUND_TOKENS: &str = "roundTokens";

// =============================================================================
// REWARD SOURCES
// =============================================================================

/// Reward produced by a match settlement.
pub const SOURCE_MATCH: &str = "match";

/// Reward produced by a level-up.
pub const SOURCE_LEVEL_UP: &str = "level_up";

/// Reward produced by a direct experience grant without a level-up.
pub const SOURCE_XP_GRANT: &str = "xp_grant";

/// Loot container granted by the round-token exchange.
pub const SOURCE_TOKEN_EXCHANGE: &str = "token_exchange";

/// Localization key for a completed match.
pub const REASON_MATCH_COMPLETE: &str = "reward.match.complete";
