//! # Reward Notification Schema
//!
//! The unified reward payload delivered to the client after any grant.
//!
//! Domains are disjoint - each maps to one bucket of player state:
//!
//! ```text
//! RewardPayload
//!   ├── wallet       currency deltas (never absolute totals)
//!   ├── progression  XP granted, new levels, ability/sprite unlocks
//!   ├── lootboxes    sealed loot containers
//!   └── meta         non-reward feedback (tokens, drop slots, consensus role)
//! ```
//!
//! Wallet values are deltas so that parallel grants never race on a total.

use serde::{Deserialize, Serialize};

/// Tier of a sealed loot container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerTier {
    /// Everyday container.
    #[default]
    Standard,
    /// Better odds on rare pools.
    Premium,
    /// Top tier.
    Legendary,
}

impl ContainerTier {
    /// Label used in storage and on the wire.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::Legendary => "legendary",
        }
    }
}

impl std::fmt::Display for ContainerTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Discrete currency changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDelta {
    /// Gold delta.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub gold: i64,
    /// Gem delta.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub gems: i64,
}

impl WalletDelta {
    /// Returns true if no currency changes.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.gold == 0 && self.gems == 0
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Kind of content unlocked by a level-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockKind {
    /// An additional ability slot.
    Ability,
    /// An additional cosmetic sprite.
    Sprite,
}

/// An ability or sprite unlock from a level-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionUnlock {
    /// Leveled system: `player`, `pet` or `class`.
    pub system: String,
    /// Which pet/class (0 for the player).
    pub item_id: u32,
    /// Unlock kind.
    #[serde(rename = "type")]
    pub kind: UnlockKind,
    /// How many were unlocked.
    pub count: u32,
}

/// XP and level changes. Driven strictly by the server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionDelta {
    /// XP actually granted (after diminishing returns).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp_granted: Option<u64>,
    /// XP before diminishing returns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp_base: Option<u64>,
    /// New player level, if the player leveled up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_player_level: Option<u32>,
    /// New pet level, if a pet leveled up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_pet_level: Option<u32>,
    /// New class level, if a class leveled up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_class_level: Option<u32>,
    /// Unlocks granted by level-ups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unlocks: Vec<ProgressionUnlock>,
}

/// A sealed loot container. Contents stay hidden until redemption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerGrant {
    /// Container identifier.
    pub id: String,
    /// Container tier.
    pub tier: ContainerTier,
    /// What produced the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Non-reward feedback shown alongside a reward.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardMeta {
    /// Drop slots left after this settlement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drops_remaining: Option<i64>,
    /// Matches settled today, this one included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_matches: Option<u32>,
    /// Round-token balance in half-units. Display as value / 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_tokens: Option<i64>,
    /// Half-units earned by this match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_earned: Option<i64>,
    /// Consensus role assigned to this submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<String>,
}

/// The reward payload sent to the client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPayload {
    /// Unique reward identifier.
    pub reward_id: String,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
    /// What produced the reward (`match`, `level_up`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Localization key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_key: Option<String>,
    /// Currency deltas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<WalletDelta>,
    /// XP and level changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progression: Option<ProgressionDelta>,
    /// Loot containers granted.
    #[serde(default, rename = "lootboxes", skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerGrant>,
    /// Non-reward feedback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RewardMeta>,
}

impl RewardPayload {
    /// Creates an empty payload.
    #[must_use]
    pub fn new(reward_id: impl Into<String>, created_at: i64, source: &str) -> Self {
        Self {
            reward_id: reward_id.into(),
            created_at,
            source: Some(source.to_string()),
            ..Self::default()
        }
    }

    /// Returns the progression domain, creating it if absent.
    pub fn progression_mut(&mut self) -> &mut ProgressionDelta {
        self.progression.get_or_insert_with(ProgressionDelta::default)
    }

    /// Returns the wallet domain, creating it if absent.
    pub fn wallet_mut(&mut self) -> &mut WalletDelta {
        self.wallet.get_or_insert_with(WalletDelta::default)
    }

    /// Returns the meta domain, creating it if absent.
    pub fn meta_mut(&mut self) -> &mut RewardMeta {
        self.meta.get_or_insert_with(RewardMeta::default)
    }
}
