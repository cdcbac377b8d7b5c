//! # Progression Engine
//!
//! **Level curves, experience grants, level-up rewards**
//!
//! Level is a pure function of cumulative experience:
//!
//! ```text
//! level_thresholds = [t1, t2, ..., tmax]     (strictly increasing)
//! level(xp)        = clamp(count(t <= xp), 1, max_level)
//! ```
//!
//! The lookup is a binary search, O(log levels). Experience is clamped at
//! `tmax`, so a maxed item stops accumulating.
//!
//! ## Invariants
//!
//! - Experience never decreases, even if the curve shrinks under it
//! - Level never decreases
//! - A single grant above `max_experience_grant` is rejected outright
//!
//! Granting prepares; it never commits. See [`prepare_experience`].

use serde::{Deserialize, Serialize};
use skirmish_shared::constants::{
    COLLECTION_PROGRESSION, CURRENCY_GEMS, CURRENCY_GOLD, SOURCE_LEVEL_UP,
};
use skirmish_shared::reward::{ProgressionUnlock, UnlockKind};

use crate::batch::PendingBatch;
use crate::config::{CatalogItem, EconomyConfig};
use crate::error::{EconomyError, EconomyResult};
use crate::store::{read_json, ObjectStore, StorageKey, StorageWrite, WriteCondition};

// =============================================================================
// LEVEL CURVES
// =============================================================================

/// Reward bundle granted on reaching one level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelReward {
    /// Level that grants this bundle.
    pub level: u32,
    /// Gold.
    #[serde(default)]
    pub gold: i64,
    /// Gems.
    #[serde(default)]
    pub gems: i64,
    /// Ability slots unlocked.
    #[serde(default)]
    pub abilities: u32,
    /// Sprites unlocked.
    #[serde(default)]
    pub sprites: u32,
}

impl LevelReward {
    /// Currency-only bundle.
    #[must_use]
    pub const fn currency(level: u32, gold: i64, gems: i64) -> Self {
        Self {
            level,
            gold,
            gems,
            abilities: 0,
            sprites: 0,
        }
    }

    /// Unlock-only bundle.
    #[must_use]
    pub const fn unlocks(level: u32, abilities: u32, sprites: u32) -> Self {
        Self {
            level,
            gold: 0,
            gems: 0,
            abilities,
            sprites,
        }
    }
}

/// Named threshold table plus per-level rewards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCurve {
    /// Highest reachable level.
    pub max_level: u32,
    /// Quadratic base. Used only when `level_thresholds` is empty.
    #[serde(default)]
    pub base_xp: u64,
    /// Cumulative XP needed for level `i + 1`.
    #[serde(default)]
    pub level_thresholds: Vec<u64>,
    /// Reward bundles. Levels without one grant nothing.
    #[serde(default)]
    pub rewards: Vec<LevelReward>,
}

impl LevelCurve {
    /// Curve with thresholds `base_xp * l * l`.
    #[must_use]
    pub fn quadratic(max_level: u32, base_xp: u64) -> Self {
        let mut curve = Self {
            max_level,
            base_xp,
            level_thresholds: Vec::new(),
            rewards: Vec::new(),
        };
        curve.calculate_thresholds();
        curve
    }

    /// Adds or replaces the reward of one level.
    #[must_use]
    pub fn with_reward(mut self, reward: LevelReward) -> Self {
        self.rewards.retain(|r| r.level != reward.level);
        self.rewards.push(reward);
        self.rewards.sort_by_key(|r| r.level);
        self
    }

    /// Derives thresholds from `base_xp` if none were given explicitly.
    pub fn calculate_thresholds(&mut self) {
        if !self.level_thresholds.is_empty() || self.base_xp == 0 {
            return;
        }
        self.level_thresholds = (1..=u64::from(self.max_level))
            .map(|l| self.base_xp.saturating_mul(l).saturating_mul(l))
            .collect();
    }

    /// Checks the table shape.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidConfig`] naming the curve.
    pub fn validate(&self, name: &str) -> EconomyResult<()> {
        let invalid = |reason: String| EconomyError::InvalidConfig(format!("curve {name}: {reason}"));

        if self.max_level == 0 {
            return Err(invalid("max_level must be at least 1".to_string()));
        }
        if self.level_thresholds.len() != self.max_level as usize {
            return Err(invalid(format!(
                "{} thresholds for {} levels",
                self.level_thresholds.len(),
                self.max_level
            )));
        }
        if self.level_thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid("thresholds must be strictly increasing".to_string()));
        }

        let mut levels = std::collections::BTreeSet::new();
        for reward in &self.rewards {
            if reward.level < 2 || reward.level > self.max_level {
                return Err(invalid(format!("reward for unreachable level {}", reward.level)));
            }
            if !levels.insert(reward.level) {
                return Err(invalid(format!("duplicate reward for level {}", reward.level)));
            }
            if reward.gold < 0 || reward.gems < 0 {
                return Err(invalid(format!("negative reward at level {}", reward.level)));
            }
        }
        Ok(())
    }

    /// Level reached with `experience` cumulative XP.
    #[must_use]
    pub fn level_for_experience(&self, experience: u64) -> u32 {
        let reached = self.level_thresholds.partition_point(|t| *t <= experience);
        u32::try_from(reached)
            .unwrap_or(u32::MAX)
            .clamp(1, self.max_level.max(1))
    }

    /// Reward bundle of one level, if configured.
    #[must_use]
    pub fn reward_for(&self, level: u32) -> Option<&LevelReward> {
        self.rewards.iter().find(|r| r.level == level)
    }

    /// XP at which the curve is maxed.
    #[inline]
    #[must_use]
    pub fn max_experience(&self) -> u64 {
        self.level_thresholds.last().copied().unwrap_or(0)
    }
}

// =============================================================================
// LEVELED ITEMS
// =============================================================================

/// Something that levels: the player, one pet, or one class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LeveledItem {
    /// The player account.
    Player,
    /// A pet by catalog id.
    Pet(u32),
    /// A class by catalog id.
    Class(u32),
}

impl LeveledItem {
    /// System name used in unlock notifications.
    #[must_use]
    pub const fn system(self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Pet(_) => "pet",
            Self::Class(_) => "class",
        }
    }

    /// Catalog id (0 for the player).
    #[must_use]
    pub const fn item_id(self) -> u32 {
        match self {
            Self::Player => 0,
            Self::Pet(id) | Self::Class(id) => id,
        }
    }

    /// Key of the progression record.
    #[must_use]
    pub fn storage_key(self) -> String {
        format!("{}_{}", self.system(), self.item_id())
    }
}

/// Stored progression of one leveled item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProgression {
    /// Current level.
    #[serde(rename = "level")]
    pub level: u32,
    /// Cumulative experience.
    #[serde(rename = "xp")]
    pub experience: u64,
    /// Equipped ability index.
    #[serde(rename = "ea", default)]
    pub equipped_ability: u32,
    /// Equipped sprite index.
    #[serde(rename = "es", default)]
    pub equipped_sprite: u32,
    /// Unlocked ability count.
    #[serde(rename = "au", default = "one")]
    pub abilities_unlocked: u32,
    /// Unlocked sprite count.
    #[serde(rename = "su", default = "one")]
    pub sprites_unlocked: u32,
}

const fn one() -> u32 {
    1
}

impl Default for ItemProgression {
    fn default() -> Self {
        Self {
            level: 1,
            experience: 0,
            equipped_ability: 0,
            equipped_sprite: 0,
            abilities_unlocked: 1,
            sprites_unlocked: 1,
        }
    }
}

/// Result of one experience grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelChange {
    /// Level before the grant.
    pub old_level: u32,
    /// Level after the grant.
    pub new_level: u32,
    /// XP actually added after clamping.
    pub experience_added: u64,
}

impl LevelChange {
    /// True if at least one level was gained.
    #[inline]
    #[must_use]
    pub const fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }

    /// Every level crossed by this grant, in order.
    pub fn levels_gained(&self) -> impl Iterator<Item = u32> {
        self.old_level + 1..=self.new_level
    }
}

impl ItemProgression {
    /// Adds experience, clamps at the curve maximum and recomputes the level.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidExperience`] if `amount > max_grant`.
    pub fn grant_experience(
        &mut self,
        amount: u64,
        curve: &LevelCurve,
        max_grant: u64,
    ) -> EconomyResult<LevelChange> {
        if amount > max_grant {
            return Err(EconomyError::InvalidExperience {
                amount,
                max: max_grant,
            });
        }

        let old_level = self.level;
        let old_experience = self.experience;

        self.experience = old_experience
            .saturating_add(amount)
            .min(curve.max_experience())
            .max(old_experience);
        self.level = curve.level_for_experience(self.experience).max(old_level);

        Ok(LevelChange {
            old_level,
            new_level: self.level,
            experience_added: self.experience - old_experience,
        })
    }

    /// Applies a reward's unlocks, clamped to the catalog entry.
    /// Returns the (abilities, sprites) actually unlocked.
    pub fn apply_unlock(&mut self, reward: &LevelReward, entry: Option<&CatalogItem>) -> (u32, u32) {
        let Some(entry) = entry else {
            return (0, 0);
        };

        let abilities = self
            .abilities_unlocked
            .saturating_add(reward.abilities)
            .min(entry.ability_count)
            .max(self.abilities_unlocked);
        let sprites = self
            .sprites_unlocked
            .saturating_add(reward.sprites)
            .min(entry.sprite_count)
            .max(self.sprites_unlocked);

        let gained = (
            abilities - self.abilities_unlocked,
            sprites - self.sprites_unlocked,
        );
        self.abilities_unlocked = abilities;
        self.sprites_unlocked = sprites;
        gained
    }
}

// =============================================================================
// PREPARE
// =============================================================================

/// Grants experience to one item and prepares the result into `batch`.
///
/// Adds one progression write (versioned against the record just read) plus,
/// for every level crossed, that level's reward bundle.
///
/// # Errors
///
/// - [`EconomyError::InvalidItemId`] for an unknown pet or class
/// - [`EconomyError::UnknownLevelCurve`] if the item's curve is not configured
/// - [`EconomyError::InvalidExperience`] for an oversized grant
/// - storage read failures
pub fn prepare_experience<S>(
    store: &S,
    config: &EconomyConfig,
    owner: &str,
    item: LeveledItem,
    amount: u64,
    batch: &mut PendingBatch,
) -> EconomyResult<LevelChange>
where
    S: ObjectStore + ?Sized,
{
    let curve = config.level_curve(config.curve_name(item)?)?;
    let entry = config.catalog.entry(item)?;

    let key = StorageKey::new(COLLECTION_PROGRESSION, item.storage_key(), owner);
    let (mut progression, version) = match read_json::<ItemProgression, _>(store, &key)? {
        Some((progression, version)) => (progression, Some(version)),
        None => (ItemProgression::default(), None),
    };

    let change = progression.grant_experience(
        amount,
        curve,
        config.match_economy.max_experience_grant,
    )?;

    for level in change.levels_gained() {
        if let Some(reward) = curve.reward_for(level) {
            batch.merge(level_reward_batch(owner, item, reward, &mut progression, entry));
        }
    }

    if change.experience_added == 0 && !change.leveled_up() {
        return Ok(change);
    }

    batch.add_write(StorageWrite::json(
        key,
        &progression,
        WriteCondition::expecting(version),
    )?);

    if change.leveled_up() {
        tracing::info!(
            "{} {} of {} reached level {} (from {})",
            item.system(),
            item.item_id(),
            owner,
            change.new_level,
            change.old_level
        );
        let delta = batch.payload_mut(SOURCE_LEVEL_UP).progression_mut();
        let slot = match item {
            LeveledItem::Player => &mut delta.new_player_level,
            LeveledItem::Pet(_) => &mut delta.new_pet_level,
            LeveledItem::Class(_) => &mut delta.new_class_level,
        };
        if slot.is_none() {
            *slot = Some(change.new_level);
        }
    }

    Ok(change)
}

fn level_reward_batch(
    owner: &str,
    item: LeveledItem,
    reward: &LevelReward,
    progression: &mut ItemProgression,
    entry: Option<&CatalogItem>,
) -> PendingBatch {
    let mut sub = PendingBatch::new();

    if reward.gold != 0 || reward.gems != 0 {
        sub.add_ledger_delta(owner, [(CURRENCY_GOLD, reward.gold), (CURRENCY_GEMS, reward.gems)]);
        let wallet = sub.payload_mut(SOURCE_LEVEL_UP).wallet_mut();
        wallet.gold = reward.gold;
        wallet.gems = reward.gems;
    }

    let (abilities, sprites) = progression.apply_unlock(reward, entry);
    for (kind, count) in [(UnlockKind::Ability, abilities), (UnlockKind::Sprite, sprites)] {
        if count > 0 {
            sub.payload_mut(SOURCE_LEVEL_UP)
                .progression_mut()
                .unlocks
                .push(ProgressionUnlock {
                    system: item.system().to_string(),
                    item_id: item.item_id(),
                    kind,
                    count,
                });
        }
    }

    sub
}
