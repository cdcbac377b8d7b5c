//! # Economy Configuration
//!
//! All balance data lives in one TOML file, loaded once at startup,
//! validated, then shared read-only (`Arc<EconomyConfig>`) by every component.
//!
//! ```text
//! economy.toml
//!   ├── [match_economy]        XP, token rates, duration gates
//!   ├── [level_curves.<name>]  thresholds + per-level reward bundles
//!   ├── [loot]                 win/loss tier, tier -> drop table
//!   └── [catalog]              pets/classes -> curve, unlock limits
//! ```
//!
//! **NEVER** mutate a loaded config. Build a new one and restart.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use skirmish_shared::reward::ContainerTier;

use crate::error::{EconomyError, EconomyResult};
use crate::progression::{LevelCurve, LevelReward, LeveledItem};

/// Default name of the player's level curve.
pub const PLAYER_LEVEL_CURVE: &str = "player_level";

// =============================================================================
// MATCH ECONOMY
// =============================================================================

/// Match reward constants.
///
/// Token amounts are in half-token units: 2 units = 1.0 token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchEconomyConfig {
    /// XP for an honored win.
    pub win_xp: u64,
    /// XP for a loss (and for every non-honored win).
    pub loss_xp: u64,
    /// Half-units per eligible round won.
    pub tokens_per_round_win: u32,
    /// Half-units per eligible round lost.
    pub tokens_per_round_loss: u32,
    /// Half-units per eligible solo round, regardless of outcome.
    pub tokens_per_solo_round: u32,
    /// Balance at which one drop slot is exchanged for a loot container.
    pub token_exchange_threshold: u32,
    /// Only rounds `1..=token_round_cap` earn tokens.
    pub token_round_cap: u32,
    /// Hard per-match round ceiling, independent of any request data.
    pub max_rounds_per_match: u32,
    /// Floor on elapsed time between start and submission.
    pub min_match_duration_ms: i64,
    /// Stale ceiling for two-player matches.
    pub max_match_duration_ms: i64,
    /// Stale ceiling for solo sessions.
    pub max_solo_match_duration_ms: i64,
    /// Largest single experience grant accepted.
    pub max_experience_grant: u64,
    /// XP percent for the 1st, 2nd, ... match of the UTC day.
    /// The last entry applies to every later match.
    pub daily_xp_schedule: Vec<u32>,
    /// Rounds shorter than this are flagged in the logs.
    pub suspicious_round_sec: u32,
}

impl Default for MatchEconomyConfig {
    fn default() -> Self {
        Self {
            win_xp: 100,
            loss_xp: 25,
            tokens_per_round_win: 2,
            tokens_per_round_loss: 1,
            tokens_per_solo_round: 1,
            token_exchange_threshold: 6,
            token_round_cap: 3,
            max_rounds_per_match: 10,
            min_match_duration_ms: 10_000,
            max_match_duration_ms: 10 * 60 * 1000,
            max_solo_match_duration_ms: 60 * 60 * 1000,
            max_experience_grant: 1_000_000,
            daily_xp_schedule: vec![100, 80, 60, 40, 25],
            suspicious_round_sec: 5,
        }
    }
}

impl MatchEconomyConfig {
    /// Stale ceiling for the given mode.
    #[inline]
    #[must_use]
    pub const fn max_duration_ms(&self, solo: bool) -> i64 {
        if solo {
            self.max_solo_match_duration_ms
        } else {
            self.max_match_duration_ms
        }
    }

    /// XP percent for the `index`-th (1-based) match of the day.
    #[must_use]
    pub fn daily_xp_percent(&self, index: u32) -> u32 {
        let slot = index.max(1) as usize - 1;
        self.daily_xp_schedule
            .get(slot)
            .or_else(|| self.daily_xp_schedule.last())
            .copied()
            .unwrap_or(100)
    }

    /// Token ceiling for a clean sweep of the earning window.
    #[inline]
    #[must_use]
    pub const fn sweep_cap(&self) -> u32 {
        self.token_round_cap.saturating_mul(self.tokens_per_round_win)
    }

    /// Token ceiling independent of the request.
    #[inline]
    #[must_use]
    pub const fn absolute_cap(&self) -> u32 {
        self.max_rounds_per_match.saturating_mul(self.tokens_per_round_win)
    }

    fn validate(&self) -> EconomyResult<()> {
        if self.win_xp > self.max_experience_grant || self.loss_xp > self.max_experience_grant {
            return Err(EconomyError::InvalidConfig(
                "match XP exceeds max_experience_grant".to_string(),
            ));
        }
        if self.token_exchange_threshold == 0 {
            return Err(EconomyError::InvalidConfig(
                "token_exchange_threshold must be positive".to_string(),
            ));
        }
        if self.token_round_cap == 0 || self.max_rounds_per_match < self.token_round_cap {
            return Err(EconomyError::InvalidConfig(format!(
                "round caps out of order: token_round_cap {}, max_rounds_per_match {}",
                self.token_round_cap, self.max_rounds_per_match
            )));
        }
        if self.min_match_duration_ms < 0
            || self.min_match_duration_ms >= self.max_match_duration_ms
            || self.min_match_duration_ms >= self.max_solo_match_duration_ms
        {
            return Err(EconomyError::InvalidConfig(
                "match duration floor must sit below both ceilings".to_string(),
            ));
        }
        if self.daily_xp_schedule.is_empty()
            || self.daily_xp_schedule.iter().any(|p| *p == 0 || *p > 100)
        {
            return Err(EconomyError::InvalidConfig(
                "daily_xp_schedule needs percents in 1..=100".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// LOOT
// =============================================================================

/// Inclusive amount range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    /// Lower bound.
    pub min: u32,
    /// Upper bound.
    pub max: u32,
}

impl AmountRange {
    /// Creates a range.
    #[must_use]
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

/// Contents table of one container tier. Read by the redemption flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTable {
    /// Tier this table belongs to.
    pub tier: ContainerTier,
    /// Gold range.
    #[serde(default)]
    pub gold: AmountRange,
    /// Gem range.
    #[serde(default)]
    pub gems: AmountRange,
    /// Chance in percent to roll one item.
    #[serde(default)]
    pub item_chance_percent: u32,
    /// Item pools the roll draws from (`pets`, `classes`, `backgrounds`, ...).
    #[serde(default)]
    pub item_pools: Vec<String>,
}

/// Container tier selection and drop tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LootConfig {
    /// Tier granted by an exchange after an honored win.
    pub match_win_tier: ContainerTier,
    /// Tier granted by an exchange otherwise.
    pub match_loss_tier: ContainerTier,
    /// One table per tier.
    pub drop_tables: Vec<DropTable>,
}

impl Default for LootConfig {
    fn default() -> Self {
        Self {
            match_win_tier: ContainerTier::Standard,
            match_loss_tier: ContainerTier::Standard,
            drop_tables: vec![
                DropTable {
                    tier: ContainerTier::Standard,
                    gold: AmountRange::new(50, 150),
                    gems: AmountRange::new(0, 5),
                    item_chance_percent: 10,
                    item_pools: vec!["backgrounds".to_string(), "piece_styles".to_string()],
                },
                DropTable {
                    tier: ContainerTier::Premium,
                    gold: AmountRange::new(150, 400),
                    gems: AmountRange::new(5, 15),
                    item_chance_percent: 25,
                    item_pools: vec!["backgrounds".to_string(), "piece_styles".to_string()],
                },
                DropTable {
                    tier: ContainerTier::Legendary,
                    gold: AmountRange::new(400, 1000),
                    gems: AmountRange::new(15, 40),
                    item_chance_percent: 60,
                    item_pools: vec![
                        "pets".to_string(),
                        "classes".to_string(),
                        "backgrounds".to_string(),
                    ],
                },
            ],
        }
    }
}

impl LootConfig {
    /// Tier for an exchange, by honored outcome.
    #[inline]
    #[must_use]
    pub const fn tier_for(&self, won: bool) -> ContainerTier {
        if won {
            self.match_win_tier
        } else {
            self.match_loss_tier
        }
    }

    /// Drop table of a tier.
    #[must_use]
    pub fn drop_table(&self, tier: ContainerTier) -> Option<&DropTable> {
        self.drop_tables.iter().find(|t| t.tier == tier)
    }

    fn validate(&self) -> EconomyResult<()> {
        let mut seen = BTreeSet::new();
        for table in &self.drop_tables {
            if !seen.insert(table.tier) {
                return Err(EconomyError::InvalidConfig(format!(
                    "duplicate drop table for tier {}",
                    table.tier
                )));
            }
            if table.gold.min > table.gold.max || table.gems.min > table.gems.max {
                return Err(EconomyError::InvalidConfig(format!(
                    "inverted amount range in {} drop table",
                    table.tier
                )));
            }
            if table.item_chance_percent > 100 {
                return Err(EconomyError::InvalidConfig(format!(
                    "item_chance_percent over 100 in {} drop table",
                    table.tier
                )));
            }
        }
        for tier in [self.match_win_tier, self.match_loss_tier] {
            if self.drop_table(tier).is_none() {
                return Err(EconomyError::InvalidConfig(format!(
                    "no drop table for match tier {tier}"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// A pet or class definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Item id.
    pub id: u32,
    /// Level curve name.
    pub level_curve: String,
    /// Abilities the item has in total. Caps ability unlocks.
    pub ability_count: u32,
    /// Sprites the item has in total. Caps sprite unlocks.
    pub sprite_count: u32,
}

impl CatalogItem {
    fn new(id: u32, level_curve: &str, ability_count: u32, sprite_count: u32) -> Self {
        Self {
            id,
            level_curve: level_curve.to_string(),
            ability_count,
            sprite_count,
        }
    }
}

/// Leveled-item catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Level curve used for the player.
    pub player_level_curve: String,
    /// Pets.
    pub pets: Vec<CatalogItem>,
    /// Classes.
    pub classes: Vec<CatalogItem>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            player_level_curve: PLAYER_LEVEL_CURVE.to_string(),
            pets: (0..4).map(|id| CatalogItem::new(id, "pet_level", 3, 3)).collect(),
            classes: (0..4).map(|id| CatalogItem::new(id, "class_level", 4, 2)).collect(),
        }
    }
}

impl CatalogConfig {
    /// Looks up a pet.
    #[must_use]
    pub fn pet(&self, id: u32) -> Option<&CatalogItem> {
        self.pets.iter().find(|p| p.id == id)
    }

    /// Looks up a class.
    #[must_use]
    pub fn class(&self, id: u32) -> Option<&CatalogItem> {
        self.classes.iter().find(|c| c.id == id)
    }

    /// Catalog entry for a leveled item. `None` for the player.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidItemId`] for an unknown pet or class.
    pub fn entry(&self, item: LeveledItem) -> EconomyResult<Option<&CatalogItem>> {
        match item {
            LeveledItem::Player => Ok(None),
            LeveledItem::Pet(id) => self
                .pet(id)
                .map(Some)
                .ok_or(EconomyError::InvalidItemId { category: "pet", id }),
            LeveledItem::Class(id) => self
                .class(id)
                .map(Some)
                .ok_or(EconomyError::InvalidItemId { category: "class", id }),
        }
    }

    fn validate(&self, curves: &BTreeMap<String, LevelCurve>) -> EconomyResult<()> {
        if !curves.contains_key(&self.player_level_curve) {
            return Err(EconomyError::InvalidConfig(format!(
                "player level curve {} is not defined",
                self.player_level_curve
            )));
        }
        for (category, items) in [("pet", &self.pets), ("class", &self.classes)] {
            let mut ids = BTreeSet::new();
            for item in items {
                if !ids.insert(item.id) {
                    return Err(EconomyError::InvalidConfig(format!(
                        "duplicate {category} id {}",
                        item.id
                    )));
                }
                if !curves.contains_key(&item.level_curve) {
                    return Err(EconomyError::InvalidConfig(format!(
                        "{category} {} references undefined curve {}",
                        item.id, item.level_curve
                    )));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// ROOT
// =============================================================================

/// The complete, validated economy configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Match reward constants.
    pub match_economy: MatchEconomyConfig,
    /// Named level curves.
    pub level_curves: BTreeMap<String, LevelCurve>,
    /// Loot tiers and drop tables.
    pub loot: LootConfig,
    /// Pets and classes.
    pub catalog: CatalogConfig,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        let mut level_curves = BTreeMap::new();
        level_curves.insert(
            PLAYER_LEVEL_CURVE.to_string(),
            LevelCurve::quadratic(50, 100)
                .with_reward(LevelReward::currency(2, 100, 0))
                .with_reward(LevelReward::currency(5, 250, 10))
                .with_reward(LevelReward::currency(10, 500, 25))
                .with_reward(LevelReward::currency(25, 1000, 50))
                .with_reward(LevelReward::currency(50, 2500, 100)),
        );
        level_curves.insert(
            "pet_level".to_string(),
            LevelCurve::quadratic(20, 50)
                .with_reward(LevelReward::unlocks(2, 1, 0))
                .with_reward(LevelReward::unlocks(3, 0, 1))
                .with_reward(LevelReward::unlocks(5, 1, 0))
                .with_reward(LevelReward::unlocks(10, 0, 1))
                .with_reward(LevelReward::currency(20, 0, 20)),
        );
        level_curves.insert(
            "class_level".to_string(),
            LevelCurve::quadratic(20, 60)
                .with_reward(LevelReward::unlocks(2, 1, 0))
                .with_reward(LevelReward::unlocks(4, 1, 1))
                .with_reward(LevelReward::unlocks(8, 1, 0))
                .with_reward(LevelReward::currency(20, 500, 0)),
        );

        Self {
            match_economy: MatchEconomyConfig::default(),
            level_curves,
            loot: LootConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl EconomyConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidConfig`] on a parse or validation failure.
    pub fn from_toml_str(source: &str) -> EconomyResult<Self> {
        let mut config: Self = toml::from_str(source)
            .map_err(|e| EconomyError::InvalidConfig(format!("failed to parse config: {e}")))?;
        config.prepare()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidConfig`] if the file is unreadable or invalid.
    pub fn load(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            EconomyError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::info!(
            "Loaded economy config from {}: {} level curves, {} pets, {} classes",
            path.display(),
            config.level_curves.len(),
            config.catalog.pets.len(),
            config.catalog.classes.len()
        );
        Ok(config)
    }

    /// Derives implicit thresholds, then validates.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidConfig`] on the first inconsistency.
    pub fn prepare(&mut self) -> EconomyResult<()> {
        for curve in self.level_curves.values_mut() {
            curve.calculate_thresholds();
        }
        self.validate()
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidConfig`] on the first inconsistency.
    pub fn validate(&self) -> EconomyResult<()> {
        self.match_economy.validate()?;
        for (name, curve) in &self.level_curves {
            curve.validate(name)?;
        }
        self.loot.validate()?;
        self.catalog.validate(&self.level_curves)
    }

    /// Looks up a level curve.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::UnknownLevelCurve`] if the name is not defined.
    pub fn level_curve(&self, name: &str) -> EconomyResult<&LevelCurve> {
        self.level_curves
            .get(name)
            .ok_or_else(|| EconomyError::UnknownLevelCurve(name.to_string()))
    }

    /// Level curve name of a leveled item.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidItemId`] for an unknown pet or class.
    pub fn curve_name(&self, item: LeveledItem) -> EconomyResult<&str> {
        Ok(match self.catalog.entry(item)? {
            Some(entry) => entry.level_curve.as_str(),
            None => self.catalog.player_level_curve.as_str(),
        })
    }
}
