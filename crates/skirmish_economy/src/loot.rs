//! # Loot Containers
//!
//! Sealed containers granted by the round-token exchange. The economy only
//! *creates* them (unopened); contents are rolled by the redemption flow
//! against [`crate::config::DropTable`].
//!
//! ## Identifiers
//!
//! ```text
//! lb_<first 8 chars of owner>_<epoch ms>_<4 hex>
//! ```
//!
//! The random suffix comes from a seedable `ChaCha8Rng`, so tests and the
//! simulation produce reproducible ids.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use skirmish_shared::constants::{COLLECTION_LOOT_CONTAINERS, SOURCE_TOKEN_EXCHANGE};
use skirmish_shared::reward::{ContainerGrant, ContainerTier};

use crate::batch::PendingBatch;
use crate::error::EconomyResult;
use crate::store::{StorageKey, StorageWrite, WriteCondition};

/// Stored container record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootContainer {
    /// Container id, also the storage key.
    pub id: String,
    /// Tier.
    pub tier: ContainerTier,
    /// Creation time, epoch ms.
    pub created_at: i64,
    /// Set once by redemption.
    pub opened: bool,
}

/// Shared source of container and reward identifiers.
#[derive(Debug)]
pub struct IdGenerator {
    rng: Mutex<ChaCha8Rng>,
}

impl IdGenerator {
    /// Deterministic generator.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Generator seeded from the wall clock and process id.
    #[must_use]
    pub fn from_time() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        #[allow(clippy::cast_possible_truncation)]
        let seed = (nanos as u64) ^ (u64::from(std::process::id()) << 32);
        Self::with_seed(seed)
    }

    /// `lb_<owner prefix>_<ms>_<4 hex>`.
    #[must_use]
    pub fn container_id(&self, owner: &str, now_ms: i64) -> String {
        let prefix: String = owner.chars().take(8).collect();
        let suffix: u16 = self.rng.lock().gen();
        format!("lb_{prefix}_{now_ms}_{suffix:04x}")
    }

    /// 12 hex characters.
    #[must_use]
    pub fn reward_id(&self) -> String {
        let bits: u64 = self.rng.lock().gen::<u64>() & 0xFFFF_FFFF_FFFF;
        format!("{bits:012x}")
    }
}

/// Prepares one unopened container into `batch` and lists it on the payload.
///
/// # Errors
///
/// Returns [`crate::EconomyError::Serialization`] if the record cannot be encoded.
pub fn prepare_container(
    ids: &IdGenerator,
    owner: &str,
    tier: ContainerTier,
    now_ms: i64,
    source: &str,
    batch: &mut PendingBatch,
) -> EconomyResult<LootContainer> {
    let container = LootContainer {
        id: ids.container_id(owner, now_ms),
        tier,
        created_at: now_ms,
        opened: false,
    };

    batch.add_write(StorageWrite::json(
        StorageKey::new(COLLECTION_LOOT_CONTAINERS, container.id.clone(), owner),
        &container,
        WriteCondition::IfAbsent,
    )?);
    batch.payload_mut(source).containers.push(ContainerGrant {
        id: container.id.clone(),
        tier,
        source: Some(SOURCE_TOKEN_EXCHANGE.to_string()),
    });

    Ok(container)
}
