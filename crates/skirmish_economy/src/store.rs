//! # Storage Boundary
//!
//! Narrow contracts for everything the economy reaches outside the process:
//!
//! ```text
//! ObjectStore      read / conditional write / delete, keyed by (collection, key, owner)
//! Ledger           per-owner signed balances, multi-currency delta application
//! AtomicCommitter  writes + ledger deltas as ONE indivisible update
//! Notifier         out-of-band reward delivery to one player
//! ```
//!
//! Every call is synchronous and fallible. There is no retry in here;
//! retry policy belongs to the caller.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use skirmish_shared::RewardPayload;

use crate::error::EconomyResult;

/// Address of one stored record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageKey {
    /// Collection name.
    pub collection: String,
    /// Key inside the collection.
    pub key: String,
    /// Owning player.
    pub owner: String,
}

impl StorageKey {
    /// Creates a key.
    #[must_use]
    pub fn new(collection: &str, key: impl Into<String>, owner: &str) -> Self {
        Self {
            collection: collection.to_string(),
            key: key.into(),
            owner: owner.to_string(),
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.collection, self.key, self.owner)
    }
}

/// Opaque concurrency token of a stored record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(String);

impl Version {
    /// Wraps a backend-issued token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Precondition a write must satisfy to land.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteCondition {
    /// Last writer wins.
    #[default]
    Unconditional,
    /// The record must still carry this version.
    IfVersion(Version),
    /// The record must not exist yet.
    IfAbsent,
}

impl WriteCondition {
    /// Condition for rewriting a record that was just read.
    /// `None` (never stored) becomes [`WriteCondition::IfAbsent`].
    #[must_use]
    pub fn expecting(version: Option<Version>) -> Self {
        version.map_or(Self::IfAbsent, Self::IfVersion)
    }
}

/// One pending object write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageWrite {
    /// Target record.
    pub key: StorageKey,
    /// JSON document.
    pub value: String,
    /// Precondition.
    pub condition: WriteCondition,
}

impl StorageWrite {
    /// Serializes `value` to JSON and wraps it in a write.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EconomyError::Serialization`] if encoding fails.
    pub fn json<T: Serialize>(
        key: StorageKey,
        value: &T,
        condition: WriteCondition,
    ) -> EconomyResult<Self> {
        Ok(Self {
            key,
            value: serde_json::to_string(value)?,
            condition,
        })
    }
}

/// A record as returned by a read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Address.
    pub key: StorageKey,
    /// JSON document.
    pub value: String,
    /// Current version.
    pub version: Version,
}

impl StoredObject {
    /// Decodes the JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EconomyError::Serialization`] on a schema mismatch.
    pub fn decode<T: DeserializeOwned>(&self) -> EconomyResult<T> {
        Ok(serde_json::from_str(&self.value)?)
    }
}

/// Signed balance changes for one owner, keyed by currency.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
    /// Owning player.
    pub owner: String,
    /// Currency -> signed delta.
    pub changes: BTreeMap<String, i64>,
}

/// Key-value records with optimistic concurrency.
pub trait ObjectStore: Send + Sync {
    /// Reads one record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EconomyError::StorageRead`] if the backend fails.
    fn read(&self, key: &StorageKey) -> EconomyResult<Option<StoredObject>>;

    /// Writes one record, honoring its condition. Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EconomyError::VersionConflict`] if the condition fails,
    /// [`crate::EconomyError::StorageWrite`] if the backend fails.
    fn write(&self, write: StorageWrite) -> EconomyResult<Version>;

    /// Deletes one record. Deleting an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EconomyError::StorageWrite`] if the backend fails.
    fn delete(&self, key: &StorageKey) -> EconomyResult<()>;
}

/// Per-owner, per-currency signed balances.
pub trait Ledger: Send + Sync {
    /// All balances of one owner. Missing currencies read as zero.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EconomyError::StorageRead`] if the backend fails.
    fn balances(&self, owner: &str) -> EconomyResult<BTreeMap<String, i64>>;

    /// Applies every change atomically. Returns the new balances.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EconomyError::InsufficientBalance`] if a balance would
    /// drop below zero and `allow_negative` is false.
    fn apply_deltas(
        &self,
        owner: &str,
        changes: &BTreeMap<String, i64>,
        allow_negative: bool,
    ) -> EconomyResult<BTreeMap<String, i64>>;
}

/// The multi-update primitive.
pub trait AtomicCommitter: Send + Sync {
    /// Applies every write and every delta, or none of them.
    ///
    /// # Errors
    ///
    /// Returns the first failed precondition. Nothing is applied on error.
    fn multi_update(
        &self,
        writes: &[StorageWrite],
        deltas: &[LedgerDelta],
        allow_negative: bool,
    ) -> EconomyResult<()>;
}

/// Everything the match lifecycle needs from storage.
pub trait Backend: ObjectStore + Ledger + AtomicCommitter {}

impl<T: ObjectStore + Ledger + AtomicCommitter> Backend for T {}

/// Out-of-band reward delivery.
pub trait Notifier: Send + Sync {
    /// Hands a payload to the delivery channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel rejects the payload.
    fn notify(&self, owner: &str, payload: &RewardPayload) -> EconomyResult<()>;
}

/// Reads and decodes one record together with its version.
///
/// # Errors
///
/// Propagates read and decode failures.
pub fn read_json<T, S>(store: &S, key: &StorageKey) -> EconomyResult<Option<(T, Version)>>
where
    T: DeserializeOwned,
    S: ObjectStore + ?Sized,
{
    match store.read(key)? {
        Some(object) => Ok(Some((object.decode()?, object.version))),
        None => Ok(None),
    }
}
