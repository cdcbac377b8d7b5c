//! # In-Memory Backend
//!
//! Reference implementation of [`ObjectStore`], [`Ledger`] and
//! [`AtomicCommitter`] behind one `parking_lot` lock. Used by tests, the
//! simulation binary, and any deployment that is happy with a journal file.
//!
//! ## Multi-Update
//!
//! ```text
//! lock ─► check every write condition ─► project every balance ─► journal ─► apply
//!              │ fail                          │ fail                │ fail
//!              └──────────────── nothing applied ◄──────────────────┘
//! ```
//!
//! ## Test Hooks
//!
//! - [`MemoryStore::fail_collection`]: every write or delete touching that
//!   collection fails with [`EconomyError::StorageWrite`]
//! - [`MemoryStore::commit_count`]: number of successful multi-updates

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use skirmish_shared::RewardPayload;

use crate::error::{EconomyError, EconomyResult};
use crate::journal::{CommitJournal, JournalOp};
use crate::store::{
    AtomicCommitter, Ledger, LedgerDelta, Notifier, ObjectStore, StorageKey, StorageWrite,
    StoredObject, Version, WriteCondition,
};

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    version: u64,
}

#[derive(Debug)]
struct State {
    objects: HashMap<StorageKey, Entry>,
    wallets: HashMap<String, BTreeMap<String, i64>>,
    next_version: u64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
            wallets: HashMap::new(),
            next_version: 1,
        }
    }
}

impl State {
    fn check_condition(&self, write: &StorageWrite) -> EconomyResult<()> {
        let existing = self.objects.get(&write.key);
        let holds = match &write.condition {
            WriteCondition::Unconditional => true,
            WriteCondition::IfAbsent => existing.is_none(),
            WriteCondition::IfVersion(expected) => {
                existing.is_some_and(|e| version_token(e.version) == *expected)
            }
        };
        if holds {
            Ok(())
        } else {
            Err(EconomyError::VersionConflict {
                collection: write.key.collection.clone(),
                key: write.key.key.clone(),
            })
        }
    }

    fn balance(&self, owner: &str, currency: &str) -> i64 {
        self.wallets
            .get(owner)
            .and_then(|w| w.get(currency))
            .copied()
            .unwrap_or(0)
    }

    /// Validates deltas and returns the resulting balances per owner.
    fn project(
        &self,
        deltas: &[LedgerDelta],
        allow_negative: bool,
    ) -> EconomyResult<BTreeMap<String, BTreeMap<String, i64>>> {
        let mut projected: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
        for delta in deltas {
            let wallet = projected.entry(delta.owner.clone()).or_default();
            for (currency, change) in &delta.changes {
                let balance = *wallet
                    .entry(currency.clone())
                    .or_insert_with(|| self.balance(&delta.owner, currency));
                let next = balance.saturating_add(*change);
                if next < 0 && *change < 0 && !allow_negative {
                    return Err(EconomyError::InsufficientBalance {
                        currency: currency.clone(),
                        balance,
                        delta: *change,
                    });
                }
                wallet.insert(currency.clone(), next);
            }
        }
        Ok(projected)
    }

    fn apply(&mut self, op: JournalOp) {
        match op {
            JournalOp::Write {
                key,
                value,
                version,
            } => {
                self.next_version = self.next_version.max(version + 1);
                self.objects.insert(key, Entry { value, version });
            }
            JournalOp::Delete { key } => {
                self.objects.remove(&key);
            }
            JournalOp::Ledger { owner, changes } => {
                let wallet = self.wallets.entry(owner).or_default();
                for (currency, change) in changes {
                    let slot = wallet.entry(currency).or_insert(0);
                    *slot = slot.saturating_add(change);
                }
            }
        }
    }

    fn take_version(&mut self) -> u64 {
        let version = self.next_version;
        self.next_version += 1;
        version
    }
}

fn version_token(version: u64) -> Version {
    Version::new(format!("v{version}"))
}

/// In-memory object store and ledger with an optional commit journal.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    failing: RwLock<BTreeSet<String>>,
    commits: AtomicU64,
    journal: Option<CommitJournal>,
}

impl MemoryStore {
    /// Creates an empty, volatile store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a journaled store, replaying every committed batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be opened.
    pub fn recover(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let (journal, recovery) = CommitJournal::open(path)?;

        let mut state = State::default();
        let batches = recovery.batches.len();
        for op in recovery.batches.into_iter().flatten() {
            state.apply(op);
        }

        tracing::info!(
            "Recovered {} committed batches from {} ({} objects)",
            batches,
            journal.path().display(),
            state.objects.len()
        );

        Ok(Self {
            state: RwLock::new(state),
            failing: RwLock::new(BTreeSet::new()),
            commits: AtomicU64::new(0),
            journal: Some(journal),
        })
    }

    /// Makes every write or delete to `collection` fail.
    pub fn fail_collection(&self, collection: &str) {
        self.failing.write().insert(collection.to_string());
    }

    /// Undoes [`Self::fail_collection`].
    pub fn heal_collection(&self, collection: &str) {
        self.failing.write().remove(collection);
    }

    /// Successful multi-updates so far.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Current balance of one currency.
    #[must_use]
    pub fn balance(&self, owner: &str, currency: &str) -> i64 {
        self.state.read().balance(owner, currency)
    }

    /// Records stored in a collection, across all owners.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.state
            .read()
            .objects
            .keys()
            .filter(|k| k.collection == collection)
            .count()
    }

    fn check_failing(&self, key: &StorageKey) -> EconomyResult<()> {
        if self.failing.read().contains(&key.collection) {
            return Err(EconomyError::StorageWrite(format!(
                "injected failure on {}",
                key.collection
            )));
        }
        Ok(())
    }

    fn journal(&self, ops: &[JournalOp]) -> EconomyResult<()> {
        if let Some(journal) = &self.journal {
            journal.append_batch(ops)?;
        }
        Ok(())
    }
}

impl ObjectStore for MemoryStore {
    fn read(&self, key: &StorageKey) -> EconomyResult<Option<StoredObject>> {
        Ok(self.state.read().objects.get(key).map(|e| StoredObject {
            key: key.clone(),
            value: e.value.clone(),
            version: version_token(e.version),
        }))
    }

    fn write(&self, write: StorageWrite) -> EconomyResult<Version> {
        self.check_failing(&write.key)?;

        let mut state = self.state.write();
        state.check_condition(&write)?;

        let version = state.take_version();
        let op = JournalOp::Write {
            key: write.key,
            value: write.value,
            version,
        };
        self.journal(std::slice::from_ref(&op))?;
        state.apply(op);

        Ok(version_token(version))
    }

    fn delete(&self, key: &StorageKey) -> EconomyResult<()> {
        self.check_failing(key)?;

        let mut state = self.state.write();
        if !state.objects.contains_key(key) {
            return Ok(());
        }
        let op = JournalOp::Delete { key: key.clone() };
        self.journal(std::slice::from_ref(&op))?;
        state.apply(op);
        Ok(())
    }
}

impl Ledger for MemoryStore {
    fn balances(&self, owner: &str) -> EconomyResult<BTreeMap<String, i64>> {
        Ok(self
            .state
            .read()
            .wallets
            .get(owner)
            .cloned()
            .unwrap_or_default())
    }

    fn apply_deltas(
        &self,
        owner: &str,
        changes: &BTreeMap<String, i64>,
        allow_negative: bool,
    ) -> EconomyResult<BTreeMap<String, i64>> {
        let delta = LedgerDelta {
            owner: owner.to_string(),
            changes: changes.clone(),
        };

        let mut state = self.state.write();
        state.project(std::slice::from_ref(&delta), allow_negative)?;

        let op = JournalOp::Ledger {
            owner: delta.owner,
            changes: delta.changes,
        };
        self.journal(std::slice::from_ref(&op))?;
        state.apply(op);

        Ok(state.wallets.get(owner).cloned().unwrap_or_default())
    }
}

impl AtomicCommitter for MemoryStore {
    fn multi_update(
        &self,
        writes: &[StorageWrite],
        deltas: &[LedgerDelta],
        allow_negative: bool,
    ) -> EconomyResult<()> {
        let mut state = self.state.write();

        let mut targets = BTreeSet::new();
        for write in writes {
            self.check_failing(&write.key)?;
            if !targets.insert(&write.key) {
                return Err(EconomyError::StorageWrite(format!(
                    "duplicate write to {} in one batch",
                    write.key
                )));
            }
            state.check_condition(write)?;
        }
        state.project(deltas, allow_negative)?;

        let mut ops = Vec::with_capacity(writes.len() + deltas.len());
        for write in writes {
            ops.push(JournalOp::Write {
                key: write.key.clone(),
                value: write.value.clone(),
                version: state.take_version(),
            });
        }
        for delta in deltas {
            ops.push(JournalOp::Ledger {
                owner: delta.owner.clone(),
                changes: delta.changes.clone(),
            });
        }

        self.journal(&ops)?;
        for op in ops {
            state.apply(op);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

/// Notifier that records every delivery.
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<(String, RewardPayload)>>,
    failing: std::sync::atomic::AtomicBool,
}

impl MemoryNotifier {
    /// Creates an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every delivery fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Payloads delivered to `owner`, oldest first.
    #[must_use]
    pub fn delivered_to(&self, owner: &str) -> Vec<RewardPayload> {
        self.sent
            .lock()
            .iter()
            .filter(|(o, _)| o == owner)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, owner: &str, payload: &RewardPayload) -> EconomyResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EconomyError::StorageWrite("notification channel down".to_string()));
        }
        self.sent.lock().push((owner.to_string(), payload.clone()));
        Ok(())
    }
}
