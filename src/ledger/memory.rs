//! In-memory ledger backend
//!
//! Rows live in a shared map keyed by table and id. Each row has an async
//! mutex standing in for PostgreSQL's row lock: a transaction acquires it on
//! a locking read or a write and keeps it until commit or rollback.
//! Writes apply immediately and are journaled; rollback (explicit or by
//! dropping the transaction) replays the journal backwards before the row
//! locks are released. Non-locking readers can therefore observe writes of a
//! transaction that has not committed yet.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::any::Any;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::{Entity, Ledger, LedgerError, LedgerResult, Page};
use crate::investment::Investment;

type Row = Box<dyn Any + Send + Sync>;
type RowKey = (&'static str, Uuid);
type Tables = HashMap<&'static str, HashMap<Uuid, Row>>;

/// Most recent lock acquisitions kept for [`MemoryLedger::lock_history`]
const LOCK_HISTORY_LIMIT: usize = 1024;

#[derive(Default)]
struct Inner {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<tokio::sync::Mutex<()>>>>,
    lock_history: Mutex<VecDeque<RowKey>>,
}

impl Inner {
    fn tables_mut(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<E: Entity>(&self, id: Uuid) -> LedgerResult<Option<E>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let Some(row) = tables.get(E::TABLE).and_then(|t| t.get(&id)) else {
            return Ok(None);
        };
        let model = downcast::<E>(row)?;

        Ok((!model.meta().is_deleted()).then(|| model.clone()))
    }

    fn scan<E: Entity>(&self) -> LedgerResult<Vec<E>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let Some(table) = tables.get(E::TABLE) else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::with_capacity(table.len());
        for row in table.values() {
            let model = downcast::<E>(row)?;
            if !model.meta().is_deleted() {
                rows.push(model.clone());
            }
        }

        Ok(rows)
    }

    /// Store a row, returning the previous version for the journal
    fn put<E: Entity>(&self, model: E) -> Option<Row> {
        let id = model.meta().id;
        self.tables_mut()
            .entry(E::TABLE)
            .or_default()
            .insert(id, Box::new(model))
    }

    fn row_lock(&self, key: RowKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key).or_default().clone()
    }

    /// Forget row locks nobody holds or waits on
    fn evict_row_locks(&self, keys: impl Iterator<Item = RowKey>) {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&key);
            }
        }
    }

    fn record_lock(&self, key: RowKey) {
        let mut history = self.lock_history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() == LOCK_HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(key);
    }
}

fn downcast<E: Entity>(row: &Row) -> LedgerResult<&E> {
    row.downcast_ref::<E>().ok_or_else(|| {
        LedgerError::Corrupted(format!("row in {} has an unexpected type", E::TABLE))
    })
}

enum Undo {
    Remove(RowKey),
    Restore(RowKey, Row),
}

/// Transaction handle for [`MemoryLedger`]
pub struct MemoryTx {
    inner: Arc<Inner>,
    held: HashSet<RowKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    journal: Vec<Undo>,
}

impl MemoryTx {
    async fn lock(&mut self, key: RowKey) {
        if self.held.contains(&key) {
            return;
        }

        let guard = self.inner.row_lock(key).lock_owned().await;
        self.inner.record_lock(key);
        self.held.insert(key);
        self.guards.push(guard);
    }

    fn record(&mut self, key: RowKey, previous: Option<Row>) {
        let entry = match previous {
            Some(row) => Undo::Restore(key, row),
            None => Undo::Remove(key),
        };
        self.journal.push(entry);
    }

    fn undo(&mut self) {
        if self.journal.is_empty() {
            return;
        }

        let mut tables = self.inner.tables_mut();
        for entry in self.journal.drain(..).rev() {
            match entry {
                Undo::Remove((table, id)) => {
                    if let Some(rows) = tables.get_mut(table) {
                        rows.remove(&id);
                    }
                }
                Undo::Restore((table, id), row) => {
                    tables.entry(table).or_default().insert(id, row);
                }
            }
        }
    }
}

impl Drop for MemoryTx {
    // Undo runs before the guards are released, so no other transaction
    // sees a row between its release and its restoration.
    fn drop(&mut self) {
        self.undo();
        self.guards.clear();
        self.inner.evict_row_locks(self.held.drain());
    }
}

/// Ledger kept entirely in process memory
#[derive(Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent row lock acquisitions, oldest first. Only the last
    /// 1024 are kept.
    pub fn lock_history(&self) -> Vec<(&'static str, Uuid)> {
        self.inner
            .lock_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    type Tx = MemoryTx;

    async fn begin(&self) -> LedgerResult<Self::Tx> {
        Ok(MemoryTx {
            inner: self.inner.clone(),
            held: HashSet::new(),
            guards: Vec::new(),
            journal: Vec::new(),
        })
    }

    async fn commit(&self, mut tx: Self::Tx) -> LedgerResult<()> {
        tx.journal.clear();
        Ok(())
    }

    async fn rollback(&self, mut tx: Self::Tx) -> LedgerResult<()> {
        tx.undo();
        Ok(())
    }

    async fn get_by_id<E: Entity>(&self, id: Uuid) -> LedgerResult<Option<E>> {
        self.inner.read(id)
    }

    async fn get_by_id_with_lock<E: Entity>(
        &self,
        id: Uuid,
        tx: &mut Self::Tx,
    ) -> LedgerResult<Option<E>> {
        tx.lock((E::TABLE, id)).await;
        self.inner.read(id)
    }

    async fn get_by_ids<E: Entity>(&self, ids: &[Uuid]) -> LedgerResult<Vec<E>> {
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(model) = self.inner.read::<E>(*id)? {
                rows.push(model);
            }
        }

        Ok(rows)
    }

    async fn paginate<E: Entity>(
        &self,
        filter: E::Filter,
        page: u32,
        limit: u32,
    ) -> LedgerResult<Page<E>> {
        let mut rows: Vec<E> = self
            .inner
            .scan::<E>()?
            .into_iter()
            .filter(|model| model.matches(&filter))
            .collect();
        rows.sort_by_key(|model| Reverse((model.meta().created_at, model.meta().id)));

        let offset = page.saturating_sub(1) as usize * limit as usize;
        let rows = rows
            .into_iter()
            .skip(offset)
            .take(limit as usize + 1)
            .collect();

        Ok(Page::from_overfetch(rows, page, limit))
    }

    async fn create<E: Entity>(&self, model: E) -> LedgerResult<E> {
        let mut tx = self.begin().await?;
        let created = self.create_in_tx(model, &mut tx).await?;
        self.commit(tx).await?;

        Ok(created)
    }

    async fn create_in_tx<E: Entity>(&self, model: E, tx: &mut Self::Tx) -> LedgerResult<E> {
        let key = (E::TABLE, model.meta().id);
        tx.lock(key).await;

        let previous = self.inner.put(model.clone());
        tx.record(key, previous);

        Ok(model)
    }

    async fn create_bulk<E: Entity>(&self, models: Vec<E>) -> LedgerResult<()> {
        let mut tx = self.begin().await?;
        for model in models {
            self.create_in_tx(model, &mut tx).await?;
        }
        self.commit(tx).await
    }

    async fn update_fields<E: Entity>(
        &self,
        id: Uuid,
        patch: E::Patch,
    ) -> LedgerResult<Option<E>> {
        let mut tx = self.begin().await?;
        let updated = self.update_fields_in_tx(id, patch, &mut tx).await?;
        self.commit(tx).await?;

        Ok(updated)
    }

    async fn update_fields_in_tx<E: Entity>(
        &self,
        id: Uuid,
        patch: E::Patch,
        tx: &mut Self::Tx,
    ) -> LedgerResult<Option<E>> {
        let key = (E::TABLE, id);
        tx.lock(key).await;

        let Some(mut model) = self.inner.read::<E>(id)? else {
            return Ok(None);
        };
        if !model.apply_patch(&patch) {
            return Ok(None);
        }
        model.meta_mut().updated_at = Utc::now();

        let previous = self.inner.put(model.clone());
        tx.record(key, previous);

        Ok(Some(model))
    }

    async fn soft_delete<E: Entity>(&self, id: Uuid) -> LedgerResult<bool> {
        let mut tx = self.begin().await?;
        let key = (E::TABLE, id);
        tx.lock(key).await;

        let Some(mut model) = self.inner.read::<E>(id)? else {
            return Ok(false);
        };
        let now = Utc::now();
        model.meta_mut().deleted_at = Some(now);
        model.meta_mut().updated_at = now;

        let previous = self.inner.put(model);
        tx.record(key, previous);
        self.commit(tx).await?;

        Ok(true)
    }

    async fn total_invested_in_tx(
        &self,
        loan_id: Uuid,
        _tx: &mut Self::Tx,
    ) -> LedgerResult<Decimal> {
        let total = self
            .inner
            .scan::<Investment>()?
            .iter()
            .filter(|investment| investment.loan_id == loan_id)
            .map(|investment| investment.amount)
            .sum();

        Ok(total)
    }
}
