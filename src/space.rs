use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::debug;

use crate::common::{ShapeHash, TransactionId};
use crate::concurrency::Transaction;
use crate::error::SpaceError;
use crate::expiry::ExpiryScheduler;
use crate::store::TupleStore;
use crate::tuple::template::{Pattern, Template};
use crate::tuple::value::Value;
use crate::tuple::Tuple;

/// Per-transaction staging. `rollback` holds tuples put inside the
/// transaction, invisible outside until commit. `working` holds tuples taken
/// from the primary store: gone for further takes, still readable by gets,
/// restored on rollback.
struct TxnStores {
    rollback: Arc<TupleStore>,
    working: Arc<TupleStore>,
}

impl TxnStores {
    fn new() -> Self {
        Self {
            rollback: Arc::new(TupleStore::new()),
            working: Arc::new(TupleStore::new()),
        }
    }
}

/// Counts of stored tuples and registered templates per shape hash, plus the
/// number of transactions with live staging stores. A consistent snapshot of
/// the primary store taken bucket by bucket.
#[derive(Debug)]
pub struct SpaceStats {
    pub tuple_buckets: Vec<(ShapeHash, usize)>,
    pub template_buckets: Vec<(ShapeHash, usize)>,
    pub open_transactions: usize,
}

/// The coordination engine: a shared, content-addressable store in which
/// concurrent threads publish immutable tuples and retrieve them by
/// value-pattern matching, with blocking retrieval, TTL expiry and a
/// two-phase transactional overlay.
///
/// The space is the synchronisation point; any number of producers and
/// consumers may call into it concurrently. Timeouts and TTLs are
/// `Option<Duration>`: `None` means forever, `Some(Duration::ZERO)` means
/// no waiting (see the sentinels in the crate root).
pub struct Space {
    name: String,
    primary: Arc<TupleStore>,
    overlays: DashMap<TransactionId, Arc<TxnStores>>,
    shutting_down: AtomicBool,
    expiry: ExpiryScheduler,
    weak_self: Weak<Space>,
}

impl Space {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            name: name.to_owned(),
            primary: Arc::new(TupleStore::new()),
            overlays: DashMap::new(),
            shutting_down: AtomicBool::new(false),
            expiry: ExpiryScheduler::new(),
            weak_self: weak_self.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Publishes a tuple. With a finite `ttl` the tuple is removed again
    /// once the ttl elapses. Under a transaction the tuple stays invisible
    /// to everyone outside it until commit.
    ///
    /// Puts into a closing space are silently ignored.
    pub fn put(
        &self,
        fields: HashMap<String, Value>,
        ttl: Option<Duration>,
        txn: Option<&Transaction>,
    ) -> Result<(), SpaceError> {
        let tuple = Tuple::new(fields)?;
        if self.is_shutting_down() {
            return Ok(());
        }
        let store = match txn {
            Some(txn) => {
                self.enroll(txn)?;
                let stores = self.txn_stores(txn.id());
                stores.rollback.store_tuple(tuple.clone());
                Arc::clone(&stores.rollback)
            }
            None => {
                self.primary.store_tuple(tuple.clone());
                Arc::clone(&self.primary)
            }
        };
        if let Some(ttl) = ttl {
            self.arm_expiry(ttl, tuple.clone());
        }
        self.wake_waiters(&store, &tuple);
        Ok(())
    }

    /// Destructive retrieval: blocks up to `timeout` for a tuple matching
    /// the patterns, removes it and returns its fields. `None` when the
    /// budget runs out or the space closes.
    pub fn take(
        &self,
        patterns: HashMap<String, Pattern>,
        timeout: Option<Duration>,
        txn: Option<&Transaction>,
    ) -> Result<Option<HashMap<String, Value>>, SpaceError> {
        self.retrieve(patterns, timeout, txn, true)
    }

    /// Non-destructive retrieval: like [`Space::take`] but the matched tuple
    /// stays in the space.
    pub fn get(
        &self,
        patterns: HashMap<String, Pattern>,
        timeout: Option<Duration>,
        txn: Option<&Transaction>,
    ) -> Result<Option<HashMap<String, Value>>, SpaceError> {
        self.retrieve(patterns, timeout, txn, false)
    }

    fn retrieve(
        &self,
        patterns: HashMap<String, Pattern>,
        timeout: Option<Duration>,
        txn: Option<&Transaction>,
        destructive: bool,
    ) -> Result<Option<HashMap<String, Value>>, SpaceError> {
        let template = Arc::new(Template::new(patterns, destructive)?);
        if let Some(txn) = txn {
            self.enroll(txn)?;
        }
        if self.is_shutting_down() {
            return Ok(None);
        }
        let deadline = timeout.map(|budget| Instant::now() + budget);

        // The template registers where matching puts will look for it: the
        // primary store, or the transaction's own staging area.
        let home = match txn {
            Some(txn) => Arc::clone(&self.txn_stores(txn.id()).rollback),
            None => Arc::clone(&self.primary),
        };
        home.store_template(Arc::clone(&template));

        loop {
            if self.is_shutting_down() {
                home.remove_template(&template);
                return Ok(None);
            }
            if let Some(txn) = txn {
                if txn.is_finished() {
                    home.remove_template(&template);
                    return Ok(None);
                }
            }
            if let Some(tuple) = self.try_match(&template, txn, destructive) {
                home.remove_template(&template);
                return Ok(Some(tuple.into_fields()));
            }
            // recompute the budget after every wakeup; signals can be
            // spurious or meant for a match that another thread already won
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        home.remove_template(&template);
                        return Ok(None);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            template.waiter().wait(remaining);
        }
    }

    /// One match attempt across the stores visible to this caller.
    fn try_match(
        &self,
        template: &Template,
        txn: Option<&Transaction>,
        destructive: bool,
    ) -> Option<Tuple> {
        if destructive {
            match txn {
                Some(txn) => {
                    let stores = self.txn_stores(txn.id());
                    // a tuple put inside this transaction was never visible
                    // outside it, so it is consumed outright and not staged
                    if let Some(tuple) = stores.rollback.get_match(template, true) {
                        return Some(tuple);
                    }
                    let tuple = self.primary.get_match(template, true)?;
                    stores.working.store_tuple(tuple.clone());
                    Some(tuple)
                }
                None => self.primary.get_match(template, true),
            }
        } else {
            if let Some(txn) = txn {
                let stores = self.txn_stores(txn.id());
                if let Some(tuple) = stores.rollback.get_match(template, false) {
                    return Some(tuple);
                }
            }
            if let Some(tuple) = self.primary.get_match(template, false) {
                return Some(tuple);
            }
            // tuples taken by an in-flight transaction stay readable to
            // everyone but that transaction itself
            let own = txn.map(Transaction::id);
            for entry in self.overlays.iter() {
                if Some(*entry.key()) == own {
                    continue;
                }
                if let Some(tuple) = entry.value().working.get_match(template, false) {
                    return Some(tuple);
                }
            }
            None
        }
    }

    /// Makes the transaction's puts public and finalises its takes. The
    /// staged puts go through the normal publish path, so waiters in the
    /// primary store are woken; waiters still parked inside the discarded
    /// staging stores are signalled and will bail out on their own.
    pub fn commit(&self, txn: &Transaction) {
        let stores = match self.overlays.remove(&txn.id()) {
            Some((_, stores)) => stores,
            None => return,
        };
        if self.is_shutting_down() {
            return;
        }
        debug!("space {}: commit of transaction {}", self.name, txn.id());
        for tuple in stores.rollback.all_tuples() {
            self.publish(tuple);
        }
        // taken tuples left the primary store when they were matched;
        // clearing them here tolerates absence
        for tuple in stores.working.all_tuples() {
            self.primary.remove_tuple(&tuple);
        }
        for template in stores.rollback.all_templates() {
            template.waiter().notify();
        }
        stores.rollback.delete_storage();
        stores.working.delete_storage();
    }

    /// Undoes the transaction: staged puts vanish, taken tuples return to
    /// the primary store through the normal publish path.
    pub fn rollback(&self, txn: &Transaction) {
        let stores = match self.overlays.remove(&txn.id()) {
            Some((_, stores)) => stores,
            None => return,
        };
        if self.is_shutting_down() {
            return;
        }
        debug!("space {}: rollback of transaction {}", self.name, txn.id());
        for tuple in stores.working.all_tuples() {
            self.publish(tuple);
        }
        for template in stores.rollback.all_templates() {
            template.waiter().notify();
        }
        stores.rollback.delete_storage();
        stores.working.delete_storage();
    }

    /// Shuts the space down: every blocked waiter returns with no match,
    /// all storage is dropped, and subsequent operations are silent no-ops.
    /// Idempotent.
    pub fn close(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("space {}: closing", self.name);
        for template in self.primary.all_templates() {
            template.waiter().notify();
        }
        for entry in self.overlays.iter() {
            for template in entry.value().rollback.all_templates() {
                template.waiter().notify();
            }
        }
        self.primary.delete_storage();
        for entry in self.overlays.iter() {
            entry.value().rollback.delete_storage();
            entry.value().working.delete_storage();
        }
        self.overlays.clear();
        self.expiry.shutdown();
    }

    pub fn stats(&self) -> SpaceStats {
        SpaceStats {
            tuple_buckets: self.primary.tuple_bucket_counts(),
            template_buckets: self.primary.template_bucket_counts(),
            open_transactions: self.overlays.len(),
        }
    }

    fn enroll(&self, txn: &Transaction) -> Result<(), SpaceError> {
        if txn.is_finished() {
            return Err(SpaceError::TransactionFinished(txn.id()));
        }
        if let Some(this) = self.weak_self.upgrade() {
            txn.enroll(&this);
        }
        Ok(())
    }

    fn txn_stores(&self, id: TransactionId) -> Arc<TxnStores> {
        Arc::clone(
            &self
                .overlays
                .entry(id)
                .or_insert_with(|| Arc::new(TxnStores::new())),
        )
    }

    /// Insert into the primary store and wake matching waiters.
    fn publish(&self, tuple: Tuple) {
        self.primary.store_tuple(tuple.clone());
        self.wake_waiters(&self.primary, &tuple);
    }

    fn wake_waiters(&self, store: &TupleStore, tuple: &Tuple) {
        let woken = store.waiting_templates(tuple);
        if !woken.is_empty() {
            debug!(
                "space {}: waking {} waiter(s) for shape {:x}",
                self.name,
                woken.len(),
                tuple.shape()
            );
        }
        for template in woken {
            template.waiter().notify();
        }
    }

    fn arm_expiry(&self, ttl: Duration, tuple: Tuple) {
        let space = self.weak_self.clone();
        self.expiry.schedule(
            ttl,
            Box::new(move || {
                if let Some(space) = space.upgrade() {
                    space.expire(&tuple);
                }
            }),
        );
    }

    /// Removes an expired tuple from whatever store still holds it. A tuple
    /// may have been taken, committed elsewhere, or never published;
    /// absence is tolerated everywhere.
    fn expire(&self, tuple: &Tuple) {
        debug!("space {}: expiring tuple of shape {:x}", self.name, tuple.shape());
        self.primary.remove_tuple(tuple);
        for entry in self.overlays.iter() {
            entry.value().rollback.remove_tuple(tuple);
            entry.value().working.remove_tuple(tuple);
        }
    }
}
