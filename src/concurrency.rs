use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::common::TransactionId;
use crate::error::SpaceError;
use crate::space::Space;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// A two-phase transaction handle shared by every operation that runs under
/// it. The handle remembers which spaces it has touched and broadcasts
/// `commit`/`rollback` to each; the spaces themselves key their staging
/// stores by transaction id only (lookup, not ownership), so dropping the
/// handle releases everything.
///
/// A transaction must not be used after commit or rollback; a second finish
/// attempt fails with [`SpaceError::TransactionFinished`]. A handle dropped
/// without an explicit finish rolls back.
pub struct Transaction {
    id: TransactionId,
    enrolled: Mutex<Vec<Weak<Space>>>,
    finished: AtomicBool,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
            enrolled: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Records a space as touched by this transaction. Idempotent.
    pub(crate) fn enroll(&self, space: &Arc<Space>) {
        let mut enrolled = self.enrolled.lock().unwrap();
        let weak = Arc::downgrade(space);
        if !enrolled.iter().any(|known| Weak::ptr_eq(known, &weak)) {
            enrolled.push(weak);
        }
    }

    /// Publishes the transaction's puts and finalises its takes in every
    /// enrolled space.
    pub fn commit(&self) -> Result<(), SpaceError> {
        self.finish(true)
    }

    /// Discards the transaction's puts and restores its takes in every
    /// enrolled space.
    pub fn rollback(&self) -> Result<(), SpaceError> {
        self.finish(false)
    }

    fn finish(&self, commit: bool) -> Result<(), SpaceError> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Err(SpaceError::TransactionFinished(self.id));
        }
        let enrolled = std::mem::take(&mut *self.enrolled.lock().unwrap());
        for space in enrolled.iter().filter_map(Weak::upgrade) {
            if commit {
                space.commit(self);
            } else {
                space.rollback(self);
            }
        }
        Ok(())
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.is_finished() {
            _ = self.finish(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Transaction;
    use crate::error::SpaceError;

    #[test]
    fn ids_are_unique() {
        let a = Transaction::new();
        let b = Transaction::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn double_finish_is_rejected() {
        let txn = Transaction::new();
        txn.commit().unwrap();
        assert_eq!(
            txn.rollback().unwrap_err(),
            SpaceError::TransactionFinished(txn.id())
        );
        assert_eq!(
            txn.commit().unwrap_err(),
            SpaceError::TransactionFinished(txn.id())
        );
    }
}
