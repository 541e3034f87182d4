//! Snapshot-copy transactions.
//!
//! `begin_trans` captures the entire backing store as a byte image;
//! `rollback_trans` writes that image back and reloads the in-memory
//! state, making the store bit-identical to the moment the transaction
//! began. `commit_trans` simply discards the image. One transaction at a
//! time; nesting fails.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use tracing::debug;

impl Database {
    /// Begins a transaction by snapshotting the backing store.
    ///
    /// # Errors
    ///
    /// Returns an error when the handle is closed or read-only, when a
    /// transaction is already active, or on I/O failure.
    pub fn begin_trans(&mut self) -> DbResult<()> {
        self.ensure_writable()?;
        if self.snapshot.is_some() {
            return Err(DbError::invalid_operation(
                "a transaction is already active",
            ));
        }

        // Flush so the snapshot sees every completed operation.
        self.backing.flush()?;
        let size = self.backing.size()?;
        self.snapshot = Some(self.backing.read_at(0, size as usize)?);
        debug!(bytes = size, "transaction began");
        Ok(())
    }

    /// Commits the active transaction, keeping every change made since
    /// [`begin_trans`](Self::begin_trans).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NoCurrentTransaction`] when none is active.
    pub fn commit_trans(&mut self) -> DbResult<()> {
        self.ensure_open()?;
        if self.snapshot.take().is_none() {
            return Err(DbError::NoCurrentTransaction);
        }
        self.maybe_flush()?;
        debug!("transaction committed");
        Ok(())
    }

    /// Rolls the store back to its state at [`begin_trans`](Self::begin_trans)
    /// and reloads the in-memory index, schema, and counters.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NoCurrentTransaction`] when none is active, or
    /// an I/O error from the restore.
    pub fn rollback_trans(&mut self) -> DbResult<()> {
        self.ensure_open()?;
        let snapshot = self
            .snapshot
            .take()
            .ok_or(DbError::NoCurrentTransaction)?;

        self.backing.truncate(0)?;
        self.backing.write_at(0, &snapshot)?;
        self.backing.flush()?;
        self.load_state()?;
        debug!(bytes = snapshot.len(), "transaction rolled back");
        Ok(())
    }

    /// Whether a transaction is active.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }
}
