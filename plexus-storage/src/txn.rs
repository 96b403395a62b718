//! Transaction state machine.
//!
//! One writer at a time, driven by explicit BEGIN/COMMIT/ROLLBACK on the
//! underlying connection. A failed statement inside an active transaction
//! parks it in `Aborted`, where only rollback is accepted.

use plexus_core::{Error, Result};

use crate::{sql_err, GraphStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxnStatus {
    #[default]
    Idle,
    Active,
    Aborted,
}

impl GraphStore {
    pub fn txn_status(&self) -> TxnStatus {
        self.txn
    }

    pub fn begin(&mut self) -> Result<()> {
        match self.txn {
            TxnStatus::Idle => {
                self.conn.execute_batch("BEGIN").map_err(sql_err)?;
                self.txn = TxnStatus::Active;
                Ok(())
            }
            TxnStatus::Active | TxnStatus::Aborted => Err(Error::TransactionState(
                "nested BEGIN is not supported".to_string(),
            )),
        }
    }

    pub fn commit(&mut self) -> Result<()> {
        match self.txn {
            TxnStatus::Idle => Err(Error::TransactionState(
                "COMMIT without an active transaction".to_string(),
            )),
            TxnStatus::Aborted => Err(Error::TransactionState(
                "transaction aborted; only ROLLBACK is permitted".to_string(),
            )),
            TxnStatus::Active => {
                self.conn.execute_batch("COMMIT").map_err(sql_err)?;
                self.txn = TxnStatus::Idle;
                Ok(())
            }
        }
    }

    pub fn rollback(&mut self) -> Result<()> {
        match self.txn {
            TxnStatus::Idle => Err(Error::TransactionState(
                "ROLLBACK without an active transaction".to_string(),
            )),
            TxnStatus::Active | TxnStatus::Aborted => {
                self.conn.execute_batch("ROLLBACK").map_err(sql_err)?;
                self.txn = TxnStatus::Idle;
                self.reload_caches()
            }
        }
    }

    /// Parks an active transaction in `Aborted` after a failed statement;
    /// only ROLLBACK gets it out.
    pub fn abort(&mut self) {
        if self.txn == TxnStatus::Active {
            self.txn = TxnStatus::Aborted;
        }
    }

    /// Runs a mutation with statement-level atomicity: auto-commit when no
    /// transaction is active, abort-on-error when one is.
    pub(crate) fn with_write<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        match self.txn {
            TxnStatus::Aborted => Err(Error::TransactionState(
                "transaction aborted; only ROLLBACK is permitted".to_string(),
            )),
            TxnStatus::Active => {
                let result = f(self);
                if result.is_err() {
                    self.txn = TxnStatus::Aborted;
                }
                result
            }
            TxnStatus::Idle => {
                self.conn.execute_batch("BEGIN").map_err(sql_err)?;
                match f(self) {
                    Ok(value) => {
                        self.conn.execute_batch("COMMIT").map_err(sql_err)?;
                        Ok(value)
                    }
                    Err(err) => {
                        let _ = self.conn.execute_batch("ROLLBACK");
                        self.reload_caches()?;
                        Err(err)
                    }
                }
            }
        }
    }
}
