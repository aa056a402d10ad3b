//! # hilal-db: Database Layer for the Hilal Back-Office
//!
//! SQLite persistence and the transactional engines built on it.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        hilal-db Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     Database (pool.rs)                          │   │
//! │  │        SqlitePool · WAL mode · embedded migrations              │   │
//! │  └───────────┬─────────────────────────────────┬───────────────────┘   │
//! │              │                                 │                       │
//! │  ┌───────────▼───────────┐       ┌─────────────▼───────────────────┐   │
//! │  │   Repositories        │       │          Engines                │   │
//! │  │   (repository/)       │       │                                 │   │
//! │  │   reads, one per      │       │  SaleLedger   (ledger.rs)       │   │
//! │  │   aggregate           │       │  PaymentEngine (payments.rs)    │   │
//! │  │                       │◄──────│  one transaction per operation, │   │
//! │  │   pub(crate) tx fns   │       │  driving the repository tx fns  │   │
//! │  └───────────────────────┘       └─────────────────────────────────┘   │
//! │                                                                         │
//! │  OperatorDirectory (operators.rs): Argon2-hashed PINs, implements      │
//! │  the hilal-core IdentityVerifier contract.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency Model
//! Every business operation (sale create/edit/delete, payment
//! register/edit/delete) runs inside a single SQLite transaction. The
//! invariants - instance status vs. sale linkage, `amount_paid` vs. the sum
//! of payment rows, account balances vs. their transaction logs - hold at
//! every commit point, never just eventually.

pub mod error;
pub mod ledger;
pub mod migrations;
pub mod operators;
pub mod payments;
pub mod pool;
pub mod repository;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{DbError, DbResult, LedgerError, LedgerResult};
pub use ledger::SaleLedger;
pub use operators::OperatorDirectory;
pub use payments::PaymentEngine;
pub use pool::{Database, DbConfig};
pub use repository::{
    AccountRepository, AuditRepository, CustomerRepository, InstanceRepository, OrgRepository,
    PaymentRepository, ProductRepository, SaleRepository,
};
