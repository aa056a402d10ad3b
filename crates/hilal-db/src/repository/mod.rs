//! # Repository Layer
//!
//! One repository per aggregate, each holding a clone of the shared
//! [`sqlx::SqlitePool`] and serving reads. Multi-row mutations live on the
//! engines ([`crate::ledger::SaleLedger`], [`crate::payments::PaymentEngine`]),
//! which call the `pub(crate)` transactional functions in these modules on a
//! single transaction connection so each business operation commits or rolls
//! back as a unit.

pub mod account;
pub mod audit;
pub mod customer;
pub mod instance;
pub mod org;
pub mod payment;
pub mod product;
pub mod sale;
pub mod sequence;

pub use account::AccountRepository;
pub use audit::AuditRepository;
pub use customer::CustomerRepository;
pub use instance::InstanceRepository;
pub use org::OrgRepository;
pub use payment::PaymentRepository;
pub use product::ProductRepository;
pub use sale::SaleRepository;
