//! Transaction management.
//!
//! A transaction here is one pooled connection with auto-commit disabled,
//! bound to a unit of work for as long as the caller's work runs. Repository
//! code finds it through the shared [`TransactionContext`]; the
//! [`TransactionManager`] is the only component that binds, commits, rolls
//! back, and releases.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TransactionManager                        │
//! │   (acquire -> disable auto-commit -> bind -> work ->        │
//! │    commit/rollback -> restore -> unbind -> release)         │
//! └─────────────────────────────────────────────────────────────┘
//!              │                                │
//!              ▼                                ▼
//!  ┌───────────────────────┐        ┌───────────────────────┐
//!  │  TransactionContext   │◀───────│  ConnectionAccessor   │
//!  │  (key -> connection)  │ lookup │  (repositories)       │
//!  └───────────────────────┘        └───────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use txbind::transaction::{TransactionManager, UnitOfWorkKey};
//!
//! let key = UnitOfWorkKey::new();
//! manager.run_in_transaction(&key, |key| {
//!     let from = members.find_by_id(key, "A")?;
//!     members.update(key, "A", from.money - 1000)?;
//!     Ok::<_, SemanticError>(())
//! })?;
//! ```

mod context;
mod error;
mod manager;

pub use context::{BindRejected, BoundConnection, TransactionContext, UnitOfWorkKey};
pub use error::{ContextError, TransactionOutcome, TxError};
pub use manager::{TransactionManager, TransactionStats};
