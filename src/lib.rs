//! txbind - transaction-scoped connection binding
//!
//! A unit of work is identified by an explicit [`UnitOfWorkKey`]. The
//! [`TransactionManager`] acquires one pooled connection, binds it to the key,
//! runs the work, and commits or rolls back exactly once. Repositories ask the
//! [`ConnectionAccessor`] for the connection bound to their key, so every
//! statement inside the unit of work shares the same transaction. Backend
//! failures are turned into vendor-neutral [`SemanticError`]s.
//!
//! # Example
//!
//! ```no_run
//! use txbind::db::Database;
//! use txbind::repository::Member;
//! use txbind::transaction::UnitOfWorkKey;
//!
//! let db = Database::open("./bank.db").unwrap();
//! let key = UnitOfWorkKey::new();
//! db.members().save(&key, &Member::new("memberA", 10000)).unwrap();
//! db.members().save(&key, &Member::new("memberB", 10000)).unwrap();
//!
//! db.member_service().account_transfer("memberA", "memberB", 2000).unwrap();
//! ```
//!
//! [`UnitOfWorkKey`]: transaction::UnitOfWorkKey
//! [`TransactionManager`]: transaction::TransactionManager
//! [`ConnectionAccessor`]: repository::ConnectionAccessor
//! [`SemanticError`]: translate::SemanticError

pub mod connection;
pub mod db;
pub mod repository;
pub mod service;
pub mod transaction;
pub mod translate;

#[cfg(test)]
pub(crate) mod testing;
