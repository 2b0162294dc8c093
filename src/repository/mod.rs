//! Data access built on the connection accessor contract.
//!
//! Repositories never bind, unbind, commit, or close a connection. They ask
//! the [`ConnectionAccessor`] for the current one and translate backend
//! failures at their own boundary.

mod accessor;
mod member;

pub use accessor::ConnectionAccessor;
pub use member::{Member, MemberRepository, SCHEMA};
