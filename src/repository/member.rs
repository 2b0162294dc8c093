//! Member records and their repository.

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::connection::{Connection, ConnectionPool, Row};
use crate::repository::accessor::ConnectionAccessor;
use crate::transaction::UnitOfWorkKey;
use crate::translate::{ErrorKind, SemanticError};

pub const SCHEMA: &str = "create table if not exists member (\
    member_id text primary key, \
    money integer not null default 0)";

const INSERT: &str = "insert into member(member_id, money) values (?1, ?2)";
const SELECT_BY_ID: &str = "select member_id, money from member where member_id = ?1";
const UPDATE_MONEY: &str = "update member set money = ?1 where member_id = ?2";
const DELETE_BY_ID: &str = "delete from member where member_id = ?1";
const DELETE_ALL: &str = "delete from member";

/// An account holder and their balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: String,
    pub money: i64,
}

impl Member {
    pub fn new(member_id: impl Into<String>, money: i64) -> Self {
        Self {
            member_id: member_id.into(),
            money,
        }
    }

    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            member_id: row.get("member_id")?.as_str()?.to_string(),
            money: row.get("money")?.as_i64()?,
        })
    }
}

/// CRUD over the `member` table.
///
/// Every operation takes the unit of work it belongs to. Inside a
/// transaction the statements share its connection; outside one each
/// statement commits on its own.
pub struct MemberRepository<P: ConnectionPool> {
    accessor: ConnectionAccessor<P>,
}

impl<P: ConnectionPool> Clone for MemberRepository<P> {
    fn clone(&self) -> Self {
        Self {
            accessor: self.accessor.clone(),
        }
    }
}

impl<P: ConnectionPool> MemberRepository<P> {
    pub fn new(accessor: ConnectionAccessor<P>) -> Self {
        Self { accessor }
    }

    /// Create the `member` table if it does not exist.
    pub fn create_schema(&self, key: &UnitOfWorkKey) -> Result<(), SemanticError> {
        self.accessor
            .with_connection(key, "create_schema", SCHEMA, |conn| conn.execute(SCHEMA, &[]))?;
        Ok(())
    }

    pub fn save(&self, key: &UnitOfWorkKey, member: &Member) -> Result<Member, SemanticError> {
        self.accessor.with_connection(key, "save", INSERT, |conn| {
            conn.execute(INSERT, &[json!(member.member_id), json!(member.money)])
        })?;
        Ok(member.clone())
    }

    pub fn find_by_id(
        &self,
        key: &UnitOfWorkKey,
        member_id: &str,
    ) -> Result<Member, SemanticError> {
        let rows = self
            .accessor
            .with_connection(key, "find_by_id", SELECT_BY_ID, |conn| {
                conn.query(SELECT_BY_ID, &[json!(member_id)])
            })?;

        let Some(row) = rows.first() else {
            return Err(SemanticError::not_found(
                "find_by_id",
                SELECT_BY_ID,
                format!("member not found: member_id={member_id}"),
            ));
        };

        Member::from_row(row).ok_or_else(|| {
            SemanticError::new(ErrorKind::Unknown, "find_by_id", SELECT_BY_ID)
                .with_message(format!("unexpected row shape: {row:?}"))
        })
    }

    /// Set a member's balance. Fails with `NotFound` if no row matched.
    pub fn update(
        &self,
        key: &UnitOfWorkKey,
        member_id: &str,
        money: i64,
    ) -> Result<(), SemanticError> {
        let affected = self
            .accessor
            .with_connection(key, "update", UPDATE_MONEY, |conn| {
                conn.execute(UPDATE_MONEY, &[json!(money), json!(member_id)])
            })?;
        info!("update: member_id={member_id}, rows={affected}");

        if affected == 0 {
            return Err(SemanticError::not_found(
                "update",
                UPDATE_MONEY,
                format!("member not found: member_id={member_id}"),
            ));
        }
        Ok(())
    }

    /// Delete a member. Deleting a missing member is not an error.
    pub fn delete(&self, key: &UnitOfWorkKey, member_id: &str) -> Result<(), SemanticError> {
        self.accessor.with_connection(key, "delete", DELETE_BY_ID, |conn| {
            conn.execute(DELETE_BY_ID, &[json!(member_id)])
        })?;
        Ok(())
    }

    /// Delete every member, returning how many were removed.
    pub fn delete_all(&self, key: &UnitOfWorkKey) -> Result<usize, SemanticError> {
        self.accessor
            .with_connection(key, "delete_all", DELETE_ALL, |conn| conn.execute(DELETE_ALL, &[]))
    }
}
