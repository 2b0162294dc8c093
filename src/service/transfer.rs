//! Account transfer between members.

use log::info;

use crate::connection::ConnectionPool;
use crate::repository::{Member, MemberRepository};
use crate::service::error::{ServiceError, ServiceResult};
use crate::transaction::{TransactionManager, TxError, UnitOfWorkKey};

/// Member id that makes a transfer fail after the debit, for exercising
/// rollback.
pub const FAILING_MEMBER_ID: &str = "ex";

pub struct MemberService<P: ConnectionPool> {
    manager: TransactionManager<P>,
    members: MemberRepository<P>,
}

impl<P: ConnectionPool> MemberService<P> {
    pub fn new(manager: TransactionManager<P>, members: MemberRepository<P>) -> Self {
        Self { manager, members }
    }

    /// Move `amount` from one member to another, atomically.
    ///
    /// Either both balances change or neither does.
    pub fn account_transfer(
        &self,
        from_id: &str,
        to_id: &str,
        amount: i64,
    ) -> Result<(), TxError<ServiceError>> {
        self.manager
            .with_transaction(|key| self.transfer(key, from_id, to_id, amount))?;
        info!("transferred {amount} from {from_id} to {to_id}");
        Ok(())
    }

    fn transfer(
        &self,
        key: &UnitOfWorkKey,
        from_id: &str,
        to_id: &str,
        amount: i64,
    ) -> ServiceResult<()> {
        if amount <= 0 {
            return Err(ServiceError::Validation(format!(
                "transfer amount must be positive, got {amount}"
            )));
        }

        let from = self.members.find_by_id(key, from_id)?;
        let to = self.members.find_by_id(key, to_id)?;

        let debited = from.money.checked_sub(amount).ok_or_else(|| {
            ServiceError::Validation(format!("balance of {from_id} would underflow"))
        })?;
        self.members.update(key, from_id, debited)?;
        validate(&to)?;
        let credited = to.money.checked_add(amount).ok_or_else(|| {
            ServiceError::Validation(format!("balance of {to_id} would overflow"))
        })?;
        self.members.update(key, to_id, credited)?;
        Ok(())
    }
}

fn validate(to: &Member) -> ServiceResult<()> {
    if to.member_id == FAILING_MEMBER_ID {
        return Err(ServiceError::Validation(
            "exception during transfer".to_string(),
        ));
    }
    Ok(())
}
