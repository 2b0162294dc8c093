//! Business logic running on top of repositories and transactions.

mod error;
mod transfer;

pub use error::{ServiceError, ServiceResult};
pub use transfer::{MemberService, FAILING_MEMBER_ID};
