use thiserror::Error;

use crate::store::StoreError;

/// Failure taxonomy for the session and account operations.
///
/// Every store-level failure is converted into one of these kinds at the
/// operation boundary; nothing propagates as a panic. The `Display`
/// strings for the validation kinds are the exact messages returned to
/// clients.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing email")]
    MissingEmail,
    #[error("Missing password")]
    MissingPassword,
    #[error("Already exist")]
    AlreadyExists,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("store operation failed")]
    Store(#[from] StoreError),
}
