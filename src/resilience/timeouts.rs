//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap counter-store calls with a deadline
//! - Turn an elapsed deadline into a store error the failure policy handles
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other store errors

use std::future::Future;
use std::time::Duration;

use crate::security::StoreError;

/// Run a store operation, failing with [`StoreError::Timeout`] after `deadline`.
pub async fn bounded<T, F>(deadline: Duration, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}
