use crate::store::StoreError;
use async_trait::async_trait;

/// Supplies a short plain-text snapshot of a user's finances for prompt augmentation.
#[async_trait]
pub trait FinanceContextProvider: Send + Sync {
    /// Return the snapshot, or `None` when nothing is known about the user.
    async fn snapshot(&self, user_id: &str) -> Result<Option<String>, StoreError>;
}
