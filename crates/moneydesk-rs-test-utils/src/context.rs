use async_trait::async_trait;
use moneydesk_rs_protocol::{FinanceContextProvider, StoreError};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct StubFinanceContext {
    snapshot: Option<String>,
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl StubFinanceContext {
    pub fn new(snapshot: impl Into<String>) -> Self {
        Self {
            snapshot: Some(snapshot.into()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// User ids the provider was asked about, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl FinanceContextProvider for StubFinanceContext {
    async fn snapshot(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        self.calls.lock().push(user_id.to_string());
        if self.fail {
            return Err(StoreError::Backend("finance context unavailable".to_string()));
        }
        Ok(self.snapshot.clone())
    }
}
