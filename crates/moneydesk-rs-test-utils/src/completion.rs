use async_trait::async_trait;
use moneydesk_rs_protocol::{
    CompletionError, CompletionRequest, CompletionResponse, CompletionService, TokenUsage,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FixedCompletion {
    content: String,
    model: String,
    usage: TokenUsage,
}

impl FixedCompletion {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: "test-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 120,
                completion_tokens: 80,
            },
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_usage(mut self, prompt_tokens: i64, completion_tokens: i64) -> Self {
        self.usage = TokenUsage {
            prompt_tokens,
            completion_tokens,
        };
        self
    }

    fn response(&self) -> CompletionResponse {
        CompletionResponse {
            content: self.content.clone(),
            model: self.model.clone(),
            usage: self.usage,
        }
    }
}

#[async_trait]
impl CompletionService for FixedCompletion {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        Ok(self.response())
    }
}

#[derive(Debug, Clone)]
pub struct FailingCompletion {
    message: String,
}

impl FailingCompletion {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl CompletionService for FailingCompletion {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        Err(CompletionError::Provider(self.message.clone()))
    }
}

/// Fixed completion that keeps every request it receives.
#[derive(Debug, Clone)]
pub struct RecordingCompletion {
    inner: FixedCompletion,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl RecordingCompletion {
    pub fn new(inner: FixedCompletion) -> Self {
        Self {
            inner,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl CompletionService for RecordingCompletion {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        self.requests.lock().push(request);
        Ok(self.inner.response())
    }
}
