use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use weft_core::error::{Result, WeftError};
use weft_core::execution::TokenUsage;
use weft_core::traits::LlmClient;
use weft_core::types::{Completion, CompletionRequest};

enum Scripted {
    Reply(Completion),
    Fail(String),
}

/// Scripted LLM client. Replies are consumed in order; once the script runs
/// out every call returns the fallback reply.
#[derive(Clone)]
pub struct MockLlmClient {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    fallback: Completion,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Completion {
                text: "mock response".to_string(),
                usage: TokenUsage::new(10, 5, 15),
            },
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue one successful reply.
    pub fn with_reply(self, text: &str, usage: TokenUsage) -> Self {
        self.script.lock().unwrap().push_back(Scripted::Reply(Completion {
            text: text.to_string(),
            usage,
        }));
        self
    }

    /// Queue one `LlmRequest` failure.
    pub fn with_failure(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(message.to_string()));
        self
    }

    /// Reply used once the script is exhausted.
    pub fn with_fallback(mut self, text: &str, usage: TokenUsage) -> Self {
        self.fallback = Completion {
            text: text.to_string(),
            usage,
        };
        self
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient for MockLlmClient {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<Completion>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Reply(c)) => Ok(c),
                Some(Scripted::Fail(msg)) => Err(WeftError::LlmRequest(msg)),
                None => Ok(self.fallback.clone()),
            }
        })
    }
}
