//! Shared test helpers for loop tests.

use serde_json::{Map, Value, json};
use std::sync::{Arc, Mutex};
use stylesmith_core::error::{ProviderError, ToolError};
use stylesmith_core::message::Message;
use stylesmith_core::provider::{Provider, ProviderRequest, ProviderResponse};
use stylesmith_core::tool::{ParameterSchema, Tool};

use crate::state::AbortHandle;

/// A mock provider that returns a sequence of scripted replies.
///
/// Panics if more calls are made than replies provided, unless it repeats.
pub struct ScriptedProvider {
    replies: Mutex<Vec<Result<String, ProviderError>>>,
    repeat: Option<String>,
    requests: Mutex<Vec<Vec<Message>>>,
    abort_on_call: Option<AbortHandle>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            repeat: None,
            requests: Mutex::new(Vec::new()),
            abort_on_call: None,
        }
    }

    /// Trip `handle` while each request is in flight.
    pub fn aborting(mut self, handle: AbortHandle) -> Self {
        self.abort_on_call = Some(handle);
        self
    }

    /// A provider that returns one text reply.
    pub fn text(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    /// A provider that returns the same reply forever.
    pub fn repeating(text: &str) -> Self {
        Self {
            repeat: Some(text.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The message lists seen by each call.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.messages);
            requests.len()
        };
        if let Some(handle) = &self.abort_on_call {
            handle.abort();
        }

        if let Some(text) = &self.repeat {
            return Ok(ProviderResponse::text(text.clone(), "mock-model"));
        }

        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            panic!("ScriptedProvider: no more replies (call #{call})");
        }
        replies
            .remove(0)
            .map(|text| ProviderResponse::text(text, "mock-model"))
    }
}

#[derive(Default)]
struct MockToolInner {
    calls: usize,
    last_parameters: Option<Value>,
}

/// A configurable tool that counts its executions.
#[derive(Clone)]
pub struct MockTool {
    name: String,
    is_write: bool,
    fail_with: Option<String>,
    abort_on_call: Option<AbortHandle>,
    inner: Arc<Mutex<MockToolInner>>,
}

impl MockTool {
    fn new(name: &str, is_write: bool) -> Self {
        Self {
            name: name.to_string(),
            is_write,
            fail_with: None,
            abort_on_call: None,
            inner: Arc::new(Mutex::new(MockToolInner::default())),
        }
    }

    pub fn read(name: &str) -> Self {
        Self::new(name, false)
    }

    pub fn write(name: &str) -> Self {
        Self::new(name, true)
    }

    /// Every invocation fails with the given reason.
    pub fn failing(mut self, reason: &str) -> Self {
        self.fail_with = Some(reason.to_string());
        self
    }

    /// Trip the abort flag while executing, like a user pressing stop.
    pub fn aborting(mut self, handle: AbortHandle) -> Self {
        self.abort_on_call = Some(handle);
        self
    }

    pub fn calls(&self) -> usize {
        self.inner.lock().unwrap().calls
    }

    pub fn last_parameters(&self) -> Option<Value> {
        self.inner.lock().unwrap().last_parameters.clone()
    }
}

#[async_trait::async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Mock tool"
    }

    fn parameter_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
    }

    fn is_write(&self) -> bool {
        self.is_write
    }

    async fn invoke(&self, parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.calls += 1;
            inner.last_parameters = Some(Value::Object(parameters.clone()));
        }
        if let Some(handle) = &self.abort_on_call {
            handle.abort();
        }
        match &self.fail_with {
            Some(reason) => Err(ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: reason.clone(),
            }),
            None => Ok(json!({"tool": self.name})),
        }
    }
}
