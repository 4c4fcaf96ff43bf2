//! Scripted provider — canned replies for tests and offline replays.
//!
//! Replies are matched in two ways. Rules (`with_rule`) fire whenever the
//! prompt contains their needle, which keeps concurrent batches
//! deterministic. Otherwise the next queued step is consumed; an exhausted
//! queue is a request failure.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::llm::ProviderError;

#[derive(Debug, Clone)]
enum Step {
    Reply(String),
    Fail(String),
}

#[derive(Debug, Default)]
struct Script {
    rules: Vec<(String, Step)>,
    queue: VecDeque<Step>,
    prompts: Vec<String>,
}

/// Shared handle: clones observe the same script and prompt history.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<Script>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue = replies.into_iter().map(|r| Step::Reply(r.into())).collect();
        Self { script: Arc::new(Mutex::new(Script { queue, ..Script::default() })) }
    }

    /// Reply with `reply` to every prompt containing `needle`.
    pub fn with_rule(self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.push_rule(needle.into(), Step::Reply(reply.into()));
        self
    }

    /// Fail every prompt containing `needle`.
    pub fn with_failure_rule(self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.push_rule(needle.into(), Step::Fail(message.into()));
        self
    }

    /// Queue a failure after the replies queued so far.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.queue.push_back(Step::Fail(message.into()));
        }
        self
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.script.lock().map(|s| s.prompts.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.script.lock().map(|s| s.prompts.len()).unwrap_or_default()
    }

    fn push_rule(&self, needle: String, step: Step) {
        if let Ok(mut script) = self.script.lock() {
            script.rules.push((needle, step));
        }
    }

    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let step = {
            let mut script = self
                .script
                .lock()
                .map_err(|_| ProviderError::Request("scripted provider lock poisoned".into()))?;
            script.prompts.push(prompt.to_string());
            let ruled = script
                .rules
                .iter()
                .find(|(needle, _)| prompt.contains(needle.as_str()))
                .map(|(_, step)| step.clone());
            match ruled {
                Some(step) => step,
                None => script
                    .queue
                    .pop_front()
                    .ok_or_else(|| ProviderError::Request("scripted provider exhausted".into()))?,
            }
        };
        match step {
            Step::Reply(text) => Ok(text),
            Step::Fail(message) => Err(ProviderError::Request(message)),
        }
    }
}
