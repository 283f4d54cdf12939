//! Scripted in-process endpoint for tests

use std::collections::HashMap;
use std::sync::Mutex;

use super::traits::{QueryTransport, RawResponse, TransportFailure};

/// Canned reaction to one input
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(RawResponse),
    Fail(TransportFailure),
}

/// Transport answering from a fixed script; unscripted inputs get `200 {}`
#[derive(Default)]
pub struct ScriptedTransport {
    script: HashMap<String, Scripted>,
    fallback: Option<Scripted>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, input: &str, reaction: Scripted) -> Self {
        self.script.insert(input.to_string(), reaction);
        self
    }

    /// Reaction for every input not scripted explicitly
    pub fn otherwise(mut self, reaction: Scripted) -> Self {
        self.fallback = Some(reaction);
        self
    }

    /// Inputs received, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl QueryTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, _tenant_id: &str, message: &str) -> Result<RawResponse, TransportFailure> {
        self.calls.lock().unwrap().push(message.to_string());

        let reaction = self
            .script
            .get(message)
            .or(self.fallback.as_ref())
            .cloned()
            .unwrap_or_else(|| Scripted::Respond(RawResponse::new(200).with_body("{}")));

        match reaction {
            Scripted::Respond(raw) => Ok(raw),
            Scripted::Fail(failure) => Err(failure),
        }
    }
}
