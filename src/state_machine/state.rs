//! Conversation state types

use crate::catalog::{ConditionedSteps, Step, StepCatalog};
use crate::error::BotFormError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Validated answers, keyed by step
pub type Dto = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Bot,
    User,
}

/// What a message belongs to. Undo truncates the log by step key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    Welcome,
    FulfillmentSuccess,
    Step(String),
}

impl MessageKey {
    pub fn step(key: impl Into<String>) -> Self {
        MessageKey::Step(key.into())
    }

    pub fn is_step(&self, key: &str) -> bool {
        matches!(self, MessageKey::Step(k) if k == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub key: MessageKey,
    pub text: String,
}

impl Message {
    pub fn bot(key: MessageKey, text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            key,
            text: text.into(),
        }
    }

    pub fn user(key: MessageKey, text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            key,
            text: text.into(),
        }
    }

    pub fn is_welcome(&self) -> bool {
        self.key == MessageKey::Welcome
    }
}

/// The whole conversation. Replaced, never mutated, by each transition.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)] // One flag per observable conversation phase
pub struct ConversationState {
    pub name: String,
    pub active_key: String,
    pub steps: Vec<Step>,
    pub conditioned_steps: Arc<[ConditionedSteps]>,
    pub messages: Vec<Message>,
    pub welcome_message: Option<String>,
    pub dto: Dto,
    pub fulfillment_payload: Option<Value>,
    /// Incremented by every undo; async results tagged with an older epoch are refused
    pub epoch: u64,
    pub is_complete: bool,
    pub is_fulfilled: bool,
    pub is_fetching_options: bool,
    pub is_fulfilling: bool,
    pub is_validating_input: bool,
    pub is_passing_to_next_step: bool,
    pub is_confirmed: bool,
}

impl ConversationState {
    /// Initial state for a catalog. Fails on an unusable catalog.
    pub fn from_catalog(catalog: StepCatalog) -> Result<Self, BotFormError> {
        catalog.validate()?;
        let StepCatalog {
            name,
            steps,
            conditioned_steps,
            welcome_message,
        } = catalog;

        let active_key = steps
            .first()
            .map(|step| step.key.clone())
            .ok_or_else(|| BotFormError::EmptyCatalog { name: name.clone() })?;

        Ok(Self {
            name,
            active_key,
            steps,
            conditioned_steps: conditioned_steps.into(),
            messages: Vec::new(),
            welcome_message,
            dto: Dto::new(),
            fulfillment_payload: None,
            epoch: 0,
            is_complete: false,
            is_fulfilled: false,
            is_fetching_options: false,
            is_fulfilling: false,
            is_validating_input: false,
            is_passing_to_next_step: false,
            is_confirmed: false,
        })
    }

    pub fn position_of(&self, key: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.key == key)
    }

    pub fn step(&self, key: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.key == key)
    }

    pub fn active_index(&self) -> Option<usize> {
        self.position_of(&self.active_key)
    }

    pub fn step_keys(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.key.as_str()).collect()
    }

    fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub(crate) fn push_bot(&mut self, key: MessageKey, text: impl Into<String>) {
        self.push_message(Message::bot(key, text));
    }

    pub(crate) fn push_user(&mut self, key: MessageKey, text: impl Into<String>) {
        self.push_message(Message::user(key, text));
    }
}
