//! Read-only projections of the conversation state
//!
//! Derived flags are computed here and never stored.

use super::state::{ConversationState, Dto, Message};
use crate::catalog::{InputType, SelectOption, Step};
use serde::Serialize;
use serde_json::Value;

pub fn active_key(state: &ConversationState) -> &str {
    &state.active_key
}

pub fn active_step(state: &ConversationState) -> Option<&Step> {
    state.step(&state.active_key)
}

pub fn steps(state: &ConversationState) -> &[Step] {
    &state.steps
}

pub fn messages(state: &ConversationState) -> &[Message] {
    &state.messages
}

pub fn dto(state: &ConversationState) -> &Dto {
    &state.dto
}

pub fn is_complete(state: &ConversationState) -> bool {
    state.is_complete
}

pub fn is_fulfilled(state: &ConversationState) -> bool {
    state.is_fulfilled
}

pub fn is_fulfilling(state: &ConversationState) -> bool {
    state.is_fulfilling
}

pub fn is_fetching_options(state: &ConversationState) -> bool {
    state.is_fetching_options
}

/// Some asynchronous phase is in flight
pub fn is_loading(state: &ConversationState) -> bool {
    state.is_validating_input || state.is_fetching_options || state.is_fulfilling
}

/// The input box should not accept an answer right now
pub fn should_suppress_input(state: &ConversationState) -> bool {
    state.is_fetching_options
        || state.is_passing_to_next_step
        || state.is_validating_input
        || state.is_fulfilling
        || state.is_complete
}

/// Steps from the start up to and including the active one
pub fn steps_up_to_current(state: &ConversationState) -> &[Step] {
    let end = state.active_index().map_or(0, |index| index + 1);
    &state.steps[..end]
}

pub fn was_last_step_reached(state: &ConversationState) -> bool {
    state
        .active_index()
        .is_some_and(|index| index + 1 == state.steps.len())
}

/// Serializable snapshot of a step for a presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub key: String,
    pub prompt: String,
    pub input_type: InputType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select_options: Option<Vec<SelectOption>>,
}

impl From<&Step> for StepView {
    fn from(step: &Step) -> Self {
        Self {
            key: step.key.clone(),
            prompt: step.prompt.clone(),
            input_type: step.input_type,
            select_options: step.select_options.clone(),
        }
    }
}

/// Everything a chat widget needs to render the conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[allow(clippy::struct_excessive_bools)] // Mirrors the state flags for rendering
pub struct ConversationView {
    pub name: String,
    pub active_key: String,
    pub active_step: Option<StepView>,
    pub steps_up_to_current: Vec<String>,
    pub messages: Vec<Message>,
    pub dto: Dto,
    pub is_complete: bool,
    pub is_fulfilled: bool,
    pub is_fulfilling: bool,
    pub is_fetching_options: bool,
    pub is_loading: bool,
    pub should_suppress_input: bool,
    pub was_last_step_reached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_payload: Option<Value>,
}

pub fn view(state: &ConversationState) -> ConversationView {
    ConversationView {
        name: state.name.clone(),
        active_key: active_key(state).to_string(),
        active_step: active_step(state).map(StepView::from),
        steps_up_to_current: steps_up_to_current(state)
            .iter()
            .map(|step| step.key.clone())
            .collect(),
        messages: messages(state).to_vec(),
        dto: dto(state).clone(),
        is_complete: is_complete(state),
        is_fulfilled: is_fulfilled(state),
        is_fulfilling: is_fulfilling(state),
        is_fetching_options: is_fetching_options(state),
        is_loading: is_loading(state),
        should_suppress_input: should_suppress_input(state),
        was_last_step_reached: was_last_step_reached(state),
        fulfillment_payload: state.fulfillment_payload.clone(),
    }
}
