//! Pure state adapters, one per event kind
//!
//! Each function takes the current state by reference and returns the next
//! one. No I/O, no clocks, no randomness: replaying the same events over the
//! same initial state always yields the same conversation.

use super::state::{ConversationState, Message, MessageKey};
use super::transition::TransitionError;
use crate::catalog::{InputType, SelectOption, Step};
use serde_json::Value;
use std::collections::HashSet;

/// Seed the log with the welcome message (if any) and the first prompt.
pub fn init_conversation(state: &ConversationState) -> ConversationState {
    let mut next = state.clone();
    next.messages.clear();
    if let Some(welcome) = &state.welcome_message {
        next.push_bot(MessageKey::Welcome, welcome.clone());
    }
    if let Some(first) = state.steps.first() {
        next.push_bot(MessageKey::step(&first.key), first.prompt.clone());
    }
    next
}

/// Echo the user's answer. Select answers show the option label, not the value.
pub fn add_user_message(state: &ConversationState, input: &str) -> ConversationState {
    let text = match state.step(&state.active_key) {
        Some(step) if step.input_type == InputType::Select => {
            step.option_label(input).unwrap_or(input).to_string()
        }
        _ => input.to_string(),
    };

    let mut next = state.clone();
    next.push_user(MessageKey::step(&state.active_key), text);
    next.is_validating_input = true;
    next.is_passing_to_next_step = true;
    next
}

pub fn add_valid_input_to_dto(
    state: &ConversationState,
    key: &str,
    input: &str,
) -> ConversationState {
    let mut next = state.clone();
    next.dto.insert(key.to_string(), input.to_string());
    next.is_validating_input = false;
    next
}

pub fn add_error_message_on_invalid_input(
    state: &ConversationState,
    key: &str,
    error: &str,
) -> ConversationState {
    let mut next = state.clone();
    next.push_bot(MessageKey::step(key), error);
    next.is_validating_input = false;
    next.is_passing_to_next_step = false;
    next
}

/// Splice `steps` in right after `key`, keeping their relative order.
pub fn add_extra_steps(
    state: &ConversationState,
    key: &str,
    steps: &[Step],
) -> Result<ConversationState, TransitionError> {
    let index = state
        .position_of(key)
        .ok_or_else(|| TransitionError::UnknownStep(key.to_string()))?;

    let existing: HashSet<&str> = state.steps.iter().map(|step| step.key.as_str()).collect();
    if let Some(clash) = steps.iter().find(|step| existing.contains(step.key.as_str())) {
        return Err(TransitionError::DuplicateStepKey(clash.key.clone()));
    }

    let mut next = state.clone();
    let at = index + 1;
    next.steps.splice(at..at, steps.iter().cloned());
    next.is_complete = false;
    Ok(next)
}

pub fn prompt_next_step(
    state: &ConversationState,
    key: &str,
) -> Result<ConversationState, TransitionError> {
    let prompt = state
        .step(key)
        .map(|step| step.prompt.clone())
        .ok_or_else(|| TransitionError::UnknownStep(key.to_string()))?;

    let mut next = state.clone();
    next.push_bot(MessageKey::step(key), prompt);
    next.active_key = key.to_string();
    next.is_passing_to_next_step = false;
    Ok(next)
}

pub fn start_fetching_options(state: &ConversationState) -> ConversationState {
    let mut next = state.clone();
    next.is_fetching_options = true;
    next
}

pub fn set_select_options(
    state: &ConversationState,
    key: &str,
    options: Vec<SelectOption>,
) -> Result<ConversationState, TransitionError> {
    let index = state
        .position_of(key)
        .ok_or_else(|| TransitionError::UnknownStep(key.to_string()))?;

    let mut next = state.clone();
    next.steps[index].select_options = Some(options);
    next.is_fetching_options = false;
    Ok(next)
}

pub fn add_error_message_on_fetch_failure(
    state: &ConversationState,
    error: &str,
) -> ConversationState {
    let mut next = state.clone();
    next.push_bot(MessageKey::step(&state.active_key), error);
    next.is_fetching_options = false;
    next
}

pub fn complete_last_step(state: &ConversationState) -> ConversationState {
    let mut next = state.clone();
    next.is_complete = true;
    next.is_passing_to_next_step = false;
    next
}

pub fn confirm(state: &ConversationState) -> ConversationState {
    let mut next = state.clone();
    next.is_confirmed = true;
    next.is_fulfilling = true;
    next
}

pub fn add_fulfillment_message(
    state: &ConversationState,
    message: &str,
    data: Value,
) -> ConversationState {
    let mut next = state.clone();
    next.push_bot(MessageKey::FulfillmentSuccess, message);
    next.fulfillment_payload = Some(data);
    next.is_fulfilling = false;
    next.is_fulfilled = true;
    next
}

/// Step back one question.
///
/// From the completion screen the target is the last step itself; otherwise
/// it is the step before the active one (or the first step, which cannot go
/// further back). The log is cut right after the target's first message, the
/// target's answer is dropped, and a conditioned block whose first step we
/// are leaving is removed again.
pub fn undo(state: &ConversationState) -> ConversationState {
    let active_index = state.active_index().unwrap_or(0);
    let target = if active_index > 0 && !state.is_complete {
        state.steps[active_index - 1].key.clone()
    } else {
        state.active_key.clone()
    };

    let mut next = state.clone();

    let protected = usize::from(
        state.welcome_message.is_some() && state.messages.first().is_some_and(Message::is_welcome),
    );
    let end = state
        .messages
        .iter()
        .position(|message| message.key.is_step(&target))
        .map_or(protected, |index| index + 1);
    next.messages.truncate(end.max(protected));

    next.dto.remove(&target);

    if target != state.active_key {
        if let Some(len) = spliced_block_len(state, active_index) {
            next.steps.drain(active_index..active_index + len);
        }
    }

    next.active_key = target;
    next.epoch = state.epoch.wrapping_add(1);
    next.is_complete = false;
    next.is_fulfilling = false;
    next.is_confirmed = false;
    next.is_validating_input = false;
    next.is_fetching_options = false;
    next.is_passing_to_next_step = false;
    next
}

/// Length of the conditioned block spliced in starting at `index`, if any.
fn spliced_block_len(state: &ConversationState, index: usize) -> Option<usize> {
    let spliced = state.steps.get(index..)?;
    state
        .conditioned_steps
        .iter()
        .find(|block| {
            block.first_key() == Some(state.active_key.as_str())
                && block.steps.len() <= spliced.len()
                && block
                    .steps
                    .iter()
                    .zip(spliced)
                    .all(|(ours, theirs)| ours.key == theirs.key)
        })
        .map(|block| block.steps.len())
}
