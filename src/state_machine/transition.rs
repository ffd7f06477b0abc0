//! Pure state transition function
//!
//! Dispatches each event to its adapter and attaches the effects the runtime
//! has to launch afterwards. Events the machine cannot accept are refused with
//! a `TransitionError` and leave the state untouched.

use super::{adapter, selectors, ConversationState, Effect, Event};
use crate::catalog::Answer;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConversationState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConversationState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Events the machine refuses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Conversation already fulfilled")]
    ConversationFulfilled,
    #[error("Stale result from epoch {event_epoch} (current epoch is {current})")]
    StaleResult { event_epoch: u64, current: u64 },
    #[error("Conversation has not started")]
    NotStarted,
    #[error("Conversation already started")]
    AlreadyStarted,
    #[error("Input is suppressed while the form is busy or complete")]
    InputSuppressed,
    #[error("Form is not complete")]
    NotComplete,
    #[error("Form already confirmed")]
    AlreadyConfirmed,
    #[error("Unknown step: {0}")]
    UnknownStep(String),
    #[error("Step already present: {0}")]
    DuplicateStepKey(String),
    #[error("Step {0} has no options fetcher")]
    NoOptionsFetcher(String),
}

/// Pure transition function
///
/// Given the same state and event it always produces the same result, with
/// no I/O side effects.
#[allow(clippy::too_many_lines)] // One arm per event
pub fn transition(
    state: &ConversationState,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    if state.is_fulfilled {
        return Err(TransitionError::ConversationFulfilled);
    }

    if let Some(event_epoch) = event.epoch() {
        if event_epoch != state.epoch {
            return Err(TransitionError::StaleResult {
                event_epoch,
                current: state.epoch,
            });
        }
    }

    match event {
        // ============================================================
        // Conversation start and user answers
        // ============================================================
        Event::ConversationInit => {
            if !state.messages.is_empty() {
                return Err(TransitionError::AlreadyStarted);
            }
            Ok(TransitionResult::new(adapter::init_conversation(state)))
        }

        Event::UserInput { input } => {
            if state.messages.is_empty() {
                return Err(TransitionError::NotStarted);
            }
            if selectors::should_suppress_input(state) {
                return Err(TransitionError::InputSuppressed);
            }
            Ok(
                TransitionResult::new(adapter::add_user_message(state, &input)).with_effect(
                    Effect::ValidateInput {
                        key: state.active_key.clone(),
                        raw_input: input,
                        epoch: state.epoch,
                    },
                ),
            )
        }

        // ============================================================
        // Validation results
        // ============================================================
        Event::SuccessfulUserInput { key, input, .. } => {
            let next = adapter::add_valid_input_to_dto(state, &key, &input);
            Ok(TransitionResult::new(next).with_effect(Effect::ResolveBranches {
                answer: Answer::new(key, input),
            }))
        }

        Event::FailedUserInput { key, error, .. } => Ok(TransitionResult::new(
            adapter::add_error_message_on_invalid_input(state, &key, &error),
        )),

        // ============================================================
        // Branching and moving forward
        // ============================================================
        Event::ExtraStepsConditionMet { key, steps } => {
            let next = adapter::add_extra_steps(state, &key, &steps)?;
            Ok(TransitionResult::new(next).with_effect(Effect::ResolveNextStep))
        }

        Event::ExtraStepsConditionNotMet => {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::ResolveNextStep))
        }

        Event::ThereIsANextStep { key } => {
            let next = adapter::prompt_next_step(state, &key)?;
            let fetches = next
                .step(&key)
                .is_some_and(|step| step.options_fetcher.is_some());
            let fetch = fetches.then_some(Effect::BeginOptionsFetch);
            Ok(TransitionResult::new(next).with_effects(fetch))
        }

        Event::LastStepCompleted => Ok(TransitionResult::new(adapter::complete_last_step(state))),

        // ============================================================
        // Options loading
        // ============================================================
        Event::FetchOptionsStart => {
            let has_fetcher = selectors::active_step(state)
                .is_some_and(|step| step.options_fetcher.is_some());
            if !has_fetcher {
                return Err(TransitionError::NoOptionsFetcher(state.active_key.clone()));
            }
            Ok(
                TransitionResult::new(adapter::start_fetching_options(state)).with_effect(
                    Effect::FetchOptions {
                        key: state.active_key.clone(),
                        epoch: state.epoch,
                    },
                ),
            )
        }

        Event::FetchOptionsSuccess { key, options, .. } => Ok(TransitionResult::new(
            adapter::set_select_options(state, &key, options)?,
        )),

        Event::FetchOptionsFailure { error, .. } => Ok(TransitionResult::new(
            adapter::add_error_message_on_fetch_failure(state, &error),
        )),

        // ============================================================
        // Confirmation and fulfillment
        // ============================================================
        Event::Confirmed => {
            if !state.is_complete {
                return Err(TransitionError::NotComplete);
            }
            if state.is_confirmed {
                return Err(TransitionError::AlreadyConfirmed);
            }
            Ok(TransitionResult::new(adapter::confirm(state))
                .with_effect(Effect::RunFulfillment { epoch: state.epoch }))
        }

        Event::FulfillmentSuccess { message, data, .. } => Ok(TransitionResult::new(
            adapter::add_fulfillment_message(state, &message, data),
        )),

        // Undo, cancelled confirmation and failed fulfillment all step back once
        Event::UndoClicked | Event::CancelConfirmation | Event::FulfillmentFailure { .. } => {
            Ok(TransitionResult::new(adapter::undo(state)))
        }
    }
}
