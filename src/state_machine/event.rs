//! Events that can be dispatched into a conversation

use crate::catalog::{SelectOption, Step};
use serde_json::Value;

/// Events that trigger state transitions.
///
/// Results of asynchronous workflows carry the `epoch` they were launched in;
/// the transition refuses them once an undo has moved the conversation on.
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    ConversationInit,
    UserInput {
        input: String,
    },
    Confirmed,
    CancelConfirmation,
    UndoClicked,

    // Validation results
    SuccessfulUserInput {
        key: String,
        input: String,
        epoch: u64,
    },
    FailedUserInput {
        key: String,
        input: String,
        error: String,
        epoch: u64,
    },

    // Branch and next-step resolution
    ExtraStepsConditionMet {
        key: String,
        steps: Vec<Step>,
    },
    ExtraStepsConditionNotMet,
    ThereIsANextStep {
        key: String,
    },
    LastStepCompleted,

    // Options loading
    FetchOptionsStart,
    FetchOptionsSuccess {
        key: String,
        options: Vec<SelectOption>,
        epoch: u64,
    },
    FetchOptionsFailure {
        error: String,
        epoch: u64,
    },

    // Fulfillment
    FulfillmentSuccess {
        message: String,
        data: Value,
        epoch: u64,
    },
    FulfillmentFailure {
        error: String,
        epoch: u64,
    },
}

impl Event {
    pub fn user_input(input: impl Into<String>) -> Self {
        Event::UserInput {
            input: input.into(),
        }
    }

    /// Human-readable event name
    pub fn name(&self) -> &'static str {
        match self {
            Event::ConversationInit => "Conversation Init",
            Event::UserInput { .. } => "User Input",
            Event::Confirmed => "Form Confirmed",
            Event::CancelConfirmation => "Cancel Confirmation",
            Event::UndoClicked => "Undo Clicked",
            Event::SuccessfulUserInput { .. } => "Successful User Input",
            Event::FailedUserInput { .. } => "Failed User Input",
            Event::ExtraStepsConditionMet { .. } => "Extra Steps Condition Met",
            Event::ExtraStepsConditionNotMet => "Extra Steps Condition Not Met",
            Event::ThereIsANextStep { .. } => "There Is A Next Step",
            Event::LastStepCompleted => "Last Step Completed",
            Event::FetchOptionsStart => "Fetch Options Start",
            Event::FetchOptionsSuccess { .. } => "Fetch Options Success",
            Event::FetchOptionsFailure { .. } => "Fetch Options Failure",
            Event::FulfillmentSuccess { .. } => "Fulfillment Success",
            Event::FulfillmentFailure { .. } => "Fulfillment Failure",
        }
    }

    /// Name scoped to a form, e.g. `[signup] User Input`
    pub fn label(&self, form: &str) -> String {
        format!("[{form}] {}", self.name())
    }

    /// Epoch of an async workflow result, `None` for everything else
    pub fn epoch(&self) -> Option<u64> {
        match self {
            Event::SuccessfulUserInput { epoch, .. }
            | Event::FailedUserInput { epoch, .. }
            | Event::FetchOptionsSuccess { epoch, .. }
            | Event::FetchOptionsFailure { epoch, .. }
            | Event::FulfillmentSuccess { epoch, .. }
            | Event::FulfillmentFailure { epoch, .. } => Some(*epoch),
            _ => None,
        }
    }
}
