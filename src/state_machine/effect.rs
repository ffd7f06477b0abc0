//! Effects produced by state transitions
//!
//! An effect names a workflow the runtime has to run once the new state is in
//! place. Branch and next-step resolution need no I/O, so they are plain
//! functions of the state and are resolved inline by the runtime.

use super::{ConversationState, Event};
use crate::catalog::{Answer, ConditionedSteps};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Debounce, curate and validate an answer (spawned)
    ValidateInput {
        key: String,
        raw_input: String,
        epoch: u64,
    },

    /// Match the answer against the conditioned blocks (inline)
    ResolveBranches { answer: Answer },

    /// Move on to the following step or complete the form (inline)
    ResolveNextStep,

    /// Announce an options load for the step just prompted (inline)
    BeginOptionsFetch,

    /// Load select options for a step (spawned)
    FetchOptions { key: String, epoch: u64 },

    /// Hand the finished conversation to the fulfillment runner (spawned)
    RunFulfillment { epoch: u64 },
}

/// First conditioned block whose condition holds wins. Blocks already spliced
/// into the sequence are not offered again.
pub fn resolve_branches(state: &ConversationState, answer: &Answer) -> Event {
    let spliced = |block: &ConditionedSteps| {
        block
            .steps
            .iter()
            .any(|step| state.position_of(&step.key).is_some())
    };
    match state
        .conditioned_steps
        .iter()
        .find(|block| !spliced(block) && block.matches(answer, state))
    {
        Some(block) => Event::ExtraStepsConditionMet {
            key: answer.key.clone(),
            steps: block.steps.clone(),
        },
        None => Event::ExtraStepsConditionNotMet,
    }
}

pub fn resolve_next_step(state: &ConversationState) -> Event {
    match state.active_index().and_then(|index| state.steps.get(index + 1)) {
        Some(next) => Event::ThereIsANextStep {
            key: next.key.clone(),
        },
        None => Event::LastStepCompleted,
    }
}
