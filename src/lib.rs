//! Bot Form - guided conversational forms
//!
//! A conversation walks through a catalog of steps one question at a time.
//! Answers are validated (synchronously and asynchronously), may splice extra
//! steps into the sequence, can be undone, and are finally handed to a
//! fulfillment action once the user confirms.
//!
//! The core is a pure state machine (`state_machine`); the `runtime` module
//! drives it from a single-writer tokio event loop and talks to external
//! collaborators through the traits in `runtime::traits`.

pub mod catalog;
pub mod config;
pub mod error;
pub mod runtime;
pub mod state_machine;

pub use catalog::{
    Answer, ConditionedSteps, InputType, SelectOption, Step, StepCatalog, ValidationSchema,
};
pub use config::{BotFormConfig, Locale};
pub use error::{BotFormError, CollaboratorError, CollaboratorErrorKind};
pub use runtime::{
    spawn, AsyncValidation, AsyncValidator, BotFormHandle, FnFulfillment, FnOptionsFetcher,
    FnValidator, FormNotification, Fulfillment, FulfillmentRunner, OptionsFetcher,
};
pub use state_machine::{ConversationState, ConversationView, Event, Message, MessageKey, Sender};
