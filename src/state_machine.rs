//! Core conversation state machine
//!
//! Elm Architecture: every event goes through the pure `transition` function,
//! which returns the next state plus the effects the runtime must launch.

pub mod adapter;
mod effect;
pub mod event;
pub mod selectors;
pub mod state;
pub(crate) mod transition;


pub use effect::{resolve_branches, resolve_next_step, Effect};
pub use event::Event;
pub use selectors::ConversationView;
pub use state::{ConversationState, Dto, Message, MessageKey, Sender};
pub use transition::{transition, TransitionError, TransitionResult};
