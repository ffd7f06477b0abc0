//! Runtime for driving a bot form
//!
//! `spawn` starts a single-writer event loop on the current tokio runtime and
//! returns a `BotFormHandle`, the store a presentation layer talks to:
//! dispatch events, read the latest state, subscribe to notifications.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::BotFormRuntime;
pub use traits::*;

use crate::catalog::StepCatalog;
use crate::config::BotFormConfig;
use crate::error::BotFormError;
use crate::state_machine::{
    selectors, ConversationState, ConversationView, Event, TransitionError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identity of a running form, carried into every log line
#[derive(Debug, Clone)]
pub struct FormContext {
    pub conversation_id: Uuid,
    pub form_name: String,
}

impl FormContext {
    pub fn new(form_name: impl Into<String>) -> Self {
        Self {
            conversation_id: Uuid::new_v4(),
            form_name: form_name.into(),
        }
    }
}

/// Notifications published after every dispatched event
#[derive(Debug, Clone)]
pub enum FormNotification {
    /// The event was applied; `view` is the resulting projection
    StateChanged {
        event: &'static str,
        view: Box<ConversationView>,
    },
    /// The event was refused and the state is unchanged
    Rejected {
        event: &'static str,
        reason: TransitionError,
    },
}

/// Handle to interact with a running bot form
#[derive(Clone)]
pub struct BotFormHandle {
    context: FormContext,
    event_tx: mpsc::Sender<Event>,
    state_rx: watch::Receiver<Arc<ConversationState>>,
    broadcast_tx: broadcast::Sender<FormNotification>,
    cancel: CancellationToken,
}

/// Validate the catalog and start its event loop.
///
/// Must be called from within a tokio runtime.
pub fn spawn<F>(
    catalog: StepCatalog,
    fulfillment: F,
    config: BotFormConfig,
) -> Result<BotFormHandle, BotFormError>
where
    F: FulfillmentRunner + 'static,
{
    let state = Arc::new(ConversationState::from_catalog(catalog)?);
    let context = FormContext::new(state.name.clone());

    let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
    let (state_tx, state_rx) = watch::channel(Arc::clone(&state));
    let (broadcast_tx, _) = broadcast::channel(config.broadcast_buffer.max(1));
    let cancel = CancellationToken::new();

    let runtime = BotFormRuntime::new(
        context.clone(),
        state,
        fulfillment,
        config,
        event_rx,
        event_tx.downgrade(),
        state_tx,
        broadcast_tx.clone(),
        cancel.clone(),
    );
    tokio::spawn(runtime.run());

    Ok(BotFormHandle {
        context,
        event_tx,
        state_rx,
        broadcast_tx,
        cancel,
    })
}

impl BotFormHandle {
    pub fn conversation_id(&self) -> Uuid {
        self.context.conversation_id
    }

    pub fn form_name(&self) -> &str {
        &self.context.form_name
    }

    /// Enqueue an event. Events are applied in the order they are dispatched.
    pub async fn dispatch(&self, event: Event) -> Result<(), BotFormError> {
        if self.cancel.is_cancelled() {
            return Err(BotFormError::RuntimeClosed);
        }
        self.event_tx
            .send(event)
            .await
            .map_err(|_| BotFormError::RuntimeClosed)
    }

    /// Latest state
    pub fn state(&self) -> Arc<ConversationState> {
        Arc::clone(&self.state_rx.borrow())
    }

    pub fn view(&self) -> ConversationView {
        selectors::view(&self.state_rx.borrow())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FormNotification> {
        self.broadcast_tx.subscribe()
    }

    /// Stream of states, starting with the current one
    pub fn updates(&self) -> WatchStream<Arc<ConversationState>> {
        WatchStream::new(self.state_rx.clone())
    }

    /// Wait until the state satisfies `predicate`, or `timeout` elapses.
    ///
    /// Returns `None` on timeout or when the runtime has stopped.
    pub async fn wait_for(
        &self,
        predicate: impl Fn(&ConversationState) -> bool,
        timeout: Duration,
    ) -> Option<Arc<ConversationState>> {
        let mut rx = self.state_rx.clone();
        let waited = tokio::time::timeout(timeout, async move {
            rx.wait_for(|state| predicate(state))
                .await
                .map(|state| Arc::clone(&state))
        })
        .await;
        match waited {
            Ok(Ok(state)) => Some(state),
            _ => None,
        }
    }

    // ========================================================================
    // Chat commands
    // ========================================================================

    pub async fn start(&self) -> Result<(), BotFormError> {
        self.dispatch(Event::ConversationInit).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), BotFormError> {
        self.dispatch(Event::user_input(text)).await
    }

    /// Answer a select step with the option's value
    pub async fn select_option(&self, value: impl Into<String>) -> Result<(), BotFormError> {
        self.dispatch(Event::user_input(value)).await
    }

    pub async fn undo(&self) -> Result<(), BotFormError> {
        self.dispatch(Event::UndoClicked).await
    }

    pub async fn confirm(&self) -> Result<(), BotFormError> {
        self.dispatch(Event::Confirmed).await
    }

    pub async fn cancel_confirmation(&self) -> Result<(), BotFormError> {
        self.dispatch(Event::CancelConfirmation).await
    }

    /// Stop the event loop. In-flight workflows run to completion but their
    /// results are dropped.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.event_tx.is_closed()
    }
}
