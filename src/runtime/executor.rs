//! Bot form runtime executor
//!
//! One task owns the state and applies events one at a time. Validation,
//! options loading and fulfillment run as spawned workflows that report back
//! by sending a result event over the same channel.

use super::traits::{AsyncValidator, FulfillmentRunner, OptionsFetcher};
use super::{FormContext, FormNotification};
use crate::catalog::Step;
use crate::config::{BotFormConfig, Locale};
use crate::error::CollaboratorError;
use crate::state_machine::{
    resolve_branches, resolve_next_step, selectors, transition, ConversationState, Effect, Event,
    TransitionResult,
};
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Event loop for a single conversation, generic over the fulfillment runner
pub struct BotFormRuntime<F>
where
    F: FulfillmentRunner + 'static,
{
    context: FormContext,
    state: Arc<ConversationState>,
    fulfillment: Arc<F>,
    config: BotFormConfig,
    event_rx: mpsc::Receiver<Event>,
    /// Weak so that dropping every handle ends the loop
    event_tx: mpsc::WeakSender<Event>,
    state_tx: watch::Sender<Arc<ConversationState>>,
    broadcast_tx: broadcast::Sender<FormNotification>,
    cancel: CancellationToken,
}

impl<F> BotFormRuntime<F>
where
    F: FulfillmentRunner + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: FormContext,
        state: Arc<ConversationState>,
        fulfillment: F,
        config: BotFormConfig,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::WeakSender<Event>,
        state_tx: watch::Sender<Arc<ConversationState>>,
        broadcast_tx: broadcast::Sender<FormNotification>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            context,
            state,
            fulfillment: Arc::new(fulfillment),
            config,
            event_rx,
            event_tx,
            state_tx,
            broadcast_tx,
            cancel,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            conversation_id = %self.context.conversation_id,
            form = %self.context.form_name,
            steps = selectors::steps(&self.state).len(),
            "Starting bot form runtime"
        );

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                event = self.event_rx.recv() => match event {
                    Some(event) => self.process_event(event),
                    None => break,
                },
            }
        }

        tracing::info!(
            conversation_id = %self.context.conversation_id,
            form = %self.context.form_name,
            "Bot form runtime stopped"
        );
    }

    /// Apply an event and every event its inline effects produce, in order.
    fn process_event(&mut self, event: Event) {
        let mut chain = VecDeque::from([event]);

        while let Some(current) = chain.pop_front() {
            let name = current.name();
            let label = current.label(&self.context.form_name);

            let TransitionResult { new_state, effects } = match transition(&self.state, current) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(
                        conversation_id = %self.context.conversation_id,
                        event = %label,
                        active_key = %self.state.active_key,
                        error = %e,
                        "Event rejected"
                    );
                    let _ = self.broadcast_tx.send(FormNotification::Rejected {
                        event: name,
                        reason: e,
                    });
                    continue;
                }
            };

            self.state = Arc::new(new_state);
            self.state_tx.send_replace(Arc::clone(&self.state));
            tracing::debug!(
                conversation_id = %self.context.conversation_id,
                form = %self.context.form_name,
                event = %label,
                active_key = %self.state.active_key,
                epoch = self.state.epoch,
                "Event applied"
            );
            let _ = self.broadcast_tx.send(FormNotification::StateChanged {
                event: name,
                view: Box::new(selectors::view(&self.state)),
            });

            for effect in effects {
                if let Some(follow_up) = self.execute_effect(effect) {
                    chain.push_back(follow_up);
                }
            }
        }
    }

    /// Run an effect. Inline effects return their follow-up event; the rest
    /// are spawned and report back through the event channel.
    fn execute_effect(&self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::ResolveBranches { answer } => Some(resolve_branches(&self.state, &answer)),

            Effect::ResolveNextStep => Some(resolve_next_step(&self.state)),

            Effect::BeginOptionsFetch => Some(Event::FetchOptionsStart),

            Effect::ValidateInput {
                key,
                raw_input,
                epoch,
            } => {
                let Some(step) = self.state.step(&key).cloned() else {
                    tracing::warn!(key = %key, "Validation requested for unknown step");
                    return None;
                };
                let state = Arc::clone(&self.state);
                let delay = self.config.validation_delay;
                let locale = self.config.locale;
                self.spawn_workflow("validate_input", async move {
                    validate_input(step, raw_input, state, delay, locale, epoch).await
                });
                None
            }

            Effect::FetchOptions { key, epoch } => {
                let Some(fetcher) = self
                    .state
                    .step(&key)
                    .and_then(|step| step.options_fetcher.clone())
                else {
                    tracing::warn!(key = %key, "Options requested for a step without fetcher");
                    return None;
                };
                let state = Arc::clone(&self.state);
                let locale = self.config.locale;
                self.spawn_workflow("fetch_options", async move {
                    fetch_options(fetcher, key, state, locale, epoch).await
                });
                None
            }

            Effect::RunFulfillment { epoch } => {
                let fulfillment = Arc::clone(&self.fulfillment);
                let state = Arc::clone(&self.state);
                let locale = self.config.locale;
                self.spawn_workflow("run_fulfillment", async move {
                    run_fulfillment(fulfillment, state, locale, epoch).await
                });
                None
            }
        }
    }

    /// Spawn a workflow whose result event is sent back into the loop.
    fn spawn_workflow(
        &self,
        workflow: &'static str,
        future: impl Future<Output = Event> + Send + 'static,
    ) {
        let Some(event_tx) = self.event_tx.upgrade() else {
            tracing::debug!(workflow, "Runtime is closing, workflow not started");
            return;
        };
        let conversation_id = self.context.conversation_id;

        tokio::spawn(async move {
            tracing::debug!(%conversation_id, workflow, "Workflow started (background)");
            let event = future.await;
            if event_tx.send(event).await.is_err() {
                tracing::debug!(%conversation_id, workflow, "Runtime stopped, result dropped");
            }
        });
    }
}

/// Run a collaborator future, turning a panic into an error.
async fn guarded<T>(
    future: impl Future<Output = Result<T, CollaboratorError>>,
) -> Result<T, CollaboratorError> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(CollaboratorError::unknown("collaborator panicked")))
}

/// Debounce, curate, then run the schema and the async validator.
async fn validate_input(
    step: Step,
    raw_input: String,
    state: Arc<ConversationState>,
    delay: Duration,
    locale: Locale,
    epoch: u64,
) -> Event {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let key = step.key.clone();
    let checked = AssertUnwindSafe(check_input(&step, &raw_input, &state, locale))
        .catch_unwind()
        .await;

    match checked {
        Ok(Ok(input)) => Event::SuccessfulUserInput { key, input, epoch },
        Ok(Err(Rejection { input, error })) => Event::FailedUserInput {
            key,
            input,
            error,
            epoch,
        },
        Err(_) => {
            tracing::warn!(key = %key, "Validation pipeline panicked");
            Event::FailedUserInput {
                key,
                input: raw_input,
                error: locale.server_error().to_string(),
                epoch,
            }
        }
    }
}

struct Rejection {
    input: String,
    error: String,
}

async fn check_input(
    step: &Step,
    raw_input: &str,
    state: &ConversationState,
    locale: Locale,
) -> Result<String, Rejection> {
    let input = match &step.curator {
        Some(curate) => curate(raw_input),
        None => raw_input.to_string(),
    };

    if let Some(schema) = &step.validation_schema {
        if let Err(e) = schema.validate(&input) {
            let error = if e.message.is_empty() {
                locale.fallback_error().to_string()
            } else {
                e.message
            };
            return Err(Rejection { input, error });
        }
    }

    if let Some(validator) = &step.async_validator {
        match guarded(validator.validate(&input, state)).await {
            Ok(verdict) if verdict.is_valid => {}
            Ok(verdict) => {
                let error = verdict
                    .error
                    .filter(|error| !error.is_empty())
                    .unwrap_or_else(|| locale.fallback_error().to_string());
                return Err(Rejection { input, error });
            }
            Err(e) => {
                tracing::warn!(key = %step.key, kind = ?e.kind, error = %e, "Async validator failed");
                return Err(Rejection {
                    input,
                    error: locale.server_error().to_string(),
                });
            }
        }
    }

    Ok(input)
}

async fn fetch_options(
    fetcher: Arc<dyn OptionsFetcher>,
    key: String,
    state: Arc<ConversationState>,
    locale: Locale,
    epoch: u64,
) -> Event {
    match guarded(fetcher.fetch(&state)).await {
        Ok(options) => {
            tracing::debug!(key = %key, count = options.len(), "Options fetched");
            Event::FetchOptionsSuccess {
                key,
                options,
                epoch,
            }
        }
        Err(e) => {
            tracing::warn!(key = %key, kind = ?e.kind, error = %e, "Options fetch failed");
            Event::FetchOptionsFailure {
                error: locale.fetch_error().to_string(),
                epoch,
            }
        }
    }
}

async fn run_fulfillment<F>(
    fulfillment: Arc<F>,
    state: Arc<ConversationState>,
    locale: Locale,
    epoch: u64,
) -> Event
where
    F: FulfillmentRunner + ?Sized,
{
    if !state.is_complete {
        tracing::warn!(form = %state.name, "Fulfillment requested before completion");
        return Event::FulfillmentFailure {
            error: locale.fallback_error().to_string(),
            epoch,
        };
    }

    match guarded(fulfillment.fulfill(&state)).await {
        Ok(done) => {
            tracing::info!(form = %state.name, answers = state.dto.len(), "Form fulfilled");
            Event::FulfillmentSuccess {
                message: done.message,
                data: done.data,
                epoch,
            }
        }
        Err(e) => {
            tracing::warn!(form = %state.name, kind = ?e.kind, error = %e, "Fulfillment failed");
            Event::FulfillmentFailure {
                error: e.message,
                epoch,
            }
        }
    }
}
