//! Mock collaborators and runtime integration tests
//!
//! These mocks drive the real event loop without any network I/O.

use super::traits::*;
use super::{spawn, BotFormHandle, FormNotification};
use crate::catalog::{SelectOption, StepCatalog};
use crate::config::BotFormConfig;
use crate::error::{BotFormError, CollaboratorError};
use crate::state_machine::{ConversationState, Dto, TransitionError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Generous upper bound for anything the tests wait on
pub const WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// Mock Validator
// ============================================================================

/// Validator that answers from a queue, valid once the queue is empty
#[allow(dead_code)]
pub struct MockValidator {
    responses: Mutex<VecDeque<Result<AsyncValidation, CollaboratorError>>>,
    delay: Duration,
    /// Every value it was asked about
    pub calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockValidator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn queue(&self, response: Result<AsyncValidation, CollaboratorError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AsyncValidator for MockValidator {
    async fn validate(
        &self,
        value: &str,
        _state: &ConversationState,
    ) -> Result<AsyncValidation, CollaboratorError> {
        self.calls.lock().unwrap().push(value.to_string());
        let response = self.responses.lock().unwrap().pop_front();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        response.unwrap_or_else(|| Ok(AsyncValidation::valid()))
    }
}

// ============================================================================
// Mock Options Fetcher
// ============================================================================

/// Fetcher that answers from a queue, then falls back to fixed options
#[allow(dead_code)]
pub struct MockOptionsFetcher {
    responses: Mutex<VecDeque<Result<Vec<SelectOption>, CollaboratorError>>>,
    fallback: Vec<SelectOption>,
    delay: Duration,
    pub calls: Mutex<usize>,
}

#[allow(dead_code)]
impl MockOptionsFetcher {
    pub fn new(fallback: Vec<SelectOption>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: Mutex::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn queue_error(&self, error: CollaboratorError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl OptionsFetcher for MockOptionsFetcher {
    async fn fetch(
        &self,
        _state: &ConversationState,
    ) -> Result<Vec<SelectOption>, CollaboratorError> {
        *self.calls.lock().unwrap() += 1;
        let response = self.responses.lock().unwrap().pop_front();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        response.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

// ============================================================================
// Mock Fulfillment
// ============================================================================

/// Fulfillment that echoes the answers unless an error is queued
#[allow(dead_code)]
pub struct MockFulfillment {
    responses: Mutex<VecDeque<Result<Fulfillment, CollaboratorError>>>,
    /// Answers seen by each call
    pub calls: Mutex<Vec<Dto>>,
}

#[allow(dead_code)]
impl MockFulfillment {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_error(&self, error: CollaboratorError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_calls(&self) -> Vec<Dto> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FulfillmentRunner for MockFulfillment {
    async fn fulfill(&self, state: &ConversationState) -> Result<Fulfillment, CollaboratorError> {
        self.calls.lock().unwrap().push(state.dto.clone());
        let response = self.responses.lock().unwrap().pop_front();
        response.unwrap_or_else(|| {
            Ok(Fulfillment::new(
                "Thanks!",
                serde_json::to_value(&state.dto).unwrap_or_default(),
            ))
        })
    }
}

// ============================================================================
// Test runtime builder
// ============================================================================

/// Builds a running form with mock collaborators and no validation delay
pub struct TestRuntime {
    catalog: StepCatalog,
    fulfillment: Arc<MockFulfillment>,
    config: BotFormConfig,
}

#[allow(dead_code)]
impl TestRuntime {
    pub fn new(catalog: StepCatalog) -> Self {
        Self {
            catalog,
            fulfillment: Arc::new(MockFulfillment::new()),
            config: BotFormConfig::default().with_validation_delay(Duration::ZERO),
        }
    }

    pub fn with_fulfillment(mut self, fulfillment: Arc<MockFulfillment>) -> Self {
        self.fulfillment = fulfillment;
        self
    }

    pub fn with_config(mut self, config: BotFormConfig) -> Self {
        self.config = config;
        self
    }

    pub fn start(self) -> Result<BotFormHandle, BotFormError> {
        spawn(self.catalog, self.fulfillment, self.config)
    }
}

/// Next rejection published by the runtime, if any arrives in time
pub async fn next_rejection(
    rx: &mut broadcast::Receiver<FormNotification>,
) -> Option<TransitionError> {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(FormNotification::Rejected { reason, .. }) => return Some(reason),
                Ok(FormNotification::StateChanged { .. }) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ConditionedSteps, Step, ValidationSchema};
    use crate::config::Locale;
    use crate::state_machine::{Message, MessageKey, Sender};
    use tokio_stream::StreamExt;

    fn two_steps() -> StepCatalog {
        StepCatalog::new("two", vec![Step::text("a", "A?"), Step::text("b", "B?")])
    }

    async fn answered(handle: &BotFormHandle, text: &str, key: &str) -> Arc<ConversationState> {
        handle.send_text(text).await.unwrap();
        let key = key.to_string();
        handle
            .wait_for(move |s| s.dto.contains_key(&key) && !s.is_passing_to_next_step, WAIT)
            .await
            .expect("answer accepted")
    }

    #[tokio::test]
    async fn test_scenario_a_single_text_step() {
        let handle = TestRuntime::new(StepCatalog::new("a", vec![Step::text("name", "Name?")]))
            .start()
            .unwrap();
        handle.start().await.unwrap();
        let state = handle
            .wait_for(|s| !s.messages.is_empty(), WAIT)
            .await
            .unwrap();
        assert_eq!(state.messages, vec![Message::bot(MessageKey::step("name"), "Name?")]);

        handle.send_text("Ana").await.unwrap();
        let state = handle.wait_for(|s| s.is_complete, WAIT).await.unwrap();
        assert_eq!(state.dto.get("name").map(String::as_str), Some("Ana"));
        assert!(handle.view().should_suppress_input);
    }

    #[tokio::test]
    async fn test_scenario_b_welcome_message() {
        let handle = TestRuntime::new(
            StepCatalog::new("b", vec![Step::text("name", "Name?")]).with_welcome_message("Hi"),
        )
        .start()
        .unwrap();
        handle.start().await.unwrap();
        let state = handle
            .wait_for(|s| s.messages.len() == 2, WAIT)
            .await
            .unwrap();
        assert_eq!(state.messages[0], Message::bot(MessageKey::Welcome, "Hi"));
        assert_eq!(state.messages[1], Message::bot(MessageKey::step("name"), "Name?"));
    }

    #[tokio::test]
    async fn test_scenario_c_undo_before_answering() {
        let handle = TestRuntime::new(two_steps()).start().unwrap();
        handle.start().await.unwrap();
        answered(&handle, "1", "a").await;
        assert_eq!(handle.state().active_key, "b");

        handle.undo().await.unwrap();
        let state = handle.wait_for(|s| s.epoch == 1, WAIT).await.unwrap();
        assert_eq!(state.active_key, "a");
        assert!(state.dto.is_empty());
        assert_eq!(state.messages, vec![Message::bot(MessageKey::step("a"), "A?")]);
    }

    #[tokio::test]
    async fn test_scenario_d_options_fetch_failure() {
        let fetcher = Arc::new(MockOptionsFetcher::new(vec![]));
        fetcher.queue_error(CollaboratorError::server("503 Service Unavailable"));
        let catalog = StepCatalog::new(
            "d",
            vec![
                Step::text("a", "A?"),
                Step::select("pick", "Pick one").with_options_fetcher(Arc::clone(&fetcher)),
            ],
        );
        let handle = TestRuntime::new(catalog).start().unwrap();
        handle.start().await.unwrap();
        handle.send_text("1").await.unwrap();

        let state = handle
            .wait_for(
                |s| s.messages.last().is_some_and(|m| m.text == "Error de servidor"),
                WAIT,
            )
            .await
            .unwrap();
        assert!(!state.is_fetching_options);
        assert_eq!(state.active_key, "pick");
        assert_eq!(state.step_keys(), vec!["a", "pick"]);
        assert!(state.messages.last().unwrap().key.is_step("pick"));
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fetched_options_label_the_answer() {
        let fetcher = Arc::new(MockOptionsFetcher::new(vec![
            SelectOption::new("Lima", "LIM"),
            SelectOption::new("Cusco", "CUZ"),
        ]));
        let catalog = StepCatalog::new(
            "cities",
            vec![
                Step::text("name", "Name?"),
                Step::select("city", "City?").with_options_fetcher(Arc::clone(&fetcher)),
                Step::text("end", "End?"),
            ],
        );

        let handle = TestRuntime::new(catalog).start().unwrap();
        handle.start().await.unwrap();
        answered(&handle, "Ana", "name").await;
        let state = handle
            .wait_for(|s| s.step("city").is_some_and(|st| st.select_options.is_some()), WAIT)
            .await
            .unwrap();
        assert!(!state.is_fetching_options);

        handle.select_option("CUZ").await.unwrap();
        let state = handle
            .wait_for(|s| s.active_key == "end", WAIT)
            .await
            .unwrap();
        let reply = state
            .messages
            .iter()
            .rev()
            .find(|m| m.sender == Sender::User)
            .unwrap();
        assert_eq!(reply.text, "Cusco");
        assert_eq!(state.dto.get("city").map(String::as_str), Some("CUZ"));
    }

    #[tokio::test]
    async fn test_scenario_e_fulfillment_failure_undoes_once() {
        let fulfillment = Arc::new(MockFulfillment::new());
        fulfillment.queue_error(CollaboratorError::transport(
            "Http failure response: 0 Unknown Error",
        ));
        let handle = TestRuntime::new(two_steps())
            .with_fulfillment(Arc::clone(&fulfillment))
            .start()
            .unwrap();
        handle.start().await.unwrap();
        answered(&handle, "1", "a").await;
        handle.send_text("2").await.unwrap();
        handle.wait_for(|s| s.is_complete, WAIT).await.unwrap();

        handle.confirm().await.unwrap();
        let state = handle.wait_for(|s| s.epoch == 1, WAIT).await.unwrap();
        assert!(!state.is_complete && !state.is_fulfilling && !state.is_confirmed);
        assert_eq!(state.active_key, "b");
        assert_eq!(state.dto.get("a").map(String::as_str), Some("1"));
        assert!(!state.dto.contains_key("b"));
        assert_eq!(fulfillment.recorded_calls().len(), 1);

        // The user can answer again and retry
        handle.send_text("3").await.unwrap();
        handle.wait_for(|s| s.is_complete, WAIT).await.unwrap();
        handle.confirm().await.unwrap();
        let state = handle.wait_for(|s| s.is_fulfilled, WAIT).await.unwrap();
        assert_eq!(state.fulfillment_payload, Some(serde_json::json!({ "a": "1", "b": "3" })));
    }

    #[tokio::test]
    async fn test_fulfilled_conversation_refuses_further_events() {
        let handle = TestRuntime::new(StepCatalog::new("f", vec![Step::text("a", "A?")]))
            .start()
            .unwrap();
        handle.start().await.unwrap();
        handle.send_text("done").await.unwrap();
        handle.wait_for(|s| s.is_complete, WAIT).await.unwrap();
        handle.confirm().await.unwrap();
        let state = handle.wait_for(|s| s.is_fulfilled, WAIT).await.unwrap();
        assert_eq!(state.messages.last().unwrap().key, MessageKey::FulfillmentSuccess);
        assert_eq!(state.messages.last().unwrap().text, "Thanks!");

        let mut rx = handle.subscribe();
        handle.undo().await.unwrap();
        assert_eq!(
            next_rejection(&mut rx).await,
            Some(TransitionError::ConversationFulfilled)
        );
    }

    #[tokio::test]
    async fn test_branch_inserted_and_removed_end_to_end() {
        let catalog = StepCatalog::new(
            "pets",
            vec![
                Step::select("pet", "Do you have a dog?").with_options(vec![
                    SelectOption::new("Yes", "yes"),
                    SelectOption::new("No", "no"),
                ]),
                Step::text("email", "Email?").with_schema(ValidationSchema::new().email()),
            ],
        )
        .with_conditioned_steps(ConditionedSteps::when_answer(
            "pet",
            "yes",
            vec![Step::text("dog_name", "Dog's name?")],
        ));
        let handle = TestRuntime::new(catalog).start().unwrap();
        handle.start().await.unwrap();

        let state = answered(&handle, "yes", "pet").await;
        assert_eq!(state.step_keys(), vec!["pet", "dog_name", "email"]);
        assert_eq!(state.active_key, "dog_name");

        handle.undo().await.unwrap();
        let state = handle.wait_for(|s| s.epoch == 1, WAIT).await.unwrap();
        assert_eq!(state.step_keys(), vec!["pet", "email"]);
        assert_eq!(state.active_key, "pet");

        let state = answered(&handle, "no", "pet").await;
        assert_eq!(state.active_key, "email");

        assert_eq!(state.messages[1], Message::user(MessageKey::step("pet"), "No"));

        handle.send_text("not-an-email").await.unwrap();
        let state = handle
            .wait_for(|s| s.messages.len() == 5, WAIT)
            .await
            .unwrap();
        assert_eq!(state.messages[4].sender, Sender::Bot);
        assert!(state.messages[4].key.is_step("email"));
        assert_eq!(state.active_key, "email");
        assert!(!state.dto.contains_key("email"));
        assert!(!handle.view().should_suppress_input);
    }

    #[tokio::test]
    async fn test_stale_validation_is_dropped_after_undo() {
        let validator = Arc::new(MockValidator::new().with_delay(Duration::from_millis(150)));
        let catalog = StepCatalog::new(
            "stale",
            vec![
                Step::text("a", "A?").with_async_validator(Arc::clone(&validator)),
                Step::text("b", "B?"),
            ],
        );
        let handle = TestRuntime::new(catalog).start().unwrap();
        let mut rx = handle.subscribe();
        handle.start().await.unwrap();
        handle.send_text("late").await.unwrap();
        handle.wait_for(|s| s.is_validating_input, WAIT).await.unwrap();
        handle.undo().await.unwrap();

        let reason = next_rejection(&mut rx).await;
        assert_eq!(
            reason,
            Some(TransitionError::StaleResult {
                event_epoch: 0,
                current: 1
            })
        );
        let state = handle.state();
        assert_eq!(state.active_key, "a");
        assert!(state.dto.is_empty());
        assert!(!state.is_validating_input);
        assert_eq!(validator.recorded_calls(), vec!["late".to_string()]);
    }

    #[tokio::test]
    async fn test_input_suppressed_while_validating() {
        let validator = Arc::new(MockValidator::new().with_delay(Duration::from_millis(100)));
        let catalog = StepCatalog::new(
            "busy",
            vec![Step::text("a", "A?").with_async_validator(Arc::clone(&validator))],
        );
        let handle = TestRuntime::new(catalog).start().unwrap();
        let mut rx = handle.subscribe();
        handle.start().await.unwrap();
        handle.send_text("first").await.unwrap();
        handle.send_text("second").await.unwrap();

        assert_eq!(next_rejection(&mut rx).await, Some(TransitionError::InputSuppressed));
        let state = handle.wait_for(|s| s.is_complete, WAIT).await.unwrap();
        assert_eq!(state.dto.get("a").map(String::as_str), Some("first"));
    }

    #[tokio::test]
    async fn test_async_rejection_reprompts() {
        let validator = Arc::new(MockValidator::new());
        validator.queue(Ok(AsyncValidation::invalid("Username taken")));
        let catalog = StepCatalog::new(
            "users",
            vec![Step::text("user", "Username?").with_async_validator(Arc::clone(&validator))],
        );
        let handle = TestRuntime::new(catalog).start().unwrap();
        handle.start().await.unwrap();
        handle.send_text("ana").await.unwrap();
        let state = handle
            .wait_for(|s| s.messages.len() == 3 && !s.is_validating_input, WAIT)
            .await
            .unwrap();
        assert_eq!(
            state.messages[2],
            Message::bot(MessageKey::step("user"), "Username taken")
        );

        handle.send_text("ana2").await.unwrap();
        let state = handle.wait_for(|s| s.is_complete, WAIT).await.unwrap();
        assert_eq!(state.dto.get("user").map(String::as_str), Some("ana2"));
    }

    #[tokio::test]
    async fn test_validator_transport_error_uses_locale() {
        let validator = Arc::new(MockValidator::new());
        validator.queue(Err(CollaboratorError::transport("timeout")));
        let catalog = StepCatalog::new(
            "loc",
            vec![Step::text("a", "A?").with_async_validator(Arc::clone(&validator))],
        );
        let handle = TestRuntime::new(catalog)
            .with_config(
                BotFormConfig::default()
                    .with_validation_delay(Duration::ZERO)
                    .with_locale(Locale::En),
            )
            .start()
            .unwrap();
        handle.start().await.unwrap();
        handle.send_text("x").await.unwrap();
        let state = handle
            .wait_for(|s| s.messages.len() == 3, WAIT)
            .await
            .unwrap();
        assert_eq!(state.messages[2].text, Locale::En.server_error());
    }

    #[tokio::test]
    async fn test_notifications_and_updates_follow_events() {
        let handle = TestRuntime::new(two_steps()).start().unwrap();
        let mut rx = handle.subscribe();
        let mut updates = handle.updates();
        let initial = updates.next().await.unwrap();
        assert!(initial.messages.is_empty());

        handle.start().await.unwrap();
        let notification = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        match notification {
            FormNotification::StateChanged { event, view } => {
                assert_eq!(event, "Conversation Init");
                assert_eq!(view.active_key, "a");
                assert_eq!(view.messages.len(), 1);
            }
            FormNotification::Rejected { reason, .. } => panic!("unexpected rejection: {reason}"),
        }

        let next = tokio::time::timeout(WAIT, updates.next()).await.unwrap().unwrap();
        assert_eq!(next.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_confirmation_returns_to_last_step() {
        let handle = TestRuntime::new(two_steps()).start().unwrap();
        assert_eq!(handle.form_name(), "two");
        handle.start().await.unwrap();
        answered(&handle, "1", "a").await;
        handle.send_text("2").await.unwrap();
        handle.wait_for(|s| s.is_complete, WAIT).await.unwrap();

        handle.cancel_confirmation().await.unwrap();
        let state = handle.wait_for(|s| s.epoch == 1, WAIT).await.unwrap();
        assert!(!state.is_complete && !state.is_confirmed);
        assert_eq!(state.active_key, "b");
        assert_eq!(state.dto.get("a").map(String::as_str), Some("1"));
        assert!(!state.dto.contains_key("b"));
        assert_eq!(
            state.messages.last(),
            Some(&Message::bot(MessageKey::step("b"), "B?"))
        );
        assert!(!handle.view().should_suppress_input);

        let mut rx = handle.subscribe();
        handle.confirm().await.unwrap();
        assert_eq!(next_rejection(&mut rx).await, Some(TransitionError::NotComplete));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_still_sees_rejections() {
        let mut config = BotFormConfig::default().with_validation_delay(Duration::ZERO);
        config.broadcast_buffer = 1;
        let handle = TestRuntime::new(two_steps())
            .with_config(config)
            .start()
            .unwrap();
        let mut rx = handle.subscribe();
        handle.start().await.unwrap();
        answered(&handle, "1", "a").await;

        handle.confirm().await.unwrap();
        assert_eq!(next_rejection(&mut rx).await, Some(TransitionError::NotComplete));
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_fails() {
        let handle = TestRuntime::new(two_steps()).start().unwrap();
        handle.shutdown();
        assert!(handle.is_closed());
        assert!(matches!(
            handle.start().await,
            Err(BotFormError::RuntimeClosed)
        ));
    }

    #[tokio::test]
    async fn test_empty_catalog_aborts_spawn() {
        let result = TestRuntime::new(StepCatalog::new("empty", vec![])).start();
        assert!(matches!(result, Err(BotFormError::EmptyCatalog { .. })));
    }
}
