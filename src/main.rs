//! bot-form-chat - terminal front end for a sample bot form
//!
//! Type answers at the prompt. Select steps take the option value shown in
//! brackets. Commands: /undo, /confirm, /cancel, /quit.

use bot_form::{
    spawn, AsyncValidation, BotFormConfig, BotFormHandle, CollaboratorError, ConditionedSteps,
    ConversationState, FnFulfillment, FnOptionsFetcher, FnValidator, FormNotification,
    Fulfillment, InputType, SelectOption, Sender, Step, StepCatalog, ValidationSchema,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bot_form=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = BotFormConfig::from_env();
    tracing::info!(
        validation_delay = ?config.validation_delay,
        locale = ?config.locale,
        "Configuration loaded"
    );

    let fulfillment = FnFulfillment::new(|state: ConversationState| async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        serde_json::to_value(&state.dto)
            .map(|data| Fulfillment::new("Thanks! Your answers were submitted.", data))
            .map_err(|e| CollaboratorError::unknown(e.to_string()))
    });

    let handle = spawn(sample_catalog(), fulfillment, config)?;
    tracing::info!(
        conversation_id = %handle.conversation_id(),
        form = handle.form_name(),
        "Chat started"
    );

    let done = CancellationToken::new();
    tokio::spawn(print_conversation(handle.clone(), done.clone()));
    tokio::spawn(print_rejections(handle.clone()));

    handle.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            () = done.cancelled() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                match line {
                    "" => {}
                    "/quit" => break,
                    "/undo" => handle.undo().await?,
                    "/confirm" => handle.confirm().await?,
                    "/cancel" => handle.cancel_confirmation().await?,
                    answer => answer_active_step(&handle, answer).await?,
                }
            }
        }
    }

    handle.shutdown();
    Ok(())
}

async fn answer_active_step(
    handle: &BotFormHandle,
    answer: &str,
) -> Result<(), bot_form::BotFormError> {
    let state = handle.state();
    let is_select = state
        .step(&state.active_key)
        .is_some_and(|step| step.input_type == InputType::Select);
    if is_select {
        handle.select_option(answer).await
    } else {
        handle.send_text(answer).await
    }
}

/// Print new messages as they land; rewind when an undo truncates the log.
async fn print_conversation(handle: BotFormHandle, done: CancellationToken) {
    let mut updates = handle.updates();
    let mut shown = 0;
    let mut options_shown_for: Option<(String, usize)> = None;
    let mut announced_completion = false;

    while let Some(state) = updates.next().await {
        if state.messages.len() < shown {
            println!("  -- back to \"{}\" --", state.active_key);
            shown = state.messages.len();
            options_shown_for = None;
        }
        for message in &state.messages[shown..] {
            match message.sender {
                Sender::Bot => println!("bot> {}", message.text),
                Sender::User => println!(" me> {}", message.text),
            }
        }
        shown = state.messages.len();

        if let Some(step) = state.step(&state.active_key) {
            if let Some(options) = &step.select_options {
                let marker = (step.key.clone(), options.len());
                if !state.is_complete && options_shown_for.as_ref() != Some(&marker) {
                    for option in options {
                        println!("      [{}] {}", option.value, option.text);
                    }
                    options_shown_for = Some(marker);
                }
            }
        }

        if state.is_complete && !state.is_confirmed && !announced_completion {
            println!("bot> All set. Type /confirm to submit or /cancel to go back.");
            announced_completion = true;
        } else if !state.is_complete {
            announced_completion = false;
        }

        if state.is_fulfilled {
            if let Some(payload) = &state.fulfillment_payload {
                println!("      {payload}");
            }
            done.cancel();
            break;
        }
    }
}

async fn print_rejections(handle: BotFormHandle) {
    let mut rx = handle.subscribe();
    loop {
        match rx.recv().await {
            Ok(FormNotification::Rejected { reason, .. }) => println!("  (ignored: {reason})"),
            Ok(FormNotification::StateChanged { .. }) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
}

fn sample_catalog() -> StepCatalog {
    let kinds = FnOptionsFetcher::new(|_| async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(vec![
            SelectOption::new("Dog", "dog"),
            SelectOption::new("Cat", "cat"),
            SelectOption::new("Something else", "other"),
        ])
    });

    let cities = FnOptionsFetcher::new(|state: ConversationState| async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let mut options = vec![
            SelectOption::new("Lima", "LIM"),
            SelectOption::new("Cusco", "CUZ"),
            SelectOption::new("Arequipa", "AQP"),
        ];
        if state.dto.get("pet_kind").is_some_and(|kind| kind == "dog") {
            options.push(SelectOption::new("Dog-friendly Barranco", "BAR"));
        }
        Ok(options)
    });

    let registered = FnValidator::new(|email: String, _| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if email.ends_with("@example.com") {
            Ok(AsyncValidation::invalid("That address is already registered"))
        } else {
            Ok(AsyncValidation::valid())
        }
    });

    StepCatalog::new(
        "signup",
        vec![
            Step::text("name", "What's your name?")
                .with_curator(|raw| raw.trim().to_string())
                .with_schema(
                    ValidationSchema::new()
                        .required()
                        .message("I need a name to continue")
                        .min_length(2),
                ),
            Step::select("has_pet", "Do you have a pet?").with_options(vec![
                SelectOption::new("Yes", "yes"),
                SelectOption::new("No", "no"),
            ]),
            Step::text("email", "What's your email?")
                .with_curator(|raw| raw.trim().to_lowercase())
                .with_schema(ValidationSchema::new().required().email())
                .with_async_validator(registered),
            Step::select("city", "Which city are you in?").with_options_fetcher(cities),
        ],
    )
    .with_conditioned_steps(ConditionedSteps::when_answer(
        "has_pet",
        "yes",
        vec![
            Step::text("pet_name", "What's your pet's name?")
                .with_schema(ValidationSchema::new().required()),
            Step::select("pet_kind", "What kind of pet is it?").with_options_fetcher(kinds),
        ],
    ))
    .with_welcome_message("Hi! Let's get you signed up.")
}
