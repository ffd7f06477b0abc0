//! Step catalog: the static description of a conversation
//!
//! A catalog is an ordered list of steps plus the branching rules that may
//! splice extra steps in after an answer. It is validated once, when the
//! conversation state is built from it.

pub mod validation;

pub use validation::{SchemaError, ValidationSchema};

use crate::error::BotFormError;
use crate::runtime::traits::{AsyncValidator, OptionsFetcher};
use crate::state_machine::ConversationState;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Pure normalizer applied to raw input before validation
pub type Curator = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Predicate deciding whether a conditioned block applies after an answer
pub type BranchCondition = Arc<dyn Fn(&Answer, &ConversationState) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Select,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Label shown to the user
    pub text: String,
    /// Value stored in the DTO
    pub value: String,
}

impl SelectOption {
    pub fn new(text: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            value: value.into(),
        }
    }
}

/// The last successfully validated answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub key: String,
    pub input: String,
}

impl Answer {
    pub fn new(key: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            input: input.into(),
        }
    }
}

/// One question of the conversation
#[derive(Clone)]
pub struct Step {
    pub key: String,
    pub prompt: String,
    pub input_type: InputType,
    pub select_options: Option<Vec<SelectOption>>,
    pub validation_schema: Option<ValidationSchema>,
    pub curator: Option<Curator>,
    pub async_validator: Option<Arc<dyn AsyncValidator>>,
    pub options_fetcher: Option<Arc<dyn OptionsFetcher>>,
}

impl Step {
    fn new(key: impl Into<String>, prompt: impl Into<String>, input_type: InputType) -> Self {
        Self {
            key: key.into(),
            prompt: prompt.into(),
            input_type,
            select_options: None,
            validation_schema: None,
            curator: None,
            async_validator: None,
            options_fetcher: None,
        }
    }

    pub fn text(key: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(key, prompt, InputType::Text)
    }

    pub fn select(key: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(key, prompt, InputType::Select)
    }

    #[must_use]
    pub fn with_options(mut self, options: Vec<SelectOption>) -> Self {
        self.select_options = Some(options);
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: ValidationSchema) -> Self {
        self.validation_schema = (!schema.is_empty()).then_some(schema);
        self
    }

    #[must_use]
    pub fn with_curator(mut self, curator: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.curator = Some(Arc::new(curator));
        self
    }

    #[must_use]
    pub fn with_async_validator(mut self, validator: impl AsyncValidator + 'static) -> Self {
        self.async_validator = Some(Arc::new(validator));
        self
    }

    #[must_use]
    pub fn with_options_fetcher(mut self, fetcher: impl OptionsFetcher + 'static) -> Self {
        self.options_fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Label of the option holding `value`, for select steps
    pub fn option_label(&self, value: &str) -> Option<&str> {
        self.select_options
            .as_deref()?
            .iter()
            .find(|option| option.value == value)
            .map(|option| option.text.as_str())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("key", &self.key)
            .field("prompt", &self.prompt)
            .field("input_type", &self.input_type)
            .field("select_options", &self.select_options)
            .field("validation_schema", &self.validation_schema)
            .field("has_curator", &self.curator.is_some())
            .field("has_async_validator", &self.async_validator.is_some())
            .field("has_options_fetcher", &self.options_fetcher.is_some())
            .finish()
    }
}

/// Extra steps spliced in after an answer that satisfies `condition`
#[derive(Clone)]
pub struct ConditionedSteps {
    pub condition: BranchCondition,
    pub steps: Vec<Step>,
}

impl ConditionedSteps {
    pub fn new(
        condition: impl Fn(&Answer, &ConversationState) -> bool + Send + Sync + 'static,
        steps: Vec<Step>,
    ) -> Self {
        Self {
            condition: Arc::new(condition),
            steps,
        }
    }

    /// Block that applies when step `key` was answered with exactly `value`
    pub fn when_answer(key: impl Into<String>, value: impl Into<String>, steps: Vec<Step>) -> Self {
        let key = key.into();
        let value = value.into();
        Self::new(
            move |answer, _| answer.key == key && answer.input == value,
            steps,
        )
    }

    pub fn matches(&self, answer: &Answer, state: &ConversationState) -> bool {
        (self.condition)(answer, state)
    }

    pub fn first_key(&self) -> Option<&str> {
        self.steps.first().map(|step| step.key.as_str())
    }
}

impl fmt::Debug for ConditionedSteps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.steps.iter().map(|s| s.key.as_str()).collect();
        f.debug_struct("ConditionedSteps")
            .field("steps", &keys)
            .finish_non_exhaustive()
    }
}

/// Everything needed to start a conversation
#[derive(Debug, Clone)]
pub struct StepCatalog {
    pub name: String,
    pub steps: Vec<Step>,
    pub conditioned_steps: Vec<ConditionedSteps>,
    pub welcome_message: Option<String>,
}

impl StepCatalog {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
            conditioned_steps: Vec::new(),
            welcome_message: None,
        }
    }

    #[must_use]
    pub fn with_conditioned_steps(mut self, block: ConditionedSteps) -> Self {
        self.conditioned_steps.push(block);
        self
    }

    #[must_use]
    pub fn with_welcome_message(mut self, message: impl Into<String>) -> Self {
        self.welcome_message = Some(message.into());
        self
    }

    /// Check the catalog can drive a conversation.
    ///
    /// Catalog keys must be unique, and each conditioned block must neither
    /// repeat a key internally nor reuse a catalog key. Blocks may share keys
    /// with each other since at most one is spliced at a branching point.
    pub fn validate(&self) -> Result<(), BotFormError> {
        if self.steps.is_empty() {
            return Err(BotFormError::EmptyCatalog {
                name: self.name.clone(),
            });
        }

        let mut catalog_keys = HashSet::new();
        for step in &self.steps {
            if !catalog_keys.insert(step.key.as_str()) {
                return Err(self.duplicate(&step.key));
            }
        }

        for block in &self.conditioned_steps {
            let mut block_keys = HashSet::new();
            for step in &block.steps {
                if catalog_keys.contains(step.key.as_str()) || !block_keys.insert(step.key.as_str())
                {
                    return Err(self.duplicate(&step.key));
                }
            }
        }

        Ok(())
    }

    fn duplicate(&self, key: &str) -> BotFormError {
        BotFormError::DuplicateStepKey {
            name: self.name.clone(),
            key: key.to_string(),
        }
    }
}
