//! Synchronous validation rules for step answers
//!
//! A schema is an ordered list of rules; the first failing rule decides the
//! error message shown to the user.

use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
});

type CustomRule = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// Rejection produced by a [`ValidationSchema`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SchemaError {
    pub message: String,
}

#[derive(Clone)]
enum Rule {
    Required,
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
    Email,
    Integer,
    Range { min: i64, max: i64 },
    OneOf(Vec<String>),
    Custom(CustomRule),
}

impl Rule {
    fn name(&self) -> &'static str {
        match self {
            Rule::Required => "required",
            Rule::MinLength(_) => "min_length",
            Rule::MaxLength(_) => "max_length",
            Rule::Pattern(_) => "pattern",
            Rule::Email => "email",
            Rule::Integer => "integer",
            Rule::Range { .. } => "range",
            Rule::OneOf(_) => "one_of",
            Rule::Custom(_) => "custom",
        }
    }

    fn check(&self, value: &str) -> Result<(), String> {
        match self {
            Rule::Required => {
                if value.trim().is_empty() {
                    Err("This field is required".to_string())
                } else {
                    Ok(())
                }
            }
            Rule::MinLength(min) => {
                if value.chars().count() < *min {
                    Err(format!("Must be at least {min} characters long"))
                } else {
                    Ok(())
                }
            }
            Rule::MaxLength(max) => {
                if value.chars().count() > *max {
                    Err(format!("Must be at most {max} characters long"))
                } else {
                    Ok(())
                }
            }
            Rule::Pattern(regex) => {
                if regex.is_match(value) {
                    Ok(())
                } else {
                    Err("Has an invalid format".to_string())
                }
            }
            Rule::Email => {
                if EMAIL.is_match(value) {
                    Ok(())
                } else {
                    Err("Must be a valid email".to_string())
                }
            }
            Rule::Integer => value
                .trim()
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| "Must be a whole number".to_string()),
            Rule::Range { min, max } => match value.trim().parse::<i64>() {
                Ok(n) if (*min..=*max).contains(&n) => Ok(()),
                Ok(_) => Err(format!("Must be between {min} and {max}")),
                Err(_) => Err("Must be a whole number".to_string()),
            },
            Rule::OneOf(allowed) => {
                if allowed.iter().any(|a| a == value) {
                    Ok(())
                } else {
                    Err(format!("Must be one of: {}", allowed.join(", ")))
                }
            }
            Rule::Custom(check) => check(value),
        }
    }
}

/// Ordered set of synchronous rules applied to a curated answer
#[derive(Clone, Default)]
pub struct ValidationSchema {
    rules: Vec<(Rule, Option<String>)>,
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(mut self, rule: Rule) -> Self {
        self.rules.push((rule, None));
        self
    }

    #[must_use]
    pub fn required(self) -> Self {
        self.rule(Rule::Required)
    }

    #[must_use]
    pub fn min_length(self, min: usize) -> Self {
        self.rule(Rule::MinLength(min))
    }

    #[must_use]
    pub fn max_length(self, max: usize) -> Self {
        self.rule(Rule::MaxLength(max))
    }

    #[must_use]
    pub fn pattern(self, regex: Regex) -> Self {
        self.rule(Rule::Pattern(regex))
    }

    #[must_use]
    pub fn email(self) -> Self {
        self.rule(Rule::Email)
    }

    #[must_use]
    pub fn integer(self) -> Self {
        self.rule(Rule::Integer)
    }

    #[must_use]
    pub fn range(self, min: i64, max: i64) -> Self {
        self.rule(Rule::Range { min, max })
    }

    #[must_use]
    pub fn one_of<I, S>(self, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule(Rule::OneOf(allowed.into_iter().map(Into::into).collect()))
    }

    /// Arbitrary check; `Err` carries the message to show
    #[must_use]
    pub fn custom(self, check: impl Fn(&str) -> Result<(), String> + Send + Sync + 'static) -> Self {
        self.rule(Rule::Custom(Arc::new(check)))
    }

    /// Replace the message of the most recently added rule
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        if let Some((_, slot)) = self.rules.last_mut() {
            *slot = Some(message.into());
        }
        self
    }

    pub fn validate(&self, value: &str) -> Result<(), SchemaError> {
        for (rule, message) in &self.rules {
            if let Err(default_message) = rule.check(value) {
                return Err(SchemaError {
                    message: message.clone().unwrap_or(default_message),
                });
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for ValidationSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|(rule, _)| rule.name()))
            .finish()
    }
}
