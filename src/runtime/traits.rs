//! Trait abstractions for the form's collaborators
//!
//! The runtime only ever talks to validators, options fetchers and the
//! fulfillment runner through these traits, so tests can swap in mocks.

use crate::catalog::SelectOption;
use crate::error::CollaboratorError;
use crate::state_machine::ConversationState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Verdict of an asynchronous validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncValidation {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl AsyncValidation {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
        }
    }
}

/// Outcome of a successful fulfillment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fulfillment {
    /// Shown to the user as the closing bot message
    pub message: String,
    /// Stored as the conversation's fulfillment payload
    pub data: Value,
}

impl Fulfillment {
    pub fn new(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

/// Checks an answer against something only reachable asynchronously
#[async_trait]
pub trait AsyncValidator: Send + Sync {
    async fn validate(
        &self,
        value: &str,
        state: &ConversationState,
    ) -> Result<AsyncValidation, CollaboratorError>;
}

/// Loads the options of a select step
#[async_trait]
pub trait OptionsFetcher: Send + Sync {
    async fn fetch(&self, state: &ConversationState)
        -> Result<Vec<SelectOption>, CollaboratorError>;
}

/// Runs the form's final action once the user confirms
#[async_trait]
pub trait FulfillmentRunner: Send + Sync {
    async fn fulfill(&self, state: &ConversationState) -> Result<Fulfillment, CollaboratorError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: AsyncValidator + ?Sized> AsyncValidator for Arc<T> {
    async fn validate(
        &self,
        value: &str,
        state: &ConversationState,
    ) -> Result<AsyncValidation, CollaboratorError> {
        (**self).validate(value, state).await
    }
}

#[async_trait]
impl<T: OptionsFetcher + ?Sized> OptionsFetcher for Arc<T> {
    async fn fetch(
        &self,
        state: &ConversationState,
    ) -> Result<Vec<SelectOption>, CollaboratorError> {
        (**self).fetch(state).await
    }
}

#[async_trait]
impl<T: FulfillmentRunner + ?Sized> FulfillmentRunner for Arc<T> {
    async fn fulfill(&self, state: &ConversationState) -> Result<Fulfillment, CollaboratorError> {
        (**self).fulfill(state).await
    }
}

// ============================================================================
// Closure adapters
// ============================================================================

/// Async validator backed by a closure over an owned snapshot
pub struct FnValidator<F> {
    f: F,
}

impl<F, Fut> FnValidator<F>
where
    F: Fn(String, ConversationState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<AsyncValidation, CollaboratorError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> AsyncValidator for FnValidator<F>
where
    F: Fn(String, ConversationState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<AsyncValidation, CollaboratorError>> + Send,
{
    async fn validate(
        &self,
        value: &str,
        state: &ConversationState,
    ) -> Result<AsyncValidation, CollaboratorError> {
        (self.f)(value.to_string(), state.clone()).await
    }
}

/// Options fetcher backed by a closure over an owned snapshot
pub struct FnOptionsFetcher<F> {
    f: F,
}

impl<F, Fut> FnOptionsFetcher<F>
where
    F: Fn(ConversationState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<SelectOption>, CollaboratorError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> OptionsFetcher for FnOptionsFetcher<F>
where
    F: Fn(ConversationState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<SelectOption>, CollaboratorError>> + Send,
{
    async fn fetch(
        &self,
        state: &ConversationState,
    ) -> Result<Vec<SelectOption>, CollaboratorError> {
        (self.f)(state.clone()).await
    }
}

/// Fulfillment runner backed by a closure over an owned snapshot
pub struct FnFulfillment<F> {
    f: F,
}

impl<F, Fut> FnFulfillment<F>
where
    F: Fn(ConversationState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Fulfillment, CollaboratorError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> FulfillmentRunner for FnFulfillment<F>
where
    F: Fn(ConversationState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Fulfillment, CollaboratorError>> + Send,
{
    async fn fulfill(&self, state: &ConversationState) -> Result<Fulfillment, CollaboratorError> {
        (self.f)(state.clone()).await
    }
}
