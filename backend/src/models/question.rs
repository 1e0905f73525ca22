//! Validated request primitives.

use crate::error::GatewayError;
use crate::gateway::ModelCatalog;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid question: question is empty")]
    EmptyQuestion,

    #[error("invalid question: {len} characters exceeds the limit of {max}")]
    QuestionTooLong { len: usize, max: usize },

    #[error("invalid model name: model name is empty")]
    EmptyModelName,

    #[error("invalid model name: '{0}' is not served")]
    UnknownModel(String),
}

impl From<ValidationError> for GatewayError {
    fn from(err: ValidationError) -> Self {
        GatewayError::Validation(err.to_string())
    }
}

/// Non-empty question text of bounded length, counted in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question(String);

impl Question {
    pub fn parse(raw: &str, max_len: usize) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }
        let len = raw.chars().count();
        if len > max_len {
            return Err(ValidationError::QuestionTooLong { len, max: max_len });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Name of a model present in the directory when it was parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelName(String);

impl ModelName {
    pub fn parse(raw: &str, catalog: &impl ModelCatalog) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::EmptyModelName);
        }
        if !catalog.has_model(raw) {
            return Err(ValidationError::UnknownModel(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
