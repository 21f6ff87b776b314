use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// An exam as held by the external store. Question fields are kept loose
/// (`serde_json::Value`) because stored data carries numbers, numeric strings
/// and nulls interchangeably; `services::normalize` is the only place that
/// interprets them.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    #[validate(custom(function = non_blank))]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(alias = "duration_seconds")]
    #[validate(range(min = 1, message = "duration_seconds must be positive"))]
    pub duration_seconds: i64,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default)]
    #[validate(custom(function = non_blank))]
    pub id: String,
    #[serde(default)]
    #[validate(custom(function = non_blank))]
    pub text: String,
    #[serde(default)]
    #[validate(length(min = 2, message = "a question needs at least two options"))]
    pub options: Vec<String>,
    #[serde(default, alias = "correct_option_index", skip_serializing_if = "Option::is_none")]
    pub correct_option_index: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<serde_json::Value>,
}

fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("must_not_be_blank"));
    }
    Ok(())
}
