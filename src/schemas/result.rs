use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;
use time::OffsetDateTime;

/// Answers exactly as submitted: question id to the raw selected value.
/// Values are coerced to option indices only when scored.
pub type AnswerMap = BTreeMap<String, serde_json::Value>;

/// A finished attempt as handed to, and read back from, the external store.
///
/// Only the four score fields are ever rewritten after creation; everything
/// else is history. Fields this crate does not know about are carried through
/// `extra` so a repair pass writes records back without losing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "exam_id")]
    pub exam_id: String,
    #[serde(alias = "student_id")]
    pub student_id: String,
    #[serde(default, alias = "student_name")]
    pub student_name: String,
    #[serde(default, alias = "exam_title")]
    pub exam_title: String,
    #[serde(default, alias = "total_questions")]
    pub total_questions: u32,
    #[serde(default, alias = "correct_answers")]
    pub correct_answers: u32,
    #[serde(default, alias = "total_score")]
    pub total_score: f64,
    #[serde(default, alias = "max_score")]
    pub max_score: f64,
    #[serde(default)]
    pub answers: AnswerMap,
    #[serde(alias = "submitted_at", with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
    #[serde(default, alias = "time_spent_seconds")]
    pub time_spent_seconds: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ExamResult {
    /// Short identifier used in logs and repair reports.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!(
                "{}/{}@{}",
                self.exam_id,
                self.student_id,
                crate::core::time::format_offset(self.submitted_at)
            ),
        }
    }
}

/// One record of a stored result set, kept next to its original JSON text.
///
/// A record is written back from its original text unless it was rewritten,
/// so unreadable records and records nobody touched leave the store exactly
/// as they were read, key spelling included.
#[derive(Debug, Clone)]
pub enum StoredResult {
    Readable { raw: Box<RawValue>, result: ExamResult, modified: bool },
    Unreadable { raw: Box<RawValue>, id: Option<String>, exam_id: Option<String>, error: String },
}

impl StoredResult {
    pub fn parse(raw: Box<RawValue>) -> Self {
        match serde_json::from_str::<ExamResult>(raw.get()) {
            Ok(result) => Self::Readable { raw, result, modified: false },
            Err(err) => {
                let fields = serde_json::from_str::<serde_json::Value>(raw.get()).ok();
                let field = |camel: &str, snake: &str| {
                    fields
                        .as_ref()
                        .and_then(|value| value.get(camel).or_else(|| value.get(snake)))
                        .and_then(|value| value.as_str())
                        .map(str::to_string)
                };
                Self::Unreadable {
                    id: field("id", "id"),
                    exam_id: field("examId", "exam_id"),
                    error: err.to_string(),
                    raw,
                }
            }
        }
    }

    pub fn from_result(result: ExamResult) -> serde_json::Result<Self> {
        let raw = serde_json::value::to_raw_value(&result)?;
        Ok(Self::Readable { raw, result, modified: false })
    }

    pub fn result(&self) -> Option<&ExamResult> {
        match self {
            Self::Readable { result, .. } => Some(result),
            Self::Unreadable { .. } => None,
        }
    }

    /// Mutable access to the parsed record. From here on the record is
    /// written back from its parsed form.
    pub fn result_mut(&mut self) -> Option<&mut ExamResult> {
        match self {
            Self::Readable { result, modified, .. } => {
                *modified = true;
                Some(result)
            }
            Self::Unreadable { .. } => None,
        }
    }

    pub fn is_modified(&self) -> bool {
        matches!(self, Self::Readable { modified: true, .. })
    }

    pub fn exam_id(&self) -> Option<&str> {
        match self {
            Self::Readable { result, .. } => Some(&result.exam_id),
            Self::Unreadable { exam_id, .. } => exam_id.as_deref(),
        }
    }

    pub fn read_error(&self) -> Option<&str> {
        match self {
            Self::Readable { .. } => None,
            Self::Unreadable { error, .. } => Some(error),
        }
    }

    /// Like [`ExamResult::label`]; `position` (zero-based) names unreadable
    /// records that carry no id.
    pub fn label(&self, position: usize) -> String {
        match self {
            Self::Readable { result, .. } => result.label(),
            Self::Unreadable { id: Some(id), .. } => id.clone(),
            Self::Unreadable { id: None, .. } => format!("record #{}", position + 1),
        }
    }
}

impl Serialize for StoredResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Readable { result, modified: true, .. } => result.serialize(serializer),
            Self::Readable { raw, .. } | Self::Unreadable { raw, .. } => raw.serialize(serializer),
        }
    }
}
