use thiserror::Error;

use crate::services::session::SessionStatus;

/// Conditions reported by an exam attempt.
///
/// Malformed answer values have no variant: they are scored as unanswered.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid exam {exam_id}: {reason}")]
    InvalidExam { exam_id: String, reason: String },
    #[error("exam {0} not found")]
    ExamNotFound(String),
    #[error("session has already been started")]
    AlreadyStarted,
    #[error("session has not been started")]
    NotStarted,
    #[error("attempt has already been submitted")]
    AlreadySubmitted,
    #[error("attempt has been abandoned")]
    Abandoned,
    #[error("question {0} is not part of this exam")]
    UnknownQuestion(String),
    #[error("option {option_index} is out of range for question {question_id}")]
    OptionOutOfRange { question_id: String, option_index: usize },
    #[error("session is {0:?}, expected it to be terminating")]
    NotTerminating(SessionStatus),
    #[error("exam lookup failed: {0}")]
    Source(#[source] anyhow::Error),
    #[error("result hand-off failed: {0}")]
    Sink(#[source] anyhow::Error),
}

impl SessionError {
    pub(crate) fn invalid_exam(exam_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidExam { exam_id: exam_id.to_string(), reason: reason.into() }
    }
}
