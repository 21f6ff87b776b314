use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use validator::Validate;

use crate::schemas::{AnswerMap, Exam, Question};

pub const DEFAULT_POINTS: f64 = 1.0;

/// A well-formed question with its stored values coerced to numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradedQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub correct_option_index: usize,
    pub points: f64,
}

/// The presentable, scorable view of an exam. Question order is the stored
/// order with malformed and duplicate entries removed.
#[derive(Debug, Clone, PartialEq)]
pub struct GradableExam {
    pub id: String,
    pub title: String,
    pub duration_seconds: i64,
    pub questions: Vec<GradedQuestion>,
    pub dropped_questions: usize,
}

impl GradableExam {
    pub fn question(&self, question_id: &str) -> Option<&GradedQuestion> {
        self.questions.iter().find(|question| question.id == question_id)
    }

    pub fn max_score(&self) -> f64 {
        self.questions.iter().map(|question| question.points).sum()
    }
}

pub fn gradable_exam(exam: &Exam) -> GradableExam {
    let mut seen = HashSet::new();
    let mut questions = Vec::with_capacity(exam.questions.len());

    for question in &exam.questions {
        let Some(graded) = graded_question(question) else {
            tracing::debug!(exam_id = %exam.id, question_id = %question.id, "Dropping malformed question");
            continue;
        };
        if !seen.insert(graded.id.clone()) {
            tracing::debug!(exam_id = %exam.id, question_id = %graded.id, "Dropping duplicate question id");
            continue;
        }
        questions.push(graded);
    }

    let dropped_questions = exam.questions.len() - questions.len();
    if dropped_questions > 0 {
        tracing::warn!(exam_id = %exam.id, dropped_questions, "Exam contains questions that cannot be graded");
    }

    GradableExam {
        id: exam.id.clone(),
        title: exam.title.clone(),
        duration_seconds: exam.duration_seconds,
        questions,
        dropped_questions,
    }
}

fn graded_question(question: &Question) -> Option<GradedQuestion> {
    question.validate().ok()?;

    let correct_option_index = question.correct_option_index.as_ref().and_then(coerce_index)?;
    if correct_option_index >= question.options.len() {
        return None;
    }

    Some(GradedQuestion {
        id: question.id.trim().to_string(),
        text: question.text.clone(),
        options: question.options.clone(),
        correct_option_index,
        points: coerce_points(question.points.as_ref()),
    })
}

/// Interprets a stored option index: non-negative integers, integral floats
/// and strings holding either. Anything else has no index.
pub fn coerce_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(number) => {
            if let Some(index) = number.as_u64() {
                return usize::try_from(index).ok();
            }
            number.as_f64().and_then(integral_index)
        }
        Value::String(raw) => {
            let raw = raw.trim();
            match raw.parse::<u64>() {
                Ok(index) => usize::try_from(index).ok(),
                Err(_) => raw.parse::<f64>().ok().and_then(integral_index),
            }
        }
        _ => None,
    }
}

fn integral_index(value: f64) -> Option<usize> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= usize::MAX as f64 {
        Some(value as usize)
    } else {
        None
    }
}

/// Question weight; anything that is not a positive finite number counts as 1.
pub fn coerce_points(value: Option<&Value>) -> f64 {
    let points = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(raw)) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };

    match points {
        Some(points) if points.is_finite() && points > 0.0 => points,
        _ => DEFAULT_POINTS,
    }
}

/// Coerces the submitted answers once, at the boundary. Values that do not
/// name an option index are left out, i.e. scored as unanswered.
pub fn selected_options(answers: &AnswerMap) -> HashMap<&str, usize> {
    let mut selected = HashMap::with_capacity(answers.len());

    for (question_id, value) in answers {
        if value.is_null() {
            continue;
        }
        match coerce_index(value) {
            Some(index) => {
                selected.insert(question_id.trim(), index);
            }
            None => {
                tracing::debug!(question_id = %question_id, value = %value, "Malformed answer treated as unanswered");
            }
        }
    }

    selected
}
