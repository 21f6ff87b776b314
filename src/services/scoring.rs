use serde::Serialize;

use crate::schemas::{AnswerMap, Exam};
use crate::services::normalize::{gradable_exam, selected_options, GradableExam};

/// Score fields derived from an exam and a set of answers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredOutcome {
    pub correct_answers: u32,
    pub total_score: f64,
    pub max_score: f64,
    pub total_questions: u32,
}

/// Grades `answers` against an already normalized exam.
///
/// Pure: questions are visited in exam order and the sums are accumulated in
/// that order, so identical inputs produce bit-identical outcomes. Both the
/// live session and the repair task go through here.
pub fn score(exam: &GradableExam, answers: &AnswerMap) -> ScoredOutcome {
    let selected = selected_options(answers);

    let mut outcome = ScoredOutcome {
        correct_answers: 0,
        total_score: 0.0,
        max_score: 0.0,
        total_questions: exam.questions.len() as u32,
    };

    for question in &exam.questions {
        outcome.max_score += question.points;

        if selected.get(question.id.as_str()) == Some(&question.correct_option_index) {
            outcome.correct_answers += 1;
            outcome.total_score += question.points;
        }
    }

    outcome
}

pub fn score_exam(exam: &Exam, answers: &AnswerMap) -> ScoredOutcome {
    score(&gradable_exam(exam), answers)
}
