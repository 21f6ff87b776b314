use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::repositories::{ExamSource, ResultSink};
use crate::schemas::{AnswerMap, Exam, ExamResult, Question};
use crate::services::session::Student;

/// Three questions worth 1, 2 and 1 points; correct options 1, 0 and 2.
pub(crate) fn reference_exam() -> Exam {
    Exam {
        id: "exam-1".to_string(),
        title: "Reference exam".to_string(),
        duration_seconds: 600,
        questions: vec![
            question("q1", json!(1), json!(1)),
            question("q2", json!(0), json!(2)),
            question("q3", json!(2), json!(1)),
        ],
    }
}

pub(crate) fn question(id: &str, correct: Value, points: Value) -> Question {
    Question {
        id: id.to_string(),
        text: format!("Question {id}"),
        options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
        correct_option_index: Some(correct),
        points: Some(points),
    }
}

pub(crate) fn answers(entries: &[(&str, Value)]) -> AnswerMap {
    entries.iter().map(|(id, value)| (id.to_string(), value.clone())).collect()
}

/// A result for the reference exam with q1 and q2 right.
pub(crate) fn scored_result(id: &str) -> ExamResult {
    ExamResult {
        id: Some(id.to_string()),
        exam_id: "exam-1".to_string(),
        student_id: "student-1".to_string(),
        student_name: "Ada Lovelace".to_string(),
        exam_title: "Reference exam".to_string(),
        total_questions: 3,
        correct_answers: 2,
        total_score: 3.0,
        max_score: 4.0,
        answers: answers(&[("q1", json!(1)), ("q2", json!(0)), ("q3", json!(1))]),
        submitted_at: time::macros::datetime!(2025-03-01 09:30:00 UTC),
        time_spent_seconds: 412,
        extra: serde_json::Map::new(),
    }
}

pub(crate) fn student() -> Student {
    Student { id: "student-1".to_string(), name: "Ada Lovelace".to_string() }
}

/// Exam source that counts lookups and can be switched to fail.
#[derive(Default)]
pub(crate) struct FlakySource {
    exams: Mutex<Vec<Exam>>,
    failing: Mutex<bool>,
    pub(crate) lookups: AtomicUsize,
}

impl FlakySource {
    pub(crate) fn with(exams: Vec<Exam>) -> Self {
        Self { exams: Mutex::new(exams), ..Self::default() }
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("failing lock") = failing;
    }

    pub(crate) fn remove(&self, exam_id: &str) {
        self.exams.lock().expect("exams lock").retain(|exam| exam.id != exam_id);
    }

    pub(crate) fn insert(&self, exam: Exam) {
        self.exams.lock().expect("exams lock").push(exam);
    }
}

#[async_trait]
impl ExamSource for FlakySource {
    async fn find_exam(&self, exam_id: &str) -> anyhow::Result<Option<Exam>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().expect("failing lock") {
            anyhow::bail!("exam store unavailable");
        }
        Ok(self.exams.lock().expect("exams lock").iter().find(|exam| exam.id == exam_id).cloned())
    }
}

/// Result sink that records every emission and can be switched to fail.
#[derive(Default)]
pub(crate) struct RecordingSink {
    emitted: Mutex<Vec<ExamResult>>,
    failing: Mutex<bool>,
}

impl RecordingSink {
    pub(crate) fn emitted(&self) -> Vec<ExamResult> {
        self.emitted.lock().expect("emitted lock").clone()
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("failing lock") = failing;
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn persist(&self, result: &ExamResult) -> anyhow::Result<()> {
        if *self.failing.lock().expect("failing lock") {
            anyhow::bail!("result store unavailable");
        }
        self.emitted.lock().expect("emitted lock").push(result.clone());
        Ok(())
    }
}
