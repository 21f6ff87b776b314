//! State machine for a single attempt at an exam.
//!
//! `NotStarted -> InProgress -> Terminating -> Terminated`, nothing else.
//! The session is a plain owned value; callers that share it between a timer
//! and a user event stream put it behind a lock (see `services::attempt`), and
//! the `InProgress -> Terminating` step in [`ExamSession::begin_submit`] is the
//! point where concurrent submissions are linearized.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use crate::core::time::elapsed_seconds;
use crate::errors::SessionError;
use crate::schemas::{AnswerMap, Exam, ExamResult};
use crate::services::normalize::{gradable_exam, GradableExam, GradedQuestion};
use crate::services::scoring::score_exam;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Terminating,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitReason {
    Manual,
    Timeout,
}

impl SubmitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitReason::Manual => "manual",
            SubmitReason::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Previous,
    Next,
    /// Explicit position; out-of-range values are clamped.
    Index(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Clock is not running (session not in progress).
    Idle,
    Running { remaining_seconds: u64 },
    /// Time ran out on this tick; the caller must submit with `SubmitReason::Timeout`.
    Expired,
}

/// What a `submit` call has to do after the status check.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitStep {
    /// This caller owns termination and must score and hand off the result.
    Proceed,
    /// The attempt already finished; here is its result.
    Finished(ExamResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
}

/// The current question as shown to the student. The correct option is not
/// part of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub points: f64,
    pub selected_option: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub exam_id: String,
    pub status: SessionStatus,
    pub current_index: usize,
    pub question_count: usize,
    pub answered_count: usize,
    pub remaining_seconds: u64,
    pub abandoned: bool,
    pub question: Option<QuestionView>,
}

#[derive(Debug)]
pub struct ExamSession {
    id: Uuid,
    exam_id: String,
    student: Student,
    exam: Option<GradableExam>,
    current_index: usize,
    answers: AnswerMap,
    remaining_seconds: u64,
    status: SessionStatus,
    started_at: Option<OffsetDateTime>,
    submit_reason: Option<SubmitReason>,
    result: Option<ExamResult>,
    scoring_runs: u32,
    abandoned: bool,
}

impl ExamSession {
    pub fn new(exam_id: impl Into<String>, student: Student) -> Self {
        Self {
            id: Uuid::new_v4(),
            exam_id: exam_id.into(),
            student,
            exam: None,
            current_index: 0,
            answers: AnswerMap::new(),
            remaining_seconds: 0,
            status: SessionStatus::NotStarted,
            started_at: None,
            submit_reason: None,
            result: None,
            scoring_runs: 0,
            abandoned: false,
        }
    }

    pub fn start(&mut self, exam: &Exam, now: OffsetDateTime) -> Result<(), SessionError> {
        if self.abandoned {
            return Err(SessionError::Abandoned);
        }
        if self.status != SessionStatus::NotStarted {
            return Err(SessionError::AlreadyStarted);
        }
        if exam.id != self.exam_id {
            return Err(SessionError::invalid_exam(
                &self.exam_id,
                format!("session was opened for {} but received {}", self.exam_id, exam.id),
            ));
        }
        exam.validate().map_err(|err| SessionError::invalid_exam(&exam.id, err.to_string()))?;

        let gradable = gradable_exam(exam);
        if gradable.questions.is_empty() {
            return Err(SessionError::invalid_exam(&exam.id, "exam has no gradable questions"));
        }

        self.remaining_seconds = gradable.duration_seconds as u64;
        self.current_index = 0;
        self.answers = AnswerMap::new();
        self.started_at = Some(now);
        self.exam = Some(gradable);
        self.status = SessionStatus::InProgress;

        tracing::info!(
            session_id = %self.id,
            exam_id = %self.exam_id,
            student_id = %self.student.id,
            remaining_seconds = self.remaining_seconds,
            "Exam session started"
        );
        metrics::counter!("exam_attempts_started_total").increment(1);

        Ok(())
    }

    pub fn select_answer(
        &mut self,
        question_id: &str,
        option_index: usize,
    ) -> Result<(), SessionError> {
        let question = self.question_in_progress(question_id)?;
        if option_index >= question.options.len() {
            return Err(SessionError::OptionOutOfRange {
                question_id: question_id.to_string(),
                option_index,
            });
        }

        self.answers.insert(question_id.to_string(), serde_json::Value::from(option_index));
        Ok(())
    }

    pub fn clear_answer(&mut self, question_id: &str) -> Result<(), SessionError> {
        self.question_in_progress(question_id)?;
        self.answers.remove(question_id);
        Ok(())
    }

    pub fn navigate(&mut self, target: Navigation) -> Result<usize, SessionError> {
        self.ensure_in_progress()?;

        let last = self.question_count().saturating_sub(1) as i64;
        let current = self.current_index as i64;
        let wanted = match target {
            Navigation::Previous => current - 1,
            Navigation::Next => current + 1,
            Navigation::Index(index) => index,
        };

        self.current_index = wanted.clamp(0, last) as usize;
        Ok(self.current_index)
    }

    /// Advances the clock by one scheduling unit.
    pub fn tick(&mut self) -> Tick {
        if self.abandoned || self.status != SessionStatus::InProgress {
            return Tick::Idle;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            tracing::info!(session_id = %self.id, exam_id = %self.exam_id, "Exam time expired");
            Tick::Expired
        } else {
            Tick::Running { remaining_seconds: self.remaining_seconds }
        }
    }

    /// First half of a submission: the status check-and-set.
    ///
    /// The first call that finds the session `InProgress` moves it to
    /// `Terminating` and freezes the answers. A call that finds it
    /// `Terminating` proceeds too, so a failed lookup or hand-off can be
    /// retried; scoring itself still happens at most once. Once `Terminated`
    /// every call gets the original result back.
    pub fn begin_submit(&mut self, reason: SubmitReason) -> Result<SubmitStep, SessionError> {
        if self.abandoned {
            return Err(SessionError::Abandoned);
        }
        match self.status {
            SessionStatus::NotStarted => Err(SessionError::NotStarted),
            SessionStatus::InProgress => {
                self.status = SessionStatus::Terminating;
                self.submit_reason = Some(reason);
                tracing::info!(
                    session_id = %self.id,
                    exam_id = %self.exam_id,
                    reason = reason.as_str(),
                    answered = self.answers.len(),
                    "Submitting exam attempt"
                );
                Ok(SubmitStep::Proceed)
            }
            SessionStatus::Terminating => Ok(SubmitStep::Proceed),
            SessionStatus::Terminated => match &self.result {
                Some(result) => {
                    tracing::debug!(
                        session_id = %self.id,
                        reason = reason.as_str(),
                        "Ignoring submit for terminated session"
                    );
                    Ok(SubmitStep::Finished(result.clone()))
                }
                None => Err(SessionError::NotTerminating(self.status)),
            },
        }
    }

    /// Scores the frozen answers against `exam` (the current definition from
    /// the source of truth) and keeps the result. Returns the kept result
    /// without rescoring if this already happened.
    pub fn score_frozen(
        &mut self,
        exam: &Exam,
        now: OffsetDateTime,
    ) -> Result<&ExamResult, SessionError> {
        if self.status != SessionStatus::Terminating {
            return Err(SessionError::NotTerminating(self.status));
        }
        if exam.id != self.exam_id {
            return Err(SessionError::ExamNotFound(self.exam_id.clone()));
        }

        if self.result.is_none() {
            let outcome = score_exam(exam, &self.answers);
            self.scoring_runs += 1;
            metrics::counter!("scoring_runs_total").increment(1);

            let time_spent_seconds =
                self.started_at.map(|started| elapsed_seconds(started, now)).unwrap_or(0);

            self.result = Some(ExamResult {
                id: Some(self.id.to_string()),
                exam_id: self.exam_id.clone(),
                student_id: self.student.id.clone(),
                student_name: self.student.name.clone(),
                exam_title: exam.title.clone(),
                total_questions: outcome.total_questions,
                correct_answers: outcome.correct_answers,
                total_score: outcome.total_score,
                max_score: outcome.max_score,
                answers: self.answers.clone(),
                submitted_at: now,
                time_spent_seconds,
                extra: serde_json::Map::new(),
            });
        }

        self.result.as_ref().ok_or(SessionError::NotTerminating(self.status))
    }

    /// Last step of a submission, once the result has been handed off.
    pub fn finish(&mut self) -> Result<ExamResult, SessionError> {
        if self.status != SessionStatus::Terminating {
            return Err(SessionError::NotTerminating(self.status));
        }
        let result = self.result.clone().ok_or(SessionError::NotTerminating(self.status))?;

        self.status = SessionStatus::Terminated;
        tracing::info!(
            session_id = %self.id,
            exam_id = %self.exam_id,
            correct_answers = result.correct_answers,
            total_score = result.total_score,
            max_score = result.max_score,
            "Exam attempt terminated"
        );
        if let Some(reason) = self.submit_reason {
            metrics::counter!("exam_attempts_submitted_total", "reason" => reason.as_str())
                .increment(1);
        }

        Ok(result)
    }

    /// Synchronous submission for callers that already hold the exam
    /// definition and hand the result off themselves. `exam` is `None` when
    /// the lookup came back empty.
    pub fn submit(
        &mut self,
        reason: SubmitReason,
        exam: Option<&Exam>,
        now: OffsetDateTime,
    ) -> Result<ExamResult, SessionError> {
        if let SubmitStep::Finished(result) = self.begin_submit(reason)? {
            return Ok(result);
        }
        if self.result.is_none() {
            let exam = exam.ok_or_else(|| SessionError::ExamNotFound(self.exam_id.clone()))?;
            self.score_frozen(exam, now)?;
        }
        self.finish()
    }

    /// Throws the attempt away without a result. Only allowed before
    /// termination began; afterwards every operation is rejected with
    /// [`SessionError::Abandoned`] and the clock stays idle.
    pub fn abandon(&mut self) -> Result<(), SessionError> {
        if self.abandoned {
            return Err(SessionError::Abandoned);
        }
        match self.status {
            SessionStatus::NotStarted | SessionStatus::InProgress => {
                self.abandoned = true;
                tracing::info!(session_id = %self.id, exam_id = %self.exam_id, "Exam attempt abandoned");
                metrics::counter!("exam_attempts_abandoned_total").increment(1);
                Ok(())
            }
            SessionStatus::Terminating | SessionStatus::Terminated => {
                Err(SessionError::AlreadySubmitted)
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let question = self.exam.as_ref().and_then(|exam| exam.questions.get(self.current_index));

        SessionSnapshot {
            session_id: self.id,
            exam_id: self.exam_id.clone(),
            status: self.status,
            current_index: self.current_index,
            question_count: self.question_count(),
            answered_count: self.answered_count(),
            remaining_seconds: self.remaining_seconds,
            abandoned: self.abandoned,
            question: question.map(|question| QuestionView {
                id: question.id.clone(),
                text: question.text.clone(),
                options: question.options.clone(),
                points: question.points,
                selected_option: self
                    .answers
                    .get(&question.id)
                    .and_then(|value| value.as_u64())
                    .map(|index| index as usize),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn exam_id(&self) -> &str {
        &self.exam_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    pub fn submit_reason(&self) -> Option<SubmitReason> {
        self.submit_reason
    }

    pub fn result(&self) -> Option<&ExamResult> {
        self.result.as_ref()
    }

    pub fn scoring_runs(&self) -> u32 {
        self.scoring_runs
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    fn question_count(&self) -> usize {
        self.exam.as_ref().map(|exam| exam.questions.len()).unwrap_or(0)
    }

    fn answered_count(&self) -> usize {
        self.exam
            .as_ref()
            .map(|exam| {
                exam.questions
                    .iter()
                    .filter(|question| self.answers.contains_key(&question.id))
                    .count()
            })
            .unwrap_or(0)
    }

    fn ensure_in_progress(&self) -> Result<(), SessionError> {
        if self.abandoned {
            return Err(SessionError::Abandoned);
        }
        match self.status {
            SessionStatus::InProgress => Ok(()),
            SessionStatus::NotStarted => Err(SessionError::NotStarted),
            SessionStatus::Terminating | SessionStatus::Terminated => {
                Err(SessionError::AlreadySubmitted)
            }
        }
    }

    fn question_in_progress(&self, question_id: &str) -> Result<&GradedQuestion, SessionError> {
        self.ensure_in_progress()?;
        self.exam
            .as_ref()
            .and_then(|exam| exam.question(question_id))
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))
    }
}
