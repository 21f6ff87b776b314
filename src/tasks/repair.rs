//! Batch recomputation of stored result scores.
//!
//! Every stored result is re-graded with the same scoring function the live
//! session uses. Only the four score fields are ever rewritten, so running the
//! pass again over its own output changes nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::repositories::ExamSource;
use crate::schemas::{ExamResult, StoredResult};
use crate::services::normalize::{gradable_exam, GradableExam};
use crate::services::scoring::{score, ScoredOutcome};

/// Stored and recomputed scores closer than this are the same score.
const SCORE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default)]
pub struct RepairOptions {
    /// Report what would change without touching the results.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The record itself did not parse; it is written back untouched.
    Unreadable(String),
    ExamNotFound,
    NoGradableQuestions,
    LookupFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreadable(err) => write!(f, "unreadable record: {err}"),
            SkipReason::ExamNotFound => write!(f, "exam not found"),
            SkipReason::NoGradableQuestions => write!(f, "exam has no gradable questions"),
            SkipReason::LookupFailed(err) => write!(f, "exam lookup failed: {err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RepairOutcome {
    Fixed { before: ScoredOutcome, after: ScoredOutcome },
    Unchanged,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepairLine {
    pub result: String,
    pub exam_id: String,
    pub outcome: RepairOutcome,
}

impl fmt::Display for RepairLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (exam {}): ", self.result, self.exam_id)?;
        match &self.outcome {
            RepairOutcome::Fixed { before, after } => {
                let mut changes = Vec::new();
                if before.correct_answers != after.correct_answers {
                    changes.push(format!(
                        "correctAnswers {} -> {}",
                        before.correct_answers, after.correct_answers
                    ));
                }
                if !same_score(before.total_score, after.total_score) {
                    changes.push(format!("totalScore {} -> {}", before.total_score, after.total_score));
                }
                if !same_score(before.max_score, after.max_score) {
                    changes.push(format!("maxScore {} -> {}", before.max_score, after.max_score));
                }
                if before.total_questions != after.total_questions {
                    changes.push(format!(
                        "totalQuestions {} -> {}",
                        before.total_questions, after.total_questions
                    ));
                }
                write!(f, "{}", changes.join(", "))
            }
            RepairOutcome::Unchanged => write!(f, "no change"),
            RepairOutcome::Skipped(reason) => write!(f, "skipped, {reason}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairReport {
    pub processed: usize,
    pub fixed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub dry_run: bool,
    pub lines: Vec<RepairLine>,
}

impl fmt::Display for RepairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        write!(
            f,
            "processed={} fixed={} unchanged={} skipped={}{}",
            self.processed,
            self.fixed,
            self.unchanged,
            self.skipped,
            if self.dry_run { " (dry run)" } else { "" }
        )
    }
}

type Resolved = Result<Arc<GradableExam>, SkipReason>;

/// Re-grades `records` in place. A record that cannot be read, or whose exam
/// cannot be resolved or graded, is reported as skipped and left exactly as
/// it was; it never stops the rest of the batch.
pub async fn repair_results(
    records: &mut [StoredResult],
    exams: &dyn ExamSource,
    options: RepairOptions,
) -> RepairReport {
    let mut report = RepairReport { dry_run: options.dry_run, ..RepairReport::default() };
    let mut resolved: HashMap<String, Resolved> = HashMap::new();

    for (position, record) in records.iter_mut().enumerate() {
        report.processed += 1;
        let label = record.label(position);
        let exam_id = record.exam_id().unwrap_or("unknown").to_string();

        let outcome = match record.result() {
            None => RepairOutcome::Skipped(SkipReason::Unreadable(
                record.read_error().unwrap_or_default().to_string(),
            )),
            Some(result) => {
                if !resolved.contains_key(&exam_id) {
                    let resolution = resolve(exams, &exam_id).await;
                    resolved.insert(exam_id.clone(), resolution);
                }

                match resolved.get(&exam_id) {
                    Some(Ok(exam)) => regrade(result, exam),
                    Some(Err(reason)) => RepairOutcome::Skipped(reason.clone()),
                    None => RepairOutcome::Skipped(SkipReason::ExamNotFound),
                }
            }
        };

        match &outcome {
            RepairOutcome::Fixed { after, .. } => {
                if !options.dry_run {
                    if let Some(result) = record.result_mut() {
                        overwrite_scores(result, after);
                    }
                }
                report.fixed += 1;
            }
            RepairOutcome::Unchanged => report.unchanged += 1,
            RepairOutcome::Skipped(reason) => {
                tracing::warn!(result = %label, exam_id = %exam_id, reason = %reason, "Skipping result");
                report.skipped += 1;
            }
        }

        report.lines.push(RepairLine { result: label, exam_id, outcome });
    }

    tracing::info!(
        processed = report.processed,
        fixed = report.fixed,
        unchanged = report.unchanged,
        skipped = report.skipped,
        dry_run = report.dry_run,
        "Repaired stored results"
    );
    metrics::counter!("results_repair_processed_total").increment(report.processed as u64);
    metrics::counter!("results_repaired_total").increment(report.fixed as u64);
    metrics::counter!("results_repair_skipped_total").increment(report.skipped as u64);

    report
}

async fn resolve(exams: &dyn ExamSource, exam_id: &str) -> Resolved {
    match exams.find_exam(exam_id).await {
        Ok(Some(exam)) => {
            let gradable = gradable_exam(&exam);
            if gradable.questions.is_empty() {
                Err(SkipReason::NoGradableQuestions)
            } else {
                Ok(Arc::new(gradable))
            }
        }
        Ok(None) => Err(SkipReason::ExamNotFound),
        Err(err) => {
            tracing::error!(exam_id, error = %err, "Failed to resolve exam for repair");
            Err(SkipReason::LookupFailed(err.to_string()))
        }
    }
}

fn regrade(result: &ExamResult, exam: &GradableExam) -> RepairOutcome {
    let before = stored_outcome(result);
    let after = score(exam, &result.answers);

    if same_outcome(&before, &after) {
        RepairOutcome::Unchanged
    } else {
        RepairOutcome::Fixed { before, after }
    }
}

fn overwrite_scores(result: &mut ExamResult, outcome: &ScoredOutcome) {
    result.correct_answers = outcome.correct_answers;
    result.total_score = outcome.total_score;
    result.max_score = outcome.max_score;
    result.total_questions = outcome.total_questions;
}

fn stored_outcome(result: &ExamResult) -> ScoredOutcome {
    ScoredOutcome {
        correct_answers: result.correct_answers,
        total_score: result.total_score,
        max_score: result.max_score,
        total_questions: result.total_questions,
    }
}

fn same_outcome(stored: &ScoredOutcome, recomputed: &ScoredOutcome) -> bool {
    stored.correct_answers == recomputed.correct_answers
        && stored.total_questions == recomputed.total_questions
        && same_score(stored.total_score, recomputed.total_score)
        && same_score(stored.max_score, recomputed.max_score)
}

fn same_score(left: f64, right: f64) -> bool {
    (left - right).abs() <= SCORE_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryExams;
    use crate::test_support::{answers, reference_exam, FlakySource};
    use serde_json::json;
    use serde_json::value::RawValue;
    use time::macros::datetime;

    fn stored(id: &str, exam_id: &str, correct_answers: u32, total_score: f64) -> ExamResult {
        ExamResult {
            id: Some(id.to_string()),
            exam_id: exam_id.to_string(),
            student_id: "student-1".to_string(),
            student_name: "Ada Lovelace".to_string(),
            exam_title: "Reference exam".to_string(),
            total_questions: 3,
            correct_answers,
            total_score,
            max_score: 4.0,
            answers: answers(&[("q1", json!(1)), ("q2", json!(0)), ("q3", json!(1))]),
            submitted_at: datetime!(2025-03-01 09:30:00 UTC),
            time_spent_seconds: 412,
            extra: serde_json::Map::new(),
        }
    }

    fn records(results: Vec<ExamResult>) -> Vec<StoredResult> {
        results
            .into_iter()
            .map(|result| StoredResult::from_result(result).expect("raw record"))
            .collect()
    }

    fn parsed(records: &[StoredResult]) -> Vec<Option<ExamResult>> {
        records.iter().map(|record| record.result().cloned()).collect()
    }

    fn readable(record: &StoredResult) -> &ExamResult {
        record.result().expect("readable record")
    }

    #[tokio::test]
    async fn legacy_miscount_is_overwritten_and_reported() {
        let exams = InMemoryExams::new([reference_exam()]);
        let original = stored("r1", "exam-1", 1, 1.0);
        let mut results = records(vec![original.clone()]);

        let report = repair_results(&mut results, &exams, RepairOptions::default()).await;

        assert_eq!(report.processed, 1);
        assert_eq!(report.fixed, 1);
        assert_eq!(report.skipped, 0);
        assert!(results[0].is_modified());
        let repaired = readable(&results[0]);
        assert_eq!(repaired.correct_answers, 2);
        assert_eq!(repaired.total_score, 3.0);
        assert_eq!(repaired.max_score, 4.0);

        assert_eq!(repaired.answers, original.answers);
        assert_eq!(repaired.student_id, original.student_id);
        assert_eq!(repaired.submitted_at, original.submitted_at);
        assert_eq!(repaired.time_spent_seconds, original.time_spent_seconds);

        assert_eq!(
            report.lines[0].to_string(),
            "r1 (exam exam-1): correctAnswers 1 -> 2, totalScore 1 -> 3"
        );
    }

    #[tokio::test]
    async fn second_pass_changes_nothing() {
        let exams = InMemoryExams::new([reference_exam()]);
        let mut results = records(vec![
            stored("r1", "exam-1", 1, 1.0),
            stored("r2", "exam-1", 2, 3.0),
            stored("r3", "exam-9", 0, 0.0),
        ]);

        let first = repair_results(&mut results, &exams, RepairOptions::default()).await;
        let after_first = parsed(&results);
        let second = repair_results(&mut results, &exams, RepairOptions::default()).await;

        assert_eq!(first.fixed, 1);
        assert_eq!(second.fixed, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.skipped, 1);
        assert_eq!(parsed(&results), after_first);
        assert!(!results[1].is_modified());
        assert!(!results[2].is_modified());
    }

    #[tokio::test]
    async fn unresolvable_records_are_skipped_not_fatal() {
        let mut empty_exam = reference_exam();
        empty_exam.id = "exam-empty".to_string();
        for question in &mut empty_exam.questions {
            question.correct_option_index = None;
        }
        let exams = InMemoryExams::new([reference_exam(), empty_exam]);

        let mut results = records(vec![
            stored("r1", "exam-missing", 1, 1.0),
            stored("r2", "exam-empty", 1, 1.0),
            stored("r3", "exam-1", 0, 0.0),
        ]);
        let untouched = parsed(&results[..2]);

        let report = repair_results(&mut results, &exams, RepairOptions::default()).await;

        assert_eq!(report.processed, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.fixed, 1);
        assert_eq!(parsed(&results[..2]), untouched);
        assert_eq!(report.lines[0].outcome, RepairOutcome::Skipped(SkipReason::ExamNotFound));
        assert_eq!(report.lines[1].outcome, RepairOutcome::Skipped(SkipReason::NoGradableQuestions));
        assert_eq!(report.lines[0].to_string(), "r1 (exam exam-missing): skipped, exam not found");
    }

    #[tokio::test]
    async fn unreadable_record_is_skipped_and_the_rest_repaired() {
        let exams = InMemoryExams::new([reference_exam()]);
        let bad = r#"{"id":"r2","examId":"exam-1","correctAnswers":null,"submittedAt":"2025-03-01T09:30:00Z"}"#;
        let mut results = records(vec![stored("r1", "exam-1", 1, 1.0)]);
        results.push(StoredResult::parse(
            RawValue::from_string(bad.to_string()).expect("raw record"),
        ));

        let report = repair_results(&mut results, &exams, RepairOptions::default()).await;

        assert_eq!(report.processed, 2);
        assert_eq!(report.fixed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(readable(&results[0]).correct_answers, 2);
        assert!(matches!(report.lines[1].outcome, RepairOutcome::Skipped(SkipReason::Unreadable(_))));
        assert!(report.lines[1].to_string().starts_with("r2 (exam exam-1): skipped, unreadable record"));
        assert_eq!(serde_json::to_string(&results[1]).expect("serialize"), bad);
    }

    #[tokio::test]
    async fn lookup_errors_skip_and_are_resolved_once_per_exam() {
        let source = FlakySource::with(vec![reference_exam()]);
        source.set_failing(true);
        let mut results =
            records(vec![stored("r1", "exam-1", 1, 1.0), stored("r2", "exam-1", 1, 1.0)]);

        let report = repair_results(&mut results, &source, RepairOptions::default()).await;

        assert_eq!(report.skipped, 2);
        assert!(matches!(report.lines[0].outcome, RepairOutcome::Skipped(SkipReason::LookupFailed(_))));
        assert_eq!(source.lookups.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(readable(&results[0]).correct_answers, 1);
    }

    #[tokio::test]
    async fn dry_run_reports_without_writing() {
        let exams = InMemoryExams::new([reference_exam()]);
        let mut results = records(vec![stored("r1", "exam-1", 1, 1.0)]);

        let report = repair_results(&mut results, &exams, RepairOptions { dry_run: true }).await;

        assert_eq!(report.fixed, 1);
        assert!(report.dry_run);
        assert!(!results[0].is_modified());
        assert_eq!(readable(&results[0]).correct_answers, 1);
        assert_eq!(readable(&results[0]).total_score, 1.0);
        assert!(report.to_string().ends_with("processed=1 fixed=1 unchanged=0 skipped=0 (dry run)"));
    }

    #[tokio::test]
    async fn json_round_trip_noise_is_not_a_change() {
        let mut weighted = reference_exam();
        weighted.questions[0].points = Some(json!(0.1));
        weighted.questions[1].points = Some(json!(0.2));
        let exams = InMemoryExams::new([weighted]);

        let mut result = stored("r1", "exam-1", 2, 0.0);
        result.total_score = 0.30000000000000004 - 1e-12;
        result.max_score = 1.3;
        let mut results = records(vec![result]);

        let report = repair_results(&mut results, &exams, RepairOptions::default()).await;
        assert_eq!(report.unchanged, 1);
    }
}
