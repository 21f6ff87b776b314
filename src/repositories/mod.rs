//! Seams to the external store. The engine never decides how exams and
//! results are persisted; it only needs to look exams up and hand results off.

mod json_file;
mod memory;

use async_trait::async_trait;

use crate::schemas::{Exam, ExamResult};

pub use json_file::{load_exams, load_results, save_results};
pub use memory::{InMemoryExams, InMemoryResults};

#[async_trait]
pub trait ExamSource: Send + Sync {
    /// `Ok(None)` means the exam does not exist; `Err` means the lookup itself failed.
    async fn find_exam(&self, exam_id: &str) -> anyhow::Result<Option<Exam>>;
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(&self, result: &ExamResult) -> anyhow::Result<()>;
}
