use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use anyhow::anyhow;
use async_trait::async_trait;

use super::{ExamSource, ResultSink};
use crate::schemas::{Exam, ExamResult};

#[derive(Debug, Default)]
pub struct InMemoryExams {
    exams: RwLock<HashMap<String, Exam>>,
}

impl InMemoryExams {
    pub fn new(exams: impl IntoIterator<Item = Exam>) -> Self {
        Self {
            exams: RwLock::new(exams.into_iter().map(|exam| (exam.id.clone(), exam)).collect()),
        }
    }

    /// Withdraws an exam; attempts still running against it fail their
    /// submit with `ExamNotFound` until it comes back.
    pub fn remove(&self, exam_id: &str) -> anyhow::Result<Option<Exam>> {
        Ok(self.exams.write().map_err(|_| anyhow!("exam catalog lock poisoned"))?.remove(exam_id))
    }
}

#[async_trait]
impl ExamSource for InMemoryExams {
    async fn find_exam(&self, exam_id: &str) -> anyhow::Result<Option<Exam>> {
        let exams = self.exams.read().map_err(|_| anyhow!("exam catalog lock poisoned"))?;
        Ok(exams.get(exam_id).cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryResults {
    results: Mutex<Vec<ExamResult>>,
}

impl InMemoryResults {
    pub fn snapshot(&self) -> anyhow::Result<Vec<ExamResult>> {
        Ok(self.results.lock().map_err(|_| anyhow!("result store lock poisoned"))?.clone())
    }
}

#[async_trait]
impl ResultSink for InMemoryResults {
    async fn persist(&self, result: &ExamResult) -> anyhow::Result<()> {
        self.results
            .lock()
            .map_err(|_| anyhow!("result store lock poisoned"))?
            .push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::reference_exam;

    #[tokio::test]
    async fn catalog_resolves_inserted_exams() {
        let catalog = InMemoryExams::new([reference_exam()]);

        let found = catalog.find_exam("exam-1").await.expect("lookup");
        assert_eq!(found.map(|exam| exam.title), Some("Reference exam".to_string()));
        assert!(catalog.find_exam("exam-2").await.expect("lookup").is_none());

        let removed = catalog.remove("exam-1").expect("remove");
        assert_eq!(removed.map(|exam| exam.id), Some("exam-1".to_string()));
        assert!(catalog.find_exam("exam-1").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn result_store_keeps_hand_off_order() {
        let store = InMemoryResults::default();
        let mut first = crate::test_support::scored_result("r1");
        store.persist(&first).await.expect("persist");
        first.id = Some("r2".to_string());
        store.persist(&first).await.expect("persist");

        let ids: Vec<_> =
            store.snapshot().expect("snapshot").into_iter().filter_map(|result| result.id).collect();
        assert_eq!(ids, vec!["r1".to_string(), "r2".to_string()]);
    }
}
