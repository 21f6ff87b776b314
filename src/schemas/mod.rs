pub mod exam;
pub mod result;

pub use exam::{Exam, Question};
pub use result::{AnswerMap, ExamResult, StoredResult};
