pub mod attempt;
pub mod normalize;
pub mod scoring;
pub mod session;

pub use attempt::{Attempt, ClockTick};
pub use scoring::{score, score_exam, ScoredOutcome};
pub use session::{ExamSession, Navigation, SessionStatus, Student, SubmitReason};
