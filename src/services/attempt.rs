use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::config::SessionSettings;
use crate::core::time::now_utc;
use crate::errors::SessionError;
use crate::repositories::{ExamSource, ResultSink};
use crate::schemas::ExamResult;
use crate::services::session::{
    ExamSession, Navigation, SessionSnapshot, SessionStatus, Student, SubmitReason, SubmitStep,
    Tick,
};

/// What one clock tick did to the attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ClockTick {
    Running { remaining_seconds: u64 },
    Submitted(ExamResult),
    Stopped,
}

/// One student's attempt, wired to the exam store and the result sink.
///
/// Clones share the same session. The session sits behind an async mutex, so a
/// timer-driven timeout and a user-driven submit are serialized and only the
/// first one to get there scores the attempt.
#[derive(Clone)]
pub struct Attempt {
    inner: Arc<InnerAttempt>,
}

struct InnerAttempt {
    session: Mutex<ExamSession>,
    exams: Arc<dyn ExamSource>,
    sink: Arc<dyn ResultSink>,
    stop: watch::Sender<bool>,
}

impl Attempt {
    pub async fn start(
        exam_id: &str,
        student: Student,
        exams: Arc<dyn ExamSource>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self, SessionError> {
        let exam = exams
            .find_exam(exam_id)
            .await
            .map_err(SessionError::Source)?
            .ok_or_else(|| SessionError::ExamNotFound(exam_id.to_string()))?;

        let mut session = ExamSession::new(exam_id, student);
        session.start(&exam, now_utc())?;

        let (stop, _) = watch::channel(false);
        Ok(Self { inner: Arc::new(InnerAttempt { session: Mutex::new(session), exams, sink, stop }) })
    }

    pub async fn select_answer(
        &self,
        question_id: &str,
        option_index: usize,
    ) -> Result<(), SessionError> {
        self.inner.session.lock().await.select_answer(question_id, option_index)
    }

    pub async fn clear_answer(&self, question_id: &str) -> Result<(), SessionError> {
        self.inner.session.lock().await.clear_answer(question_id)
    }

    pub async fn navigate(&self, target: Navigation) -> Result<usize, SessionError> {
        self.inner.session.lock().await.navigate(target)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.session.lock().await.snapshot()
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.session.lock().await.status()
    }

    pub async fn scoring_runs(&self) -> u32 {
        self.inner.session.lock().await.scoring_runs()
    }

    /// Submits the attempt. Exactly one call scores it; every later call, for
    /// either reason, returns that same result.
    ///
    /// The session lock is held for the whole lookup-score-hand-off sequence
    /// so a termination in flight is never observed half done.
    pub async fn submit(&self, reason: SubmitReason) -> Result<ExamResult, SessionError> {
        let mut session = self.inner.session.lock().await;

        if let SubmitStep::Finished(result) = session.begin_submit(reason)? {
            return Ok(result);
        }

        if session.result().is_none() {
            let exam_id = session.exam_id().to_string();
            let exam = self
                .inner
                .exams
                .find_exam(&exam_id)
                .await
                .map_err(SessionError::Source)?
                .ok_or_else(|| {
                    tracing::error!(exam_id = %exam_id, "Exam vanished before the attempt could be scored");
                    SessionError::ExamNotFound(exam_id.clone())
                })?;
            session.score_frozen(&exam, now_utc())?;
        }

        if let Some(result) = session.result() {
            self.inner.sink.persist(result).await.map_err(|err| {
                tracing::error!(
                    session_id = %session.id(),
                    error = %err,
                    "Failed to hand off exam result; it will be re-sent on the next submit"
                );
                SessionError::Sink(err)
            })?;
        }

        session.finish()
    }

    /// Advances the session clock by one unit and submits on expiry. A session
    /// left `Terminating` by a failed submission is retried on each tick.
    pub async fn tick(&self) -> Result<ClockTick, SessionError> {
        let (tick, status) = {
            let mut session = self.inner.session.lock().await;
            let tick = session.tick();
            (tick, session.status())
        };

        match (tick, status) {
            (Tick::Running { remaining_seconds }, _) => Ok(ClockTick::Running { remaining_seconds }),
            (Tick::Expired, _) | (Tick::Idle, SessionStatus::Terminating) => {
                self.submit(SubmitReason::Timeout).await.map(ClockTick::Submitted)
            }
            (Tick::Idle, _) => Ok(ClockTick::Stopped),
        }
    }

    /// Drives [`Attempt::tick`] every `period` until the attempt is submitted
    /// or abandoned.
    pub fn spawn_clock(&self, period: Duration) -> JoinHandle<()> {
        let attempt = self.clone();
        let mut stop = self.inner.stop.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately.
            ticker.tick().await;

            loop {
                if *stop.borrow() {
                    break;
                }

                tokio::select! {
                    _ = stop.changed() => {}
                    _ = ticker.tick() => match attempt.tick().await {
                        Ok(ClockTick::Running { .. }) => {}
                        Ok(ClockTick::Submitted(_)) | Ok(ClockTick::Stopped) => break,
                        Err(err) => tracing::error!(error = %err, "Timed submission failed; retrying on next tick"),
                    },
                }
            }
        })
    }

    /// [`Attempt::spawn_clock`] at the configured `CBT_TICK_INTERVAL_MS`.
    pub fn spawn_configured_clock(&self, settings: &SessionSettings) -> JoinHandle<()> {
        self.spawn_clock(settings.tick_interval())
    }

    /// Discards the attempt without producing a result. Only allowed while it
    /// is in progress; once termination has begun it must run to completion.
    /// Every clone sees the discard: later submits fail with
    /// [`SessionError::Abandoned`].
    pub async fn abandon(&self) -> Result<(), SessionError> {
        self.inner.session.lock().await.abandon()?;
        let _ = self.inner.stop.send(true);
        Ok(())
    }
}
