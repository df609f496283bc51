use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{info, warn};

use crate::app::advisor;
use crate::app::config::NotificationSettings;
use crate::app::error::AppError;
use crate::app::notify::{self, NotificationSink};

/// Lifecycle of one batch run. `Idle` is also the state after a completed
/// run has been acknowledged; the two `Completed` states let callers render
/// the summary without replaying per-item events. A cancelled run never
/// reports `CompletedAllSuccess`: skipped items mean the batch did not do
/// everything it was asked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchState {
    Idle,
    Running,
    CompletedAllSuccess,
    CompletedWithFailures,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub label: String,
    pub error: String,
}

/// Everything that can happen during a batch, in the order it happens.
/// Progress is only ever mutated through `reduce`, so every transition is
/// checkable in isolation.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started { total: usize },
    ItemStarted { index: usize, label: String },
    ItemSucceeded { label: String },
    ItemFailed { label: String, error: String },
    Finished { cancelled: bool },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub is_active: bool,
    /// 1-based position within the current batch; 0 until the first item
    /// starts.
    pub current_index: usize,
    pub total: usize,
    pub current_label: Option<String>,
    pub completed_items: Vec<String>,
    pub failed_items: Vec<BatchFailure>,
    pub state: BatchState,
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self {
            is_active: false,
            current_index: 0,
            total: 0,
            current_label: None,
            completed_items: Vec::new(),
            failed_items: Vec::new(),
            state: BatchState::Idle,
        }
    }
}

pub fn reduce(progress: &mut BatchProgress, event: BatchEvent) {
    match event {
        BatchEvent::Started { total } => {
            *progress = BatchProgress {
                is_active: true,
                total,
                state: BatchState::Running,
                ..BatchProgress::default()
            };
        }
        BatchEvent::ItemStarted { index, label } => {
            progress.current_index = index;
            progress.current_label = Some(label);
        }
        BatchEvent::ItemSucceeded { label } => {
            progress.completed_items.push(label);
        }
        BatchEvent::ItemFailed { label, error } => {
            progress.failed_items.push(BatchFailure { label, error });
        }
        BatchEvent::Finished { cancelled } => {
            progress.is_active = false;
            progress.current_label = None;
            progress.state = if cancelled || !progress.failed_items.is_empty() {
                BatchState::CompletedWithFailures
            } else {
                BatchState::CompletedAllSuccess
            };
        }
    }
}

/// What a finished run amounts to. `cancelled` means items past the
/// boundary where the flag was observed were never attempted; they appear
/// in neither list.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub completed: Vec<String>,
    pub failed: Vec<BatchFailure>,
    pub cancelled: bool,
    pub state: BatchState,
}

/// Runs multi-item device operations sequentially with per-item failure
/// isolation. One orchestrator instance serves a session; only one batch
/// may run at a time.
pub struct BatchOperationOrchestrator {
    progress: Mutex<BatchProgress>,
    cancel: AtomicBool,
    sink: Arc<dyn NotificationSink>,
}

impl BatchOperationOrchestrator {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            progress: Mutex::new(BatchProgress::default()),
            cancel: AtomicBool::new(false),
            sink,
        }
    }

    /// Snapshot for progress rendering.
    pub fn progress(&self) -> BatchProgress {
        self.progress.lock().expect("batch progress lock").clone()
    }

    /// Cancellation is cooperative: the flag is consulted between items,
    /// never mid-item, so the in-flight operation always runs to its own
    /// conclusion.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Drives one batch to completion. `op` is invoked once per item in
    /// order; an `Err` is recorded and the run continues. Exactly one
    /// summary notification is dispatched at the end. `on_complete` fires
    /// before the notification so callers can invalidate caches first.
    pub fn run<T>(
        &self,
        kind: &str,
        items: &[T],
        label_of: impl Fn(&T) -> String,
        mut op: impl FnMut(&T, &str) -> Result<(), AppError>,
        settings: &NotificationSettings,
        on_complete: impl FnOnce(&BatchOutcome),
        trace_id: &str,
    ) -> Result<BatchOutcome, AppError> {
        {
            let mut progress = self.progress.lock().expect("batch progress lock");
            if progress.state == BatchState::Running {
                return Err(AppError::validation(
                    "a batch operation is already running",
                    trace_id,
                ));
            }
            self.cancel.store(false, Ordering::SeqCst);
            reduce(&mut progress, BatchEvent::Started { total: items.len() });
        }
        info!(trace_id = %trace_id, kind = %kind, total = items.len(), "batch started");

        let mut cancelled = false;
        for (index, item) in items.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                cancelled = true;
                info!(trace_id = %trace_id, kind = %kind, index, "batch cancelled");
                break;
            }
            let label = label_of(item);
            self.apply(BatchEvent::ItemStarted {
                index: index + 1,
                label: label.clone(),
            });
            match op(item, trace_id) {
                Ok(()) => self.apply(BatchEvent::ItemSucceeded { label }),
                Err(err) => {
                    let hint = advisor::analyze_error(&err.error)
                        .map(|advice| advice.title)
                        .unwrap_or("unclassified");
                    warn!(
                        trace_id = %trace_id,
                        kind = %kind,
                        item = %label,
                        error = %err,
                        hint = %hint,
                        "batch item failed"
                    );
                    self.apply(BatchEvent::ItemFailed {
                        label,
                        error: err.error,
                    });
                }
            }
        }
        self.apply(BatchEvent::Finished { cancelled });

        let snapshot = self.progress();
        let outcome = BatchOutcome {
            completed: snapshot.completed_items.clone(),
            failed: snapshot.failed_items.clone(),
            cancelled,
            state: snapshot.state,
        };
        on_complete(&outcome);

        let mut body = format!(
            "{} succeeded, {} failed",
            outcome.completed.len(),
            outcome.failed.len()
        );
        if cancelled {
            body.push_str(" (cancelled)");
        }
        notify::dispatch(settings, self.sink.as_ref(), &format!("{kind} finished"), &body);

        info!(
            trace_id = %trace_id,
            kind = %kind,
            succeeded = outcome.completed.len(),
            failed = outcome.failed.len(),
            cancelled,
            "batch finished"
        );
        Ok(outcome)
    }

    /// Marks a completed run as seen so the next one may start.
    pub fn acknowledge(&self) {
        let mut progress = self.progress.lock().expect("batch progress lock");
        if progress.state != BatchState::Running {
            *progress = BatchProgress::default();
        }
    }

    fn apply(&self, event: BatchEvent) {
        let mut progress = self.progress.lock().expect("batch progress lock");
        reduce(&mut progress, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::notify::NotificationSink;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingSink {
        notifications: Mutex<Vec<String>>,
    }

    impl NotificationSink for CountingSink {
        fn notify(&self, title: &str, body: &str) {
            self.notifications
                .lock()
                .unwrap()
                .push(format!("{title}: {body}"));
        }
        fn play_sound(&self) {}
    }

    fn settings() -> NotificationSettings {
        NotificationSettings {
            notifications_enabled: true,
            sound_enabled: false,
        }
    }

    #[test]
    fn failures_do_not_stop_the_run() {
        let sink = Arc::new(CountingSink::default());
        let orchestrator = BatchOperationOrchestrator::new(Arc::clone(&sink) as Arc<dyn NotificationSink>);
        let items = vec!["a", "b", "c", "d"];

        let outcome = orchestrator
            .run(
                "Debloat",
                &items,
                |item| item.to_string(),
                |item, trace_id| {
                    if *item == "b" || *item == "d" {
                        Err(AppError::device("pm said no", trace_id))
                    } else {
                        Ok(())
                    }
                },
                &settings(),
                |_| {},
                "trace-1",
            )
            .expect("run");

        assert_eq!(outcome.completed, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(outcome.failed.len(), 2);
        assert_eq!(outcome.failed[0].label, "b");
        assert_eq!(outcome.state, BatchState::CompletedWithFailures);
        assert!(!outcome.cancelled);
        // Exactly one summary, never per-item noise.
        let sent = sink.notifications.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], "Debloat finished: 2 succeeded, 2 failed");
    }

    #[test]
    fn all_success_state_and_order() {
        let orchestrator =
            BatchOperationOrchestrator::new(Arc::new(CountingSink::default()) as Arc<dyn NotificationSink>);
        let items = vec!["x", "y", "z"];
        let outcome = orchestrator
            .run(
                "Backup",
                &items,
                |item| item.to_string(),
                |_, _| Ok(()),
                &settings(),
                |_| {},
                "trace-2",
            )
            .expect("run");
        assert_eq!(outcome.completed, vec!["x", "y", "z"]);
        assert_eq!(outcome.state, BatchState::CompletedAllSuccess);
    }

    #[test]
    fn cancel_takes_effect_at_the_next_item_boundary() {
        let sink = Arc::new(CountingSink::default());
        let orchestrator =
            Arc::new(BatchOperationOrchestrator::new(Arc::clone(&sink) as Arc<dyn NotificationSink>));
        let items = vec!["a", "b", "c"];

        let handle = Arc::clone(&orchestrator);
        let outcome = orchestrator
            .run(
                "Restore",
                &items,
                |item| item.to_string(),
                move |item, _| {
                    if *item == "a" {
                        // Flag set mid-item: "a" still finishes, "b" and "c" never start.
                        handle.request_cancel();
                    }
                    Ok(())
                },
                &settings(),
                |_| {},
                "trace-3",
            )
            .expect("run");

        assert!(outcome.cancelled);
        assert_eq!(outcome.completed, vec!["a"]);
        assert!(outcome.failed.is_empty());
        // Skipped items mean the batch did not finish its work, even though
        // nothing failed outright.
        assert_eq!(outcome.state, BatchState::CompletedWithFailures);
    }

    #[test]
    fn on_complete_sees_the_final_outcome_before_notification() {
        let orchestrator =
            BatchOperationOrchestrator::new(Arc::new(CountingSink::default()) as Arc<dyn NotificationSink>);
        let seen = Mutex::new(None);
        orchestrator
            .run(
                "Backup",
                &["only"],
                |item| item.to_string(),
                |_, _| Ok(()),
                &settings(),
                |outcome| {
                    *seen.lock().unwrap() = Some(outcome.state);
                },
                "trace-4",
            )
            .expect("run");
        assert_eq!(*seen.lock().unwrap(), Some(BatchState::CompletedAllSuccess));
    }

    #[test]
    fn reducer_reports_running_then_completed() {
        let mut progress = BatchProgress::default();
        assert_eq!(progress.current_index, 0);
        reduce(&mut progress, BatchEvent::Started { total: 2 });
        assert!(progress.is_active);
        assert_eq!(progress.state, BatchState::Running);
        reduce(
            &mut progress,
            BatchEvent::ItemStarted {
                index: 1,
                label: "a".into(),
            },
        );
        assert_eq!(progress.current_index, 1);
        reduce(&mut progress, BatchEvent::ItemFailed {
            label: "a".into(),
            error: "boom".into(),
        });
        reduce(&mut progress, BatchEvent::Finished { cancelled: false });
        assert!(!progress.is_active);
        assert_eq!(progress.state, BatchState::CompletedWithFailures);
        assert_eq!(progress.current_label, None);
    }

    #[test]
    fn cancelled_finish_reports_failures_state_without_item_failures() {
        let mut progress = BatchProgress::default();
        reduce(&mut progress, BatchEvent::Started { total: 3 });
        reduce(
            &mut progress,
            BatchEvent::ItemStarted {
                index: 1,
                label: "a".into(),
            },
        );
        reduce(&mut progress, BatchEvent::ItemSucceeded { label: "a".into() });
        reduce(&mut progress, BatchEvent::Finished { cancelled: true });
        assert_eq!(progress.state, BatchState::CompletedWithFailures);
        assert!(progress.failed_items.is_empty());
    }

    #[test]
    fn progress_position_is_one_based_during_items() {
        let orchestrator = Arc::new(BatchOperationOrchestrator::new(
            Arc::new(CountingSink::default()) as Arc<dyn NotificationSink>,
        ));
        let positions = Arc::new(Mutex::new(Vec::new()));
        let handle = Arc::clone(&orchestrator);
        let seen = Arc::clone(&positions);
        orchestrator
            .run(
                "Backup",
                &["x", "y"],
                |item| item.to_string(),
                move |_, _| {
                    seen.lock().unwrap().push(handle.progress().current_index);
                    Ok(())
                },
                &settings(),
                |_| {},
                "trace-5",
            )
            .expect("run");
        assert_eq!(*positions.lock().unwrap(), vec![1, 2]);
    }
}
