//! The single seam every stage failure passes through.
//!
//! `CheckpointHandler::process` looks at the policy for one checkpoint and
//! either escalates the failure as `PipelineError::Escalated`, absorbs it
//! silently, or absorbs it while producing a `HandleRecord` and firing the
//! side effects the policy asks for.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

use super::checkpoint::Checkpoint;
use super::policy::{BitPolicy, Flag};
use crate::error::PipelineError;

/// Boxed cause carried by an escalation.
pub type Cause = Box<dyn Error + Send + Sync>;

/// Plain-message cause for failures that have no underlying error value.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Fault(pub String);

impl Fault {
    pub fn boxed(message: impl Into<String>) -> Cause {
        Box::new(Fault(message.into()))
    }
}

/// What a non-silent absorbed failure leaves behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleRecord {
    pub checkpoint: Checkpoint,
    /// Symbol name, or `SYMBOL/feedNNN` for feed checkpoints.
    pub owner: String,
    pub message: String,
    pub cause: String,
    /// The flags that fired.
    pub flags: BitPolicy,
}

impl HandleRecord {
    pub fn reportable(&self) -> bool {
        self.flags.contains(Flag::Report)
    }
}

/// External notification collaborator.
///
/// `notify` fires for the `email` flag. `record` receives the full record
/// for the `dblog` flag; the default implementation drops it.
pub trait Notifier: Send + Sync {
    fn notify(&self, checkpoint: Checkpoint, message: &str);

    fn record(&self, _record: &HandleRecord) {}
}

/// Notifier that only writes to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, checkpoint: Checkpoint, message: &str) {
        tracing::warn!(target: "symcache::notify", %checkpoint, "{message}");
    }

    fn record(&self, record: &HandleRecord) {
        tracing::info!(
            target: "symcache::dblog",
            checkpoint = %record.checkpoint,
            owner = %record.owner,
            "{}",
            record.message
        );
    }
}

/// Evaluates checkpoint policies.
#[derive(Clone)]
pub struct CheckpointHandler {
    notifier: Arc<dyn Notifier>,
}

impl CheckpointHandler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Handle one failure.
    ///
    /// Side effects fire before escalation so a raised failure is still
    /// logged and notified when the policy also asks for that.
    pub fn process(
        &self,
        policy: BitPolicy,
        checkpoint: impl Into<Checkpoint>,
        owner: &str,
        message: impl Into<String>,
        cause: Cause,
    ) -> Result<Option<HandleRecord>, PipelineError> {
        let checkpoint = checkpoint.into();
        let message = message.into();

        if policy.is_silent() {
            tracing::debug!(%checkpoint, owner, "absorbed silently: {message}");
            return Ok(None);
        }

        let record = HandleRecord {
            checkpoint,
            owner: owner.to_string(),
            message,
            cause: cause.to_string(),
            flags: policy,
        };

        for flag in policy.flags() {
            match flag {
                Flag::Stdout => println!(
                    "[{}] {} {}: {} ({})",
                    record.checkpoint, record.owner, flag, record.message, record.cause
                ),
                Flag::Warn => tracing::warn!(
                    checkpoint = %record.checkpoint,
                    owner = %record.owner,
                    cause = %record.cause,
                    "{}",
                    record.message
                ),
                Flag::TxtLog => tracing::info!(
                    target: "symcache::txtlog",
                    checkpoint = %record.checkpoint,
                    owner = %record.owner,
                    cause = %record.cause,
                    "{}",
                    record.message
                ),
                Flag::Email => self.notifier.notify(
                    record.checkpoint,
                    &format!("{}: {}", record.owner, record.message),
                ),
                Flag::DbLog => self.notifier.record(&record),
                Flag::Raise | Flag::Report => {}
            }
        }

        if policy.escalates() {
            return Err(PipelineError::Escalated {
                checkpoint: record.checkpoint,
                owner: record.owner,
                message: record.message,
                cause,
            });
        }
        Ok(Some(record))
    }
}

impl Default for CheckpointHandler {
    fn default() -> Self {
        Self::new(Arc::new(LogNotifier))
    }
}

impl std::fmt::Debug for CheckpointHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointHandler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handling::checkpoint::{FeedCheckpoint, SymbolCheckpoint};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        notified: Mutex<Vec<String>>,
        logged: Mutex<Vec<HandleRecord>>,
    }

    impl Notifier for Recorder {
        fn notify(&self, checkpoint: Checkpoint, message: &str) {
            self.notified
                .lock()
                .unwrap()
                .push(format!("{checkpoint}: {message}"));
        }

        fn record(&self, record: &HandleRecord) {
            self.logged.lock().unwrap().push(record.clone());
        }
    }

    fn handler() -> (CheckpointHandler, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (CheckpointHandler::new(recorder.clone()), recorder)
    }

    #[test]
    fn silent_policy_absorbs_without_record() {
        let (h, rec) = handler();
        let out = h
            .process(
                BitPolicy::SILENT,
                FeedCheckpoint::EmptyFeed,
                "X/feed001",
                "empty",
                Fault::boxed("no rows"),
            )
            .unwrap();
        assert!(out.is_none());
        assert!(rec.notified.lock().unwrap().is_empty());
    }

    #[test]
    fn report_policy_returns_record() {
        let (h, _) = handler();
        let policy = BitPolicy::from_flags([Flag::Report]);
        let record = h
            .process(
                policy,
                FeedCheckpoint::Monounique,
                "X/feed001",
                "duplicate index",
                Fault::boxed("at row 2"),
            )
            .unwrap()
            .unwrap();
        assert_eq!(record.checkpoint, Checkpoint::Feed(FeedCheckpoint::Monounique));
        assert_eq!(record.cause, "at row 2");
        assert!(record.reportable());
    }

    #[test]
    fn raise_escalates_with_its_cause() {
        let (h, _) = handler();
        let err = h
            .process(
                BitPolicy::RAISE.with(Flag::Report),
                SymbolCheckpoint::Concatenation,
                "X",
                "join failed",
                Fault::boxed("index mismatch"),
            )
            .unwrap_err();
        match err {
            PipelineError::Escalated {
                checkpoint, cause, ..
            } => {
                assert_eq!(checkpoint.name(), "concatenation");
                assert_eq!(cause.to_string(), "index mismatch");
            }
            other => panic!("expected escalation, got {other:?}"),
        }
    }

    #[test]
    fn email_and_dblog_reach_the_notifier_even_when_raising() {
        let (h, rec) = handler();
        let policy = BitPolicy::from_flags([Flag::Raise, Flag::Email, Flag::DbLog]);
        let _ = h.process(
            policy,
            SymbolCheckpoint::Aggregation,
            "X",
            "bad row",
            Fault::boxed("inf"),
        );
        assert_eq!(rec.notified.lock().unwrap().len(), 1);
        assert_eq!(rec.logged.lock().unwrap().len(), 1);
    }

    #[test]
    fn record_without_report_flag_is_not_reportable() {
        let (h, _) = handler();
        let record = h
            .process(
                BitPolicy::from_flags([Flag::Stdout]),
                SymbolCheckpoint::Aggregation,
                "X",
                "bad row",
                Fault::boxed("inf"),
            )
            .unwrap()
            .unwrap();
        assert!(!record.reportable());
    }
}
