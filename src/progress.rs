//! Progress reporting of a remapping run.

use crossbeam_channel::{Sender, TrySendError};

/// A progress update, as sent to a [`ProgressSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The run is about to process `max` compiled units.
    Start {
        /// Total number of compiled units.
        max: usize,
        /// A label for the running task.
        label: String,
    },
    /// `processed` compiled units are done.
    Set(usize),
}

/// Receives progress updates from a run.
///
/// Updates are advisory: a sink may drop any of them. Counts passed to
/// [`set`](Self::set) increase by one per unit, in entry order.
pub trait ProgressSink: Sync {
    /// Called once before the first unit is processed.
    fn start(&self, max: usize, label: &str);

    /// Called after each unit is written.
    fn set(&self, processed: usize);
}

/// Ignores all progress.
impl ProgressSink for () {
    fn start(&self, _max: usize, _label: &str) {}

    fn set(&self, _processed: usize) {}
}

/// Forwards progress as [`ProgressEvent`]s.
///
/// Events are dropped rather than blocking the run when a bounded channel is
/// full or the receiver is gone.
impl ProgressSink for Sender<ProgressEvent> {
    fn start(&self, max: usize, label: &str) {
        let event = ProgressEvent::Start {
            max,
            label: label.to_owned(),
        };
        let _ = self.try_send(event);
    }

    fn set(&self, processed: usize) {
        if let Err(TrySendError::Disconnected(_)) = self.try_send(ProgressEvent::Set(processed)) {
            tracing::trace!(processed, "progress receiver is gone");
        }
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &S {
    fn start(&self, max: usize, label: &str) {
        (**self).start(max, label)
    }

    fn set(&self, processed: usize) {
        (**self).set(processed)
    }
}
