//! Error taxonomy for failures that have no natural caller to propagate to.
//!
//! Compute failures and cycles simply unwind to the reader that triggered them: a direct
//! call to [`crate::Derivation::get`] that panics behaves like any other panicking Rust call.
//! Observer callbacks and cleanups, however, run without a caller present once they are
//! driven by a batch drain or a scope disposal, so their panics are caught and routed here
//! instead of aborting unrelated work.

use std::cell::RefCell;
use std::fmt;
use std::panic::Location;

/// The kind of failure reported to an [`ErrorSink`].
#[derive(Debug)]
pub enum ReactiveError {
    /// An observer's callback panicked during a batch drain.
    Callback {
        location: Option<Location<'static>>,
        payload: String,
    },
    /// A cleanup callback (registered via `on_cleanup`) panicked while a scope was disposed
    /// or while an observer was about to re-run.
    Cleanup {
        location: Option<Location<'static>>,
        payload: String,
    },
}

impl fmt::Display for ReactiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactiveError::Callback { location, payload } => {
                write!(f, "observer callback panicked: {payload}")?;
                if let Some(loc) = location {
                    write!(f, " (node created at {loc})")?;
                }
                Ok(())
            }
            ReactiveError::Cleanup { location, payload } => {
                write!(f, "cleanup callback panicked: {payload}")?;
                if let Some(loc) = location {
                    write!(f, " (scope created at {loc})")?;
                }
                Ok(())
            }
        }
    }
}

/// Receives errors that the engine cannot propagate to a synchronous caller.
///
/// Install a custom sink with [`set_error_sink`]. The default sink logs via `tracing::error!`
/// when the `trace` feature is enabled, and to stderr otherwise.
pub trait ErrorSink {
    fn report(&self, error: ReactiveError);
}

struct DefaultSink;

impl ErrorSink for DefaultSink {
    fn report(&self, error: ReactiveError) {
        #[cfg(feature = "trace")]
        tracing::error!("{error}");
        #[cfg(not(feature = "trace"))]
        eprintln!("reactive-graph: {error}");
    }
}

thread_local! {
    static ERROR_SINK: RefCell<Box<dyn ErrorSink>> = RefCell::new(Box::new(DefaultSink));
}

/// Installs a new error sink for the current thread, replacing the default stderr/tracing
/// sink. Returns the previously installed sink.
pub fn set_error_sink(sink: Box<dyn ErrorSink>) -> Box<dyn ErrorSink> {
    ERROR_SINK.with(|cell| cell.replace(sink))
}

pub(crate) fn report(error: ReactiveError) {
    ERROR_SINK.with(|cell| cell.borrow().report(error));
}

/// Extracts a human-readable message from a [`std::panic::catch_unwind`] payload.
pub(crate) fn payload_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
