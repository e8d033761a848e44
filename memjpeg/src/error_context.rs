//! Fatal-error and message handling for one decode session.
//!
//! The engine never unwinds on its own. Every fatal condition comes back as an
//! `Err`, and the session hands it to [`ErrorContext::error_exit`] exactly once,
//! which releases any resource still held, records the message, and produces
//! the typed [`DecodeError`] the caller sees.

use log::{error, warn};

use crate::error::{DecodeError, Error, Warning};

/// Severity of a message passed to a [`MessageSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    /// Decode continues.
    Warning,
    /// Decode is aborted.
    Error,
}

/// Receives warnings and error messages produced while decoding.
///
/// Any `FnMut(MessageLevel, &str)` closure is a sink. Without a sink the messages go
/// to the `log` facade.
pub trait MessageSink {
    /// Called once per reported message. Must not panic.
    fn output_message(&mut self, level: MessageLevel, message: &str);
}

impl<F> MessageSink for F
where
    F: FnMut(MessageLevel, &str),
{
    fn output_message(&mut self, level: MessageLevel, message: &str) {
        self(level, message)
    }
}

/// A resource tied to a session that has to be released before a fatal error is reported.
pub trait PendingCleanup {
    /// Releases the resource.
    fn close(self: Box<Self>);
}

impl PendingCleanup for std::fs::File {
    fn close(self: Box<Self>) {
        drop(self);
    }
}

/// Per-session error manager. Created fresh for every decode call.
pub struct ErrorContext<'a> {
    sink: Option<&'a mut dyn MessageSink>,
    pending: Option<Box<dyn PendingCleanup + 'a>>,
    last_message: String,
    num_warnings: u32,
    ran_dry: bool,
    fired: bool,
}

impl<'a> ErrorContext<'a> {
    /// An error context that reports through `log`.
    pub fn new() -> Self {
        Self {
            sink: None,
            pending: None,
            last_message: String::new(),
            num_warnings: 0,
            ran_dry: false,
            fired: false,
        }
    }

    /// Installs `sink` as the output-message hook.
    pub fn with_sink(sink: &'a mut dyn MessageSink) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new()
        }
    }

    /// Attaches a resource to be released on a fatal error. Replaces (and releases) any earlier one.
    pub fn hold(&mut self, resource: Box<dyn PendingCleanup + 'a>) {
        if let Some(previous) = self.pending.replace(resource) {
            previous.close();
        }
    }

    /// Gives back the held resource, if it was never released.
    pub fn release_hold(&mut self) -> Option<Box<dyn PendingCleanup + 'a>> {
        self.pending.take()
    }

    /// Reports a recoverable condition. Only the first warning of a session is emitted,
    /// all of them are counted.
    pub fn warn(&mut self, warning: Warning) {
        if self.num_warnings == 0 {
            match self.sink.as_mut() {
                Some(sink) => sink.output_message(MessageLevel::Warning, &warning.to_string()),
                None => warn!("{}", warning),
            }
        }
        if warning == Warning::JpegEof {
            self.ran_dry = true;
        }
        self.num_warnings = self.num_warnings.saturating_add(1);
    }

    /// Fatal engine error. Converts it into the caller-facing error.
    pub fn error_exit(&mut self, err: Error) -> DecodeError {
        self.raise(err.into())
    }

    /// Fatal error detected outside the engine (color space, allocation).
    pub fn raise(&mut self, err: DecodeError) -> DecodeError {
        if self.fired {
            return DecodeError::EngineInternalError(format!(
                "error handler invoked twice, previous error: {}",
                self.last_message
            ));
        }
        self.fired = true;

        if let Some(resource) = self.pending.take() {
            resource.close();
        }

        self.last_message = err.to_string();
        match self.sink.as_mut() {
            Some(sink) => sink.output_message(MessageLevel::Error, &self.last_message),
            None => error!("{}", self.last_message),
        }
        err
    }

    /// Message of the fatal error, empty if none fired.
    pub fn last_message(&self) -> &str {
        &self.last_message
    }

    /// Number of warnings reported so far, emitted or not.
    pub fn num_warnings(&self) -> u32 {
        self.num_warnings
    }

    /// Whether the source ran out of real data and started supplying EOI markers.
    pub fn ran_dry(&self) -> bool {
        self.ran_dry
    }

    /// Whether a fatal error has been raised in this session.
    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

impl Default for ErrorContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ErrorContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ErrorContext")
            .field("has_sink", &self.sink.is_some())
            .field("has_pending", &self.pending.is_some())
            .field("last_message", &self.last_message)
            .field("num_warnings", &self.num_warnings)
            .field("ran_dry", &self.ran_dry)
            .field("fired", &self.fired)
            .finish()
    }
}
