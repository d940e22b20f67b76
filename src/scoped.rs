//! Caller-facing scope handle with a closed flag.
//!
//! A [`ScopedLog`] wraps one [`BackgroundLogScope`] for code that logs in a
//! structured block: once the block ends the handle is closed, later messages
//! are silently dropped, and the scope's completion is requested without
//! waiting for it.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::LogError;
use crate::level::MessageLevel;
use crate::scope::{BackgroundLogScope, SharedResult};
use crate::store::stored_now;

/// One message as produced by the code being logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub level: MessageLevel,
    pub text: String,
}

impl LogMessage {
    pub fn new(level: MessageLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

#[derive(Debug)]
pub struct ScopedLog {
    scope: BackgroundLogScope,
    closed: AtomicBool,
    echo_level: Option<MessageLevel>,
}

impl ScopedLog {
    /// Wrap `scope`; messages at or above `echo_level` are also emitted as
    /// `tracing` events.
    pub fn new(scope: BackgroundLogScope, echo_level: Option<MessageLevel>) -> Self {
        Self {
            scope,
            closed: AtomicBool::new(false),
            echo_level,
        }
    }

    pub fn scope(&self) -> &BackgroundLogScope {
        &self.scope
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Log one message. Ignored once the handle is closed.
    pub fn log(&self, level: MessageLevel, text: &str) {
        if self.is_closed() {
            return;
        }
        self.echo(level, text);

        // the scope can still be completed through another handle
        if let Err(err) = self.scope.write_message(level, text) {
            tracing::debug!(scope = self.scope.sequence(), error = %err, "message dropped");
        }
    }

    pub fn log_all<I>(&self, messages: I)
    where
        I: IntoIterator<Item = LogMessage>,
    {
        for message in messages {
            self.log(message.level, &message.text);
        }
    }

    /// Open a nested handle with the same echo level.
    pub fn create_child(&self, name: &str) -> Result<ScopedLog, LogError> {
        if self.is_closed() {
            return Err(LogError::ScopeCompleted {
                name: self.scope.name().to_string(),
            });
        }
        let child = self.scope.create_child_scope(name)?;
        Ok(ScopedLog::new(child, self.echo_level))
    }

    /// Complete the whole subtree and return the awaitable result.
    pub fn complete_all(&self) -> SharedResult<()> {
        self.scope.complete_scope(stored_now())
    }

    /// Close the handle and request completion. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.scope.complete_log_scope();
        }
    }

    fn echo(&self, level: MessageLevel, text: &str) {
        let Some(threshold) = self.echo_level else {
            return;
        };
        if level < threshold {
            return;
        }

        let scope = self.scope.name();
        match level {
            MessageLevel::Debug => tracing::debug!(scope, "{}", text),
            MessageLevel::Information => tracing::info!(scope, "{}", text),
            MessageLevel::Warning => tracing::warn!(scope, "{}", text),
            MessageLevel::Error => tracing::error!(scope, "{}", text),
        }
    }
}
