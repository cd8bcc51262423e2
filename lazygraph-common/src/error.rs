// Copyright 2026 lazygraph Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    backtrace::Backtrace,
    fmt::{Debug, Display},
    sync::Arc,
};

use crate::code::ObjectId;

/// All kinds of [`Error`] raised by lazygraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// I/O error.
    Io,
    /// Error raised by an external component, e.g. a user provided loader.
    External,
    /// Invalid configuration.
    Config,
    /// A persisted identity was about to be replaced by a different one.
    ///
    /// This is a consistency violation and must never be retried.
    IdentityMismatch,
    /// The persistence session a loader is bound to has been closed.
    ///
    /// Rebind the reference to a loader of an open session before using it again.
    SessionClosed,
    /// A stored reference has no loader to materialize its value.
    LoaderMissing,
    /// The requested object does not exist.
    NotFound,
    /// Unsupported operation.
    Unsupported,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::Io => "I/O error",
            ErrorKind::External => "External error",
            ErrorKind::Config => "Config error",
            ErrorKind::IdentityMismatch => "Identity mismatch",
            ErrorKind::SessionClosed => "Session closed",
            ErrorKind::LoaderMissing => "Loader missing",
            ErrorKind::NotFound => "Not found",
            ErrorKind::Unsupported => "Unsupported operation",
        }
    }
}

/// The error returned by all fallible lazygraph operations.
///
/// `Display` prints a single line:
///
/// ```shell
/// Identity mismatch, context: { current: 42, given: 43 } => object id is already assigned
/// ```
///
/// `Debug` prints multiple lines with context, source and backtrace (if captured). The alternate `Debug` form
/// (`{:#?}`) prints the conventional struct representation.
pub struct Error {
    kind: ErrorKind,
    message: String,

    context: Vec<(&'static str, String)>,

    source: Option<Arc<anyhow::Error>>,
    backtrace: Option<Arc<Backtrace>>,
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            return f
                .debug_struct("Error")
                .field("kind", &self.kind)
                .field("message", &self.message)
                .field("context", &self.context)
                .field("source", &self.source)
                .field("backtrace", &self.backtrace)
                .finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "  {k}: {v}")?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source:")?;
            writeln!(f, "  {source:#}")?;
        }

        if let Some(backtrace) = &self.backtrace {
            writeln!(f)?;
            writeln!(f, "Backtrace:")?;
            writeln!(f, "{backtrace}")?;
        }

        Ok(())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            let context = self.context.iter().map(|(k, v)| format!("{k}: {v}")).collect::<Vec<_>>();
            write!(f, ", context: {{ {} }}", context.join(", "))?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref().as_ref())
    }
}

/// Cloning shares the source and the backtrace, but copies message and context.
impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            context: self.context.clone(),
            source: self.source.clone(),
            backtrace: self.backtrace.clone(),
        }
    }
}

impl Error {
    /// Create a new error.
    ///
    /// Use [`Error::with_source`] to attach the underlying error:
    ///
    /// ```rust
    /// # use lazygraph_common::error::{Error, ErrorKind};
    /// let io_error = std::io::Error::other("disk unplugged");
    /// Error::new(ErrorKind::Io, "load failed").with_source(io_error);
    /// ```
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: None,
            backtrace: Some(Arc::new(Backtrace::capture())),
        }
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set source for error.
    ///
    /// # Notes
    ///
    /// Setting the source twice panics in debug builds.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(Arc::new(source.into()));
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error context.
    pub fn context(&self) -> &Vec<(&'static str, String)> {
        &self.context
    }

    /// Get the error backtrace.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// Get the error source.
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Downcast the reference of the source error to a specific error type reference.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source.as_deref().and_then(|e| e.downcast_ref::<E>())
    }
}

/// Result type for lazygraph.
pub type Result<T> = std::result::Result<T, Error>;

/// Helper methods for Error.
impl Error {
    /// Helper for creating an [`ErrorKind::IdentityMismatch`] error.
    pub fn identity_mismatch(current: ObjectId, given: ObjectId) -> Self {
        Error::new(ErrorKind::IdentityMismatch, "object id is already assigned")
            .with_context("current", current)
            .with_context("given", given)
    }

    /// Helper for creating an [`ErrorKind::SessionClosed`] error.
    pub fn session_closed(object_id: ObjectId) -> Self {
        Error::new(ErrorKind::SessionClosed, "loader is bound to a closed session").with_context("object_id", object_id)
    }

    /// Helper for creating an [`ErrorKind::LoaderMissing`] error.
    pub fn loader_missing(object_id: ObjectId) -> Self {
        Error::new(ErrorKind::LoaderMissing, "no loader installed for stored reference")
            .with_context("object_id", object_id)
    }

    /// Helper for creating an [`ErrorKind::NotFound`] error.
    pub fn not_found(object_id: ObjectId) -> Self {
        Error::new(ErrorKind::NotFound, "object does not exist").with_context("object_id", object_id)
    }

    /// Helper for creating an [`ErrorKind::Config`] error.
    pub fn config(reason: impl Into<String>) -> Self {
        Error::new(ErrorKind::Config, reason)
    }

    /// Helper for creating an [`ErrorKind::Io`] error from [`std::io::Error`].
    pub fn io_error(source: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, "persistence I/O error").with_source(source)
    }

    /// Helper for creating an error from [`bincode::Error`].
    #[cfg(feature = "serde")]
    pub fn bincode_error(source: bincode::Error) -> Self {
        match *source {
            bincode::ErrorKind::Io(e) => Self::io_error(e),
            _ => Error::new(ErrorKind::External, "coding error").with_source(source),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::io_error(e)
    }
}

#[cfg(feature = "serde")]
impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Self::bincode_error(e)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<Error>();
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct LoaderError(String);

    impl std::fmt::Display for LoaderError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "LoaderError: {}", self.0)
        }
    }

    impl std::error::Error for LoaderError {}

    #[test]
    fn test_identity_mismatch_display() {
        let err = Error::identity_mismatch(ObjectId::new(42), ObjectId::new(43));
        assert_eq!(err.kind(), ErrorKind::IdentityMismatch);
        assert_eq!(
            "Identity mismatch, context: { current: 42, given: 43 } => object id is already assigned",
            err.to_string()
        );
    }

    #[test]
    fn test_error_display_with_source() {
        let err = Error::new(ErrorKind::External, "fetch failed")
            .with_context("object_id", 7)
            .with_source(LoaderError("connection reset".to_string()));
        assert_eq!(
            "External error, context: { object_id: 7 } => fetch failed, source: LoaderError: connection reset",
            err.to_string()
        );
    }

    #[test]
    fn test_error_downcast() {
        let inner = LoaderError("backend unavailable".to_string());
        let err = Error::new(ErrorKind::External, "").with_source(inner.clone());

        let downcasted = err.downcast_ref::<LoaderError>().unwrap();
        assert_eq!(downcasted, &inner);
    }

    #[test]
    fn test_session_closed_is_distinct_from_io() {
        let closed = Error::session_closed(ObjectId::new(1));
        let io = Error::from(std::io::Error::other("broken pipe"));
        assert_eq!(closed.kind(), ErrorKind::SessionClosed);
        assert_eq!(io.kind(), ErrorKind::Io);
        assert_ne!(closed.kind(), io.kind());
    }

    #[test]
    fn test_error_debug_format() {
        let e = Error::not_found(ObjectId::new(9)).with_source(LoaderError("missing".into()));

        let debug = format!("{e:?}");
        assert!(debug.starts_with("Not found => object does not exist"));
        assert!(debug.contains("object_id: 9"));
        assert!(debug.contains("LoaderError: missing"));

        let pretty = format!("{e:#?}");
        assert!(pretty.contains("kind: NotFound"));
    }
}
