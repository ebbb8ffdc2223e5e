//! Crate-wide error types (§7).
//!
//! Kept close to the teacher's `error.rs`: a single `thiserror`-derived
//! enum with a `ResultExt::with_context` helper, rather than one error type
//! per module. The variants are the error kinds §7 enumerates, not the
//! teacher's GUI/playback concerns.

use std::path::PathBuf;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown ID on any lookup or mutation.
    #[error("not found: {0}")]
    NotFound(String),

    /// Mutation attempted on a virtual playlist.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Rename target already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Empty playlist name, malformed request, etc.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Encoder spawn/IO, transcode cache IO.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Bad XSPF, bad audio tags (when surfaced rather than recorded as a
    /// diagnostic — see `scanrecord::InvalidPlaylist` for the in-scan case).
    #[error("parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::UnsupportedOperation(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    pub fn invalid_input(what: impl Into<String>) -> Self {
        Self::InvalidInput(what.into())
    }

    pub fn transient(what: impl Into<String>) -> Self {
        Self::Transient(what.into())
    }

    pub fn parse(what: impl Into<String>) -> Self {
        Self::Parse(what.into())
    }

    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to `Result`s, matching the teacher's
/// `ResultExt` pattern.
pub trait ResultExt<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

/// Path-flavored not-found helper: the spec's `NotFound` kind is usually
/// keyed by catalog ID, but a couple of filesystem paths want the same
/// treatment (e.g. a playlist file vanishing out from under a mutator).
pub fn not_found_path(path: &PathBuf) -> Error {
    Error::not_found(path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_contains_identifier() {
        let err = Error::not_found("song:abc123");
        assert!(err.to_string().contains("abc123"));
    }

    #[test]
    fn context_wraps_source_message() {
        let err = Error::transient("encoder exited with status 1").context("while transcoding");
        let msg = err.to_string();
        assert!(msg.contains("while transcoding"));
        assert!(msg.contains("encoder exited"));
    }

    #[test]
    fn with_context_extension_trait() {
        let result: Result<()> = Err(Error::invalid_input("empty name"));
        let wrapped = result.with_context("creating playlist");
        assert!(wrapped.unwrap_err().to_string().contains("creating playlist"));
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
