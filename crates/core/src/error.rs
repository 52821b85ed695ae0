use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Request failed, timed out or returned a non-success status.
    Unavailable,
    /// Response arrived but could not be parsed into the expected shape.
    Malformed,
}

/// Failure of an external data source, attached to `anyhow::Error` so callers can
/// downcast when the kind matters.
#[derive(Debug, Clone)]
pub struct SourceError {
    pub source_name: &'static str,
    pub kind: SourceErrorKind,
    pub detail: String,
}

impl SourceError {
    pub fn unavailable(source_name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            source_name,
            kind: SourceErrorKind::Unavailable,
            detail: detail.into(),
        }
    }

    pub fn malformed(source_name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            source_name,
            kind: SourceErrorKind::Malformed,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "source error (source={}, kind={:?}): {}",
            self.source_name, self.kind, self.detail
        )
    }
}

impl std::error::Error for SourceError {}

/// Kind of the first `SourceError` in the chain, if any.
pub fn source_error_kind(err: &anyhow::Error) -> Option<SourceErrorKind> {
    err.downcast_ref::<SourceError>()
        .or_else(|| err.chain().find_map(|e| e.downcast_ref::<SourceError>()))
        .map(|e| e.kind)
}

/// Level a failed fetch is logged at. Malformed payloads are errors; outages and
/// unclassified failures are warnings.
pub fn failure_level(err: &anyhow::Error) -> tracing::Level {
    match source_error_kind(err) {
        Some(SourceErrorKind::Malformed) => tracing::Level::ERROR,
        _ => tracing::Level::WARN,
    }
}

/// Logs a fetch whose signal falls back to unavailable. `subject` names what was being
/// fetched (a stock id or a comma-joined batch).
pub fn log_source_failure(
    source: &'static str,
    subject: &str,
    err: &anyhow::Error,
    what: &str,
) {
    let kind = match source_error_kind(err) {
        Some(SourceErrorKind::Malformed) => "malformed",
        Some(SourceErrorKind::Unavailable) => "unavailable",
        None => "unknown",
    };
    let error = format!("{err:#}");
    if failure_level(err) == tracing::Level::ERROR {
        tracing::error!(source, subject, kind, %error, "{what}");
    } else {
        tracing::warn!(source, subject, kind, %error, "{what}");
    }
}
