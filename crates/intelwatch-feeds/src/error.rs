/// Errors raised while fetching from a threat feed.
///
/// A fetch failure is never fatal to a collection cycle: the scheduler logs
/// it and treats the source as having produced zero items.
///
/// # Examples
///
/// ```rust
/// use intelwatch_feeds::error::FetchError;
///
/// let err = FetchError::Timeout {
///     source: "AbuseIPDB".to_string(),
///     timeout_secs: 10,
/// };
/// assert!(err.to_string().contains("AbuseIPDB"));
/// ```
#[derive(Debug)]
pub enum FetchError {
    /// The fetch did not complete within the configured timeout.
    Timeout { source: String, timeout_secs: u64 },

    /// Transport-level failure (connection refused, DNS, broken pipe).
    Transport { source: String, message: String },

    /// The feed responded but its payload could not be interpreted.
    Malformed { source: String, message: String },

    /// The configured provider kind is not registered.
    UnsupportedKind(String),
}

// NOTE: `Display`/`Error` are implemented by hand rather than via
// `#[derive(thiserror::Error)]` because the `source` field here holds the feed
// name (a `String`), not an underlying error. thiserror auto-treats any field
// named `source` as the error source and requires it to implement `Error`,
// which a `String` does not. The messages below are identical to the former
// `#[error(...)]` attributes.
impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Timeout {
                source,
                timeout_secs,
            } => write!(f, "fetch from '{source}' timed out after {timeout_secs}s"),
            FetchError::Transport { source, message } => {
                write!(f, "transport error from '{source}': {message}")
            }
            FetchError::Malformed { source, message } => {
                write!(f, "malformed response from '{source}': {message}")
            }
            FetchError::UnsupportedKind(kind) => write!(f, "unsupported feed kind: {kind}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Errors raised while normalizing a raw feed item into a canonical
/// observation. Recovered per item: the offending item is skipped and counted
/// as a failure without aborting the batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizationError {
    /// The indicator value does not match the grammar of its declared type.
    #[error("invalid {indicator_type} indicator: '{value}'")]
    InvalidIndicator {
        indicator_type: String,
        value: String,
    },

    /// A numeric field is outside its allowed range.
    #[error("field '{field}' out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    /// A required field is absent (or present but unusable).
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },
}
