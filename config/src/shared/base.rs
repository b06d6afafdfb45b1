use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A numeric field is outside of its allowed range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
    /// A connection name is referenced but has no connection string.
    #[error("connection `{0}` is not configured in `connection_strings`")]
    UnknownConnection(String),
    /// A connection string uses a scheme no connector understands.
    #[error("connection `{name}` has an unsupported scheme, expected one of: {expected}")]
    UnsupportedConnectionScheme { name: String, expected: String },
}
