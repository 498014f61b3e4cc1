use std::fmt;

/// Errors that can occur in the data layer.
#[derive(Debug)]
pub enum DataError {
    /// A row the caller insisted on is missing. Plain lookups report absence
    /// as `Ok(None)` / `Ok(false)` instead of this.
    NotFound(String),
    /// Metadata is missing or inconsistent (no descriptor and no fallback
    /// table, colliding column mappings, unresolved primary key).
    Configuration(String),
    /// A raw value could not be coerced to its declared semantic type.
    Conversion {
        entity: String,
        field: String,
        raw: String,
    },
    /// The underlying executor is unreachable or a query failed. Not retried
    /// here; retry policy belongs to the executor or its caller.
    Connection(Box<dyn std::error::Error + Send + Sync>),
    Other(String),
}

impl DataError {
    /// Construct a `Connection` variant from any error type.
    ///
    /// Used by backend crates to wrap driver-specific errors.
    pub fn connection(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Connection(Box::new(err))
    }

    /// Construct a `Conversion` variant tagged with the offending field.
    pub fn conversion(
        entity: impl Into<String>,
        field: impl Into<String>,
        raw: impl fmt::Display,
    ) -> Self {
        DataError::Conversion {
            entity: entity.into(),
            field: field.into(),
            raw: raw.to_string(),
        }
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::NotFound(msg) => write!(f, "Not found: {msg}"),
            DataError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            DataError::Conversion { entity, field, raw } => {
                write!(f, "Conversion error on {entity}.{field}: cannot coerce {raw:?}")
            }
            DataError::Connection(err) => write!(f, "Connection error: {err}"),
            DataError::Other(msg) => write!(f, "Data error: {msg}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Connection(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
