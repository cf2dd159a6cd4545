use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    cache::CacheError, config::LoadError, domain::error::DomainError, infra::error::InfraError,
};

/// Failure of a site-model operation.
///
/// `Clone` so coalesced callers of one cached computation can all receive the
/// same rejection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SiteError {
    #[error("upstream request for `{id}` failed: {message}")]
    Upstream { id: String, message: String },
    #[error("fetching `{id}` failed after {attempts} attempts")]
    FetchExhausted { id: String, attempts: u32 },
    #[error("root item `{id}` is missing from its subtree")]
    MissingRoot { id: String },
    #[error("unexpected content shape: {message}")]
    Shape { message: String },
    #[error("properties of `{id}` could not be extracted: {message}")]
    Extract { id: String, message: String },
    #[error("cache codec error: {message}")]
    Codec { message: String },
    #[error("background task aborted: {message}")]
    TaskAborted { message: String },
}

impl SiteError {
    pub fn upstream(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape {
            message: message.into(),
        }
    }

    pub fn extract(id: impl Into<String>, source: &DomainError) -> Self {
        Self::Extract {
            id: id.into(),
            message: source.to_string(),
        }
    }

    /// Terminal errors that a rendering layer should present as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(self, SiteError::MissingRoot { .. })
    }
}

impl From<CacheError> for SiteError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::TaskAborted { key, message } => Self::TaskAborted {
                message: format!("{key}: {message}"),
            },
            other @ (CacheError::Key(_) | CacheError::TypeMismatch { .. }) => Self::Codec {
                message: other.to_string(),
            },
        }
    }
}

/// Top-level error of the command-line binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Site(#[from] SiteError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::NotFound { .. } => 2,
            AppError::Site(error) if error.is_not_found() => 2,
            AppError::Config(_) => 78,
            _ => 1,
        }
    }
}

/// Messages of an error and all of its sources, outermost first.
pub fn error_chain(error: &dyn StdError) -> Vec<String> {
    let mut messages = vec![error.to_string()];
    let mut current = error.source();
    while let Some(inner) = current {
        messages.push(inner.to_string());
        current = inner.source();
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_errors_map_to_site_errors() {
        let aborted = SiteError::from(CacheError::TaskAborted {
            key: "k".into(),
            message: "panicked".into(),
        });
        assert_eq!(
            aborted,
            SiteError::TaskAborted {
                message: "k: panicked".into()
            }
        );

        let codec = SiteError::from(CacheError::Key("bad".into()));
        assert!(matches!(codec, SiteError::Codec { .. }));
    }

    #[test]
    fn exit_codes_distinguish_not_found() {
        assert_eq!(AppError::not_found("post").exit_code(), 2);
        assert_eq!(
            AppError::from(SiteError::MissingRoot { id: "r".into() }).exit_code(),
            2
        );
        assert_eq!(AppError::unexpected("boom").exit_code(), 1);
    }

    #[test]
    fn error_chain_walks_sources() {
        let error = AppError::from(InfraError::Io(std::io::Error::other("disk full")));
        let chain = error_chain(&error);
        assert_eq!(chain.first().map(String::as_str), Some("io error: disk full"));
    }
}
