//! Use-case level error envelope.

use crate::firehose::codec::CodecError;
use crate::repo::error::{RepositoryError, RepositoryErrorCode};
use crate::resolver::ResolverError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Lower-layer failure carried by an [`ApplicationError`].
#[derive(Debug)]
pub enum ApplicationErrorCause {
    Codec(CodecError),
    Resolver(ResolverError),
    Repository(RepositoryError),
}

impl Display for ApplicationErrorCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Codec(err) => write!(f, "{err}"),
            Self::Resolver(err) => write!(f, "{err}"),
            Self::Repository(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ApplicationErrorCause {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Codec(err) => Some(err),
            Self::Resolver(err) => Some(err),
            Self::Repository(err) => Some(err),
        }
    }
}

impl From<CodecError> for ApplicationErrorCause {
    fn from(value: CodecError) -> Self {
        Self::Codec(value)
    }
}

impl From<ResolverError> for ApplicationErrorCause {
    fn from(value: ResolverError) -> Self {
        Self::Resolver(value)
    }
}

impl From<RepositoryError> for ApplicationErrorCause {
    fn from(value: RepositoryError) -> Self {
        Self::Repository(value)
    }
}

/// Failure of one use-case invocation.
///
/// `usecase` names the entry point (`processFirehose`, `listPosts`, ...) and
/// `message` the stage that failed; the lower-layer error is kept intact.
#[derive(Debug)]
pub struct ApplicationError {
    pub usecase: &'static str,
    pub message: &'static str,
    pub cause: Option<ApplicationErrorCause>,
}

impl ApplicationError {
    pub fn new(
        usecase: &'static str,
        message: &'static str,
        cause: impl Into<ApplicationErrorCause>,
    ) -> Self {
        Self {
            usecase,
            message,
            cause: Some(cause.into()),
        }
    }

    /// Repository code of the cause, when the failure came from storage.
    pub fn repository_code(&self) -> Option<RepositoryErrorCode> {
        match &self.cause {
            Some(ApplicationErrorCause::Repository(err)) => Some(err.code),
            _ => None,
        }
    }

    /// Short code for log lines.
    pub fn cause_code(&self) -> &'static str {
        match &self.cause {
            Some(ApplicationErrorCause::Codec(CodecError::MalformedEncoding(_))) => {
                "malformed_encoding"
            }
            Some(ApplicationErrorCause::Codec(CodecError::SchemaViolation { .. })) => {
                "schema_violation"
            }
            Some(ApplicationErrorCause::Resolver(err)) => err.code(),
            Some(ApplicationErrorCause::Repository(err)) => err.code.as_str(),
            None => "none",
        }
    }
}

impl Display for ApplicationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}: {cause}", self.usecase, self.message),
            None => write!(f, "{}: {}", self.usecase, self.message),
        }
    }
}

impl Error for ApplicationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}
