//! Error kinds surfaced by lookup operations and filter parsing.
//!
//! Resolution failures ([`ResolveError`]) are recoverable for optional
//! requirements and fatal otherwise; lookup errors wrap them so a caller
//! sees the whole story in one value.

use std::error::Error;
use std::fmt;

use crate::core::resolver::errors::ResolveError;

/// A malformed filter expression.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid filter `{expr}` at offset {pos}: {reason}")]
pub struct InvalidFilterError {
    expr: String,
    pos: usize,
    reason: String,
}

impl InvalidFilterError {
    pub(crate) fn new(expr: &str, pos: usize, reason: &str) -> InvalidFilterError {
        InvalidFilterError {
            expr: expr.to_string(),
            pos,
            reason: reason.to_string(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expr
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

/// A class lookup failure, optionally carrying the wiring diagnostic and
/// the underlying resolve or host error.
#[derive(Debug)]
pub struct ClassNotFoundError {
    name: String,
    diagnostic: Option<String>,
    resolve_error: Option<ResolveError>,
    host_error: Option<anyhow::Error>,
}

impl ClassNotFoundError {
    pub fn new(name: &str) -> ClassNotFoundError {
        ClassNotFoundError {
            name: name.to_string(),
            diagnostic: None,
            resolve_error: None,
            host_error: None,
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: String) -> ClassNotFoundError {
        self.diagnostic = Some(diagnostic);
        self
    }

    pub fn with_resolve_error(mut self, error: ResolveError) -> ClassNotFoundError {
        self.resolve_error = Some(error);
        self
    }

    pub fn with_host_error(mut self, error: anyhow::Error) -> ClassNotFoundError {
        self.host_error = Some(error);
        self
    }

    pub fn class_name(&self) -> &str {
        &self.name
    }

    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    pub fn resolve_error(&self) -> Option<&ResolveError> {
        self.resolve_error.as_ref()
    }
}

impl fmt::Display for ClassNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class `{}` not found", self.name)?;
        if let Some(diagnostic) = &self.diagnostic {
            write!(f, ": {}", diagnostic)?;
        }
        Ok(())
    }
}

impl Error for ClassNotFoundError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        if let Some(error) = &self.resolve_error {
            return Some(error);
        }
        match &self.host_error {
            Some(error) => Some(error.as_ref()),
            None => None,
        }
    }
}

/// A resource lookup failure.
#[derive(Debug)]
pub struct ResourceNotFoundError {
    name: String,
    resolve_error: Option<ResolveError>,
}

impl ResourceNotFoundError {
    pub fn new(name: &str) -> ResourceNotFoundError {
        ResourceNotFoundError {
            name: name.to_string(),
            resolve_error: None,
        }
    }

    pub fn with_resolve_error(mut self, error: ResolveError) -> ResourceNotFoundError {
        self.resolve_error = Some(error);
        self
    }

    pub fn resource_name(&self) -> &str {
        &self.name
    }

    pub fn resolve_error(&self) -> Option<&ResolveError> {
        self.resolve_error.as_ref()
    }
}

impl fmt::Display for ResourceNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource `{}` not found", self.name)
    }
}

impl Error for ResourceNotFoundError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.resolve_error
            .as_ref()
            .map(|error| error as &(dyn Error + 'static))
    }
}
