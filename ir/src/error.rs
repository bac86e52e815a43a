//! The error taxonomy shared by every crate in the backend.
//!
//! Every fallible operation across the IR, ABI, optimizer and codegen crates returns
//! [`Result<T>`]. There is no panicking API surface outside test code: a precondition
//! violation is reported through the matching [`ErrorKind`], never `unwrap`/`expect`.

use failure_derive::Fail;
use std::fmt;

/// Coarse classification of a failure. `analysis-error` and `syntax-error` are source-program
/// faults; every other kind indicates a compiler bug.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An argument violated a documented precondition (bad id, bad width, ...).
    InvalidParameter,
    /// An operation was attempted while the receiver was in a state that forbids it.
    InvalidState,
    /// A well-formed request could not be honoured given the current configuration.
    InvalidRequest,
    /// A requested mutation would violate an invariant the caller must uphold.
    InvalidChange,
    /// A lookup by id or name found nothing.
    NotFound,
    /// An insertion collided with an existing entry that forbids duplicates.
    AlreadyExists,
    /// An index or range fell outside the addressable object.
    OutOfBounds,
    /// The allocator backing a buffer failed to satisfy a request.
    MemoryAllocFailure,
    /// The allocator backing an entity arena failed to satisfy a request.
    ObjectAllocFailure,
    /// An iterator was advanced past its last element.
    IteratorEnd,
    /// A static-analysis pass could not establish the property it was asked to prove.
    AnalysisError,
    /// The input text did not conform to its grammar.
    SyntaxError,
    /// A compiler invariant was violated in a way no `ErrorKind` above names precisely.
    InternalError,
}

impl ErrorKind {
    /// `true` for kinds that reflect a fault in the source program rather than a compiler bug.
    pub fn is_user_fault(self) -> bool {
        matches!(self, ErrorKind::AnalysisError | ErrorKind::SyntaxError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidParameter => "invalid parameter",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::InvalidRequest => "invalid request",
            ErrorKind::InvalidChange => "invalid change",
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::OutOfBounds => "out of bounds",
            ErrorKind::MemoryAllocFailure => "memory allocation failure",
            ErrorKind::ObjectAllocFailure => "object allocation failure",
            ErrorKind::IteratorEnd => "iterator end",
            ErrorKind::AnalysisError => "analysis error",
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::InternalError => "internal error",
        };
        f.write_str(s)
    }
}

/// A backend failure: a [`ErrorKind`] plus a human-readable message naming the offending
/// operation. Carries no resources; the convention across this codebase is that any resource
/// acquired in the failing frame is released by that frame before the error propagates.
#[derive(Debug, Fail)]
#[fail(display = "{}: {}", kind, message)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Build an error of the given kind with a message describing the failed operation.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
        }
    }

    /// The classification of this failure.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Shorthand constructors, one per [`ErrorKind`] variant, for the common case of building an
/// [`Err`] directly at the call site.
macro_rules! error_ctor {
    ($name:ident, $kind:ident) => {
        #[allow(missing_docs)]
        pub fn $name(message: impl Into<String>) -> Error {
            Error::new(ErrorKind::$kind, message)
        }
    };
}

error_ctor!(invalid_parameter, InvalidParameter);
error_ctor!(invalid_state, InvalidState);
error_ctor!(invalid_request, InvalidRequest);
error_ctor!(invalid_change, InvalidChange);
error_ctor!(not_found, NotFound);
error_ctor!(already_exists, AlreadyExists);
error_ctor!(out_of_bounds, OutOfBounds);
error_ctor!(memory_alloc_failure, MemoryAllocFailure);
error_ctor!(object_alloc_failure, ObjectAllocFailure);
error_ctor!(iterator_end, IteratorEnd);
error_ctor!(analysis_error, AnalysisError);
error_ctor!(syntax_error, SyntaxError);
error_ctor!(internal_error, InternalError);

/// The result type returned by every fallible operation in the backend.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_fault_classification() {
        assert!(ErrorKind::SyntaxError.is_user_fault());
        assert!(ErrorKind::AnalysisError.is_user_fault());
        assert!(!ErrorKind::InternalError.is_user_fault());
        assert!(!ErrorKind::NotFound.is_user_fault());
    }

    #[test]
    fn constructors_set_kind() {
        let e = not_found("identifier `foo`");
        assert_eq!(e.kind(), ErrorKind::NotFound);
        assert_eq!(format!("{}", e), "not found: identifier `foo`");
    }
}
