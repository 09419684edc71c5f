//! # Fatal Errors
//!
//! Renderer failures are program defects: exhausted capacities, broken
//! preconditions, lost devices. Library code reports them as `Result`s so tests
//! can inspect them; applications terminate on them with [`OrFatal`].
//!
//! The workspace profiles build with `panic = "abort"`, so the panic raised
//! here ends the process right after the diagnostic is logged.

use std::fmt::Display;

/// Terminates on error after logging a diagnostic.
pub trait OrFatal<T> {
    /// Returns the success value, or logs `context` with the error and aborts.
    fn or_fatal(self, context: &str) -> T;
}

impl<T, E: Display> OrFatal<T> for Result<T, E> {
    #[track_caller]
    fn or_fatal(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(%err, "fatal: {context}");
                panic!("fatal: {context}: {err}");
            }
        }
    }
}

impl<T> OrFatal<T> for Option<T> {
    #[track_caller]
    fn or_fatal(self, context: &str) -> T {
        match self {
            Some(value) => value,
            None => {
                tracing::error!("fatal: {context}");
                panic!("fatal: {context}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryError;

    #[test]
    fn test_or_fatal_passes_values_through() {
        let ok: Result<u32, MemoryError> = Ok(3);
        assert_eq!(ok.or_fatal("never fails"), 3);
        assert_eq!(Some("x").or_fatal("present"), "x");
    }

    #[test]
    #[should_panic(expected = "fatal: buffer pool: pool exhausted: capacity 4")]
    fn test_or_fatal_panics_with_context() {
        let err: Result<(), MemoryError> = Err(MemoryError::PoolExhausted { capacity: 4 });
        err.or_fatal("buffer pool");
    }
}
