//! Unified error-code contract for Warden errors.
//!
//! Every error enum in the workspace implements [`ErrorCode`] so that
//! embedding applications can branch on stable, machine-readable codes
//! instead of matching display strings.
//!
//! # Code Format
//!
//! - **UPPER_SNAKE_CASE**, prefixed with `WARDEN_` and a layer tag,
//!   e.g. `"WARDEN_STORE_LOAD"`, `"WARDEN_ENGINE_UNREGISTERED_TYPE"`.
//! - **Stable**: once published, a code never changes meaning.
//!
//! # Recoverability
//!
//! An error is recoverable when retrying the operation may succeed
//! (transient I/O, a store that is briefly unavailable). Programmer
//! misuse — querying an unregistered subject type, for instance — is not
//! recoverable: retrying without a code change cannot help.
//!
//! # Example
//!
//! ```
//! use warden_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum LookupError {
//!     Unavailable,
//!     UnknownCollection(String),
//! }
//!
//! impl ErrorCode for LookupError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Unavailable => "WARDEN_LOOKUP_UNAVAILABLE",
//!             Self::UnknownCollection(_) => "WARDEN_LOOKUP_UNKNOWN_COLLECTION",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Unavailable)
//!     }
//! }
//!
//! assert_eq!(LookupError::Unavailable.code(), "WARDEN_LOOKUP_UNAVAILABLE");
//! assert!(LookupError::Unavailable.is_recoverable());
//! ```

/// Machine-readable error code interface.
pub trait ErrorCode {
    /// Returns the stable UPPER_SNAKE_CASE code for this error.
    fn code(&self) -> &'static str;

    /// Returns whether retrying the failed operation may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that an error's code follows Warden conventions.
///
/// # Checks
///
/// 1. Code is non-empty
/// 2. Code starts with `expected_prefix`
/// 3. Code is UPPER_SNAKE_CASE
///
/// # Panics
///
/// Panics with a descriptive message when any check fails. Intended for
/// use in tests that pin down an error enum's full code surface.
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );
    assert!(
        is_upper_snake_case(code),
        "error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Asserts conventions for every variant of an error enum at once.
///
/// # Example
///
/// ```
/// use warden_types::{assert_error_codes, ErrorCode};
///
/// #[derive(Debug)]
/// enum E { A, B }
///
/// impl ErrorCode for E {
///     fn code(&self) -> &'static str {
///         match self {
///             Self::A => "WARDEN_E_A",
///             Self::B => "WARDEN_E_B",
///         }
///     }
///     fn is_recoverable(&self) -> bool { false }
/// }
///
/// assert_error_codes(&[E::A, E::B], "WARDEN_");
/// ```
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
