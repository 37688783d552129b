// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Custom error types for the idle monitor and the AHA-HTTP client.
//!
//! All fallible public APIs return `Result<T, AhaError>`. A
//! `From<AhaError> for io::Error` conversion is provided so callers that
//! plumb everything through `io::Result` can embed the error without losing
//! the variant (retrievable via [`io::Error::get_ref`] and `downcast_ref`).
//!
//! A failed fetch or switch command is never retried at this layer; the
//! first error terminates the run and is reported to the caller.

use std::fmt;
use std::io;

/// Errors that can occur while talking to a Fritz!Box or running the idle
/// monitor.
#[derive(Debug)]
pub enum AhaError {
    /// Login was rejected or the session became invalid.
    Auth(AuthError),
    /// The device sent a response this client cannot use.
    Parse(ParseError),
    /// Invalid monitor or client configuration.
    Config(ConfigError),
    /// A request or the whole run exceeded its time budget.
    Timeout(TimeoutError),
    /// Underlying I/O error (TCP connect, DNS resolution, socket read).
    Io(io::Error),
}

/// Authentication failures against `login_sid.lua`.
#[derive(Clone, Debug)]
pub enum AuthError {
    /// The box answered the challenge response with the all-zero SID.
    LoginRejected,
    /// A command was answered with HTTP 403; the session ID is no longer
    /// valid.
    SessionExpired,
    /// The login page carried no challenge to answer.
    MissingChallenge,
}

/// Malformed or unusable device responses.
#[derive(Clone, Debug)]
pub enum ParseError {
    /// The HTTP response had no header/body separator or no status line.
    MalformedHttp,
    /// The device answered with an unexpected HTTP status.
    HttpStatus {
        /// The status code received.
        code: u16,
    },
    /// A required XML element was missing from the response.
    MissingElement {
        /// Name of the missing element.
        element: &'static str,
    },
    /// A required attribute was missing from the stats element.
    MissingAttribute {
        /// Name of the missing attribute.
        attribute: &'static str,
    },
    /// A numeric field did not parse.
    InvalidNumber {
        /// Which field failed to parse.
        field: &'static str,
    },
    /// The switch state endpoint returned neither "0" nor "1".
    InvalidSwitchState {
        /// The body that was received instead.
        body: String,
    },
    /// The power statistics held no samples at all.
    EmptyStats,
}

/// Configuration errors reported by the monitor builder.
#[derive(Clone, Debug)]
pub enum ConfigError {
    /// A duration or threshold parameter was zero, negative or non-finite.
    NonPositive {
        /// Name of the offending parameter.
        parameter: &'static str,
    },
    /// The cycle detection precision is outside the supported range.
    PrecisionOutOfRange {
        /// The requested number of digits.
        digits: u32,
    },
}

/// Timeout errors.
#[derive(Clone, Debug)]
pub enum TimeoutError {
    /// A single HTTP request to the box timed out.
    Request,
    /// The caller-supplied deadline for the whole run elapsed before the
    /// switch was turned off.
    Deadline,
}

// ── Display implementations ─────────────────────────────────────────

impl fmt::Display for AhaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AhaError::Auth(e) => write!(f, "authentication error: {e}"),
            AhaError::Parse(e) => write!(f, "device response error: {e}"),
            AhaError::Config(e) => write!(f, "config error: {e}"),
            AhaError::Timeout(e) => write!(f, "timeout: {e}"),
            AhaError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::LoginRejected => write!(f, "login rejected by the box"),
            AuthError::SessionExpired => write!(f, "session ID is no longer valid"),
            AuthError::MissingChallenge => write!(f, "login page carried no challenge"),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MalformedHttp => write!(f, "malformed HTTP response"),
            ParseError::HttpStatus { code } => write!(f, "unexpected HTTP status {code}"),
            ParseError::MissingElement { element } => {
                write!(f, "response is missing the <{element}> element")
            }
            ParseError::MissingAttribute { attribute } => {
                write!(f, "stats element is missing the {attribute} attribute")
            }
            ParseError::InvalidNumber { field } => {
                write!(f, "could not parse numeric field: {field}")
            }
            ParseError::InvalidSwitchState { body } => {
                write!(f, "unusable switch state response: {body:?}")
            }
            ParseError::EmptyStats => write!(f, "power statistics contained no samples"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositive { parameter } => {
                write!(f, "{parameter} must be positive and finite")
            }
            ConfigError::PrecisionOutOfRange { digits } => {
                write!(f, "cycle detection precision out of range: {digits} digits")
            }
        }
    }
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutError::Request => write!(f, "request to the box timed out"),
            TimeoutError::Deadline => write!(f, "deadline elapsed before the switch was idle"),
        }
    }
}

// ── Error trait implementations ─────────────────────────────────────

impl std::error::Error for AhaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AhaError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for AuthError {}
impl std::error::Error for ParseError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for TimeoutError {}

// ── From conversions ────────────────────────────────────────────────

impl From<AhaError> for io::Error {
    fn from(err: AhaError) -> io::Error {
        let kind = match &err {
            AhaError::Auth(_) => io::ErrorKind::PermissionDenied,
            AhaError::Parse(_) => io::ErrorKind::InvalidData,
            AhaError::Config(_) => io::ErrorKind::InvalidInput,
            AhaError::Timeout(_) => io::ErrorKind::TimedOut,
            AhaError::Io(e) => e.kind(),
        };
        // Preserve the original io::Error directly for the Io variant.
        if let AhaError::Io(e) = err {
            return e;
        }
        io::Error::new(kind, err)
    }
}

impl From<io::Error> for AhaError {
    fn from(err: io::Error) -> AhaError {
        AhaError::Io(err)
    }
}

impl From<AuthError> for AhaError {
    fn from(err: AuthError) -> AhaError {
        AhaError::Auth(err)
    }
}

impl From<ParseError> for AhaError {
    fn from(err: ParseError) -> AhaError {
        AhaError::Parse(err)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let e = ParseError::HttpStatus { code: 500 };
        assert_eq!(e.to_string(), "unexpected HTTP status 500");
        let e = ParseError::MissingElement { element: "SID" };
        assert_eq!(e.to_string(), "response is missing the <SID> element");
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::SessionExpired.to_string(),
            "session ID is no longer valid"
        );
    }

    #[test]
    fn test_aha_error_to_io_error_kind() {
        let cases: Vec<(AhaError, io::ErrorKind)> = vec![
            (
                AhaError::Auth(AuthError::LoginRejected),
                io::ErrorKind::PermissionDenied,
            ),
            (
                AhaError::Parse(ParseError::EmptyStats),
                io::ErrorKind::InvalidData,
            ),
            (
                AhaError::Config(ConfigError::NonPositive { parameter: "cycle" }),
                io::ErrorKind::InvalidInput,
            ),
            (
                AhaError::Timeout(TimeoutError::Deadline),
                io::ErrorKind::TimedOut,
            ),
        ];
        for (err, expected_kind) in cases {
            let io_err: io::Error = err.into();
            assert_eq!(io_err.kind(), expected_kind);
        }
    }

    #[test]
    fn test_aha_error_downcast_roundtrip() {
        let err = AhaError::Parse(ParseError::HttpStatus { code: 403 });
        let io_err: io::Error = err.into();
        let inner = io_err
            .get_ref()
            .unwrap()
            .downcast_ref::<AhaError>()
            .unwrap();
        assert!(matches!(
            inner,
            AhaError::Parse(ParseError::HttpStatus { code: 403 })
        ));
    }

    #[test]
    fn test_io_error_passthrough() {
        let orig = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let kind = orig.kind();
        let err = AhaError::Io(orig);
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), kind);
        assert_eq!(io_err.to_string(), "reset");
    }
}
