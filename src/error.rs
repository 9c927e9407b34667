//! A dedicated error for all possible errors in DNS queries: I/O, DNS packet
//! unconsistencies, transport verification failures, etc.
//!
//! `DNSError` is deliberately one flat enum rather than a tree of per-module
//! errors: every layer of this crate (codec, transport, resolver) funnels
//! into the same `DNSResult<T>`, which is what lets `resolver::Resolver::check`
//! return a single error type regardless of which sub-state failed.
use std::fmt;
use std::io;
use std::str;

#[derive(Debug)]
pub enum DNSError {
    /// A system I/O error, surfaced verbatim (EINTR and EINPROGRESS/EALREADY
    /// are handled before this variant is ever constructed; see `transport`).
    Io(io::Error),
    FromUtf8(std::string::FromUtf8Error),
    Utf8(str::Utf8Error),
    LoggerError(log::SetLoggerError),
    DNS(String),
    DNSInternalError(InternalError),
    /// Destination buffer too small; the writer rolled `Packet::end` back to
    /// its pre-call value, safe to retry with a larger buffer.
    NoBufs,
    /// Malformed wire data: truncated RR, reserved label bits, pointer loop,
    /// oversize name, inconsistent section counts.
    Illegal(String),
    /// A response failed verification (wrong ID, wrong question) and, where
    /// the caller surfaces it at all, is not otherwise actionable.
    Unknown,
    /// Not a failure: the state machine would block. Callers should wait on
    /// `pollin()`/`pollout()` and call `check()` again.
    Again,
}

#[derive(Debug)]
pub enum InternalError {
    DnsDomainNameTooLong,
    DnsLabelTooLong,
    EmptyDomainName,
    PointerLoop,
    FrameStackOverflow,
}

impl DNSError {
    /// Helper function to create a new DNS error from a string
    pub fn new(s: &str) -> Self {
        DNSError::DNS(String::from(s))
    }

    pub fn illegal(s: impl Into<String>) -> Self {
        DNSError::Illegal(s.into())
    }

    /// True if this is a scheduling signal rather than a real failure.
    pub fn is_again(&self) -> bool {
        matches!(self, DNSError::Again)
    }
}

/// A specific custom `Result` for all functions
pub type DNSResult<T> = Result<T, DNSError>;

impl fmt::Display for DNSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DNSError::Io(e) => write!(f, "I/O error: {}", e),
            DNSError::FromUtf8(e) => write!(f, "invalid utf8: {}", e),
            DNSError::Utf8(e) => write!(f, "invalid utf8: {}", e),
            DNSError::LoggerError(e) => write!(f, "logger error: {}", e),
            DNSError::DNS(s) => write!(f, "{}", s),
            DNSError::DNSInternalError(e) => write!(f, "internal error: {:?}", e),
            DNSError::NoBufs => write!(f, "destination buffer too small"),
            DNSError::Illegal(s) => write!(f, "malformed wire data: {}", s),
            DNSError::Unknown => write!(f, "response failed verification"),
            DNSError::Again => write!(f, "operation would block"),
        }
    }
}

impl std::error::Error for DNSError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DNSError::Io(e) => Some(e),
            DNSError::FromUtf8(e) => Some(e),
            DNSError::Utf8(e) => Some(e),
            DNSError::LoggerError(e) => Some(e),
            _ => None,
        }
    }
}

// All conversions for internal errors into DNSError
impl From<io::Error> for DNSError {
    fn from(err: io::Error) -> Self {
        // A would-block error from a non-blocking socket (and, on connect,
        // EINPROGRESS/EALREADY) is a scheduling signal, not a failure: fold
        // it into Again here so every transport call site gets this for
        // free from `?`. EINTR is NOT folded in here: `transport` retries
        // EINTR internally in a loop, re-entering immediately rather than
        // surfacing Again, since nothing will wake a poll() on it.
        match err.kind() {
            io::ErrorKind::WouldBlock => DNSError::Again,
            _ => DNSError::Io(err),
        }
    }
}

impl From<String> for DNSError {
    fn from(err: String) -> Self {
        DNSError::DNS(err)
    }
}

impl From<std::string::FromUtf8Error> for DNSError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        DNSError::FromUtf8(err)
    }
}

impl From<str::Utf8Error> for DNSError {
    fn from(err: str::Utf8Error) -> Self {
        DNSError::Utf8(err)
    }
}

impl From<log::SetLoggerError> for DNSError {
    fn from(err: log::SetLoggerError) -> Self {
        DNSError::LoggerError(err)
    }
}
