//! Error types shared by the codec, the transport and both protocol roles.
//!
//! Every variant aborts the operation in progress. Nothing here is meant to be
//! recovered from mid-handshake; callers retry by starting over.

use std::io;

/// Syntactic failures while decoding wire data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("atom length prefix is missing its ':' separator")]
    MissingSeparator,
    #[error("invalid atom length prefix {0:?}")]
    InvalidLength(String),
    #[error("atom declares {expected} bytes but only {available} remain")]
    Truncated { expected: usize, available: usize },
    #[error("list is not terminated by ')'")]
    UnterminatedList,
    #[error("list does not start with a name atom")]
    MissingListName,
    #[error("nesting exceeds {0} levels")]
    TooDeep(usize),
    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),
    #[error("{0} trailing bytes after expression")]
    TrailingBytes(usize),
}

/// Semantic failures: well-formed data that is not what the protocol expects
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unexpected reply to {command:?}: {reply:?}")]
    UnexpectedReply { command: String, reply: String },
    #[error("expected a data line, got {0:?}")]
    MissingData(String),
    #[error("unsupported signature algorithm {0:?}")]
    UnsupportedAlgorithm(String),
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("ciphertext has no {0:?} field")]
    MissingField(&'static str),
}

/// Failures reported by, or detected in the output of, a signing capability
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("signing capability failed: {0}")]
    Failed(String),
    #[error("signing helper could not be run: {0}")]
    Spawn(#[source] io::Error),
    #[error("signing helper returned invalid output: {0}")]
    InvalidOutput(String),
    #[error("curve point must be {expected} bytes, got {actual}")]
    InvalidPointLength { expected: usize, actual: usize },
    #[error("curve point must start with 0x04, got {0:#04x}")]
    InvalidPointFormat(u8),
}

/// Crate-level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error("peer closed the connection")]
    Disconnected,
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),
    #[error("digest must be 32 bytes, got {0}")]
    InvalidDigestLength(usize),
    #[error("command contains a line break: {0:?}")]
    InvalidCommand(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from(ProtocolError::UnexpectedReply {
            command: "SIGKEY 00".to_string(),
            reply: "ERR 67108881 No secret key".to_string(),
        });
        assert_eq!(
            err.to_string(),
            r#"unexpected reply to "SIGKEY 00": "ERR 67108881 No secret key""#
        );

        let err = Error::from(ParseError::Truncated {
            expected: 4,
            available: 2,
        });
        assert_eq!(err.to_string(), "atom declares 4 bytes but only 2 remain");

        let err = Error::from(CapabilityError::InvalidPointFormat(0x02));
        assert_eq!(err.to_string(), "curve point must start with 0x04, got 0x02");
    }
}
