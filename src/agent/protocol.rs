//! Command and reply vocabulary of the agent line protocol.
//!
//! Commands are single text lines; replies are `OK`, `ERR ...`, status lines
//! (`S ...`), inquiries (`INQUIRE ...`) or data lines (`D <escaped payload>`).

use std::fmt;

use crate::escape::escape;

/// Hash algorithm code for SHA-256 in `SETHASH`
pub const HASH_ALGO_SHA256: u8 = 8;

/// Digest length expected by `SETHASH 8`
pub const DIGEST_LEN: usize = 32;

/// Largest ciphertext the server asks for in `PKDECRYPT`
pub const INQUIRE_MAXLEN: usize = 4096;

/// Sent by the server as soon as a connection is accepted
pub const GREETING: &[u8] = b"OK pleased to see you\n";

pub const OK: &[u8] = b"OK\n";

/// Prefix of a data line
pub const DATA_PREFIX: &[u8] = b"D ";

/// Commands sent by the client during the signing handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reset,
    /// `OPTION <name>=<value>`
    Option { name: String, value: String },
    /// `SIGKEY <keygrip>`
    SigKey(String),
    /// `SETHASH <algo> <hex digest>`
    SetHash { algo: u8, digest: Vec<u8> },
    /// `SETKEYDESC <description>`, percent-encoded on the wire
    SetKeyDesc(String),
    PkSign,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Reset => f.write_str("RESET"),
            Command::Option { name, value } => write!(f, "OPTION {}={}", name, value),
            Command::SigKey(keygrip) => write!(f, "SIGKEY {}", keygrip),
            Command::SetHash { algo, digest } => {
                write!(f, "SETHASH {} {}", algo, hex::encode_upper(digest))
            }
            Command::SetKeyDesc(desc) => write!(f, "SETKEYDESC {}", urlencoding::encode(desc)),
            Command::PkSign => f.write_str("PKSIGN"),
        }
    }
}

/// Commands the server understands; anything else is acknowledged blindly
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GetInfoVersion,
    AgentId,
    PkDecrypt,
    Other(String),
}

impl Request {
    /// Match a command line exactly, without trimming or case folding
    pub fn parse(line: &[u8]) -> Self {
        match line {
            b"GETINFO version" => Request::GetInfoVersion,
            b"AGENT_ID" => Request::AgentId,
            b"PKDECRYPT" => Request::PkDecrypt,
            other => Request::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }
}

/// `D <escaped payload>\nOK\n`
pub fn data_reply(payload: &[u8]) -> Vec<u8> {
    let escaped = escape(payload);
    let mut reply = Vec::with_capacity(escaped.len() + 6);
    reply.extend_from_slice(DATA_PREFIX);
    reply.extend_from_slice(&escaped);
    reply.push(b'\n');
    reply.extend_from_slice(OK);
    reply
}

/// Inquiry sent in response to `PKDECRYPT`
pub fn ciphertext_inquiry() -> Vec<u8> {
    format!("S INQUIRE_MAXLEN {}\nINQUIRE CIPHERTEXT\n", INQUIRE_MAXLEN).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_text() {
        assert_eq!(Command::Reset.to_string(), "RESET");
        assert_eq!(
            Command::Option {
                name: "ttyname".to_string(),
                value: "/dev/pts/3".to_string()
            }
            .to_string(),
            "OPTION ttyname=/dev/pts/3"
        );
        assert_eq!(
            Command::SetHash {
                algo: HASH_ALGO_SHA256,
                digest: vec![0xab, 0x01]
            }
            .to_string(),
            "SETHASH 8 AB01"
        );
        assert_eq!(
            Command::SetKeyDesc("Unlock the\nkey, please".to_string()).to_string(),
            "SETKEYDESC Unlock%20the%0Akey%2C%20please"
        );
        assert_eq!(Command::PkSign.to_string(), "PKSIGN");
    }

    #[test]
    fn test_request_parse() {
        assert_eq!(Request::parse(b"GETINFO version"), Request::GetInfoVersion);
        assert_eq!(Request::parse(b"AGENT_ID"), Request::AgentId);
        assert_eq!(Request::parse(b"PKDECRYPT"), Request::PkDecrypt);
        assert_eq!(
            Request::parse(b"getinfo version"),
            Request::Other("getinfo version".to_string())
        );
        assert_eq!(
            Request::parse(b"PKDECRYPT "),
            Request::Other("PKDECRYPT ".to_string())
        );
    }

    #[test]
    fn test_data_reply() {
        assert_eq!(data_reply(b"2.1.11"), b"D 2.1.11\nOK\n");
        assert_eq!(data_reply(b"50%\n"), b"D 50%25%0A\nOK\n");
    }

    #[test]
    fn test_ciphertext_inquiry() {
        assert_eq!(
            ciphertext_inquiry(),
            b"S INQUIRE_MAXLEN 4096\nINQUIRE CIPHERTEXT\n"
        );
    }
}
