//! Client side: drive a running agent through the signing handshake.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use crate::agent::protocol::{Command, DATA_PREFIX, DIGEST_LEN, HASH_ALGO_SHA256};
use crate::agent::transport::Transport;
use crate::error::{Error, ProtocolError, Result};
use crate::escape::unescape;
use crate::sexp::parse_complete;
use crate::signature::{parse_signature, SignatureValue};

/// Passphrase prompt shown by the agent unless the caller sets another
pub const DEFAULT_DESCRIPTION: &str =
    "Please enter the passphrase to unlock the OpenPGP\nsecret key, to sign a new hardware-based subkey";

/// Everything the agent needs to produce one signature
#[derive(Debug, Clone)]
pub struct SignRequest {
    /// Keygrip of the signing key (hex)
    pub keygrip: String,
    /// SHA-256 digest to sign
    pub digest: Vec<u8>,
    /// Terminal the agent should use for passphrase entry
    pub ttyname: String,
    /// Prompt text, percent-encoded when sent
    pub description: String,
}

impl SignRequest {
    pub fn new(keygrip: impl Into<String>, digest: impl Into<Vec<u8>>, ttyname: impl Into<String>) -> Self {
        Self {
            keygrip: keygrip.into(),
            digest: digest.into(),
            ttyname: ttyname.into(),
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// How a handshake reply is checked
#[derive(Debug, Clone, Copy)]
enum Expect {
    /// Reply starts with `OK`
    OkPrefix,
    /// Reply is exactly `OK`
    Ok,
}

/// Client for a GnuPG-compatible agent
pub struct AgentClient<R, W> {
    transport: Transport<R, W>,
}

impl AgentClient<BufReader<UnixStream>, UnixStream> {
    /// Connect to the agent socket, blocking indefinitely on replies
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path.as_ref())?;
        Ok(Self::new(Transport::from_stream(stream)?))
    }

    /// Connect with a read/write timeout. Passphrase entry happens while the
    /// client waits on `PKSIGN`, so keep this generous.
    pub fn connect_with_timeout(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let stream = UnixStream::connect(path.as_ref())?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        Ok(Self::new(Transport::from_stream(stream)?))
    }
}

impl<R: BufRead, W: Write> AgentClient<R, W> {
    pub fn new(transport: Transport<R, W>) -> Self {
        Self { transport }
    }

    pub fn into_transport(self) -> Transport<R, W> {
        self.transport
    }

    /// Run the full signing handshake and return the agent's signature.
    ///
    /// Any unexpected reply aborts the handshake; the connection should not
    /// be reused afterwards.
    pub fn sign(&mut self, request: &SignRequest) -> Result<SignatureValue> {
        if request.digest.len() != DIGEST_LEN {
            return Err(Error::InvalidDigestLength(request.digest.len()));
        }
        log::info!("Requesting signature from key {}", request.keygrip);

        self.expect(Command::Reset, Expect::OkPrefix)?;
        self.expect(
            Command::Option {
                name: "ttyname".to_string(),
                value: request.ttyname.clone(),
            },
            Expect::Ok,
        )?;
        self.expect(Command::SigKey(request.keygrip.clone()), Expect::Ok)?;
        self.expect(
            Command::SetHash {
                algo: HASH_ALGO_SHA256,
                digest: request.digest.clone(),
            },
            Expect::Ok,
        )?;
        self.expect(Command::SetKeyDesc(request.description.clone()), Expect::Ok)?;
        self.expect(Command::PkSign, Expect::Ok)?;

        let line = self.transport.read_line()?.ok_or(Error::Disconnected)?;
        let line = unescape(&line)?;
        let payload = line.strip_prefix(DATA_PREFIX).ok_or_else(|| {
            ProtocolError::MissingData(String::from_utf8_lossy(&line).into_owned())
        })?;

        let expr = parse_complete(payload)?;
        let signature = parse_signature(&expr)?;
        log::debug!("Agent returned {} signature", signature.algorithm().tag());
        Ok(signature)
    }

    fn expect(&mut self, command: Command, expect: Expect) -> Result<()> {
        let text = command.to_string();
        let reply = self.transport.communicate(&text)?;
        let accepted = match expect {
            Expect::OkPrefix => reply.starts_with(b"OK"),
            Expect::Ok => reply == b"OK",
        };
        if !accepted {
            return Err(ProtocolError::UnexpectedReply {
                command: text,
                reply: String::from_utf8_lossy(&reply).into_owned(),
            }
            .into());
        }
        Ok(())
    }
}
