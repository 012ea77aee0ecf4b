//! Agent server that impersonates gpg-agent on a Unix socket.
//!
//! Connections are served strictly one at a time. `PKDECRYPT` is answered by
//! handing the ciphertext's ephemeral key to a [`SigningCapability`] and
//! returning the resulting curve point; every other command is either
//! answered from configuration or acknowledged with a bare `OK`.

use std::io::{BufRead, Write};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use crate::agent::protocol::{ciphertext_inquiry, data_reply, Request, DATA_PREFIX, GREETING, OK};
use crate::agent::transport::{Transport, DEFAULT_MAX_LINE_LEN};
use crate::capability::{Curve, SigningCapability};
use crate::error::{Error, ProtocolError, Result};
use crate::escape::{escape, unescape};
use crate::sexp::{self, SExpr};
use crate::signature::{encode_point, validate_point};

/// Prompt shown on the signing device for `PKDECRYPT`
pub const DECRYPT_PROMPT: &str = "Decrypt?";

/// Identity the server reports and the parameters it signs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Reported by `GETINFO version`
    pub version: String,
    /// Reported by `AGENT_ID`
    pub agent_id: String,
    pub curve: Curve,
    pub max_line_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: "2.1.11".to_string(),
            agent_id: "TREZOR-GPG".to_string(),
            curve: Curve::Nist256p1,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Peer sent an empty line or disconnected
    Closed,
    /// `PKDECRYPT` was answered, which ends the session
    Decrypted,
}

/// Agent server bound to a Unix socket
pub struct AgentServer<C> {
    listener: UnixListener,
    path: PathBuf,
    config: ServerConfig,
    capability: C,
}

impl<C: SigningCapability> AgentServer<C> {
    /// Bind to `path`, replacing a stale socket file if one exists
    pub fn bind(path: impl AsRef<Path>, config: ServerConfig, capability: C) -> std::io::Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(path)?;
        log::info!("Agent listening on {}", path.display());

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            config,
            capability,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept and serve connections until accepting fails.
    ///
    /// A session that fails is logged and dropped; the next connection is
    /// served normally.
    pub fn run(&mut self) -> std::io::Result<()> {
        loop {
            log::info!("Waiting on {}", self.path.display());
            let (stream, _) = self.listener.accept()?;
            if let Err(e) = self.serve_stream(stream) {
                log::warn!("Aborted agent session: {}", e);
            }
        }
    }

    /// Accept and serve a single connection (useful for testing)
    pub fn accept_one(&mut self) -> Result<SessionEnd> {
        let (stream, _) = self.listener.accept()?;
        self.serve_stream(stream)
    }

    fn serve_stream(&mut self, stream: std::os::unix::net::UnixStream) -> Result<SessionEnd> {
        log::info!("Accepted agent connection");
        let mut transport =
            Transport::from_stream(stream)?.with_max_line_len(self.config.max_line_len);
        serve_session(&mut transport, &self.config, &mut self.capability)
    }
}

/// Run one session over an established transport
pub fn serve_session<R, W, C>(
    transport: &mut Transport<R, W>,
    config: &ServerConfig,
    capability: &mut C,
) -> Result<SessionEnd>
where
    R: BufRead,
    W: Write,
    C: SigningCapability + ?Sized,
{
    transport.send_raw(GREETING)?;

    loop {
        let line = match transport.read_line()? {
            Some(line) if !line.is_empty() => line,
            _ => {
                log::info!("Agent session closed by peer");
                return Ok(SessionEnd::Closed);
            }
        };

        let request = Request::parse(&line);
        log::info!("Got {:?}", request);
        match request {
            Request::PkDecrypt => {
                pk_decrypt(transport, config, capability)?;
                return Ok(SessionEnd::Decrypted);
            }
            request => transport.send_raw(&reply_for(&request, config))?,
        }
    }
}

/// Replies for every command except `PKDECRYPT`
pub fn reply_for(request: &Request, config: &ServerConfig) -> Vec<u8> {
    match request {
        Request::GetInfoVersion => data_reply(config.version.as_bytes()),
        Request::AgentId => data_reply(config.agent_id.as_bytes()),
        // Anything unrecognized is acknowledged
        Request::PkDecrypt | Request::Other(_) => OK.to_vec(),
    }
}

fn pk_decrypt<R, W, C>(
    transport: &mut Transport<R, W>,
    config: &ServerConfig,
    capability: &mut C,
) -> Result<()>
where
    R: BufRead,
    W: Write,
    C: SigningCapability + ?Sized,
{
    transport.send_raw(&ciphertext_inquiry())?;

    let line = transport.read_line()?.ok_or(Error::Disconnected)?;
    let payload = line.strip_prefix(DATA_PREFIX).ok_or_else(|| {
        ProtocolError::MissingData(String::from_utf8_lossy(&line).into_owned())
    })?;
    let payload = unescape(payload)?;
    let (ciphertext, rest) = sexp::parse(&payload)?;
    if !rest.is_empty() {
        log::debug!("Ignoring {} bytes after ciphertext", rest.len());
    }

    let challenge = ephemeral_key(&ciphertext)?;
    log::debug!("Ciphertext ephemeral key: {}", hex::encode(challenge));

    let point = capability.sign(challenge, DECRYPT_PROMPT, config.curve)?;
    validate_point(config.curve, &point)?;
    log::info!("Signing capability returned {} byte point", point.len());

    let value = escape(&encode_point(&point).to_bytes());
    let mut reply = DATA_PREFIX.to_vec();
    reply.extend_from_slice(&value);
    reply.push(b'\n');
    reply.extend_from_slice(OK);
    transport.send_raw(&reply)
}

/// The `e` value of `(enc-val (<algo> ... (e <point>) ...))`
fn ephemeral_key(ciphertext: &SExpr) -> Result<&[u8], ProtocolError> {
    ciphertext
        .children()
        .first()
        .and_then(|algo| algo.find(b"e"))
        .and_then(SExpr::value)
        .ok_or(ProtocolError::MissingField("e"))
}

/// Removes the agent socket file when dropped
pub struct SelfDeletingSocket {
    path: PathBuf,
}

impl SelfDeletingSocket {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for SelfDeletingSocket {
    fn drop(&mut self) {
        log::debug!("Cleaning up agent socket {}", self.path.display());
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapabilityError;
    use crate::sexp::{parse_complete, serialize_atom};
    use std::io::Cursor;

    fn point() -> Vec<u8> {
        let mut point = vec![0x04];
        point.extend_from_slice(&[0u8; 64]);
        point
    }

    fn ciphertext_line(e: &[u8]) -> Vec<u8> {
        let expr = SExpr::list(
            "enc-val",
            [SExpr::list(
                "ecdh",
                [
                    SExpr::list("s", [SExpr::atom(&b"\x01\x02"[..])]),
                    SExpr::list("e", [SExpr::atom(e)]),
                ],
            )],
        );
        let mut line = b"D ".to_vec();
        line.extend_from_slice(&escape(&expr.to_bytes()));
        line.push(b'\n');
        line
    }

    fn run_session<C: SigningCapability>(input: &[u8], capability: &mut C) -> (Result<SessionEnd>, Vec<u8>) {
        let mut transport = Transport::new(Cursor::new(input.to_vec()), Vec::new());
        let result = serve_session(&mut transport, &ServerConfig::default(), capability);
        let (_, written) = transport.into_parts();
        (result, written)
    }

    fn unused_capability(_: &[u8], _: &str, _: Curve) -> std::result::Result<Vec<u8>, CapabilityError> {
        panic!("signing capability should not be called")
    }

    #[test]
    fn test_reply_for_getinfo_version() {
        let config = ServerConfig {
            version: "2.1.11".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(
            reply_for(&Request::parse(b"GETINFO version"), &config),
            b"D 2.1.11\nOK\n"
        );
    }

    #[test]
    fn test_reply_for_agent_id() {
        let config = ServerConfig {
            agent_id: "HW-AGENT".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(
            reply_for(&Request::AgentId, &config),
            b"D HW-AGENT\nOK\n"
        );
    }

    #[test]
    fn test_reply_for_unknown_command() {
        assert_eq!(
            reply_for(&Request::parse(b"FOO BAR"), &ServerConfig::default()),
            b"OK\n"
        );
    }

    #[test]
    fn test_session_closes_on_empty_line() {
        let (result, written) = run_session(
            b"GETINFO version\nOPTION ttyname=/dev/pts/0\n\nAGENT_ID\n",
            &mut unused_capability,
        );
        assert_eq!(result.unwrap(), SessionEnd::Closed);
        assert_eq!(written, b"OK pleased to see you\nD 2.1.11\nOK\nOK\n");
    }

    #[test]
    fn test_session_closes_on_eof() {
        let (result, written) = run_session(b"AGENT_ID\n", &mut unused_capability);
        assert_eq!(result.unwrap(), SessionEnd::Closed);
        assert_eq!(written, b"OK pleased to see you\nD TREZOR-GPG\nOK\n");
    }

    #[test]
    fn test_pkdecrypt() {
        // Ephemeral key containing bytes that need escaping on the wire
        let mut e = vec![0x04, b'%', b'\n', b'\r'];
        e.extend_from_slice(&[0x11; 61]);

        let mut input = b"RESET\nPKDECRYPT\n".to_vec();
        input.extend_from_slice(&ciphertext_line(&e));
        input.extend_from_slice(b"END\nGETINFO version\n");

        let mut calls = Vec::new();
        let mut capability = |challenge: &[u8],
                              prompt: &str,
                              curve: Curve|
         -> std::result::Result<Vec<u8>, CapabilityError> {
            calls.push((challenge.to_vec(), prompt.to_string(), curve));
            Ok(point())
        };
        let (result, written) = run_session(&input, &mut capability);
        assert_eq!(result.unwrap(), SessionEnd::Decrypted);
        assert_eq!(calls, vec![(e, DECRYPT_PROMPT.to_string(), Curve::Nist256p1)]);

        let mut expected = b"OK pleased to see you\nOK\nS INQUIRE_MAXLEN 4096\nINQUIRE CIPHERTEXT\n".to_vec();
        assert!(written.starts_with(&expected));
        let reply = &written[expected.len()..];
        assert!(reply.ends_with(b"\nOK\n"));

        // Session ends after PKDECRYPT; GETINFO is never answered
        let data = reply
            .strip_prefix(b"D ")
            .and_then(|r| r.strip_suffix(b"\nOK\n"))
            .unwrap();
        let parsed = parse_complete(&unescape(data).unwrap()).unwrap();
        assert_eq!(parsed.name(), Some(&b"value"[..]));
        assert_eq!(parsed.value(), Some(point().as_slice()));

        expected.clear();
        expected.extend_from_slice(b"(5:value");
        expected.extend_from_slice(&serialize_atom(&point()));
        expected.push(b')');
        assert_eq!(unescape(data).unwrap(), expected);
    }

    #[test]
    fn test_pkdecrypt_rejects_bad_point() {
        let mut input = b"PKDECRYPT\n".to_vec();
        input.extend_from_slice(&ciphertext_line(&[0x04; 65]));

        let mut short = |_: &[u8], _: &str, _: Curve| -> std::result::Result<Vec<u8>, CapabilityError> {
            Ok(vec![0x04; 33])
        };
        let (result, written) = run_session(&input, &mut short);
        assert!(matches!(
            result,
            Err(Error::Capability(CapabilityError::InvalidPointLength {
                expected: 65,
                actual: 33
            }))
        ));
        assert!(written.ends_with(b"INQUIRE CIPHERTEXT\n"));

        let mut compressed = |_: &[u8], _: &str, _: Curve| -> std::result::Result<Vec<u8>, CapabilityError> {
            Ok(vec![0x02; 65])
        };
        let (result, _) = run_session(&input, &mut compressed);
        assert!(matches!(
            result,
            Err(Error::Capability(CapabilityError::InvalidPointFormat(0x02)))
        ));

        let mut failing = |_: &[u8], _: &str, _: Curve| -> std::result::Result<Vec<u8>, CapabilityError> {
            Err(CapabilityError::Failed("user cancelled".to_string()))
        };
        let (result, _) = run_session(&input, &mut failing);
        assert!(matches!(
            result,
            Err(Error::Capability(CapabilityError::Failed(_)))
        ));
    }

    #[test]
    fn test_pkdecrypt_requires_data_line() {
        let (result, _) = run_session(b"PKDECRYPT\nEND\n", &mut unused_capability);
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::MissingData(_)))
        ));

        let (result, _) = run_session(b"PKDECRYPT\n", &mut unused_capability);
        assert!(matches!(result, Err(Error::Disconnected)));
    }

    #[test]
    fn test_pkdecrypt_requires_ephemeral_key() {
        let (result, _) = run_session(
            b"PKDECRYPT\nD (7:enc-val(4:ecdh(1:s1:\x01)))\n",
            &mut unused_capability,
        );
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::MissingField("e")))
        ));

        let (result, _) = run_session(b"PKDECRYPT\nD (7:enc-val\n", &mut unused_capability);
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_bind_and_accept_one() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("gnupg").join("S.gpg-agent");
        // Stale file from a previous run
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::File::create(&path).unwrap();

        let mut server =
            AgentServer::bind(&path, ServerConfig::default(), unused_capability).unwrap();
        assert_eq!(server.path(), path.as_path());

        let client_path = path.clone();
        let client = std::thread::spawn(move || {
            let stream = std::os::unix::net::UnixStream::connect(client_path).unwrap();
            let mut transport = Transport::from_stream(stream).unwrap();
            let greeting = transport.read_line().unwrap();
            let reply = transport.communicate("GETINFO version").unwrap();
            let data_ok = transport.read_line().unwrap();
            transport.send_command("").unwrap();
            (greeting, reply, data_ok)
        });

        assert_eq!(server.accept_one().unwrap(), SessionEnd::Closed);
        let (greeting, reply, data_ok) = client.join().unwrap();
        assert_eq!(greeting, Some(b"OK pleased to see you".to_vec()));
        assert_eq!(reply, b"D 2.1.11");
        assert_eq!(data_ok, Some(b"OK".to_vec()));
    }

    #[test]
    fn test_self_deleting_socket() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("S.gpg-agent");
        std::fs::File::create(&path).unwrap();

        drop(SelfDeletingSocket::new(path.clone()));
        assert!(!path.exists());
    }
}
