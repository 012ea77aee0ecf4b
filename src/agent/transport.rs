//! Line-oriented transport over a connected byte stream.

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;

use crate::error::{Error, Result};

/// Longest line accepted from a peer, excluding the terminating LF
pub const DEFAULT_MAX_LINE_LEN: usize = 16 * 1024;

/// Reads LF-terminated lines and writes commands or raw replies
pub struct Transport<R, W> {
    reader: R,
    writer: W,
    max_line_len: usize,
}

impl Transport<BufReader<UnixStream>, UnixStream> {
    /// Split a connected socket into a buffered reader and a writer
    pub fn from_stream(stream: UnixStream) -> std::io::Result<Self> {
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self::new(reader, stream))
    }
}

impl<R: BufRead, W: Write> Transport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// Send one command line. Commands may not contain line breaks.
    pub fn send_command(&mut self, command: &str) -> Result<()> {
        if command.contains(['\n', '\r']) {
            return Err(Error::InvalidCommand(command.to_string()));
        }
        log::debug!("-> {}", command);
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Send bytes that are already framed as protocol lines
    pub fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        log::debug!("-> {:?}", String::from_utf8_lossy(data));
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read the next line without its LF.
    ///
    /// Returns `None` once the peer has closed the stream. A final line cut
    /// off by EOF is returned as is.
    pub fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let limit = self.max_line_len as u64 + 1;
        let read = (&mut self.reader).take(limit).read_until(b'\n', &mut line)?;
        if read == 0 {
            return Ok(None);
        }

        if line.last() == Some(&b'\n') {
            line.pop();
        } else if line.len() > self.max_line_len {
            return Err(Error::LineTooLong(self.max_line_len));
        }
        log::debug!("<- {:?}", String::from_utf8_lossy(&line));
        Ok(Some(line))
    }

    /// Send a command and read the single line that answers it
    pub fn communicate(&mut self, command: &str) -> Result<Vec<u8>> {
        self.send_command(command)?;
        self.read_line()?.ok_or(Error::Disconnected)
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}
