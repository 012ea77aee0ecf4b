//! Helpers that shell out to the GnuPG tools on behalf of the client.

use std::io;
use std::path::PathBuf;

use expand_tilde::ExpandTilde;

/// Where gpg-agent listens for the default home directory
pub const DEFAULT_AGENT_SOCKET: &str = "~/.gnupg/S.gpg-agent";

pub fn default_agent_socket() -> PathBuf {
    let path = PathBuf::from(DEFAULT_AGENT_SOCKET);
    path.expand_tilde_owned().unwrap_or(path)
}

/// Make sure an agent is running so its socket exists
pub fn launch_agent() -> io::Result<()> {
    log::debug!("Launching gpg-agent");
    duct::cmd!("gpg-connect-agent", "/bye")
        .stdout_null()
        .run()
        .map(|_| ())
}

/// Keygrip of the primary key of `user_id`
pub fn keygrip(user_id: &str) -> io::Result<String> {
    let output = duct::cmd!("gpg2", "--list-keys", "--with-keygrip", user_id).read()?;
    parse_keygrip(&output).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no keygrip listed for {:?}", user_id),
        )
    })
}

/// Controlling terminal, as reported by `tty`
pub fn ttyname() -> io::Result<String> {
    let name = duct::cmd!("tty").read()?;
    Ok(name.trim().to_string())
}

/// First `Keygrip = <hex>` entry of a key listing
pub fn parse_keygrip(listing: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let (label, value) = line.split_once('=')?;
        if label.trim() != "Keygrip" {
            return None;
        }
        let grip = value.trim();
        (!grip.is_empty() && grip.chars().all(|c| c.is_ascii_alphanumeric()))
            .then(|| grip.to_string())
    })
}
