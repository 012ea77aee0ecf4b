//! The external signing capability the server delegates to.
//!
//! The server only knows the [`SigningCapability`] interface; whether the
//! point comes from a hardware device, a helper program or a test closure is
//! up to the implementation.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;

/// Curves a capability can be asked to operate on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    /// NIST P-256
    #[default]
    Nist256p1,
}

impl Curve {
    pub fn name(self) -> &'static str {
        match self {
            Curve::Nist256p1 => "nist256p1",
        }
    }

    /// Length of an uncompressed point, including the 0x04 prefix
    pub fn point_len(self) -> usize {
        match self {
            Curve::Nist256p1 => 65,
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Curve {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nist256p1" => Ok(Curve::Nist256p1),
            other => Err(format!("unsupported curve {:?}", other)),
        }
    }
}

/// Produces a curve point for a hidden challenge, after showing `prompt`
pub trait SigningCapability {
    fn sign(
        &mut self,
        challenge: &[u8],
        prompt: &str,
        curve: Curve,
    ) -> Result<Vec<u8>, CapabilityError>;
}

impl<F> SigningCapability for F
where
    F: FnMut(&[u8], &str, Curve) -> Result<Vec<u8>, CapabilityError>,
{
    fn sign(
        &mut self,
        challenge: &[u8],
        prompt: &str,
        curve: Curve,
    ) -> Result<Vec<u8>, CapabilityError> {
        self(challenge, prompt, curve)
    }
}

/// Delegates signing to a helper program.
///
/// The helper is run as `<program> <args...> --curve <curve> --prompt <prompt>`,
/// receives the challenge hex-encoded on stdin and must print the point
/// hex-encoded on stdout.
#[derive(Debug, Clone)]
pub struct CommandCapability {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandCapability {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl SigningCapability for CommandCapability {
    fn sign(
        &mut self,
        challenge: &[u8],
        prompt: &str,
        curve: Curve,
    ) -> Result<Vec<u8>, CapabilityError> {
        let mut args = self.args.clone();
        args.extend([
            "--curve".to_string(),
            curve.name().to_string(),
            "--prompt".to_string(),
            prompt.to_string(),
        ]);

        log::debug!(
            "Running signing helper {} for {} byte challenge",
            self.program.display(),
            challenge.len()
        );
        let output = duct::cmd(&self.program, &args)
            .stdin_bytes(hex::encode(challenge))
            .stdout_capture()
            .unchecked()
            .run()
            .map_err(CapabilityError::Spawn)?;

        if !output.status.success() {
            return Err(CapabilityError::Failed(format!(
                "{} exited with {}",
                self.program.display(),
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        hex::decode(stdout.trim()).map_err(|e| CapabilityError::InvalidOutput(e.to_string()))
    }
}
