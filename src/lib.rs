//! Bridge between GnuPG agent clients and an external signing device.
//!
//! The crate speaks the agent's line protocol in both directions: as a client
//! it asks a real `gpg-agent` for a signature, and as a server it stands in
//! for one, forwarding decryption requests to a [`SigningCapability`].

pub mod agent;
pub mod capability;
pub mod error;
pub mod escape;
pub mod gpg;
pub mod sexp;
pub mod signature;

pub use capability::{CommandCapability, Curve, SigningCapability};
pub use error::{CapabilityError, Error, ParseError, ProtocolError, Result};
pub use sexp::SExpr;
pub use signature::{Mpi, SignatureValue};
