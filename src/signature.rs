//! Signature values carried in `sig-val` expressions, and the curve point
//! reply sent back for `PKDECRYPT`.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::capability::Curve;
use crate::error::{CapabilityError, ProtocolError};
use crate::sexp::SExpr;

/// Uncompressed point marker
pub const POINT_PREFIX: u8 = 0x04;

/// Unsigned multi-precision integer, stored big-endian without leading zeros
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Mpi(Vec<u8>);

impl Mpi {
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        Mpi(bytes[start..].to_vec())
    }

    /// Minimal big-endian representation; empty for zero
    pub fn as_be_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bits(&self) -> usize {
        match self.0.first() {
            Some(&top) => self.0.len() * 8 - top.leading_zeros() as usize,
            None => 0,
        }
    }
}

impl From<u64> for Mpi {
    fn from(value: u64) -> Self {
        Mpi::from_be_bytes(&value.to_be_bytes())
    }
}

impl fmt::Display for Mpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "00");
        }
        write!(f, "{}", hex::encode_upper(&self.0))
    }
}

impl fmt::Debug for Mpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mpi({})", self)
    }
}

impl Serialize for Mpi {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Signature algorithms an agent may answer `PKSIGN` with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Rsa,
    Ecdsa,
}

impl Algorithm {
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"rsa" => Some(Algorithm::Rsa),
            b"ecdsa" => Some(Algorithm::Ecdsa),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Algorithm::Rsa => "rsa",
            Algorithm::Ecdsa => "ecdsa",
        }
    }

    /// Labels of the signature components, in wire order
    fn labels(self) -> &'static [&'static str] {
        match self {
            Algorithm::Rsa => &["s"],
            Algorithm::Ecdsa => &["r", "s"],
        }
    }
}

/// Numeric signature extracted from a `sig-val` expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum SignatureValue {
    Ecdsa { r: Mpi, s: Mpi },
    Rsa { s: Mpi },
}

impl SignatureValue {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            SignatureValue::Ecdsa { .. } => Algorithm::Ecdsa,
            SignatureValue::Rsa { .. } => Algorithm::Rsa,
        }
    }
}

fn malformed(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedSignature(reason.into())
}

/// Extract the signature from `(sig-val (<algo> (<label> <bytes>)...))`
pub fn parse_signature(expr: &SExpr) -> Result<SignatureValue, ProtocolError> {
    if expr.name() != Some(b"sig-val".as_slice()) {
        return Err(malformed("expression is not a sig-val list"));
    }
    let algo = match expr.children() {
        [algo] => algo,
        other => {
            return Err(malformed(format!(
                "sig-val must hold one algorithm list, found {} children",
                other.len()
            )))
        }
    };
    let tag = algo
        .name()
        .ok_or_else(|| malformed("algorithm is not a named list"))?;
    let algorithm = Algorithm::from_tag(tag).ok_or_else(|| {
        ProtocolError::UnsupportedAlgorithm(String::from_utf8_lossy(tag).into_owned())
    })?;

    let values = component_values(algorithm, algo.children())?;
    match (algorithm, values.as_slice()) {
        (Algorithm::Rsa, [s]) => Ok(SignatureValue::Rsa { s: s.clone() }),
        (Algorithm::Ecdsa, [r, s]) => Ok(SignatureValue::Ecdsa {
            r: r.clone(),
            s: s.clone(),
        }),
        _ => Err(malformed("component count does not match algorithm")),
    }
}

fn component_values(algorithm: Algorithm, children: &[SExpr]) -> Result<Vec<Mpi>, ProtocolError> {
    let labels = algorithm.labels();
    if children.len() != labels.len() {
        return Err(malformed(format!(
            "{} signature needs {} components, found {}",
            algorithm.tag(),
            labels.len(),
            children.len()
        )));
    }

    labels
        .iter()
        .zip(children)
        .map(|(&label, child)| {
            if child.name() != Some(label.as_bytes()) {
                let found = child
                    .name()
                    .map(|n| String::from_utf8_lossy(n).into_owned())
                    .unwrap_or_else(|| "<atom>".to_string());
                return Err(malformed(format!("expected {:?}, found {:?}", label, found)));
            }
            child
                .value()
                .map(Mpi::from_be_bytes)
                .ok_or_else(|| malformed(format!("{:?} does not wrap a single atom", label)))
        })
        .collect()
}

/// Wrap a raw curve point as `(5:value<len>:<point>)`
pub fn encode_point(point: &[u8]) -> SExpr {
    SExpr::list("value", [SExpr::atom(point)])
}

/// Check a point returned by a signing capability against the curve
pub fn validate_point(curve: Curve, point: &[u8]) -> Result<(), CapabilityError> {
    if point.len() != curve.point_len() {
        return Err(CapabilityError::InvalidPointLength {
            expected: curve.point_len(),
            actual: point.len(),
        });
    }
    match point[0] {
        POINT_PREFIX => Ok(()),
        other => Err(CapabilityError::InvalidPointFormat(other)),
    }
}
