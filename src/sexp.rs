//! Canonical S-expressions as used in agent payloads.
//!
//! Only the subset the agent protocol needs is supported:
//! ```text
//! atom := <decimal length> ":" <raw bytes>
//! list := "(" atom expr* ")"
//! ```
//! The first atom of a list names it, e.g. `(7:sig-val(3:rsa(1:s1:\x01)))`.

use crate::error::ParseError;

/// Maximum nesting of lists accepted by [`parse`]
pub const MAX_DEPTH: usize = 32;

/// A parsed canonical S-expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SExpr {
    Atom(Vec<u8>),
    /// All children, including the leading name atom
    List(Vec<SExpr>),
}

impl SExpr {
    pub fn atom(bytes: impl Into<Vec<u8>>) -> Self {
        SExpr::Atom(bytes.into())
    }

    /// Build a list named `name` with the given children
    pub fn list(name: impl Into<Vec<u8>>, children: impl IntoIterator<Item = SExpr>) -> Self {
        let mut items = vec![SExpr::Atom(name.into())];
        items.extend(children);
        SExpr::List(items)
    }

    pub fn as_atom(&self) -> Option<&[u8]> {
        match self {
            SExpr::Atom(bytes) => Some(bytes),
            SExpr::List(_) => None,
        }
    }

    /// Name of a list; `None` for atoms
    pub fn name(&self) -> Option<&[u8]> {
        match self {
            SExpr::List(items) => items.first().and_then(SExpr::as_atom),
            SExpr::Atom(_) => None,
        }
    }

    /// Children of a list following its name
    pub fn children(&self) -> &[SExpr] {
        match self {
            SExpr::List(items) if !items.is_empty() => &items[1..],
            _ => &[],
        }
    }

    /// First child list named `label`
    pub fn find(&self, label: &[u8]) -> Option<&SExpr> {
        self.children()
            .iter()
            .find(|child| child.name() == Some(label))
    }

    /// Payload of a labeled value such as `(1:e3:abc)`
    pub fn value(&self) -> Option<&[u8]> {
        match self.children() {
            [value] => value.as_atom(),
            _ => None,
        }
    }

    /// Canonical wire form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            SExpr::Atom(bytes) => write_atom(out, bytes),
            SExpr::List(items) => {
                out.push(b'(');
                for item in items {
                    item.write_to(out);
                }
                out.push(b')');
            }
        }
    }
}

/// Parse one expression from the front of `buf`, returning it with whatever
/// follows it.
pub fn parse(buf: &[u8]) -> Result<(SExpr, &[u8]), ParseError> {
    parse_expr(buf, 0)
}

/// Parse `buf` as exactly one expression with nothing after it
pub fn parse_complete(buf: &[u8]) -> Result<SExpr, ParseError> {
    let (expr, rest) = parse(buf)?;
    if !rest.is_empty() {
        return Err(ParseError::TrailingBytes(rest.len()));
    }
    Ok(expr)
}

pub fn serialize_atom(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 8);
    write_atom(&mut out, bytes);
    out
}

/// Serialize a list from its name and already-serialized children
pub fn serialize_list<I>(name: &[u8], children: I) -> Vec<u8>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut out = vec![b'('];
    write_atom(&mut out, name);
    for child in children {
        out.extend_from_slice(child.as_ref());
    }
    out.push(b')');
    out
}

fn write_atom(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
}

fn parse_expr(buf: &[u8], depth: usize) -> Result<(SExpr, &[u8]), ParseError> {
    match buf.first() {
        None => Err(ParseError::UnexpectedEnd),
        Some(b'(') => parse_list(&buf[1..], depth + 1),
        Some(_) => {
            let (atom, rest) = parse_atom(buf)?;
            Ok((SExpr::Atom(atom.to_vec()), rest))
        }
    }
}

fn parse_list(mut buf: &[u8], depth: usize) -> Result<(SExpr, &[u8]), ParseError> {
    if depth > MAX_DEPTH {
        return Err(ParseError::TooDeep(MAX_DEPTH));
    }

    let name = match buf.first() {
        None => return Err(ParseError::UnterminatedList),
        Some(b'(') | Some(b')') => return Err(ParseError::MissingListName),
        Some(_) => {
            let (name, rest) = parse_atom(buf)?;
            buf = rest;
            name
        }
    };

    let mut items = vec![SExpr::Atom(name.to_vec())];
    loop {
        match buf.first() {
            None => return Err(ParseError::UnterminatedList),
            Some(b')') => return Ok((SExpr::List(items), &buf[1..])),
            Some(_) => {
                let (child, rest) = parse_expr(buf, depth)?;
                items.push(child);
                buf = rest;
            }
        }
    }
}

fn parse_atom(buf: &[u8]) -> Result<(&[u8], &[u8]), ParseError> {
    let colon = buf
        .iter()
        .position(|&b| b == b':')
        .ok_or(ParseError::MissingSeparator)?;
    let digits = &buf[..colon];

    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(ParseError::InvalidLength(
            String::from_utf8_lossy(digits).into_owned(),
        ));
    }
    // Only ASCII digits remain, so this can fail on overflow alone
    let len: usize = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::InvalidLength(String::from_utf8_lossy(digits).into_owned()))?;

    let rest = &buf[colon + 1..];
    if rest.len() < len {
        return Err(ParseError::Truncated {
            expected: len,
            available: rest.len(),
        });
    }
    Ok(rest.split_at(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_atom() {
        let (expr, rest) = parse(b"3:abc").unwrap();
        assert_eq!(expr, SExpr::atom("abc"));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_parse_atom_reports_remainder() {
        let (expr, rest) = parse(b"2:hi(3:foo)").unwrap();
        assert_eq!(expr, SExpr::atom("hi"));
        assert_eq!(rest, b"(3:foo)");
    }

    #[test]
    fn test_atom_roundtrip_lengths() {
        for len in [0usize, 1, 9, 10, 255, 256, 4096] {
            let data: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
            let wire = serialize_atom(&data);
            let (expr, rest) = parse(&wire).unwrap();
            assert_eq!(expr, SExpr::Atom(data), "length {}", len);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn test_atom_may_contain_delimiters() {
        let wire = serialize_atom(b"(:)\n");
        assert_eq!(wire, b"4:(:)\n");
        assert_eq!(parse_complete(&wire).unwrap(), SExpr::atom(&b"(:)\n"[..]));
    }

    #[test]
    fn test_parse_nested_list() {
        let wire = b"(7:sig-val(5:ecdsa(1:r1:\x01)(1:s1:\x02)))";
        let expr = parse_complete(wire).unwrap();
        assert_eq!(expr.name(), Some(&b"sig-val"[..]));

        let algo = &expr.children()[0];
        assert_eq!(algo.name(), Some(&b"ecdsa"[..]));
        assert_eq!(algo.find(b"r").and_then(SExpr::value), Some(&[1u8][..]));
        assert_eq!(algo.find(b"s").and_then(SExpr::value), Some(&[2u8][..]));
        assert!(algo.find(b"q").is_none());

        assert_eq!(expr.to_bytes(), wire);
    }

    #[test]
    fn test_serialize_list() {
        let children = [serialize_atom(b"x"), serialize_list(b"y", [b"1:z"])];
        assert_eq!(serialize_list(b"value", &children), b"(5:value1:x(1:y1:z))");
        assert_eq!(serialize_list(b"empty", Vec::<Vec<u8>>::new()), b"(5:empty)");
    }

    #[test]
    fn test_list_constructor_matches_wire() {
        let expr = SExpr::list("value", [SExpr::atom("ab")]);
        assert_eq!(expr.to_bytes(), b"(5:value2:ab)");
        assert_eq!(expr.value(), Some(&b"ab"[..]));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse(b""), Err(ParseError::UnexpectedEnd));
        assert_eq!(parse(b"abc"), Err(ParseError::MissingSeparator));
        assert_eq!(parse(b":abc"), Err(ParseError::InvalidLength(String::new())));
        assert_eq!(parse(b"-1:a"), Err(ParseError::InvalidLength("-1".to_string())));
        assert_eq!(
            parse(b"99999999999999999999999:a"),
            Err(ParseError::InvalidLength("99999999999999999999999".to_string()))
        );
        assert_eq!(
            parse(b"5:abc"),
            Err(ParseError::Truncated {
                expected: 5,
                available: 3
            })
        );
        assert_eq!(parse(b"(3:foo"), Err(ParseError::UnterminatedList));
        assert_eq!(parse(b"(3:foo(1:a1:b)"), Err(ParseError::UnterminatedList));
        assert_eq!(parse(b"("), Err(ParseError::UnterminatedList));
        assert_eq!(parse(b"()"), Err(ParseError::MissingListName));
        assert_eq!(parse(b"((1:a))"), Err(ParseError::MissingListName));
    }

    #[test]
    fn test_parse_complete_rejects_trailing_bytes() {
        assert_eq!(parse_complete(b"(1:a)xy"), Err(ParseError::TrailingBytes(2)));
        assert_eq!(parse_complete(b"1:a\n"), Err(ParseError::TrailingBytes(1)));
    }

    #[test]
    fn test_depth_limit() {
        let mut wire = Vec::new();
        for _ in 0..=MAX_DEPTH {
            wire.extend_from_slice(b"(1:a");
        }
        for _ in 0..=MAX_DEPTH {
            wire.push(b')');
        }
        assert_eq!(parse(&wire), Err(ParseError::TooDeep(MAX_DEPTH)));

        let shallow = &wire[4..wire.len() - 1];
        assert!(parse_complete(shallow).is_ok());
    }
}
