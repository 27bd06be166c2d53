//! Ordered tuple / subspace key codec.
//!
//! Every key the rest of the crate writes into the KV engine is built from a
//! `Tuple` of `Element`s. Encoding preserves lexicographic byte order across
//! elements of the same type, and a leading type tag keeps order stable
//! across mixed-type tuples (an `Int` always sorts before a `Text`,
//! regardless of value).

use std::cmp::Ordering;

/// A single typed component of a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Bytes(Vec<u8>),
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl Element {
    /// Tag ordering across variants: Bytes < Text < Int < UInt < Float < Bool.
    fn tag(&self) -> u8 {
        match self {
            Element::Bytes(_) => 0,
            Element::Text(_) => 1,
            Element::Int(_) => 2,
            Element::UInt(_) => 3,
            Element::Float(_) => 4,
            Element::Bool(_) => 5,
        }
    }

    /// Order-preserving byte encoding of this element alone (no length
    /// framing between elements — see `Tuple::pack` for that).
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        match self {
            Element::Bytes(b) => {
                encode_escaped_bytes(b, out);
            }
            Element::Text(s) => {
                encode_escaped_bytes(s.as_bytes(), out);
            }
            Element::Int(i) => {
                // Flip the sign bit so two's-complement order matches
                // unsigned byte order: negative numbers sort before
                // positive ones.
                let flipped = (*i as u64) ^ (1u64 << 63);
                out.extend_from_slice(&flipped.to_be_bytes());
            }
            Element::UInt(u) => {
                out.extend_from_slice(&u.to_be_bytes());
            }
            Element::Float(f) => {
                out.extend_from_slice(&order_preserving_f64(*f));
            }
            Element::Bool(b) => {
                out.push(if *b { 1 } else { 0 });
            }
        }
    }
}

/// `0x00` is the tuple separator, so any literal `0x00` byte inside a
/// `Bytes`/`Text` element is escaped as `0x00 0xFF` and the element is
/// terminated by a bare `0x00`. This is the same escaping strategy used by
/// FoundationDB-style tuple layers and keeps prefix scans correct.
fn encode_escaped_bytes(data: &[u8], out: &mut Vec<u8>) {
    for &b in data {
        if b == 0x00 {
            out.push(0x00);
            out.push(0xFF);
        } else {
            out.push(b);
        }
    }
    out.push(0x00);
}

fn decode_escaped_bytes(data: &[u8], pos: &mut usize) -> Vec<u8> {
    let mut result = Vec::new();
    while *pos < data.len() {
        let b = data[*pos];
        if b == 0x00 {
            if *pos + 1 < data.len() && data[*pos + 1] == 0xFF {
                result.push(0x00);
                *pos += 2;
            } else {
                *pos += 1;
                break;
            }
        } else {
            result.push(b);
            *pos += 1;
        }
    }
    result
}

/// IEEE-754 bit manipulation that makes the big-endian byte representation
/// order-preserving: for non-negative floats, flip the sign bit; for
/// negative floats, flip every bit.
fn order_preserving_f64(f: f64) -> [u8; 8] {
    let bits = f.to_bits();
    let flipped = if bits & (1u64 << 63) != 0 {
        !bits
    } else {
        bits | (1u64 << 63)
    };
    flipped.to_be_bytes()
}

fn decode_order_preserving_f64(bytes: [u8; 8]) -> f64 {
    let bits = u64::from_be_bytes(bytes);
    let restored = if bits & (1u64 << 63) != 0 {
        bits & !(1u64 << 63)
    } else {
        !bits
    };
    f64::from_bits(restored)
}

impl Eq for Element {}

impl PartialOrd for Element {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Element {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Element::Bytes(a), Element::Bytes(b)) => a.cmp(b),
            (Element::Text(a), Element::Text(b)) => a.cmp(b),
            (Element::Int(a), Element::Int(b)) => a.cmp(b),
            (Element::UInt(a), Element::UInt(b)) => a.cmp(b),
            (Element::Float(a), Element::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Element::Bool(a), Element::Bool(b)) => a.cmp(b),
            _ => self.tag().cmp(&other.tag()),
        }
    }
}

/// An ordered sequence of `Element`s that packs to a byte string preserving
/// lexicographic order of the sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tuple(pub Vec<Element>);

impl Tuple {
    pub fn new() -> Self {
        Tuple(Vec::new())
    }

    pub fn push(mut self, element: Element) -> Self {
        self.0.push(element);
        self
    }

    pub fn from_elements(elements: Vec<Element>) -> Self {
        Tuple(elements)
    }

    /// Encode to bytes. Order-preserving: `a.pack() < b.pack()` iff
    /// `a < b` under `Tuple`'s `Ord`, as long as no element's encoding is a
    /// byte-prefix of another's — guaranteed by the trailing `0x00`
    /// terminator on variable-length elements.
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for el in &self.0 {
            el.encode_into(&mut out);
        }
        out
    }

    /// Append a raw subspace prefix in front of the packed tuple.
    pub fn pack_with_prefix(&self, prefix: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(prefix.len() + 16 * self.0.len());
        out.extend_from_slice(prefix);
        out.extend_from_slice(&self.pack());
        out
    }

    /// Decode a packed tuple back into elements. Best-effort: used mostly by
    /// tests and debugging tools, production code generally only needs to
    /// compare/prefix-match packed bytes.
    pub fn unpack(data: &[u8]) -> Result<Tuple, String> {
        let mut pos = 0;
        let mut elements = Vec::new();
        while pos < data.len() {
            let tag = data[pos];
            pos += 1;
            let el = match tag {
                0 => Element::Bytes(decode_escaped_bytes(data, &mut pos)),
                1 => {
                    let bytes = decode_escaped_bytes(data, &mut pos);
                    Element::Text(String::from_utf8(bytes).map_err(|e| e.to_string())?)
                }
                2 => {
                    if pos + 8 > data.len() {
                        return Err("truncated int element".into());
                    }
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(&data[pos..pos + 8]);
                    pos += 8;
                    let flipped = u64::from_be_bytes(buf);
                    Element::Int((flipped ^ (1u64 << 63)) as i64)
                }
                3 => {
                    if pos + 8 > data.len() {
                        return Err("truncated uint element".into());
                    }
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(&data[pos..pos + 8]);
                    pos += 8;
                    Element::UInt(u64::from_be_bytes(buf))
                }
                4 => {
                    if pos + 8 > data.len() {
                        return Err("truncated float element".into());
                    }
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(&data[pos..pos + 8]);
                    pos += 8;
                    Element::Float(decode_order_preserving_f64(buf))
                }
                5 => {
                    if pos >= data.len() {
                        return Err("truncated bool element".into());
                    }
                    let b = data[pos] != 0;
                    pos += 1;
                    Element::Bool(b)
                }
                other => return Err(format!("unknown tuple tag {other}")),
            };
            elements.push(el);
        }
        Ok(Tuple(elements))
    }
}

impl PartialOrd for Tuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tuple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// A named, prefix-delimited region of the keyspace (`R`, `I`, `T`, `M`, `B`,
/// `O` in spec terms, plus nested `I/<indexName>/...` subspaces).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subspace(pub Vec<u8>);

impl Subspace {
    pub fn root(tag: &str) -> Self {
        let mut bytes = tag.as_bytes().to_vec();
        bytes.push(0x00);
        Subspace(bytes)
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut bytes = self.0.clone();
        bytes.extend_from_slice(segment.as_bytes());
        bytes.push(0x00);
        Subspace(bytes)
    }

    pub fn key(&self, tuple: &Tuple) -> Vec<u8> {
        tuple.pack_with_prefix(&self.0)
    }

    pub fn raw_prefix(&self) -> &[u8] {
        &self.0
    }

    /// The exclusive end of the prefix range `[self.0, end)` covering every
    /// key with this subspace as a prefix.
    pub fn range_end(&self) -> Vec<u8> {
        let mut end = self.0.clone();
        // Increment the last byte that isn't already 0xFF; if all bytes are
        // 0xFF the range is unbounded above within practical key space, so
        // append 0xFF to stay a valid exclusive upper bound.
        for i in (0..end.len()).rev() {
            if end[i] != 0xFF {
                end[i] += 1;
                end.truncate(i + 1);
                return end;
            }
        }
        end.push(0xFF);
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_mixed_tuple() {
        let t = Tuple::new()
            .push(Element::Text("users".into()))
            .push(Element::Int(-42))
            .push(Element::UInt(7))
            .push(Element::Bool(true));
        let packed = t.pack();
        let decoded = Tuple::unpack(&packed).unwrap();
        assert_eq!(t, decoded);
    }

    #[test]
    fn int_order_preserved() {
        let a = Tuple::new().push(Element::Int(-5)).pack();
        let b = Tuple::new().push(Element::Int(5)).pack();
        assert!(a < b);
    }

    #[test]
    fn float_order_preserved() {
        let vals = [-10.5, -0.001, 0.0, 0.001, 10.5];
        let mut packed: Vec<Vec<u8>> = vals
            .iter()
            .map(|v| Tuple::new().push(Element::Float(*v)).pack())
            .collect();
        let sorted_expected = packed.clone();
        packed.sort();
        assert_eq!(packed, sorted_expected);
    }

    #[test]
    fn text_prefix_before_longer_string() {
        let a = Tuple::new().push(Element::Text("ab".into())).pack();
        let b = Tuple::new().push(Element::Text("abc".into())).pack();
        assert!(a < b);
    }

    #[test]
    fn subspace_prefix_scan_bounds() {
        let sub = Subspace::root("I").child("by_email");
        let end = sub.range_end();
        let key = sub.key(&Tuple::new().push(Element::Text("a@x".into())));
        assert!(key.as_slice() >= sub.raw_prefix());
        assert!(key < end);
    }
}
