//! Domain names: an owned textual form (`Name`) used to build queries, and
//! the wire-form expansion routine (`expand`) used to decompress a name
//! straight out of a packet buffer, following RFC1035 §4.1.4 pointers with
//! a bounded hop count so a malicious pointer loop can never hang the
//! resolver.
use std::fmt;

use crate::error::{DNSError, DNSResult, InternalError};
use crate::util::is_pointer;

/// Maximum encoded length of a domain name, RFC1035 §3.1.
pub const MAX_NAME_LENGTH: usize = 255;
/// Maximum length of a single label, RFC1035 §3.1.
pub const MAX_LABEL_LENGTH: usize = 63;
/// Maximum number of compression-pointer hops followed while expanding a
/// single name. Well above anything a legitimate packet needs; exists only
/// to bound a pointer cycle.
pub const MAX_POINTER_HOPS: usize = 127;

/// An owned, textual domain name, always anchored (carries its trailing
/// root dot). `Name::try_from("www.example.com")` is the usual
/// construction path when building a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Name(String);

impl Name {
    pub fn root() -> Self {
        Name(".".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Labels, root excluded, outermost first: `"a.b.c."` -> `["a", "b",
    /// "c"]`.
    pub fn labels(&self) -> Vec<&str> {
        if self.0 == "." {
            Vec::new()
        } else {
            self.0.trim_end_matches('.').split('.').collect()
        }
    }

    /// Parent zone, or `None` once called on the root (mirrors
    /// `util::cleave`).
    pub fn cleave(&self) -> Option<Name> {
        crate::util::cleave(&self.0).map(Name)
    }

    pub fn is_root(&self) -> bool {
        self.0 == "."
    }

    /// Wire-encoded length this name would occupy, uncompressed: each
    /// label's length octet plus its bytes, plus the root's zero octet.
    pub fn wire_len(&self) -> usize {
        self.labels().iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// Append the uncompressed wire form (length-prefixed labels, then a
    /// zero octet) to `buffer`. Returns the number of bytes appended.
    /// Compression, which needs a packet-wide dictionary, is layered on top
    /// of this by `packet::Packet::push_name`.
    pub fn push_uncompressed(&self, buffer: &mut Vec<u8>) -> DNSResult<usize> {
        if self.wire_len() > MAX_NAME_LENGTH {
            return Err(DNSError::DNSInternalError(InternalError::DnsDomainNameTooLong));
        }

        let mut written = 0usize;
        for label in self.labels() {
            if label.len() > MAX_LABEL_LENGTH {
                return Err(DNSError::DNSInternalError(InternalError::DnsLabelTooLong));
            }
            buffer.push(label.len() as u8);
            buffer.extend_from_slice(label.as_bytes());
            written += 1 + label.len();
        }
        buffer.push(0);
        written += 1;
        Ok(written)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ```
/// use dnslib::name::Name;
///
/// let n = Name::try_from("www.example.com").unwrap();
/// assert_eq!(n.to_string(), "www.example.com.");
///
/// let n = Name::try_from("www.example.com.").unwrap();
/// assert_eq!(n.to_string(), "www.example.com.");
///
/// let n = Name::try_from(".").unwrap();
/// assert_eq!(n.to_string(), ".");
///
/// assert!(Name::try_from("").is_err());
/// ```
impl TryFrom<&str> for Name {
    type Error = DNSError;

    fn try_from(s: &str) -> DNSResult<Self> {
        if s.is_empty() {
            return Err(DNSError::DNSInternalError(InternalError::EmptyDomainName));
        }
        Ok(Name(crate::util::anchor(s)))
    }
}

/// Decompress a name starting at `start` within `buffer`, following
/// compression pointers (RFC1035 §4.1.4). Returns the expanded textual name
/// and the offset immediately past the name's first occurrence (i.e. past
/// the two-byte pointer if one was taken at the top level, otherwise past
/// the terminating zero octet) — the cursor position the *next* field in
/// the record starts at.
///
/// Bounded by `MAX_POINTER_HOPS` hops and `MAX_NAME_LENGTH` accumulated
/// octets, so a pointer loop or a pointer-to-itself can never hang this
/// call: both are rejected as `InternalError::PointerLoop`.
pub fn expand(buffer: &[u8], start: usize) -> DNSResult<(String, usize)> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = start;
    let mut end_of_name: Option<usize> = None;
    let mut hops = 0usize;
    let mut total_len = 0usize;

    loop {
        if pos >= buffer.len() {
            return Err(DNSError::illegal("name runs past end of buffer"));
        }

        let byte = buffer[pos];

        if byte == 0 {
            if end_of_name.is_none() {
                end_of_name = Some(pos + 1);
            }
            break;
        }

        if is_pointer(byte) {
            if pos + 1 >= buffer.len() {
                return Err(DNSError::illegal("truncated compression pointer"));
            }
            if end_of_name.is_none() {
                end_of_name = Some(pos + 2);
            }

            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(DNSError::DNSInternalError(InternalError::PointerLoop));
            }

            let offset = (u16::from_be_bytes([byte, buffer[pos + 1]]) & 0x3FFF) as usize;
            if offset >= pos {
                // a pointer must always point strictly backwards
                return Err(DNSError::DNSInternalError(InternalError::PointerLoop));
            }
            pos = offset;
            continue;
        }

        // reserved label-type bits (01/10) are illegal per RFC1035 §4.1.4
        if byte & 0b1100_0000 != 0 {
            return Err(DNSError::illegal("reserved label type bits"));
        }

        let len = byte as usize;
        if pos + 1 + len > buffer.len() {
            return Err(DNSError::illegal("label runs past end of buffer"));
        }

        let label = std::str::from_utf8(&buffer[pos + 1..pos + 1 + len])?;
        labels.push(label.to_string());
        total_len += len + 1;
        if total_len > MAX_NAME_LENGTH {
            return Err(DNSError::DNSInternalError(InternalError::DnsDomainNameTooLong));
        }

        pos += 1 + len;
    }

    let text = if labels.is_empty() {
        ".".to_string()
    } else {
        let mut s = labels.join(".");
        s.push('.');
        s
    };

    Ok((text, end_of_name.unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_roundtrips_uncompressed() {
        let n = Name::try_from("www.example.com").unwrap();
        let mut buf = Vec::new();
        n.push_uncompressed(&mut buf).unwrap();
        assert_eq!(
            buf,
            vec![3, b'w', b'w', b'w', 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0]
        );

        let (text, next) = expand(&buf, 0).unwrap();
        assert_eq!(text, "www.example.com.");
        assert_eq!(next, buf.len());
    }

    #[test]
    fn root_name_is_single_zero_octet() {
        let n = Name::root();
        let mut buf = Vec::new();
        n.push_uncompressed(&mut buf).unwrap();
        assert_eq!(buf, vec![0]);

        let (text, next) = expand(&buf, 0).unwrap();
        assert_eq!(text, ".");
        assert_eq!(next, 1);
    }

    #[test]
    fn expand_follows_a_single_pointer() {
        // "hk." at offset 0, then a pointer back to it at offset 4
        let mut buf = vec![2, b'h', b'k', 0];
        let ptr_offset = buf.len();
        buf.extend_from_slice(&[0xC0, 0x00]);

        let (text, next) = expand(&buf, ptr_offset).unwrap();
        assert_eq!(text, "hk.");
        assert_eq!(next, ptr_offset + 2);
    }

    #[test]
    fn expand_rejects_self_referencing_pointer() {
        let buf = vec![0xC0, 0x00];
        let err = expand(&buf, 0).unwrap_err();
        assert!(matches!(
            err,
            DNSError::DNSInternalError(InternalError::PointerLoop)
        ));
    }

    #[test]
    fn expand_rejects_forward_pointer() {
        // a pointer at offset 0 pointing forward to offset 4 must be rejected,
        // even though offset 4 holds a well-formed label — forward pointers
        // are how a hostile packet builds an unbounded pointer chain.
        let mut buf = vec![0xC0, 0x04];
        buf.extend_from_slice(&[1, b'a', 0]);
        let err = expand(&buf, 0).unwrap_err();
        assert!(matches!(
            err,
            DNSError::DNSInternalError(InternalError::PointerLoop)
        ));
    }

    #[test]
    fn push_uncompressed_rejects_oversize_label() {
        let long_label = "a".repeat(MAX_LABEL_LENGTH + 1);
        let n = Name::try_from(long_label.as_str()).unwrap();
        let mut buf = Vec::new();
        let err = n.push_uncompressed(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            DNSError::DNSInternalError(InternalError::DnsLabelTooLong)
        ));
    }
}
