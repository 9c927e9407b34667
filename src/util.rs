//! Module for some utility functions, including debug helpers and the small
//! FQDN manipulations (`anchor`, `cleave`) the resolver and hints table lean
//! on throughout.
use std::char;
use std::io::Cursor;
use std::net::IpAddr;

/// A domain name label is either a literal (top two bits `00`) or a pointer
/// (top two bits `11`); `01`/`10` are reserved and must be rejected by the
/// caller. This only tests the pointer bits.
pub fn is_pointer(x: u8) -> bool {
    x & 0b1100_0000 == 0b1100_0000
}

/// True for the sentinel byte that ends a wire-form name: either the root
/// label (`0x00`) or the start of a compression pointer.
pub fn is_sentinel(x: u8) -> bool {
    x == 0 || is_pointer(x)
}

/// Ensure a textual FQDN carries its trailing root dot. The absence of a
/// trailing dot is an error-prone *input*, never an internal invariant —
/// this is the normalization point.
pub fn anchor(name: &str) -> String {
    if name.is_empty() {
        return ".".to_string();
    }
    if name.ends_with('.') {
        name.to_string()
    } else {
        let mut s = String::with_capacity(name.len() + 1);
        s.push_str(name);
        s.push('.');
        s
    }
}

/// Remove the leftmost label, yielding the parent zone: `"a.b.c." -> "b.c."
/// -> "c." -> "."`. Assumes `name` is already anchored. Returns `None` once
/// called on the root.
pub fn cleave(name: &str) -> Option<String> {
    if name == "." {
        return None;
    }
    match name.find('.') {
        Some(idx) => Some(name[idx + 1..].to_string()),
        None => Some(".".to_string()),
    }
}

/// Build the PTR qname for an address: IPv4 reverses the octets under
/// `in-addr.arpa.`, IPv6 reverses the nibbles under `ip6.arpa.`.
pub fn ptr_qname(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa.", o[3], o[2], o[1], o[0])
        }
        IpAddr::V6(v6) => {
            let mut s = String::with_capacity(8 * 4 + "ip6.arpa.".len());
            for byte in v6.octets().iter().rev() {
                s.push_str(&format!("{:x}.{:x}.", byte & 0xf, byte >> 4));
            }
            s.push_str("ip6.arpa.");
            s
        }
    }
}

/// Parse a `tcpdump`/`xxd`-style hex-dump fixture (address column, 16
/// space-separated hex byte columns, optional trailing ascii column ignored)
/// into the bytes it represents. Used by `test_from_network!` to build wire
/// fixtures that read naturally as hex dumps rather than Rust byte arrays.
pub fn get_sample_slice(dump: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    for line in dump.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // first token is the offset column, e.g. "0000"
        let mut tokens = line.split_whitespace();
        tokens.next();
        for tok in tokens {
            if tok.len() != 2 || !tok.chars().all(|c| c.is_ascii_hexdigit()) {
                break;
            }
            bytes.push(u8::from_str_radix(tok, 16).expect("valid hex byte"));
        }
    }
    bytes
}

/// Debug utility: dump a cursor's backing buffer as index/hex/ascii rows.
pub fn pretty_cursor<'a>(buffer: &Cursor<&'a [u8]>) {
    let reference = buffer.get_ref();

    eprintln!("position={}", buffer.position());

    let mut i = 0usize;
    eprint!("index:");
    for _ in *reference {
        eprint!("{:02} ", i);
        i += 1;
    }
    eprintln!();

    eprint!("byte :");
    for x in *reference {
        eprint!("{:02X} ", x);
    }
    eprintln!();

    eprint!("ascii:");
    for x in *reference {
        let c = char::from_u32(*x as u32).unwrap();
        if c.is_ascii_alphanumeric() {
            eprint!("{:>2} ", c);
        } else {
            eprint!("   ");
        }
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn anchor_adds_trailing_dot() {
        assert_eq!(anchor("www.example.com"), "www.example.com.");
        assert_eq!(anchor("www.example.com."), "www.example.com.");
        assert_eq!(anchor(""), ".");
    }

    #[test]
    fn cleave_walks_to_root() {
        assert_eq!(cleave("a.b.c.").as_deref(), Some("b.c."));
        assert_eq!(cleave("b.c.").as_deref(), Some("c."));
        assert_eq!(cleave("c.").as_deref(), Some("."));
        assert_eq!(cleave("."), None);
    }

    #[test]
    fn ptr_qname_v4() {
        let addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 5));
        assert_eq!(ptr_qname(addr), "5.2.0.192.in-addr.arpa.");
    }

    #[test]
    fn ptr_qname_v6() {
        let addr = IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1));
        let qn = ptr_qname(addr);
        assert!(qn.ends_with("ip6.arpa."));
        assert!(qn.starts_with("1.0.0.0."));
    }

    #[test]
    fn sample_slice_parses_hex_dump() {
        const PACKET: &str = r#"
0000   76 86 81 a0 00 01 00 08
        "#;
        assert_eq!(
            get_sample_slice(PACKET),
            vec![0x76, 0x86, 0x81, 0xa0, 0x00, 0x01, 0x00, 0x08]
        );
    }

    #[test]
    fn pointer_detection() {
        assert!(is_pointer(0xC0));
        assert!(!is_pointer(0x3F));
        assert!(is_sentinel(0x00));
        assert!(is_sentinel(0xC0));
        assert!(!is_sentinel(0x01));
    }
}
