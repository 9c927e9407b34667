//! Resource records: `Rr`, a parsed record's view into a `Packet`, and
//! `Rdata`, the typed RDATA enum with a parse/push/compare/Display quartet
//! per variant.
use std::cmp::Ordering;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::{DNSError, DNSResult};
use crate::name::Name;
use crate::packet::{Packet, Section};

pub const TYPE_A: u16 = 1;
pub const TYPE_NS: u16 = 2;
pub const TYPE_CNAME: u16 = 5;
pub const TYPE_SOA: u16 = 6;
pub const TYPE_PTR: u16 = 12;
pub const TYPE_MX: u16 = 15;
pub const TYPE_TXT: u16 = 16;
pub const TYPE_AAAA: u16 = 28;
pub const TYPE_SRV: u16 = 33;

pub const CLASS_IN: u16 = 1;
pub const CLASS_ANY: u16 = 255;

/// A parsed RR: offsets into the packet it was read from (`dn_offset`,
/// `dn_len`, type, class, ttl, `rdata_offset`, `rdata_len`, section), plus
/// the already-decompressed owner name. Owned rather than borrowed:
/// decompression allocates, and an owned `Rr` is what lets
/// `RrIterator::skip` restart cheaply across calls without fighting a
/// packet-tied lifetime.
#[derive(Debug, Clone)]
pub struct Rr {
    pub offset: usize,
    pub name: String,
    pub rtype: u16,
    pub rclass: u16,
    pub ttl: u32,
    pub rdata_offset: usize,
    pub rdata_len: usize,
    pub section: Section,
}

impl Rr {
    pub fn rdata<'p>(&self, packet: &'p Packet) -> DNSResult<Rdata<'p>> {
        Rdata::parse(self.rtype, packet, self.rdata_offset, self.rdata_len)
    }

    /// Total order used by the `order` RR-iteration comparator: section,
    /// then type, then `Rdata::compare`. Two RRs of different sections or
    /// types never compare equal even if offsets coincide (they can't).
    pub fn rr_cmp(&self, other: &Rr, packet: &Packet) -> DNSResult<Ordering> {
        if self.section_rank() != other.section_rank() {
            return Ok(self.section_rank().cmp(&other.section_rank()));
        }
        if self.rtype != other.rtype {
            return Ok(self.rtype.cmp(&other.rtype));
        }
        let a = self.rdata(packet)?;
        let b = other.rdata(packet)?;
        Ok(a.compare(&b))
    }

    fn section_rank(&self) -> u8 {
        match self.section {
            Section::Qd => 0,
            Section::An => 1,
            Section::Ns => 2,
            Section::Ar => 3,
        }
    }
}

/// Parse the question "RR" at `offset` (no TTL/RDATA: `ttl` is 0,
/// `rdata_len` is 0 by convention so `Rr` can represent both shapes
/// uniformly).
pub fn parse_question(packet: &Packet, offset: usize) -> DNSResult<(Rr, usize)> {
    let (name, after_name) = packet.expand_name(offset)?;
    let rtype = packet.read_u16(after_name)?;
    let rclass = packet.read_u16(after_name + 2)?;
    let next = after_name + 4;
    Ok((
        Rr {
            offset,
            name,
            rtype,
            rclass,
            ttl: 0,
            rdata_offset: next,
            rdata_len: 0,
            section: Section::Qd,
        },
        next,
    ))
}

/// Parse one resource record at `offset` in `section` (`An`/`Ns`/`Ar`).
/// Never reads past `packet.len()`: RDLENGTH is checked against the
/// packet's logical end before being trusted.
pub fn parse_rr(packet: &Packet, offset: usize, section: Section) -> DNSResult<(Rr, usize)> {
    let (name, after_name) = packet.expand_name(offset)?;
    let rtype = packet.read_u16(after_name)?;
    let rclass = packet.read_u16(after_name + 2)?;
    let ttl = packet.read_u32(after_name + 4)?;
    let rdlen = packet.read_u16(after_name + 8)? as usize;
    let rdata_offset = after_name + 10;
    if rdata_offset + rdlen > packet.len() {
        return Err(DNSError::illegal("RDATA runs past packet end"));
    }
    let next = rdata_offset + rdlen;
    Ok((
        Rr {
            offset,
            name,
            rtype,
            rclass,
            ttl,
            rdata_offset,
            rdata_len: rdlen,
            section,
        },
        next,
    ))
}

/// Typed RDATA: one variant per supported type, `Opaque` for everything
/// else (passed through untouched).
#[derive(Debug, Clone)]
pub enum Rdata<'p> {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(String),
    Cname(String),
    Ptr(String),
    Mx { preference: u16, exchange: String },
    Soa {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Srv { priority: u16, weight: u16, port: u16, target: String },
    /// Sequence of length-prefixed octet strings (each ≤255 octets).
    Txt(Vec<Vec<u8>>),
    Opaque(&'p [u8]),
}

impl<'p> Rdata<'p> {
    pub fn parse(rtype: u16, packet: &'p Packet, offset: usize, len: usize) -> DNSResult<Self> {
        match rtype {
            TYPE_A => {
                let b = packet.slice(offset, 4)?;
                Ok(Rdata::A(Ipv4Addr::new(b[0], b[1], b[2], b[3])))
            }
            TYPE_AAAA => {
                let b = packet.slice(offset, 16)?;
                let mut o = [0u8; 16];
                o.copy_from_slice(b);
                Ok(Rdata::Aaaa(Ipv6Addr::from(o)))
            }
            TYPE_NS => Ok(Rdata::Ns(packet.expand_name(offset)?.0)),
            TYPE_CNAME => Ok(Rdata::Cname(packet.expand_name(offset)?.0)),
            TYPE_PTR => Ok(Rdata::Ptr(packet.expand_name(offset)?.0)),
            TYPE_MX => {
                let preference = packet.read_u16(offset)?;
                let (exchange, _) = packet.expand_name(offset + 2)?;
                Ok(Rdata::Mx { preference, exchange })
            }
            TYPE_SOA => {
                let (mname, after_m) = packet.expand_name(offset)?;
                let (rname, after_r) = packet.expand_name(after_m)?;
                Ok(Rdata::Soa {
                    mname,
                    rname,
                    serial: packet.read_u32(after_r)?,
                    refresh: packet.read_u32(after_r + 4)?,
                    retry: packet.read_u32(after_r + 8)?,
                    expire: packet.read_u32(after_r + 12)?,
                    minimum: packet.read_u32(after_r + 16)?,
                })
            }
            TYPE_SRV => {
                let priority = packet.read_u16(offset)?;
                let weight = packet.read_u16(offset + 2)?;
                let port = packet.read_u16(offset + 4)?;
                let (target, _) = packet.expand_name(offset + 6)?;
                Ok(Rdata::Srv { priority, weight, port, target })
            }
            TYPE_TXT => {
                let mut chunks = Vec::new();
                let mut pos = offset;
                let end = offset + len;
                while pos < end {
                    let l = packet.slice(pos, 1)?[0] as usize;
                    chunks.push(packet.slice(pos + 1, l)?.to_vec());
                    pos += 1 + l;
                }
                Ok(Rdata::Txt(chunks))
            }
            _ => Ok(Rdata::Opaque(packet.slice(offset, len)?)),
        }
    }

    /// Write this RDATA's body (not its RDLENGTH prefix, which the caller's
    /// `Packet::push_rr_with` backpatches) into `packet`, compressing any
    /// embedded name against the packet's dictionary where the RFC allows
    /// it — and, for SRV, where this codec allows it even though RFC 2782
    /// recommends against it, a knowingly preserved deviation.
    pub fn push(&self, packet: &mut Packet) -> DNSResult<()> {
        match self {
            Rdata::A(addr) => {
                for b in addr.octets() {
                    packet.push_byte(b)?;
                }
                Ok(())
            }
            Rdata::Aaaa(addr) => {
                for b in addr.octets() {
                    packet.push_byte(b)?;
                }
                Ok(())
            }
            Rdata::Ns(n) | Rdata::Cname(n) | Rdata::Ptr(n) => {
                packet.push_name(&Name::try_from(n.as_str())?)?;
                Ok(())
            }
            Rdata::Mx { preference, exchange } => {
                packet.push_u16(*preference)?;
                packet.push_name(&Name::try_from(exchange.as_str())?)?;
                Ok(())
            }
            Rdata::Soa { mname, rname, serial, refresh, retry, expire, minimum } => {
                packet.push_name(&Name::try_from(mname.as_str())?)?;
                packet.push_name(&Name::try_from(rname.as_str())?)?;
                packet.push_u32(*serial)?;
                packet.push_u32(*refresh)?;
                packet.push_u32(*retry)?;
                packet.push_u32(*expire)?;
                packet.push_u32(*minimum)?;
                Ok(())
            }
            Rdata::Srv { priority, weight, port, target } => {
                packet.push_u16(*priority)?;
                packet.push_u16(*weight)?;
                packet.push_u16(*port)?;
                packet.push_name(&Name::try_from(target.as_str())?)?;
                Ok(())
            }
            Rdata::Txt(chunks) => {
                for chunk in chunks {
                    if chunk.len() > 255 {
                        return Err(DNSError::illegal("TXT chunk longer than 255 octets"));
                    }
                    packet.push_byte(chunk.len() as u8)?;
                    for &b in chunk {
                        packet.push_byte(b)?;
                    }
                }
                Ok(())
            }
            Rdata::Opaque(bytes) => {
                for &b in *bytes {
                    packet.push_byte(b)?;
                }
                Ok(())
            }
        }
    }

    /// Total order over RDATA of any type, for the `order` RR-iteration
    /// comparator. TXT is knowingly unordered — `compare` against any TXT
    /// (including itself) always returns `Less`. SOA compares serials in
    /// *reverse* (a newer serial sorts as "less than" an older one) — an
    /// intentionally unusual rule, preserved and flagged; callers should
    /// rely on it only for equality/inequality, not as a meaningful total
    /// order.
    pub fn compare(&self, other: &Rdata) -> Ordering {
        match (self, other) {
            (Rdata::Txt(_), _) | (_, Rdata::Txt(_)) => Ordering::Less,
            (Rdata::A(a), Rdata::A(b)) => a.cmp(b),
            (Rdata::Aaaa(a), Rdata::Aaaa(b)) => a.cmp(b),
            (Rdata::Ns(a), Rdata::Ns(b)) => a.cmp(b),
            (Rdata::Cname(a), Rdata::Cname(b)) => a.cmp(b),
            (Rdata::Ptr(a), Rdata::Ptr(b)) => a.cmp(b),
            (Rdata::Mx { preference: pa, exchange: ea }, Rdata::Mx { preference: pb, exchange: eb }) => {
                pa.cmp(pb).then_with(|| ea.cmp(eb))
            }
            (Rdata::Soa { serial: sa, .. }, Rdata::Soa { serial: sb, .. }) => sb.cmp(sa),
            (
                Rdata::Srv { priority: pa, weight: wa, port: pra, target: ta },
                Rdata::Srv { priority: pb, weight: wb, port: prb, target: tb },
            ) => pa.cmp(pb).then_with(|| wa.cmp(wb)).then_with(|| pra.cmp(prb)).then_with(|| ta.cmp(tb)),
            // different variants: order by a fixed discriminant rank so the
            // comparator is still total, even though it's not meaningful.
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Rdata::A(_) => 0,
            Rdata::Ns(_) => 1,
            Rdata::Cname(_) => 2,
            Rdata::Soa { .. } => 3,
            Rdata::Ptr(_) => 4,
            Rdata::Mx { .. } => 5,
            Rdata::Txt(_) => 6,
            Rdata::Aaaa(_) => 7,
            Rdata::Srv { .. } => 8,
            Rdata::Opaque(_) => 9,
        }
    }

    /// Does this RDATA name-match `qname` (case-insensitive), for the
    /// "NS host name" / "CNAME at qname" checks the resolver FSM needs
    /// (GLUE scan, delegation handling, CNAME chasing)?
    pub fn target_name(&self) -> Option<&str> {
        match self {
            Rdata::Ns(n) | Rdata::Cname(n) | Rdata::Ptr(n) => Some(n),
            Rdata::Mx { exchange, .. } => Some(exchange),
            Rdata::Srv { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for Rdata<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rdata::A(a) => write!(f, "{}", a),
            Rdata::Aaaa(a) => write!(f, "{}", a),
            Rdata::Ns(n) => write!(f, "{}", n),
            Rdata::Cname(n) => write!(f, "{}", n),
            Rdata::Ptr(n) => write!(f, "{}", n),
            Rdata::Mx { preference, exchange } => write!(f, "{} {}", preference, exchange),
            Rdata::Soa { mname, rname, serial, refresh, retry, expire, minimum } => write!(
                f,
                "{} {} {} {} {} {} {}",
                mname, rname, serial, refresh, retry, expire, minimum
            ),
            Rdata::Srv { priority, weight, port, target } => {
                write!(f, "{} {} {} {}", priority, weight, port, target)
            }
            Rdata::Txt(chunks) => {
                for (i, chunk) in chunks.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "\"{}\"", String::from_utf8_lossy(chunk))?;
                }
                Ok(())
            }
            Rdata::Opaque(bytes) => write!(f, "{} octets opaque", bytes.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use crate::packet::Packet;
    use crate::rfc1035::DNSPacketHeader;

    fn packet_with_rr(rtype: u16, rdata: &Rdata) -> Packet {
        let mut p = Packet::new(512);
        p.set_header(&DNSPacketHeader::default()).unwrap();
        let owner = Name::try_from("example.com").unwrap();
        p.push_rr_with(Section::An, &owner, rtype, CLASS_IN, 3600, |buf| rdata.push(buf))
            .unwrap();
        p
    }

    #[test]
    fn a_record_round_trips() {
        let rdata = Rdata::A(Ipv4Addr::new(192, 0, 2, 1));
        let p = packet_with_rr(TYPE_A, &rdata);
        let (rr, _) = parse_rr(&p, 12, Section::An).unwrap();
        assert_eq!(rr.name, "example.com.");
        let back = rr.rdata(&p).unwrap();
        assert!(matches!(back, Rdata::A(a) if a == Ipv4Addr::new(192, 0, 2, 1)));
    }

    #[test]
    fn mx_record_round_trips_with_compressed_exchange() {
        let rdata = Rdata::Mx { preference: 10, exchange: "mail.example.com.".to_string() };
        let p = packet_with_rr(TYPE_MX, &rdata);
        let (rr, _) = parse_rr(&p, 12, Section::An).unwrap();
        let back = rr.rdata(&p).unwrap();
        assert!(matches!(back, Rdata::Mx { preference: 10, ref exchange } if exchange == "mail.example.com."));
    }

    #[test]
    fn txt_compare_is_always_less() {
        let a = Rdata::Txt(vec![b"hello".to_vec()]);
        let b = Rdata::Txt(vec![b"hello".to_vec()]);
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&a), Ordering::Less);
    }

    #[test]
    fn soa_compare_is_reversed_on_serial() {
        let newer = Rdata::Soa {
            mname: "a.".into(), rname: "b.".into(),
            serial: 10, refresh: 1, retry: 1, expire: 1, minimum: 1,
        };
        let older = Rdata::Soa {
            mname: "a.".into(), rname: "b.".into(),
            serial: 5, refresh: 1, retry: 1, expire: 1, minimum: 1,
        };
        assert_eq!(newer.compare(&older), Ordering::Less);
    }
}
