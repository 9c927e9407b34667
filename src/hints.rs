//! The hints table: per-zone nameserver address sets with priority and a
//! shuffle for iteration order, plus the root-hints bootstrap table used to
//! seed recursive mode when no stub nameservers are configured.
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::DNSResult;
use crate::name::Name;
use crate::packet::{Packet, Section};
use crate::prng::{shuffle8, Prng};
use crate::rfc1035::DNSPacketHeader;
use crate::rr::{Rdata, CLASS_IN, TYPE_AAAA, TYPE_A, TYPE_NS};
use crate::util::{anchor, cleave};

/// Bound on stored addresses per zone: a fixed 16-entry array with
/// wrap-around insertion once full.
const ZONE_CAPACITY: usize = 16;

/// Priority 0 is reserved to mean "unset"; real priorities start at 1.
const UNSET_PRIORITY: u32 = 0;

/// Synthetic nameserver hostname this table answers NS queries with — the
/// hints table doesn't track real nameserver *names*, only addresses, so
/// every zone's delegation points at the same placeholder host, whose A/AAAA
/// glue is the zone's actual address set.
const HINTS_HOST: &str = "hints.local.";

#[derive(Debug, Clone, Copy)]
struct HintEntry {
    addr: SocketAddr,
    priority: u32,
}

#[derive(Debug, Clone, Default)]
struct ZoneHints {
    entries: [Option<HintEntry>; ZONE_CAPACITY],
    next_slot: usize,
}

impl ZoneHints {
    fn insert(&mut self, addr: SocketAddr, priority: u32) {
        self.entries[self.next_slot] = Some(HintEntry { addr, priority });
        self.next_slot = (self.next_slot + 1) % ZONE_CAPACITY;
    }

    fn iter(&self) -> impl Iterator<Item = &HintEntry> {
        self.entries.iter().flatten()
    }
}

/// Map `zone_fqdn -> [(sockaddr, priority)]`.
#[derive(Debug, Clone, Default)]
pub struct HintsTable {
    zones: HashMap<String, ZoneHints>,
}

impl HintsTable {
    pub fn new() -> Self {
        HintsTable { zones: HashMap::new() }
    }

    /// Insert an address for `zone` (wraps mod `ZONE_CAPACITY` per zone).
    /// `priority` must be ≥ 1; `priority == 0` is silently corrected to 1
    /// since 0 is the table's own "unset" sentinel.
    pub fn insert(&mut self, zone: &str, addr: SocketAddr, priority: u32) {
        let priority = if priority == UNSET_PRIORITY { 1 } else { priority };
        self.zones.entry(anchor(zone)).or_default().insert(addr, priority);
    }

    /// Seed this table with the 13 IANA root server addresses under the
    /// root zone `"."`, for driving recursion from root hints when no stub
    /// nameservers are configured.
    pub fn with_root_hints() -> Self {
        let mut table = HintsTable::new();
        for (i, ip) in ROOT_HINTS.iter().enumerate() {
            table.insert(".", SocketAddr::new(IpAddr::V4(*ip), 53), (i + 1) as u32);
        }
        table
    }

    /// Walk outward from `qname`, cleaving the leading label, until a
    /// configured zone matches; build a synthetic referral response:
    /// question echoed, an NS RR for the matched zone in AUTHORITY
    /// pointing at the placeholder `hints.local.` host, and one A/AAAA
    /// additional per stored address for that host. `Ok(None)` if no zone
    /// (not even the root) has any addresses.
    pub fn query(&self, qname: &str, qtype: u16, qclass: u16) -> DNSResult<Option<Packet>> {
        let mut zone = anchor(qname);
        let matched = loop {
            if let Some(z) = self.zones.get(&zone) {
                if z.iter().next().is_some() {
                    break Some((zone.clone(), z));
                }
            }
            match cleave(&zone) {
                Some(parent) => zone = parent,
                None => break None,
            }
        };

        let (zone_name, hints) = match matched {
            Some(pair) => pair,
            None => return Ok(None),
        };

        let owner = Name::try_from(qname)?;
        let zone = Name::try_from(zone_name.as_str())?;
        let host = Name::try_from(HINTS_HOST)?;

        let mut packet = Packet::new(65535);
        let mut header = DNSPacketHeader::default();
        header.flags.packet_type = crate::rfc1035::PacketType::Response;
        header.flags.recursion_available = true;
        packet.set_header(&header)?;
        packet.push_question(&owner, qtype, qclass)?;

        let ns_rdata = Rdata::Ns(HINTS_HOST.to_string());
        packet.push_rr_with(Section::Ns, &zone, TYPE_NS, CLASS_IN, 0, |buf| ns_rdata.push(buf))?;

        for entry in hints.iter() {
            match entry.addr.ip() {
                IpAddr::V4(v4) => {
                    let rdata = Rdata::A(v4);
                    packet.push_rr_with(Section::Ar, &host, TYPE_A, CLASS_IN, 0, |buf| {
                        rdata.push(buf)
                    })?;
                }
                IpAddr::V6(v6) => {
                    let rdata = Rdata::Aaaa(v6);
                    packet.push_rr_with(Section::Ar, &host, TYPE_AAAA, CLASS_IN, 0, |buf| {
                        rdata.push(buf)
                    })?;
                }
            }
        }

        Ok(Some(packet))
    }

    /// Ordered addresses for `zone` only (no outward walk): `(priority
    /// ASC, shuffle8(index, seed) ASC)`, `seed` drawn fresh (non-zero) from
    /// `prng` for this call.
    pub fn ordered_addresses(&self, zone: &str, prng: &mut dyn Prng) -> Vec<SocketAddr> {
        let zone = anchor(zone);
        let hints = match self.zones.get(&zone) {
            Some(h) => h,
            None => return Vec::new(),
        };

        let mut seed = (prng.next_u32() & 0xFF) as u8;
        if seed == 0 {
            seed = 1;
        }

        let mut indexed: Vec<(u8, &HintEntry)> = hints.iter().enumerate().map(|(i, e)| (i as u8, e)).collect();
        indexed.sort_by(|(ia, a), (ib, b)| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| shuffle8(*ia, seed).cmp(&shuffle8(*ib, seed)))
        });
        indexed.into_iter().map(|(_, e)| e.addr).collect()
    }
}

/// The 13 IANA root server addresses (A.ROOT-SERVERS.NET .. M.ROOT-SERVERS.NET),
/// IPv4 only — stable, public data, not parsing logic, so it's carried as an
/// ambient constant rather than loaded from any external config source.
pub const ROOT_HINTS: [Ipv4Addr; 13] = [
    Ipv4Addr::new(198, 41, 0, 4),
    Ipv4Addr::new(199, 9, 14, 201),
    Ipv4Addr::new(192, 33, 4, 12),
    Ipv4Addr::new(199, 7, 91, 13),
    Ipv4Addr::new(192, 203, 230, 10),
    Ipv4Addr::new(192, 5, 5, 241),
    Ipv4Addr::new(192, 112, 36, 4),
    Ipv4Addr::new(198, 97, 190, 53),
    Ipv4Addr::new(192, 36, 148, 17),
    Ipv4Addr::new(192, 58, 128, 30),
    Ipv4Addr::new(193, 0, 14, 129),
    Ipv4Addr::new(199, 7, 83, 42),
    Ipv4Addr::new(202, 12, 27, 33),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::OsPrng;

    #[test]
    fn root_hints_answer_any_qname_via_outward_walk() {
        let table = HintsTable::with_root_hints();
        let answer = table.query("www.example.com.", TYPE_A, CLASS_IN).unwrap().unwrap();
        let header = answer.header().unwrap();
        assert_eq!(header.ns_count, 1);
        assert_eq!(header.ar_count, ROOT_HINTS.len() as u16);
    }

    #[test]
    fn more_specific_zone_wins_over_root() {
        let mut table = HintsTable::with_root_hints();
        table.insert("example.com.", SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 53), 1);

        let answer = table.query("www.example.com.", TYPE_A, CLASS_IN).unwrap().unwrap();
        assert_eq!(answer.header().unwrap().ar_count, 1);
    }

    #[test]
    fn unconfigured_table_returns_none() {
        let table = HintsTable::new();
        assert!(table.query("anything.", TYPE_A, CLASS_IN).unwrap().is_none());
    }

    #[test]
    fn ordered_addresses_respects_priority() {
        let mut table = HintsTable::new();
        let hi = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), 53);
        let lo = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)), 53);
        table.insert("example.com.", lo, 5);
        table.insert("example.com.", hi, 1);

        let mut prng = OsPrng;
        let ordered = table.ordered_addresses("example.com.", &mut prng);
        assert_eq!(ordered[0], hi);
    }
}
