//! The hosts table: an insertion-ordered, refcounted `(name, family, addr)`
//! map synthesizing answers for a single question, the way a `/etc/hosts`
//! lookup short-circuits a real query. Loading the textual `/etc/hosts`
//! file itself is out of scope; this module only consumes the parsed
//! `(family, addr, fqdn, is_alias)` tuples an external loader hands it.
use std::net::IpAddr;

use crate::error::DNSResult;
use crate::name::Name;
use crate::packet::{Packet, Section};
use crate::rfc1035::DNSPacketHeader;
use crate::rr::{Rdata, CLASS_IN, TYPE_A, TYPE_AAAA, TYPE_PTR};
use crate::util::{anchor, ptr_qname};

/// One hosts-table entry. `is_alias` distinguishes a canonical host line
/// from a later alias of the same address; PTR synthesis only ever
/// matches non-alias entries.
#[derive(Debug, Clone)]
pub struct HostsEntry {
    pub fqdn: String,
    pub addr: IpAddr,
    pub arpa_fqdn: String,
    pub is_alias: bool,
}

impl HostsEntry {
    pub fn new(fqdn: &str, addr: IpAddr, is_alias: bool) -> Self {
        HostsEntry {
            fqdn: anchor(fqdn),
            addr,
            arpa_fqdn: ptr_qname(addr),
            is_alias,
        }
    }

    fn is_v4(&self) -> bool {
        self.addr.is_ipv4()
    }
}

/// An insertion-ordered collection of `HostsEntry`, refcounted the way
/// `hints` is: shared by `Rc` between a resolver and whatever embeds it,
/// released exactly once per `Rc::clone` by `Drop`.
#[derive(Debug, Clone, Default)]
pub struct HostsTable {
    entries: Vec<HostsEntry>,
}

impl HostsTable {
    pub fn new() -> Self {
        HostsTable { entries: Vec::new() }
    }

    pub fn push(&mut self, entry: HostsEntry) {
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Answer a single question against this table, if it has anything to
    /// say. `A`/`AAAA` match by family and case-insensitive hostname
    /// (aliases included); `PTR` matches the `arpa` form of non-alias
    /// entries. Every hit is pushed with TTL 0. Returns `Ok(None)` (not an
    /// error) when nothing in the table answers.
    pub fn query(&self, qname: &str, qtype: u16, qclass: u16) -> DNSResult<Option<Packet>> {
        if qclass != CLASS_IN {
            return Ok(None);
        }

        let hits: Vec<&HostsEntry> = match qtype {
            TYPE_A => self
                .entries
                .iter()
                .filter(|e| e.is_v4() && e.fqdn.eq_ignore_ascii_case(qname))
                .collect(),
            TYPE_AAAA => self
                .entries
                .iter()
                .filter(|e| !e.is_v4() && e.fqdn.eq_ignore_ascii_case(qname))
                .collect(),
            TYPE_PTR => self
                .entries
                .iter()
                .filter(|e| !e.is_alias && e.arpa_fqdn.eq_ignore_ascii_case(qname))
                .collect(),
            _ => Vec::new(),
        };

        if hits.is_empty() {
            return Ok(None);
        }

        let owner = Name::try_from(qname)?;
        let mut packet = Packet::new(65535);
        let mut header = DNSPacketHeader::default();
        header.flags.packet_type = crate::rfc1035::PacketType::Response;
        header.flags.recursion_available = true;
        packet.set_header(&header)?;
        packet.push_question(&owner, qtype, qclass)?;

        for hit in hits {
            match qtype {
                TYPE_A => {
                    if let IpAddr::V4(v4) = hit.addr {
                        let rdata = Rdata::A(v4);
                        packet.push_rr_with(Section::An, &owner, TYPE_A, CLASS_IN, 0, |buf| {
                            rdata.push(buf)
                        })?;
                    }
                }
                TYPE_AAAA => {
                    if let IpAddr::V6(v6) = hit.addr {
                        let rdata = Rdata::Aaaa(v6);
                        packet.push_rr_with(Section::An, &owner, TYPE_AAAA, CLASS_IN, 0, |buf| {
                            rdata.push(buf)
                        })?;
                    }
                }
                TYPE_PTR => {
                    let rdata = Rdata::Ptr(hit.fqdn.clone());
                    packet.push_rr_with(Section::An, &owner, TYPE_PTR, CLASS_IN, 0, |buf| {
                        rdata.push(buf)
                    })?;
                }
                _ => unreachable!(),
            }
        }

        Ok(Some(packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn localhost_a_lookup_hits() {
        let mut hosts = HostsTable::new();
        hosts.push(HostsEntry::new("localhost", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), false));

        let answer = hosts.query("localhost.", TYPE_A, CLASS_IN).unwrap().unwrap();
        assert_eq!(answer.header().unwrap().an_count, 1);
    }

    #[test]
    fn alias_matches_a_lookup_but_not_ptr() {
        let mut hosts = HostsTable::new();
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        hosts.push(HostsEntry::new("canonical.example.", addr, false));
        hosts.push(HostsEntry::new("alias.example.", addr, true));

        assert!(hosts.query("alias.example.", TYPE_A, CLASS_IN).unwrap().is_some());

        let ptr_name = ptr_qname(addr);
        let ptr_answer = hosts.query(&ptr_name, TYPE_PTR, CLASS_IN).unwrap().unwrap();
        let (rr, _) = crate::rr::parse_rr(&ptr_answer, 12 + Name::try_from(ptr_name.as_str()).unwrap().wire_len() + 4, Section::An).unwrap();
        match rr.rdata(&ptr_answer).unwrap() {
            Rdata::Ptr(name) => assert_eq!(name, "canonical.example."),
            _ => panic!("expected PTR"),
        }
    }

    #[test]
    fn no_match_returns_none() {
        let hosts = HostsTable::new();
        assert!(hosts.query("nothing.example.", TYPE_A, CLASS_IN).unwrap().is_none());
    }
}
