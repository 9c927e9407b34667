//! RR iteration: filter/sort records in a packet by predicate, with a
//! deliberately O(N^2) restart discipline. Each `start()`/`skip()` rescans
//! the whole packet rather than caching a cursor, so the iterator survives
//! the packet being re-parsed mid-query.
use std::cmp::Ordering;

use crate::error::DNSResult;
use crate::packet::{Packet, Section};
use crate::prng::shuffle8;
use crate::rr::{parse_question, parse_rr, Rr};

/// A filter over which RRs an iteration considers. `None` means "any".
#[derive(Debug, Clone, Default)]
pub struct RrFilter {
    pub section: Option<Section>,
    pub rtype: Option<u16>,
    pub rclass: Option<u16>,
    pub name: Option<String>,
}

impl RrFilter {
    pub fn matches(&self, rr: &Rr) -> bool {
        if let Some(section) = self.section {
            if rr.section != section {
                return false;
            }
        }
        if let Some(rtype) = self.rtype {
            if rr.rtype != rtype {
                return false;
            }
        }
        if let Some(rclass) = self.rclass {
            // CLASS_ANY (255) is accepted as a wildcard filter.
            if rclass != crate::rr::CLASS_ANY && rr.rclass != rclass {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !rr.name.eq_ignore_ascii_case(name) {
                return false;
            }
        }
        true
    }
}

/// Sort comparators an iterator can be driven by:
/// - `Packet`: stable, by current offset.
/// - `Order`: section, then type grouping, then `Rr::rr_cmp`.
/// - `Shuffle`: section, then a `shuffle8`-keyed random order.
#[derive(Debug, Clone, Copy)]
pub enum SortOrder {
    Packet,
    Order,
    Shuffle { seed: u8 },
}

fn section_rank(section: Section) -> u8 {
    match section {
        Section::Qd => 0,
        Section::An => 1,
        Section::Ns => 2,
        Section::Ar => 3,
    }
}

fn cmp(order: SortOrder, a: &Rr, b: &Rr, packet: &Packet) -> DNSResult<Ordering> {
    match order {
        SortOrder::Packet => Ok(a.offset.cmp(&b.offset)),
        SortOrder::Order => a.rr_cmp(b, packet),
        SortOrder::Shuffle { seed } => {
            if section_rank(a.section) != section_rank(b.section) {
                return Ok(section_rank(a.section).cmp(&section_rank(b.section)));
            }
            let ka = shuffle8((a.offset % 256) as u8, seed);
            let kb = shuffle8((b.offset % 256) as u8, seed);
            Ok(ka.cmp(&kb).then_with(|| a.offset.cmp(&b.offset)))
        }
    }
}

/// Walk every RR (any section) present in `packet`, in on-the-wire order,
/// starting right after the header and the question section.
fn all_records(packet: &Packet) -> DNSResult<Vec<Rr>> {
    let header = packet.header()?;
    let mut out = Vec::new();
    let mut offset = 12usize;

    for _ in 0..header.qd_count {
        let (rr, next) = parse_question(packet, offset)?;
        out.push(rr);
        offset = next;
    }

    let sections = [
        (header.an_count, Section::An),
        (header.ns_count, Section::Ns),
        (header.ar_count, Section::Ar),
    ];
    for (count, section) in sections {
        for _ in 0..count {
            let (rr, next) = parse_rr(packet, offset, section)?;
            out.push(rr);
            offset = next;
        }
    }

    Ok(out)
}

/// A restartable RR iterator over a packet. `start()` scans the whole
/// packet for the minimum matching RR under `order`; `skip(prev)` scans
/// again for the minimum matching RR strictly greater than `prev`. Both are
/// O(N), so a full iteration is O(N^2); the iterator never needs to outlive
/// a `reset()` or cache state the caller must remember to invalidate.
pub struct RrIterator<'p> {
    packet: &'p Packet,
    filter: RrFilter,
    order: SortOrder,
    last: Option<Rr>,
    started: bool,
}

impl<'p> RrIterator<'p> {
    pub fn new(packet: &'p Packet, filter: RrFilter, order: SortOrder) -> Self {
        RrIterator { packet, filter, order, last: None, started: false }
    }

    /// The globally minimum matching RR under `order`.
    pub fn start(&mut self) -> DNSResult<Option<Rr>> {
        self.started = true;
        let candidates = self.matching()?;
        let min = Self::minimum(&candidates, self.order, self.packet)?;
        self.last = min.clone();
        Ok(min)
    }

    /// The minimum matching RR strictly greater than the last one returned
    /// (by `start()` or a previous `skip()`).
    pub fn skip(&mut self, prev: &Rr) -> DNSResult<Option<Rr>> {
        let candidates = self.matching()?;
        let mut best: Option<Rr> = None;
        for rr in &candidates {
            if cmp(self.order, rr, prev, self.packet)? != Ordering::Greater {
                continue;
            }
            best = match best {
                None => Some(rr.clone()),
                Some(ref b) => {
                    if cmp(self.order, rr, b, self.packet)? == Ordering::Less {
                        Some(rr.clone())
                    } else {
                        best
                    }
                }
            };
        }
        self.last = best.clone();
        Ok(best)
    }

    fn matching(&self) -> DNSResult<Vec<Rr>> {
        Ok(all_records(self.packet)?
            .into_iter()
            .filter(|rr| self.filter.matches(rr))
            .collect())
    }

    fn minimum(candidates: &[Rr], order: SortOrder, packet: &Packet) -> DNSResult<Option<Rr>> {
        let mut best: Option<&Rr> = None;
        for rr in candidates {
            best = match best {
                None => Some(rr),
                Some(b) => {
                    if cmp(order, rr, b, packet)? == Ordering::Less {
                        Some(rr)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        Ok(best.cloned())
    }
}

/// Thin `std::iter::Iterator` convenience wrapper around `start()`/`skip()`,
/// for consumers that don't need to interleave anything between calls.
impl<'p> Iterator for RrIterator<'p> {
    type Item = DNSResult<Rr>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = if !self.started {
            self.start()
        } else {
            match self.last.clone() {
                Some(prev) => self.skip(&prev),
                None => Ok(None),
            }
        };
        match result {
            Ok(Some(rr)) => Some(Ok(rr)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use crate::packet::Packet;
    use crate::rfc1035::DNSPacketHeader;
    use crate::rr::{Rdata, TYPE_A, CLASS_IN};
    use std::net::Ipv4Addr;

    fn sample_packet() -> Packet {
        let mut p = Packet::new(512);
        p.set_header(&DNSPacketHeader::default()).unwrap();
        let owner = Name::try_from("example.com").unwrap();
        p.push_question(&owner, TYPE_A, CLASS_IN).unwrap();

        for octet in [1u8, 2, 3] {
            let rdata = Rdata::A(Ipv4Addr::new(192, 0, 2, octet));
            p.push_rr_with(Section::An, &owner, TYPE_A, CLASS_IN, 3600, |buf| rdata.push(buf))
                .unwrap();
        }
        p
    }

    #[test]
    fn packet_order_iteration_visits_every_an_record_once() {
        let p = sample_packet();
        let filter = RrFilter { section: Some(Section::An), ..Default::default() };
        let mut it = RrIterator::new(&p, filter, SortOrder::Packet);

        let mut seen = Vec::new();
        while let Some(rr) = it.next() {
            seen.push(rr.unwrap().offset);
        }
        assert_eq!(seen.len(), 3);
        // Packet order is by ascending offset.
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn shuffle_order_is_a_permutation_of_the_same_set() {
        let p = sample_packet();
        let filter = RrFilter { section: Some(Section::An), ..Default::default() };

        let mut packet_order = RrIterator::new(&p, filter.clone(), SortOrder::Packet);
        let mut baseline: Vec<usize> = Vec::new();
        while let Some(rr) = packet_order.next() {
            baseline.push(rr.unwrap().offset);
        }

        let mut shuffled = RrIterator::new(&p, filter, SortOrder::Shuffle { seed: 42 });
        let mut got: Vec<usize> = Vec::new();
        while let Some(rr) = shuffled.next() {
            got.push(rr.unwrap().offset);
        }
        got.sort();
        baseline.sort();
        assert_eq!(got, baseline);
    }

    #[test]
    fn filter_by_name_excludes_non_matching_owners() {
        let p = sample_packet();
        let filter = RrFilter {
            section: Some(Section::An),
            name: Some("nope.example.com.".to_string()),
            ..Default::default()
        };
        let mut it = RrIterator::new(&p, filter, SortOrder::Packet);
        assert!(it.start().unwrap().is_none());
    }
}
