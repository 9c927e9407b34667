//! Display method: as we can't impl the Display trait outside the module where it's defined, and
//! to not put these methods in the lib, use a wrapper
use std::fmt;

use dnslib::error::DNSResult;
use dnslib::packet::{Packet, Section};
use dnslib::rfc1035::{DNSPacketFlags, DNSPacketHeader, PacketType};
use dnslib::rr_iterator::{RrFilter, RrIterator, SortOrder};

pub struct DisplayWrapper<'a, T>(pub &'a T);

// Now we can implement the Display trait for DisplayWrapper for all structure we want to display
impl fmt::Display for DisplayWrapper<'_, DNSPacketHeader> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // output depends on whether it's a query or a response
        // because some fields are unnecessary when Query or Response
        write!(f, "id:{:X}({}) ", self.0.id, self.0.id)?;
        write!(f, "flags:[{}] ", DisplayWrapper(&self.0.flags))?;

        if self.0.flags.packet_type == PacketType::Query {
            write!(f, "qd:{}", self.0.qd_count)
        } else {
            write!(
                f,
                "qd:{}, an:{} ns:{} ar:{}",
                self.0.qd_count, self.0.an_count, self.0.ns_count, self.0.ar_count
            )
        }
    }
}

impl fmt::Display for DisplayWrapper<'_, DNSPacketFlags> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // output depends on whether it's a query or a response
        // because some fields are unnecessary when Query or Response
        write!(f, "{:?} ", self.0.packet_type)?;

        if self.0.packet_type == PacketType::Query {
            write!(f, "opcode:{:?} rd:{}", self.0.op_code, self.0.recursion_desired)
        } else {
            write!(
                f,
                "opcode:{:?} tc:{} ra:{} rcode:{:?}",
                self.0.op_code, self.0.truncated, self.0.recursion_available, self.0.response_code
            )
        }
    }
}

/// Print the header, then every RR in ANSWER/AUTHORITY/ADDITIONAL, section
/// by section and in on-the-wire order.
pub fn display_answer(answer: &Packet) -> DNSResult<()> {
    let header = answer.header()?;
    println!("ANSWER: {}", DisplayWrapper(&header));

    for (label, section) in [("ANSWER", Section::An), ("AUTHORITY", Section::Ns), ("ADDITIONAL", Section::Ar)] {
        let filter = RrFilter { section: Some(section), ..Default::default() };
        let mut any = false;
        for rr in RrIterator::new(answer, filter, SortOrder::Packet) {
            let rr = rr?;
            if !any {
                println!(";; {} SECTION:", label);
                any = true;
            }
            let rdata = rr.rdata(answer)?;
            println!("{}\t{}\tIN\t{}\t{}", rr.name, rr.ttl, rtype_name(rr.rtype), rdata);
        }
    }

    Ok(())
}

/// A short mnemonic for the handful of types this crate parses natively;
/// anything else is printed as its raw numeric value.
fn rtype_name(rtype: u16) -> String {
    use dnslib::rr::*;
    match rtype {
        TYPE_A => "A".to_string(),
        TYPE_NS => "NS".to_string(),
        TYPE_CNAME => "CNAME".to_string(),
        TYPE_SOA => "SOA".to_string(),
        TYPE_PTR => "PTR".to_string(),
        TYPE_MX => "MX".to_string(),
        TYPE_TXT => "TXT".to_string(),
        TYPE_AAAA => "AAAA".to_string(),
        TYPE_SRV => "SRV".to_string(),
        other => other.to_string(),
    }
}
