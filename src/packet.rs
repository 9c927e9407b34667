//! The packet buffer: a growable byte buffer with header accessors and a
//! bounded name-compression dictionary, shared by every RR a message writer
//! appends. Also the read side: raw accessors (`read_u16`, `slice`,
//! `expand_name`) that `rr`/`rr_iterator` build typed views on top of.
use crate::error::{DNSError, DNSResult};
use crate::name::Name;
use crate::network_order::ToFromNetworkOrder;
use crate::rfc1035::DNSPacketHeader;

/// Size of the compression dictionary: a name suffix already written to the
/// packet can be referenced by a pointer as long as it's still one of the
/// 16 most recently inserted suffixes. Past that it's written out again in
/// full — correct either way, just a few bytes larger on the wire.
const DICT_SIZE: usize = 16;
/// Compression pointers are 14 bits; a suffix written past this offset can
/// never be pointed back to.
const MAX_POINTER_OFFSET: usize = 0x3FFF;

/// Which section of the message an RR belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Qd,
    An,
    Ns,
    Ar,
}

#[derive(Debug, Clone)]
struct DictEntry {
    suffix: String,
    offset: u16,
}

/// A DNS message under construction (or just parsed): the raw bytes plus
/// the compression dictionary used while appending more records to it.
/// `end` tracks the valid prefix of `buf` — `push_*` methods only ever
/// append past `end`, and roll `end` back on a `NoBufs` failure so a caller
/// can retry against a bigger limit (e.g. promoting a truncated UDP query
/// to TCP) without re-serializing what already fit.
#[derive(Debug, Clone)]
pub struct Packet {
    buf: Vec<u8>,
    end: usize,
    max_size: usize,
    dict: [Option<DictEntry>; DICT_SIZE],
    next_slot: usize,
}

impl Packet {
    pub fn new(max_size: usize) -> Self {
        Packet {
            buf: Vec::with_capacity(max_size.min(4096)),
            end: 0,
            max_size,
            dict: Default::default(),
            next_slot: 0,
        }
    }

    /// Wrap bytes just read off the wire as a parseable packet. `max_size`
    /// is set to the buffer's own length — nothing more is ever appended to
    /// a wire-received packet except by `resolver::merge`, which goes
    /// through a fresh writer packet instead.
    pub fn from_wire(buf: Vec<u8>) -> Self {
        let end = buf.len();
        Packet {
            buf,
            end,
            max_size: end,
            dict: Default::default(),
            next_slot: 0,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.end]
    }

    pub fn len(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Grow the backing buffer (and its declared capacity) to at least
    /// `new_max` bytes. Used by the TCP receive path to size the answer
    /// buffer to `max(minbuf, announced_length)` once the 2-byte length
    /// prefix is known.
    pub fn grow_to(&mut self, new_max: usize) {
        if new_max > self.max_size {
            self.max_size = new_max;
        }
        if self.buf.len() < new_max {
            self.buf.resize(new_max, 0);
        }
    }

    pub fn header(&self) -> DNSResult<DNSPacketHeader> {
        let mut cursor = std::io::Cursor::new(&self.buf[..self.end]);
        let mut header = DNSPacketHeader::default();
        header.from_network_bytes(&mut cursor)?;
        Ok(header)
    }

    /// Write the 12-byte header at the start of the buffer, growing it if
    /// this is the first write.
    pub fn set_header(&mut self, header: &DNSPacketHeader) -> DNSResult<()> {
        let mut tmp = Vec::new();
        header.to_network_bytes(&mut tmp)?;
        if self.buf.len() < tmp.len() {
            self.buf.resize(tmp.len(), 0);
        }
        self.buf[..tmp.len()].copy_from_slice(&tmp);
        self.end = self.end.max(tmp.len());
        Ok(())
    }

    /// Append a name, compressed against the dictionary where possible.
    /// Rolls back to the pre-call length and returns `DNSError::NoBufs` if
    /// `max_size` would be exceeded.
    pub fn push_name(&mut self, name: &Name) -> DNSResult<usize> {
        let start = self.end;
        let suffixes = Self::suffixes(name);

        let mut matched: Option<(usize, u16)> = None;
        for (i, suffix) in suffixes.iter().enumerate() {
            if suffix == "." {
                continue;
            }
            if let Some(offset) = self.find(suffix) {
                matched = Some((i, offset));
                break;
            }
        }

        let labels = name.labels();
        let written_labels = matched.map(|(i, _)| i).unwrap_or(labels.len());

        let result = (|| -> DNSResult<usize> {
            let mut written = 0usize;
            for label in &labels[..written_labels] {
                self.push_byte(label.len() as u8)?;
                for b in label.bytes() {
                    self.push_byte(b)?;
                }
                written += 1 + label.len();
            }

            match matched {
                Some((_, offset)) => {
                    let pointer = 0xC000u16 | offset;
                    self.push_byte((pointer >> 8) as u8)?;
                    self.push_byte((pointer & 0xFF) as u8)?;
                    written += 2;
                }
                None => {
                    self.push_byte(0)?;
                    written += 1;
                }
            }
            Ok(written)
        })();

        match result {
            Ok(written) => {
                self.register_suffixes(&suffixes, written_labels, start);
                Ok(written)
            }
            Err(e) => {
                self.end = start;
                Err(e)
            }
        }
    }

    /// Append a question: owner name, 2-byte QTYPE, 2-byte QCLASS, then bump
    /// `qdcount`. Requires `set_header` to already have been called so the
    /// header's 12 bytes exist to patch.
    pub fn push_question(&mut self, name: &Name, qtype: u16, qclass: u16) -> DNSResult<usize> {
        let start = self.end;
        let result = (|| -> DNSResult<usize> {
            let mut written = self.push_name(name)?;
            written += self.push_u16(qtype)?;
            written += self.push_u16(qclass)?;
            Ok(written)
        })();

        match result {
            Ok(written) => {
                let mut h = self.header()?;
                h.qd_count += 1;
                self.set_header(&h)?;
                Ok(written)
            }
            Err(e) => {
                self.end = start;
                Err(e)
            }
        }
    }

    /// Append a full RR into `section` (never `Section::Qd`; use
    /// `push_question` for that): owner name, type, class, a 32-bit TTL
    /// (bit 31 masked per RFC1035 §3.2.1), then dispatch to `write_rdata` to produce
    /// the RDATA body — which may itself call `push_name` to compress an
    /// embedded name (NS/CNAME/PTR/MX/SOA/SRV all do). The 2-byte RDLENGTH
    /// is reserved up front and backpatched once the body's length is
    /// known. Rolls back to the pre-call length on any failure.
    pub fn push_rr_with<F>(
        &mut self,
        section: Section,
        name: &Name,
        rtype: u16,
        rclass: u16,
        ttl: u32,
        write_rdata: F,
    ) -> DNSResult<usize>
    where
        F: FnOnce(&mut Packet) -> DNSResult<()>,
    {
        assert_ne!(section, Section::Qd, "use push_question for the QD section");
        let start = self.end;

        let result = (|| -> DNSResult<usize> {
            let mut written = self.push_name(name)?;
            written += self.push_u16(rtype)?;
            written += self.push_u16(rclass)?;
            written += self.push_u32(ttl & 0x7FFF_FFFF)?;

            let rdlen_offset = self.end;
            written += self.push_u16(0)?; // placeholder, backpatched below
            let rdata_start = self.end;

            write_rdata(self)?;

            let rdata_len = self.end - rdata_start;
            if rdata_len > u16::MAX as usize {
                return Err(DNSError::illegal("RDATA longer than 65535 octets"));
            }
            written += rdata_len;

            let len_bytes = (rdata_len as u16).to_be_bytes();
            self.buf[rdlen_offset] = len_bytes[0];
            self.buf[rdlen_offset + 1] = len_bytes[1];

            Ok(written)
        })();

        match result {
            Ok(written) => {
                let mut h = self.header()?;
                match section {
                    Section::Qd => unreachable!(),
                    Section::An => h.an_count += 1,
                    Section::Ns => h.ns_count += 1,
                    Section::Ar => h.ar_count += 1,
                }
                self.set_header(&h)?;
                Ok(written)
            }
            Err(e) => {
                self.end = start;
                Err(e)
            }
        }
    }

    /// Convenience over `push_rr_with` for already-encoded, opaque RDATA
    /// (no compression inside the body).
    pub fn push_opaque_rr(
        &mut self,
        section: Section,
        name: &Name,
        rtype: u16,
        rclass: u16,
        ttl: u32,
        rdata: &[u8],
    ) -> DNSResult<usize> {
        self.push_rr_with(section, name, rtype, rclass, ttl, |p| {
            for &b in rdata {
                p.push_byte(b)?;
            }
            Ok(())
        })
    }

    pub fn push_byte(&mut self, b: u8) -> DNSResult<()> {
        if self.end >= self.max_size {
            return Err(DNSError::NoBufs);
        }
        if self.end == self.buf.len() {
            self.buf.push(b);
        } else {
            self.buf[self.end] = b;
        }
        self.end += 1;
        Ok(())
    }

    pub fn push_u16(&mut self, v: u16) -> DNSResult<usize> {
        self.push_byte((v >> 8) as u8)?;
        self.push_byte((v & 0xFF) as u8)?;
        Ok(2)
    }

    pub fn push_u32(&mut self, v: u32) -> DNSResult<usize> {
        for shift in [24, 16, 8, 0] {
            self.push_byte((v >> shift) as u8)?;
        }
        Ok(4)
    }

    /// Decompress a name starting at `offset`, per `name::expand`.
    pub fn expand_name(&self, offset: usize) -> DNSResult<(String, usize)> {
        crate::name::expand(&self.buf[..self.end], offset)
    }

    pub fn read_u16(&self, offset: usize) -> DNSResult<u16> {
        if offset + 2 > self.end {
            return Err(DNSError::illegal("read past end of packet"));
        }
        Ok(u16::from_be_bytes([self.buf[offset], self.buf[offset + 1]]))
    }

    pub fn read_u32(&self, offset: usize) -> DNSResult<u32> {
        if offset + 4 > self.end {
            return Err(DNSError::illegal("read past end of packet"));
        }
        Ok(u32::from_be_bytes([
            self.buf[offset],
            self.buf[offset + 1],
            self.buf[offset + 2],
            self.buf[offset + 3],
        ]))
    }

    pub fn slice(&self, offset: usize, len: usize) -> DNSResult<&[u8]> {
        if offset + len > self.end {
            return Err(DNSError::illegal("read past end of packet"));
        }
        Ok(&self.buf[offset..offset + len])
    }

    fn find(&self, suffix: &str) -> Option<u16> {
        self.dict
            .iter()
            .flatten()
            .find(|e| e.suffix == suffix)
            .map(|e| e.offset)
    }

    fn register_suffixes(&mut self, suffixes: &[String], written_labels: usize, start: usize) {
        let mut offset = start;
        for (i, suffix) in suffixes.iter().enumerate().take(written_labels) {
            if suffix != "." && offset <= MAX_POINTER_OFFSET && self.find(suffix).is_none() {
                self.insert(suffix.clone(), offset as u16);
            }
            // advance offset by this label's wire length (length octet + bytes);
            // suffixes[i] is "label.<suffixes[i+1]>", so its length minus the next
            // suffix's length (minus the separating dot) is this label's length.
            let label_len = if i + 1 < suffixes.len() {
                suffix.len() - suffixes[i + 1].len() - 1
            } else {
                suffix.len() - 1
            };
            offset += label_len + 1;
        }
    }

    fn insert(&mut self, suffix: String, offset: u16) {
        self.dict[self.next_slot] = Some(DictEntry { suffix, offset });
        self.next_slot = (self.next_slot + 1) % DICT_SIZE;
    }

    /// `"www.example.com."` -> `["www.example.com.", "example.com.", "com.",
    /// "."]`, longest first.
    fn suffixes(name: &Name) -> Vec<String> {
        let mut v = Vec::new();
        let mut cur = name.clone();
        loop {
            v.push(cur.to_string());
            match cur.cleave() {
                Some(next) => cur = next,
                None => break,
            }
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_name_compresses_repeated_suffix() {
        let mut p = Packet::new(512);
        let a = Name::try_from("www.example.com").unwrap();
        let b = Name::try_from("mail.example.com").unwrap();

        let first = p.push_name(&a).unwrap();
        let second = p.push_name(&b).unwrap();

        // "a" writes uncompressed; "b" should reuse "example.com." via a pointer
        // rather than writing all its labels out again.
        assert_eq!(first, a.wire_len());
        assert!(second < b.wire_len());
    }

    #[test]
    fn push_name_exact_repeat_is_a_single_pointer() {
        let mut p = Packet::new(512);
        let a = Name::try_from("www.example.com").unwrap();

        p.push_name(&a).unwrap();
        let second = p.push_name(&a).unwrap();
        assert_eq!(second, 2);
    }

    #[test]
    fn push_rolls_back_on_nobufs() {
        let mut p = Packet::new(4);
        let a = Name::try_from("www.example.com").unwrap();
        let before = p.len();
        let err = p.push_name(&a).unwrap_err();
        assert!(matches!(err, DNSError::NoBufs));
        assert_eq!(p.len(), before);
    }

    #[test]
    fn header_round_trips_through_set_header() {
        let mut p = Packet::new(512);
        let mut header = DNSPacketHeader::default();
        header.id = 0xBEEF;
        header.qd_count = 1;
        p.set_header(&header).unwrap();

        let back = p.header().unwrap();
        assert_eq!(back.id, 0xBEEF);
        assert_eq!(back.qd_count, 1);
    }

    #[test]
    fn push_question_bumps_qdcount() {
        let mut p = Packet::new(512);
        p.set_header(&DNSPacketHeader::default()).unwrap();
        let n = Name::try_from("example.com").unwrap();
        p.push_question(&n, 1, 1).unwrap();
        assert_eq!(p.header().unwrap().qd_count, 1);

        let (text, next) = p.expand_name(12).unwrap();
        assert_eq!(text, "example.com.");
        assert_eq!(p.read_u16(next).unwrap(), 1);
        assert_eq!(p.read_u16(next + 2).unwrap(), 1);
    }

    #[test]
    fn push_rr_with_backpatches_rdlength_and_compresses_rdata_name() {
        let mut p = Packet::new(512);
        p.set_header(&DNSPacketHeader::default()).unwrap();
        let owner = Name::try_from("example.com").unwrap();
        p.push_question(&owner, 2, 1).unwrap();

        let target = Name::try_from("ns1.example.com").unwrap();
        p.push_rr_with(Section::An, &owner, 2, 1, 3600, |buf| {
            buf.push_name(&target)
        })
        .unwrap();

        assert_eq!(p.header().unwrap().an_count, 1);
        // the RR's owner name should itself have compressed against the question.
        // Walk past the question to find the RR and check its RDLENGTH is
        // shorter than target's uncompressed wire length (pointer to "example.com.").
        let (_q, after_q) = p.expand_name(12).unwrap();
        let after_q = after_q + 4; // qtype + qclass
        let (_rr_name, after_name) = p.expand_name(after_q).unwrap();
        let rdlen = p.read_u16(after_name + 2 + 2 + 4).unwrap();
        assert!((rdlen as usize) < target.wire_len());
    }
}
