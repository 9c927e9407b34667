//! Fixed-shape wire structures from RFC1035 §4.1: the message header, its
//! flags word, the opcode/response-code/QTYPE/QCLASS enumerations, and the
//! `<character-string>` primitive. Domain names live in `name`; resource
//! records (owner name + typed RDATA) live in `rr`.
//!
//! `DnsStruct` auto-generates `ToFromNetworkOrder` by serializing every
//! field in order; `DnsEnum` auto-generates `Default`/`TryFrom`/`FromStr` for
//! the fieldless wire enums below.
use std::fmt;

use crate::derive_enum;
use crate::network_order::ToFromNetworkOrder;

use dns_derive::{DnsEnum, DnsStruct};

pub const MAX_UDP_PACKET_SIZE: usize = 512;

/// The conventional "I can reassemble/receive a larger UDP payload" size a
/// classic resolver would advertise via an EDNS0 OPT RR. No OPT RR is ever
/// built or parsed here (out of scope); `edns0: true` only widens the query
/// buffer to this size instead of the plain RFC1035 512-byte limit.
pub const EDNS0_UDP_PAYLOAD_SIZE: usize = 4096;

/// DNS message header, RFC1035 §4.1.1.
#[derive(Debug, Default, Clone, DnsStruct)]
pub struct DNSPacketHeader {
    /// 16 bit identifier assigned by the requester; copied verbatim into
    /// the response and used to match replies to outstanding queries.
    pub id: u16,
    pub flags: DNSPacketFlags,
    pub qd_count: u16,
    pub an_count: u16,
    pub ns_count: u16,
    pub ar_count: u16,
}

/// The flags word, RFC1035 §4.1.1.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DNSPacketFlags {
    pub packet_type: PacketType,
    pub op_code: OpCode,
    pub authorative_answer: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    /// Reserved; must be zero on the wire, but three EDNS0 implementations
    /// disagree enough in practice that this crate reads it back rather
    /// than asserting it.
    pub z: bool,
    pub authentic_data: bool,
    pub checking_disabled: bool,
    pub response_code: ResponseCode,
}

/// ```
/// use dnslib::network_order::ToFromNetworkOrder;
/// use dnslib::rfc1035::{DNSPacketFlags, OpCode, ResponseCode};
///
/// let flags = DNSPacketFlags {
///     packet_type: dnslib::rfc1035::PacketType::Response,
///     op_code: OpCode::Query,
///     authorative_answer: true,
///     truncated: false,
///     recursion_desired: true,
///     recursion_available: true,
///     z: false,
///     authentic_data: false,
///     checking_disabled: false,
///     response_code: ResponseCode::NoError,
/// };
///
/// let mut buffer: Vec<u8> = Vec::new();
/// assert!(flags.to_network_bytes(&mut buffer).is_ok());
///
/// let mut cursor = std::io::Cursor::new(buffer.as_slice());
/// let mut back = DNSPacketFlags::default();
/// assert!(back.from_network_bytes(&mut cursor).is_ok());
/// assert_eq!(back, flags);
/// ```
impl ToFromNetworkOrder for DNSPacketFlags {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> crate::error::DNSResult<usize> {
        //                               1  1  1  1  1  1
        // 0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // |QR|   Opcode  |AA|TC|RD|RA| Z|AD|CD|   RCODE   |
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        let mut flags = (self.packet_type as u16) << 15;
        flags |= (self.op_code as u16) << 11;
        flags |= (self.authorative_answer as u16) << 10;
        flags |= (self.truncated as u16) << 9;
        flags |= (self.recursion_desired as u16) << 8;
        flags |= (self.recursion_available as u16) << 7;
        flags |= (self.z as u16) << 6;
        flags |= (self.authentic_data as u16) << 5;
        flags |= (self.checking_disabled as u16) << 4;
        flags |= self.response_code as u16;

        flags.to_network_bytes(buffer)
    }

    fn from_network_bytes(&mut self, buffer: &mut std::io::Cursor<&[u8]>) -> crate::error::DNSResult<()> {
        let mut flags = 0u16;
        flags.from_network_bytes(buffer)?;

        self.packet_type = PacketType::try_from(((flags >> 15) & 1) as u16)
            .map_err(|e| crate::error::DNSError::new(&e))?;
        self.op_code =
            OpCode::try_from((flags >> 11) & 0b1111).map_err(|e| crate::error::DNSError::new(&e))?;
        self.authorative_answer = (flags >> 10) & 1 == 1;
        self.truncated = (flags >> 9) & 1 == 1;
        self.recursion_desired = (flags >> 8) & 1 == 1;
        self.recursion_available = (flags >> 7) & 1 == 1;
        self.z = (flags >> 6) & 1 == 1;
        self.authentic_data = (flags >> 5) & 1 == 1;
        self.checking_disabled = (flags >> 4) & 1 == 1;
        self.response_code =
            ResponseCode::try_from(flags & 0b1111).map_err(|e| crate::error::DNSError::new(&e))?;

        Ok(())
    }
}

/// Whether this message is a query or a response (the flags word's top
/// bit). An enum reads better at call sites than a raw bool.
#[derive(Debug, Clone, Copy, PartialEq, DnsEnum)]
#[repr(u8)]
pub enum PacketType {
    Query = 0,
    Response = 1,
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PacketType::Query => write!(f, "QUERY"),
            PacketType::Response => write!(f, "RESPONSE"),
        }
    }
}

// https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-5
#[derive(Debug, Clone, Copy, PartialEq, DnsEnum)]
#[repr(u8)]
pub enum OpCode {
    Query = 0,
    IQuery = 1,
    Status = 2,
    Unassigned = 3,
    Notify = 4,
    Update = 5,
    DSO = 6,
}

// https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-6
#[derive(Debug, Clone, Copy, PartialEq, DnsEnum)]
#[repr(u16)]
pub enum ResponseCode {
    NoError = 0,
    FormErr = 1,
    ServFail = 2,
    NXDomain = 3,
    NotImp = 4,
    Refused = 5,
    YXDomain = 6,
    YXRRSet = 7,
    NXRRSet = 8,
    NotAuth = 9,
    NotZone = 10,
    DSOTYPENI = 11,
    BADVERS = 16,
    BADKEY = 17,
    BADTIME = 18,
    BADMODE = 19,
    BADNAME = 20,
    BADALG = 21,
    BADTRUNC = 22,
    BADCOOKIE = 23,
}

// https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-4
#[derive(Debug, Copy, Clone, PartialEq, DnsEnum)]
#[repr(u16)]
pub enum QType {
    A = 1,
    NS = 2,
    MD = 3,
    MF = 4,
    CNAME = 5,
    SOA = 6,
    MB = 7,
    MG = 8,
    MR = 9,
    NULL = 10,
    WKS = 11,
    PTR = 12,
    HINFO = 13,
    MINFO = 14,
    MX = 15,
    TXT = 16,
    RP = 17,
    AFSDB = 18,
    X25 = 19,
    ISDN = 20,
    RT = 21,
    NSAP = 22,
    NSAPPTR = 23,
    SIG = 24,
    KEY = 25,
    PX = 26,
    GPOS = 27,
    AAAA = 28,
    LOC = 29,
    NXT = 30,
    EID = 31,
    NIMLOC = 32,
    SRV = 33,
    ATMA = 34,
    NAPTR = 35,
    KX = 36,
    CERT = 37,
    A6 = 38,
    DNAME = 39,
    SINK = 40,
    OPT = 41,
    APL = 42,
    DS = 43,
    SSHFP = 44,
    IPSECKEY = 45,
    RRSIG = 46,
    NSEC = 47,
    DNSKEY = 48,
    DHCID = 49,
    NSEC3 = 50,
    NSEC3PARAM = 51,
    TLSA = 52,
    SMIMEA = 53,
    Unassigned = 54,
    HIP = 55,
    NINFO = 56,
    RKEY = 57,
    TALINK = 58,
    CDS = 59,
    CDNSKEY = 60,
    OPENPGPKEY = 61,
    CSYNC = 62,
    ZONEMD = 63,
    SVCB = 64,
    HTTPS = 65,
    SPF = 99,
    UINFO = 100,
    UID = 101,
    GID = 102,
    UNSPEC = 103,
    NID = 104,
    L32 = 105,
    L64 = 106,
    LP = 107,
    EUI48 = 108,
    EUI64 = 109,
    TKEY = 249,
    TSIG = 250,
    IXFR = 251,
    AXFR = 252,
    MAILB = 253,
    MAILA = 254,
    ANY = 255,
    URI = 256,
    CAA = 257,
    AVC = 258,
    DOA = 259,
    AMTRELAY = 260,
    TA = 32768,
    DLV = 32769,
}

// https://datatracker.ietf.org/doc/html/rfc1035#section-3.2.4
#[derive(Debug, Copy, Clone, PartialEq, DnsEnum)]
#[repr(u16)]
pub enum QClass {
    IN = 1,
    CS = 2,
    CH = 3,
    HS = 4,
    ANY = 255,
}

derive_enum!(PacketType, u8);
derive_enum!(OpCode, u8);
derive_enum!(ResponseCode, u16);
derive_enum!(QType, u16);
derive_enum!(QClass, u16);

/// `<character-string>`, RFC1035 §4.1.3: a length-prefixed byte string up to
/// 255 octets, used by TXT and (informationally) HINFO.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CharacterString(pub String);

/// ```
/// use dnslib::rfc1035::CharacterString;
///
/// let cs = CharacterString::from("www");
/// assert_eq!(cs.0, "www");
/// assert_eq!(cs.to_string(), "www");
/// ```
impl From<&str> for CharacterString {
    fn from(s: &str) -> Self {
        CharacterString(s.to_string())
    }
}

impl fmt::Display for CharacterString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToFromNetworkOrder for CharacterString {
    /// ```
    /// use dnslib::network_order::ToFromNetworkOrder;
    /// use dnslib::rfc1035::CharacterString;
    ///
    /// let cs = CharacterString::from("www");
    /// let mut buffer = Vec::new();
    /// assert_eq!(cs.to_network_bytes(&mut buffer).unwrap(), 4);
    /// assert_eq!(buffer, &[3, b'w', b'w', b'w']);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> crate::error::DNSResult<usize> {
        if self.0.len() > 255 {
            return Err(crate::error::DNSError::illegal("character-string longer than 255 octets"));
        }
        buffer.push(self.0.len() as u8);
        buffer.extend_from_slice(self.0.as_bytes());
        Ok(1 + self.0.len())
    }

    fn from_network_bytes(&mut self, buffer: &mut std::io::Cursor<&[u8]>) -> crate::error::DNSResult<()> {
        use byteorder::ReadBytesExt;
        let len = buffer.read_u8()? as usize;
        let pos = buffer.position() as usize;
        if pos + len > buffer.get_ref().len() {
            return Err(crate::error::DNSError::illegal("character-string runs past end of buffer"));
        }
        let slice = &buffer.get_ref()[pos..pos + len];
        self.0 = std::str::from_utf8(slice)?.to_string();
        buffer.set_position((pos + len) as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::get_sample_slice;
    use crate::{test_from_network, test_to_network};

    #[test]
    fn dns_packet_header() {
        const PACKET: &str = r#"
0000   76 86 81 a0 00 01 00 08 00 00 00 01
        "#;

        let header = test_from_network!(PACKET, DNSPacketHeader);
        assert_eq!(header.id, 0x7686);
        assert_eq!(header.flags.packet_type, PacketType::Response);
        assert_eq!(header.flags.op_code, OpCode::Query);
        assert!(!header.flags.authorative_answer);
        assert!(!header.flags.truncated);
        assert!(header.flags.recursion_desired);
        assert!(header.flags.recursion_available);
        assert_eq!(header.flags.response_code, ResponseCode::NoError);
        assert_eq!(header.qd_count, 1);
        assert_eq!(header.an_count, 8);
        assert_eq!(header.ns_count, 0);
        assert_eq!(header.ar_count, 1);

        let values = test_to_network!(header);
        assert_eq!(values.0, get_sample_slice(PACKET));
        assert_eq!(values.1, 12);
    }

    #[test]
    fn character_string_round_trip() {
        let cs = CharacterString::from("hello world");
        let mut buffer = Vec::new();
        cs.to_network_bytes(&mut buffer).unwrap();

        let mut cursor = std::io::Cursor::new(buffer.as_slice());
        let mut back = CharacterString::default();
        back.from_network_bytes(&mut cursor).unwrap();
        assert_eq!(back, cs);
    }
}
