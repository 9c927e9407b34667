//! Trait for converting DNS wire types to/from network-order bytes.
pub mod primitive;

use std::io::Cursor;

use crate::error::DNSResult;

/// Converts a structure to/from the big-endian wire representation used
/// throughout DNS messages. Implemented for the primitive integer types in
/// `primitive`, for the fixed-shape header/flags types in `rfc1035`, and for
/// the RDATA variants in `rr`.
pub trait ToFromNetworkOrder {
    /// Append `self`'s wire representation to `buffer`, returning the number
    /// of bytes written.
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> DNSResult<usize>;

    /// Overwrite `self` by reading its wire representation from `buffer`,
    /// advancing the cursor.
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DNSResult<()>;
}
