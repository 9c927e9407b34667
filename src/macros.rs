//! `ToFromNetworkOrder` impl generator for the fixed-width wire enums
//! (`OpCode`, `ResponseCode`, `QType`, `QClass`): read/write the underlying
//! integer, then round-trip it through the enum's `TryFrom` impl (itself
//! generated by `dns_derive::DnsEnum`).
#[macro_export]
macro_rules! derive_enum {
    ($t:ty, u8) => {
        impl $crate::network_order::ToFromNetworkOrder for $t {
            fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> $crate::error::DNSResult<usize> {
                use byteorder::WriteBytesExt;
                buffer.write_u8(*self as u8)?;
                Ok(1)
            }

            fn from_network_bytes(
                &mut self,
                buffer: &mut std::io::Cursor<&[u8]>,
            ) -> $crate::error::DNSResult<()> {
                use byteorder::ReadBytesExt;
                let value = buffer.read_u8()?;
                *self =
                    <$t>::try_from(value).map_err(|e: String| $crate::error::DNSError::new(&e))?;
                Ok(())
            }
        }
    };

    ($t:ty, u16) => {
        impl $crate::network_order::ToFromNetworkOrder for $t {
            fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> $crate::error::DNSResult<usize> {
                use byteorder::{BigEndian, WriteBytesExt};
                buffer.write_u16::<BigEndian>(*self as u16)?;
                Ok(2)
            }

            fn from_network_bytes(
                &mut self,
                buffer: &mut std::io::Cursor<&[u8]>,
            ) -> $crate::error::DNSResult<()> {
                use byteorder::{BigEndian, ReadBytesExt};
                let value = buffer.read_u16::<BigEndian>()?;
                *self =
                    <$t>::try_from(value).map_err(|e: String| $crate::error::DNSError::new(&e))?;
                Ok(())
            }
        }
    };
}

/// Parse a `PACKET` hex-dump fixture (as written throughout this crate's
/// tests) into the bytes it represents, then read a `$t` from it.
#[macro_export]
macro_rules! test_from_network {
    ($slice:ident, $t:ty) => {{
        let s = crate::util::get_sample_slice($slice);
        let mut buffer = std::io::Cursor::new(s.as_slice());
        let mut v = <$t>::default();
        assert!(v.from_network_bytes(&mut buffer).is_ok());
        v
    }};
}

/// Serialize `$data` and return `(bytes, length)`.
#[macro_export]
macro_rules! test_to_network {
    ($data:ident) => {{
        let mut buffer: Vec<u8> = Vec::new();
        let bytes_written = $data.to_network_bytes(&mut buffer).unwrap();

        (buffer, bytes_written)
    }};
}

/// Render a byte buffer for a debug log line: `"X"` for a hex dump, `"C"`
/// for an ASCII dump (non-printable bytes shown as `.`).
#[macro_export]
macro_rules! format_buffer {
    ("X", $buf:expr) => {{
        $buf.iter()
            .map(|b| format!("{:02X} ", b))
            .collect::<String>()
    }};
    ("C", $buf:expr) => {{
        $buf.iter()
            .map(|b| {
                if b.is_ascii_graphic() {
                    *b as char
                } else {
                    '.'
                }
            })
            .collect::<String>()
    }};
}
