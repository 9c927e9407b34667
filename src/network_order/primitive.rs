//! `ToFromNetworkOrder` impls for the primitive integer types, and for the
//! generic container shapes (`Option`, fixed arrays, `Vec`) built on top of
//! them. Every DNS wire struct is assembled from these.
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::DNSResult;
use crate::network_order::ToFromNetworkOrder;

impl ToFromNetworkOrder for u8 {
    /// ```
    /// use dnslib::network_order::ToFromNetworkOrder;
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// assert!(255_u8.to_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(buffer, &[0xFF]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> DNSResult<usize> {
        buffer.write_u8(*self)?;
        Ok(1)
    }

    /// ```
    /// use std::io::Cursor;
    /// use dnslib::network_order::ToFromNetworkOrder;
    ///
    /// let b = vec![0xFF];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut v = 0u8;
    /// assert!(v.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(v, 255);
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DNSResult<()> {
        *self = buffer.read_u8()?;
        Ok(())
    }
}

impl ToFromNetworkOrder for u16 {
    /// ```
    /// use dnslib::network_order::ToFromNetworkOrder;
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// assert!(0x1234_u16.to_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(buffer, &[0x12, 0x34]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> DNSResult<usize> {
        buffer.write_u16::<BigEndian>(*self)?;
        Ok(2)
    }

    /// ```
    /// use std::io::Cursor;
    /// use dnslib::network_order::ToFromNetworkOrder;
    ///
    /// let b = vec![0x12, 0x34];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut v = 0u16;
    /// assert!(v.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(v, 0x1234);
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DNSResult<()> {
        *self = buffer.read_u16::<BigEndian>()?;
        Ok(())
    }
}

impl ToFromNetworkOrder for u32 {
    /// ```
    /// use dnslib::network_order::ToFromNetworkOrder;
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// assert!(0x12345678_u32.to_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(buffer, &[0x12, 0x34, 0x56, 0x78]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> DNSResult<usize> {
        buffer.write_u32::<BigEndian>(*self)?;
        Ok(4)
    }

    /// ```
    /// use std::io::Cursor;
    /// use dnslib::network_order::ToFromNetworkOrder;
    ///
    /// let b = vec![0x12, 0x34, 0x56, 0x78];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut v = 0u32;
    /// assert!(v.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(v, 0x12345678);
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DNSResult<()> {
        *self = buffer.read_u32::<BigEndian>()?;
        Ok(())
    }
}

impl ToFromNetworkOrder for i32 {
    /// ```
    /// use dnslib::network_order::ToFromNetworkOrder;
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// assert!(0x12345678_i32.to_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(buffer, &[0x12, 0x34, 0x56, 0x78]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> DNSResult<usize> {
        buffer.write_i32::<BigEndian>(*self)?;
        Ok(4)
    }

    /// ```
    /// use std::io::Cursor;
    /// use dnslib::network_order::ToFromNetworkOrder;
    ///
    /// let b = vec![0x12, 0x34, 0x56, 0x78];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut v = 0i32;
    /// assert!(v.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(v, 0x12345678);
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DNSResult<()> {
        *self = buffer.read_i32::<BigEndian>()?;
        Ok(())
    }
}

impl<T: ToFromNetworkOrder> ToFromNetworkOrder for Option<T> {
    /// ```
    /// use dnslib::network_order::ToFromNetworkOrder;
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// assert_eq!(Some(0xFF_u8).to_network_bytes(&mut buffer).unwrap(), 1);
    /// assert_eq!(buffer, &[0xFF]);
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// let r: Option<u8> = None;
    /// assert_eq!(r.to_network_bytes(&mut buffer).unwrap(), 0);
    /// assert!(buffer.is_empty());
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> DNSResult<usize> {
        match self {
            Some(x) => x.to_network_bytes(buffer),
            None => Ok(0),
        }
    }

    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DNSResult<()> {
        match self {
            Some(x) => x.from_network_bytes(buffer),
            None => Ok(()),
        }
    }
}

impl<T: ToFromNetworkOrder + Default + Copy, const N: usize> ToFromNetworkOrder for [T; N] {
    /// ```
    /// use dnslib::network_order::ToFromNetworkOrder;
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// assert_eq!([0xFFFF_u16; 10].to_network_bytes(&mut buffer).unwrap(), 20);
    /// assert_eq!(buffer, &[0xFF; 20]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> DNSResult<usize> {
        let mut length = 0usize;
        for x in self.iter() {
            length += x.to_network_bytes(buffer)?;
        }
        Ok(length)
    }

    /// ```
    /// use std::io::Cursor;
    /// use dnslib::network_order::ToFromNetworkOrder;
    ///
    /// let b = vec![0x12, 0x34, 0x56, 0x78];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut v = [0u8; 4];
    /// assert!(v.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(v, [0x12_u8, 0x34, 0x56, 0x78]);
    ///
    /// let b = vec![0x12, 0x34, 0x56, 0x78];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut v = [0u16; 2];
    /// assert!(v.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(v, [0x1234_u16, 0x5678]);
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DNSResult<()> {
        for x in self.iter_mut() {
            x.from_network_bytes(buffer)?;
        }
        Ok(())
    }
}

impl<T> ToFromNetworkOrder for Vec<T>
where
    T: Default + ToFromNetworkOrder,
{
    /// ```
    /// use dnslib::network_order::ToFromNetworkOrder;
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// let v: Vec<u16> = vec![0xFFFF, 0xFFFF, 0xFFFF];
    /// assert_eq!(v.to_network_bytes(&mut buffer).unwrap(), 6);
    /// assert_eq!(&buffer, &[0xFF; 6]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> DNSResult<usize> {
        let mut length = 0usize;
        for item in self {
            length += item.to_network_bytes(buffer)?;
        }
        Ok(length)
    }

    /// Reads elements until the cursor's backing slice is exhausted. Used
    /// only for RDATA container fields whose wire length is already bounded
    /// by the caller (the RDLENGTH-sliced sub-cursor), never for a shared
    /// buffer with trailing sections.
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DNSResult<()> {
        let remaining = buffer.get_ref().len() - buffer.position() as usize;
        let count = remaining / std::mem::size_of::<T>().max(1);
        for _ in 0..count {
            let mut item = T::default();
            item.from_network_bytes(buffer)?;
            self.push(item);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_u16_round_trips_over_full_buffer() {
        let mut buf = Vec::new();
        let v: Vec<u16> = vec![1, 2, 3, 0xFFFF];
        v.to_network_bytes(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf.as_slice());
        let mut back: Vec<u16> = Vec::new();
        back.from_network_bytes(&mut cursor).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn option_none_writes_nothing() {
        let mut buf = Vec::new();
        let v: Option<u32> = None;
        assert_eq!(v.to_network_bytes(&mut buf).unwrap(), 0);
        assert!(buf.is_empty());
    }
}
