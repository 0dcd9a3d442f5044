//! Binary serialization of matrices and vectors.
//!
//! The layout is little-endian and fixed:
//!
//! ```text
//! Dense:  rows (i64) | cols (i64) | row-major f64 elements
//! Vector: len  (i64) | f64 elements
//! ```
//!
//! Decoders only populate zero-value receivers and reject malformed
//! input: negative dimensions, buffers whose length does not exactly match
//! the header, and sizes that cannot be allocated.

use std::io::{self, Read, Write};

use crate::error::Error;
use crate::matrix::{Dense, Matrix, Vector};

const SIZE_I64: usize = 8;
const SIZE_F64: usize = 8;

// The largest element count whose byte length still fits in usize.
const MAX_LEN: u64 = (usize::MAX / SIZE_F64) as u64;

impl Dense {
    /// Encodes the receiver into the fixed little-endian layout.
    pub fn marshal_binary(&self) -> Result<Vec<u8>, Error> {
        let (r, c) = self.dims();
        let elems = (r as u64).checked_mul(c as u64).ok_or(Error::TooBig)?;
        if elems > MAX_LEN {
            return Err(Error::TooBig);
        }
        let mut buf = Vec::with_capacity(2 * SIZE_I64 + elems as usize * SIZE_F64);
        buf.extend_from_slice(&(r as i64).to_le_bytes());
        buf.extend_from_slice(&(c as i64).to_le_bytes());
        for i in 0..r {
            for j in 0..c {
                buf.extend_from_slice(&self.at(i, j).to_le_bytes());
            }
        }
        Ok(buf)
    }

    /// Encodes the receiver into `w`, returning the number of bytes
    /// written.
    pub fn marshal_binary_to<W: Write>(&self, mut w: W) -> io::Result<usize> {
        let (r, c) = self.dims();
        let mut n = 0;
        w.write_all(&(r as i64).to_le_bytes())?;
        n += SIZE_I64;
        w.write_all(&(c as i64).to_le_bytes())?;
        n += SIZE_I64;
        for i in 0..r {
            for j in 0..c {
                w.write_all(&self.at(i, j).to_le_bytes())?;
                n += SIZE_F64;
            }
        }
        Ok(n)
    }

    /// Decodes the binary form into the receiver, which must be the empty
    /// zero value; decoding into a populated matrix panics.
    ///
    /// The input length must match the header exactly. No size limit is
    /// imposed beyond addressability, so untrusted data should be length-
    /// checked by the caller first.
    pub fn unmarshal_binary(&mut self, data: &[u8]) -> Result<(), Error> {
        if !self.is_empty() {
            panic!("{}", "densolve: unmarshal into non-empty matrix");
        }
        if data.len() < 2 * SIZE_I64 {
            return Err(Error::TooSmall);
        }
        let rows = i64::from_le_bytes(data[..SIZE_I64].try_into().expect("length checked"));
        let cols = i64::from_le_bytes(data[SIZE_I64..2 * SIZE_I64].try_into().expect("length checked"));
        if rows < 0 || cols < 0 {
            return Err(Error::BadSize);
        }
        let elems = (rows as u64).checked_mul(cols as u64).ok_or(Error::TooBig)?;
        if elems > MAX_LEN {
            return Err(Error::TooBig);
        }
        if data.len() != 2 * SIZE_I64 + elems as usize * SIZE_F64 {
            return Err(Error::BadBuffer);
        }
        if elems == 0 {
            // A dimensionless matrix decodes to the empty value.
            return Ok(());
        }
        self.reuse_as(rows as usize, cols as usize);
        let mut p = 2 * SIZE_I64;
        for i in 0..rows as usize {
            for j in 0..cols as usize {
                let v = f64::from_le_bytes(data[p..p + SIZE_F64].try_into().expect("length checked"));
                self.put(i, j, v);
                p += SIZE_F64;
            }
        }
        Ok(())
    }

    /// Decodes the binary form from `r` into the receiver, which must be
    /// the empty zero value. Returns the number of bytes read; truncated
    /// input fails with `UnexpectedEof`.
    pub fn unmarshal_binary_from<R: Read>(&mut self, mut r: R) -> io::Result<usize> {
        if !self.is_empty() {
            panic!("{}", "densolve: unmarshal into non-empty matrix");
        }
        let mut buf = [0u8; 8];
        let mut n = 0;
        r.read_exact(&mut buf)?;
        n += SIZE_I64;
        let rows = i64::from_le_bytes(buf);
        r.read_exact(&mut buf)?;
        n += SIZE_I64;
        let cols = i64::from_le_bytes(buf);
        if rows < 0 || cols < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, Error::BadSize));
        }
        let elems = (rows as u64)
            .checked_mul(cols as u64)
            .filter(|&e| e <= MAX_LEN)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, Error::TooBig))?;
        if elems == 0 {
            return Ok(n);
        }
        self.reuse_as(rows as usize, cols as usize);
        for i in 0..rows as usize {
            for j in 0..cols as usize {
                r.read_exact(&mut buf)?;
                n += SIZE_F64;
                self.put(i, j, f64::from_le_bytes(buf));
            }
        }
        Ok(n)
    }
}

impl Vector {
    /// Encodes the receiver into the fixed little-endian layout.
    pub fn marshal_binary(&self) -> Result<Vec<u8>, Error> {
        let n = self.len() as u64;
        if n > MAX_LEN {
            return Err(Error::TooBig);
        }
        let mut buf = Vec::with_capacity(SIZE_I64 + n as usize * SIZE_F64);
        buf.extend_from_slice(&(self.len() as i64).to_le_bytes());
        for i in 0..self.len() {
            buf.extend_from_slice(&self.at_vec(i).to_le_bytes());
        }
        Ok(buf)
    }

    /// Encodes the receiver into `w`, returning the number of bytes
    /// written.
    pub fn marshal_binary_to<W: Write>(&self, mut w: W) -> io::Result<usize> {
        let mut n = 0;
        w.write_all(&(self.len() as i64).to_le_bytes())?;
        n += SIZE_I64;
        for i in 0..self.len() {
            w.write_all(&self.at_vec(i).to_le_bytes())?;
            n += SIZE_F64;
        }
        Ok(n)
    }

    /// Decodes the binary form into the receiver, which must be the empty
    /// zero value; decoding into a populated vector panics.
    pub fn unmarshal_binary(&mut self, data: &[u8]) -> Result<(), Error> {
        if !self.is_empty() {
            panic!("{}", "densolve: unmarshal into non-empty vector");
        }
        if data.len() < SIZE_I64 {
            return Err(Error::TooSmall);
        }
        let len = i64::from_le_bytes(data[..SIZE_I64].try_into().expect("length checked"));
        if len < 0 {
            return Err(Error::BadSize);
        }
        if len as u64 > MAX_LEN {
            return Err(Error::TooBig);
        }
        if data.len() != SIZE_I64 + len as usize * SIZE_F64 {
            return Err(Error::BadBuffer);
        }
        if len == 0 {
            return Ok(());
        }
        self.reuse_as(len as usize);
        let mut p = SIZE_I64;
        for i in 0..len as usize {
            let v = f64::from_le_bytes(data[p..p + SIZE_F64].try_into().expect("length checked"));
            self.set_vec(i, v);
            p += SIZE_F64;
        }
        Ok(())
    }

    /// Decodes the binary form from `r` into the receiver, which must be
    /// the empty zero value. Returns the number of bytes read.
    pub fn unmarshal_binary_from<R: Read>(&mut self, mut r: R) -> io::Result<usize> {
        if !self.is_empty() {
            panic!("{}", "densolve: unmarshal into non-empty vector");
        }
        let mut buf = [0u8; 8];
        let mut n = 0;
        r.read_exact(&mut buf)?;
        n += SIZE_I64;
        let len = i64::from_le_bytes(buf);
        if len < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, Error::BadSize));
        }
        if len as u64 > MAX_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, Error::TooBig));
        }
        if len == 0 {
            return Ok(n);
        }
        self.reuse_as(len as usize);
        for i in 0..len as usize {
            r.read_exact(&mut buf)?;
            n += SIZE_F64;
            self.set_vec(i, f64::from_le_bytes(buf));
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_round_trip_is_bit_exact() {
        let a = Dense::with_data(
            2,
            3,
            vec![1.5, -2.25, f64::INFINITY, f64::NEG_INFINITY, f64::NAN, 0.0],
        );
        let bytes = a.marshal_binary().unwrap();
        assert_eq!(bytes.len(), 16 + 6 * 8);
        let mut back = Dense::default();
        back.unmarshal_binary(&bytes).unwrap();
        for i in 0..2 {
            for j in 0..3 {
                let (x, y) = (a.at(i, j), back.at(i, j));
                if x.is_nan() {
                    assert!(y.is_nan());
                } else {
                    assert_eq!(x.to_bits(), y.to_bits());
                }
            }
        }
    }

    #[test]
    fn header_layout_is_little_endian() {
        let a = Dense::with_data(1, 2, vec![1.0, 2.0]);
        let bytes = a.marshal_binary().unwrap();
        assert_eq!(&bytes[..8], &1i64.to_le_bytes());
        assert_eq!(&bytes[8..16], &2i64.to_le_bytes());
        assert_eq!(&bytes[16..24], &1.0f64.to_le_bytes());
    }

    #[test]
    fn negative_dims_rejected() {
        let mut bytes = vec![0u8; 16];
        bytes[..8].copy_from_slice(&(-1i64).to_le_bytes());
        bytes[8..16].copy_from_slice(&1i64.to_le_bytes());
        let mut m = Dense::default();
        assert_eq!(m.unmarshal_binary(&bytes), Err(Error::BadSize));
    }

    #[test]
    fn wrong_length_rejected() {
        let a = Dense::with_data(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let mut bytes = a.marshal_binary().unwrap();
        bytes.pop();
        let mut m = Dense::default();
        assert_eq!(m.unmarshal_binary(&bytes), Err(Error::BadBuffer));
    }

    #[test]
    fn truncated_header_rejected() {
        let mut m = Dense::default();
        assert_eq!(m.unmarshal_binary(&[0u8; 7]), Err(Error::TooSmall));
    }

    #[test]
    fn populated_receiver_panics() {
        use std::panic::{catch_unwind, AssertUnwindSafe};
        let a = Dense::with_data(1, 1, vec![4.0]);
        let bytes = a.marshal_binary().unwrap();
        let mut m = Dense::new(1, 1);
        let got = catch_unwind(AssertUnwindSafe(|| m.unmarshal_binary(&bytes))).unwrap_err();
        assert!(got
            .downcast_ref::<String>()
            .unwrap()
            .contains("non-empty matrix"));
    }

    #[test]
    fn vector_round_trip_preserves_stride_contents() {
        let m = Dense::with_data(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let col = m.col_view(1);
        let bytes = col.marshal_binary().unwrap();
        assert_eq!(bytes.len(), 8 + 3 * 8);
        let mut back = Vector::default();
        back.unmarshal_binary(&bytes).unwrap();
        assert_eq!(back.to_vec(), vec![2.0, 4.0, 6.0]);
        assert_eq!(back.inc(), 1);
    }

    #[test]
    fn writer_and_reader_round_trip() {
        let a = Dense::with_data(2, 2, vec![1.0, -1.0, 0.5, 2.0]);
        let mut buf = Vec::new();
        let written = a.marshal_binary_to(&mut buf).unwrap();
        assert_eq!(written, 16 + 4 * 8);
        let mut back = Dense::default();
        let read = back.unmarshal_binary_from(buf.as_slice()).unwrap();
        assert_eq!(read, written);
        for i in 0..2 {
            for j in 0..2 {
                assert_eq!(a.at(i, j), back.at(i, j));
            }
        }
    }

    #[test]
    fn truncated_reader_fails_with_unexpected_eof() {
        let a = Dense::with_data(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let buf = a.marshal_binary().unwrap();
        let mut back = Dense::default();
        let err = back.unmarshal_binary_from(&buf[..buf.len() - 3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
