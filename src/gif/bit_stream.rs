//! Little-endian bit packing as used by GIF.
//!
//! Bits are filled from the least significant end of each byte. Whole bytes
//! are handed to a [`ByteSink`] as soon as they are complete, so the packer
//! never holds more than one 64-bit accumulator.

use super::lzw::CodeSink;

/// Receives every completed byte.
pub trait ByteSink {
    fn consume(&mut self, byte: u8);
}

impl ByteSink for Vec<u8> {
    fn consume(&mut self, byte: u8) {
        self.push(byte);
    }
}

impl<S: ByteSink + ?Sized> ByteSink for &mut S {
    fn consume(&mut self, byte: u8) {
        (**self).consume(byte);
    }
}

/// Integers that can be written least-significant byte first.
pub trait LeBytes: Copy {
    const WIDTH: usize;

    fn byte(self, index: usize) -> u8;
}

macro_rules! le_bytes {
    ($($ty:ty),*) => {
        $(
            impl LeBytes for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn byte(self, index: usize) -> u8 {
                    self.to_le_bytes()[index]
                }
            }
        )*
    };
}

le_bytes!(u8, u16, u32, i8, i16, i32);

pub struct BitWriter<S: ByteSink> {
    sink: S,
    // Always in 0..8 between calls.
    offset: u32,
    part: u64,
}

impl<S: ByteSink> BitWriter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            offset: 0,
            part: 0,
        }
    }

    /// Write all bytes of `value`, least significant first.
    pub fn write_le<T: LeBytes>(&mut self, value: T) -> &mut Self {
        for i in 0..T::WIDTH {
            self.write_byte(value.byte(i));
        }
        self
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        for &b in bytes {
            self.write_byte(b);
        }
        self
    }

    /// Append the low `bits` bits of `value`. `bits` must be below 32.
    pub fn write_bits(&mut self, value: u32, bits: u32) -> &mut Self {
        debug_assert!(bits < 32, "at most 31 bits per write");
        let masked = u64::from(value) & ((1u64 << bits) - 1);
        self.part |= masked << self.offset;
        self.offset += bits;
        while self.offset >= 8 {
            self.sink.consume((self.part & 0xff) as u8);
            self.part >>= 8;
            self.offset -= 8;
        }
        self
    }

    /// Zero-pad and emit a pending partial byte.
    pub fn flush(&mut self) -> &mut Self {
        if self.offset > 0 {
            self.sink.consume((self.part & 0xff) as u8);
            self.part = 0;
            self.offset = 0;
        }
        self
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn get_ref(&self) -> &S {
        &self.sink
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Returns the sink. Pending bits that were not flushed are discarded.
    pub fn into_inner(self) -> S {
        self.sink
    }

    fn write_byte(&mut self, byte: u8) {
        if self.offset == 0 {
            self.sink.consume(byte);
        } else {
            self.part |= u64::from(byte) << self.offset;
            self.sink.consume((self.part & 0xff) as u8);
            self.part >>= 8;
        }
    }
}

impl<S: ByteSink> CodeSink for BitWriter<S> {
    fn consume(&mut self, code: u16, width: u8) {
        self.write_bits(u32::from(code), u32::from(width));
    }
}
