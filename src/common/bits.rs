//! Bit-field codec for packed event words
//!
//! A field is described by a shift and a right-justified mask. Reading
//! extracts and right-justifies the bits, writing clears the field and ORs in
//! the masked value. Values wider than the field are truncated, never rejected.

/// Field descriptor over a 32-bit word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField32 {
    pub shift: u32,
    pub mask: u32,
}

impl BitField32 {
    pub const fn new(shift: u32, mask: u32) -> Self {
        Self { shift, mask }
    }

    /// Extract the field from `word`
    #[inline]
    pub const fn get(self, word: u32) -> u32 {
        (word >> self.shift) & self.mask
    }

    /// Return `word` with the field cleared
    #[inline]
    pub const fn clear(self, word: u32) -> u32 {
        word & !(self.mask << self.shift)
    }

    /// Return `word` with the field replaced by `value & mask`
    #[inline]
    pub const fn set(self, word: u32, value: u32) -> u32 {
        self.clear(word) | ((value & self.mask) << self.shift)
    }
}

/// Field descriptor over an 8-bit word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField8 {
    pub shift: u32,
    pub mask: u8,
}

impl BitField8 {
    pub const fn new(shift: u32, mask: u8) -> Self {
        Self { shift, mask }
    }

    #[inline]
    pub const fn get(self, word: u8) -> u8 {
        (word >> self.shift) & self.mask
    }

    #[inline]
    pub const fn clear(self, word: u8) -> u8 {
        word & !(self.mask << self.shift)
    }

    #[inline]
    pub const fn set(self, word: u8, value: u8) -> u8 {
        self.clear(word) | ((value & self.mask) << self.shift)
    }
}

/// Field layout of a Dynap-se configuration event
pub mod layout {
    use super::{BitField32, BitField8};

    /// Valid mark, bit 0 of the data word
    pub const VALID_MARK: BitField32 = BitField32::new(0, 0x01);
    /// Payload, bits 1-31 of the data word
    ///
    /// The mask is applied after the shift, so only 31 bits survive a write.
    pub const DATA: BitField32 = BitField32::new(1, 0xFFFF_FFFF);
    /// Chip ID, bits 0-3 of the chip byte
    pub const CHIP_ID: BitField8 = BitField8::new(0, 0x0F);

    /// Largest payload that survives a write unchanged
    pub const DATA_MAX: u32 = 0x7FFF_FFFF;
    /// Largest chip ID
    pub const CHIP_ID_MAX: u8 = 0x0F;
}
