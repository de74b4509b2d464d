use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Mask of the 6-bit relative address field.
pub const ADDR_MASK: u8 = 0x3F;
/// Sign bit of the address field: set means a backward offset.
pub const SIGN_BIT: u8 = 0x20;
/// Low five bits hold `magnitude - 1`.
pub const MAGNITUDE_MASK: u8 = 0x1F;
/// Largest encodable offset magnitude.
pub const MAX_OFFSET: i32 = 32;

/// A 6-bit signed-magnitude relative address.
///
/// Layout: `<neg:1> <magnitude-1:5>`. The encoded offset is always in
/// `-32..=-1` or `1..=32`; zero cannot be represented. Resolution against a
/// base cell wraps around the circular memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelAddr(u8);

impl RelAddr {
    /// Reinterpret the low six bits of `bits` as an address. Upper bits are discarded.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & ADDR_MASK)
    }

    /// Build an address from a signed offset, or `None` if the offset is zero
    /// or has magnitude above 32.
    pub fn from_offset(offset: i32) -> Option<Self> {
        if offset == 0 || offset.unsigned_abs() > MAX_OFFSET as u32 {
            return None;
        }
        Some(Self(encode_address(offset)))
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_backward(self) -> bool {
        self.0 & SIGN_BIT != 0
    }

    /// The signed offset this address denotes.
    pub const fn offset(self) -> i32 {
        let magnitude = (self.0 & MAGNITUDE_MASK) as i32 + 1;
        if self.is_backward() { -magnitude } else { magnitude }
    }

    /// Resolve against `base` in a memory of `size` cells.
    pub fn resolve(self, size: usize, base: usize) -> usize {
        let idx = (base as i64 + self.offset() as i64).rem_euclid(size as i64);
        idx as usize
    }
}

impl fmt::Display for RelAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.offset())
    }
}

impl FromStr for RelAddr {
    type Err = ParseError;

    /// Accepts `+N`, `-N` or bare `N` with `N` in `1..=32`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .parse()
            .map_err(|_| ParseError::InvalidOperand(s.to_string()))?;
        i32::try_from(value)
            .ok()
            .and_then(RelAddr::from_offset)
            .ok_or(ParseError::OperandOutOfRange(value))
    }
}

/// Resolve the 6-bit relative address `addr6` against `base_index` in a
/// circular memory of `size` cells. All 64 values of `addr6` are valid.
pub fn decode_address(size: usize, base_index: usize, addr6: u8) -> usize {
    RelAddr::from_bits(addr6).resolve(size, base_index)
}

/// Pack a signed offset into the 6-bit address field.
///
/// The offset must be in `-32..=-1` or `1..=32`; callers check this
/// (see [`RelAddr::from_offset`] for the checked form).
pub fn encode_address(offset: i32) -> u8 {
    debug_assert!(
        offset != 0 && offset.unsigned_abs() <= MAX_OFFSET as u32,
        "offset {offset} not encodable"
    );
    let sign = if offset < 0 { SIGN_BIT } else { 0 };
    sign | ((offset.unsigned_abs() - 1) as u8 & MAGNITUDE_MASK)
}

/// Canonical text of an address field: `+N` or `-N`.
pub fn address_to_text(addr6: u8) -> String {
    RelAddr::from_bits(addr6).to_string()
}
