//! 4b6b constant-weight symbol table used by captured frames.
//!
//! Every nibble of a captured frame is carried as one of 16 six-bit symbols
//! that each have exactly three bits set. Of the 64 possible 6-bit values, 44
//! have the wrong weight and four weight-3 values (`0x07`, `0x0b`, `0x31`,
//! `0x38`) are left unused, so most single-bit corruptions of a capture land
//! on a value with no table entry and are rejected instead of misread.
//!
//! ## Orientation
//!
//! [`SYMBOLS`] is written most-significant-bit first. Captures deliver each
//! symbol least-significant-bit first, so a raw 6-bit window has to be
//! bit-reversed before it can be looked up. [`WIRE_SYMBOLS`] holds the
//! reversed alphabet and [`decode_window`] does the reversal for you.
//!
//! The live four-lane link never uses this table: a lane either pulses or it
//! does not, so there is nothing to corrupt.
//!
//! ## Functions
//!
//! - [`encode_nibble`] / [`decode_symbol`]: MSB-first symbol <-> nibble
//! - [`decode_window`]: LSB-first captured window -> nibble
//! - [`encode_byte`] / [`decode_byte`]: byte <-> `(low, high)` symbol pair

use crate::consts::{SYMBOL_BITS, SYMBOL_WEIGHT};

/// The 16 valid symbols, indexed by the nibble they carry (MSB-first).
pub static SYMBOLS: [u8; 16] = [
    0xd, 0xe, 0x13, 0x15, 0x16, 0x19, 0x1a, 0x1c, 0x23, 0x25, 0x26, 0x29, 0x2a, 0x2c, 0x32, 0x34,
];

/// The 16 valid symbols as they appear in a capture (LSB-first).
///
/// Each entry is the 6-bit reversal of the matching [`SYMBOLS`] entry.
pub static WIRE_SYMBOLS: [u8; 16] = reverse_table(&SYMBOLS);

/// Reverse lookup for [`SYMBOLS`]: symbol value -> nibble.
static REV_SYMBOLS: [Option<u8>; 64] = invert_table(&SYMBOLS);

/// Reverse lookup for [`WIRE_SYMBOLS`]: raw captured window -> nibble.
static REV_WIRE_SYMBOLS: [Option<u8>; 64] = invert_table(&WIRE_SYMBOLS);

const SYMBOL_MASK: u8 = (1 << SYMBOL_BITS) - 1;

const fn reverse_table(table: &[u8; 16]) -> [u8; 16] {
    let mut out = [0; 16];
    let mut i = 0;
    while i < table.len() {
        out[i] = reverse6(table[i]);
        i += 1;
    }
    out
}

const fn invert_table(table: &[u8; 16]) -> [Option<u8>; 64] {
    let mut rev = [None; 64];
    let mut i = 0;
    while i < table.len() {
        rev[table[i] as usize] = Some(i as u8);
        i += 1;
    }
    rev
}

/// Reverses the order of the low six bits of `sym`.
///
/// Bits above the sixth are discarded.
pub const fn reverse6(sym: u8) -> u8 {
    (sym.reverse_bits() >> 2) & SYMBOL_MASK
}

/// Returns `true` if `sym` has exactly three of its six bits set.
pub const fn is_constant_weight(sym: u8) -> bool {
    sym <= SYMBOL_MASK && sym.count_ones() == SYMBOL_WEIGHT
}

/// Encodes the low nibble of `nibble` as an MSB-first symbol.
pub fn encode_nibble(nibble: u8) -> u8 {
    SYMBOLS[(nibble & 0x0F) as usize]
}

/// Decodes an MSB-first symbol back into its nibble.
///
/// Returns `None` for any value outside the alphabet.
pub fn decode_symbol(sym: u8) -> Option<u8> {
    *REV_SYMBOLS.get(sym as usize)?
}

/// Decodes a raw LSB-first 6-bit window taken straight from a capture.
///
/// Equivalent to `decode_symbol(reverse6(window))`.
pub fn decode_window(window: u8) -> Option<u8> {
    *REV_WIRE_SYMBOLS.get(window as usize)?
}

/// Encodes a byte as two MSB-first symbols, low nibble first.
pub fn encode_byte(byte: u8) -> [u8; 2] {
    [encode_nibble(byte), encode_nibble(byte >> 4)]
}

/// Decodes a `(low, high)` pair of MSB-first symbols back into a byte.
///
/// Returns `None` if either symbol is invalid.
pub fn decode_byte(sym_lo: u8, sym_hi: u8) -> Option<u8> {
    let low = decode_symbol(sym_lo)?;
    let high = decode_symbol(sym_hi)?;
    Some((high << 4) | low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_symbol_has_weight_three() {
        for &sym in SYMBOLS.iter().chain(WIRE_SYMBOLS.iter()) {
            assert!(is_constant_weight(sym), "{sym:#04x} is not 3-of-6");
        }
    }

    #[test]
    fn test_symbols_are_distinct() {
        for (i, a) in SYMBOLS.iter().enumerate() {
            for b in &SYMBOLS[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_wire_table_is_bit_reversal() {
        for (nibble, &sym) in SYMBOLS.iter().enumerate() {
            assert_eq!(WIRE_SYMBOLS[nibble], reverse6(sym));
            assert_eq!(decode_window(reverse6(sym)), Some(nibble as u8));
            assert_eq!(decode_symbol(sym), Some(nibble as u8));
        }
    }

    #[test]
    fn test_excluded_patterns_do_not_decode() {
        let weight_three = (0u8..64).filter(|&v| is_constant_weight(v)).count();
        assert_eq!(weight_three, 20);

        for excluded in [0x07, 0x0b, 0x31, 0x38] {
            assert!(is_constant_weight(excluded));
            assert_eq!(decode_symbol(excluded), None);
        }
        assert_eq!(decode_symbol(0x00), None);
        assert_eq!(decode_symbol(0x3f), None);
        assert_eq!(decode_symbol(0xff), None);
        assert_eq!(decode_window(0x40), None);
    }

    #[test]
    fn test_reverse6() {
        assert_eq!(reverse6(0b000001), 0b100000);
        assert_eq!(reverse6(0b001101), 0b101100);
        assert_eq!(reverse6(0b110000), 0b000011);
        assert_eq!(reverse6(0b1100_0000), 0);
    }

    #[test]
    fn test_encode_byte_low_nibble_first() {
        assert_eq!(encode_byte(0x4f), [SYMBOLS[0xf], SYMBOLS[0x4]]);
        assert_eq!(decode_byte(SYMBOLS[0xf], SYMBOLS[0x4]), Some(0x4f));
        assert_eq!(decode_byte(0x07, SYMBOLS[0]), None);
    }
}
