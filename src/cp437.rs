//! Code page 437 encoding table.
//!
//! BBSes speak the original IBM PC character set: one byte per glyph,
//! with the high half (0x80-0xFF) covering box drawing, shading blocks,
//! accented letters and a handful of Greek/math symbols. This module is
//! the fixed byte<->char mapping used by the inbound decode path and the
//! outbound encode path. It is pure data with no state.

/// Unicode equivalents for CP437 bytes 0x80-0xFF.
///
/// Indexed by `byte - 0x80`. Every slot is defined, so `decode` is total
/// over all 256 byte values.
const EXTENDED: [char; 128] = [
    // 0x80-0x8F
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    // 0x90-0x9F
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    // 0xA0-0xAF
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    // 0xB0-0xBF
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    // 0xC0-0xCF
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    // 0xD0-0xDF
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    // 0xE0-0xEF
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    // 0xF0-0xFF
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{00A0}',
];

/// The substitution character emitted for characters with no CP437 byte.
pub const SUBSTITUTE: u8 = b'?';

/// Decode a single CP437 byte to its Unicode character.
///
/// Bytes below 0x80 map identity to ASCII (control bytes included; NUL
/// stripping is the line reassembler's job, not the table's).
pub fn decode(byte: u8) -> char {
    if byte < 0x80 {
        byte as char
    } else {
        EXTENDED[(byte - 0x80) as usize]
    }
}

/// Encode a Unicode character back to its CP437 byte, if it has one.
///
/// Exact inverse of `decode`: `encode(decode(b)) == Some(b)` for every
/// byte value. Callers sending user text substitute [`SUBSTITUTE`] for
/// characters the code page cannot represent.
pub fn encode(c: char) -> Option<u8> {
    if c.is_ascii() {
        return Some(c as u8);
    }
    EXTENDED
        .iter()
        .position(|&e| e == c)
        .map(|i| (i + 0x80) as u8)
}
