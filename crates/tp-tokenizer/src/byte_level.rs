// GPT-2 byte <-> printable char mapping.

use std::collections::HashMap;
use std::sync::OnceLock;

fn tables() -> &'static ([char; 256], HashMap<char, u8>) {
    static TABLES: OnceLock<([char; 256], HashMap<char, u8>)> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut byte_to_char = ['\0'; 256];
        let mut n = 0u32;
        for b in 0..=255u8 {
            let printable = matches!(b, b'!'..=b'~' | 0xA1..=0xAC | 0xAE..=0xFF);
            let code = if printable {
                b as u32
            } else {
                let c = 256 + n;
                n += 1;
                c
            };
            byte_to_char[b as usize] = char::from_u32(code).unwrap_or('\0');
        }
        let char_to_byte = byte_to_char
            .iter()
            .enumerate()
            .map(|(b, c)| (*c, b as u8))
            .collect();
        (byte_to_char, char_to_byte)
    })
}

/// The printable char standing in for byte `b`.
pub fn byte_char(b: u8) -> char {
    tables().0[b as usize]
}

/// Inverse of [`byte_char`].
pub fn char_byte(c: char) -> Option<u8> {
    tables().1.get(&c).copied()
}

/// `Ġ`, the stand-in for an ASCII space.
pub fn space_char() -> char {
    byte_char(b' ')
}
