//! Text lines for the LCD 20x4 bricklet.
//!
//! The display controller (KS0066) uses its own character ROM. ASCII maps
//! almost one-to-one; a handful of non-ASCII glyphs used by the station
//! (`°`, umlauts, `µ`) live in the upper half of the ROM.

use serde::{Deserialize, Serialize};

pub const LCD_COLUMNS: u8 = 20;
pub const LCD_LINES: u8 = 4;

/// A line of text positioned on the display, already in the KS0066
/// character set and clipped to the visible width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LcdTextLine {
    pub line: u8,
    pub position: u8,
    pub text: Vec<u8>,
}

impl LcdTextLine {
    pub fn new(line: u8, position: u8, text: &str) -> Self {
        let width = usize::from(LCD_COLUMNS.saturating_sub(position));
        let mut encoded = encode_ks0066(text);
        encoded.truncate(width);
        Self {
            line,
            position,
            text: encoded,
        }
    }
}

/// Convert UTF-8 text to KS0066 ROM codes. Unmappable characters become a
/// space.
pub fn encode_ks0066(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            // ROM A00 has a yen sign at 0x5C and arrows at 0x7E/0x7F.
            '\\' => 0xA4,
            '~' => 0x2D,
            ' '..='}' => c as u8,
            '→' => 0x7E,
            '←' => 0x7F,
            '°' => 0xDF,
            'ä' | 'Ä' => 0xE1,
            'ß' => 0xE2,
            'µ' => 0xE4,
            'ö' | 'Ö' => 0xEF,
            'Ω' => 0xF4,
            'ü' | 'Ü' => 0xF5,
            'π' => 0xF7,
            '÷' => 0xFD,
            _ => b' ',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        assert_eq!(encode_ks0066("Hum.: 55.25 %RH"), b"Hum.: 55.25 %RH".to_vec());
    }

    #[test]
    fn degree_sign_uses_rom_code() {
        let encoded = encode_ks0066("Tem.: 21.50 °C");
        assert_eq!(encoded.len(), 14);
        assert_eq!(encoded[12], 0xDF);
        assert_eq!(encoded[13], b'C');
    }

    #[test]
    fn unknown_glyph_becomes_space() {
        assert_eq!(encode_ks0066("a€b"), b"a b".to_vec());
    }

    #[test]
    fn text_line_is_clipped_to_display_width() {
        let line = LcdTextLine::new(1, 0, "Hum.: 55.25 %RH      ");
        assert_eq!(line.text.len(), 20);

        let shifted = LcdTextLine::new(3, 15, "Ill.: 120.00 lx");
        assert_eq!(shifted.text, b"Ill.:".to_vec());
    }
}
