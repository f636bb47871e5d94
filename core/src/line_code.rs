//! 8b10b line coding
//!
//! Words are laid out `abcdei fghj` with `abcdei` in the upper six bits, and
//! are sent most significant bit first. The running disparity starts negative.

/// K.28.5 comma as sent at negative running disparity
pub const SYNC_WORD: u16 = 0x0fa;
pub const WORD_MASK: u16 = 0x3ff;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunningDisparity {
    #[default]
    Negative,
    Positive,
}

impl RunningDisparity {
    fn flip(self) -> Self {
        match self {
            RunningDisparity::Negative => RunningDisparity::Positive,
            RunningDisparity::Positive => RunningDisparity::Negative,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Data(u8),
    Sync,
}

// 5b/6b codes at negative disparity
const SIX_BIT: [u8; 32] = [
    0b100111, 0b011101, 0b101101, 0b110001, 0b110101, 0b101001, 0b011001, 0b111000, //
    0b111001, 0b100101, 0b010101, 0b110100, 0b001101, 0b101100, 0b011100, 0b010111, //
    0b011011, 0b100011, 0b010011, 0b110010, 0b001011, 0b101010, 0b011010, 0b111010, //
    0b110011, 0b100110, 0b010110, 0b110110, 0b001110, 0b101110, 0b011110, 0b101011,
];

// 3b/4b codes at negative disparity
const FOUR_BIT: [u8; 8] = [
    0b1011, 0b1001, 0b0101, 0b1100, 0b1101, 0b1010, 0b0110, 0b1110,
];
const FOUR_BIT_ALT7: u8 = 0b0111;

/// D.x.A7 avoids a run of five identical bits across the 6b/4b boundary
fn use_alternate_seven(rd: RunningDisparity, x: usize) -> bool {
    match rd {
        RunningDisparity::Negative => matches!(x, 17 | 18 | 20),
        RunningDisparity::Positive => matches!(x, 11 | 13 | 14),
    }
}

/// Encode one symbol at disparity `rd`, returning the word and the new disparity
pub fn encode_symbol(rd: RunningDisparity, symbol: Symbol) -> (u16, RunningDisparity) {
    match symbol {
        Symbol::Sync => {
            let word = match rd {
                RunningDisparity::Negative => SYNC_WORD,
                RunningDisparity::Positive => !SYNC_WORD & WORD_MASK,
            };
            (word, rd.flip())
        }
        Symbol::Data(byte) => {
            let x = (byte & 0x1f) as usize;
            let y = (byte >> 5) as usize;
            let mut rd = rd;

            let mut six = SIX_BIT[x];
            if rd == RunningDisparity::Positive && (six.count_ones() != 3 || x == 7) {
                six ^= 0x3f;
            }
            if six.count_ones() != 3 {
                rd = rd.flip();
            }

            let mut four = if y == 7 && use_alternate_seven(rd, x) {
                FOUR_BIT_ALT7
            } else {
                FOUR_BIT[y]
            };
            if rd == RunningDisparity::Positive && (four.count_ones() != 2 || y == 3) {
                four ^= 0x0f;
            }
            if four.count_ones() != 2 {
                rd = rd.flip();
            }

            (((six as u16) << 4) | four as u16, rd)
        }
    }
}

/// Stateful encoder carrying the running disparity between words
#[derive(Debug, Clone, Default)]
pub struct LineEncoder {
    disparity: RunningDisparity,
}

impl LineEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disparity(&self) -> RunningDisparity {
        self.disparity
    }

    pub fn reset(&mut self) {
        self.disparity = RunningDisparity::Negative;
    }

    pub fn encode(&mut self, symbol: Symbol) -> u16 {
        let (word, next) = encode_symbol(self.disparity, symbol);
        self.disparity = next;
        word
    }
}

/// Look a received word up at either disparity.
/// Returns `None` for words that are not valid codes.
pub fn decode_8b10b(word: u16) -> Option<Symbol> {
    let word = word & WORD_MASK;
    if word == SYNC_WORD || word == !SYNC_WORD & WORD_MASK {
        return Some(Symbol::Sync);
    }
    (0..=255u8)
        .find(|&b| {
            [RunningDisparity::Negative, RunningDisparity::Positive]
                .iter()
                .any(|&rd| encode_symbol(rd, Symbol::Data(b)).0 == word)
        })
        .map(Symbol::Data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_alternates_with_disparity() {
        let mut enc = LineEncoder::new();
        assert_eq!(enc.encode(Symbol::Sync), 0x0fa);
        assert_eq!(enc.disparity(), RunningDisparity::Positive);
        assert_eq!(enc.encode(Symbol::Sync), 0x305);
        assert_eq!(enc.disparity(), RunningDisparity::Negative);
    }

    #[test]
    fn test_known_data_words() {
        // Start of the self test packet
        let mut enc = LineEncoder::new();
        assert_eq!(enc.encode(Symbol::Data(0x51)), 0x235);
        assert_eq!(enc.encode(Symbol::Data(0x01)), 0x1d4);
        assert_eq!(enc.encode(Symbol::Data(0x40)), 0x275);
        assert_eq!(enc.encode(Symbol::Data(0xd8)), 0x0c6);
    }

    #[test]
    fn test_every_word_is_balanced_or_off_by_two() {
        for rd in [RunningDisparity::Negative, RunningDisparity::Positive] {
            for b in 0..=255u8 {
                let (word, next) = encode_symbol(rd, Symbol::Data(b));
                let ones = word.count_ones() as i32;
                let disparity = ones - (10 - ones);
                assert!(matches!(disparity, -2 | 0 | 2), "D{} {:03x}", b, word);
                if disparity == 0 {
                    assert_eq!(next, rd);
                } else {
                    assert_ne!(next, rd);
                }
                // words sent at negative disparity never carry a deficit of ones
                match rd {
                    RunningDisparity::Negative => assert!(disparity >= 0),
                    RunningDisparity::Positive => assert!(disparity <= 0),
                }
            }
        }
    }

    #[test]
    fn test_no_long_runs() {
        let mut enc = LineEncoder::new();
        let mut run = 0;
        let mut last = 2u16;
        for i in 0..2048u32 {
            let word = enc.encode(Symbol::Data((i.wrapping_mul(97) >> 3) as u8));
            for bit in (0..10).rev() {
                let b = (word >> bit) & 1;
                if b == last {
                    run += 1;
                } else {
                    run = 1;
                    last = b;
                }
                assert!(run <= 5, "run of {} at word {}", run, i);
            }
        }
    }

    #[test]
    fn test_decode_recovers_every_byte() {
        for rd in [RunningDisparity::Negative, RunningDisparity::Positive] {
            for b in 0..=255u8 {
                let (word, _) = encode_symbol(rd, Symbol::Data(b));
                assert_eq!(decode_8b10b(word), Some(Symbol::Data(b)));
            }
        }
        assert_eq!(decode_8b10b(0x0fa), Some(Symbol::Sync));
        assert_eq!(decode_8b10b(0x305), Some(Symbol::Sync));
        assert_eq!(decode_8b10b(0x000), None);
        assert_eq!(decode_8b10b(0x3ff), None);
    }
}
