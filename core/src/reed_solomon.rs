//! Reed-Solomon (255,223) parity generation
//!
//! CCSDS field polynomial 0x187 with first consecutive root 112 and primitive
//! element 11, 32 parity symbols, conventional basis. Frames are shortened to
//! 64 data bytes. Only the encoder side is needed for transmission.

use crate::{DUV_DATA_LENGTH, DUV_PARITIES_LENGTH};

const NN: usize = 255;
const A0: u8 = 255; // log of zero
const GF_POLY: u16 = 0x187;
const FCR: usize = 112;
const PRIM: usize = 11;
pub const NROOTS: usize = DUV_PARITIES_LENGTH;

struct GaloisField {
    alpha_to: [u8; 256],
    index_of: [u8; 256],
}

const fn modnn(x: usize) -> usize {
    x % NN
}

const fn build_field() -> GaloisField {
    let mut alpha_to = [0u8; 256];
    let mut index_of = [0u8; 256];
    index_of[0] = A0;
    alpha_to[A0 as usize] = 0;

    let mut sr: u16 = 1;
    let mut i = 0;
    while i < NN {
        index_of[sr as usize] = i as u8;
        alpha_to[i] = sr as u8;
        sr <<= 1;
        if sr & 0x100 != 0 {
            sr ^= GF_POLY;
        }
        sr &= 0xff;
        i += 1;
    }
    GaloisField { alpha_to, index_of }
}

/// Generator polynomial in index form, lowest order first
const fn build_generator(field: &GaloisField) -> [u8; NROOTS + 1] {
    let mut genpoly = [0u8; NROOTS + 1];
    genpoly[0] = 1;

    let mut i = 0;
    let mut root = FCR * PRIM;
    while i < NROOTS {
        genpoly[i + 1] = 1;
        let mut j = i;
        while j > 0 {
            genpoly[j] = if genpoly[j] != 0 {
                genpoly[j - 1]
                    ^ field.alpha_to[modnn(field.index_of[genpoly[j] as usize] as usize + root)]
            } else {
                genpoly[j - 1]
            };
            j -= 1;
        }
        genpoly[0] = field.alpha_to[modnn(field.index_of[genpoly[0] as usize] as usize + root)];
        i += 1;
        root += PRIM;
    }

    let mut k = 0;
    while k <= NROOTS {
        genpoly[k] = field.index_of[genpoly[k] as usize];
        k += 1;
    }
    genpoly
}

const FIELD: GaloisField = build_field();
const GENPOLY: [u8; NROOTS + 1] = build_generator(&FIELD);

/// Running parity state, fed one data byte at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsParity {
    parity: [u8; NROOTS],
}

impl Default for RsParity {
    fn default() -> Self {
        Self::new()
    }
}

impl RsParity {
    pub fn new() -> Self {
        Self {
            parity: [0; NROOTS],
        }
    }

    pub fn reset(&mut self) {
        self.parity = [0; NROOTS];
    }

    /// Shift one data byte through the encoder
    pub fn update(&mut self, byte: u8) {
        let feedback = FIELD.index_of[(byte ^ self.parity[0]) as usize];

        if feedback != A0 {
            for j in 1..NROOTS {
                self.parity[j] ^=
                    FIELD.alpha_to[modnn(feedback as usize + GENPOLY[NROOTS - j] as usize)];
            }
        }

        self.parity.copy_within(1.., 0);
        self.parity[NROOTS - 1] = if feedback != A0 {
            FIELD.alpha_to[modnn(feedback as usize + GENPOLY[0] as usize)]
        } else {
            0
        };
    }

    pub fn parity(&self) -> &[u8; NROOTS] {
        &self.parity
    }
}

/// Parity bytes for a complete data block
pub fn rs_parity(data: &[u8]) -> [u8; NROOTS] {
    let mut rs = RsParity::new();
    for &b in data {
        rs.update(b);
    }
    *rs.parity()
}

/// Largest data block one codeword can carry
pub const MAX_DATA_LENGTH: usize = NN - NROOTS;
const _: () = assert!(DUV_DATA_LENGTH <= MAX_DATA_LENGTH);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selftest::{TEST_PACKET, TEST_PARITIES};

    #[test]
    fn test_field_tables() {
        assert_eq!(FIELD.alpha_to[0], 1);
        assert_eq!(FIELD.index_of[1], 0);
        assert_eq!(FIELD.index_of[0], A0);
        // alpha^8 reduces by the field polynomial
        assert_eq!(FIELD.alpha_to[8], 0x87);
        for i in 0..NN {
            assert_eq!(FIELD.index_of[FIELD.alpha_to[i] as usize] as usize, i);
        }
    }

    #[test]
    fn test_known_parity_vector() {
        assert_eq!(rs_parity(&TEST_PACKET), TEST_PARITIES);
    }

    #[test]
    fn test_zero_block_has_zero_parity() {
        assert_eq!(rs_parity(&[0u8; DUV_DATA_LENGTH]), [0u8; NROOTS]);
    }

    #[test]
    fn test_parity_is_linear() {
        let a: Vec<u8> = (0..DUV_DATA_LENGTH as u8).collect();
        let b: Vec<u8> = (0..DUV_DATA_LENGTH as u8).map(|x| x.wrapping_mul(37) ^ 0x5a).collect();
        let sum: Vec<u8> = a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect();

        let pa = rs_parity(&a);
        let pb = rs_parity(&b);
        let ps = rs_parity(&sum);
        for i in 0..NROOTS {
            assert_eq!(ps[i], pa[i] ^ pb[i]);
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let mut rs = RsParity::new();
        rs.update(0x42);
        assert_ne!(rs.parity(), &[0u8; NROOTS]);
        rs.reset();
        assert_eq!(rs, RsParity::new());
    }
}
