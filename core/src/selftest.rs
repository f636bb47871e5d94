//! Built-in known-answer checks for the telemetry encoder and modulator

use crate::bitstream::{BitSource, FrameBitStream};
use crate::exchange::FrameExchange;
use crate::frame::FrameEncoder;
use crate::layout::{DuvHeader, DuvPacket, FRAME_TYPE_RT};
use crate::line_code::{decode_8b10b, Symbol};
use crate::modulator::{BitModulator, ModulatorSettings};
use crate::reed_solomon::rs_parity;
use crate::{
    BITS_PER_10B_WORD, DUV_BPS, DUV_DATA_LENGTH, DUV_DECIMATION_RATE, DUV_PACKET_LENGTH,
    DUV_PARITIES_LENGTH, ENCODED_FRAME_LENGTH, ONE_VALUE, SAMPLE_RATE, ZERO_VALUE,
};
use log::{debug, error, info};
use std::sync::Arc;

/// RT telemetry packet with id 1, epoch 42, uptime 6920
pub const TEST_PACKET: [u8; DUV_DATA_LENGTH] = [
    0x51, 0x01, 0x40, 0xd8, 0x00, 0x10, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x01, 0x10, 0x00, 0x01, 0x20, 0x00, //
    0x01, 0x10, 0x00, 0x47, 0x8f, 0xf4, 0x47, 0x7f, //
    0xf4, 0x48, 0x7f, 0xf4, 0x10, 0x08, 0x00, 0x65, //
    0x47, 0x76, 0xff, 0xe7, 0x33, 0xce, 0xe2, 0x81, //
    0x29, 0x78, 0x80, 0xf2, 0x8e, 0x01, 0x04, 0x01, //
    0x01, 0x01, 0x17, 0x38, 0xac, 0x00, 0x00, 0x20,
];

pub const TEST_PARITIES: [u8; DUV_PARITIES_LENGTH] = [
    0x19, 0xa0, 0x2c, 0x20, 0x59, 0xf6, 0x7c, 0x12, //
    0x84, 0x27, 0x77, 0x98, 0xb5, 0xf3, 0x89, 0xf1, //
    0xa4, 0x84, 0xba, 0x50, 0x3a, 0x0f, 0x16, 0x01, //
    0x62, 0x1c, 0xcd, 0x9a, 0x11, 0x1a, 0xf2, 0xa7,
];

/// Preamble sync word followed by the first four data words
pub const EXPECTED_FIRST_BITS: [u8; 50] = [
    0, 0, 1, 1, 1, 1, 1, 0, 1, 0, //
    1, 0, 0, 0, 1, 1, 0, 1, 0, 1, //
    0, 1, 1, 1, 0, 1, 0, 1, 0, 0, //
    1, 0, 0, 1, 1, 1, 0, 1, 0, 1, //
    0, 0, 1, 1, 0, 0, 0, 1, 1, 0,
];

/// End of frame sync word followed by the first four words of the next frame
pub const EXPECTED_FRAME_BOUNDARY_BITS: [u8; 50] = [
    1, 1, 0, 0, 0, 0, 0, 1, 0, 1, //
    1, 0, 0, 0, 1, 1, 0, 1, 0, 1, //
    0, 1, 1, 1, 0, 1, 0, 1, 0, 0, //
    1, 0, 0, 1, 1, 1, 0, 1, 0, 1, //
    0, 0, 1, 1, 0, 0, 0, 1, 1, 0,
];

/// Outcome of one named check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
}

/// Run every check, logging as it goes
pub fn run_all() -> Vec<CheckResult> {
    let checks: [(&'static str, fn() -> bool); 5] = [
        ("duv_header", check_duv_header),
        ("rs_encoder", check_rs_encoder),
        ("frame_encoder", check_frame_encoder),
        ("next_bit", check_next_bit),
        ("modulate_bit", check_modulate_bit),
    ];

    checks
        .iter()
        .map(|&(name, check)| {
            let passed = check();
            if passed {
                info!("Self test {}: pass", name);
            } else {
                error!("Self test {}: FAIL", name);
            }
            CheckResult { name, passed }
        })
        .collect()
}

fn check_duv_header() -> bool {
    let packet = DuvPacket {
        header: DuvHeader {
            id: 1,
            epoch: 42,
            uptime: 6920,
            frame_type: FRAME_TYPE_RT,
            ..Default::default()
        },
        ..Default::default()
    };
    packet.to_bytes()[..4] == TEST_PACKET[..4]
}

fn check_rs_encoder() -> bool {
    rs_parity(&TEST_PACKET) == TEST_PARITIES
}

fn check_frame_encoder() -> bool {
    let mut encoder = FrameEncoder::new();
    let Ok(frame) = encoder.encode(&TEST_PACKET) else {
        return false;
    };
    let data_ok = frame
        .data_words()
        .iter()
        .zip(TEST_PACKET.iter())
        .all(|(&w, &b)| decode_8b10b(w) == Some(Symbol::Data(b)));
    let parity_ok = frame
        .parity_words()
        .iter()
        .zip(TEST_PARITIES.iter())
        .all(|(&w, &b)| decode_8b10b(w) == Some(Symbol::Data(b)));
    data_ok && parity_ok && frame.sync_word() == 0x305
}

/// Bit stream primed with the test packet and nothing queued behind it
fn test_bitstream() -> Option<FrameBitStream> {
    let exchange = Arc::new(FrameExchange::new());
    let mut encoder = FrameEncoder::new();
    let frame = encoder.encode(&TEST_PACKET).ok()?;
    let mut stream = FrameBitStream::new(exchange);
    stream.load_frame(frame);
    Some(stream)
}

fn check_next_bit() -> bool {
    let Some(mut stream) = test_bitstream() else {
        return false;
    };

    let first: Vec<u8> = (0..EXPECTED_FIRST_BITS.len())
        .map(|_| stream.next_bit())
        .collect();
    if first != EXPECTED_FIRST_BITS {
        debug!("First bits {:?}", first);
        return false;
    }

    // skip to the end of the frame, the last word is its sync
    let consumed_words = EXPECTED_FIRST_BITS.len() / BITS_PER_10B_WORD - 1;
    let remaining = (DUV_PACKET_LENGTH - consumed_words) * BITS_PER_10B_WORD;
    for _ in 0..remaining {
        stream.next_bit();
    }

    let boundary: Vec<u8> = (0..EXPECTED_FRAME_BOUNDARY_BITS.len())
        .map(|_| stream.next_bit())
        .collect();
    if boundary != EXPECTED_FRAME_BOUNDARY_BITS {
        debug!("Frame boundary bits {:?}", boundary);
        return false;
    }
    true
}

/// Recover the word sent over `BITS_PER_10B_WORD` bit periods by sampling
/// the first sample of each bit
fn read_word(
    modulator: &mut BitModulator,
    stream: &mut FrameBitStream,
    settings: &ModulatorSettings,
) -> Option<u16> {
    let samples_per_bit = modulator.samples_per_bit() as usize;
    let mut word = 0u16;
    for _ in 0..BITS_PER_10B_WORD {
        let mut first = 0.0;
        for s in 0..samples_per_bit {
            let value = modulator.modulate_bit(stream, settings);
            if s == 0 {
                first = value;
            } else if value != first {
                // level must hold for the whole bit
                return None;
            }
        }
        let bit = if first == settings.one_value {
            1
        } else if first == settings.zero_value {
            0
        } else {
            return None;
        };
        word = (word << 1) | bit;
    }
    Some(word)
}

fn check_modulate_bit() -> bool {
    let Some(mut stream) = test_bitstream() else {
        return false;
    };
    let Ok(mut modulator) = BitModulator::new(SAMPLE_RATE, DUV_BPS, DUV_DECIMATION_RATE) else {
        return false;
    };
    let settings = ModulatorSettings {
        one_value: ONE_VALUE,
        zero_value: ZERO_VALUE,
        ramp: None,
        bit_filter: false,
        test_pattern: false,
    };

    if read_word(&mut modulator, &mut stream, &settings) != Some(0x0fa) {
        return false;
    }

    let mut encoder = FrameEncoder::new();
    let Ok(expected) = encoder.encode(&TEST_PACKET) else {
        return false;
    };
    for w in 0..ENCODED_FRAME_LENGTH {
        if read_word(&mut modulator, &mut stream, &settings) != Some(expected.word(w)) {
            debug!("Word {} did not match", w);
            return false;
        }
    }

    // no new frame was published, so the same frame goes out again
    (0..4).all(|w| read_word(&mut modulator, &mut stream, &settings) == Some(expected.word(w)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_checks_pass() {
        let results = run_all();
        assert_eq!(results.len(), 5);
        for result in results {
            assert!(result.passed, "{} failed", result.name);
        }
    }
}
