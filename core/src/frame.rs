use crate::error::{Result, TelemRadioError};
use crate::line_code::{LineEncoder, RunningDisparity, Symbol};
use crate::reed_solomon::{RsParity, NROOTS};
use crate::{DUV_DATA_LENGTH, DUV_PACKET_LENGTH, ENCODED_FRAME_LENGTH};

/// One transmitted frame: 64 data words, 32 parity words and a trailing sync
/// word, each a 10 bit 8b10b code in the low bits of a `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedFrame {
    words: [u16; ENCODED_FRAME_LENGTH],
}

impl Default for EncodedFrame {
    fn default() -> Self {
        Self {
            words: [0; ENCODED_FRAME_LENGTH],
        }
    }
}

impl EncodedFrame {
    pub fn words(&self) -> &[u16; ENCODED_FRAME_LENGTH] {
        &self.words
    }

    #[inline]
    pub fn word(&self, index: usize) -> u16 {
        self.words[index]
    }

    pub fn data_words(&self) -> &[u16] {
        &self.words[..DUV_DATA_LENGTH]
    }

    pub fn parity_words(&self) -> &[u16] {
        &self.words[DUV_DATA_LENGTH..DUV_PACKET_LENGTH]
    }

    pub fn sync_word(&self) -> u16 {
        self.words[DUV_PACKET_LENGTH]
    }
}

/// Turns 64 byte payloads into encoded frames.
///
/// The running disparity is carried from one frame into the next so the
/// concatenated bit stream stays DC balanced. Only a cold start resets it.
#[derive(Debug, Clone, Default)]
pub struct FrameEncoder {
    line: LineEncoder,
    parity: RsParity,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disparity(&self) -> RunningDisparity {
        self.line.disparity()
    }

    /// Back to negative disparity, as at power on
    pub fn reset_disparity(&mut self) {
        self.line.reset();
    }

    /// Parity bytes of the most recently encoded frame
    pub fn last_parity(&self) -> &[u8; NROOTS] {
        self.parity.parity()
    }

    pub fn encode(&mut self, payload: &[u8]) -> Result<EncodedFrame> {
        let mut frame = EncodedFrame::default();
        self.encode_into(payload, &mut frame)?;
        Ok(frame)
    }

    /// Encode into an existing frame buffer
    pub fn encode_into(&mut self, payload: &[u8], frame: &mut EncodedFrame) -> Result<()> {
        if payload.len() != DUV_DATA_LENGTH {
            return Err(TelemRadioError::InvalidPayloadSize {
                expected: DUV_DATA_LENGTH,
                actual: payload.len(),
            });
        }

        self.parity.reset();
        for (word, &byte) in frame.words.iter_mut().zip(payload.iter()) {
            self.parity.update(byte);
            *word = self.line.encode(Symbol::Data(byte));
        }

        let parity = *self.parity.parity();
        for (word, &byte) in frame.words[DUV_DATA_LENGTH..DUV_PACKET_LENGTH]
            .iter_mut()
            .zip(parity.iter())
        {
            *word = self.line.encode(Symbol::Data(byte));
        }

        frame.words[DUV_PACKET_LENGTH] = self.line.encode(Symbol::Sync);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_code::{decode_8b10b, SYNC_WORD};
    use crate::selftest::{TEST_PACKET, TEST_PARITIES};

    #[test]
    fn test_encode_known_packet() {
        let mut encoder = FrameEncoder::new();
        let frame = encoder.encode(&TEST_PACKET).unwrap();

        assert_eq!(&frame.data_words()[..4], &[0x235, 0x1d4, 0x275, 0x0c6]);
        assert_eq!(frame.parity_words()[0], 0x264);
        assert_eq!(frame.parity_words()[31], 0x07a);
        assert_eq!(frame.sync_word(), 0x305);
        assert_eq!(encoder.last_parity(), &TEST_PARITIES);
    }

    #[test]
    fn test_frame_decodes_back() {
        let mut encoder = FrameEncoder::new();
        let frame = encoder.encode(&TEST_PACKET).unwrap();

        for (i, &word) in frame.data_words().iter().enumerate() {
            assert_eq!(decode_8b10b(word), Some(Symbol::Data(TEST_PACKET[i])));
        }
        for (i, &word) in frame.parity_words().iter().enumerate() {
            assert_eq!(decode_8b10b(word), Some(Symbol::Data(TEST_PARITIES[i])));
        }
        assert_eq!(decode_8b10b(frame.sync_word()), Some(Symbol::Sync));
    }

    #[test]
    fn test_disparity_carries_across_frames() {
        let mut encoder = FrameEncoder::new();
        let first = encoder.encode(&TEST_PACKET).unwrap();
        let rd_after_first = encoder.disparity();
        let second = encoder.encode(&TEST_PACKET).unwrap();

        // first frame ends on the positive disparity sync, so the next
        // frame starts at negative disparity again
        assert_eq!(first.sync_word(), 0x305);
        assert_eq!(rd_after_first, RunningDisparity::Negative);
        assert_eq!(second.sync_word(), 0x305);

        // an all zero frame leaves the disparity positive, and the same
        // payload then encodes differently
        let mut encoder = FrameEncoder::new();
        let zeros = encoder.encode(&[0u8; DUV_DATA_LENGTH]).unwrap();
        assert_eq!(zeros.sync_word(), SYNC_WORD);
        assert_eq!(encoder.disparity(), RunningDisparity::Positive);

        let continued = encoder.encode(&TEST_PACKET).unwrap();
        assert_eq!(&continued.data_words()[..4], &[0x235, 0x22b, 0x185, 0x336]);
        assert_eq!(continued.sync_word(), SYNC_WORD);
        assert_ne!(continued, first);

        encoder.reset_disparity();
        assert_eq!(encoder.encode(&TEST_PACKET).unwrap(), first);
    }

    #[test]
    fn test_wrong_payload_length() {
        let mut encoder = FrameEncoder::new();
        assert!(matches!(
            encoder.encode(&[0u8; 63]),
            Err(TelemRadioError::InvalidPayloadSize {
                expected: 64,
                actual: 63
            })
        ));
        // disparity untouched by the rejected payload
        assert_eq!(encoder.disparity(), RunningDisparity::Negative);
    }
}
