use crate::exchange::FrameExchange;
use crate::frame::EncodedFrame;
use crate::line_code::{SYNC_WORD, WORD_MASK};
use crate::{BITS_PER_10B_WORD, ENCODED_FRAME_LENGTH};
use log::error;
use std::sync::Arc;

/// Anything that can supply the next bit to transmit
pub trait BitSource {
    fn next_bit(&mut self) -> u8;
}

/// Serializes encoded frames into bits, most significant bit of each word first.
///
/// A single sync word is sent before the first frame. After that frames are
/// sent back to back. At each frame boundary the most recently published frame
/// is taken from the exchange; if none was published since the last boundary
/// the previous frame is sent again.
#[derive(Debug)]
pub struct FrameBitStream {
    exchange: Arc<FrameExchange>,
    active: EncodedFrame,
    has_frame: bool,
    seen_generation: u64,
    sending_preamble: bool,
    fill_requested: bool,
    bits_sent_for_current_word: usize,
    words_sent_for_current_packet: usize,
    missed_frames: u64,
    frames_started: u64,
}

impl FrameBitStream {
    pub fn new(exchange: Arc<FrameExchange>) -> Self {
        let seen_generation = exchange.generation();
        Self {
            exchange,
            active: EncodedFrame::default(),
            has_frame: false,
            seen_generation,
            sending_preamble: true,
            fill_requested: false,
            bits_sent_for_current_word: 0,
            words_sent_for_current_packet: 0,
            missed_frames: 0,
            frames_started: 0,
        }
    }

    /// Start over with a sync preamble. The active frame is kept.
    pub fn restart(&mut self) {
        self.sending_preamble = true;
        self.bits_sent_for_current_word = 0;
        self.words_sent_for_current_packet = 0;
    }

    /// Make `frame` the active frame directly, bypassing the exchange
    pub fn load_frame(&mut self, frame: EncodedFrame) {
        self.active = frame;
        self.has_frame = true;
    }

    pub fn active_frame(&self) -> &EncodedFrame {
        &self.active
    }

    pub fn has_frame(&self) -> bool {
        self.has_frame
    }

    /// Frame boundaries where no new frame was available
    pub fn missed_frames(&self) -> u64 {
        self.missed_frames
    }

    /// Frames begun so far, retransmissions included
    pub fn frames_started(&self) -> u64 {
        self.frames_started
    }

    pub fn words_sent_for_current_packet(&self) -> usize {
        self.words_sent_for_current_packet
    }

    pub fn is_sending_preamble(&self) -> bool {
        self.sending_preamble
    }

    /// Take the newest published frame if there is one we have not sent yet
    fn acquire_next_frame(&mut self) -> bool {
        let (generation, index) = self.exchange.ready();
        if generation == self.seen_generation {
            return false;
        }
        if !self.exchange.try_read(index, &mut self.active) {
            return false;
        }
        self.seen_generation = generation;
        self.has_frame = true;
        true
    }

    fn advance_word(&mut self) {
        self.bits_sent_for_current_word = 0;

        if self.sending_preamble {
            // stay on sync until there is something to send
            if self.acquire_next_frame() {
                self.sending_preamble = false;
                self.frames_started += 1;
                self.exchange.request_fill();
            } else if self.has_frame {
                self.sending_preamble = false;
                self.frames_started += 1;
            }
            return;
        }

        self.words_sent_for_current_packet += 1;
        if self.words_sent_for_current_packet >= ENCODED_FRAME_LENGTH {
            self.words_sent_for_current_packet = 0;
            self.frames_started += 1;
            if !self.acquire_next_frame() {
                self.missed_frames += 1;
                error!("Next telemetry packet was not available, resending the previous one");
            }
            self.exchange.request_fill();
        }
    }
}

impl BitSource for FrameBitStream {
    fn next_bit(&mut self) -> u8 {
        if !self.fill_requested {
            self.fill_requested = true;
            self.exchange.request_fill();
        }

        if self.bits_sent_for_current_word >= BITS_PER_10B_WORD {
            self.advance_word();
        }

        let word = if self.sending_preamble {
            SYNC_WORD
        } else {
            self.active.word(self.words_sent_for_current_packet)
        };

        let shift = BITS_PER_10B_WORD - 1 - self.bits_sent_for_current_word;
        self.bits_sent_for_current_word += 1;
        ((word & WORD_MASK) >> shift) as u8 & 1
    }
}
