//! Telemetry radio modem core
//!
//! Injects a low-rate 8b10b / Reed-Solomon telemetry subcarrier beneath relayed
//! audio, one fixed-size audio period at a time. The audio-server binding calls
//! [`AudioProcessor::process_period`] once per hardware period.

pub mod bitstream;
pub mod config;
pub mod error;
pub mod exchange;
pub mod filler;
pub mod fir;
pub mod frame;
pub mod iir;
pub mod layout;
pub mod line_code;
pub mod modulator;
pub mod oscillator;
pub mod params;
pub mod processor;
pub mod reed_solomon;
pub mod selftest;

pub use bitstream::{BitSource, FrameBitStream};
pub use config::Config;
pub use error::{Result, TelemRadioError};
pub use exchange::FrameExchange;
pub use filler::{PayloadSource, TelemetryFiller};
pub use frame::{EncodedFrame, FrameEncoder};
pub use modulator::{BitModulator, ModulatorSettings};
pub use params::{LoopStats, ParamSnapshot, RuntimeParams};
pub use processor::{AudioProcessor, Mode};

// Audio engine configuration
pub const SAMPLE_RATE: u32 = 48000;
pub const PERIOD_SIZE: usize = 480; // 10ms at 48kHz

// DUV telemetry runs at 12kHz inside the loop
pub const DUV_DECIMATION_RATE: u32 = 4;
pub const DUV_BPS: u32 = 200;

// High speed telemetry is the only signal, so it runs at the full rate
pub const HIGH_SPEED_DECIMATION_RATE: u32 = 1;
pub const HIGH_SPEED_BPS: u32 = 1200;

// Frame layout
pub const DUV_DATA_LENGTH: usize = 64;
pub const DUV_PARITIES_LENGTH: usize = 32;
pub const DUV_PACKET_LENGTH: usize = DUV_DATA_LENGTH + DUV_PARITIES_LENGTH; // 96
pub const ENCODED_FRAME_LENGTH: usize = DUV_PACKET_LENGTH + 1; // sync word at the end
pub const BITS_PER_10B_WORD: usize = 10;

// Filter lengths
pub const DECIMATE_FILTER_LEN: usize = 480;
pub const DUV_BIT_FILTER_LEN: usize = 60; // one bit at 12kHz, longer filters ring
pub const FILTER_ALPHA: f64 = 0.5;

// Telemetry levels
pub const ONE_VALUE: f64 = 0.2;
pub const ZERO_VALUE: f64 = -0.2;
pub const RAMP_AMOUNT: f64 = 0.02;

// Test tone and tone measurement
pub const OSC_TABLE_SIZE: usize = 9600;
pub const TEST_TONE_FREQ: f64 = 5000.0;
pub const TEST_TONE_LEVEL: f64 = 0.2;
pub const LOOPS_PER_MEASUREMENT: u32 = 500; // about 5 seconds

// Loop timing is checked about every 4 seconds
pub const LOOPS_PER_TIMING_REPORT: u32 = 400;
