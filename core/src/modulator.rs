use crate::bitstream::BitSource;
use crate::error::{Result, TelemRadioError};
use crate::fir::{FirFilter, Normalization};
use crate::{DUV_BIT_FILTER_LEN, FILTER_ALPHA};
use log::{debug, warn};

/// Levels and options for one period, taken from the runtime parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModulatorSettings {
    pub one_value: f64,
    pub zero_value: f64,
    /// Per-bit amplitude growth during runs of identical bits, `None` disables it
    pub ramp: Option<f64>,
    pub bit_filter: bool,
    /// Send alternating bits instead of telemetry
    pub test_pattern: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ModulatorState {
    current_bit: u8,
    samples_sent_for_current_bit: u32,
    ones_in_a_row: u32,
    zeros_in_a_row: u32,
    started: bool,
}

/// Turns bits into baseband samples, holding each bit for `samples_per_bit`
/// samples at the loop's decimated rate.
#[derive(Debug, Clone)]
pub struct BitModulator {
    state: ModulatorState,
    sample_rate: u32,
    bit_rate: u32,
    decimation_rate: u32,
    samples_per_bit: u32,
    bit_filter: FirFilter,
}

impl BitModulator {
    pub fn new(sample_rate: u32, bit_rate: u32, decimation_rate: u32) -> Result<Self> {
        let mut modulator = Self {
            state: ModulatorState::default(),
            sample_rate: 0,
            bit_rate: 0,
            decimation_rate: 0,
            samples_per_bit: 0,
            bit_filter: FirFilter::new(vec![0.0; DUV_BIT_FILTER_LEN]),
        };
        modulator.init(sample_rate, bit_rate, decimation_rate)?;
        Ok(modulator)
    }

    /// Set up for a new rate. Calling it twice with the same arguments leaves
    /// the modulator exactly as after one call.
    pub fn init(&mut self, sample_rate: u32, bit_rate: u32, decimation_rate: u32) -> Result<()> {
        if sample_rate == 0 || bit_rate == 0 || decimation_rate == 0 {
            return Err(TelemRadioError::InvalidConfig(format!(
                "sample rate {sample_rate}, bit rate {bit_rate} and decimation {decimation_rate} must be non-zero"
            )));
        }
        let loop_rate = sample_rate / decimation_rate;
        let samples_per_bit = loop_rate / bit_rate;
        if samples_per_bit == 0 {
            return Err(TelemRadioError::InvalidConfig(format!(
                "bit rate {bit_rate} is above the loop rate {loop_rate}"
            )));
        }
        if loop_rate % bit_rate != 0 {
            warn!(
                "Loop rate {} is not a multiple of bit rate {}, bits will be {} samples",
                loop_rate, bit_rate, samples_per_bit
            );
        }

        self.bit_filter.redesign_root_raised_cosine(
            loop_rate as f64,
            bit_rate as f64,
            FILTER_ALPHA,
            Normalization::DcGain,
        )?;

        self.sample_rate = sample_rate;
        self.bit_rate = bit_rate;
        self.decimation_rate = decimation_rate;
        self.samples_per_bit = samples_per_bit;
        self.state = ModulatorState::default();

        debug!(
            "Modulator at {} bps, {} samples per bit",
            bit_rate, samples_per_bit
        );
        Ok(())
    }

    /// True if `init` with these arguments would change nothing
    pub fn is_configured_for(&self, sample_rate: u32, bit_rate: u32, decimation_rate: u32) -> bool {
        self.sample_rate == sample_rate
            && self.bit_rate == bit_rate
            && self.decimation_rate == decimation_rate
    }

    /// Start the next call on a fresh bit, forgetting run lengths and filter history
    pub fn reset(&mut self) {
        self.state = ModulatorState::default();
        self.bit_filter.reset();
    }

    pub fn samples_per_bit(&self) -> u32 {
        self.samples_per_bit
    }

    pub fn bit_rate(&self) -> u32 {
        self.bit_rate
    }

    pub fn decimation_rate(&self) -> u32 {
        self.decimation_rate
    }

    pub fn current_bit(&self) -> u8 {
        self.state.current_bit
    }

    /// Produce one sample, pulling a new bit from `source` when the current
    /// one has been held long enough.
    pub fn modulate_bit<S: BitSource>(&mut self, source: &mut S, settings: &ModulatorSettings) -> f64 {
        if !self.state.started || self.state.samples_sent_for_current_bit >= self.samples_per_bit {
            let bit = if settings.test_pattern {
                if self.state.started {
                    self.state.current_bit ^ 1
                } else {
                    1
                }
            } else {
                source.next_bit()
            };
            self.start_bit(bit);
        }
        self.state.samples_sent_for_current_bit += 1;

        let mut value = if self.state.current_bit == 1 {
            settings.one_value
        } else {
            settings.zero_value
        };
        if let Some(ramp) = settings.ramp {
            // push long runs further out to make up for the high pass droop
            if self.state.current_bit == 1 {
                value += ramp * self.state.ones_in_a_row.saturating_sub(1) as f64;
            } else {
                value -= ramp * self.state.zeros_in_a_row.saturating_sub(1) as f64;
            }
        }

        if settings.bit_filter {
            self.bit_filter.filter(value)
        } else {
            value
        }
    }

    fn start_bit(&mut self, bit: u8) {
        let state = &mut self.state;
        state.started = true;
        state.current_bit = bit;
        state.samples_sent_for_current_bit = 0;
        if bit == 1 {
            state.ones_in_a_row += 1;
            state.zeros_in_a_row = 0;
        } else {
            state.zeros_in_a_row += 1;
            state.ones_in_a_row = 0;
        }
    }
}
