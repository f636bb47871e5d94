//! Runtime parameters shared between control threads and the audio loop
//!
//! Every field is an independent atomic with its own getter and setter. The
//! audio loop takes one [`ParamSnapshot`] per period so a period never sees a half-applied change,
//! but there is no ordering guarantee between different fields.

use crate::{
    DUV_BPS, DUV_DECIMATION_RATE, HIGH_SPEED_BPS, ONE_VALUE, RAMP_AMOUNT, SAMPLE_RATE,
    TEST_TONE_FREQ, ZERO_VALUE,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct RuntimeParams {
    hpf: AtomicBool,
    bit_filter: AtomicBool,
    send_telem: AtomicBool,
    send_high_speed_telem: AtomicBool,
    send_test_telem: AtomicBool,
    test_tone: AtomicBool,
    digital_test_tone: AtomicBool,
    test_tone_freq: AtomicF64,
    measure_test_tone: AtomicBool,
    ramp_bits_to_compensate_hpf: AtomicBool,
    ramp_amount: AtomicF64,
    one_value: AtomicF64,
    zero_value: AtomicF64,
    sample_rate: AtomicU32,
    duv_bit_rate: AtomicU32,
    high_speed_bit_rate: AtomicU32,
    decimation_rate: AtomicU32,
}

impl Default for RuntimeParams {
    fn default() -> Self {
        Self {
            hpf: AtomicBool::new(true),
            bit_filter: AtomicBool::new(true),
            send_telem: AtomicBool::new(false),
            send_high_speed_telem: AtomicBool::new(false),
            send_test_telem: AtomicBool::new(false),
            test_tone: AtomicBool::new(false),
            digital_test_tone: AtomicBool::new(false),
            test_tone_freq: AtomicF64::new(TEST_TONE_FREQ),
            measure_test_tone: AtomicBool::new(false),
            ramp_bits_to_compensate_hpf: AtomicBool::new(true),
            ramp_amount: AtomicF64::new(RAMP_AMOUNT),
            one_value: AtomicF64::new(ONE_VALUE),
            zero_value: AtomicF64::new(ZERO_VALUE),
            sample_rate: AtomicU32::new(SAMPLE_RATE),
            duv_bit_rate: AtomicU32::new(DUV_BPS),
            high_speed_bit_rate: AtomicU32::new(HIGH_SPEED_BPS),
            decimation_rate: AtomicU32::new(DUV_DECIMATION_RATE),
        }
    }
}

/// Values of every parameter at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSnapshot {
    pub hpf: bool,
    pub bit_filter: bool,
    pub send_telem: bool,
    pub send_high_speed_telem: bool,
    pub send_test_telem: bool,
    pub test_tone: bool,
    pub digital_test_tone: bool,
    pub test_tone_freq: f64,
    pub measure_test_tone: bool,
    pub ramp_bits_to_compensate_hpf: bool,
    pub ramp_amount: f64,
    pub one_value: f64,
    pub zero_value: f64,
    pub sample_rate: u32,
    pub duv_bit_rate: u32,
    pub high_speed_bit_rate: u32,
    pub decimation_rate: u32,
}

impl RuntimeParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            hpf: self.hpf.load(Ordering::Relaxed),
            bit_filter: self.bit_filter.load(Ordering::Relaxed),
            send_telem: self.send_telem.load(Ordering::Relaxed),
            send_high_speed_telem: self.send_high_speed_telem.load(Ordering::Relaxed),
            send_test_telem: self.send_test_telem.load(Ordering::Relaxed),
            test_tone: self.test_tone.load(Ordering::Relaxed),
            digital_test_tone: self.digital_test_tone.load(Ordering::Relaxed),
            test_tone_freq: self.test_tone_freq.load(),
            measure_test_tone: self.measure_test_tone.load(Ordering::Relaxed),
            ramp_bits_to_compensate_hpf: self.ramp_bits_to_compensate_hpf.load(Ordering::Relaxed),
            ramp_amount: self.ramp_amount.load(),
            one_value: self.one_value.load(),
            zero_value: self.zero_value.load(),
            sample_rate: self.sample_rate.load(Ordering::Relaxed),
            duv_bit_rate: self.duv_bit_rate.load(Ordering::Relaxed),
            high_speed_bit_rate: self.high_speed_bit_rate.load(Ordering::Relaxed),
            decimation_rate: self.decimation_rate.load(Ordering::Relaxed),
        }
    }

    pub fn set_hpf(&self, on: bool) {
        self.hpf.store(on, Ordering::Relaxed);
    }

    pub fn set_bit_filter(&self, on: bool) {
        self.bit_filter.store(on, Ordering::Relaxed);
    }

    pub fn set_send_telem(&self, on: bool) {
        self.send_telem.store(on, Ordering::Relaxed);
    }

    pub fn set_send_high_speed_telem(&self, on: bool) {
        self.send_high_speed_telem.store(on, Ordering::Relaxed);
    }

    pub fn set_send_test_telem(&self, on: bool) {
        self.send_test_telem.store(on, Ordering::Relaxed);
    }

    pub fn set_test_tone(&self, on: bool) {
        self.test_tone.store(on, Ordering::Relaxed);
    }

    pub fn set_digital_test_tone(&self, on: bool) {
        self.digital_test_tone.store(on, Ordering::Relaxed);
    }

    pub fn set_test_tone_freq(&self, freq: f64) {
        self.test_tone_freq.store(freq);
    }

    pub fn set_measure_test_tone(&self, on: bool) {
        self.measure_test_tone.store(on, Ordering::Relaxed);
    }

    pub fn set_ramp_bits_to_compensate_hpf(&self, on: bool) {
        self.ramp_bits_to_compensate_hpf.store(on, Ordering::Relaxed);
    }

    pub fn set_ramp_amount(&self, amount: f64) {
        self.ramp_amount.store(amount);
    }

    pub fn set_one_value(&self, value: f64) {
        self.one_value.store(value);
    }

    pub fn set_zero_value(&self, value: f64) {
        self.zero_value.store(value);
    }

    pub fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::Relaxed);
    }

    pub fn set_duv_bit_rate(&self, rate: u32) {
        self.duv_bit_rate.store(rate, Ordering::Relaxed);
    }

    pub fn set_high_speed_bit_rate(&self, rate: u32) {
        self.high_speed_bit_rate.store(rate, Ordering::Relaxed);
    }

    pub fn set_decimation_rate(&self, rate: u32) {
        self.decimation_rate.store(rate, Ordering::Relaxed);
    }

    pub fn hpf(&self) -> bool {
        self.hpf.load(Ordering::Relaxed)
    }

    pub fn bit_filter(&self) -> bool {
        self.bit_filter.load(Ordering::Relaxed)
    }

    pub fn send_telem(&self) -> bool {
        self.send_telem.load(Ordering::Relaxed)
    }

    pub fn send_high_speed_telem(&self) -> bool {
        self.send_high_speed_telem.load(Ordering::Relaxed)
    }

    pub fn send_test_telem(&self) -> bool {
        self.send_test_telem.load(Ordering::Relaxed)
    }

    pub fn test_tone(&self) -> bool {
        self.test_tone.load(Ordering::Relaxed)
    }

    pub fn digital_test_tone(&self) -> bool {
        self.digital_test_tone.load(Ordering::Relaxed)
    }

    pub fn test_tone_freq(&self) -> f64 {
        self.test_tone_freq.load()
    }

    pub fn measure_test_tone(&self) -> bool {
        self.measure_test_tone.load(Ordering::Relaxed)
    }

    pub fn ramp_bits_to_compensate_hpf(&self) -> bool {
        self.ramp_bits_to_compensate_hpf.load(Ordering::Relaxed)
    }

    pub fn ramp_amount(&self) -> f64 {
        self.ramp_amount.load()
    }

    pub fn one_value(&self) -> f64 {
        self.one_value.load()
    }

    pub fn zero_value(&self) -> f64 {
        self.zero_value.load()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn duv_bit_rate(&self) -> u32 {
        self.duv_bit_rate.load(Ordering::Relaxed)
    }

    pub fn high_speed_bit_rate(&self) -> u32 {
        self.high_speed_bit_rate.load(Ordering::Relaxed)
    }

    pub fn decimation_rate(&self) -> u32 {
        self.decimation_rate.load(Ordering::Relaxed)
    }
}

/// Loop timing and xrun figures published by the audio loop for telemetry
#[derive(Debug, Default)]
pub struct LoopStats {
    avg_micros: AtomicU64,
    max_micros: AtomicU64,
    min_micros: AtomicU64,
    reports: AtomicU64,
    xruns: AtomicU32,
}

impl LoopStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, avg: Duration, max: Duration, min: Duration) {
        self.avg_micros.store(avg.as_micros() as u64, Ordering::Relaxed);
        self.max_micros.store(max.as_micros() as u64, Ordering::Relaxed);
        self.min_micros.store(min.as_micros() as u64, Ordering::Relaxed);
        self.reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg(&self) -> Duration {
        Duration::from_micros(self.avg_micros.load(Ordering::Relaxed))
    }

    pub fn max(&self) -> Duration {
        Duration::from_micros(self.max_micros.load(Ordering::Relaxed))
    }

    pub fn min(&self) -> Duration {
        Duration::from_micros(self.min_micros.load(Ordering::Relaxed))
    }

    /// Number of timing windows published so far
    pub fn reports(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }

    pub fn set_xruns(&self, xruns: u32) {
        self.xruns.store(xruns, Ordering::Relaxed);
    }

    pub fn add_xrun(&self) {
        self.xruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn xruns(&self) -> u32 {
        self.xruns.load(Ordering::Relaxed)
    }
}
