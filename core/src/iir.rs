//! Cascaded biquad IIR filtering with an overflow guard
//!
//! Each section computes
//!
//! ```text
//! center = x·b0 + b1·x1 + b2·x2
//! y      = a0·center − a1·y1 − a2·y2
//! ```
//!
//! The largest register magnitude seen so far is tracked across all sections.
//! When it passes [`OVERFLOW_LIMIT`] every register is zeroed before the next
//! section runs, so an unstable coefficient set or a pathological input cannot
//! poison the output forever.

use log::error;

pub const OVERFLOW_LIMIT: f64 = 1.0e20;
const INITIAL_MAX_REG_VAL: f64 = 1.0e-12;

/// Coefficients for one second order section
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
}

impl BiquadCoeffs {
    /// Section with `a0 = 1` and symmetric numerator `b2 = b0`
    pub const fn symmetric(a1: f64, a2: f64, b0: f64, b1: f64) -> Self {
        Self {
            a0: 1.0,
            a1,
            a2,
            b0,
            b1,
            b2: b0,
        }
    }
}

/// 8 pole elliptic high pass, 300Hz corner at 12kHz
pub const ELLIPTIC_HPF_8POLE: [BiquadCoeffs; 4] = [
    BiquadCoeffs::symmetric(
        -1.457958640999101440,
        0.553994469886055829,
        0.755468172841911700,
        -1.501016765201333980,
    ),
    BiquadCoeffs::symmetric(
        -1.801882953872335770,
        0.847908435354810197,
        0.914802148903627210,
        -1.820187091419891430,
    ),
    BiquadCoeffs::symmetric(
        -1.918405877608232670,
        0.948117893349852192,
        0.967898257208821722,
        -1.930727256540441420,
    ),
    BiquadCoeffs::symmetric(
        -1.961807844116467030,
        0.986885245659999910,
        0.987349171838800999,
        -1.973994746098864940,
    ),
];

/// 4 pole elliptic high pass, 300Hz corner at 12kHz
pub const ELLIPTIC_HPF_4POLE: [BiquadCoeffs; 2] = [
    BiquadCoeffs::symmetric(
        -1.672069386975465260,
        0.707257251879312099,
        0.845362532264354760,
        -1.688601574326067830,
    ),
    BiquadCoeffs::symmetric(
        -1.893899543708855940,
        0.919220780682049821,
        0.953385271211727114,
        -1.906349781967451530,
    ),
];

/// Delay registers for one section
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadState {
    pub x1: f64,
    pub x2: f64,
    pub y1: f64,
    pub y2: f64,
}

#[derive(Debug, Clone)]
pub struct IirFilter {
    coeffs: Vec<BiquadCoeffs>,
    state: Vec<BiquadState>,
    max_reg_val: f64,
    overflows: u64,
    overflow_reported: bool,
    overflow_reports: u64,
}

impl IirFilter {
    pub fn new(sections: &[BiquadCoeffs]) -> Self {
        Self {
            coeffs: sections.to_vec(),
            state: vec![BiquadState::default(); sections.len()],
            max_reg_val: INITIAL_MAX_REG_VAL,
            overflows: 0,
            overflow_reported: false,
            overflow_reports: 0,
        }
    }

    /// The 8 pole elliptic high pass used on the decimated audio
    pub fn elliptic_hpf() -> Self {
        Self::new(&ELLIPTIC_HPF_8POLE)
    }

    pub fn sections(&self) -> usize {
        self.coeffs.len()
    }

    pub fn state(&self) -> &[BiquadState] {
        &self.state
    }

    pub fn max_reg_val(&self) -> f64 {
        self.max_reg_val
    }

    /// Number of times the registers were cleared after an overflow
    pub fn overflow_count(&self) -> u64 {
        self.overflows
    }

    /// Number of overflow diagnostics emitted
    pub fn overflow_reports(&self) -> u64 {
        self.overflow_reports
    }

    /// Zero all registers without touching the overflow bookkeeping
    pub fn reset(&mut self) {
        self.state.fill(BiquadState::default());
        self.max_reg_val = INITIAL_MAX_REG_VAL;
    }

    /// Run one sample through all sections in order
    pub fn filter(&mut self, sample: f64) -> f64 {
        let mut y = sample;
        for section in 0..self.coeffs.len() {
            y = self.section_calc(section, y);
        }
        y
    }

    /// Filter a block in place
    pub fn filter_block(&mut self, samples: &mut [f64]) {
        for s in samples.iter_mut() {
            *s = self.filter(*s);
        }
    }

    fn section_calc(&mut self, k: usize, x: f64) -> f64 {
        if self.max_reg_val > OVERFLOW_LIMIT {
            self.handle_overflow();
        }

        let c = self.coeffs[k];
        let s = &mut self.state[k];

        let center_tap = x * c.b0 + c.b1 * s.x1 + c.b2 * s.x2;
        let y = c.a0 * center_tap - c.a1 * s.y1 - c.a2 * s.y2;

        s.x2 = s.x1;
        s.x1 = x;
        s.y2 = s.y1;
        s.y1 = y;

        let peak = center_tap.abs().max(y.abs());
        if peak > self.max_reg_val || peak.is_nan() {
            self.max_reg_val = if peak.is_nan() { f64::INFINITY } else { peak };
        }

        y
    }

    fn handle_overflow(&mut self) {
        self.state.fill(BiquadState::default());
        self.max_reg_val = INITIAL_MAX_REG_VAL;
        self.overflows += 1;
        if !self.overflow_reported {
            self.overflow_reported = true;
            self.overflow_reports += 1;
            error!("IIR filter registers overflowed, the filter has been reset");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn tone_peak(filter: &mut IirFilter, freq: f64, sample_rate: f64) -> f64 {
        let mut peak: f64 = 0.0;
        for n in 0..12000 {
            let x = (2.0 * PI * freq * n as f64 / sample_rate).sin();
            let y = filter.filter(x);
            if n > 6000 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn test_high_pass_response() {
        let mut filter = IirFilter::elliptic_hpf();
        let pass = tone_peak(&mut filter, 1000.0, 12000.0);
        filter.reset();
        let stop = tone_peak(&mut filter, 50.0, 12000.0);
        assert!(pass > 0.7, "1kHz attenuated to {}", pass);
        assert!(stop < 0.1, "50Hz leaked through at {}", stop);
    }

    #[test]
    fn test_four_pole_blocks_dc() {
        let mut filter = IirFilter::new(&ELLIPTIC_HPF_4POLE);
        let mut y = 0.0;
        for _ in 0..24000 {
            y = filter.filter(0.5);
        }
        assert!(y.abs() < 1e-3, "DC leaked through at {}", y);
    }

    #[test]
    fn test_overflow_resets_registers_and_reports_once() {
        let mut filter = IirFilter::elliptic_hpf();
        filter.filter(1.0e25);
        assert!(filter.max_reg_val() > OVERFLOW_LIMIT);

        let y = filter.filter(0.0);
        assert_eq!(y, 0.0);
        assert!(filter
            .state()
            .iter()
            .all(|s| *s == BiquadState::default()));
        assert!(filter.overflow_count() >= 1);
        assert_eq!(filter.overflow_reports(), 1);

        let before = filter.overflow_count();
        filter.filter(1.0e25);
        filter.filter(0.0);
        assert!(filter.overflow_count() > before);
        assert_eq!(filter.overflow_reports(), 1);
    }

    #[test]
    fn test_block_matches_per_sample() {
        let input: Vec<f64> = (0..200).map(|n| ((n * 7) % 13) as f64 / 13.0 - 0.5).collect();

        let mut a = IirFilter::elliptic_hpf();
        let expected: Vec<f64> = input.iter().map(|&x| a.filter(x)).collect();

        let mut b = IirFilter::elliptic_hpf();
        let mut block = input.clone();
        b.filter_block(&mut block);
        assert_eq!(block, expected);
    }
}
