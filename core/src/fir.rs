//! FIR filtering and windowed-sinc filter design
//!
//! Coefficients are stored time-reversed so that the dot product against a
//! history buffer holding the newest sample at the end is the convolution.

use crate::error::{Result, TelemRadioError};
use std::f64::consts::PI;

const SINGULARITY_EPSILON: f64 = 1e-9;

/// How designed coefficients are scaled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Coefficients sum to one, so a constant input passes at unity gain
    DcGain,
    /// Coefficients have unit L2 norm
    UnitEnergy,
}

/// Filter one sample. `history` is shifted left by one, `sample` is written to
/// the last slot and the dot product with `coeffs` is returned.
pub fn fir_filter(sample: f64, coeffs: &[f64], history: &mut [f64]) -> f64 {
    debug_assert_eq!(coeffs.len(), history.len());
    if history.is_empty() {
        return 0.0;
    }
    history.copy_within(1.., 0);
    let last = history.len() - 1;
    history[last] = sample;
    coeffs.iter().zip(history.iter()).map(|(c, x)| c * x).sum()
}

/// FIR filter owning its coefficients and history
#[derive(Debug, Clone)]
pub struct FirFilter {
    coeffs: Vec<f64>,
    history: Vec<f64>,
}

impl FirFilter {
    pub fn new(coeffs: Vec<f64>) -> Self {
        let history = vec![0.0; coeffs.len()];
        Self { coeffs, history }
    }

    #[inline]
    pub fn filter(&mut self, sample: f64) -> f64 {
        fir_filter(sample, &self.coeffs, &mut self.history)
    }

    /// Zero the history, keeping the coefficients
    pub fn reset(&mut self) {
        self.history.fill(0.0);
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// Redesign as a raised-cosine low pass in place, without reallocating
    pub fn redesign_raised_cosine(
        &mut self,
        sample_rate: f64,
        cutoff: f64,
        alpha: f64,
        normalization: Normalization,
    ) -> Result<()> {
        design_raised_cosine(&mut self.coeffs, sample_rate, cutoff, alpha, normalization)?;
        self.reset();
        Ok(())
    }

    /// Redesign as a root-raised-cosine pulse filter in place
    pub fn redesign_root_raised_cosine(
        &mut self,
        sample_rate: f64,
        symbol_rate: f64,
        alpha: f64,
        normalization: Normalization,
    ) -> Result<()> {
        design_root_raised_cosine(
            &mut self.coeffs,
            sample_rate,
            symbol_rate,
            alpha,
            normalization,
        )?;
        self.reset();
        Ok(())
    }
}

fn validate_design(len: usize, sample_rate: f64, freq: f64, alpha: f64) -> Result<()> {
    if len == 0 {
        return Err(TelemRadioError::FilterDesign(
            "filter length must be at least 1".to_string(),
        ));
    }
    if !(sample_rate > 0.0) || !(freq > 0.0) {
        return Err(TelemRadioError::FilterDesign(format!(
            "sample rate {sample_rate} and frequency {freq} must be positive"
        )));
    }
    if !(0.0..=1.0).contains(&alpha) {
        return Err(TelemRadioError::FilterDesign(format!(
            "roll-off {alpha} must be between 0 and 1"
        )));
    }
    Ok(())
}

/// Scale and time-reverse freshly designed taps
fn finish_design(coeffs: &mut [f64], normalization: Normalization) -> Result<()> {
    let gain = match normalization {
        Normalization::DcGain => coeffs.iter().sum::<f64>(),
        Normalization::UnitEnergy => coeffs.iter().map(|c| c * c).sum::<f64>().sqrt(),
    };
    if gain == 0.0 || !gain.is_finite() {
        return Err(TelemRadioError::FilterDesign(format!(
            "cannot normalize taps with gain {gain}"
        )));
    }
    for c in coeffs.iter_mut() {
        *c /= gain;
    }
    coeffs.reverse();
    Ok(())
}

/// Design raised-cosine low pass taps into `coeffs`.
///
/// `cutoff` is in Hz. The removable singularities at the center tap and at
/// `±1/(2·alpha·Fc)` taps are evaluated analytically.
pub fn design_raised_cosine(
    coeffs: &mut [f64],
    sample_rate: f64,
    cutoff: f64,
    alpha: f64,
    normalization: Normalization,
) -> Result<()> {
    validate_design(coeffs.len(), sample_rate, cutoff, alpha)?;

    let fc = cutoff / sample_rate;
    let center = (coeffs.len() - 1) as f64 / 2.0;

    for (i, c) in coeffs.iter_mut().enumerate() {
        let n = i as f64 - center;
        let x = 2.0 * alpha * fc * n;

        let sinc = if n.abs() < SINGULARITY_EPSILON {
            2.0 * PI * fc
        } else {
            (2.0 * PI * fc * n).sin() / n
        };
        let window = if (1.0 - x * x).abs() < SINGULARITY_EPSILON {
            PI / 4.0
        } else {
            (alpha * PI * fc * n).cos() / (1.0 - x * x)
        };
        *c = sinc * window;
    }

    finish_design(coeffs, normalization)
}

/// Allocating wrapper around [`design_raised_cosine`]
pub fn raised_cosine(
    len: usize,
    sample_rate: f64,
    cutoff: f64,
    alpha: f64,
    normalization: Normalization,
) -> Result<Vec<f64>> {
    let mut coeffs = vec![0.0; len];
    design_raised_cosine(&mut coeffs, sample_rate, cutoff, alpha, normalization)?;
    Ok(coeffs)
}

/// Design root-raised-cosine pulse shaping taps into `coeffs`.
///
/// Time is measured in symbol periods. The center tap and `t = ±1/(4·alpha)`
/// use their closed-form limits.
pub fn design_root_raised_cosine(
    coeffs: &mut [f64],
    sample_rate: f64,
    symbol_rate: f64,
    alpha: f64,
    normalization: Normalization,
) -> Result<()> {
    validate_design(coeffs.len(), sample_rate, symbol_rate, alpha)?;

    let samples_per_symbol = sample_rate / symbol_rate;
    let center = (coeffs.len() - 1) as f64 / 2.0;

    for (i, c) in coeffs.iter_mut().enumerate() {
        let t = (i as f64 - center) / samples_per_symbol;

        *c = if t.abs() < SINGULARITY_EPSILON {
            1.0 + alpha * (4.0 / PI - 1.0)
        } else if alpha > 0.0 && (t.abs() - 1.0 / (4.0 * alpha)).abs() < SINGULARITY_EPSILON {
            let arg = PI / (4.0 * alpha);
            (alpha / 2.0_f64.sqrt())
                * ((1.0 + 2.0 / PI) * arg.sin() + (1.0 - 2.0 / PI) * arg.cos())
        } else {
            let num = (PI * t * (1.0 - alpha)).sin()
                + 4.0 * alpha * t * (PI * t * (1.0 + alpha)).cos();
            let den = PI * t * (1.0 - (4.0 * alpha * t).powi(2));
            num / den
        };
    }

    finish_design(coeffs, normalization)
}

/// Allocating wrapper around [`design_root_raised_cosine`]
pub fn root_raised_cosine(
    len: usize,
    sample_rate: f64,
    symbol_rate: f64,
    alpha: f64,
    normalization: Normalization,
) -> Result<Vec<f64>> {
    let mut coeffs = vec![0.0; len];
    design_root_raised_cosine(&mut coeffs, sample_rate, symbol_rate, alpha, normalization)?;
    Ok(coeffs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_reproduces_coefficients() {
        let coeffs = raised_cosine(48, 48000.0, 6000.0, 0.5, Normalization::DcGain).unwrap();
        let mut filter = FirFilter::new(coeffs.clone());

        let len = coeffs.len();
        for k in 0..len {
            let input = if k == 0 { 1.0 } else { 0.0 };
            let out = filter.filter(input);
            assert!((out - coeffs[len - 1 - k]).abs() < 1e-15, "tap {}", k);
        }
        // impulse has left the history
        assert_eq!(filter.filter(0.0), 0.0);
    }

    #[test]
    fn test_raised_cosine_symmetric_with_peak_at_center() {
        for len in [47, 48, 480] {
            let coeffs =
                raised_cosine(len, 48000.0, 6000.0, 0.5, Normalization::UnitEnergy).unwrap();
            for i in 0..len {
                assert!(
                    (coeffs[i] - coeffs[len - 1 - i]).abs() < 1e-12,
                    "len {} tap {}",
                    len,
                    i
                );
            }
            let (peak_idx, _) = coeffs
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.abs().partial_cmp(&b.1.abs()).unwrap())
                .unwrap();
            let mid = (len - 1) / 2;
            assert!(peak_idx == mid || peak_idx == len / 2, "len {} peak {}", len, peak_idx);
        }
    }

    #[test]
    fn test_normalization() {
        let dc = raised_cosine(480, 48000.0, 6000.0, 0.5, Normalization::DcGain).unwrap();
        assert!((dc.iter().sum::<f64>() - 1.0).abs() < 1e-9);

        let energy = raised_cosine(480, 48000.0, 6000.0, 0.5, Normalization::UnitEnergy).unwrap();
        let norm: f64 = energy.iter().map(|c| c * c).sum();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_dc_gain_filter_settles_to_input() {
        let coeffs = raised_cosine(480, 48000.0, 6000.0, 0.5, Normalization::DcGain).unwrap();
        let mut filter = FirFilter::new(coeffs);
        let mut out = 0.0;
        for _ in 0..480 {
            out = filter.filter(0.2);
        }
        assert!((out - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_low_pass_rejects_high_frequency() {
        let coeffs = raised_cosine(480, 48000.0, 6000.0, 0.5, Normalization::DcGain).unwrap();
        let mut filter = FirFilter::new(coeffs);
        let mut peak: f64 = 0.0;
        for n in 0..4800 {
            let x = (2.0 * PI * 18000.0 * n as f64 / 48000.0).sin();
            let y = filter.filter(x);
            if n > 960 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.05, "18kHz leaked through at {}", peak);
    }

    #[test]
    fn test_singularity_taps_are_finite() {
        // 1/(2·alpha·Fc) lands exactly on a tap for these parameters
        let coeffs = raised_cosine(81, 48000.0, 6000.0, 0.5, Normalization::DcGain).unwrap();
        assert!(coeffs.iter().all(|c| c.is_finite()));

        // t = ±1/(4·alpha) lands on a tap with 60 samples per symbol
        let rrc =
            root_raised_cosine(61, 12000.0, 200.0, 0.5, Normalization::UnitEnergy).unwrap();
        assert!(rrc.iter().all(|c| c.is_finite()));
        for i in 0..61 {
            assert!((rrc[i] - rrc[60 - i]).abs() < 1e-12);
        }
        assert!(rrc[30] > rrc[0]);
    }

    #[test]
    fn test_in_place_redesign_keeps_length() {
        let mut filter = FirFilter::new(vec![0.0; 480]);
        filter.filter(1.0);
        filter
            .redesign_raised_cosine(48000.0, 6000.0, 0.5, Normalization::DcGain)
            .unwrap();
        assert_eq!(filter.len(), 480);
        assert!(filter.history().iter().all(|&x| x == 0.0));
        assert!((filter.coefficients().iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_design_parameters() {
        assert!(raised_cosine(0, 48000.0, 6000.0, 0.5, Normalization::DcGain).is_err());
        assert!(raised_cosine(48, 0.0, 6000.0, 0.5, Normalization::DcGain).is_err());
        assert!(raised_cosine(48, 48000.0, 6000.0, 1.5, Normalization::DcGain).is_err());
        assert!(root_raised_cosine(48, 12000.0, -200.0, 0.5, Normalization::DcGain).is_err());
    }
}
