//! Per-period audio processing
//!
//! [`AudioProcessor::process_period`] runs on the audio server's real-time
//! thread. It must not block or allocate, so every buffer and filter is sized
//! in [`AudioProcessor::new`] and redesigned in place when rates change.
//!
//! Modes are checked in priority order: test tone, tone measurement, high
//! speed telemetry, then the default DUV chain:
//!
//! ```text
//! input -> decimate FIR -> keep every Nth -> [HPF] -> [+ modulator]
//!       -> zero stuff x N -> interpolate FIR -> output
//! ```

use crate::bitstream::FrameBitStream;
use crate::error::{Result, TelemRadioError};
use crate::exchange::FrameExchange;
use crate::fir::{raised_cosine, FirFilter, Normalization};
use crate::iir::IirFilter;
use crate::modulator::{BitModulator, ModulatorSettings};
use crate::oscillator::{Oscillator, WaveTable};
use crate::params::{LoopStats, ParamSnapshot, RuntimeParams};
use crate::{
    DECIMATE_FILTER_LEN, FILTER_ALPHA, HIGH_SPEED_DECIMATION_RATE, LOOPS_PER_MEASUREMENT,
    LOOPS_PER_TIMING_REPORT, OSC_TABLE_SIZE, TEST_TONE_LEVEL,
};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    TestTone,
    ToneMeasurement,
    HighSpeedTelemetry,
    Duv,
}

impl Mode {
    fn select(snap: &ParamSnapshot) -> Self {
        if snap.test_tone {
            Mode::TestTone
        } else if snap.measure_test_tone {
            Mode::ToneMeasurement
        } else if snap.send_high_speed_telem {
            Mode::HighSpeedTelemetry
        } else {
            Mode::Duv
        }
    }
}

/// Peak input level over one measurement window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneReport {
    pub periods: u32,
    pub peak: f32,
}

#[derive(Debug, Default)]
struct ToneMeter {
    periods: u32,
    peak: f32,
    last: Option<ToneReport>,
}

impl ToneMeter {
    fn reset(&mut self) {
        self.periods = 0;
        self.peak = 0.0;
    }

    fn measure(&mut self, input: &[f32]) {
        for &x in input {
            self.peak = self.peak.max(x.abs());
        }
        self.periods += 1;
        if self.periods >= LOOPS_PER_MEASUREMENT {
            let report = ToneReport {
                periods: self.periods,
                peak: self.peak,
            };
            info!(
                "Peak level {:.6} over {} periods",
                report.peak, report.periods
            );
            self.last = Some(report);
            self.reset();
        }
    }
}

#[derive(Debug)]
struct LoopTimer {
    deadline: Duration,
    periods: u32,
    total: Duration,
    max: Duration,
    min: Duration,
    overruns: u64,
}

impl LoopTimer {
    fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            periods: 0,
            total: Duration::ZERO,
            max: Duration::ZERO,
            min: Duration::MAX,
            overruns: 0,
        }
    }

    fn record(&mut self, elapsed: Duration, stats: &LoopStats) {
        self.periods += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
        self.min = self.min.min(elapsed);

        if self.periods >= LOOPS_PER_TIMING_REPORT {
            stats.publish(self.total / self.periods, self.max, self.min);
            if self.max > self.deadline {
                self.overruns += 1;
                warn!(
                    "Audio loop took up to {:?}, over the {:?} period deadline",
                    self.max, self.deadline
                );
            }
            self.periods = 0;
            self.total = Duration::ZERO;
            self.max = Duration::ZERO;
            self.min = Duration::MAX;
        }
    }
}

fn period_deadline(period_size: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(period_size as f64 / sample_rate as f64)
}

fn check_chain(period_size: usize, sample_rate: u32, decimation_rate: u32) -> Result<()> {
    if sample_rate == 0 || decimation_rate == 0 {
        return Err(TelemRadioError::InvalidConfig(format!(
            "sample rate {sample_rate} and decimation rate {decimation_rate} must be non-zero"
        )));
    }
    if period_size == 0 || period_size % decimation_rate as usize != 0 {
        return Err(TelemRadioError::InvalidConfig(format!(
            "period of {period_size} samples is not a multiple of decimation rate {decimation_rate}"
        )));
    }
    Ok(())
}

pub struct AudioProcessor {
    params: Arc<RuntimeParams>,
    stats: Arc<LoopStats>,
    period_size: usize,
    sample_rate: u32,
    decimation_rate: u32,
    decimate_filter: FirFilter,
    interpolate_filter: FirFilter,
    hpf: IirFilter,
    modulator: BitModulator,
    bitstream: FrameBitStream,
    oscillator: Oscillator,
    decimated: Vec<f64>,
    mode: Option<Mode>,
    telemetry_on: bool,
    clip_reported: bool,
    clip_reports: u64,
    rejected_chain: Option<(u32, u32)>,
    rejected_modulator: Option<(u32, u32, u32)>,
    meter: ToneMeter,
    timer: LoopTimer,
}

impl AudioProcessor {
    pub fn new(
        period_size: usize,
        params: Arc<RuntimeParams>,
        stats: Arc<LoopStats>,
        exchange: Arc<FrameExchange>,
    ) -> Result<Self> {
        let snap = params.snapshot();
        check_chain(period_size, snap.sample_rate, snap.decimation_rate)?;

        let sample_rate = snap.sample_rate as f64;
        let cutoff = sample_rate / (2.0 * snap.decimation_rate as f64);
        let coeffs = raised_cosine(
            DECIMATE_FILTER_LEN,
            sample_rate,
            cutoff,
            FILTER_ALPHA,
            Normalization::DcGain,
        )?;
        let modulator =
            BitModulator::new(snap.sample_rate, snap.duv_bit_rate, snap.decimation_rate)?;
        let oscillator = Oscillator::new(WaveTable::cosine(OSC_TABLE_SIZE))?;

        info!(
            "Audio processor: {} samples per period at {}Hz, decimation {}, {} samples per bit",
            period_size,
            snap.sample_rate,
            snap.decimation_rate,
            modulator.samples_per_bit()
        );

        Ok(Self {
            params,
            stats,
            period_size,
            sample_rate: snap.sample_rate,
            decimation_rate: snap.decimation_rate,
            decimate_filter: FirFilter::new(coeffs.clone()),
            interpolate_filter: FirFilter::new(coeffs),
            hpf: IirFilter::elliptic_hpf(),
            modulator,
            bitstream: FrameBitStream::new(exchange),
            oscillator,
            decimated: vec![0.0; period_size],
            mode: None,
            telemetry_on: false,
            clip_reported: false,
            clip_reports: 0,
            rejected_chain: None,
            rejected_modulator: None,
            meter: ToneMeter::default(),
            timer: LoopTimer::new(period_deadline(period_size, snap.sample_rate)),
        })
    }

    pub fn period_size(&self) -> usize {
        self.period_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn decimation_rate(&self) -> u32 {
        self.decimation_rate
    }

    /// Mode of the most recent period
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn modulator(&self) -> &BitModulator {
        &self.modulator
    }

    pub fn bitstream(&self) -> &FrameBitStream {
        &self.bitstream
    }

    pub fn bitstream_mut(&mut self) -> &mut FrameBitStream {
        &mut self.bitstream
    }

    pub fn hpf(&self) -> &IirFilter {
        &self.hpf
    }

    /// Number of clipping diagnostics emitted
    pub fn clip_reports(&self) -> u64 {
        self.clip_reports
    }

    pub fn last_tone_report(&self) -> Option<ToneReport> {
        self.meter.last
    }

    /// Timing windows whose slowest period missed the deadline
    pub fn overrun_reports(&self) -> u64 {
        self.timer.overruns
    }

    /// For bindings: the period the hardware negotiated must match ours
    pub fn validate_period(&self, frames: usize) -> Result<()> {
        if frames != self.period_size {
            return Err(TelemRadioError::InvalidPeriodSize {
                expected: self.period_size,
                actual: frames,
            });
        }
        Ok(())
    }

    /// Process one period. Never blocks and never fails; faults are logged
    /// and the period completes.
    pub fn process_period(&mut self, input: &[f32], output: &mut [f32]) {
        let start = Instant::now();
        let frames = input.len().min(output.len()).min(self.period_size);
        let input = &input[..frames];
        let output = &mut output[..frames];

        let snap = self.params.snapshot();
        let mode = self.apply_snapshot(&snap);

        match mode {
            Mode::TestTone => self.play_test_tone(output, &snap),
            Mode::ToneMeasurement => {
                output.copy_from_slice(input);
                self.meter.measure(input);
            }
            Mode::HighSpeedTelemetry => self.send_high_speed(output, &snap),
            Mode::Duv => self.process_duv(input, output, &snap),
        }

        self.timer.record(start.elapsed(), &self.stats);
    }

    fn apply_snapshot(&mut self, snap: &ParamSnapshot) -> Mode {
        if snap.sample_rate != self.sample_rate || snap.decimation_rate != self.decimation_rate {
            self.reconfigure_chain(snap.sample_rate, snap.decimation_rate);
        }

        let mode = Mode::select(snap);
        if self.mode != Some(mode) {
            self.enter_mode(mode);
        }

        let (bit_rate, decimation) = match mode {
            Mode::HighSpeedTelemetry => (snap.high_speed_bit_rate, HIGH_SPEED_DECIMATION_RATE),
            _ => (snap.duv_bit_rate, self.decimation_rate),
        };
        if !self.modulator.is_configured_for(self.sample_rate, bit_rate, decimation) {
            let wanted = (self.sample_rate, bit_rate, decimation);
            if self.rejected_modulator != Some(wanted) {
                match self.modulator.init(self.sample_rate, bit_rate, decimation) {
                    Ok(()) => self.rejected_modulator = None,
                    Err(e) => {
                        error!("Keeping previous modulator settings: {}", e);
                        self.rejected_modulator = Some(wanted);
                    }
                }
            }
        }

        let telemetry = match mode {
            Mode::HighSpeedTelemetry => true,
            Mode::Duv => snap.send_telem,
            _ => false,
        };
        if telemetry != self.telemetry_on {
            self.telemetry_on = telemetry;
            self.modulator.reset();
            if telemetry {
                self.bitstream.restart();
                self.clip_reported = false;
            }
        }

        mode
    }

    fn reconfigure_chain(&mut self, sample_rate: u32, decimation_rate: u32) {
        if self.rejected_chain == Some((sample_rate, decimation_rate)) {
            return;
        }
        let redesign = check_chain(self.period_size, sample_rate, decimation_rate).and_then(|_| {
            let rate = sample_rate as f64;
            let cutoff = rate / (2.0 * decimation_rate as f64);
            self.decimate_filter
                .redesign_raised_cosine(rate, cutoff, FILTER_ALPHA, Normalization::DcGain)?;
            self.interpolate_filter
                .redesign_raised_cosine(rate, cutoff, FILTER_ALPHA, Normalization::DcGain)
        });

        match redesign {
            Ok(()) => {
                info!(
                    "Audio chain now {}Hz with decimation {}",
                    sample_rate, decimation_rate
                );
                self.sample_rate = sample_rate;
                self.decimation_rate = decimation_rate;
                self.hpf.reset();
                self.timer.deadline = period_deadline(self.period_size, sample_rate);
                self.rejected_chain = None;
            }
            Err(e) => {
                error!("Keeping previous audio chain settings: {}", e);
                self.rejected_chain = Some((sample_rate, decimation_rate));
            }
        }
    }

    fn enter_mode(&mut self, mode: Mode) {
        info!("Audio mode: {:?}", mode);
        match mode {
            Mode::TestTone => self.oscillator.reset(),
            Mode::ToneMeasurement => self.meter.reset(),
            Mode::HighSpeedTelemetry => {}
            Mode::Duv => {
                self.decimate_filter.reset();
                self.interpolate_filter.reset();
                self.hpf.reset();
            }
        }
        // force the telemetry restart below
        self.telemetry_on = false;
        self.clip_reported = false;
        self.mode = Some(mode);
    }

    fn modulator_settings(&self, snap: &ParamSnapshot) -> ModulatorSettings {
        let ramp_allowed = self.mode == Some(Mode::Duv) && snap.ramp_bits_to_compensate_hpf;
        ModulatorSettings {
            one_value: snap.one_value,
            zero_value: snap.zero_value,
            ramp: ramp_allowed.then_some(snap.ramp_amount),
            bit_filter: snap.bit_filter,
            test_pattern: snap.send_test_telem,
        }
    }

    fn check_clip(&mut self, value: f32) {
        if value.abs() > 1.0 && !self.clip_reported {
            self.clip_reported = true;
            self.clip_reports += 1;
            warn!("Audio output is clipping: {}", value);
        }
    }

    fn play_test_tone(&mut self, output: &mut [f32], snap: &ParamSnapshot) {
        for out in output.iter_mut() {
            let v = self.oscillator.next_sample(snap.test_tone_freq, self.sample_rate);
            let value = if snap.digital_test_tone {
                if v >= 0.0 {
                    snap.one_value
                } else {
                    snap.zero_value
                }
            } else {
                TEST_TONE_LEVEL * v
            };
            *out = value as f32;
        }
    }

    fn send_high_speed(&mut self, output: &mut [f32], snap: &ParamSnapshot) {
        let settings = self.modulator_settings(snap);
        for out in output.iter_mut() {
            let value = self.modulator.modulate_bit(&mut self.bitstream, &settings) as f32;
            *out = value;
            self.check_clip(value);
        }
    }

    fn process_duv(&mut self, input: &[f32], output: &mut [f32], snap: &ParamSnapshot) {
        let n = self.decimation_rate as usize;
        let decimated_len = input.len() / n;
        let settings = self.modulator_settings(snap);

        for (i, &x) in input.iter().enumerate() {
            let y = self.decimate_filter.filter(x as f64);
            if (i + 1) % n == 0 {
                self.decimated[i / n] = y;
            }
        }

        let block = &mut self.decimated[..decimated_len];
        if snap.hpf {
            self.hpf.filter_block(block);
        }
        if self.telemetry_on {
            for s in block.iter_mut() {
                *s += self.modulator.modulate_bit(&mut self.bitstream, &settings);
            }
        }

        let gain = n as f64;
        for (i, out) in output.iter_mut().enumerate() {
            let stuffed = if (i + 1) % n == 0 {
                self.decimated[i / n] * gain
            } else {
                0.0
            };
            let value = self.interpolate_filter.filter(stuffed) as f32;
            *out = value;
            self.check_clip(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PERIOD_SIZE;
    use std::f64::consts::PI;

    fn processor(params: &Arc<RuntimeParams>) -> AudioProcessor {
        AudioProcessor::new(
            PERIOD_SIZE,
            params.clone(),
            Arc::new(LoopStats::new()),
            Arc::new(FrameExchange::new()),
        )
        .unwrap()
    }

    fn tone_period(start: usize, freq: f64, level: f64) -> Vec<f32> {
        (start..start + PERIOD_SIZE)
            .map(|n| (level * (2.0 * PI * freq * n as f64 / 48000.0).sin()) as f32)
            .collect()
    }

    #[test]
    fn test_mode_priority() {
        let params = Arc::new(RuntimeParams::new());
        let mut proc = processor(&params);
        let input = vec![0.0f32; PERIOD_SIZE];
        let mut output = vec![0.0f32; PERIOD_SIZE];

        proc.process_period(&input, &mut output);
        assert_eq!(proc.mode(), Some(Mode::Duv));

        params.set_send_high_speed_telem(true);
        proc.process_period(&input, &mut output);
        assert_eq!(proc.mode(), Some(Mode::HighSpeedTelemetry));
        assert_eq!(proc.modulator().samples_per_bit(), 40);

        params.set_measure_test_tone(true);
        proc.process_period(&input, &mut output);
        assert_eq!(proc.mode(), Some(Mode::ToneMeasurement));

        params.set_test_tone(true);
        proc.process_period(&input, &mut output);
        assert_eq!(proc.mode(), Some(Mode::TestTone));

        params.set_test_tone(false);
        params.set_measure_test_tone(false);
        params.set_send_high_speed_telem(false);
        proc.process_period(&input, &mut output);
        assert_eq!(proc.mode(), Some(Mode::Duv));
        assert_eq!(proc.modulator().samples_per_bit(), 60);
    }

    #[test]
    fn test_duv_chain_passes_voice_band() {
        let params = Arc::new(RuntimeParams::new());
        let mut proc = processor(&params);
        let mut output = vec![0.0f32; PERIOD_SIZE];

        let mut peak: f32 = 0.0;
        for p in 0..20 {
            let input = tone_period(p * PERIOD_SIZE, 1000.0, 0.5);
            proc.process_period(&input, &mut output);
            if p >= 10 {
                peak = output.iter().fold(peak, |m, v| m.max(v.abs()));
            }
        }
        assert!((peak - 0.5).abs() < 0.05, "1kHz came through at {}", peak);
    }

    #[test]
    fn test_duv_chain_removes_low_frequencies() {
        let params = Arc::new(RuntimeParams::new());
        let mut proc = processor(&params);
        let mut output = vec![0.0f32; PERIOD_SIZE];

        let mut peak: f32 = 0.0;
        for p in 0..50 {
            let input = tone_period(p * PERIOD_SIZE, 50.0, 0.5);
            proc.process_period(&input, &mut output);
            if p >= 30 {
                peak = output.iter().fold(peak, |m, v| m.max(v.abs()));
            }
        }
        assert!(peak < 0.01, "50Hz leaked through at {}", peak);

        // with the high pass off it is back
        params.set_hpf(false);
        peak = 0.0;
        for p in 50..100 {
            let input = tone_period(p * PERIOD_SIZE, 50.0, 0.5);
            proc.process_period(&input, &mut output);
            if p >= 80 {
                peak = output.iter().fold(peak, |m, v| m.max(v.abs()));
            }
        }
        assert!(peak > 0.4, "50Hz blocked with the filter off: {}", peak);
    }

    #[test]
    fn test_test_tones() {
        let params = Arc::new(RuntimeParams::new());
        params.set_test_tone(true);
        let mut proc = processor(&params);
        let input = vec![0.9f32; PERIOD_SIZE];
        let mut output = vec![0.0f32; PERIOD_SIZE];

        proc.process_period(&input, &mut output);
        let peak = output.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!((peak - 0.2).abs() < 1e-3);

        params.set_digital_test_tone(true);
        proc.process_period(&input, &mut output);
        assert!(output.iter().all(|&v| v == 0.2f32 || v == -0.2f32));
        assert!(output.contains(&0.2f32) && output.contains(&-0.2f32));
    }

    #[test]
    fn test_invalid_rate_change_keeps_running() {
        let params = Arc::new(RuntimeParams::new());
        let mut proc = processor(&params);
        let input = vec![0.0f32; PERIOD_SIZE];
        let mut output = vec![0.0f32; PERIOD_SIZE];

        params.set_decimation_rate(7);
        proc.process_period(&input, &mut output);
        assert_eq!(proc.decimation_rate(), 4);

        params.set_decimation_rate(6);
        proc.process_period(&input, &mut output);
        assert_eq!(proc.decimation_rate(), 6);
        assert_eq!(proc.modulator().samples_per_bit(), 40);
    }

    #[test]
    fn test_new_rejects_bad_chain() {
        let params = Arc::new(RuntimeParams::new());
        params.set_decimation_rate(7);
        let result = AudioProcessor::new(
            PERIOD_SIZE,
            params,
            Arc::new(LoopStats::new()),
            Arc::new(FrameExchange::new()),
        );
        assert!(matches!(result, Err(TelemRadioError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_period() {
        let params = Arc::new(RuntimeParams::new());
        let proc = processor(&params);
        assert!(proc.validate_period(480).is_ok());
        assert!(matches!(
            proc.validate_period(512),
            Err(TelemRadioError::InvalidPeriodSize {
                expected: 480,
                actual: 512
            })
        ));
    }

    #[test]
    fn test_loop_timer_counts_overrun_windows() {
        let stats = LoopStats::new();
        let mut timer = LoopTimer::new(period_deadline(PERIOD_SIZE, 48000));
        assert_eq!(timer.deadline, Duration::from_millis(10));

        // one slow period in the window
        for n in 0..LOOPS_PER_TIMING_REPORT {
            let elapsed = if n == 17 {
                Duration::from_millis(12)
            } else {
                Duration::from_millis(1)
            };
            timer.record(elapsed, &stats);
        }
        assert_eq!(timer.overruns, 1);
        assert_eq!(stats.max(), Duration::from_millis(12));
        assert_eq!(timer.periods, 0);
        assert_eq!(timer.total, Duration::ZERO);
        assert_eq!(timer.max, Duration::ZERO);
        assert_eq!(timer.min, Duration::MAX);

        // a window that stays under the deadline
        for _ in 0..LOOPS_PER_TIMING_REPORT {
            timer.record(Duration::from_millis(2), &stats);
        }
        assert_eq!(timer.overruns, 1);
        assert_eq!(stats.reports(), 2);
        assert_eq!(stats.max(), Duration::from_millis(2));
        assert_eq!(stats.min(), Duration::from_millis(2));
    }

    #[test]
    fn test_timing_published() {
        let params = Arc::new(RuntimeParams::new());
        let stats = Arc::new(LoopStats::new());
        let mut proc = AudioProcessor::new(
            PERIOD_SIZE,
            params,
            stats.clone(),
            Arc::new(FrameExchange::new()),
        )
        .unwrap();
        let input = vec![0.0f32; PERIOD_SIZE];
        let mut output = vec![0.0f32; PERIOD_SIZE];
        for _ in 0..LOOPS_PER_TIMING_REPORT {
            proc.process_period(&input, &mut output);
        }
        assert_eq!(stats.reports(), 1);
        assert!(stats.max() >= stats.avg());
        assert!(stats.avg() >= stats.min());
    }
}
