//! Offline rendering: feed a WAV file through the audio processor one period
//! at a time, with the telemetry filler running on its own thread as it
//! would on the radio.

use crate::telemetry::HostTelemetry;
use crate::wav::{self, CliError, MonoWriter};
use clap::ValueEnum;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use telemradio_core::{
    AudioProcessor, FrameEncoder, FrameExchange, LoopStats, RuntimeParams, TelemetryFiller,
    PERIOD_SIZE,
};
use tracing::{debug, info};

const DEFAULT_SECONDS: f64 = 10.0;
const FILL_TIMEOUT: Duration = Duration::from_secs(5);
const SPACECRAFT_ID: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RenderMode {
    /// Relay the input with the DUV subcarrier underneath
    Duv,
    /// Relay the input with no telemetry
    Relay,
    /// Full-band 1200 bps telemetry, input ignored
    HighSpeed,
    /// Sine test tone
    Tone,
    /// Square test tone at the telemetry levels
    DigitalTone,
    /// Pass the input through and report its peak level
    Measure,
}

impl RenderMode {
    fn sends_telemetry(self) -> bool {
        matches!(self, RenderMode::Duv | RenderMode::HighSpeed)
    }

    fn apply(self, params: &RuntimeParams) {
        params.set_send_telem(self == RenderMode::Duv);
        params.set_send_high_speed_telem(self == RenderMode::HighSpeed);
        params.set_test_tone(matches!(self, RenderMode::Tone | RenderMode::DigitalTone));
        params.set_digital_test_tone(self == RenderMode::DigitalTone);
        params.set_measure_test_tone(self == RenderMode::Measure);
    }
}

pub struct RenderOptions {
    pub input: Option<PathBuf>,
    pub output: PathBuf,
    pub seconds: Option<f64>,
    pub mode: RenderMode,
    pub hpf: bool,
    pub bit_filter: bool,
    pub test_pattern: bool,
    pub tone_freq: Option<f64>,
}

pub fn render_command(
    params: RuntimeParams,
    options: &RenderOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    options.mode.apply(&params);
    params.set_hpf(options.hpf);
    params.set_bit_filter(options.bit_filter);
    params.set_send_test_telem(options.test_pattern);
    if let Some(freq) = options.tone_freq {
        params.set_test_tone_freq(freq);
    }

    let sample_rate = params.sample_rate();
    let source = match &options.input {
        Some(path) => wav::read_mono(path, sample_rate)?,
        None => Vec::new(),
    };
    let total = match (options.seconds, &options.input) {
        (Some(seconds), _) => (seconds.max(0.0) * sample_rate as f64) as usize,
        (None, Some(_)) => source.len(),
        (None, None) => (DEFAULT_SECONDS * sample_rate as f64) as usize,
    };

    let params = Arc::new(params);
    let stats = Arc::new(LoopStats::new());
    let exchange = Arc::new(FrameExchange::new());
    let mut processor =
        AudioProcessor::new(PERIOD_SIZE, params, stats.clone(), exchange.clone())?;

    // the test pattern never pulls frames
    let filler = if options.mode.sends_telemetry() && !options.test_pattern {
        let source = HostTelemetry::new(SPACECRAFT_ID, 0, stats);
        Some(TelemetryFiller::spawn(
            exchange.clone(),
            FrameEncoder::new(),
            source,
        )?)
    } else {
        None
    };

    let mut writer = MonoWriter::create(&options.output, sample_rate)?;
    let mut input = vec![0.0f32; PERIOD_SIZE];
    let mut output = vec![0.0f32; PERIOD_SIZE];
    let periods = total.div_ceil(PERIOD_SIZE);
    let started = Instant::now();

    for p in 0..periods {
        // offline we run faster than real time, so let the filler catch up
        // rather than count missed frames
        if filler.is_some() && p > 0 {
            wait_for_frame(&exchange, processor.bitstream().frames_started() + 1)?;
        }

        let start = p * PERIOD_SIZE;
        let len = (total - start).min(PERIOD_SIZE);
        input.fill(0.0);
        if start < source.len() {
            let n = (source.len() - start).min(PERIOD_SIZE);
            input[..n].copy_from_slice(&source[start..start + n]);
        }

        processor.process_period(&input, &mut output);
        writer.write(&output[..len])?;
    }
    writer.finalize()?;

    let elapsed = started.elapsed();
    debug!("Rendered {} periods in {:?}", periods, elapsed);
    println!(
        "Rendered {} samples ({:.2}s) in {:?} mode to {}",
        total,
        total as f64 / sample_rate as f64,
        options.mode,
        options.output.display()
    );

    if let Some(filler) = filler {
        filler.join()?;
        let bitstream = processor.bitstream();
        println!(
            "Sent {} telemetry frames, {} resent",
            bitstream.frames_started(),
            bitstream.missed_frames()
        );
    }
    if processor.clip_reports() > 0 {
        println!("Output clipped ({} times)", processor.clip_reports());
    }
    if let Some(report) = processor.last_tone_report() {
        println!(
            "Peak input level {:.4} over {} periods",
            report.peak, report.periods
        );
    }
    info!("Audio loop overran its deadline in {} timing windows", processor.overrun_reports());

    Ok(())
}

fn wait_for_frame(exchange: &FrameExchange, generation: u64) -> Result<(), CliError> {
    let deadline = Instant::now() + FILL_TIMEOUT;
    while exchange.generation() < generation {
        if Instant::now() >= deadline {
            return Err(CliError::FillerStalled(generation));
        }
        thread::sleep(Duration::from_micros(200));
    }
    Ok(())
}
