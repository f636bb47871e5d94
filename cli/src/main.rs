mod render;
mod telemetry;
mod wav;

use clap::{Parser, Subcommand};
use filter_test::{FilterKind, Printout};
use render::{RenderMode, RenderOptions};
use std::path::PathBuf;
use telemradio_core::config::DEFAULT_CONFIG_FILE;
use telemradio_core::{selftest, Config, RuntimeParams, TelemRadioError};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "telemradio")]
#[command(about = "Telemetry radio modem: hides a 200 bps data subcarrier under relayed audio")]
struct Cli {
    /// Config file, defaults to telem_radio.config in the working directory
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the configured sample rate
    #[arg(long, global = true)]
    sample_rate: Option<u32>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in encoder and modulator checks
    Selftest,

    /// Run audio through the modem offline and write the transmitted signal
    Render {
        /// Audio to relay (silence if omitted)
        #[arg(short, long, value_name = "INPUT.WAV")]
        input: Option<PathBuf>,

        /// Output WAV file (32 bit float)
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Length to render; defaults to the input length, or 10 seconds of silence
        #[arg(short, long)]
        seconds: Option<f64>,

        #[arg(short, long, value_enum, default_value = "duv")]
        mode: RenderMode,

        /// Bypass the 300Hz high pass filter
        #[arg(long)]
        no_hpf: bool,

        /// Send square bits instead of root-raised-cosine shaped ones
        #[arg(long)]
        no_bit_filter: bool,

        /// Send alternating bits instead of telemetry frames
        #[arg(long)]
        test_pattern: bool,

        /// Test tone frequency in Hz
        #[arg(long)]
        tone_freq: Option<f64>,
    },

    /// Print one filter's test signal, output or kernel, one value per line
    FilterTest {
        #[arg(value_enum)]
        filter: FilterKind,

        #[arg(short, long, value_enum, default_value = "output")]
        print: Printout,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let params = RuntimeParams::new();
    load_config(cli.config.as_ref(), &params)?;
    if let Some(rate) = cli.sample_rate {
        params.set_sample_rate(rate);
    }

    match cli.command {
        Commands::Selftest => selftest_command(),
        Commands::Render {
            input,
            output,
            seconds,
            mode,
            no_hpf,
            no_bit_filter,
            test_pattern,
            tone_freq,
        } => {
            let options = RenderOptions {
                input,
                output,
                seconds,
                mode,
                hpf: !no_hpf,
                bit_filter: !no_bit_filter,
                test_pattern,
                tone_freq,
            };
            render::render_command(params, &options)?;
        }
        Commands::FilterTest { filter, print } => {
            filter_test::filter_test_command(filter, print, params.sample_rate())?
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "telemradio=debug,telemradio_core=debug"
    } else {
        "telemradio=info,telemradio_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// The config file must exist, either the one given or the default in the
/// working directory
fn load_config(path: Option<&PathBuf>, params: &RuntimeParams) -> Result<(), TelemRadioError> {
    let path = path.cloned().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = Config::load(&path)?;
    info!("Loaded config from {}", path.display());
    config.apply(params);
    Ok(())
}

fn selftest_command() {
    let results = selftest::run_all();
    let mut failed = 0;
    for result in &results {
        let verdict = if result.passed { "Pass" } else { "Fail" };
        println!("TESTING {} .. {}", result.name, verdict);
        if !result.passed {
            failed += 1;
        }
    }

    if failed > 0 {
        println!("{} of {} checks FAILED", failed, results.len());
        std::process::exit(1);
    }
    println!("All {} checks passed", results.len());
}
