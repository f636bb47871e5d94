//! Payload source for the telemetry filler: uptime, audio loop health and
//! whatever host sensors are readable

use std::sync::Arc;
use std::time::Instant;
use telemradio_core::layout::{DuvHeader, DuvPacket, RtTelemetry, FRAME_TYPE_RT};
use telemradio_core::{LoopStats, PayloadSource, DUV_DATA_LENGTH};
use tracing::debug;

const CPU_TEMP_FILE: &str = "/sys/class/thermal/thermal_zone0/temp";
const CPU_FREQ_FILE: &str = "/sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq";

pub struct HostTelemetry {
    id: u8,
    epoch: u16,
    started: Instant,
    stats: Arc<LoopStats>,
    frames: u64,
}

impl HostTelemetry {
    pub fn new(id: u8, epoch: u16, stats: Arc<LoopStats>) -> Self {
        Self {
            id,
            epoch,
            started: Instant::now(),
            stats,
            frames: 0,
        }
    }

    pub fn packet(&self) -> DuvPacket {
        DuvPacket {
            header: DuvHeader {
                id: self.id,
                epoch: self.epoch,
                uptime: self.started.elapsed().as_secs() as u32 & 0x1ff_ffff,
                frame_type: FRAME_TYPE_RT,
                ..Default::default()
            },
            telemetry: RtTelemetry {
                // tenths of a degree
                pi_temperature: read_sys_value(CPU_TEMP_FILE).map_or(0, |m| (m / 100) as u16),
                xruns: self.stats.xruns().min(u16::MAX as u32) as u16,
                // hundreds of microseconds
                loop_time: (self.stats.avg().as_micros() / 100).min(255) as u8,
                // hundreds of MHz
                cpu_speed: read_sys_value(CPU_FREQ_FILE).map_or(0, |khz| (khz / 100_000).min(255) as u8),
                ..Default::default()
            },
        }
    }
}

fn read_sys_value(path: &str) -> Option<i64> {
    match std::fs::read_to_string(path) {
        Ok(text) => text.trim().parse().ok(),
        Err(e) => {
            debug!("Could not read {}: {}", path, e);
            None
        }
    }
}

impl PayloadSource for HostTelemetry {
    fn gather(&mut self, payload: &mut [u8; DUV_DATA_LENGTH]) -> telemradio_core::Result<()> {
        let packet = self.packet();
        *payload = packet.to_bytes();
        self.frames += 1;
        debug!(
            "Telemetry frame {}: uptime {}s, loop time {}, xruns {}",
            self.frames,
            packet.header.uptime,
            packet.telemetry.loop_time,
            packet.telemetry.xruns
        );
        Ok(())
    }
}
