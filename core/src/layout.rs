//! DUV telemetry packet layout
//!
//! Fields are packed least significant bit first into consecutive bits of
//! the 64 byte payload: a 7 byte header followed by 57 bytes of real-time
//! telemetry.

use crate::error::{Result, TelemRadioError};
use crate::DUV_DATA_LENGTH;
use bitvec::prelude::*;

pub const DUV_HEADER_LENGTH: usize = 7;
pub const RT_TELEMETRY_LENGTH: usize = DUV_DATA_LENGTH - DUV_HEADER_LENGTH;

/// Frame type carried in the header
pub const FRAME_TYPE_RT: u8 = 1;

struct BitWriter<'a> {
    bits: &'a mut BitSlice<u8, Lsb0>,
    pos: usize,
}

impl BitWriter<'_> {
    fn put(&mut self, width: usize, value: u32) {
        self.bits[self.pos..self.pos + width].store_le::<u32>(value);
        self.pos += width;
    }
}

struct BitReader<'a> {
    bits: &'a BitSlice<u8, Lsb0>,
    pos: usize,
}

impl BitReader<'_> {
    fn get(&mut self, width: usize) -> u32 {
        let value = self.bits[self.pos..self.pos + width].load_le::<u32>();
        self.pos += width;
        value
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DuvHeader {
    pub id: u8,           // 3 bits
    pub epoch: u16,       // 16 bits
    pub uptime: u32,      // 25 bits, seconds
    pub frame_type: u8,   // 4 bits
    pub extended_id: u8,  // 5 bits
    pub safe_mode: bool,
    pub health_mode: bool,
    pub science_mode: bool,
}

impl DuvHeader {
    fn write(&self, w: &mut BitWriter<'_>) {
        w.put(3, self.id as u32);
        w.put(16, self.epoch as u32);
        w.put(25, self.uptime);
        w.put(4, self.frame_type as u32);
        w.put(5, self.extended_id as u32);
        w.put(1, self.safe_mode as u32);
        w.put(1, self.health_mode as u32);
        w.put(1, self.science_mode as u32);
    }

    fn read(r: &mut BitReader<'_>) -> Self {
        Self {
            id: r.get(3) as u8,
            epoch: r.get(16) as u16,
            uptime: r.get(25),
            frame_type: r.get(4) as u8,
            extended_id: r.get(5) as u8,
            safe_mode: r.get(1) != 0,
            health_mode: r.get(1) != 0,
            science_mode: r.get(1) != 0,
        }
    }

    /// Spacecraft number: ids 1-7 map to 9-15, id 0 defers to the extended id
    pub fn spacecraft_id(&self) -> u16 {
        if self.id == 0 {
            8 + self.extended_id as u16
        } else {
            8 + self.id as u16
        }
    }
}

/// Real-time telemetry block that follows the header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtTelemetry {
    pub pi_temperature: u16,
    pub xruns: u16,
    pub loop_time: u8,
    pub cpu_speed: u8,
    pub data2: u8,
    pub data3: u8,
    pub pad: [u32; 12],
    pub pad13: u8,
}

impl RtTelemetry {
    fn write(&self, w: &mut BitWriter<'_>) {
        w.put(16, self.pi_temperature as u32);
        w.put(16, self.xruns as u32);
        w.put(8, self.loop_time as u32);
        w.put(8, self.cpu_speed as u32);
        w.put(8, self.data2 as u32);
        w.put(8, self.data3 as u32);
        for &p in &self.pad {
            w.put(32, p);
        }
        w.put(8, self.pad13 as u32);
    }

    fn read(r: &mut BitReader<'_>) -> Self {
        let pi_temperature = r.get(16) as u16;
        let xruns = r.get(16) as u16;
        let loop_time = r.get(8) as u8;
        let cpu_speed = r.get(8) as u8;
        let data2 = r.get(8) as u8;
        let data3 = r.get(8) as u8;
        let mut pad = [0u32; 12];
        for p in pad.iter_mut() {
            *p = r.get(32);
        }
        let pad13 = r.get(8) as u8;
        Self {
            pi_temperature,
            xruns,
            loop_time,
            cpu_speed,
            data2,
            data3,
            pad,
            pad13,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DuvPacket {
    pub header: DuvHeader,
    pub telemetry: RtTelemetry,
}

impl DuvPacket {
    pub fn to_bytes(&self) -> [u8; DUV_DATA_LENGTH] {
        let mut bytes = [0u8; DUV_DATA_LENGTH];
        let mut writer = BitWriter {
            bits: bytes.view_bits_mut::<Lsb0>(),
            pos: 0,
        };
        self.header.write(&mut writer);
        self.telemetry.write(&mut writer);
        debug_assert_eq!(writer.pos, DUV_DATA_LENGTH * 8);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != DUV_DATA_LENGTH {
            return Err(TelemRadioError::InvalidPayloadSize {
                expected: DUV_DATA_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut reader = BitReader {
            bits: bytes.view_bits::<Lsb0>(),
            pos: 0,
        };
        let header = DuvHeader::read(&mut reader);
        let telemetry = RtTelemetry::read(&mut reader);
        Ok(Self { header, telemetry })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selftest::TEST_PACKET;

    #[test]
    fn test_header_packing_matches_test_packet() {
        let packet = DuvPacket {
            header: DuvHeader {
                id: 1,
                epoch: 42,
                uptime: 6920,
                frame_type: FRAME_TYPE_RT,
                ..Default::default()
            },
            ..Default::default()
        };
        let bytes = packet.to_bytes();
        assert_eq!(&bytes[..4], &[0x51, 0x01, 0x40, 0xd8]);
        assert_eq!(&bytes[4..DUV_HEADER_LENGTH], &TEST_PACKET[4..DUV_HEADER_LENGTH]);
    }

    #[test]
    fn test_unpack_test_packet_header() {
        let packet = DuvPacket::from_bytes(&TEST_PACKET).unwrap();
        assert_eq!(packet.header.id, 1);
        assert_eq!(packet.header.epoch, 42);
        assert_eq!(packet.header.uptime, 6920);
        assert_eq!(packet.header.frame_type, FRAME_TYPE_RT);
        assert_eq!(packet.header.spacecraft_id(), 9);
        assert_eq!(packet.to_bytes(), TEST_PACKET);
    }

    #[test]
    fn test_field_boundaries() {
        let packet = DuvPacket {
            header: DuvHeader {
                id: 7,
                epoch: 0xffff,
                uptime: 0x1ff_ffff,
                frame_type: 0xf,
                extended_id: 0x1f,
                safe_mode: true,
                health_mode: false,
                science_mode: true,
            },
            telemetry: RtTelemetry {
                pi_temperature: 0xbeef,
                xruns: 3,
                loop_time: 250,
                pad: [0xdead_beef; 12],
                pad13: 0x80,
                ..Default::default()
            },
        };
        let bytes = packet.to_bytes();
        assert_eq!(DuvPacket::from_bytes(&bytes).unwrap(), packet);
        assert_eq!(bytes[DUV_DATA_LENGTH - 1], 0x80);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(DuvPacket::from_bytes(&[0u8; 10]).is_err());
    }
}
