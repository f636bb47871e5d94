use crate::error::{Result, TelemRadioError};
use std::f64::consts::TAU;

/// One cycle of a waveform sampled into a lookup table
#[derive(Debug, Clone)]
pub struct WaveTable {
    table: Vec<f64>,
}

impl WaveTable {
    /// Generate a sine table with `size` entries covering one full cycle
    pub fn sine(size: usize) -> Self {
        let table = (0..size)
            .map(|n| (n as f64 * TAU / size as f64).sin())
            .collect();
        Self { table }
    }

    /// Generate a cosine table with `size` entries covering one full cycle
    pub fn cosine(size: usize) -> Self {
        let table = (0..size)
            .map(|n| (n as f64 * TAU / size as f64).cos())
            .collect();
        Self { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Value at the table position for `phase` (radians, 0..2π)
    fn lookup(&self, phase: f64) -> f64 {
        let size = self.table.len();
        let idx = (phase * size as f64 / TAU) as usize % size;
        self.table[idx]
    }
}

/// Table-driven oscillator with its own phase accumulator
#[derive(Debug, Clone)]
pub struct Oscillator {
    table: WaveTable,
    phase: f64,
}

impl Oscillator {
    pub fn new(table: WaveTable) -> Result<Self> {
        if table.is_empty() {
            return Err(TelemRadioError::InvalidConfig(
                "oscillator wave table is empty".to_string(),
            ));
        }
        Ok(Self { table, phase: 0.0 })
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Advance the phase by one sample at `frequency` and return the table value.
    /// Negative frequencies run the phase backwards.
    pub fn next_sample(&mut self, frequency: f64, sample_rate: u32) -> f64 {
        let phase_increment = TAU * frequency / sample_rate as f64;
        self.phase = (self.phase + phase_increment).rem_euclid(TAU);
        self.table.lookup(self.phase)
    }
}
