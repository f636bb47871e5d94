use crate::error::{Result, TelemRadioError};
use crate::exchange::FrameExchange;
use crate::frame::FrameEncoder;
use crate::DUV_DATA_LENGTH;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Supplies the 64 byte payload for the next frame
pub trait PayloadSource: Send {
    fn gather(&mut self, payload: &mut [u8; DUV_DATA_LENGTH]) -> Result<()>;
}

/// Background thread that answers fill requests from the audio loop by
/// gathering a payload, encoding it and publishing it to the exchange
pub struct TelemetryFiller {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<FrameEncoder>>,
}

impl TelemetryFiller {
    pub fn spawn<S>(exchange: Arc<FrameExchange>, encoder: FrameEncoder, source: S) -> Result<Self>
    where
        S: PayloadSource + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("telem-filler".to_string())
            .spawn(move || fill_loop(&exchange, encoder, source, &flag))?;
        info!("Telemetry filler started");
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Ask the thread to exit after its current fill
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Stop the thread and hand back the encoder, with its running disparity
    pub fn join(mut self) -> Result<FrameEncoder> {
        self.stop();
        let handle = self
            .handle
            .take()
            .ok_or_else(|| TelemRadioError::Payload("filler already joined".to_string()))?;
        handle
            .join()
            .map_err(|_| TelemRadioError::Payload("filler thread panicked".to_string()))
    }
}

impl Drop for TelemetryFiller {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn fill_loop<S: PayloadSource>(
    exchange: &FrameExchange,
    mut encoder: FrameEncoder,
    mut source: S,
    running: &AtomicBool,
) -> FrameEncoder {
    let mut payload = [0u8; DUV_DATA_LENGTH];
    let mut fills: u64 = 0;

    while running.load(Ordering::Relaxed) {
        if !exchange.wait_for_fill_request(POLL_INTERVAL) {
            continue;
        }

        payload.fill(0);
        if let Err(e) = source.gather(&mut payload) {
            error!("Could not gather telemetry, sending zeros: {}", e);
            payload.fill(0);
        }

        match exchange.set_pending_payload(&mut encoder, &payload) {
            Ok(slot) => {
                fills += 1;
                debug!("Frame {} encoded into slot {}", fills, slot);
            }
            Err(e) => error!("Could not encode telemetry frame: {}", e),
        }
    }

    debug!("Telemetry filler exiting after {} frames", fills);
    encoder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::EncodedFrame;
    use std::time::Instant;

    struct Counter(u8);

    impl PayloadSource for Counter {
        fn gather(&mut self, payload: &mut [u8; DUV_DATA_LENGTH]) -> Result<()> {
            self.0 = self.0.wrapping_add(1);
            payload[0] = self.0;
            Ok(())
        }
    }

    struct Broken;

    impl PayloadSource for Broken {
        fn gather(&mut self, payload: &mut [u8; DUV_DATA_LENGTH]) -> Result<()> {
            payload[0] = 0xff;
            Err(TelemRadioError::Payload("sensor offline".to_string()))
        }
    }

    fn wait_for_generation(exchange: &FrameExchange, generation: u64) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if exchange.generation() >= generation {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_fills_on_request() {
        let exchange = Arc::new(FrameExchange::new());
        let filler = TelemetryFiller::spawn(exchange.clone(), FrameEncoder::new(), Counter(0)).unwrap();

        exchange.request_fill();
        assert!(wait_for_generation(&exchange, 1));
        exchange.request_fill();
        assert!(wait_for_generation(&exchange, 2));

        let encoder = filler.join().unwrap();
        let mut frame = EncodedFrame::default();
        assert!(exchange.try_read(exchange.ready_index(), &mut frame));

        let mut replay = FrameEncoder::new();
        let mut payload = [0u8; DUV_DATA_LENGTH];
        payload[0] = 1;
        replay.encode(&payload).unwrap();
        payload[0] = 2;
        assert_eq!(replay.encode(&payload).unwrap(), frame);
        assert_eq!(replay.disparity(), encoder.disparity());
    }

    #[test]
    fn test_failed_gather_sends_zeros() {
        let exchange = Arc::new(FrameExchange::new());
        let filler = TelemetryFiller::spawn(exchange.clone(), FrameEncoder::new(), Broken).unwrap();

        exchange.request_fill();
        assert!(wait_for_generation(&exchange, 1));
        filler.stop();

        let mut frame = EncodedFrame::default();
        assert!(exchange.try_read(exchange.ready_index(), &mut frame));
        let zeros = FrameEncoder::new().encode(&[0u8; DUV_DATA_LENGTH]).unwrap();
        assert_eq!(frame, zeros);
    }
}
