use crate::config::CaptureConfig;
use crate::exchange::{FrameExchange, FrameReader};
use crate::sensor::{
    BodyTracker, DeviceConfiguration, SensorBackend, SensorDevice, SensorError,
    TrackerConfiguration, TrackerFrame,
};
use log::*;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open sensor device {device_id}")]
    DeviceOpen {
        device_id: u32,
        #[source]
        source: SensorError,
    },
    #[error("Failed to start cameras on sensor device {device_id}")]
    StartCameras {
        device_id: u32,
        #[source]
        source: SensorError,
    },
    #[error("Failed to read calibration from sensor device {device_id}")]
    Calibration {
        device_id: u32,
        #[source]
        source: SensorError,
    },
    #[error("Failed to create body tracker for sensor device {device_id}")]
    TrackerCreate {
        device_id: u32,
        #[source]
        source: SensorError,
    },
    #[error("Capture failed on sensor device {device_id}")]
    Capture {
        device_id: u32,
        #[source]
        source: SensorError,
    },
    #[error("Failed to spawn capture worker")]
    Spawn(#[from] std::io::Error),
    #[error("Capture worker panicked")]
    WorkerPanicked,
    #[error("Capture worker exited without reporting startup")]
    WorkerExited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

struct SharedState(AtomicU8);

impl SharedState {
    fn new(state: CaptureState) -> Self {
        SharedState(AtomicU8::new(state as u8))
    }

    fn set(&self, state: CaptureState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> CaptureState {
        match self.0.load(Ordering::Acquire) {
            0 => CaptureState::Starting,
            1 => CaptureState::Running,
            2 => CaptureState::Stopping,
            _ => CaptureState::Stopped,
        }
    }
}

/// Cooperative stop signal, checked by the worker once per capture cycle.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Background body capture.
///
/// The worker owns the device and tracker for its whole life and is the only
/// writer of the frame exchange. Dropping the loop cancels and joins it.
pub struct CaptureLoop {
    cancel: CancellationToken,
    state: Arc<SharedState>,
    exchange: Arc<FrameExchange>,
    worker: Option<JoinHandle<Result<(), CaptureError>>>,
}

impl CaptureLoop {
    /// Opens the device and tracker on a new worker thread and waits until
    /// they are ready. Startup failures are returned here.
    pub fn start<B>(backend: B, config: &CaptureConfig) -> Result<Self, CaptureError>
    where
        B: SensorBackend + Send + 'static,
    {
        Self::start_with_cancellation(backend, config, CancellationToken::new())
    }

    pub fn start_with_cancellation<B>(
        backend: B,
        config: &CaptureConfig,
        cancel: CancellationToken,
    ) -> Result<Self, CaptureError>
    where
        B: SensorBackend + Send + 'static,
    {
        let exchange = FrameExchange::new(config.pool_capacity);
        let state = Arc::new(SharedState::new(CaptureState::Starting));
        let worker = CaptureWorker {
            backend,
            device_id: config.device_id,
            device_config: config.device_configuration(),
            tracker_config: config.tracker_configuration(),
            exchange: Arc::clone(&exchange),
            cancel: cancel.clone(),
            state: Arc::clone(&state),
        };

        let (startup_tx, startup_rx) = mpsc::sync_channel(1);
        let handle = thread::Builder::new()
            .name("body-capture".to_owned())
            .spawn(move || worker.run(startup_tx))?;

        match startup_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                cancel,
                state,
                exchange,
                worker: Some(handle),
            }),
            Ok(Err(error)) => {
                let _ = handle.join();
                Err(error)
            }
            Err(_) => match handle.join() {
                Ok(Err(error)) => Err(error),
                Ok(Ok(())) => Err(CaptureError::WorkerExited),
                Err(_) => Err(CaptureError::WorkerPanicked),
            },
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state.get()
    }

    pub fn reader(&self) -> FrameReader {
        self.exchange.reader()
    }

    pub fn exchange(&self) -> &Arc<FrameExchange> {
        &self.exchange
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signals cancellation and waits for the worker to release its handles.
    pub fn stop(mut self) -> Result<(), CaptureError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), CaptureError> {
        self.cancel.cancel();
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| CaptureError::WorkerPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            error!("Capture worker ended with error: {}", error);
        }
    }
}

/// Marks the loop stopped however the worker exits, panics included.
struct StoppedOnExit(Arc<SharedState>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        self.0.set(CaptureState::Stopped);
    }
}

struct CaptureWorker<B> {
    backend: B,
    device_id: u32,
    device_config: DeviceConfiguration,
    tracker_config: TrackerConfiguration,
    exchange: Arc<FrameExchange>,
    cancel: CancellationToken,
    state: Arc<SharedState>,
}

impl<B: SensorBackend> CaptureWorker<B> {
    fn run(mut self, startup: SyncSender<Result<(), CaptureError>>) -> Result<(), CaptureError> {
        let _stopped = StoppedOnExit(Arc::clone(&self.state));
        let (mut device, mut tracker) = match self.open() {
            Ok(handles) => handles,
            Err(error) => {
                error!("{}", error);
                let _ = startup.send(Err(error));
                return Ok(());
            }
        };
        self.state.set(CaptureState::Running);
        let _ = startup.send(Ok(()));

        let result = self.capture_frames(&mut device, &mut tracker);
        self.state.set(CaptureState::Stopping);
        if let Err(error) = &result {
            error!("{}", error);
        }
        drop(tracker);
        drop(device);
        info!("Released sensor device {}", self.device_id);
        result
    }

    fn open(&mut self) -> Result<(B::Device, B::Tracker), CaptureError> {
        let device_id = self.device_id;
        let mut device = self
            .backend
            .open(device_id)
            .map_err(|source| CaptureError::DeviceOpen { device_id, source })?;
        device
            .start_cameras(&self.device_config)
            .map_err(|source| CaptureError::StartCameras { device_id, source })?;
        info!(
            "Opened sensor device {} sn: {}",
            device_id,
            device.serial_number()
        );

        let calibration = device
            .calibration()
            .map_err(|source| CaptureError::Calibration { device_id, source })?;
        let tracker = self
            .backend
            .create_tracker(&calibration, &self.tracker_config)
            .map_err(|source| CaptureError::TrackerCreate { device_id, source })?;
        info!("Created body tracker for device {}", device_id);
        Ok((device, tracker))
    }

    fn capture_frames(
        &self,
        device: &mut B::Device,
        tracker: &mut B::Tracker,
    ) -> Result<(), CaptureError> {
        let device_id = self.device_id;
        let mut back = self.exchange.back_buffer();
        while !self.cancel.is_cancelled() {
            {
                let capture = device
                    .get_capture()
                    .map_err(|source| CaptureError::Capture { device_id, source })?;
                tracker
                    .enqueue_capture(&capture)
                    .map_err(|source| CaptureError::Capture { device_id, source })?;
            }

            let frame = match tracker.pop_result(Duration::from_secs(0)) {
                Some(frame) => frame,
                None => {
                    trace!("No tracking result ready");
                    continue;
                }
            };
            let count = frame.number_of_bodies();
            let stored = count.min(back.capacity());
            if stored < count {
                debug!(
                    "Dropping {} bodies beyond pool capacity {}",
                    count - stored,
                    back.capacity()
                );
            }
            for (index, body) in back.pool_mut().iter_mut().take(stored).enumerate() {
                frame.copy_body(index, body);
            }
            back.set_body_count(stored);
            drop(frame);
            if !self.exchange.publish(&mut back) {
                trace!("Reader busy, holding frame for the next cycle");
            }
        }
        info!("Stopping capture on device {}", device_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::TrackedBody;
    use crate::simulated::{SimulatedSensor, SimulatedStats};
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    fn config(pool_capacity: usize) -> CaptureConfig {
        CaptureConfig {
            pool_capacity,
            ..CaptureConfig::default()
        }
    }

    fn bodies(count: usize, cycle: u64) -> Vec<TrackedBody> {
        (0..count)
            .map(|index| TrackedBody {
                id: (cycle * 100) as u32 + index as u32,
                ..TrackedBody::default()
            })
            .collect()
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn assert_released(stats: &SimulatedStats) {
        assert_eq!(stats.open_devices.load(Ordering::SeqCst), 0);
        assert_eq!(stats.open_trackers.load(Ordering::SeqCst), 0);
        assert_eq!(stats.live_captures.load(Ordering::SeqCst), 0);
        assert_eq!(stats.live_frames.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn device_open_failure_is_reported() {
        let sensor = SimulatedSensor::new(|_| Vec::new()).failing_open();
        let stats = sensor.stats();
        let error = CaptureLoop::start(sensor, &config(4)).err().unwrap();
        assert!(matches!(error, CaptureError::DeviceOpen { device_id: 0, .. }));
        assert_released(&stats);
    }

    #[test]
    fn tracker_failure_releases_device() {
        let sensor = SimulatedSensor::new(|_| Vec::new()).failing_tracker();
        let stats = sensor.stats();
        let error = CaptureLoop::start(sensor, &config(4)).err().unwrap();
        assert!(matches!(error, CaptureError::TrackerCreate { .. }));
        assert!(error.to_string().contains("body tracker"));
        assert_eq!(stats.devices_opened.load(Ordering::SeqCst), 1);
        assert_released(&stats);
    }

    #[test]
    fn published_frames_are_complete_and_bounded() {
        let capacity = 3;
        let sensor = SimulatedSensor::new(|cycle| bodies((cycle % 5) as usize + 1, cycle));
        let stats = sensor.stats();
        let capture = CaptureLoop::start(sensor, &config(capacity)).unwrap();
        assert_eq!(capture.state(), CaptureState::Running);

        let mut reader = capture.reader();
        let mut checked = 0;
        wait_until(|| {
            if reader.refresh() {
                let frame = reader.latest().unwrap();
                let cycle = u64::from(frame.bodies()[0].id / 100);
                let expected = ((cycle % 5) as usize + 1).min(capacity);
                assert!(frame.body_count() <= capacity);
                assert_eq!(frame.body_count(), expected);
                for (index, body) in frame.bodies().iter().enumerate() {
                    assert_eq!(body.id, (cycle * 100) as u32 + index as u32);
                }
                checked += 1;
            }
            checked >= 50
        });

        capture.stop().unwrap();
        assert_released(&stats);
    }

    #[test]
    fn tracker_latency_causes_misses_not_errors() {
        let sensor = SimulatedSensor::new(|cycle| bodies(1, cycle)).with_latency(3);
        let stats = sensor.stats();
        let capture = CaptureLoop::start(sensor, &config(2)).unwrap();
        let mut reader = capture.reader();
        wait_until(|| reader.refresh());

        let frame = reader.latest().unwrap();
        assert_eq!(frame.body_count(), 1);
        assert!(stats.misses.load(Ordering::SeqCst) >= 3);
        assert_eq!(capture.state(), CaptureState::Running);
        capture.stop().unwrap();
        assert_released(&stats);
    }

    #[test]
    fn cancellation_mid_cycle_finishes_the_frame() {
        let cancel = CancellationToken::new();
        let hook_cancel = cancel.clone();
        let sensor = SimulatedSensor::new(|cycle| bodies(2, cycle)).on_enqueue(move |cycle| {
            if cycle == 3 {
                hook_cancel.cancel();
            }
        });
        let stats = sensor.stats();
        let capture =
            CaptureLoop::start_with_cancellation(sensor, &config(4), cancel).unwrap();
        wait_until(|| capture.state() == CaptureState::Stopped);

        assert_eq!(capture.exchange().generation(), 4);
        let mut reader = capture.reader();
        assert!(reader.refresh());
        let frame = reader.latest().unwrap();
        assert_eq!(frame.body_count(), 2);
        assert_eq!(frame.bodies()[1].id, 301);
        assert_eq!(stats.captures_taken.load(Ordering::SeqCst), 4);
        assert_released(&stats);
        capture.stop().unwrap();
    }

    #[test]
    fn capture_failure_stops_the_loop() {
        let sensor = SimulatedSensor::new(|cycle| bodies(1, cycle)).failing_capture_after(5);
        let stats = sensor.stats();
        let capture = CaptureLoop::start(sensor, &config(2)).unwrap();
        wait_until(|| capture.state() == CaptureState::Stopped);

        let error = capture.stop().err().unwrap();
        assert!(matches!(error, CaptureError::Capture { device_id: 0, .. }));
        assert_eq!(stats.captures_taken.load(Ordering::SeqCst), 5);
        assert_released(&stats);
    }

    #[test]
    fn dropping_the_loop_releases_handles() {
        let sensor = SimulatedSensor::new(|cycle| bodies(1, cycle))
            .with_frame_interval(Duration::from_millis(2));
        let stats = sensor.stats();
        let capture = CaptureLoop::start(sensor, &config(2)).unwrap();
        let token = capture.cancellation_token();
        wait_until(|| stats.captures_taken.load(Ordering::SeqCst) > 2);

        drop(capture);
        assert!(token.is_cancelled());
        assert_released(&stats);
    }
}
