use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::bridge::DeviceBridge;
use crate::app::models::DeviceInfo;

/// A device is either reachable or it is not. Transport errors, `offline`,
/// `unauthorized` and plain absence all collapse into `Disconnected`;
/// consumers that care about the distinction inspect the device list
/// themselves.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected(DeviceInfo),
    Disconnected,
}

/// Polls the bridge for one device and emits edge events only: one
/// `Connected` when the device appears usable, one `Disconnected` when it
/// stops being so. Steady state produces no events, and a device that is
/// already absent on the first poll stays silent until it shows up; only
/// transitions are reported.
pub struct DeviceConnectionMonitor {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl DeviceConnectionMonitor {
    pub fn start(
        bridge: Arc<dyn DeviceBridge>,
        serial: String,
        poll_interval: Duration,
        on_event: impl Fn(ConnectionEvent) + Send + 'static,
        trace_id: &str,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let trace_id = trace_id.to_string();

        let worker = thread::spawn(move || {
            info!(trace_id = %trace_id, serial = %serial, "connection monitor started");
            let mut last_connected: Option<bool> = None;
            while !stop_flag.load(Ordering::SeqCst) {
                poll_once(bridge.as_ref(), &serial, &mut last_connected, &on_event, &trace_id);
                // Sleep in short slices so stop() does not wait out the
                // full poll interval.
                let mut remaining = poll_interval;
                while remaining > Duration::ZERO && !stop_flag.load(Ordering::SeqCst) {
                    let slice = remaining.min(Duration::from_millis(100));
                    thread::sleep(slice);
                    remaining = remaining.saturating_sub(slice);
                }
            }
            info!(trace_id = %trace_id, serial = %serial, "connection monitor stopped");
        });

        Self {
            stop,
            worker: Some(worker),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for DeviceConnectionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_once(
    bridge: &dyn DeviceBridge,
    serial: &str,
    last_connected: &mut Option<bool>,
    on_event: &impl Fn(ConnectionEvent),
    trace_id: &str,
) {
    let device = match bridge.list_devices(trace_id) {
        Ok(devices) => devices
            .into_iter()
            .find(|device| device.serial == serial && device.is_usable()),
        Err(err) => {
            // A failed poll is indistinguishable from an absent device.
            warn!(trace_id = %trace_id, serial = %serial, error = %err, "device poll failed");
            None
        }
    };

    let connected = device.is_some();
    if *last_connected == Some(connected) {
        return;
    }
    let first_observation = last_connected.is_none();
    *last_connected = Some(connected);
    // Starting out absent is not a transition; nothing was disconnected.
    if first_observation && !connected {
        return;
    }
    match device {
        Some(info) => {
            debug!(trace_id = %trace_id, serial = %serial, "device connected");
            on_event(ConnectionEvent::Connected(info));
        }
        None => {
            debug!(trace_id = %trace_id, serial = %serial, "device disconnected");
            on_event(ConnectionEvent::Disconnected);
        }
    }
}
