//! The controller owns the light state and decides when to send it.
//!
//! Edits arrive as `ControlMessage`s from any number of `ControllerHandle`s.
//! Color and intensity edits arm the debouncer; the state is sent once
//! things have been quiet for the debounce window. Manual sends go out
//! right away and leave any armed timer alone.

use std::fmt;
use std::future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::client::Dispatch;
use crate::model::{LightState, Settings, SettingsUpdate, Snapshot, StateError, ValidationError};
use crate::protocol::{self, Rgb};

pub mod debounce;
pub use debounce::{Debouncer, SendReason, DEFAULT_WINDOW};

/// Messages understood by the controller loop.
#[derive(Debug)]
pub enum ControlMessage {
    SetColor {
        index: usize,
        rgb: Rgb,
    },
    SetIntensity {
        index: usize,
        intensity: i64,
    },
    UpdateSettings {
        update: SettingsUpdate,
        reply: oneshot::Sender<Result<(), ValidationError>>,
    },
    SendNow,
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
    Shutdown,
}

/// Latest outcome, for showing to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ready,
    SettingsUpdated { lights: usize },
    SettingsRejected(ValidationError),
    Sent {
        reason: SendReason,
        lights: usize,
        server: String,
    },
    SendFailed(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ready => write!(f, "Ready"),
            Status::SettingsUpdated { lights } => write!(f, "Settings updated ({} lights)", lights),
            Status::SettingsRejected(err) => write!(f, "Invalid settings: {}", err),
            Status::Sent {
                reason,
                lights,
                server,
            } => write!(f, "{}: sent {} lights to {}", reason, lights, server),
            Status::SendFailed(err) => write!(f, "Send failed: {}", err),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("controller is not running")]
    Closed,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Front-end side of the controller.
#[derive(Clone)]
pub struct ControllerHandle {
    sender: mpsc::UnboundedSender<ControlMessage>,
    status: watch::Receiver<Status>,
}

impl ControllerHandle {
    fn post(&self, msg: ControlMessage) -> Result<(), ControlError> {
        self.sender.send(msg).map_err(|_| ControlError::Closed)
    }

    pub fn set_light_color(&self, index: usize, rgb: Rgb) -> Result<(), ControlError> {
        self.post(ControlMessage::SetColor { index, rgb })
    }

    /// Intensities outside 0..=255 are clamped.
    pub fn set_light_intensity(&self, index: usize, intensity: i64) -> Result<(), ControlError> {
        self.post(ControlMessage::SetIntensity { index, intensity })
    }

    pub fn send_now(&self) -> Result<(), ControlError> {
        self.post(ControlMessage::SendNow)
    }

    pub fn shutdown(&self) -> Result<(), ControlError> {
        self.post(ControlMessage::Shutdown)
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<(), ControlError> {
        let (reply, response) = oneshot::channel();
        self.post(ControlMessage::UpdateSettings { update, reply })?;
        response.await.map_err(|_| ControlError::Closed)??;
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<Snapshot, ControlError> {
        let (reply, response) = oneshot::channel();
        self.post(ControlMessage::Snapshot { reply })?;
        response.await.map_err(|_| ControlError::Closed)
    }

    /// Watch the status line.
    pub fn status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }
}

/// The controller loop and everything it owns.
pub struct Controller<D> {
    state: LightState,
    dispatcher: D,
    debouncer: Debouncer,
    receiver: mpsc::UnboundedReceiver<ControlMessage>,
    status: watch::Sender<Status>,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

impl<D: Dispatch> Controller<D> {
    pub fn new(
        state: LightState,
        dispatcher: D,
        window: Duration,
    ) -> (Controller<D>, ControllerHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (status, status_receiver) = watch::channel(Status::Ready);
        let controller = Controller {
            state,
            dispatcher,
            debouncer: Debouncer::new(window),
            receiver,
            status,
        };
        let handle = ControllerHandle {
            sender,
            status: status_receiver,
        };
        (controller, handle)
    }

    /// Run until shut down or every handle is gone. Returns the final state.
    pub async fn run(mut self) -> LightState {
        info!(
            "[controller] started, {} lights, debounce {:?}",
            self.state.lights().len(),
            self.debouncer.window()
        );

        loop {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                biased;
                msg = self.receiver.recv() => match msg {
                    Some(ControlMessage::Shutdown) | None => break,
                    Some(msg) => self.handle(msg),
                },
                _ = wait_until(deadline) => {
                    if let Some(reason) = self.debouncer.fire(Instant::now()) {
                        self.send(reason);
                    }
                }
            }
        }

        if self.debouncer.is_pending() {
            debug!("[controller] dropping pending send");
        }
        info!("[controller] stopped");
        self.state
    }

    fn handle(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::SetColor { index, rgb } => {
                let result = self.state.set_light_color(index, rgb);
                self.edited(SendReason::ColorUpdated, result);
            }
            ControlMessage::SetIntensity { index, intensity } => {
                let result = self
                    .state
                    .set_light_intensity(index, protocol::clamp_byte(intensity));
                self.edited(SendReason::IntensityChanged, result);
            }
            ControlMessage::UpdateSettings { update, reply } => {
                let result = self.update_settings(&update);
                reply.send(result).ok();
            }
            ControlMessage::SendNow => self.send(SendReason::Manual),
            ControlMessage::Snapshot { reply } => {
                reply.send(self.state.snapshot()).ok();
            }
            ControlMessage::Shutdown => {}
        }
    }

    fn edited(&mut self, reason: SendReason, result: Result<(), StateError>) {
        match result {
            Ok(()) => {
                if self.debouncer.is_pending() {
                    debug!("[controller] re-arming send timer");
                }
                self.debouncer.notify(Instant::now(), reason);
            }
            Err(err) => error!("[controller] {}: {}", reason, err),
        }
    }

    fn update_settings(&mut self, update: &SettingsUpdate) -> Result<(), ValidationError> {
        match self.state.update_settings(update) {
            Ok(()) => {
                let Settings {
                    server_ip,
                    server_port,
                    tag,
                    num_lights,
                } = self.state.settings();
                info!(
                    "[controller] settings updated: {}:{} tag {:?}, {} lights",
                    server_ip, server_port, tag, num_lights
                );
                self.status
                    .send_replace(Status::SettingsUpdated { lights: *num_lights });
                Ok(())
            }
            Err(err) => {
                warn!("[controller] rejected settings: {}", err);
                self.status
                    .send_replace(Status::SettingsRejected(err.clone()));
                Err(err)
            }
        }
    }

    fn send(&mut self, reason: SendReason) {
        let snapshot = self.state.snapshot();
        let server = format!(
            "{}:{}",
            snapshot.settings.server_ip, snapshot.settings.server_port
        );

        let status = match self.dispatcher.send_state(&snapshot) {
            Ok(_) => {
                info!(
                    "[controller] {}: sent {} lights to {}",
                    reason,
                    snapshot.lights.len(),
                    server
                );
                Status::Sent {
                    reason,
                    lights: snapshot.lights.len(),
                    server,
                }
            }
            Err(err) => {
                warn!("[controller] {}: send failed: {}", reason, err);
                Status::SendFailed(err.to_string())
            }
        };
        self.status.send_replace(status);
    }
}

/// Start a controller on the current tokio runtime.
pub fn spawn<D>(
    state: LightState,
    dispatcher: D,
    window: Duration,
) -> (ControllerHandle, JoinHandle<LightState>)
where
    D: Dispatch + Send + 'static,
{
    let (controller, handle) = Controller::new(state, dispatcher, window);
    (handle, tokio::spawn(controller.run()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SendError;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::sleep;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[derive(Clone, Default)]
    struct Recorder {
        sends: Arc<Mutex<Vec<(Instant, Snapshot)>>>,
        fail: Arc<AtomicBool>,
    }

    impl Recorder {
        fn sends(&self) -> Vec<(Instant, Snapshot)> {
            self.sends.lock().unwrap().clone()
        }
    }

    impl Dispatch for Recorder {
        fn send_state(&mut self, snapshot: &Snapshot) -> Result<usize, SendError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SendError::Transport {
                    addr: "lights:9909".to_string(),
                    source: io::Error::new(io::ErrorKind::Other, "network unreachable"),
                });
            }
            self.sends
                .lock()
                .unwrap()
                .push((Instant::now(), snapshot.clone()));
            Ok(snapshot.lights.len())
        }
    }

    fn start() -> (Recorder, ControllerHandle, JoinHandle<LightState>) {
        let recorder = Recorder::default();
        let (handle, task) = spawn(LightState::default(), recorder.clone(), ms(80));
        (recorder, handle, task)
    }

    fn update(num_lights: i64) -> SettingsUpdate {
        SettingsUpdate {
            server_ip: "10.0.0.7".to_string(),
            server_port: 9910,
            tag: "ui".to_string(),
            num_lights,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_sent_once_after_quiet_period() {
        let (recorder, handle, task) = start();
        let started = Instant::now();

        handle.set_light_intensity(0, 10).unwrap();
        sleep(ms(30)).await;
        handle.set_light_intensity(0, 20).unwrap();
        sleep(ms(20)).await;
        handle.set_light_intensity(0, 30).unwrap();

        sleep(ms(79)).await;
        assert!(recorder.sends().is_empty());

        sleep(ms(200)).await;
        let sends = recorder.sends();
        assert_eq!(sends.len(), 1);
        let elapsed = sends[0].0 - started;
        assert!(elapsed >= ms(130) && elapsed < ms(131), "{:?}", elapsed);
        assert_eq!(sends[0].1.lights[0].intensity, 30);

        handle.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_send_leaves_timer_armed() {
        let (recorder, handle, task) = start();
        let started = Instant::now();

        handle.set_light_color(2, [1, 2, 3]).unwrap();
        sleep(ms(20)).await;
        handle.send_now().unwrap();
        handle.snapshot().await.unwrap();

        let sends = recorder.sends();
        assert_eq!(sends.len(), 1);
        let elapsed = sends[0].0 - started;
        assert!(elapsed >= ms(20) && elapsed < ms(21), "{:?}", elapsed);
        assert_eq!(sends[0].1.lights[2].base_rgb, [1, 2, 3]);
        assert_eq!(
            *handle.status().borrow(),
            Status::Sent {
                reason: SendReason::Manual,
                lights: 24,
                server: "127.0.0.1:9909".to_string(),
            }
        );

        sleep(ms(200)).await;
        let sends = recorder.sends();
        assert_eq!(sends.len(), 2);
        let elapsed = sends[1].0 - started;
        assert!(elapsed >= ms(80) && elapsed < ms(81), "{:?}", elapsed);
        assert_eq!(
            handle.status().borrow().to_string(),
            "Color updated: sent 24 lights to 127.0.0.1:9909"
        );

        handle.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_is_reported_and_later_sends_work() {
        let (recorder, handle, task) = start();

        recorder.fail.store(true, Ordering::SeqCst);
        handle.send_now().unwrap();
        handle.snapshot().await.unwrap();
        assert_eq!(
            handle.status().borrow().to_string(),
            "Send failed: lights:9909: network unreachable"
        );

        recorder.fail.store(false, Ordering::SeqCst);
        handle.set_light_intensity(1, 300).unwrap();
        sleep(ms(100)).await;
        let sends = recorder.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].1.lights[1].intensity, 255);

        handle.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_settings_are_rejected() {
        let (recorder, handle, task) = start();
        handle.set_light_intensity(5, 7).unwrap();

        let err = handle.update_settings(update(100)).await.unwrap_err();
        assert_eq!(
            err,
            ControlError::Validation(ValidationError::LightCountOutOfRange(100))
        );
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.lights.len(), 24);
        assert_eq!(snapshot.settings.server_ip, "127.0.0.1");
        assert_eq!(snapshot.lights[5].intensity, 7);
        assert!(matches!(
            *handle.status().borrow(),
            Status::SettingsRejected(ValidationError::LightCountOutOfRange(100))
        ));

        sleep(ms(100)).await;
        assert_eq!(recorder.sends().len(), 1);
        handle.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_update_resizes_without_sending() {
        let (recorder, handle, task) = start();

        handle.update_settings(update(2)).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.lights.len(), 2);
        assert_eq!(snapshot.settings.server_port, 9910);
        assert_eq!(
            handle.status().borrow().to_string(),
            "Settings updated (2 lights)"
        );

        sleep(ms(200)).await;
        assert!(recorder.sends().is_empty());
        handle.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_light_is_ignored() {
        let (recorder, handle, task) = start();

        handle.set_light_color(24, [0, 0, 0]).unwrap();
        sleep(ms(200)).await;
        assert!(recorder.sends().is_empty());

        handle.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_returns_state_and_drops_pending_send() {
        let (recorder, handle, task) = start();

        handle.set_light_color(0, [9, 8, 7]).unwrap();
        handle.shutdown().unwrap();
        let state = task.await.unwrap();
        assert_eq!(state.lights().get(0).unwrap().base_rgb, [9, 8, 7]);

        sleep(ms(200)).await;
        assert!(recorder.sends().is_empty());
        assert_eq!(handle.send_now(), Err(ControlError::Closed));
    }

    #[tokio::test]
    async fn test_stops_when_handles_are_dropped() {
        let (_recorder, handle, task) = start();
        drop(handle);
        assert_eq!(task.await.unwrap().lights().len(), 24);
    }
}
