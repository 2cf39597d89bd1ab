//! In-memory collaborators for tests.

use super::contracts::{
    ActivitySupervisor, CellularRadio, IntentBroadcaster, MountManager, PollTarget,
    ShortRangeRadio,
};
use crate::error::{PowerdownError, Result};
use crate::platform::{PowerControl, Vibrator};
use crate::sequencer::{CompletionHandle, ShutdownRequest, SubsystemStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Acknowledges after a delay, never, or rejects the broadcast outright
pub struct MockBroadcaster {
    ack_after: Option<Duration>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockBroadcaster {
    pub fn acking_after(delay: Duration) -> Self {
        Self {
            ack_after: Some(delay),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn silent() -> Self {
        Self {
            ack_after: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            ack_after: None,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentBroadcaster for MockBroadcaster {
    async fn broadcast_shutdown(
        &self,
        _request: &ShutdownRequest,
        on_done: CompletionHandle,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PowerdownError::transport("broadcaster", "dead object"));
        }
        if let Some(delay) = self.ack_after {
            tokio::spawn(async move {
                sleep(delay).await;
                on_done.done(0);
            });
        }
        Ok(())
    }
}

/// Supervisor whose shutdown RPC takes `delay` and optionally fails
pub struct MockSupervisor {
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
}

impl MockSupervisor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            delay: Duration::ZERO,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivitySupervisor for MockSupervisor {
    async fn shutdown(&self, _timeout: Duration) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        sleep(self.delay).await;
        if self.fail {
            return Err(PowerdownError::transport("supervisor", "dead object"));
        }
        Ok(())
    }
}

/// Multi-instance cellular radio. Instances flagged as stuck ignore off
/// requests; a hung radio never answers at all.
pub struct MockCellularRadio {
    on: Mutex<Vec<bool>>,
    stuck: Vec<bool>,
    hung: bool,
    off_requests: Mutex<Vec<usize>>,
}

impl MockCellularRadio {
    pub fn new(on: Vec<bool>) -> Self {
        let stuck = vec![false; on.len()];
        Self {
            on: Mutex::new(on),
            stuck,
            hung: false,
            off_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_stuck(on: Vec<bool>, stuck: Vec<bool>) -> Self {
        Self {
            on: Mutex::new(on),
            stuck,
            hung: false,
            off_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn hung() -> Self {
        Self {
            on: Mutex::new(vec![true]),
            stuck: vec![true],
            hung: true,
            off_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn off_requests(&self) -> Vec<usize> {
        self.off_requests.lock().clone()
    }
}

#[async_trait]
impl CellularRadio for MockCellularRadio {
    async fn instance_count(&self) -> Result<usize> {
        if self.hung {
            std::future::pending::<()>().await;
        }
        Ok(self.on.lock().len())
    }

    async fn is_radio_on(&self, instance: usize) -> Result<bool> {
        self.on
            .lock()
            .get(instance)
            .copied()
            .ok_or_else(|| PowerdownError::unreachable(format!("radio instance {}", instance)))
    }

    async fn set_radio_off(&self, instance: usize) -> Result<()> {
        self.off_requests.lock().push(instance);
        if !self.stuck.get(instance).copied().unwrap_or(false) {
            if let Some(on) = self.on.lock().get_mut(instance) {
                *on = false;
            }
        }
        Ok(())
    }
}

/// Short-range radio that turns off right away unless told to hang
pub struct MockShortRangeRadio {
    state: Mutex<SubsystemStatus>,
    honour_disable: bool,
    disable_calls: AtomicUsize,
}

impl MockShortRangeRadio {
    pub fn new(state: SubsystemStatus) -> Self {
        Self {
            state: Mutex::new(state),
            honour_disable: true,
            disable_calls: AtomicUsize::new(0),
        }
    }

    pub fn stuck_on() -> Self {
        Self {
            state: Mutex::new(SubsystemStatus::On),
            honour_disable: false,
            disable_calls: AtomicUsize::new(0),
        }
    }

    pub fn disable_calls(&self) -> usize {
        self.disable_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShortRangeRadio for MockShortRangeRadio {
    async fn state(&self) -> Result<SubsystemStatus> {
        Ok(*self.state.lock())
    }

    async fn disable(&self) -> Result<()> {
        self.disable_calls.fetch_add(1, Ordering::SeqCst);
        if self.honour_disable {
            *self.state.lock() = SubsystemStatus::Off;
        }
        Ok(())
    }
}

/// Mount manager acknowledging after a delay, never, or failing the call
pub struct MockMountManager {
    ack_after: Option<Duration>,
    status: i32,
    fail: bool,
    calls: AtomicUsize,
}

impl MockMountManager {
    pub fn acking_after(delay: Duration, status: i32) -> Self {
        Self {
            ack_after: Some(delay),
            status,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn silent() -> Self {
        Self {
            ack_after: None,
            status: 0,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            ack_after: None,
            status: 0,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MountManager for MockMountManager {
    async fn shutdown(&self, on_done: CompletionHandle) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PowerdownError::transport("mount manager", "service died"));
        }
        if let Some(delay) = self.ack_after {
            let status = self.status;
            tokio::spawn(async move {
                sleep(delay).await;
                on_done.done(status);
            });
        }
        Ok(())
    }
}

/// Poll target reporting on for a number of samples, then off
pub struct MockPollTarget {
    name: String,
    on_for: Option<u32>,
    fail: bool,
    samples: AtomicU32,
}

impl MockPollTarget {
    /// Reports on for the first `samples` samples
    pub fn on_for(name: &str, samples: u32) -> Self {
        Self {
            name: name.to_string(),
            on_for: Some(samples),
            fail: false,
            samples: AtomicU32::new(0),
        }
    }

    pub fn always_on(name: &str) -> Self {
        Self {
            name: name.to_string(),
            on_for: None,
            fail: false,
            samples: AtomicU32::new(0),
        }
    }

    pub fn unreachable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            on_for: None,
            fail: true,
            samples: AtomicU32::new(0),
        }
    }

    pub fn samples(&self) -> u32 {
        self.samples.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PollTarget for MockPollTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_off(&self) -> Result<bool> {
        let sample = self.samples.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PowerdownError::unreachable(self.name.clone()));
        }
        Ok(match self.on_for {
            Some(on_for) => sample >= on_for,
            None => false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerCall {
    Reboot(Option<String>),
    PowerOff,
}

/// Records power calls and when they happened
pub struct RecordingPowerControl {
    fail_reboot: bool,
    calls: Mutex<Vec<(PowerCall, Instant)>>,
}

impl RecordingPowerControl {
    pub fn new() -> Self {
        Self {
            fail_reboot: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_reboot() -> Self {
        Self {
            fail_reboot: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<PowerCall> {
        self.calls.lock().iter().map(|(call, _)| call.clone()).collect()
    }

    pub fn power_off_at(&self) -> Option<Instant> {
        self.calls
            .lock()
            .iter()
            .find(|(call, _)| *call == PowerCall::PowerOff)
            .map(|(_, at)| *at)
    }
}

impl Default for RecordingPowerControl {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerControl for RecordingPowerControl {
    fn reboot(&self, reason: Option<&str>) -> Result<()> {
        self.calls
            .lock()
            .push((PowerCall::Reboot(reason.map(str::to_string)), Instant::now()));
        if self.fail_reboot {
            return Err(PowerdownError::fatal("reboot refused"));
        }
        Ok(())
    }

    fn power_off(&self) -> Result<()> {
        self.calls.lock().push((PowerCall::PowerOff, Instant::now()));
        Ok(())
    }
}

pub struct MockVibrator {
    fail: bool,
    calls: AtomicUsize,
}

impl MockVibrator {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockVibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Vibrator for MockVibrator {
    fn vibrate(&self, _duration: Duration) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PowerdownError::transport("vibrator", "no such device"));
        }
        Ok(())
    }
}
