use super::*;
use crate::adapters::mock::{
    MockBroadcaster, MockCellularRadio, MockMountManager, MockPollTarget, MockShortRangeRadio,
    MockSupervisor, MockVibrator, PowerCall, RecordingPowerControl,
};
use crate::adapters::{Collaborators, IntentBroadcaster, PollTarget};
use crate::events::{drain, SequenceEvent};
use crate::platform::{
    MemoryPropertyStore, PropertyStore, RADIO_SHUTDOWN_PROPERTY, SHUTDOWN_ACTION_PROPERTY,
    SHUTDOWN_RUNNING_PROPERTY,
};
use crate::recovery::{MarkerAction, ShutdownMarker};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct Harness {
    sequencer: Arc<ShutdownSequencer>,
    power: Arc<RecordingPowerControl>,
    vibrator: Arc<MockVibrator>,
    store: Arc<MemoryPropertyStore>,
}

fn harness(collaborators: Collaborators) -> Harness {
    let power = Arc::new(RecordingPowerControl::new());
    let vibrator = Arc::new(MockVibrator::new());
    let store = Arc::new(MemoryPropertyStore::new());
    let terminal = TerminalAction::new(power.clone())
        .with_vibrator(vibrator.clone(), Duration::from_millis(500));

    let sequencer = ShutdownSequencer::builder()
        .collaborators(collaborators)
        .terminal(terminal)
        .properties(store.clone())
        .build()
        .unwrap();

    Harness {
        sequencer: Arc::new(sequencer),
        power,
        vibrator,
        store,
    }
}

/// Every service present and well behaved
fn healthy_collaborators() -> Collaborators {
    let sync_indicator: Arc<dyn PollTarget> = Arc::new(MockPollTarget::on_for("modem sync", 2));
    Collaborators {
        broadcaster: Some(Arc::new(MockBroadcaster::acking_after(Duration::from_millis(100)))),
        supervisor: Some(Arc::new(MockSupervisor::new(Duration::from_millis(50)))),
        cellular: Some(Arc::new(MockCellularRadio::new(vec![true]))),
        short_range: Some(Arc::new(MockShortRangeRadio::new(SubsystemStatus::On))),
        mount: Some(Arc::new(MockMountManager::acking_after(
            Duration::from_millis(200),
            0,
        ))),
        sync_indicators: vec![sync_indicator],
    }
}

fn elapsed_between(start: Instant, end: Instant) -> Duration {
    end.duration_since(start)
}

#[tokio::test(start_paused = true)]
async fn test_full_sequence_visits_every_stage_in_order() {
    let h = harness(healthy_collaborators());
    let mut events = h.sequencer.event_bus().subscribe();
    let started = Instant::now();

    let report = h.sequencer.shutdown().unwrap().await.unwrap();

    let entered: Vec<Stage> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SequenceEvent::StageEntered { stage, .. } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(entered, Stage::SEQUENCE.to_vec());

    assert!(report.timed_out().is_empty());
    assert_eq!(report.phases.len(), 6);
    assert_eq!(h.power.calls(), vec![PowerCall::PowerOff]);
    assert_eq!(h.vibrator.call_count(), 1);
    assert_eq!(h.sequencer.current_stage(), Stage::TerminalAction);
    assert_eq!(h.sequencer.state(), SequenceState::Completed);

    // 100ms broadcast + 50ms supervisor + 1s sync poll + 200ms storage + 500ms vibration
    let total = elapsed_between(started, h.power.power_off_at().unwrap());
    assert!(total >= Duration::from_millis(1850), "took {:?}", total);
    assert!(total < Duration::from_millis(1950), "took {:?}", total);
}

#[tokio::test(start_paused = true)]
async fn test_only_one_sequence_runs() {
    let h = harness(healthy_collaborators());

    let mut handles = Vec::new();
    for i in 0..10 {
        let request = if i % 2 == 0 {
            ShutdownRequest::shutdown()
        } else {
            ShutdownRequest::reboot(Some("update"))
        };
        if let Some(handle) = h.sequencer.begin_shutdown(request) {
            handles.push(handle);
        }
    }
    assert_eq!(handles.len(), 1);

    let report = handles.pop().unwrap().await.unwrap();
    assert!(!report.request.is_reboot);
    assert_eq!(h.power.calls(), vec![PowerCall::PowerOff]);

    // Still rejected once the sequence has finished
    assert!(h.sequencer.reboot(Some("late".to_string())).is_none());
    assert_eq!(h.power.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_from_many_tasks() {
    let h = harness(healthy_collaborators());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let sequencer = Arc::clone(&h.sequencer);
        tasks.push(tokio::spawn(async move { sequencer.shutdown() }));
    }

    let mut winners = Vec::new();
    for task in tasks {
        if let Some(handle) = task.await.unwrap() {
            winners.push(handle);
        }
    }
    assert_eq!(winners.len(), 1);

    for handle in winners {
        handle.await.unwrap();
    }
    assert_eq!(h.power.calls(), vec![PowerCall::PowerOff]);
}

#[tokio::test(start_paused = true)]
async fn test_silent_broadcaster_times_out_after_deadline() {
    let h = harness(Collaborators {
        broadcaster: Some(Arc::new(MockBroadcaster::silent())),
        ..Default::default()
    });

    let report = h
        .sequencer
        .reboot(Some("recovery".to_string()))
        .unwrap()
        .await
        .unwrap();

    assert_eq!(report.timed_out(), vec![Stage::BroadcastingIntent]);
    // Absent services are satisfied at once; reboot skips the vibration
    assert_eq!(
        h.power.calls(),
        vec![
            PowerCall::Reboot(Some("recovery".to_string())),
            PowerCall::PowerOff
        ]
    );
    assert_eq!(h.vibrator.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reboot_waits_full_storage_budget_for_silent_mount_manager() {
    let mut collaborators = healthy_collaborators();
    collaborators.mount = Some(Arc::new(MockMountManager::silent()));
    let h = harness(collaborators);
    let mut receiver = h.sequencer.event_bus().subscribe();

    let report = h
        .sequencer
        .reboot(Some("recovery".to_string()))
        .unwrap()
        .await
        .unwrap();

    assert_eq!(report.timed_out(), vec![Stage::ShuttingDownStorage]);
    assert_eq!(
        h.power.calls(),
        vec![
            PowerCall::Reboot(Some("recovery".to_string())),
            PowerCall::PowerOff
        ]
    );

    let storage_elapsed = drain(&mut receiver).into_iter().find_map(|event| match event {
        SequenceEvent::PhaseFinished {
            stage: Stage::ShuttingDownStorage,
            elapsed,
            ..
        } => Some(elapsed),
        _ => None,
    });
    let storage_elapsed = storage_elapsed.unwrap();
    assert!(storage_elapsed >= Duration::from_secs(20));
    assert!(storage_elapsed < Duration::from_millis(20_050));
}

#[tokio::test(start_paused = true)]
async fn test_slow_supervisor_is_bounded() {
    let mut collaborators = healthy_collaborators();
    let supervisor = Arc::new(MockSupervisor::new(Duration::from_secs(30)));
    collaborators.supervisor = Some(supervisor.clone());
    let h = harness(collaborators);

    let report = h.sequencer.shutdown().unwrap().await.unwrap();

    assert_eq!(report.timed_out(), vec![Stage::StoppingSupervisor]);
    assert_eq!(supervisor.call_count(), 1);
    assert_eq!(h.power.calls(), vec![PowerCall::PowerOff]);
}

#[tokio::test(start_paused = true)]
async fn test_failing_supervisor_does_not_stop_sequence() {
    let mut collaborators = healthy_collaborators();
    collaborators.supervisor = Some(Arc::new(MockSupervisor::failing()));
    let h = harness(collaborators);

    let report = h.sequencer.shutdown().unwrap().await.unwrap();

    assert!(report.timed_out().is_empty());
    assert_eq!(h.power.calls(), vec![PowerCall::PowerOff]);
}

#[tokio::test(start_paused = true)]
async fn test_only_active_cellular_instances_are_turned_off() {
    let mut collaborators = healthy_collaborators();
    let cellular = Arc::new(MockCellularRadio::new(vec![true, false, true]));
    collaborators.cellular = Some(cellular.clone());
    let h = harness(collaborators);

    h.sequencer.shutdown().unwrap().await.unwrap();

    assert_eq!(cellular.off_requests(), vec![0, 2]);
    assert_eq!(
        h.store.get(RADIO_SHUTDOWN_PROPERTY).unwrap().as_deref(),
        Some("true")
    );
}

#[tokio::test(start_paused = true)]
async fn test_stuck_radio_times_out_confirmation() {
    let mut collaborators = healthy_collaborators();
    let short_range = Arc::new(MockShortRangeRadio::stuck_on());
    collaborators.short_range = Some(short_range.clone());
    let h = harness(collaborators);

    let report = h.sequencer.shutdown().unwrap().await.unwrap();

    assert_eq!(report.timed_out(), vec![Stage::ConfirmingRadiosOff]);
    assert_eq!(short_range.disable_calls(), 1);
    assert_eq!(h.power.calls(), vec![PowerCall::PowerOff]);
}

/// Broadcaster that records the persisted marker at the moment it is called
struct MarkerSnoop {
    store: Arc<MemoryPropertyStore>,
    seen: Mutex<Option<(Option<String>, Option<String>)>>,
}

#[async_trait]
impl IntentBroadcaster for MarkerSnoop {
    async fn broadcast_shutdown(
        &self,
        _request: &ShutdownRequest,
        on_done: CompletionHandle,
    ) -> crate::error::Result<()> {
        *self.seen.lock() = Some((
            self.store.get(SHUTDOWN_ACTION_PROPERTY)?,
            self.store.get(SHUTDOWN_RUNNING_PROPERTY)?,
        ));
        on_done.done(0);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_marker_is_persisted_before_first_phase() {
    let store = Arc::new(MemoryPropertyStore::new());
    let snoop = Arc::new(MarkerSnoop {
        store: store.clone(),
        seen: Mutex::new(None),
    });
    let power = Arc::new(RecordingPowerControl::new());

    let sequencer = Arc::new(
        ShutdownSequencer::builder()
            .collaborators(Collaborators {
                broadcaster: Some(snoop.clone()),
                ..Default::default()
            })
            .terminal(TerminalAction::new(power.clone()))
            .properties(store.clone())
            .build()
            .unwrap(),
    );

    let report = sequencer
        .reboot(Some("bootloader".to_string()))
        .unwrap()
        .await
        .unwrap();

    let (marker, running) = snoop.seen.lock().clone().unwrap();
    let marker = ShutdownMarker::decode(&marker.unwrap()).unwrap();
    assert_eq!(marker.action, MarkerAction::Reboot);
    assert_eq!(marker.reason.as_deref(), Some("bootloader"));
    assert_eq!(marker.sequence_id, Some(report.sequence_id));
    assert_eq!(running.as_deref(), Some("true"));
}

#[tokio::test(start_paused = true)]
async fn test_builder_requires_terminal_and_properties() {
    assert!(ShutdownSequencer::builder()
        .properties(Arc::new(MemoryPropertyStore::new()))
        .build()
        .is_err());

    assert!(ShutdownSequencer::builder()
        .terminal(TerminalAction::new(Arc::new(RecordingPowerControl::new())))
        .build()
        .is_err());
}

#[tokio::test(start_paused = true)]
async fn test_poll_completes_on_first_off_sample() {
    let target = Arc::new(MockPollTarget::on_for("modem sync", 3));
    let targets: Vec<Arc<dyn PollTarget>> = vec![target.clone()];
    let started = Instant::now();

    let outcome = poll_until_off(PollPolicy::default(), &targets).await;

    assert_eq!(outcome, PhaseOutcome::Completed);
    assert_eq!(target.samples(), 4);
    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert!(started.elapsed() < Duration::from_millis(1550));
}

#[tokio::test(start_paused = true)]
async fn test_poll_gives_up_after_max_attempts() {
    let target = Arc::new(MockPollTarget::always_on("stuck radio"));
    let targets: Vec<Arc<dyn PollTarget>> = vec![target.clone()];
    let started = Instant::now();

    let outcome = poll_until_off(PollPolicy::default(), &targets).await;

    assert_eq!(outcome, PhaseOutcome::TimedOut);
    assert_eq!(target.samples(), 16);
    // No sleep after the final attempt
    assert!(started.elapsed() >= Duration::from_millis(7500));
    assert!(started.elapsed() < PollPolicy::default().ceiling());
}

#[tokio::test(start_paused = true)]
async fn test_poll_does_not_resample_off_targets() {
    let quick = Arc::new(MockPollTarget::on_for("quick", 0));
    let slow = Arc::new(MockPollTarget::on_for("slow", 2));
    let unreachable = Arc::new(MockPollTarget::unreachable("gone"));
    let targets: Vec<Arc<dyn PollTarget>> = vec![quick.clone(), slow.clone(), unreachable.clone()];

    let outcome = poll_until_off(PollPolicy::default(), &targets).await;

    assert_eq!(outcome, PhaseOutcome::Completed);
    assert_eq!(quick.samples(), 1);
    assert_eq!(slow.samples(), 3);
    assert_eq!(unreachable.samples(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poll_without_targets_completes_at_once() {
    let started = Instant::now();
    let outcome = poll_until_off(PollPolicy::default(), &[]).await;

    assert_eq!(outcome, PhaseOutcome::Completed);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_custom_poll_interval_shortens_confirmation() {
    let mut collaborators = healthy_collaborators();
    collaborators.short_range = Some(Arc::new(MockShortRangeRadio::stuck_on()));

    let power = Arc::new(RecordingPowerControl::new());
    let sequencer = Arc::new(
        ShutdownSequencer::builder()
            .collaborators(collaborators)
            .terminal(TerminalAction::new(power.clone()))
            .properties(Arc::new(MemoryPropertyStore::new()))
            .poll_interval(Duration::from_millis(100))
            .build()
            .unwrap(),
    );
    let mut events = sequencer.event_bus().subscribe();

    sequencer.shutdown().unwrap().await.unwrap();

    let confirm_elapsed = drain(&mut events).into_iter().find_map(|event| match event {
        SequenceEvent::PhaseFinished {
            stage: Stage::ConfirmingRadiosOff,
            elapsed,
            outcome,
        } => Some((elapsed, outcome)),
        _ => None,
    });
    let (elapsed, outcome) = confirm_elapsed.unwrap();
    assert_eq!(outcome, PhaseOutcome::TimedOut);
    assert!(elapsed >= Duration::from_millis(1500));
    assert!(elapsed < Duration::from_millis(1550));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_requested_from_plain_thread() {
    let power = Arc::new(RecordingPowerControl::new());
    let sequencer = Arc::new(
        ShutdownSequencer::builder()
            .terminal(TerminalAction::new(power.clone()))
            .properties(Arc::new(MemoryPropertyStore::new()))
            .build()
            .unwrap(),
    );

    let caller = Arc::clone(&sequencer);
    let (first, second) = std::thread::spawn(move || (caller.shutdown(), caller.shutdown()))
        .join()
        .unwrap();

    assert!(second.is_none());
    let report = first.unwrap().await.unwrap();
    assert!(report.timed_out().is_empty());
    assert_eq!(power.calls(), vec![PowerCall::PowerOff]);
    assert_eq!(sequencer.state(), SequenceState::Completed);
}

#[test]
fn test_builder_outside_runtime_needs_handle() {
    let power = Arc::new(RecordingPowerControl::new());
    let builder = || {
        ShutdownSequencer::builder()
            .terminal(TerminalAction::new(power.clone()))
            .properties(Arc::new(MemoryPropertyStore::new()))
    };
    assert!(builder().build().is_err());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let sequencer = Arc::new(builder().runtime(runtime.handle().clone()).build().unwrap());

    let handle = sequencer.shutdown().unwrap();
    assert_eq!(sequencer.state(), SequenceState::Running);
    runtime.block_on(handle).unwrap();

    assert_eq!(power.calls(), vec![PowerCall::PowerOff]);
    assert!(sequencer.shutdown().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_radio_marker_published_when_radio_hangs() {
    let mut collaborators = healthy_collaborators();
    collaborators.cellular = Some(Arc::new(MockCellularRadio::hung()));
    let h = harness(collaborators);

    let report = h.sequencer.shutdown().unwrap().await.unwrap();

    assert_eq!(
        report.timed_out(),
        vec![Stage::DisablingRadios, Stage::ConfirmingRadiosOff]
    );
    assert_eq!(
        h.store.get(RADIO_SHUTDOWN_PROPERTY).unwrap().as_deref(),
        Some("true")
    );
    assert_eq!(h.power.calls(), vec![PowerCall::PowerOff]);
}

#[tokio::test(start_paused = true)]
async fn test_failing_callback_services_finish_at_once() {
    let broadcaster = Arc::new(MockBroadcaster::failing());
    let mount = Arc::new(MockMountManager::failing());
    let h = harness(Collaborators {
        broadcaster: Some(broadcaster.clone()),
        mount: Some(mount.clone()),
        ..Default::default()
    });
    let mut events = h.sequencer.event_bus().subscribe();
    let started = Instant::now();

    let report = h.sequencer.shutdown().unwrap().await.unwrap();

    assert!(report.timed_out().is_empty());
    assert_eq!(broadcaster.call_count(), 1);
    assert_eq!(mount.call_count(), 1);

    let finished: Vec<(Stage, PhaseOutcome, Duration)> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SequenceEvent::PhaseFinished {
                stage: stage @ (Stage::BroadcastingIntent | Stage::ShuttingDownStorage),
                outcome,
                elapsed,
            } => Some((stage, outcome, elapsed)),
            _ => None,
        })
        .collect();
    assert_eq!(
        finished,
        vec![
            (Stage::BroadcastingIntent, PhaseOutcome::Completed, Duration::ZERO),
            (Stage::ShuttingDownStorage, PhaseOutcome::Completed, Duration::ZERO),
        ]
    );

    // Neither budget was spent, only the vibration delays power off
    let total = elapsed_between(started, h.power.power_off_at().unwrap());
    assert!(total >= Duration::from_millis(500), "took {:?}", total);
    assert!(total < Duration::from_millis(505), "took {:?}", total);
}

#[tokio::test(start_paused = true)]
async fn test_instant_services_cost_only_the_vibration() {
    let cellular = Arc::new(MockCellularRadio::new(vec![false, false]));
    let short_range = Arc::new(MockShortRangeRadio::new(SubsystemStatus::Off));
    let sync_indicator = Arc::new(MockPollTarget::on_for("modem sync", 0));
    let indicator: Arc<dyn PollTarget> = sync_indicator.clone();
    let h = harness(Collaborators {
        broadcaster: Some(Arc::new(MockBroadcaster::acking_after(Duration::ZERO))),
        supervisor: Some(Arc::new(MockSupervisor::new(Duration::ZERO))),
        cellular: Some(cellular.clone()),
        short_range: Some(short_range.clone()),
        mount: Some(Arc::new(MockMountManager::acking_after(Duration::ZERO, 0))),
        sync_indicators: vec![indicator],
    });
    let started = Instant::now();

    let report = h.sequencer.shutdown().unwrap().await.unwrap();

    assert!(report
        .phases
        .iter()
        .all(|(_, outcome)| *outcome == PhaseOutcome::Completed));
    assert!(cellular.off_requests().is_empty());
    assert_eq!(short_range.disable_calls(), 0);
    assert_eq!(sync_indicator.samples(), 1);
    assert_eq!(h.vibrator.call_count(), 1);

    let total = elapsed_between(started, h.power.power_off_at().unwrap());
    assert!(total >= Duration::from_millis(500), "took {:?}", total);
    assert!(total < Duration::from_millis(505), "took {:?}", total);
}
