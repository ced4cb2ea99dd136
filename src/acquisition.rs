//! Concurrent pose acquisition.
//!
//! One [`AcquisitionContext`] serves every logical device backed by the same
//! physical tracking subsystem: it owns the subsystem handle, the background
//! polling thread, and the table mapping the subsystem's object tags to the
//! per-device [`PoseCell`]s. The background thread is the only writer of any
//! cell; consumer threads read through the cell's lock at their own cadence.

use crate::error::VrHalError;
use crate::math;
use crate::types::Pose;
use crate::Result;
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Minimum interval between subsystem poll steps. Tracking engines are
/// busy-poll by design; this bounds the thread's CPU use without adding
/// meaningful latency at tracking rates.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Capacity of the button/input event queue. Enqueue is non-blocking; when
/// the consumer falls behind, events are dropped rather than stalling the
/// pose path.
const BUTTON_QUEUE_CAPACITY: usize = 64;

/// Latest pose of one logical device, shared between the acquisition thread
/// and any number of consumer reads.
///
/// Position and orientation are always written together under one critical
/// section, so a read can never observe a torn pair. The section is a
/// fixed-size copy plus the frame correction arithmetic; no I/O and no
/// allocation happen under the lock.
pub struct PoseCell {
    pose: Mutex<Pose>,
}

impl PoseCell {
    pub fn new() -> PoseCell {
        PoseCell {
            pose: Mutex::new(Pose::default()),
        }
    }

    /// Copy out the latest pose. Never blocks beyond the lock itself.
    pub fn read(&self) -> Pose {
        match self.pose.lock() {
            Ok(guard) => *guard,
            // A poisoned cell means the writer panicked mid-write is
            // impossible (writes are plain copies), so the stored value is
            // still consistent.
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Publish a raw subsystem pose, applying `correction` inside the same
    /// critical section as the write so readers only ever see data in the
    /// engine's output convention.
    pub fn publish(&self, raw_position: [f64; 3], raw_orientation_wxyz: [f64; 4], correction: &FrameCorrection) {
        let mut guard = match self.pose.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = correction.apply(raw_position, raw_orientation_wxyz);
    }

    #[cfg(test)]
    pub(crate) fn write(&self, pose: Pose) {
        let mut guard = self.pose.lock().unwrap();
        *guard = pose;
    }
}

impl Default for PoseCell {
    fn default() -> Self {
        PoseCell::new()
    }
}

/// Fixed transform from a subsystem's native coordinate convention into the
/// engine's output convention.
///
/// Covers the wxyz-to-xyzw reorder, per-axis handedness sign flips, and an
/// optional constant mount rotation for devices physically rotated relative
/// to their tracking reference.
#[derive(Debug, Clone, Copy)]
pub struct FrameCorrection {
    /// Sign applied to each native position axis.
    pub position_sign: [f32; 3],
    /// Sign applied to each orientation component after the xyzw reorder.
    pub orientation_sign: [f32; 4],
    /// Corrective rotation composed with the incoming orientation, and
    /// applied to the position.
    pub mount_rotation: [f32; 4],
}

impl FrameCorrection {
    pub fn identity() -> FrameCorrection {
        FrameCorrection {
            position_sign: [1.0, 1.0, 1.0],
            orientation_sign: [1.0, 1.0, 1.0, 1.0],
            mount_rotation: math::QUAT_IDENTITY,
        }
    }

    fn apply(&self, pos: [f64; 3], quat_wxyz: [f64; 4]) -> Pose {
        let flipped = [
            pos[0] as f32 * self.position_sign[0],
            pos[1] as f32 * self.position_sign[1],
            pos[2] as f32 * self.position_sign[2],
        ];
        // Native order is [w, x, y, z]; engine order is [x, y, z, w].
        let reordered = [
            quat_wxyz[1] as f32 * self.orientation_sign[0],
            quat_wxyz[2] as f32 * self.orientation_sign[1],
            quat_wxyz[3] as f32 * self.orientation_sign[2],
            quat_wxyz[0] as f32 * self.orientation_sign[3],
        ];
        Pose {
            position: math::quat_rotate(self.mount_rotation, flipped),
            orientation: math::quat_mul(reordered, self.mount_rotation),
        }
    }
}

/// A button/input event forwarded from the subsystem's input callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonEvent {
    /// Subsystem object tag the event belongs to.
    pub tag: String,
    pub button: u8,
    pub pressed: bool,
}

/// Callback sinks the acquisition engine registers with a tracking
/// subsystem: pose updates, button/input events, and raw motion samples.
pub trait EventSink: Send + Sync {
    /// New pose for the object identified by `tag`, in the subsystem's
    /// native convention (position in meters, quaternion in wxyz order).
    fn pose_update(&self, tag: &str, position: [f64; 3], orientation_wxyz: [f64; 4]);

    fn button_event(&self, tag: &str, button: u8, pressed: bool);

    /// Raw accelerometer/gyro/magnetometer sample. The engine does no sensor
    /// fusion of its own; the default handling is trace logging.
    fn motion_sample(&self, tag: &str, accel: [f32; 3], gyro: [f32; 3], mag: [f32; 3]);
}

/// Boundary to an external 6DOF tracking engine.
///
/// The engine's wire protocol is opaque to this crate. `poll` must only ever
/// be called from the thread that called `init`.
pub trait TrackingSubsystem: Send {
    /// Bring up the subsystem and register the callback sinks.
    fn init(&mut self, sink: Arc<dyn EventSink>) -> Result<()>;

    /// Run one poll/step, driving any pending callbacks through the sink.
    fn poll(&mut self) -> Result<()>;

    fn shutdown(&mut self);
}

/// Engine life cycle per shared context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Polling,
    Stopping,
    Stopped,
    /// Subsystem bring-up failed; bound devices keep returning the default
    /// pose instead of blocking.
    Failed,
}

struct AcquisitionSink {
    cells: HashMap<String, Arc<PoseCell>>,
    correction: FrameCorrection,
    button_tx: Sender<ButtonEvent>,
}

impl EventSink for AcquisitionSink {
    fn pose_update(&self, tag: &str, position: [f64; 3], orientation_wxyz: [f64; 4]) {
        match self.cells.get(tag) {
            Some(cell) => cell.publish(position, orientation_wxyz, &self.correction),
            // The subsystem may report objects the registry never opened.
            None => log::trace!("pose update for unmapped tag {:?} ignored", tag),
        }
    }

    fn button_event(&self, tag: &str, button: u8, pressed: bool) {
        let event = ButtonEvent {
            tag: tag.to_string(),
            button,
            pressed,
        };
        if let Err(e) = self.button_tx.try_send(event) {
            match e {
                crossbeam_channel::TrySendError::Full(_) => {
                    log::trace!("button queue full, dropping event for {:?}", tag);
                }
                crossbeam_channel::TrySendError::Disconnected(_) => {}
            }
        }
    }

    fn motion_sample(&self, tag: &str, accel: [f32; 3], gyro: [f32; 3], _mag: [f32; 3]) {
        log::trace!("motion sample for {:?}: accel={:?} gyro={:?}", tag, accel, gyro);
    }
}

/// Subsystem handle plus sink for the consumer-pumped update mode.
struct ManualPump {
    subsystem: Box<dyn TrackingSubsystem>,
    sink: Arc<AcquisitionSink>,
    initialized: bool,
}

/// One background-polling unit serving every logical device backed by the
/// same physical tracking subsystem.
///
/// Created lazily by the first open of any device in the subsystem; later
/// opens attach via [`bind`](AcquisitionContext::bind). The last
/// [`release`](AcquisitionContext::release) signals the polling thread and
/// joins it before the context can be dropped — no detached threads, no
/// access to freed memory from a still-running poll loop.
pub struct AcquisitionContext {
    cells: HashMap<String, Arc<PoseCell>>,
    state: Arc<Mutex<EngineState>>,
    stop: Arc<AtomicBool>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    bound: AtomicUsize,
    button_rx: Receiver<ButtonEvent>,
    pump: Option<Mutex<ManualPump>>,
}

impl AcquisitionContext {
    /// Construct the context for `subsystem`, creating one pose cell per
    /// object tag. With `auto_update` the background polling thread starts
    /// immediately; otherwise the consumer pumps via [`pump`].
    pub fn start(
        subsystem: Box<dyn TrackingSubsystem>,
        correction: FrameCorrection,
        tags: &[&str],
        auto_update: bool,
    ) -> Arc<AcquisitionContext> {
        let cells: HashMap<String, Arc<PoseCell>> = tags
            .iter()
            .map(|tag| (tag.to_string(), Arc::new(PoseCell::new())))
            .collect();

        let (button_tx, button_rx) = crossbeam_channel::bounded(BUTTON_QUEUE_CAPACITY);
        let sink = Arc::new(AcquisitionSink {
            cells: cells.clone(),
            correction,
            button_tx,
        });

        let (pump, threaded_subsystem) = if auto_update {
            (None, Some(subsystem))
        } else {
            let pump = ManualPump {
                subsystem,
                sink: sink.clone(),
                initialized: false,
            };
            (Some(Mutex::new(pump)), None)
        };

        let ctx = Arc::new(AcquisitionContext {
            cells,
            state: Arc::new(Mutex::new(EngineState::Uninitialized)),
            stop: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
            bound: AtomicUsize::new(0),
            button_rx,
            pump,
        });

        if let Some(subsystem) = threaded_subsystem {
            let stop = ctx.stop.clone();
            let state = ctx.state.clone();
            let handle = std::thread::Builder::new()
                .name("vrhal-acquisition".into())
                .spawn(move || poll_loop(subsystem, sink, stop, state))
                .expect("failed to spawn acquisition thread");
            *ctx.thread.lock().unwrap() = Some(handle);
        }

        ctx
    }

    /// Current engine state.
    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock().unwrap() = state;
    }

    /// Pose cell for a subsystem object tag.
    pub fn cell(&self, tag: &str) -> Option<Arc<PoseCell>> {
        self.cells.get(tag).cloned()
    }

    /// Attach one more logical device to this context.
    pub fn bind(&self) {
        self.bound.fetch_add(1, Ordering::SeqCst);
    }

    /// Detach one logical device. When the last device detaches, the polling
    /// thread is signaled and joined (or the subsystem shut down inline in
    /// manual mode) before this returns.
    pub fn release(&self) {
        let remaining = self.bound.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining > 0 {
            return;
        }

        self.set_state(EngineState::Stopping);
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().unwrap().take() {
            if handle.join().is_err() {
                log::warn!("acquisition thread panicked before join");
            }
        }
        if let Some(pump) = &self.pump {
            let mut pump = pump.lock().unwrap();
            if pump.initialized {
                pump.subsystem.shutdown();
            }
        }
        self.set_state(EngineState::Stopped);
        log::info!("acquisition context stopped (last device closed)");
    }

    /// Number of currently bound devices.
    pub fn bound_devices(&self) -> usize {
        self.bound.load(Ordering::SeqCst)
    }

    /// One manual poll step (consumer-pumped mode). A no-op when the context
    /// runs its own polling thread or the subsystem failed to initialize.
    pub fn pump(&self) -> Result<()> {
        let Some(pump) = &self.pump else {
            return Ok(());
        };
        let mut pump = pump.lock().unwrap();
        if !pump.initialized {
            let sink: Arc<dyn EventSink> = pump.sink.clone();
            match pump.subsystem.init(sink) {
                Ok(()) => {
                    pump.initialized = true;
                    self.set_state(EngineState::Polling);
                }
                Err(e) => {
                    self.set_state(EngineState::Failed);
                    return Err(VrHalError::SubsystemInitFailed(e.to_string()));
                }
            }
        }
        if let Err(e) = pump.subsystem.poll() {
            log::warn!("subsystem poll error: {}", e);
        }
        Ok(())
    }

    /// Drain pending button/input events without blocking.
    pub fn take_button_events(&self) -> Vec<ButtonEvent> {
        self.button_rx.try_iter().collect()
    }
}

fn poll_loop(
    mut subsystem: Box<dyn TrackingSubsystem>,
    sink: Arc<AcquisitionSink>,
    stop: Arc<AtomicBool>,
    state: Arc<Mutex<EngineState>>,
) {
    log::info!("acquisition thread started");

    let sink: Arc<dyn EventSink> = sink;
    if let Err(e) = subsystem.init(sink) {
        // Bound devices keep returning the default pose; the render loop
        // must not be blocked on tracking health.
        log::error!("tracking subsystem init failed: {}", e);
        *state.lock().unwrap() = EngineState::Failed;
        return;
    }
    *state.lock().unwrap() = EngineState::Polling;

    while !stop.load(Ordering::SeqCst) {
        if let Err(e) = subsystem.poll() {
            log::warn!("subsystem poll error: {}", e);
        }
        std::thread::sleep(MIN_POLL_INTERVAL);
    }

    subsystem.shutdown();
    log::info!("acquisition thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Scripted subsystem: emits one HMD pose per poll, counts life-cycle
    /// calls.
    struct ScriptedSubsystem {
        sink: Option<Arc<dyn EventSink>>,
        polls: Arc<AtomicU32>,
        shutdowns: Arc<AtomicU32>,
        fail_init: bool,
    }

    impl ScriptedSubsystem {
        fn new(polls: Arc<AtomicU32>, shutdowns: Arc<AtomicU32>) -> Self {
            ScriptedSubsystem {
                sink: None,
                polls,
                shutdowns,
                fail_init: false,
            }
        }
    }

    impl TrackingSubsystem for ScriptedSubsystem {
        fn init(&mut self, sink: Arc<dyn EventSink>) -> Result<()> {
            if self.fail_init {
                return Err(VrHalError::SubsystemInitFailed("scripted failure".into()));
            }
            self.sink = Some(sink);
            Ok(())
        }

        fn poll(&mut self) -> Result<()> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) as f64;
            if let Some(sink) = &self.sink {
                sink.pose_update("HMD", [n, 2.0, 3.0], [1.0, 0.0, 0.0, 0.0]);
                sink.pose_update("GHOST", [9.0, 9.0, 9.0], [1.0, 0.0, 0.0, 0.0]);
                sink.button_event("WM0", 1, true);
            }
            Ok(())
        }

        fn shutdown(&mut self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("condition not reached within timeout");
    }

    #[test]
    fn test_cell_write_then_read_exact() {
        let cell = PoseCell::new();
        let pose = Pose {
            position: [1.0, 2.0, 3.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
        };
        cell.write(pose);

        let cell = Arc::new(cell);
        let reader = {
            let cell = cell.clone();
            std::thread::spawn(move || cell.read())
        };
        assert_eq!(reader.join().unwrap(), pose);
    }

    #[test]
    fn test_no_torn_pose_under_interleaved_access() {
        let cell = Arc::new(PoseCell::new());
        let writer = {
            let cell = cell.clone();
            std::thread::spawn(move || {
                for i in 0..10_000 {
                    let k = i as f32;
                    cell.write(Pose {
                        position: [k, k, k],
                        orientation: [k, k, k, k],
                    });
                }
            })
        };

        // Every observed pose must have all seven components equal: a torn
        // position/orientation pair would mix values from two writes.
        for _ in 0..10_000 {
            let pose = cell.read();
            let k = pose.position[0];
            assert_eq!(pose.position, [k, k, k]);
            assert_eq!(pose.orientation, [k, k, k, k]);
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_frame_correction_applies_signs_and_reorder() {
        let correction = FrameCorrection {
            position_sign: [-1.0, 1.0, -1.0],
            orientation_sign: [-1.0, 1.0, -1.0, 1.0],
            mount_rotation: math::QUAT_IDENTITY,
        };
        let pose = correction.apply([1.0, 2.0, 3.0], [0.5, 0.1, 0.2, 0.3]);
        assert_eq!(pose.position, [-1.0, 2.0, -3.0]);
        // wxyz [0.5, 0.1, 0.2, 0.3] -> xyzw [0.1, 0.2, 0.3, 0.5] with signs.
        assert_eq!(pose.orientation, [-0.1, 0.2, -0.3, 0.5]);
    }

    #[test]
    fn test_frame_correction_mount_rotation() {
        let correction = FrameCorrection {
            position_sign: [1.0, 1.0, 1.0],
            orientation_sign: [1.0, 1.0, 1.0, 1.0],
            mount_rotation: math::quat_from_axis_angle([1.0, 0.0, 0.0], -90.0),
        };
        // Identity native orientation: the published orientation is exactly
        // the mount rotation, and the position is rotated by it.
        let pose = correction.apply([0.0, 1.0, 0.0], [1.0, 0.0, 0.0, 0.0]);
        for i in 0..4 {
            assert!((pose.orientation[i] - correction.mount_rotation[i]).abs() < 1e-6);
        }
        assert!(pose.position[0].abs() < 1e-6);
        assert!(pose.position[1].abs() < 1e-6);
        assert!((pose.position[2] - -1.0).abs() < 1e-6);
    }

    #[test]
    fn test_context_polls_and_publishes() {
        let polls = Arc::new(AtomicU32::new(0));
        let shutdowns = Arc::new(AtomicU32::new(0));
        let subsystem = Box::new(ScriptedSubsystem::new(polls.clone(), shutdowns.clone()));

        let ctx = AcquisitionContext::start(
            subsystem,
            FrameCorrection::identity(),
            &["HMD", "WM0", "WM1"],
            true,
        );
        ctx.bind();

        wait_for(|| polls.load(Ordering::SeqCst) >= 3);
        assert_eq!(ctx.state(), EngineState::Polling);

        let cell = ctx.cell("HMD").unwrap();
        wait_for(|| cell.read().position[1] == 2.0);
        let pose = cell.read();
        assert_eq!(pose.position[2], 3.0);
        assert_eq!(pose.orientation, [0.0, 0.0, 0.0, 1.0]);

        // Unmapped tag is ignored; WM0's cell stays at the default pose.
        assert_eq!(ctx.cell("WM0").unwrap().read(), Pose::default());
        assert!(ctx.cell("GHOST").is_none());

        let events = ctx.take_button_events();
        assert!(events.iter().all(|e| e.tag == "WM0" && e.button == 1));

        ctx.release();
        assert_eq!(ctx.state(), EngineState::Stopped);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_joins_only_after_last_device() {
        let polls = Arc::new(AtomicU32::new(0));
        let shutdowns = Arc::new(AtomicU32::new(0));
        let subsystem = Box::new(ScriptedSubsystem::new(polls.clone(), shutdowns.clone()));

        let ctx = AcquisitionContext::start(
            subsystem,
            FrameCorrection::identity(),
            &["HMD", "WM0", "WM1"],
            true,
        );
        ctx.bind();
        ctx.bind();
        ctx.bind();

        wait_for(|| ctx.state() == EngineState::Polling);

        ctx.release();
        ctx.release();
        assert_eq!(ctx.state(), EngineState::Polling);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 0);

        ctx.release();
        assert_eq!(ctx.state(), EngineState::Stopped);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_init_failure_degrades_to_default_pose() {
        let polls = Arc::new(AtomicU32::new(0));
        let shutdowns = Arc::new(AtomicU32::new(0));
        let mut subsystem = ScriptedSubsystem::new(polls.clone(), shutdowns.clone());
        subsystem.fail_init = true;

        let ctx = AcquisitionContext::start(
            Box::new(subsystem),
            FrameCorrection::identity(),
            &["HMD"],
            true,
        );
        ctx.bind();

        wait_for(|| ctx.state() == EngineState::Failed);
        assert_eq!(polls.load(Ordering::SeqCst), 0);
        // Reads never block; they return the neutral pose.
        assert_eq!(ctx.cell("HMD").unwrap().read(), Pose::default());

        ctx.release();
        assert_eq!(ctx.state(), EngineState::Stopped);
    }

    #[test]
    fn test_manual_pump_mode() {
        let polls = Arc::new(AtomicU32::new(0));
        let shutdowns = Arc::new(AtomicU32::new(0));
        let subsystem = Box::new(ScriptedSubsystem::new(polls.clone(), shutdowns.clone()));

        let ctx = AcquisitionContext::start(
            subsystem,
            FrameCorrection::identity(),
            &["HMD"],
            false,
        );
        ctx.bind();
        assert_eq!(ctx.state(), EngineState::Uninitialized);

        ctx.pump().unwrap();
        ctx.pump().unwrap();
        assert_eq!(ctx.state(), EngineState::Polling);
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.cell("HMD").unwrap().read().position[1], 2.0);

        ctx.release();
        assert_eq!(ctx.state(), EngineState::Stopped);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_button_queue_overflow_never_blocks() {
        let polls = Arc::new(AtomicU32::new(0));
        let shutdowns = Arc::new(AtomicU32::new(0));
        let subsystem = Box::new(ScriptedSubsystem::new(polls, shutdowns));

        let ctx = AcquisitionContext::start(
            subsystem,
            FrameCorrection::identity(),
            &["HMD", "WM0"],
            false,
        );
        ctx.bind();

        // Far more events than the queue holds; pumping must keep returning.
        for _ in 0..10 * BUTTON_QUEUE_CAPACITY {
            ctx.pump().unwrap();
        }
        let events = ctx.take_button_events();
        assert_eq!(events.len(), BUTTON_QUEUE_CAPACITY);

        ctx.release();
    }
}
