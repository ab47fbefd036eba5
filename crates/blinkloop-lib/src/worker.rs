//! Action worker — the background thread that replays a session's queue.
//!
//! The worker and the owning thread share one [`Shared`] block. Its mutex
//! guards the queue, the enabled flag and the device handle together, so a
//! queue edit, an immediate command and one worker step never interleave.
//! Sleeping happens outside the lock.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::action::{Action, ActionQueue};
use crate::device::{DeviceError, Revision, Transport};
use crate::protocol::{self, LED_1, LED_2, LED_ALL};

/// Worker timing configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long to wait before re-checking a disabled worker or empty queue.
    pub idle_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(1000),
        }
    }
}

/// Shortest wait after issuing fades: one device timer tick.
pub(crate) const MIN_STEP: Duration = Duration::from_millis(10);

/// Everything behind the session lock.
pub(crate) struct SessionState<D> {
    pub queue: ActionQueue,
    pub enabled: bool,
    /// `None` once released (or never attached).
    pub device: Option<D>,
    pub revision: Revision,
}

/// Cancellation signal that also wakes a sleeping worker.
#[derive(Debug, Default)]
pub(crate) struct Shutdown {
    cancelled: Mutex<bool>,
    cv: Condvar,
}

impl Shutdown {
    pub fn cancel(&self) {
        *self.cancelled.lock().unwrap_or_else(|e| e.into_inner()) = true;
        self.cv.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for `dur` unless cancelled first. Returns `true` if cancelled.
    ///
    /// Never returns early on a spurious wakeup.
    pub fn sleep(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        let mut cancelled = self.cancelled.lock().unwrap_or_else(|e| e.into_inner());
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            cancelled = self
                .cv
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
        true
    }
}

pub(crate) struct Shared<D> {
    state: Mutex<SessionState<D>>,
    pub shutdown: Shutdown,
}

impl<D> Shared<D> {
    pub fn new(device: Option<D>, revision: Revision) -> Self {
        Shared {
            state: Mutex::new(SessionState {
                queue: ActionQueue::new(),
                enabled: false,
                device,
                revision,
            }),
            shutdown: Shutdown::default(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SessionState<D>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Outcome of one locked worker step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Disabled or empty: wait the idle interval.
    Idle,
    /// Fades issued: wait fade + hold.
    Wait(Duration),
}

/// Write the fade(s) for one action. mk2 drives each LED separately.
pub(crate) fn issue_fades<D: Transport>(
    device: &D,
    revision: Revision,
    action: &Action,
) -> Result<(), DeviceError> {
    let p = action.primary;
    match revision {
        Revision::Mk2 => {
            let s = action.secondary;
            device.write_feature_report(&protocol::fade_rgb(action.fade_ms, p.r, p.g, p.b, LED_1))?;
            device.write_feature_report(&protocol::fade_rgb(action.fade_ms, s.r, s.g, s.b, LED_2))
        }
        Revision::Mk1 => device.write_feature_report(&protocol::fade_rgb(
            action.fade_ms,
            p.r,
            p.g,
            p.b,
            LED_ALL,
        )),
    }
}

/// One worker iteration. Caller holds the session lock.
pub(crate) fn step<D: Transport>(state: &mut SessionState<D>, cursor: &mut usize) -> Step {
    if !state.enabled || state.queue.is_empty() {
        *cursor = 0;
        return Step::Idle;
    }
    // removals can leave the cursor past the end
    if *cursor >= state.queue.len() {
        *cursor = 0;
    }
    let action = state.queue.as_slice()[*cursor];
    *cursor += 1;
    if let Some(device) = state.device.as_ref()
        && let Err(e) = issue_fades(device, state.revision, &action)
    {
        log::warn!("[worker] fade to {} failed: {e}", action.primary);
    }
    Step::Wait(action.cycle().max(MIN_STEP))
}

fn run<D: Transport>(shared: Arc<Shared<D>>, config: WorkerConfig) {
    let mut cursor = 0;
    while !shared.shutdown.is_cancelled() {
        let next = step(&mut shared.lock(), &mut cursor);
        let pause = match next {
            Step::Idle => config.idle_interval,
            Step::Wait(d) => d,
        };
        if shared.shutdown.sleep(pause) {
            break;
        }
    }
}

/// Start the worker thread for a session.
pub(crate) fn spawn<D: Transport + 'static>(
    shared: Arc<Shared<D>>,
    serial: &str,
    config: WorkerConfig,
) -> std::io::Result<JoinHandle<()>> {
    let name = format!("blinkloop-{serial}");
    std::thread::Builder::new().name(name).spawn(move || {
        log::debug!("[worker] started");
        run(shared, config);
        log::debug!("[worker] stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::device::Backend;
    use crate::device::mock::{MockBackend, MockDevice};

    fn state(serial: &str) -> (MockBackend, SessionState<MockDevice>) {
        let backend = MockBackend::new(&[serial]);
        let device = backend.open(serial).unwrap();
        let st = SessionState {
            queue: ActionQueue::new(),
            enabled: true,
            device: Some(device),
            revision: Revision::from_serial(serial),
        };
        (backend, st)
    }

    fn action(r: u8, fade_ms: u32, hold_ms: u32) -> Action {
        Action::new(Rgb::new(r, 0, 0), fade_ms, hold_ms)
    }

    #[test]
    fn disabled_is_idle_and_resets_cursor() {
        let (backend, mut st) = state("10000001");
        st.queue.append(action(1, 0, 100));
        st.enabled = false;
        let mut cursor = 3;
        assert_eq!(step(&mut st, &mut cursor), Step::Idle);
        assert_eq!(cursor, 0);
        assert!(backend.writes().is_empty());
    }

    #[test]
    fn empty_queue_is_idle() {
        let (_backend, mut st) = state("10000001");
        let mut cursor = 0;
        assert_eq!(step(&mut st, &mut cursor), Step::Idle);
    }

    #[test]
    fn step_waits_fade_plus_hold_and_advances() {
        let (backend, mut st) = state("10000001");
        st.queue.append(action(1, 200, 300));
        st.queue.append(action(2, 0, 50));
        let mut cursor = 0;
        assert_eq!(
            step(&mut st, &mut cursor),
            Step::Wait(Duration::from_millis(500))
        );
        assert_eq!(cursor, 1);
        assert_eq!(
            step(&mut st, &mut cursor),
            Step::Wait(Duration::from_millis(50))
        );
        let reds: Vec<u8> = backend.writes().iter().map(|w| w.report[2]).collect();
        assert_eq!(reds, vec![1, 2]);
    }

    #[test]
    fn zero_length_action_waits_one_tick() {
        let (backend, mut st) = state("10000001");
        st.queue.append(action(1, 0, 0));
        assert_eq!(step(&mut st, &mut 0), Step::Wait(MIN_STEP));
        assert_eq!(backend.writes().len(), 1);
    }

    #[test]
    fn cursor_wraps_when_queue_shrinks() {
        let (backend, mut st) = state("10000001");
        st.queue.append(action(1, 0, 10));
        let mut cursor = 5;
        step(&mut st, &mut cursor);
        assert_eq!(cursor, 1);
        assert_eq!(backend.writes()[0].report[2], 1);
    }

    #[test]
    fn mk1_issues_one_fade_on_all_leds() {
        let (backend, mut st) = state("1FFFFFFF");
        st.queue
            .append(action(9, 1000, 0).with_secondary(Rgb::new(7, 7, 7)));
        step(&mut st, &mut 0);
        let writes = backend.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].report, protocol::fade_rgb(1000, 9, 0, 0, LED_ALL));
    }

    #[test]
    fn mk2_issues_one_fade_per_led() {
        let (backend, mut st) = state("20000001");
        st.queue
            .append(action(9, 1000, 0).with_secondary(Rgb::new(7, 7, 7)));
        step(&mut st, &mut 0);
        let writes = backend.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].report, protocol::fade_rgb(1000, 9, 0, 0, LED_1));
        assert_eq!(writes[1].report, protocol::fade_rgb(1000, 7, 7, 7, LED_2));
    }

    #[test]
    fn write_failure_keeps_timing() {
        let (backend, mut st) = state("10000001");
        backend.set_fail_writes(true);
        st.queue.append(action(1, 100, 100));
        assert_eq!(
            step(&mut st, &mut 0),
            Step::Wait(Duration::from_millis(200))
        );
    }

    #[test]
    fn released_device_still_steps() {
        let (backend, mut st) = state("10000001");
        st.device = None;
        st.queue.append(action(1, 0, 10));
        assert_eq!(
            step(&mut st, &mut 0),
            Step::Wait(Duration::from_millis(10))
        );
        assert!(backend.writes().is_empty());
    }

    #[test]
    fn shutdown_sleep_runs_full_duration() {
        let s = Shutdown::default();
        let start = Instant::now();
        assert!(!s.sleep(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn shutdown_wakes_sleeper() {
        let s = Arc::new(Shutdown::default());
        let s2 = Arc::clone(&s);
        let start = Instant::now();
        let h = std::thread::spawn(move || s2.sleep(Duration::from_secs(30)));
        std::thread::sleep(Duration::from_millis(20));
        s.cancel();
        assert!(h.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(s.is_cancelled());
    }

    #[test]
    fn cancelled_sleep_returns_immediately() {
        let s = Shutdown::default();
        s.cancel();
        assert!(s.sleep(Duration::from_secs(30)));
    }
}
