//! Device session — exclusive ownership of one blink(1) plus its action loop.
//!
//! A [`Session`] claims a serial in a [`BusyRegistry`], opens the device,
//! and starts a worker thread (disabled) that replays the session's action
//! queue once [`Session::start`] is called. Dropping the session stops and
//! joins the worker, closes the device and frees the serial.
//!
//! Immediate commands (`set_now`, `fade_now`, `play`, `server_tickle`,
//! `turn_off`) halt the worker and clear the queue in the same lock hold
//! as their write, so queued playback never overwrites them.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::action::Action;
use crate::color::Rgb;
use crate::device::{
    self, Backend, DeviceError, PlatformBackend, PlatformDevice, Revision, Transport,
};
use crate::error::Result;
use crate::protocol::{self, LED_ALL, REPORT_ID, REPORT_LEN};
use crate::registry::{self, BusyRegistry};
use crate::worker::{self, Shared, WorkerConfig};

pub struct Session<D: Transport + 'static = PlatformDevice> {
    serial: String,
    revision: Revision,
    attached: bool,
    shared: Arc<Shared<D>>,
    worker: Option<JoinHandle<()>>,
    registry: Arc<BusyRegistry>,
}

impl Session<PlatformDevice> {
    /// Open a device on this platform using the process-wide registry.
    ///
    /// `serial = None` takes the first device not claimed by another session.
    pub fn open(serial: Option<&str>, config: WorkerConfig) -> Result<Self> {
        Self::acquire(
            &PlatformBackend::default(),
            &BusyRegistry::global(),
            serial,
            config,
        )
    }
}

impl<D: Transport + 'static> Session<D> {
    /// Claim and open a device.
    ///
    /// Fails with `Busy` if `serial` is already claimed in `registry`,
    /// `NotFound` / `NoFreeDevice` if nothing is available to take, or the
    /// backend's open error.
    pub fn acquire<B>(
        backend: &B,
        registry: &Arc<BusyRegistry>,
        serial: Option<&str>,
        config: WorkerConfig,
    ) -> Result<Self>
    where
        B: Backend<Device = D>,
    {
        let mut busy = registry.lock();
        let serial = match serial {
            Some(s) if busy.contains(s) => return Err(DeviceError::Busy(s.to_string()).into()),
            Some(s) => s.to_string(),
            None => {
                let serials: Vec<String> = backend
                    .enumerate()
                    .into_iter()
                    .filter_map(|d| d.serial)
                    .collect();
                if serials.is_empty() {
                    return Err(DeviceError::NotFound.into());
                }
                registry::first_free(&busy, serials.iter().map(String::as_str))
                    .ok_or(DeviceError::NoFreeDevice)?
                    .to_string()
            }
        };
        let device = backend.open(&serial)?;
        busy.insert(serial.clone());
        drop(busy);

        let revision = Revision::from_serial(&serial);
        let shared = Arc::new(Shared::new(Some(device), revision));
        let worker = match worker::spawn(Arc::clone(&shared), &serial, config) {
            Ok(h) => h,
            Err(e) => {
                drop(shared);
                registry.release(&serial);
                return Err(e.into());
            }
        };
        log::debug!("[session] acquired {serial} ({revision})");

        Ok(Session {
            serial,
            revision,
            attached: true,
            shared,
            worker: Some(worker),
            registry: Arc::clone(registry),
        })
    }

    /// Like [`acquire`](Self::acquire), but a failure yields a detached
    /// session instead of an error.
    pub fn acquire_or_detached<B>(
        backend: &B,
        registry: &Arc<BusyRegistry>,
        serial: Option<&str>,
        config: WorkerConfig,
    ) -> Self
    where
        B: Backend<Device = D>,
    {
        Self::acquire(backend, registry, serial, config).unwrap_or_else(|e| {
            log::warn!("[session] acquisition failed: {e}");
            Self::detached(registry)
        })
    }

    /// A session with no device. Commands fail with `Detached`; queue
    /// operations still work but nothing replays them.
    pub fn detached(registry: &Arc<BusyRegistry>) -> Self {
        Session {
            serial: String::new(),
            revision: Revision::default(),
            attached: false,
            shared: Arc::new(Shared::new(None, Revision::default())),
            worker: None,
            registry: Arc::clone(registry),
        }
    }

    /// Stop the worker, close the device and free the serial.
    ///
    /// Idempotent; called from `Drop`.
    pub fn release(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.shared.shutdown.cancel();
            if handle.join().is_err() {
                log::warn!("[session] worker for {} panicked", self.serial);
            }
        }
        if !self.attached {
            return;
        }
        // close before unregistering: a registered serial always has a live handle
        let device = self.shared.lock().device.take();
        drop(device);
        self.registry.release(&self.serial);
        self.attached = false;
        log::debug!("[session] released {}", self.serial);
    }

    /// Serial of the held device, or `""` when detached.
    pub fn identity(&self) -> &str {
        if self.attached { &self.serial } else { "" }
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    // ── Worker control ──

    /// Enable queue playback.
    pub fn start(&self) {
        self.shared.lock().enabled = true;
    }

    /// Disable queue playback. No new fade is issued after this returns.
    pub fn halt(&self) {
        self.shared.lock().enabled = false;
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().enabled
    }

    // ── Queue ──

    pub fn append(&self, action: Action) {
        self.shared.lock().queue.append(action);
    }

    /// Overwrite `position` or append at `position == len`; otherwise
    /// `InvalidQueuePosition` and the queue is unchanged.
    pub fn set_at(&self, position: usize, action: Action) -> Result<()> {
        self.shared.lock().queue.set_at(position, action)
    }

    pub fn remove_at(&self, position: usize) -> Result<Action> {
        self.shared.lock().queue.remove_at(position)
    }

    /// Halt the worker and drop every queued action.
    pub fn clear_all(&self) {
        let mut state = self.shared.lock();
        state.enabled = false;
        state.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().queue.is_empty()
    }

    /// Copy of the queued actions.
    pub fn actions(&self) -> Vec<Action> {
        self.shared.lock().queue.as_slice().to_vec()
    }

    // ── Immediate commands ──

    /// Run `f` against the device under the session lock, optionally
    /// halting the worker and clearing the queue first.
    fn with_device<T>(
        &self,
        preempt: bool,
        f: impl FnOnce(&D) -> device::Result<T>,
    ) -> Result<T> {
        let mut state = self.shared.lock();
        if preempt {
            state.enabled = false;
            state.queue.clear();
        }
        let device = state.device.as_ref().ok_or(DeviceError::Detached)?;
        Ok(f(device)?)
    }

    /// Set the color instantly.
    pub fn set_now(&self, color: Rgb) -> Result<()> {
        self.with_device(true, |d| {
            d.write_feature_report(&protocol::set_rgb(color.r, color.g, color.b))
        })
    }

    /// Fade to a color over `fade_ms`. `led` selects 0 (all), 1 or 2; mk1
    /// always addresses all.
    pub fn fade_now(&self, fade_ms: u32, color: Rgb, led: u8) -> Result<()> {
        let led = match self.revision {
            Revision::Mk1 => LED_ALL,
            Revision::Mk2 => led,
        };
        self.with_device(true, |d| {
            d.write_feature_report(&protocol::fade_rgb(fade_ms, color.r, color.g, color.b, led))
        })
    }

    /// Start or stop the on-device pattern. mk1 ignores `end` and `count`.
    pub fn play(&self, on: bool, start: u8, end: u8, count: u8) -> Result<()> {
        let (end, count) = match self.revision {
            Revision::Mk1 => (0, 0),
            Revision::Mk2 => (end, count),
        };
        self.with_device(true, |d| {
            d.write_feature_report(&protocol::play(on as u8, start, end, count))
        })
    }

    /// Arm (or disarm) the device's watchdog: if not tickled again within
    /// `timeout_ms` it plays its stored pattern. mk1 ignores `maintain`.
    pub fn server_tickle(
        &self,
        on: bool,
        timeout_ms: u32,
        start: u8,
        end: u8,
        maintain: bool,
    ) -> Result<()> {
        let maintain = match self.revision {
            Revision::Mk1 => 0,
            Revision::Mk2 => maintain as u8,
        };
        self.with_device(true, |d| {
            d.write_feature_report(&protocol::server_tickle(
                on as u8, timeout_ms, maintain, start, end,
            ))
        })
    }

    /// Server tickle with every field zero.
    pub fn turn_off(&self) -> Result<()> {
        self.server_tickle(false, 0, 0, 0, false)
    }

    /// Store one step of the on-device pattern. Leaves the queue running.
    pub fn write_pattern_step(&self, fade_ms: u32, color: Rgb, position: u8) -> Result<()> {
        self.with_device(false, |d| {
            d.write_feature_report(&protocol::write_pattern_step(
                fade_ms, color.r, color.g, color.b, position,
            ))
        })
    }

    /// Read the current primary color back from the device.
    pub fn get_current_rgb(&self) -> Result<Rgb> {
        self.with_device(false, |d| {
            let mut buf = [0u8; REPORT_LEN];
            buf[0] = REPORT_ID;
            let n = d.read_feature_report(&mut buf)?;
            if n < 5 {
                return Err(DeviceError::ReadFailed(format!(
                    "GET_REPORT: short report ({n} bytes)"
                )));
            }
            Ok(Rgb::new(buf[2], buf[3], buf[4]))
        })
    }
}

impl<D: Transport + 'static> Drop for Session<D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlinkError;
    use crate::device::mock::{MockBackend, MockDevice};
    use crate::protocol::{CMD_FADE_RGB, CMD_PLAY, CMD_SERVER_TICKLE, CMD_SET_RGB};
    use std::time::Duration;

    fn quiet() -> WorkerConfig {
        WorkerConfig {
            idle_interval: Duration::from_millis(10),
        }
    }

    fn acquire(
        backend: &MockBackend,
        reg: &Arc<BusyRegistry>,
        serial: Option<&str>,
    ) -> Result<Session<MockDevice>> {
        Session::acquire(backend, reg, serial, quiet())
    }

    fn red() -> Action {
        Action::new(Rgb::new(255, 0, 0), 0, 500)
    }

    // ── Acquisition ──

    #[test]
    fn acquire_explicit_serial() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, Some("10000001")).unwrap();
        assert!(s.is_attached());
        assert_eq!(s.identity(), "10000001");
        assert!(reg.is_busy("10000001"));
    }

    #[test]
    fn second_claim_of_same_serial_is_busy() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let _first = acquire(&backend, &reg, Some("10000001")).unwrap();
        let err = acquire(&backend, &reg, Some("10000001")).err().unwrap();
        assert!(matches!(err, BlinkError::Device(DeviceError::Busy(ref s)) if s == "10000001"));
        assert_eq!(backend.open_count(), 1, "busy check happens before open");
    }

    #[test]
    fn release_allows_reacquire() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let mut first = acquire(&backend, &reg, Some("10000001")).unwrap();
        first.release();
        assert!(!reg.is_busy("10000001"));
        assert!(acquire(&backend, &reg, Some("10000001")).is_ok());
    }

    #[test]
    fn drop_releases_and_closes() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        {
            let _s = acquire(&backend, &reg, Some("10000001")).unwrap();
            assert_eq!(backend.close_count(), 0);
        }
        assert_eq!(backend.close_count(), 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn release_is_idempotent() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let mut s = acquire(&backend, &reg, Some("10000001")).unwrap();
        s.release();
        s.release();
        drop(s);
        assert_eq!(backend.close_count(), 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn identity_empty_after_release() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let mut s = acquire(&backend, &reg, Some("10000001")).unwrap();
        s.release();
        assert_eq!(s.identity(), "");
        assert!(matches!(
            s.set_now(Rgb::OFF),
            Err(BlinkError::Device(DeviceError::Detached))
        ));
    }

    #[test]
    fn first_free_skips_claimed() {
        let backend = MockBackend::new(&["10000001", "20000002"]);
        let reg = BusyRegistry::new();
        let a = acquire(&backend, &reg, None).unwrap();
        let b = acquire(&backend, &reg, None).unwrap();
        assert_eq!(a.identity(), "10000001");
        assert_eq!(b.identity(), "20000002");
        let err = acquire(&backend, &reg, None).err().unwrap();
        assert!(matches!(err, BlinkError::Device(DeviceError::NoFreeDevice)));
    }

    #[test]
    fn first_free_with_no_devices() {
        let backend = MockBackend::new(&[]);
        let reg = BusyRegistry::new();
        let err = acquire(&backend, &reg, None).err().unwrap();
        assert!(matches!(err, BlinkError::Device(DeviceError::NotFound)));
    }

    #[test]
    fn open_failure_leaves_registry_clean() {
        let backend = MockBackend::new(&["10000001"]);
        backend.fail_open("10000001");
        let reg = BusyRegistry::new();
        let err = acquire(&backend, &reg, Some("10000001")).err().unwrap();
        assert!(matches!(err, BlinkError::Device(DeviceError::OpenFailed(_))));
        assert!(reg.is_empty());
    }

    #[test]
    fn registries_are_isolated() {
        let backend = MockBackend::new(&["10000001"]);
        let a = BusyRegistry::new();
        let b = BusyRegistry::new();
        let _s = acquire(&backend, &a, Some("10000001")).unwrap();
        assert!(!b.is_busy("10000001"));
    }

    #[test]
    fn revision_follows_serial() {
        let backend = MockBackend::new(&["1FFFFFFF", "20000001"]);
        let reg = BusyRegistry::new();
        let mk1 = acquire(&backend, &reg, Some("1FFFFFFF")).unwrap();
        let mk2 = acquire(&backend, &reg, Some("20000001")).unwrap();
        assert_eq!(mk1.revision(), Revision::Mk1);
        assert_eq!(mk2.revision(), Revision::Mk2);
    }

    // ── Detached ──

    #[test]
    fn failed_acquire_or_detached_is_inert() {
        let backend = MockBackend::new(&[]);
        let reg = BusyRegistry::new();
        let s = Session::acquire_or_detached(&backend, &reg, Some("10000001"), quiet());
        assert!(!s.is_attached());
        assert_eq!(s.identity(), "");
        assert_eq!(s.revision(), Revision::Mk1);
        assert!(s.turn_off().is_err());
        assert!(s.get_current_rgb().is_err());
        s.append(red());
        s.start();
        assert_eq!(s.len(), 1);
        s.clear_all();
        assert!(s.is_empty());
        assert!(reg.is_empty());
    }

    #[test]
    fn dropping_detached_does_not_touch_registry() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let _live = acquire(&backend, &reg, Some("10000001")).unwrap();
        drop(Session::<MockDevice>::detached(&reg));
        assert!(reg.is_busy("10000001"));
    }

    // ── Queue and worker state ──

    #[test]
    fn starts_disabled() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        assert!(!s.is_running());
    }

    #[test]
    fn halt_twice_is_fine() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        s.start();
        s.halt();
        assert!(!s.is_running());
        s.halt();
        assert!(!s.is_running());
    }

    #[test]
    fn clear_all_empties_and_halts() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        s.append(red());
        s.append(red());
        s.start();
        s.clear_all();
        assert!(s.is_empty());
        assert!(!s.is_running());

        // also from an already-empty, disabled state
        s.clear_all();
        assert!(s.is_empty());
        assert!(!s.is_running());
    }

    #[test]
    fn set_at_read_back() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        let blue = Action::new(Rgb::new(0, 0, 255), 10, 10);
        s.append(red());
        s.set_at(0, blue).unwrap();
        assert_eq!(s.actions(), vec![blue]);
        s.set_at(1, red()).unwrap();
        assert_eq!(s.actions(), vec![blue, red()]);
        assert!(s.set_at(5, red()).is_err());
        assert_eq!(s.len(), 2);
        assert_eq!(s.remove_at(0).unwrap(), blue);
        assert!(s.remove_at(3).is_err());
        assert_eq!(s.actions(), vec![red()]);
    }

    // ── Immediate commands ──

    #[test]
    fn set_now_preempts_queue() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        s.append(red());
        s.start();
        s.set_now(Rgb::new(1, 2, 3)).unwrap();
        assert!(s.is_empty());
        assert!(!s.is_running());
        let sets = backend.writes_of(CMD_SET_RGB);
        assert_eq!(sets.last().unwrap().report, protocol::set_rgb(1, 2, 3));
    }

    #[test]
    fn fade_now_mk1_forces_all_leds() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        s.fade_now(300, Rgb::new(5, 6, 7), 2).unwrap();
        let fades = backend.writes_of(CMD_FADE_RGB);
        assert_eq!(fades[0].report, protocol::fade_rgb(300, 5, 6, 7, LED_ALL));
    }

    #[test]
    fn fade_now_mk2_keeps_led() {
        let backend = MockBackend::new(&["20000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        s.append(red());
        s.fade_now(300, Rgb::new(5, 6, 7), 2).unwrap();
        assert!(s.is_empty());
        let fades = backend.writes_of(CMD_FADE_RGB);
        assert_eq!(fades[0].report, protocol::fade_rgb(300, 5, 6, 7, 2));
    }

    #[test]
    fn play_mk1_zeroes_end_and_count() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        s.play(true, 2, 9, 4).unwrap();
        assert_eq!(
            backend.writes_of(CMD_PLAY)[0].report,
            protocol::play(1, 2, 0, 0)
        );
    }

    #[test]
    fn play_mk2_keeps_end_and_count() {
        let backend = MockBackend::new(&["20000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        s.play(true, 2, 9, 4).unwrap();
        assert_eq!(
            backend.writes_of(CMD_PLAY)[0].report,
            protocol::play(1, 2, 9, 4)
        );
    }

    #[test]
    fn server_tickle_mk1_zeroes_maintain() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        s.server_tickle(true, 2000, 1, 3, true).unwrap();
        assert_eq!(
            backend.writes_of(CMD_SERVER_TICKLE)[0].report,
            protocol::server_tickle(1, 2000, 0, 1, 3)
        );
    }

    #[test]
    fn server_tickle_mk2_keeps_maintain_and_clears_queue() {
        let backend = MockBackend::new(&["20000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        s.append(red());
        s.start();
        s.server_tickle(true, 2000, 1, 3, true).unwrap();
        assert!(s.is_empty());
        assert!(!s.is_running());
        assert_eq!(
            backend.writes_of(CMD_SERVER_TICKLE)[0].report,
            protocol::server_tickle(1, 2000, 1, 1, 3)
        );
    }

    #[test]
    fn turn_off_is_all_zero_tickle() {
        let backend = MockBackend::new(&["20000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        s.turn_off().unwrap();
        assert_eq!(
            backend.writes_of(CMD_SERVER_TICKLE)[0].report,
            protocol::server_tickle(0, 0, 0, 0, 0)
        );
    }

    #[test]
    fn pattern_step_leaves_queue_running() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        s.append(red());
        s.start();
        s.write_pattern_step(100, Rgb::new(255, 128, 0), 3).unwrap();
        assert_eq!(s.len(), 1);
        assert!(s.is_running());
        assert!(
            backend
                .writes()
                .iter()
                .any(|w| w.report == protocol::write_pattern_step(100, 255, 128, 0, 3))
        );
    }

    #[test]
    fn write_failure_is_reported() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        backend.set_fail_writes(true);
        let err = s.set_now(Rgb::OFF).unwrap_err();
        assert!(matches!(err, BlinkError::Device(DeviceError::WriteFailed(_))));
    }

    // ── Read-back ──

    #[test]
    fn get_current_rgb_reads_primary() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        s.set_now(Rgb::new(10, 20, 30)).unwrap();
        assert_eq!(s.get_current_rgb().unwrap(), Rgb::new(10, 20, 30));
    }

    #[test]
    fn read_does_not_close_handle() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        s.get_current_rgb().unwrap();
        assert_eq!(backend.close_count(), 0);
        s.set_now(Rgb::new(1, 1, 1)).unwrap();
        assert_eq!(s.get_current_rgb().unwrap(), Rgb::new(1, 1, 1));
    }

    #[test]
    fn read_failure_is_reported() {
        let backend = MockBackend::new(&["10000001"]);
        let reg = BusyRegistry::new();
        let s = acquire(&backend, &reg, None).unwrap();
        backend.set_fail_reads(true);
        let err = s.get_current_rgb().unwrap_err();
        assert!(matches!(err, BlinkError::Device(DeviceError::ReadFailed(_))));
    }
}
