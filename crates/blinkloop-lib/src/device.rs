//! Device transport — traits, revision detection, Linux backend, mock.

use std::fmt;

use serde::Serialize;

// ── Error type ──

/// Device acquisition and report I/O errors.
///
/// String payloads follow the convention **"context: details"** where
/// *context* names the step (e.g. `"USB open"`, `"SET_REPORT"`).
#[derive(Debug)]
pub enum DeviceError {
    NotFound,
    /// The serial is already claimed by a live session.
    Busy(String),
    /// Every enumerated device is claimed.
    NoFreeDevice,
    OpenFailed(String),
    WriteFailed(String),
    ReadFailed(String),
    /// The session holds no device handle.
    Detached,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotFound => write!(f, "blink(1) device not found"),
            DeviceError::Busy(serial) => write!(f, "Device {serial} is already in use"),
            DeviceError::NoFreeDevice => write!(f, "No free blink(1) device"),
            DeviceError::OpenFailed(e) => write!(f, "Failed to open device: {e}"),
            DeviceError::WriteFailed(e) => write!(f, "Write failed: {e}"),
            DeviceError::ReadFailed(e) => write!(f, "Read failed: {e}"),
            DeviceError::Detached => write!(f, "No device attached to this session"),
        }
    }
}

impl std::error::Error for DeviceError {}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Revision ──

/// Hardware generation, derived from the serial number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Revision {
    #[default]
    Mk1,
    Mk2,
}

impl Revision {
    /// Classify by the leading hex digit of the serial: `>= 2` is mk2.
    ///
    /// An empty or non-hex serial is treated as mk1.
    pub fn from_serial(serial: &str) -> Self {
        match serial.chars().next().and_then(|c| c.to_digit(16)) {
            Some(d) if d >= 2 => Revision::Mk2,
            _ => Revision::Mk1,
        }
    }

    /// Number of independently addressable LEDs.
    pub fn led_count(self) -> u8 {
        match self {
            Revision::Mk1 => 1,
            Revision::Mk2 => 2,
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Mk1 => write!(f, "mk1"),
            Revision::Mk2 => write!(f, "mk2"),
        }
    }
}

// ── Traits ──

/// An open device handle. Closed on drop.
pub trait Transport: Send {
    /// Send one feature report (report id in byte 0).
    fn write_feature_report(&self, report: &[u8]) -> Result<()>;
    /// Fetch one feature report into `buf` (`buf[0]` = report id on entry).
    /// Returns the number of bytes read.
    fn read_feature_report(&self, buf: &mut [u8]) -> Result<usize>;
}

/// Device discovery and opening.
pub trait Backend {
    type Device: Transport + 'static;

    fn enumerate(&self) -> Vec<DiscoveredDevice>;
    fn open(&self, serial: &str) -> Result<Self::Device>;
}

/// An enumerated device (not yet opened).
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    /// Bus location, e.g. `usb:001/004`.
    pub path: String,
    pub serial: Option<String>,
}

// ── Linux implementation ──

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::time::Duration;

    use nusb::transfer::{Control, ControlType, Recipient};

    use crate::protocol::{BLINK1_PID, BLINK1_VID};

    const HID_GET_REPORT: u8 = 0x01;
    const HID_SET_REPORT: u8 = 0x09;
    const HID_REPORT_TYPE_FEATURE: u16 = 0x03;
    const HID_INTERFACE: u8 = 0;
    const USB_TIMEOUT_MS: u64 = 1000;

    fn report_control(request: u8, report_id: u8) -> Control {
        Control {
            control_type: ControlType::Class,
            recipient: Recipient::Interface,
            request,
            value: (HID_REPORT_TYPE_FEATURE << 8) | report_id as u16,
            index: HID_INTERFACE as u16,
        }
    }

    fn bus_path(dev: &nusb::DeviceInfo) -> String {
        format!("usb:{:03}/{:03}", dev.bus_number(), dev.device_address())
    }

    pub struct LinuxDevice {
        interface: nusb::Interface,
    }

    impl Transport for LinuxDevice {
        fn write_feature_report(&self, report: &[u8]) -> Result<()> {
            let report_id = report.first().copied().unwrap_or(0);
            self.interface
                .control_out_blocking(
                    report_control(HID_SET_REPORT, report_id),
                    report,
                    Duration::from_millis(USB_TIMEOUT_MS),
                )
                .map_err(|e| DeviceError::WriteFailed(format!("SET_REPORT: {e}")))?;
            Ok(())
        }

        fn read_feature_report(&self, buf: &mut [u8]) -> Result<usize> {
            let report_id = buf.first().copied().unwrap_or(0);
            self.interface
                .control_in_blocking(
                    report_control(HID_GET_REPORT, report_id),
                    buf,
                    Duration::from_millis(USB_TIMEOUT_MS),
                )
                .map_err(|e| DeviceError::ReadFailed(format!("GET_REPORT: {e}")))
        }
    }

    /// blink(1) discovery over `nusb`.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct LinuxBackend;

    impl Backend for LinuxBackend {
        type Device = LinuxDevice;

        fn enumerate(&self) -> Vec<DiscoveredDevice> {
            let Ok(devices) = nusb::list_devices() else {
                return Vec::new();
            };
            devices
                .filter(|dev| dev.vendor_id() == BLINK1_VID && dev.product_id() == BLINK1_PID)
                .map(|dev| DiscoveredDevice {
                    path: bus_path(&dev),
                    serial: dev.serial_number().map(|s| s.to_string()),
                })
                .collect()
        }

        fn open(&self, serial: &str) -> Result<LinuxDevice> {
            let info = nusb::list_devices()
                .map_err(|e| DeviceError::OpenFailed(format!("USB enumeration: {e}")))?
                .filter(|dev| dev.vendor_id() == BLINK1_VID && dev.product_id() == BLINK1_PID)
                .find(|dev| dev.serial_number() == Some(serial))
                .ok_or(DeviceError::NotFound)?;

            let usb_device = info
                .open()
                .map_err(|e| DeviceError::OpenFailed(format!("USB open: {e}")))?;

            // usbhid owns the interface by default
            let interface = usb_device
                .detach_and_claim_interface(HID_INTERFACE)
                .map_err(|e| {
                    DeviceError::OpenFailed(format!("claim interface {HID_INTERFACE}: {e}"))
                })?;

            log::debug!("opened {serial} at {}", bus_path(&info));
            Ok(LinuxDevice { interface })
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux_impl::{LinuxBackend, LinuxDevice};

// ── Stub backend for unsupported platforms ──

/// Placeholder device; never constructed.
#[cfg(not(target_os = "linux"))]
pub struct StubDevice {
    _private: (),
}

#[cfg(not(target_os = "linux"))]
impl Transport for StubDevice {
    fn write_feature_report(&self, _report: &[u8]) -> Result<()> {
        Err(DeviceError::WriteFailed("unsupported platform".into()))
    }
    fn read_feature_report(&self, _buf: &mut [u8]) -> Result<usize> {
        Err(DeviceError::ReadFailed("unsupported platform".into()))
    }
}

/// Backend that finds nothing. Enables compilation and `cargo test` on
/// unsupported hosts.
#[cfg(not(target_os = "linux"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct StubBackend;

#[cfg(not(target_os = "linux"))]
impl Backend for StubBackend {
    type Device = StubDevice;

    fn enumerate(&self) -> Vec<DiscoveredDevice> {
        Vec::new()
    }
    fn open(&self, _serial: &str) -> Result<StubDevice> {
        Err(DeviceError::NotFound)
    }
}

/// Concrete backend for the current platform.
#[cfg(target_os = "linux")]
pub type PlatformBackend = LinuxBackend;
#[cfg(not(target_os = "linux"))]
pub type PlatformBackend = StubBackend;

/// Concrete device type for the current platform.
pub type PlatformDevice = <PlatformBackend as Backend>::Device;

/// Enumerate all connected blink(1) devices.
///
/// On unsupported platforms, always returns an empty list.
pub fn enumerate_devices() -> Vec<DiscoveredDevice> {
    PlatformBackend::default().enumerate()
}

// ── Mock backend for testing ──

/// In-memory backend for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::time::Instant;

    use crate::protocol::{CMD_FADE_RGB, CMD_SET_RGB, REPORT_ID};

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// One recorded `write_feature_report` call.
    #[derive(Debug, Clone)]
    pub struct Written {
        pub at: Instant,
        pub serial: String,
        pub report: Vec<u8>,
    }

    impl Written {
        /// ASCII command letter (byte 1).
        pub fn command(&self) -> u8 {
            self.report.get(1).copied().unwrap_or(0)
        }
    }

    /// State shared between a `MockBackend` and every device it opened.
    #[derive(Default)]
    struct Shared {
        log: Mutex<Vec<Written>>,
        fail_open: Mutex<HashSet<String>>,
        fail_writes: AtomicBool,
        fail_reads: AtomicBool,
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    /// Cloning yields a handle to the same recorded state.
    #[derive(Clone, Default)]
    pub struct MockBackend {
        serials: Vec<String>,
        shared: Arc<Shared>,
    }

    impl MockBackend {
        pub fn new(serials: &[&str]) -> Self {
            MockBackend {
                serials: serials.iter().map(|s| s.to_string()).collect(),
                shared: Arc::default(),
            }
        }

        /// Every report written so far, across all devices.
        pub fn writes(&self) -> Vec<Written> {
            lock(&self.shared.log).clone()
        }

        /// Reports written so far with the given command letter.
        pub fn writes_of(&self, command: u8) -> Vec<Written> {
            self.writes()
                .into_iter()
                .filter(|w| w.command() == command)
                .collect()
        }

        /// Make `open(serial)` fail.
        pub fn fail_open(&self, serial: &str) {
            lock(&self.shared.fail_open).insert(serial.to_string());
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.shared.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_reads(&self, fail: bool) {
            self.shared.fail_reads.store(fail, Ordering::SeqCst);
        }

        pub fn open_count(&self) -> usize {
            self.shared.opened.load(Ordering::SeqCst)
        }

        pub fn close_count(&self) -> usize {
            self.shared.closed.load(Ordering::SeqCst)
        }
    }

    pub struct MockDevice {
        serial: String,
        shared: Arc<Shared>,
        /// Last color set or faded to, echoed by reads.
        color: Mutex<[u8; 3]>,
    }

    impl Transport for MockDevice {
        fn write_feature_report(&self, report: &[u8]) -> Result<()> {
            if self.shared.fail_writes.load(Ordering::SeqCst) {
                return Err(DeviceError::WriteFailed(
                    "mock: write failure injected".into(),
                ));
            }
            if matches!(report.get(1), Some(&CMD_SET_RGB) | Some(&CMD_FADE_RGB))
                && report.len() >= 5
            {
                lock(&self.color).copy_from_slice(&report[2..5]);
            }
            lock(&self.shared.log).push(Written {
                at: Instant::now(),
                serial: self.serial.clone(),
                report: report.to_vec(),
            });
            Ok(())
        }

        fn read_feature_report(&self, buf: &mut [u8]) -> Result<usize> {
            if self.shared.fail_reads.load(Ordering::SeqCst) {
                return Err(DeviceError::ReadFailed("mock: read failure injected".into()));
            }
            if buf.len() < 5 {
                return Err(DeviceError::ReadFailed("mock: buffer too short".into()));
            }
            let color = *lock(&self.color);
            buf[0] = REPORT_ID;
            buf[1] = b'r';
            buf[2..5].copy_from_slice(&color);
            Ok(buf.len())
        }
    }

    impl Drop for MockDevice {
        fn drop(&mut self) {
            self.shared.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Backend for MockBackend {
        type Device = MockDevice;

        fn enumerate(&self) -> Vec<DiscoveredDevice> {
            self.serials
                .iter()
                .enumerate()
                .map(|(i, s)| DiscoveredDevice {
                    path: format!("mock://{i}"),
                    serial: Some(s.clone()),
                })
                .collect()
        }

        fn open(&self, serial: &str) -> Result<MockDevice> {
            if !self.serials.iter().any(|s| s == serial) {
                return Err(DeviceError::NotFound);
            }
            if lock(&self.shared.fail_open).contains(serial) {
                return Err(DeviceError::OpenFailed(format!(
                    "mock: open failure injected for {serial}"
                )));
            }
            self.shared.opened.fetch_add(1, Ordering::SeqCst);
            Ok(MockDevice {
                serial: serial.to_string(),
                shared: Arc::clone(&self.shared),
                color: Mutex::new([0; 3]),
            })
        }
    }
}
