//! blinkloop — exclusive sessions and looping fade queues for blink(1) USB LEDs.

pub mod action;
pub mod color;
pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod worker;

pub use action::{Action, ActionQueue};
pub use color::Rgb;
pub use error::BlinkError;
pub use registry::BusyRegistry;
pub use session::Session;
pub use worker::WorkerConfig;
