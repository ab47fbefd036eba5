//! Actions and the per-session action queue.

use std::time::Duration;

use serde::Serialize;

use crate::color::Rgb;
use crate::error::{BlinkError, Result};

/// One queued step: fade to the target color, then hold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Action {
    /// Milliseconds the color stays visible after the fade completes.
    pub hold_ms: u32,
    /// Milliseconds to reach the color. 0 = instant.
    pub fade_ms: u32,
    pub primary: Rgb,
    /// Second LED color; ignored on mk1.
    pub secondary: Rgb,
}

impl Action {
    pub fn new(primary: Rgb, fade_ms: u32, hold_ms: u32) -> Self {
        Action {
            hold_ms,
            fade_ms,
            primary,
            secondary: Rgb::OFF,
        }
    }

    pub fn with_secondary(mut self, secondary: Rgb) -> Self {
        self.secondary = secondary;
        self
    }

    /// Time from issuing this action's fade until the next one may start.
    pub fn cycle(&self) -> Duration {
        Duration::from_millis(self.fade_ms as u64 + self.hold_ms as u64)
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::new(Rgb::OFF, 1000, 1000)
    }
}

/// Ordered list of actions with dense indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionQueue {
    actions: Vec<Action>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Overwrite `position`, or append when `position == len`.
    ///
    /// Any other position is rejected and the queue is left untouched.
    pub fn set_at(&mut self, position: usize, action: Action) -> Result<()> {
        let len = self.actions.len();
        match position {
            p if p < len => self.actions[p] = action,
            p if p == len => self.actions.push(action),
            _ => return Err(BlinkError::InvalidQueuePosition { position, len }),
        }
        Ok(())
    }

    /// Erase the entry at `position`; out-of-range positions change nothing.
    pub fn remove_at(&mut self, position: usize) -> Result<Action> {
        if position < self.actions.len() {
            Ok(self.actions.remove(position))
        } else {
            Err(BlinkError::InvalidQueuePosition {
                position,
                len: self.actions.len(),
            })
        }
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn get(&self, position: usize) -> Option<&Action> {
        self.actions.get(position)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn as_slice(&self) -> &[Action] {
        &self.actions
    }
}
