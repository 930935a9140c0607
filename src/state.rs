//! Explicit state machine for the link lifecycle.
//!
//! Every operation advances the machine along the allowed transitions below.
//! Operations attempted out of order, such as subscribing before discovery
//! has completed, are rejected with [`Error::IllegalTransition`].
//!
//! ```text
//! Idle -> Scanning -> Found -> Connecting -> Connected -> Receiving
//!           |           |          |             |            |
//!           v           v          +------> Disconnected <----+
//!          Idle        Idle
//! ```

use std::fmt;
use std::sync::Mutex;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Scanning,
    Found,
    Connecting,
    Connected,
    Receiving,
    Disconnected,
}

impl LinkState {
    fn can_advance(self, next: LinkState) -> bool {
        use LinkState::*;

        matches!(
            (self, next),
            (Idle, Scanning)
                | (Scanning, Found)
                | (Scanning, Idle)
                | (Found, Connecting)
                | (Found, Idle)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Receiving)
                | (Connected, Disconnected)
                | (Receiving, Disconnected)
        )
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkState::Idle => "idle",
            LinkState::Scanning => "scanning",
            LinkState::Found => "found",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Receiving => "receiving",
            LinkState::Disconnected => "disconnected",
        })
    }
}

#[derive(Debug)]
pub(crate) struct LinkStateMachine {
    state: Mutex<LinkState>,
}

impl LinkStateMachine {
    pub(crate) fn new(initial: LinkState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    pub(crate) fn current(&self) -> LinkState {
        *self.state.lock().unwrap()
    }

    /// Advances to `next`, or fails without changing state when the
    /// transition is not allowed.
    pub(crate) fn advance(&self, next: LinkState) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();

        if state.can_advance(next) {
            *state = next;
            Ok(())
        } else {
            Err(Error::IllegalTransition {
                from: *state,
                to: next,
            })
        }
    }

    /// Restores the state a failed operation started from. Error-path use
    /// only; normal progress goes through [`LinkStateMachine::advance`].
    pub(crate) fn revert(&self, to: LinkState) {
        *self.state.lock().unwrap() = to;
    }

    /// Marks the link disconnected from whatever state it is in. Returns
    /// false when it already was, so the disconnect callback cannot fire
    /// a second time for the same session.
    pub(crate) fn mark_disconnected(&self) -> bool {
        let mut state = self.state.lock().unwrap();

        if *state == LinkState::Disconnected {
            false
        } else {
            *state = LinkState::Disconnected;
            true
        }
    }
}
