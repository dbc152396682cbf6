// src/handler/state.rs

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// `Unprovisioned -> Provisioned -> Validated -> Serving -> CleanedUp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandlerState {
    Unprovisioned = 0,
    Provisioned = 1,
    Validated = 2,
    Serving = 3,
    CleanedUp = 4,
}

impl HandlerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => HandlerState::Unprovisioned,
            1 => HandlerState::Provisioned,
            2 => HandlerState::Validated,
            3 => HandlerState::Serving,
            _ => HandlerState::CleanedUp,
        }
    }

    pub fn can_serve(self) -> bool {
        matches!(self, HandlerState::Validated | HandlerState::Serving)
    }
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandlerState::Unprovisioned => "unprovisioned",
            HandlerState::Provisioned => "provisioned",
            HandlerState::Validated => "validated",
            HandlerState::Serving => "serving",
            HandlerState::CleanedUp => "cleaned-up",
        };
        f.write_str(s)
    }
}

/// Lock-free holder so `serve` and `cleanup` can run on `&self`.
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: HandlerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> HandlerState {
        HandlerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: HandlerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move `from -> to`; `false` if the current state was not `from`.
    pub(crate) fn advance(&self, from: HandlerState, to: HandlerState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Unconditionally store `state`, returning the previous one.
    pub(crate) fn replace(&self, state: HandlerState) -> HandlerState {
        HandlerState::from_u8(self.0.swap(state as u8, Ordering::SeqCst))
    }
}
