//! Application-wide state and error types for the logger

use core::fmt::{self, Write};

use log::info;
use thiserror_no_std::Error;

use crate::cloud::{SessionState, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRunState {
    Uninitialized,
    WifiConnecting,
    WifiConnected,
    TimeSyncing,
    Authenticating,
    /// Session ready, cycles running
    Logging,
    /// Sign-up failed; idle until reset
    Disabled,
    Error,
}

/// Top-level progress of the device, driven by the main loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppState {
    pub run_state: AppRunState,
    pub time_known: bool,
    pub wifi_connected: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Create a new uninitialized app state
    pub const fn new() -> Self {
        Self {
            run_state: AppRunState::Uninitialized,
            time_known: false,
            wifi_connected: false,
        }
    }

    pub fn set_run_state(&mut self, next: AppRunState) {
        if self.run_state == next {
            return;
        }
        // Disabled is terminal
        if self.run_state == AppRunState::Disabled {
            return;
        }
        info!("Run state {:?} -> {:?}", self.run_state, next);
        self.run_state = next;
        if next == AppRunState::WifiConnected {
            self.wifi_connected = true;
        }
    }

    /// Follow a cloud session transition
    pub fn on_session(&mut self, transition: Transition) {
        let next = match transition.to {
            SessionState::Ready => AppRunState::Logging,
            SessionState::Unauthenticated => AppRunState::Authenticating,
            SessionState::Disabled => AppRunState::Disabled,
        };
        self.set_run_state(next);
    }

    pub const fn is_logging(&self) -> bool {
        matches!(self.run_state, AppRunState::Logging)
    }
}

/// Start-up failures that keep the logger from running at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(heapless::String<64>),
}

/// Lossy conversion into a bounded string, dropping whatever does not fit
pub trait FromTruncated<T> {
    fn from_truncated(value: T) -> Self;
}

impl<const N: usize> FromTruncated<&str> for heapless::String<N> {
    fn from_truncated(value: &str) -> Self {
        let mut out = heapless::String::new();
        let _ = Truncating(&mut out).write_str(value);
        out
    }
}

impl<const N: usize> FromTruncated<fmt::Arguments<'_>> for heapless::String<N> {
    fn from_truncated(value: fmt::Arguments<'_>) -> Self {
        let mut out = heapless::String::new();
        let _ = Truncating(&mut out).write_fmt(value);
        out
    }
}

struct Truncating<'a, const N: usize>(&'a mut heapless::String<N>);

impl<const N: usize> Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}
