// ABOUTME: Reconnect/keepalive state machine for a single connection
//
// Pure bookkeeping with no I/O: tracks the lifecycle state and the attempt
// counter. The connection actor consults it on every event and performs the
// side effects it implies.

use serde::Serialize;
use std::fmt;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Constructed, first connect not issued yet
    Idle,
    /// Open request in flight
    Connecting,
    /// Handshake complete, keepalives flowing
    Open,
    /// Waiting for the reconnect timer
    ReconnectPending,
    /// Attempt budget exhausted; terminal
    Dormant,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::ReconnectPending => "reconnect-pending",
            Self::Dormant => "dormant",
        };
        f.write_str(name)
    }
}

/// Outcome of asking the lifecycle to start a connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectDecision {
    /// Go ahead and open; `attempt` is the counter after incrementing
    Open { attempt: u32 },
    /// The budget is exhausted, nothing may be opened
    Dormant { attempts: u32 },
}

/// State plus attempt accounting for one connection
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ConnectionState,
    attempts: u32,
    max_attempts: u32,
}

impl Lifecycle {
    /// New lifecycle in `Idle` with a zero attempt counter
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            state: ConnectionState::Idle,
            attempts: 0,
            max_attempts,
        }
    }

    /// Count an attempt and decide whether it may proceed
    ///
    /// The counter is incremented first; once it exceeds the maximum the
    /// lifecycle turns `Dormant` and stays there.
    pub fn begin_connect(&mut self) -> ConnectDecision {
        if self.state == ConnectionState::Dormant {
            return ConnectDecision::Dormant {
                attempts: self.attempts,
            };
        }

        self.attempts = self.attempts.saturating_add(1);
        if self.attempts > self.max_attempts {
            self.state = ConnectionState::Dormant;
            return ConnectDecision::Dormant {
                attempts: self.attempts,
            };
        }

        self.state = ConnectionState::Connecting;
        ConnectDecision::Open {
            attempt: self.attempts,
        }
    }

    /// Handshake completed. Returns false if not currently connecting.
    pub fn opened(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Open;
        self.attempts = 0;
        true
    }

    /// Open failed or the session ended. Returns false if there was nothing to lose.
    pub fn lost(&mut self) -> bool {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            return false;
        }
        self.state = ConnectionState::ReconnectPending;
        true
    }

    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_dormant(&self) -> bool {
        self.state == ConnectionState::Dormant
    }
}
