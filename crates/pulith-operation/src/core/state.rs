use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Life-cycle state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationState {
    Pending = 0,
    Connecting = 1,
    Receiving = 2,
    Processing = 3,
    Succeeded = 4,
    Failed = 5,
    Cancelled = 6,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationState::Succeeded | OperationState::Failed | OperationState::Cancelled
        )
    }

    /// Connecting, receiving or processing.
    pub fn is_executing(self) -> bool {
        matches!(
            self,
            OperationState::Connecting | OperationState::Receiving | OperationState::Processing
        )
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => OperationState::Pending,
            1 => OperationState::Connecting,
            2 => OperationState::Receiving,
            3 => OperationState::Processing,
            4 => OperationState::Succeeded,
            5 => OperationState::Failed,
            _ => OperationState::Cancelled,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationState::Pending => "pending",
            OperationState::Connecting => "connecting",
            OperationState::Receiving => "receiving",
            OperationState::Processing => "processing",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
            OperationState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Events that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Admitted by the I/O executor.
    Start,
    /// Response headers arrived and passed validation.
    ResponseAccepted,
    /// Body complete, work transform dispatched.
    EnterProcessing,
    Succeed,
    Fail,
    Cancel,
}

/// The transition table. `None` means the event is not honored in `state`.
///
/// Terminal states absorb every event.
pub fn transition(state: OperationState, event: Transition) -> Option<OperationState> {
    use OperationState::*;
    use Transition::*;

    match (state, event) {
        (Pending, Start) => Some(Connecting),
        (Connecting, ResponseAccepted) => Some(Receiving),
        (Receiving, EnterProcessing) => Some(Processing),
        (Receiving | Processing, Succeed) => Some(Succeeded),
        (Connecting | Receiving | Processing, Fail) => Some(Failed),
        (Pending | Connecting | Receiving | Processing, Cancel) => Some(Cancelled),
        _ => None,
    }
}

/// Operation state readable from any thread.
///
/// Writes go through [`transition`], so the state can only move forward.
#[derive(Debug)]
pub struct AtomicState(AtomicU8);

impl AtomicState {
    pub fn new() -> Self {
        Self(AtomicU8::new(OperationState::Pending as u8))
    }

    pub fn load(&self) -> OperationState {
        OperationState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Apply `event`. Returns the new state, or the unchanged current state
    /// when the event was discarded.
    pub fn apply(&self, event: Transition) -> Result<OperationState, OperationState> {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let state = OperationState::from_u8(current);
            let next = transition(state, event).ok_or(state)?;
            match self
                .0
                .compare_exchange_weak(current, next as u8, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(next),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for AtomicState {
    fn default() -> Self {
        Self::new()
    }
}
