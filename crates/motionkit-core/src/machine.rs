//! Machine operational state and the observable value store
//!
//! The value store is the typed home of live device telemetry: operational
//! state, available buffer depth, spindle state and reported velocity. Every
//! id must be declared with a default before first use; updates are applied
//! only from a session's receive path and notify listeners synchronously
//! through the session event bus.

use crate::error::{ControllerError, Result};
use crate::events::{SessionEvent, SessionEventBus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Operational state of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MachineState {
    /// State not yet reported by the device
    #[default]
    Undefined,
    /// Idle, ready to accept a program
    Ready,
    /// Executing motion
    MotionRunning,
    /// Feed hold active
    MotionHold,
    /// Program finished (M2)
    ProgramEnd,
    /// Program stopped (M0)
    ProgramStop,
    /// Homing cycle in progress
    Homing,
    /// Alarm lockout
    Alarm,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MachineState::Undefined => "Undefined",
            MachineState::Ready => "Ready",
            MachineState::MotionRunning => "Running",
            MachineState::MotionHold => "Hold",
            MachineState::ProgramEnd => "Program end",
            MachineState::ProgramStop => "Program stop",
            MachineState::Homing => "Homing",
            MachineState::Alarm => "Alarm",
        };
        write!(f, "{}", label)
    }
}

/// Spindle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpindleState {
    /// Spindle state not yet reported
    #[default]
    Unknown,
    /// Spindle running
    On,
    /// Spindle stopped
    Off,
}

/// Identifiers of the declared machine values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineValueId {
    /// Operational state
    State,
    /// Commands the device can still accept
    AvailableBuffer,
    /// Spindle state
    Spindle,
    /// Reported velocity, units per minute
    Velocity,
}

impl fmt::Display for MachineValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MachineValueId::State => "state",
            MachineValueId::AvailableBuffer => "available-buffer",
            MachineValueId::Spindle => "spindle",
            MachineValueId::Velocity => "velocity",
        };
        write!(f, "{}", label)
    }
}

/// A typed machine value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MachineValue {
    /// Operational state value
    State(MachineState),
    /// Integer value
    Integer(i64),
    /// Decimal value
    Decimal(f64),
    /// Spindle state value
    Spindle(SpindleState),
}

impl MachineValue {
    /// Read as operational state, if that is what this value holds
    pub fn as_state(&self) -> Option<MachineState> {
        match self {
            MachineValue::State(state) => Some(*state),
            _ => None,
        }
    }

    /// Read as integer, if that is what this value holds
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            MachineValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Read as decimal, if that is what this value holds
    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            MachineValue::Decimal(value) => Some(*value),
            _ => None,
        }
    }

    /// Read as spindle state, if that is what this value holds
    pub fn as_spindle(&self) -> Option<SpindleState> {
        match self {
            MachineValue::Spindle(state) => Some(*state),
            _ => None,
        }
    }

    fn same_variant(&self, other: &MachineValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Observable, typed key/value store for live device telemetry
///
/// Writers are confined to the session receive path; reads may happen from
/// any thread and observe the latest applied value.
pub struct MachineValueStore {
    values: RwLock<HashMap<MachineValueId, MachineValue>>,
    events: Arc<SessionEventBus>,
}

impl MachineValueStore {
    /// Create an empty store publishing to the given session bus
    pub fn new(events: Arc<SessionEventBus>) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Declare a value id with its default
    ///
    /// Must be called once per id at session start, before any `get` or
    /// `set`. Re-declaring an id resets it to the new default.
    pub fn declare(&self, id: MachineValueId, default: MachineValue) {
        self.values.write().insert(id, default);
    }

    /// Read the current value
    pub fn get(&self, id: MachineValueId) -> Result<MachineValue> {
        self.values
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| ControllerError::UndeclaredValue { id: id.to_string() }.into())
    }

    /// Apply a confirmed update and notify listeners synchronously
    pub fn set(&self, id: MachineValueId, value: MachineValue) -> Result<()> {
        {
            let mut values = self.values.write();
            let slot = values
                .get_mut(&id)
                .ok_or(ControllerError::UndeclaredValue { id: id.to_string() })?;
            if !slot.same_variant(&value) {
                return Err(ControllerError::ValueTypeMismatch { id: id.to_string() }.into());
            }
            *slot = value.clone();
        }
        self.events
            .publish(SessionEvent::MachineValueChanged { id, value });
        Ok(())
    }

    /// Current operational state, `Undefined` if never reported
    pub fn machine_state(&self) -> MachineState {
        self.get(MachineValueId::State)
            .ok()
            .and_then(|value| value.as_state())
            .unwrap_or_default()
    }

    /// True exactly when a new program may start streaming
    pub fn ready_for_streaming(&self) -> bool {
        matches!(
            self.machine_state(),
            MachineState::Ready | MachineState::ProgramEnd | MachineState::ProgramStop
        )
    }
}

impl fmt::Debug for MachineValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineValueStore")
            .field("values", &self.values.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventFilter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> MachineValueStore {
        MachineValueStore::new(Arc::new(SessionEventBus::new()))
    }

    #[test]
    fn test_undeclared_value_is_an_error() {
        let store = store();
        assert!(store.get(MachineValueId::Velocity).is_err());
        assert!(store
            .set(MachineValueId::Velocity, MachineValue::Decimal(100.0))
            .is_err());
    }

    #[test]
    fn test_declare_then_set_and_get() {
        let store = store();
        store.declare(MachineValueId::AvailableBuffer, MachineValue::Integer(28));
        assert_eq!(
            store.get(MachineValueId::AvailableBuffer).unwrap(),
            MachineValue::Integer(28)
        );

        store
            .set(MachineValueId::AvailableBuffer, MachineValue::Integer(12))
            .unwrap();
        assert_eq!(
            store.get(MachineValueId::AvailableBuffer).unwrap(),
            MachineValue::Integer(12)
        );
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let store = store();
        store.declare(MachineValueId::Spindle, MachineValue::Spindle(SpindleState::Unknown));
        assert!(store
            .set(MachineValueId::Spindle, MachineValue::Integer(1))
            .is_err());
    }

    #[test]
    fn test_set_notifies_listeners_synchronously() {
        let events = Arc::new(SessionEventBus::new());
        let store = MachineValueStore::new(events.clone());
        store.declare(MachineValueId::State, MachineValue::State(MachineState::Undefined));

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        events.subscribe(EventFilter::All, move |event| {
            if matches!(event, SessionEvent::MachineValueChanged { .. }) {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        store
            .set(MachineValueId::State, MachineValue::State(MachineState::Ready))
            .unwrap();
        // Listener ran on this thread, before set returned.
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ready_for_streaming_predicate() {
        let store = store();
        store.declare(MachineValueId::State, MachineValue::State(MachineState::Undefined));
        assert!(!store.ready_for_streaming());

        for state in [
            MachineState::Ready,
            MachineState::ProgramEnd,
            MachineState::ProgramStop,
        ] {
            store
                .set(MachineValueId::State, MachineValue::State(state))
                .unwrap();
            assert!(store.ready_for_streaming(), "{state} should allow streaming");
        }

        store
            .set(MachineValueId::State, MachineValue::State(MachineState::Alarm))
            .unwrap();
        assert!(!store.ready_for_streaming());
    }
}
