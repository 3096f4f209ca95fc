//! Shared primitive types used across the entire pipeline.

/// A stable, externally assigned parlor identifier.
pub type StoreId = String;

/// A machine model identifier from the machine master.
pub type MachineId = String;

/// An event identifier from the event master.
pub type EventId = String;
