use thiserror::Error;

use crate::hw::{PeripheralId, Port};


/// Which clock tree wait ran out of polls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockStage {
    OscillatorReady,
    PllLock,
    SysclkSwitch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockDomain {
    Hse,
    PllInput,
    PllOutput,
    Sysclk,
    Hclk,
    Pclk1,
    Pclk2,
}

/// Bring-up failures.
///
/// Only `ClockLockTimeout` can happen at runtime, everything else is caught
/// while const-evaluating the board descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BringupError {
    #[error("clock did not stabilize: {0:?}")]
    ClockLockTimeout(ClockStage),
    #[error("clock out of range: {0:?}")]
    ClockOutOfRange(ClockDomain),
    #[error("invalid pll parameters")]
    InvalidPll,
    #[error("clock poll budget must be at least one poll")]
    InvalidPollBudget,
    #[error("conflicting roles on P{port:?}{pin}")]
    PinConflict { port: Port, pin: u8 },
    #[error("P{port:?}{pin} does not exist")]
    InvalidPin { port: Port, pin: u8 },
    #[error("{0:?} is configured twice")]
    DuplicatePeripheral(PeripheralId),
    #[error("invalid own address for {0:?}")]
    InvalidAddress(PeripheralId),
    #[error("divisor out of range for {0:?}")]
    DivisorOutOfRange(PeripheralId),
    #[error("rate out of tolerance for {0:?}")]
    RateOutOfTolerance(PeripheralId),
    #[error("log sink already bound")]
    LogSinkAlreadyBound,
    #[error("log usart is not in the peripheral table")]
    LogSinkNotConfigured,
    #[error("log usart has its transmitter disabled")]
    LogSinkNotTransmitting,
}

/// General-purpose I/O misuse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinError {
    #[error("P{port:?}{pin} is not assigned")]
    Unassigned { port: Port, pin: u8 },
    #[error("P{port:?}{pin} is not a general-purpose output")]
    NotAnOutput { port: Port, pin: u8 },
    #[error("P{port:?}{pin} is not a general-purpose input")]
    NotAnInput { port: Port, pin: u8 },
}
