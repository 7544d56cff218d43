//! Capability interface to the peripheral-register layer.
//!
//! The bring-up sequence only ever talks to the chip through these traits.
//! On the target they are implemented over the device PAC (see
//! [`stm32f1`](crate::stm32f1)), on the host by the recording fake used in
//! the unit tests.

use core::convert::Infallible;

use crate::clocks::{AhbPrescaler, ApbPrescaler, PllConfig};
use crate::i2c::I2cSettings;
use crate::pins::PinConfig;
use crate::spi::SpiSettings;
use crate::usart::UsartSettings;


// - identifiers --------------------------------------------------------------

/// GPIO port
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    A,
    B,
    C,
    D,
    E,
}

impl Port {
    pub const fn index(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsartId {
    Usart1,
    Usart2,
    Usart3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cId {
    I2c1,
    I2c2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiId {
    Spi1,
    Spi2,
}

/// Names one communication peripheral instance, used in error reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeripheralId {
    Usart(UsartId),
    I2c(I2cId),
    Spi(SpiId),
}

/// Bus domain a peripheral is clocked from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusDomain {
    Apb1,
    Apb2,
}

impl UsartId {
    pub const fn domain(self) -> BusDomain {
        match self {
            UsartId::Usart1 => BusDomain::Apb2,
            UsartId::Usart2 | UsartId::Usart3 => BusDomain::Apb1,
        }
    }
}

impl I2cId {
    pub const fn domain(self) -> BusDomain {
        BusDomain::Apb1
    }
}

impl SpiId {
    pub const fn domain(self) -> BusDomain {
        match self {
            SpiId::Spi1 => BusDomain::Apb2,
            SpiId::Spi2 => BusDomain::Apb1,
        }
    }
}

/// A peripheral clock gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusGate {
    Gpio(Port),
    Usart(UsartId),
    I2c(I2cId),
    Spi(SpiId),
}

/// Oscillators the clock tree can run from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OscillatorKind {
    Hsi,
    Hse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SysclkSource {
    Hsi,
    Hse,
    Pll,
}


// - traits -------------------------------------------------------------------

/// Reset and clock control.
pub trait ClockControl {
    fn start_oscillator(&mut self, osc: OscillatorKind);
    fn oscillator_ready(&self, osc: OscillatorKind) -> bool;

    fn set_flash_wait_states(&mut self, wait_states: u8);
    fn set_prescalers(&mut self, ahb: AhbPrescaler, apb1: ApbPrescaler, apb2: ApbPrescaler);

    fn stop_pll(&mut self);
    /// Programs PLL source and multiplier. The PLL must be stopped.
    fn configure_pll(&mut self, pll: &PllConfig);
    fn start_pll(&mut self);
    fn pll_locked(&self) -> bool;

    fn select_sysclk(&mut self, source: SysclkSource);
    fn sysclk_source(&self) -> SysclkSource;
}

/// Peripheral clock gating.
pub trait BusControl {
    fn enable_gate(&mut self, gate: BusGate);
}

/// GPIO configuration and general-purpose I/O.
pub trait GpioControl {
    fn configure_pin(&mut self, port: Port, pin: u8, config: PinConfig);
    fn set_pin(&mut self, port: Port, pin: u8, high: bool);
    fn pin_is_high(&self, port: Port, pin: u8) -> bool;
}

/// Communication peripheral programming and the USART transmit path.
pub trait PeripheralControl {
    /// Programs the protocol registers and enables the peripheral.
    fn program_usart(&mut self, usart: UsartId, settings: &UsartSettings);
    fn program_i2c(&mut self, i2c: I2cId, settings: &I2cSettings);
    fn program_spi(&mut self, spi: SpiId, settings: &SpiSettings);

    fn usart_write(&mut self, usart: UsartId, byte: u8) -> nb::Result<(), Infallible>;
    /// Completes when the last written byte has left the shift register.
    fn usart_flush(&mut self, usart: UsartId) -> nb::Result<(), Infallible>;
}

/// Everything bring-up needs from the chip.
pub trait Hardware: ClockControl + BusControl + GpioControl + PeripheralControl {}

impl<T> Hardware for T where T: ClockControl + BusControl + GpioControl + PeripheralControl {}
