//! Pin multiplexing
//!
//! Every physical pin the board uses is described by one [`PinAssignment`].
//! The table is checked for conflicts at build time:
//!
//! ```compile_fail
//! use tanuki_bsp::hw::{Port, SpiId};
//! use tanuki_bsp::pins::{self, Electrical, Level, PinAssignment, PinRole, SpiSignal};
//!
//! const PINS: &[PinAssignment] = &[
//!     PinAssignment::new(Port::B, 5, PinRole::Output(Level::Low), Electrical::PUSH_PULL_2MHZ),
//!     PinAssignment::new(Port::B, 5, PinRole::Spi(SpiId::Spi1, SpiSignal::Mosi),
//!                        Electrical::PUSH_PULL_50MHZ),
//! ];
//! const _: () = assert!(pins::check(PINS).is_ok(), "pin table has conflicts");
//! ```

use crate::error::BringupError;
use crate::hw::{GpioControl, I2cId, Port, SpiId, UsartId};


// - types --------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsartSignal {
    Tx,
    Rx,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cSignal {
    Scl,
    Sda,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiSignal {
    Sck,
    Miso,
    Mosi,
}

/// What a pin is used for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinRole {
    Analog,
    /// General-purpose input
    Input,
    /// General-purpose output, driven to the given level before the
    /// pin is switched to output mode
    Output(Level),
    Usart(UsartId, UsartSignal),
    I2c(I2cId, I2cSignal),
    Spi(SpiId, SpiSignal),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputType {
    PushPull,
    OpenDrain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    None,
    Up,
    Down,
}

/// Output slew rate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Speed {
    Mhz2,
    Mhz10,
    Mhz50,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Electrical {
    pub output: OutputType,
    pub pull: Pull,
    pub speed: Speed,
}

impl Electrical {
    pub const PUSH_PULL_2MHZ: Self = Self { output: OutputType::PushPull, pull: Pull::None, speed: Speed::Mhz2 };
    pub const PUSH_PULL_50MHZ: Self = Self { output: OutputType::PushPull, pull: Pull::None, speed: Speed::Mhz50 };
    pub const OPEN_DRAIN_2MHZ: Self = Self { output: OutputType::OpenDrain, pull: Pull::None, speed: Speed::Mhz2 };
    pub const FLOATING: Self = Self { output: OutputType::PushPull, pull: Pull::None, speed: Speed::Mhz2 };
    pub const PULL_UP: Self = Self { output: OutputType::PushPull, pull: Pull::Up, speed: Speed::Mhz2 };

    const fn key(&self) -> u8 {
        (self.output as u8) << 4 | (self.pull as u8) << 2 | self.speed as u8
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    Analog,
    Input,
    Output,
    Alternate,
}

/// Register-level pin configuration handed to [`GpioControl`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinConfig {
    pub mode: PinMode,
    pub output: OutputType,
    pub pull: Pull,
    pub speed: Speed,
}

impl PinConfig {
    /// GPIOx_CRL/CRH CNF[1:0]:MODE[1:0] nibble
    pub const fn cnf_mode(&self) -> u32 {
        let mode = match self.speed {
            Speed::Mhz10 => 0b01,
            Speed::Mhz2 => 0b10,
            Speed::Mhz50 => 0b11,
        };
        match self.mode {
            PinMode::Analog => 0b0000,
            PinMode::Input => match self.pull {
                Pull::None => 0b0100,
                Pull::Up | Pull::Down => 0b1000,
            },
            PinMode::Output => match self.output {
                OutputType::PushPull => mode,
                OutputType::OpenDrain => 0b0100 | mode,
            },
            PinMode::Alternate => match self.output {
                OutputType::PushPull => 0b1000 | mode,
                OutputType::OpenDrain => 0b1100 | mode,
            },
        }
    }
}

/// One physical pin and its role on the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinAssignment {
    pub port: Port,
    pub pin: u8,
    pub role: PinRole,
    pub electrical: Electrical,
}

impl PinAssignment {
    pub const fn new(port: Port, pin: u8, role: PinRole, electrical: Electrical) -> Self {
        Self { port, pin, role, electrical }
    }

    pub const fn config(&self) -> PinConfig {
        let mode = match self.role {
            PinRole::Analog => PinMode::Analog,
            PinRole::Input => PinMode::Input,
            PinRole::Output(_) => PinMode::Output,
            // peripheral inputs stay in input mode, the peripheral samples the pad
            PinRole::Usart(_, UsartSignal::Rx) | PinRole::Spi(_, SpiSignal::Miso) => PinMode::Input,
            PinRole::Usart(..) | PinRole::I2c(..) | PinRole::Spi(..) => PinMode::Alternate,
        };
        PinConfig {
            mode,
            output: self.electrical.output,
            pull: self.electrical.pull,
            speed: self.electrical.speed,
        }
    }

    const fn role_key(&self) -> u16 {
        match self.role {
            PinRole::Analog => 0x000,
            PinRole::Input => 0x100,
            PinRole::Output(level) => 0x200 | level as u16,
            PinRole::Usart(usart, signal) => 0x300 | (usart as u16) << 4 | signal as u16,
            PinRole::I2c(i2c, signal) => 0x400 | (i2c as u16) << 4 | signal as u16,
            PinRole::Spi(spi, signal) => 0x500 | (spi as u16) << 4 | signal as u16,
        }
    }

    const fn same_pin(&self, other: &PinAssignment) -> bool {
        self.port as u8 == other.port as u8 && self.pin == other.pin
    }

    const fn agrees_with(&self, other: &PinAssignment) -> bool {
        self.role_key() == other.role_key() && self.electrical.key() == other.electrical.key()
    }
}


// - static checks ------------------------------------------------------------

/// Returns the first pin claimed twice with a different role or electrical
/// setup. Repeating an identical assignment is harmless.
pub const fn find_conflict(pins: &[PinAssignment]) -> Option<(Port, u8)> {
    let mut i = 0;
    while i < pins.len() {
        let mut j = i + 1;
        while j < pins.len() {
            if pins[i].same_pin(&pins[j]) && !pins[i].agrees_with(&pins[j]) {
                return Some((pins[i].port, pins[i].pin));
            }
            j += 1;
        }
        i += 1;
    }
    None
}

/// Validates a pin table: pin numbers exist and no pin has two roles.
pub const fn check(pins: &[PinAssignment]) -> Result<(), BringupError> {
    let mut i = 0;
    while i < pins.len() {
        if pins[i].pin > 15 {
            return Err(BringupError::InvalidPin { port: pins[i].port, pin: pins[i].pin });
        }
        i += 1;
    }
    match find_conflict(pins) {
        Some((port, pin)) => Err(BringupError::PinConflict { port, pin }),
        None => Ok(()),
    }
}

/// Looks up the assignment for a pin.
pub fn find(pins: &[PinAssignment], port: Port, pin: u8) -> Option<&PinAssignment> {
    pins.iter().find(|p| p.port == port && p.pin == pin)
}


// - apply --------------------------------------------------------------------

/// Multiplexes every pin to its role. The owning GPIO ports must be clocked.
pub fn apply<G: GpioControl>(gpio: &mut G, pins: &[PinAssignment]) {
    for assignment in pins {
        match (assignment.role, assignment.electrical.pull) {
            // output latch first, so the pin comes up at its idle level
            (PinRole::Output(level), _) => gpio.set_pin(assignment.port, assignment.pin, level == Level::High),
            // on this chip input pulls are selected through the output latch
            (_, Pull::Up) => gpio.set_pin(assignment.port, assignment.pin, true),
            (_, Pull::Down) => gpio.set_pin(assignment.port, assignment.pin, false),
            _ => (),
        }
        gpio.configure_pin(assignment.port, assignment.pin, assignment.config());
    }
    log::debug!("pins: {} assignments applied", pins.len());
}


// - tests --------------------------------------------------------------------
