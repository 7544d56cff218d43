use crate::clocks::Clocks;
use crate::error::BringupError;
use crate::hw::{PeripheralId, SpiId};
use crate::peripheral::error_permille;


// - constants ----------------------------------------------------------------

pub const RATE_TOLERANCE_PERMILLE: u32 = 30;


// - types --------------------------------------------------------------------

/// Clock polarity and phase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    pub const fn cpol(self) -> bool {
        matches!(self, SpiMode::Mode2 | SpiMode::Mode3)
    }

    pub const fn cpha(self) -> bool {
        matches!(self, SpiMode::Mode1 | SpiMode::Mode3)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameSize {
    Eight,
    Sixteen,
}

/// Chip-select handling
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Nss {
    /// Chip select is a general-purpose output owned by the application
    Software,
    /// NSS pin driven by the peripheral
    HardwareOutput,
}

/// Master mode configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiConfig {
    pub spi: SpiId,
    pub mode: SpiMode,
    pub bit_order: BitOrder,
    pub frame: FrameSize,
    pub nss: Nss,
    pub rate_hz: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiSettings {
    /// SPI_CR1.BR, the clock is divided by `2 << br`
    pub br: u8,
    pub mode: SpiMode,
    pub bit_order: BitOrder,
    pub frame: FrameSize,
    pub nss: Nss,
}

impl SpiSettings {
    pub const fn prescaler(&self) -> u32 {
        2 << self.br
    }
}


// - divisor ------------------------------------------------------------------

/// Picks the baud rate control value whose clock is nearest `rate_hz`.
/// Ties go to the slower clock.
pub const fn baud_rate_control(pclk: u32, rate_hz: u32) -> u8 {
    let mut best = 0;
    let mut best_delta = u32::MAX;
    let mut br = 0;
    while br < 8 {
        let rate = pclk >> (br + 1);
        let delta = if rate > rate_hz { rate - rate_hz } else { rate_hz - rate };
        if delta <= best_delta {
            best = br;
            best_delta = delta;
        }
        br += 1;
    }
    best as u8
}

impl SpiConfig {
    pub const fn settings(&self, clocks: &Clocks) -> Result<SpiSettings, BringupError> {
        let id = PeripheralId::Spi(self.spi);
        let pclk = clocks.pclk(self.spi.domain()).raw();
        if self.rate_hz == 0 {
            return Err(BringupError::DivisorOutOfRange(id));
        }

        let br = baud_rate_control(pclk, self.rate_hz);
        if error_permille(pclk, 2 << br, self.rate_hz) > RATE_TOLERANCE_PERMILLE {
            return Err(BringupError::RateOutOfTolerance(id));
        }

        Ok(SpiSettings {
            br,
            mode: self.mode,
            bit_order: self.bit_order,
            frame: self.frame,
            nss: self.nss,
        })
    }
}


// - tests --------------------------------------------------------------------
