use crate::clocks::Clocks;
use crate::error::BringupError;
use crate::hw::{I2cId, PeripheralId};
use crate::peripheral::{div_nearest, error_permille};


// - constants ----------------------------------------------------------------

pub const SCL_TOLERANCE_PERMILLE: u32 = 30;

pub const STANDARD_MODE_MAX_HZ: u32 = 100_000;
pub const FAST_MODE_MAX_HZ: u32 = 400_000;

/// Peripheral clock range accepted in I2C_CR2.FREQ, in MHz
pub const FREQ_MIN_MHZ: u32 = 2;
pub const FREQ_MAX_MHZ: u32 = 36;

pub const CCR_MAX: u32 = 0xfff;


// - types --------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cMode {
    Standard,
    /// Fast mode with a 2:1 low/high duty cycle
    Fast,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressWidth {
    Seven,
    Ten,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cConfig {
    pub i2c: I2cId,
    pub mode: I2cMode,
    pub scl_hz: u32,
    pub own_address: u16,
    pub address_width: AddressWidth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cSettings {
    /// I2C_CR2.FREQ
    pub freq_mhz: u8,
    /// I2C_CCR.CCR
    pub ccr: u16,
    pub trise: u8,
    pub mode: I2cMode,
    pub own_address: u16,
    pub address_width: AddressWidth,
}

impl I2cSettings {
    pub const fn scl_hz(&self, pclk1: u32) -> u32 {
        let periods = match self.mode {
            I2cMode::Standard => 2,
            I2cMode::Fast => 3,
        };
        div_nearest(pclk1, periods * self.ccr as u32)
    }
}

impl I2cConfig {
    pub const fn settings(&self, clocks: &Clocks) -> Result<I2cSettings, BringupError> {
        let id = PeripheralId::I2c(self.i2c);
        let pclk = clocks.pclk(self.i2c.domain()).raw();

        let freq = pclk / 1_000_000;
        if freq < FREQ_MIN_MHZ || freq > FREQ_MAX_MHZ {
            return Err(BringupError::DivisorOutOfRange(id));
        }

        let (max_hz, periods, ccr_min, trise) = match self.mode {
            I2cMode::Standard => (STANDARD_MODE_MAX_HZ, 2, 4, freq + 1),
            // 300 ns maximum rise time
            I2cMode::Fast => (FAST_MODE_MAX_HZ, 3, 1, freq * 300 / 1000 + 1),
        };
        if self.scl_hz == 0 || self.scl_hz > max_hz {
            return Err(BringupError::RateOutOfTolerance(id));
        }

        let ccr = div_nearest(pclk, periods * self.scl_hz);
        if ccr < ccr_min || ccr > CCR_MAX {
            return Err(BringupError::DivisorOutOfRange(id));
        }
        if error_permille(pclk, periods * ccr, self.scl_hz) > SCL_TOLERANCE_PERMILLE {
            return Err(BringupError::RateOutOfTolerance(id));
        }

        let address_max = match self.address_width {
            AddressWidth::Seven => 0x7f,
            AddressWidth::Ten => 0x3ff,
        };
        if self.own_address > address_max {
            return Err(BringupError::InvalidAddress(id));
        }

        Ok(I2cSettings {
            freq_mhz: freq as u8,
            ccr: ccr as u16,
            trise: trise as u8,
            mode: self.mode,
            own_address: self.own_address,
            address_width: self.address_width,
        })
    }
}


// - tests --------------------------------------------------------------------
