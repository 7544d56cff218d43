use crate::clocks::Clocks;
use crate::error::BringupError;
use crate::hw::{BusGate, PeripheralControl, PeripheralId, UsartId};
use crate::i2c::I2cConfig;
use crate::spi::SpiConfig;
use crate::usart::UsartConfig;


// - types --------------------------------------------------------------------

/// Protocol parameters for one communication peripheral
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeripheralConfig {
    Usart(UsartConfig),
    I2c(I2cConfig),
    Spi(SpiConfig),
}

impl PeripheralConfig {
    pub const fn id(&self) -> PeripheralId {
        match self {
            PeripheralConfig::Usart(config) => PeripheralId::Usart(config.usart),
            PeripheralConfig::I2c(config) => PeripheralId::I2c(config.i2c),
            PeripheralConfig::Spi(config) => PeripheralId::Spi(config.spi),
        }
    }

    pub const fn gate(&self) -> BusGate {
        match self {
            PeripheralConfig::Usart(config) => BusGate::Usart(config.usart),
            PeripheralConfig::I2c(config) => BusGate::I2c(config.i2c),
            PeripheralConfig::Spi(config) => BusGate::Spi(config.spi),
        }
    }

    /// Computes divisors against `clocks` without touching hardware.
    pub const fn validate(&self, clocks: &Clocks) -> Result<(), BringupError> {
        match self {
            PeripheralConfig::Usart(config) => match config.settings(clocks) {
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            },
            PeripheralConfig::I2c(config) => match config.settings(clocks) {
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            },
            PeripheralConfig::Spi(config) => match config.settings(clocks) {
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            },
        }
    }
}


// - divisor helpers ----------------------------------------------------------

/// `numerator / denominator` rounded to nearest, halves rounded up.
pub const fn div_nearest(numerator: u32, denominator: u32) -> u32 {
    ((numerator as u64 + denominator as u64 / 2) / denominator as u64) as u32
}

/// Deviation of `reference / divisor` from `target`, in parts per thousand.
pub const fn error_permille(reference: u32, divisor: u32, target: u32) -> u32 {
    let actual = divisor as u64 * target as u64;
    let reference = reference as u64;
    let delta = if reference > actual { reference - actual } else { actual - reference };
    (delta * 1000 / actual) as u32
}


// - static checks ------------------------------------------------------------

/// Validates every peripheral against the frozen clocks, and that no
/// instance is configured twice.
pub const fn check_all(peripherals: &[PeripheralConfig], clocks: &Clocks) -> Result<(), BringupError> {
    let mut i = 0;
    while i < peripherals.len() {
        if let Err(e) = peripherals[i].validate(clocks) {
            return Err(e);
        }
        let mut j = i + 1;
        while j < peripherals.len() {
            if same_instance(&peripherals[i], &peripherals[j]) {
                return Err(BringupError::DuplicatePeripheral(peripherals[i].id()));
            }
            j += 1;
        }
        i += 1;
    }
    Ok(())
}

const fn same_instance(a: &PeripheralConfig, b: &PeripheralConfig) -> bool {
    match (a, b) {
        (PeripheralConfig::Usart(a), PeripheralConfig::Usart(b)) => a.usart as u8 == b.usart as u8,
        (PeripheralConfig::I2c(a), PeripheralConfig::I2c(b)) => a.i2c as u8 == b.i2c as u8,
        (PeripheralConfig::Spi(a), PeripheralConfig::Spi(b)) => a.spi as u8 == b.spi as u8,
        _ => false,
    }
}

/// Finds the configuration of `usart` in the table.
pub const fn find_usart(peripherals: &[PeripheralConfig], usart: UsartId) -> Option<UsartConfig> {
    let mut i = 0;
    while i < peripherals.len() {
        if let PeripheralConfig::Usart(config) = peripherals[i] {
            if config.usart as u8 == usart as u8 {
                return Some(config);
            }
        }
        i += 1;
    }
    None
}

/// Checks that `usart` is in the table with its transmitter enabled, so it
/// can carry log output.
pub const fn check_log_usart(peripherals: &[PeripheralConfig], usart: UsartId) -> Result<(), BringupError> {
    match find_usart(peripherals, usart) {
        Some(config) if config.tx => Ok(()),
        Some(_) => Err(BringupError::LogSinkNotTransmitting),
        None => Err(BringupError::LogSinkNotConfigured),
    }
}


// - init ---------------------------------------------------------------------

/// Programs and enables every peripheral. Divisors are computed from the
/// clocks returned by clock configuration. Pins must already be muxed.
pub fn init<P: PeripheralControl>(
    hw: &mut P,
    peripherals: &[PeripheralConfig],
    clocks: &Clocks,
) -> Result<(), BringupError> {
    for peripheral in peripherals {
        match peripheral {
            PeripheralConfig::Usart(config) => {
                let settings = config.settings(clocks)?;
                hw.program_usart(config.usart, &settings);
                log::debug!("{:?}: brr={} baud={}", config.usart, settings.brr,
                            settings.effective_baud(clocks.pclk(config.usart.domain())));
            }
            PeripheralConfig::I2c(config) => {
                let settings = config.settings(clocks)?;
                hw.program_i2c(config.i2c, &settings);
                log::debug!("{:?}: ccr={} trise={}", config.i2c, settings.ccr, settings.trise);
            }
            PeripheralConfig::Spi(config) => {
                let settings = config.settings(clocks)?;
                hw.program_spi(config.spi, &settings);
                log::debug!("{:?}: prescaler={}", config.spi, settings.prescaler());
            }
        }
    }
    Ok(())
}


// - tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board;
    use crate::hw::{I2cId, SpiId};
    use crate::mock::{FakeHardware, Op};
    use crate::usart::{Parity, StopBits, WordLength};

    const LOG: UsartConfig = UsartConfig {
        usart: UsartId::Usart1,
        baud: 115_200,
        word_length: WordLength::Eight,
        parity: Parity::None,
        stop_bits: StopBits::One,
        tx: true,
        rx: true,
    };

    #[test]
    fn nearest_rounding() {
        assert_eq!(div_nearest(10, 4), 3); // 2.5 rounds up
        assert_eq!(div_nearest(9, 4), 2);
        assert_eq!(div_nearest(11, 4), 3);
        assert_eq!(div_nearest(72_000_000, 115_200), 625);
    }

    #[test]
    fn permille_error() {
        assert_eq!(error_permille(72_000_000, 625, 115_200), 0);
        // 36 MHz / 19 ~ 1.894 MHz against 2 MHz
        assert_eq!(error_permille(36_000_000, 19, 2_000_000), 52);
    }

    #[test]
    fn board_table_is_valid() {
        assert_eq!(check_all(board::TANUKI.peripherals, &board::CLOCKS), Ok(()));
    }

    #[test]
    fn duplicate_instance_is_rejected() {
        let table = [PeripheralConfig::Usart(LOG), PeripheralConfig::Usart(UsartConfig { baud: 9600, ..LOG })];
        assert_eq!(check_all(&table, &board::CLOCKS),
                   Err(BringupError::DuplicatePeripheral(PeripheralId::Usart(UsartId::Usart1))));
    }

    #[test]
    fn find_log_usart() {
        assert_eq!(find_usart(&[PeripheralConfig::Usart(LOG)], UsartId::Usart1), Some(LOG));
        assert_eq!(find_usart(&[PeripheralConfig::Usart(LOG)], UsartId::Usart2), None);
    }

    #[test]
    fn log_usart_must_transmit() {
        let table = [PeripheralConfig::Usart(LOG)];
        assert_eq!(check_log_usart(&table, UsartId::Usart1), Ok(()));
        assert_eq!(check_log_usart(&table, UsartId::Usart3), Err(BringupError::LogSinkNotConfigured));

        let rx_only = [PeripheralConfig::Usart(UsartConfig { tx: false, ..LOG })];
        assert_eq!(check_log_usart(&rx_only, UsartId::Usart1), Err(BringupError::LogSinkNotTransmitting));
    }

    #[test]
    fn init_programs_in_table_order() {
        let mut hw = FakeHardware::new();
        init(&mut hw, board::TANUKI.peripherals, &board::CLOCKS).unwrap();

        let programmed: Vec<Op> = hw.ops().to_vec();
        assert_eq!(programmed, vec![
            Op::ProgramUsart(UsartId::Usart1),
            Op::ProgramI2c(I2cId::I2c1),
            Op::ProgramSpi(SpiId::Spi1),
        ]);
        assert_eq!(hw.usart_settings(UsartId::Usart1).unwrap().brr, 625);
    }

    #[test]
    fn init_stops_at_unreachable_rate() {
        let mut hw = FakeHardware::new();
        let table = [PeripheralConfig::Usart(UsartConfig { baud: 10_000_000, ..LOG })];
        assert!(init(&mut hw, &table, &board::CLOCKS).is_err());
        assert!(hw.ops().is_empty());
    }
}
