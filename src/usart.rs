use crate::clocks::Clocks;
use crate::error::BringupError;
use crate::hw::{PeripheralId, UsartId};
use crate::peripheral::{div_nearest, error_permille};
use crate::Hertz;


// - constants ----------------------------------------------------------------

/// Accepted deviation of the effective baud rate, in parts per thousand
pub const BAUD_TOLERANCE_PERMILLE: u32 = 20;

/// USARTDIV is 12.4 fixed point, so BRR needs at least one whole unit
pub const BRR_MIN: u32 = 16;
pub const BRR_MAX: u32 = 0xffff;


// - types --------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WordLength {
    /// 8 bits on the wire. With parity enabled the top bit is the parity
    /// bit, leaving 7 data bits.
    Eight,
    /// 9 bits on the wire, or 8 data bits plus parity.
    Nine,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    /// Smartcard mode only
    Half,
    Two,
    /// Smartcard mode only
    OneAndHalf,
}

impl StopBits {
    /// USART_CR2.STOP
    pub const fn bits(self) -> u32 {
        match self {
            StopBits::One => 0b00,
            StopBits::Half => 0b01,
            StopBits::Two => 0b10,
            StopBits::OneAndHalf => 0b11,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsartConfig {
    pub usart: UsartId,
    pub baud: u32,
    pub word_length: WordLength,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub tx: bool,
    pub rx: bool,
}

/// What gets written to the peripheral
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsartSettings {
    pub brr: u16,
    pub word_length: WordLength,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub tx: bool,
    pub rx: bool,
}

impl UsartSettings {
    pub const fn effective_baud(&self, pclk: Hertz) -> u32 {
        div_nearest(pclk.raw(), self.brr as u32)
    }
}


// - divisor ------------------------------------------------------------------

/// BRR for `baud` from a peripheral clock of `pclk`.
///
/// BRR holds `pclk / (16 * baud)` in 12.4 fixed point, which is just
/// `pclk / baud`. Rounded to nearest, halves up.
pub const fn brr(pclk: Hertz, baud: u32) -> u32 {
    div_nearest(pclk.raw(), baud)
}

impl UsartConfig {
    pub const fn settings(&self, clocks: &Clocks) -> Result<UsartSettings, BringupError> {
        let id = PeripheralId::Usart(self.usart);
        let pclk = clocks.pclk(self.usart.domain());
        if self.baud == 0 {
            return Err(BringupError::DivisorOutOfRange(id));
        }
        let brr = brr(pclk, self.baud);
        if brr < BRR_MIN || brr > BRR_MAX {
            return Err(BringupError::DivisorOutOfRange(id));
        }
        if error_permille(pclk.raw(), brr, self.baud) > BAUD_TOLERANCE_PERMILLE {
            return Err(BringupError::RateOutOfTolerance(id));
        }
        Ok(UsartSettings {
            brr: brr as u16,
            word_length: self.word_length,
            parity: self.parity,
            stop_bits: self.stop_bits,
            tx: self.tx,
            rx: self.rx,
        })
    }
}


// - tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board;
    use proptest::prelude::*;

    fn config(usart: UsartId, baud: u32) -> UsartConfig {
        UsartConfig {
            usart,
            baud,
            word_length: WordLength::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            tx: true,
            rx: true,
        }
    }

    #[test]
    fn usart1_115200_from_72mhz() {
        let settings = config(UsartId::Usart1, 115_200).settings(&board::CLOCKS).unwrap();
        assert_eq!(settings.brr, 625);

        let baud = settings.effective_baud(board::CLOCKS.pclk2);
        assert!((113_472..=116_928).contains(&baud), "{}", baud);
    }

    #[test]
    fn usart2_uses_apb1() {
        let settings = config(UsartId::Usart2, 115_200).settings(&board::CLOCKS).unwrap();
        // 36 MHz / 115200 = 312.5
        assert_eq!(settings.brr, 313);
    }

    #[test]
    fn out_of_range_rates() {
        let id = PeripheralId::Usart(UsartId::Usart1);
        assert_eq!(config(UsartId::Usart1, 0).settings(&board::CLOCKS),
                   Err(BringupError::DivisorOutOfRange(id)));
        assert_eq!(config(UsartId::Usart1, 5_000_000).settings(&board::CLOCKS),
                   Err(BringupError::DivisorOutOfRange(id)));
        assert_eq!(config(UsartId::Usart1, 1_000).settings(&board::CLOCKS),
                   Err(BringupError::DivisorOutOfRange(id)));
    }

    #[test]
    fn stop_bit_encoding() {
        assert_eq!(StopBits::One.bits(), 0b00);
        assert_eq!(StopBits::Two.bits(), 0b10);
    }

    proptest! {
        #[test]
        fn brr_is_deterministic_and_within_tolerance(
            pclk_mhz in 8u32..=72,
            baud in prop::sample::select(vec![1_200u32, 2_400, 4_800, 9_600, 19_200, 38_400, 57_600, 115_200, 230_400]),
        ) {
            let pclk = Hertz::MHz(pclk_mhz);
            let first = brr(pclk, baud);
            prop_assert_eq!(first, brr(pclk, baud));

            if (BRR_MIN..=BRR_MAX).contains(&first) {
                // nearest rounding keeps the error under half a BRR step
                prop_assert!(error_permille(pclk.raw(), first, baud) <= 1000 / (2 * first) + 1);
                if first >= 25 {
                    prop_assert!(error_permille(pclk.raw(), first, baud) <= BAUD_TOLERANCE_PERMILLE);
                }
            }
        }
    }
}
