//! Capability traits over the STM32F103 registers
//!
//! Registers are reached through the PAC's typed field accessors. GPIO
//! configuration is the exception: CRL/CRH hold one nibble per pin and are
//! indexed by pin number.

use core::convert::Infallible;

use crate::clocks::{AhbPrescaler, ApbPrescaler, PllConfig, PllSource};
use crate::board::BringupState;
use crate::error::BringupError;
use crate::hw::*;
use crate::i2c::{AddressWidth, I2cMode, I2cSettings};
use crate::pac;
use crate::pins::PinConfig;
use crate::spi::{BitOrder, FrameSize, Nss, SpiSettings};
use crate::usart::{Parity, UsartSettings, WordLength};


// - register bits ------------------------------------------------------------

mod i2c {
    pub const OAR1_ADDMODE: u32 = 1 << 15;
    /// Must be kept at 1 by software
    pub const OAR1_BIT14: u32 = 1 << 14;
}


const PLL_STOP_POLLS: u32 = 1_000;


// - Stm32f1 ------------------------------------------------------------------

/// The device peripherals, owned for the lifetime of the board.
pub struct Stm32f1 {
    dp: pac::Peripherals,
}

impl Stm32f1 {
    /// Returns the device peripherals *once*
    pub fn take() -> Option<Self> {
        pac::Peripherals::take().map(|dp| Self { dp })
    }

    fn gpio(&self, port: Port) -> &pac::gpioa::RegisterBlock {
        match port {
            Port::A => &self.dp.GPIOA,
            Port::B => &self.dp.GPIOB,
            Port::C => &self.dp.GPIOC,
            Port::D => &self.dp.GPIOD,
            Port::E => &self.dp.GPIOE,
        }
    }

    fn usart(&self, usart: UsartId) -> &pac::usart1::RegisterBlock {
        match usart {
            UsartId::Usart1 => &self.dp.USART1,
            UsartId::Usart2 => &self.dp.USART2,
            UsartId::Usart3 => &self.dp.USART3,
        }
    }

    fn i2c(&self, i2c: I2cId) -> &pac::i2c1::RegisterBlock {
        match i2c {
            I2cId::I2c1 => &self.dp.I2C1,
            I2cId::I2c2 => &self.dp.I2C2,
        }
    }

    fn spi(&self, spi: SpiId) -> &pac::spi1::RegisterBlock {
        match spi {
            SpiId::Spi1 => &self.dp.SPI1,
            SpiId::Spi2 => &self.dp.SPI2,
        }
    }
}

impl ClockControl for Stm32f1 {
    fn start_oscillator(&mut self, osc: OscillatorKind) {
        match osc {
            OscillatorKind::Hsi => self.dp.RCC.cr.modify(|_, w| w.hsion().set_bit()),
            OscillatorKind::Hse => self.dp.RCC.cr.modify(|_, w| w.hseon().set_bit()),
        }
    }

    fn oscillator_ready(&self, osc: OscillatorKind) -> bool {
        let cr = self.dp.RCC.cr.read();
        match osc {
            OscillatorKind::Hsi => cr.hsirdy().bit_is_set(),
            OscillatorKind::Hse => cr.hserdy().bit_is_set(),
        }
    }

    fn set_flash_wait_states(&mut self, wait_states: u8) {
        self.dp.FLASH.acr.modify(|_, w| unsafe {
            w.prftbe().set_bit()
             .latency().bits(wait_states)
        });
    }

    fn set_prescalers(&mut self, ahb: AhbPrescaler, apb1: ApbPrescaler, apb2: ApbPrescaler) {
        self.dp.RCC.cfgr.modify(|_, w| unsafe {
            w.hpre().bits(ahb.bits() as u8)
             .ppre1().bits(apb1.bits() as u8)
             .ppre2().bits(apb2.bits() as u8)
        });
    }

    fn stop_pll(&mut self) {
        self.dp.RCC.cr.modify(|_, w| w.pllon().clear_bit());
        // PLLRDY drops within a few cycles
        for _ in 0..PLL_STOP_POLLS {
            if self.dp.RCC.cr.read().pllrdy().bit_is_clear() {
                break;
            }
        }
    }

    fn configure_pll(&mut self, pll: &PllConfig) {
        let (from_hse, hse_div2) = match pll.source {
            PllSource::HsiDiv2 => (false, false),
            PllSource::Hse => (true, false),
            PllSource::HseDiv2 => (true, true),
        };
        self.dp.RCC.cfgr.modify(|_, w| unsafe {
            w.pllsrc().bit(from_hse)
             .pllxtpre().bit(hse_div2)
             .pllmul().bits(pll.mul - 2)
        });
    }

    fn start_pll(&mut self) {
        self.dp.RCC.cr.modify(|_, w| w.pllon().set_bit());
    }

    fn pll_locked(&self) -> bool {
        self.dp.RCC.cr.read().pllrdy().bit_is_set()
    }

    fn select_sysclk(&mut self, source: SysclkSource) {
        self.dp.RCC.cfgr.modify(|_, w| match source {
            SysclkSource::Hsi => w.sw().hsi(),
            SysclkSource::Hse => w.sw().hse(),
            SysclkSource::Pll => w.sw().pll(),
        });
    }

    fn sysclk_source(&self) -> SysclkSource {
        match self.dp.RCC.cfgr.read().sws().bits() {
            0b01 => SysclkSource::Hse,
            0b10 => SysclkSource::Pll,
            _ => SysclkSource::Hsi,
        }
    }
}

impl BusControl for Stm32f1 {
    fn enable_gate(&mut self, gate: BusGate) {
        let rcc = &self.dp.RCC;
        match gate {
            BusGate::Gpio(Port::A) => rcc.apb2enr.modify(|_, w| w.iopaen().set_bit()),
            BusGate::Gpio(Port::B) => rcc.apb2enr.modify(|_, w| w.iopben().set_bit()),
            BusGate::Gpio(Port::C) => rcc.apb2enr.modify(|_, w| w.iopcen().set_bit()),
            BusGate::Gpio(Port::D) => rcc.apb2enr.modify(|_, w| w.iopden().set_bit()),
            BusGate::Gpio(Port::E) => rcc.apb2enr.modify(|_, w| w.iopeen().set_bit()),
            BusGate::Usart(UsartId::Usart1) => rcc.apb2enr.modify(|_, w| w.usart1en().set_bit()),
            BusGate::Usart(UsartId::Usart2) => rcc.apb1enr.modify(|_, w| w.usart2en().set_bit()),
            BusGate::Usart(UsartId::Usart3) => rcc.apb1enr.modify(|_, w| w.usart3en().set_bit()),
            BusGate::I2c(I2cId::I2c1) => rcc.apb1enr.modify(|_, w| w.i2c1en().set_bit()),
            BusGate::I2c(I2cId::I2c2) => rcc.apb1enr.modify(|_, w| w.i2c2en().set_bit()),
            BusGate::Spi(SpiId::Spi1) => rcc.apb2enr.modify(|_, w| w.spi1en().set_bit()),
            BusGate::Spi(SpiId::Spi2) => rcc.apb1enr.modify(|_, w| w.spi2en().set_bit()),
        }
    }
}

impl GpioControl for Stm32f1 {
    fn configure_pin(&mut self, port: Port, pin: u8, config: PinConfig) {
        let gpio = self.gpio(port);
        let shift = (pin as u32 % 8) * 4;
        let nibble = config.cnf_mode() << shift;
        let mask = !(0b1111 << shift);
        if pin < 8 {
            gpio.crl.modify(|r, w| unsafe { w.bits((r.bits() & mask) | nibble) });
        } else {
            gpio.crh.modify(|r, w| unsafe { w.bits((r.bits() & mask) | nibble) });
        }
    }

    fn set_pin(&mut self, port: Port, pin: u8, high: bool) {
        let gpio = self.gpio(port);
        if high {
            gpio.bsrr.write(|w| unsafe { w.bits(1 << pin) });
        } else {
            gpio.brr.write(|w| unsafe { w.bits(1 << pin) });
        }
    }

    fn pin_is_high(&self, port: Port, pin: u8) -> bool {
        self.gpio(port).idr.read().bits() & (1 << pin) != 0
    }
}

impl PeripheralControl for Stm32f1 {
    fn program_usart(&mut self, id: UsartId, settings: &UsartSettings) {
        let regs = self.usart(id);

        // UE off while the frame format changes
        regs.cr1.modify(|_, w| w.ue().clear_bit());
        regs.brr.write(|w| unsafe {
            w.div_mantissa().bits(settings.brr >> 4)
             .div_fraction().bits((settings.brr & 0xf) as u8)
        });
        regs.cr2.modify(|_, w| unsafe { w.stop().bits(settings.stop_bits.bits() as u8) });
        regs.cr1.write(|w| {
            w.m().bit(settings.word_length == WordLength::Nine)
             .pce().bit(settings.parity != Parity::None)
             .ps().bit(settings.parity == Parity::Odd)
             .te().bit(settings.tx)
             .re().bit(settings.rx)
             .ue().set_bit()
        });
    }

    fn program_i2c(&mut self, id: I2cId, settings: &I2cSettings) {
        let regs = self.i2c(id);

        regs.cr1.write(|w| w.swrst().set_bit());
        regs.cr1.write(|w| w.swrst().clear_bit());

        regs.cr2.modify(|_, w| unsafe { w.freq().bits(settings.freq_mhz) });
        regs.ccr.write(|w| unsafe {
            w.f_s().bit(settings.mode == I2cMode::Fast)
             .duty().clear_bit()
             .ccr().bits(settings.ccr)
        });
        regs.trise.write(|w| unsafe { w.trise().bits(settings.trise) });

        // the address fields are split by addressing mode, write the register whole
        let oar1 = match settings.address_width {
            AddressWidth::Seven => i2c::OAR1_BIT14 | (settings.own_address as u32 & 0x7f) << 1,
            AddressWidth::Ten => i2c::OAR1_BIT14 | i2c::OAR1_ADDMODE | (settings.own_address as u32 & 0x3ff),
        };
        regs.oar1.write(|w| unsafe { w.bits(oar1) });

        regs.cr1.modify(|_, w| w.pe().set_bit());
    }

    fn program_spi(&mut self, id: SpiId, settings: &SpiSettings) {
        let regs = self.spi(id);

        regs.cr1.modify(|_, w| w.spe().clear_bit());
        regs.cr2.write(|w| w.ssoe().bit(settings.nss == Nss::HardwareOutput));

        let software_nss = settings.nss == Nss::Software;
        regs.cr1.write(|w| unsafe {
            w.cpha().bit(settings.mode.cpha())
             .cpol().bit(settings.mode.cpol())
             .mstr().set_bit()
             .br().bits(settings.br)
             .lsbfirst().bit(settings.bit_order == BitOrder::LsbFirst)
             .dff().bit(settings.frame == FrameSize::Sixteen)
             // internal NSS held high, otherwise the peripheral drops out of master mode
             .ssm().bit(software_nss)
             .ssi().bit(software_nss)
        });
        regs.cr1.modify(|_, w| w.spe().set_bit());
    }

    fn usart_write(&mut self, id: UsartId, byte: u8) -> nb::Result<(), Infallible> {
        let regs = self.usart(id);
        if regs.sr.read().txe().bit_is_clear() {
            return Err(nb::Error::WouldBlock);
        }
        regs.dr.write(|w| unsafe { w.dr().bits(byte as u16) });
        Ok(())
    }

    fn usart_flush(&mut self, id: UsartId) -> nb::Result<(), Infallible> {
        if self.usart(id).sr.read().tc().bit_is_clear() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }
}


// - halt ---------------------------------------------------------------------

/// Parks the core after a failed bring-up.
pub fn halt(error: BringupError, reached: BringupState) -> ! {
    log::error!("board: halted after {:?}: {}", reached, error);
    #[cfg(feature = "defmt")]
    defmt::error!("board: halted after {}: {}", reached, error);
    loop {
        cortex_m::asm::wfi();
    }
}
