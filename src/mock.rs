//! Recording fake of the peripheral-register layer for host tests.

use core::cell::Cell;
use core::convert::Infallible;
use std::collections::BTreeMap;
use std::vec::Vec;

use crate::clocks::{AhbPrescaler, ApbPrescaler, PllConfig};
use crate::hw::*;
use crate::i2c::I2cSettings;
use crate::pins::PinConfig;
use crate::spi::SpiSettings;
use crate::usart::UsartSettings;


/// Hardware operations in the order they were issued. Status polls and
/// transmitted bytes are not recorded here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    StartOscillator(OscillatorKind),
    FlashWaitStates(u8),
    Prescalers(AhbPrescaler, ApbPrescaler, ApbPrescaler),
    StopPll,
    ConfigurePll(PllConfig),
    StartPll,
    SelectSysclk(SysclkSource),
    EnableGate(BusGate),
    ConfigurePin(Port, u8, PinConfig),
    SetPin(Port, u8, bool),
    ProgramUsart(UsartId),
    ProgramI2c(I2cId),
    ProgramSpi(SpiId),
}

pub struct FakeHardware {
    ops: Vec<Op>,

    hse_ready: bool,
    pll_running: bool,
    /// `None` never locks
    pll_lock_polls: Option<u32>,
    polls: Cell<u32>,
    sysclk: SysclkSource,

    gates: BTreeMap<BusGate, u32>,
    pins: BTreeMap<(Port, u8), PinConfig>,
    levels: BTreeMap<(Port, u8), bool>,

    usarts: BTreeMap<UsartId, UsartSettings>,
    i2cs: BTreeMap<I2cId, I2cSettings>,
    spis: BTreeMap<SpiId, SpiSettings>,

    tx: Vec<(UsartId, u8)>,
    /// every n-th write attempt reports a full transmit register
    busy_every: Option<u32>,
    attempts: u32,
}

impl FakeHardware {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            hse_ready: true,
            pll_running: false,
            pll_lock_polls: Some(0),
            polls: Cell::new(0),
            sysclk: SysclkSource::Hsi,
            gates: BTreeMap::new(),
            pins: BTreeMap::new(),
            levels: BTreeMap::new(),
            usarts: BTreeMap::new(),
            i2cs: BTreeMap::new(),
            spis: BTreeMap::new(),
            tx: Vec::new(),
            busy_every: None,
            attempts: 0,
        }
    }

    pub fn pll_locks_after(mut self, polls: u32) -> Self {
        self.pll_lock_polls = Some(polls);
        self
    }

    pub fn pll_never_locks(mut self) -> Self {
        self.pll_lock_polls = None;
        self
    }

    pub fn hse_never_ready(mut self) -> Self {
        self.hse_ready = false;
        self
    }

    pub fn usart_busy_every(mut self, n: u32) -> Self {
        self.busy_every = Some(n);
        self
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn gate_count(&self, gate: BusGate) -> u32 {
        self.gates.get(&gate).copied().unwrap_or(0)
    }

    pub fn pin_configs(&self) -> BTreeMap<(Port, u8), PinConfig> {
        self.pins.clone()
    }

    pub fn levels(&self) -> BTreeMap<(Port, u8), bool> {
        self.levels.clone()
    }

    pub fn level(&self, port: Port, pin: u8) -> bool {
        self.levels.get(&(port, pin)).copied().unwrap_or(false)
    }

    pub fn pin_config(&self, port: Port, pin: u8) -> Option<PinConfig> {
        self.pins.get(&(port, pin)).copied()
    }

    pub fn usart_settings(&self, usart: UsartId) -> Option<UsartSettings> {
        self.usarts.get(&usart).copied()
    }

    pub fn i2c_settings(&self, i2c: I2cId) -> Option<I2cSettings> {
        self.i2cs.get(&i2c).copied()
    }

    pub fn spi_settings(&self, spi: SpiId) -> Option<SpiSettings> {
        self.spis.get(&spi).copied()
    }

    pub fn transmitted(&self, usart: UsartId) -> Vec<u8> {
        self.tx.iter().filter(|(u, _)| *u == usart).map(|(_, b)| *b).collect()
    }
}

impl ClockControl for FakeHardware {
    fn start_oscillator(&mut self, osc: OscillatorKind) {
        self.ops.push(Op::StartOscillator(osc));
    }

    fn oscillator_ready(&self, osc: OscillatorKind) -> bool {
        match osc {
            OscillatorKind::Hsi => true,
            OscillatorKind::Hse => self.hse_ready,
        }
    }

    fn set_flash_wait_states(&mut self, wait_states: u8) {
        self.ops.push(Op::FlashWaitStates(wait_states));
    }

    fn set_prescalers(&mut self, ahb: AhbPrescaler, apb1: ApbPrescaler, apb2: ApbPrescaler) {
        self.ops.push(Op::Prescalers(ahb, apb1, apb2));
    }

    fn stop_pll(&mut self) {
        // the hardware ignores this while the PLL clocks the core
        assert_ne!(self.sysclk, SysclkSource::Pll, "PLL stopped while driving SYSCLK");
        self.pll_running = false;
        self.ops.push(Op::StopPll);
    }

    fn configure_pll(&mut self, pll: &PllConfig) {
        assert!(!self.pll_running, "PLL reconfigured while running");
        self.ops.push(Op::ConfigurePll(*pll));
    }

    fn start_pll(&mut self) {
        self.pll_running = true;
        self.polls.set(0);
        self.ops.push(Op::StartPll);
    }

    fn pll_locked(&self) -> bool {
        let polls = self.polls.get();
        self.polls.set(polls + 1);
        match self.pll_lock_polls {
            Some(needed) => self.pll_running && polls >= needed,
            None => false,
        }
    }

    fn select_sysclk(&mut self, source: SysclkSource) {
        let ready = match source {
            SysclkSource::Hsi => true,
            SysclkSource::Hse => self.hse_ready,
            SysclkSource::Pll => self.pll_running && self.pll_lock_polls.is_some(),
        };
        // the switch is refused when the source isn't stable
        if ready {
            self.sysclk = source;
        }
        self.ops.push(Op::SelectSysclk(source));
    }

    fn sysclk_source(&self) -> SysclkSource {
        self.sysclk
    }
}

impl BusControl for FakeHardware {
    fn enable_gate(&mut self, gate: BusGate) {
        *self.gates.entry(gate).or_insert(0) += 1;
        self.ops.push(Op::EnableGate(gate));
    }
}

impl GpioControl for FakeHardware {
    fn configure_pin(&mut self, port: Port, pin: u8, config: PinConfig) {
        assert!(self.gates.contains_key(&BusGate::Gpio(port)) || self.gates.is_empty(),
                "P{:?} configured before its clock was enabled", port);
        self.pins.insert((port, pin), config);
        self.ops.push(Op::ConfigurePin(port, pin, config));
    }

    fn set_pin(&mut self, port: Port, pin: u8, high: bool) {
        self.levels.insert((port, pin), high);
        self.ops.push(Op::SetPin(port, pin, high));
    }

    fn pin_is_high(&self, port: Port, pin: u8) -> bool {
        self.level(port, pin)
    }
}

impl PeripheralControl for FakeHardware {
    fn program_usart(&mut self, usart: UsartId, settings: &UsartSettings) {
        self.usarts.insert(usart, *settings);
        self.ops.push(Op::ProgramUsart(usart));
    }

    fn program_i2c(&mut self, i2c: I2cId, settings: &I2cSettings) {
        self.i2cs.insert(i2c, *settings);
        self.ops.push(Op::ProgramI2c(i2c));
    }

    fn program_spi(&mut self, spi: SpiId, settings: &SpiSettings) {
        self.spis.insert(spi, *settings);
        self.ops.push(Op::ProgramSpi(spi));
    }

    fn usart_write(&mut self, usart: UsartId, byte: u8) -> nb::Result<(), Infallible> {
        self.attempts += 1;
        if let Some(n) = self.busy_every {
            if self.attempts % n == 0 {
                return Err(nb::Error::WouldBlock);
            }
        }
        self.tx.push((usart, byte));
        Ok(())
    }

    fn usart_flush(&mut self, _usart: UsartId) -> nb::Result<(), Infallible> {
        Ok(())
    }
}
