use core::cell::Cell;

use critical_section::Mutex;

use crate::bus;
use crate::clocks::{self, AhbPrescaler, ApbPrescaler, ClockConfig, Clocks, PllConfig, PllSource};
use crate::error::{BringupError, PinError};
use crate::hw::{Hardware, I2cId, Port, SpiId, SysclkSource, UsartId};
use crate::i2c::{AddressWidth, I2cConfig, I2cMode};
use crate::log_sink::{LogSink, LogWriter};
use crate::peripheral::{self, PeripheralConfig};
use crate::pins::{self, Electrical, I2cSignal, Level, PinAssignment, PinRole, SpiSignal, UsartSignal};
use crate::spi::{BitOrder, FrameSize, Nss, SpiConfig, SpiMode};
use crate::usart::{Parity, StopBits, UsartConfig, WordLength};
use crate::Hertz;


// - board descriptor ---------------------------------------------------------

/// USART carrying diagnostic output, on its default pins
pub const LOG_USART: UsartId = UsartId::Usart1;

/// Everything that describes one board revision
#[derive(Clone, Copy, Debug)]
pub struct BoardDescriptor {
    pub clocks: ClockConfig,
    pub pins: &'static [PinAssignment],
    pub peripherals: &'static [PeripheralConfig],
    pub log_usart: UsartId,
}

/// 8 MHz crystal, 72 MHz system clock, 36 MHz APB1
pub const CLOCK_CONFIG: ClockConfig = ClockConfig {
    hse: Some(Hertz::MHz(8)),
    pll: Some(PllConfig { source: PllSource::Hse, mul: 9 }),
    sysclk: SysclkSource::Pll,
    ahb: AhbPrescaler::Div1,
    apb1: ApbPrescaler::Div2,
    apb2: ApbPrescaler::Div1,
    poll_budget: 100_000,
};

pub const CLOCKS: Clocks = match CLOCK_CONFIG.freeze() {
    Ok(clocks) => clocks,
    Err(_) => panic!("clock configuration exceeds the documented limits"),
};

pub const STATUS_LED: (Port, u8) = (Port::C, 13);
pub const USER_BUTTON: (Port, u8) = (Port::A, 0);
pub const FLASH_CS: (Port, u8) = (Port::A, 4);

pub const PINS: &[PinAssignment] = &[
    // USART1 default mapping
    PinAssignment::new(Port::A, 9, PinRole::Usart(UsartId::Usart1, UsartSignal::Tx), Electrical::PUSH_PULL_50MHZ),
    PinAssignment::new(Port::A, 10, PinRole::Usart(UsartId::Usart1, UsartSignal::Rx), Electrical::PULL_UP),
    // I2C1
    PinAssignment::new(Port::B, 6, PinRole::I2c(I2cId::I2c1, I2cSignal::Scl), Electrical::OPEN_DRAIN_2MHZ),
    PinAssignment::new(Port::B, 7, PinRole::I2c(I2cId::I2c1, I2cSignal::Sda), Electrical::OPEN_DRAIN_2MHZ),
    // SPI1, chip select in software
    PinAssignment::new(Port::A, 5, PinRole::Spi(SpiId::Spi1, SpiSignal::Sck), Electrical::PUSH_PULL_50MHZ),
    PinAssignment::new(Port::A, 6, PinRole::Spi(SpiId::Spi1, SpiSignal::Miso), Electrical::FLOATING),
    PinAssignment::new(Port::A, 7, PinRole::Spi(SpiId::Spi1, SpiSignal::Mosi), Electrical::PUSH_PULL_50MHZ),
    PinAssignment::new(FLASH_CS.0, FLASH_CS.1, PinRole::Output(Level::High), Electrical::PUSH_PULL_50MHZ),
    // active low
    PinAssignment::new(STATUS_LED.0, STATUS_LED.1, PinRole::Output(Level::High), Electrical::PUSH_PULL_2MHZ),
    PinAssignment::new(USER_BUTTON.0, USER_BUTTON.1, PinRole::Input, Electrical::PULL_UP),
];

const _: () = assert!(pins::check(PINS).is_ok(), "pin table has conflicting or missing pins");

pub const PERIPHERALS: &[PeripheralConfig] = &[
    PeripheralConfig::Usart(UsartConfig {
        usart: UsartId::Usart1,
        baud: 115_200,
        word_length: WordLength::Eight,
        parity: Parity::None,
        stop_bits: StopBits::One,
        tx: true,
        rx: true,
    }),
    PeripheralConfig::I2c(I2cConfig {
        i2c: I2cId::I2c1,
        mode: I2cMode::Standard,
        scl_hz: 100_000,
        own_address: 0x00,
        address_width: AddressWidth::Seven,
    }),
    PeripheralConfig::Spi(SpiConfig {
        spi: SpiId::Spi1,
        mode: SpiMode::Mode0,
        bit_order: BitOrder::MsbFirst,
        frame: FrameSize::Eight,
        nss: Nss::Software,
        rate_hz: 9_000_000,
    }),
];

const _: () = assert!(peripheral::check_all(PERIPHERALS, &CLOCKS).is_ok(),
                      "peripheral rate not reachable from the bus clocks");
const _: () = assert!(peripheral::check_log_usart(PERIPHERALS, LOG_USART).is_ok(),
                      "log usart is not configured to transmit");

pub const TANUKI: BoardDescriptor = BoardDescriptor {
    clocks: CLOCK_CONFIG,
    pins: PINS,
    peripherals: PERIPHERALS,
    log_usart: LOG_USART,
};


// - bring-up state -----------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BringupState {
    Reset,
    ClocksConfigured,
    BussesEnabled,
    PinsMuxed,
    PeripheralsProgrammed,
    LogSinkBound,
    Halted,
}

/// A failed bring-up. The hardware is handed back so the caller can decide
/// between halting and trying again.
pub struct BringupFailure<H> {
    pub error: BringupError,
    /// Last state reached before the failure
    pub reached: BringupState,
    /// Always `Halted`
    pub state: BringupState,
    pub hw: H,
}

impl<H> core::fmt::Debug for BringupFailure<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BringupFailure")
            .field("error", &self.error)
            .field("reached", &self.reached)
            .field("state", &self.state)
            .finish()
    }
}


// - InitLatch ----------------------------------------------------------------

/// One-shot latch guarding the bring-up pipeline.
pub struct InitLatch {
    taken: Mutex<Cell<bool>>,
}

impl InitLatch {
    pub const fn new() -> Self {
        Self {
            taken: Mutex::new(Cell::new(false)),
        }
    }

    /// Returns `true` exactly once.
    pub fn try_take(&self) -> bool {
        critical_section::with(|cs| {
            let taken = self.taken.borrow(cs);
            if taken.get() {
                false
            } else {
                taken.set(true);
                true
            }
        })
    }

    pub fn is_taken(&self) -> bool {
        critical_section::with(|cs| self.taken.borrow(cs).get())
    }
}

impl Default for InitLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Set when `board_init` ran.
pub static BOARD_LATCH: InitLatch = InitLatch::new();


// - Board --------------------------------------------------------------------

/// The brought-up board.
///
/// Only exists once every stage has completed, so holding one means the
/// clocks are frozen, all pins are muxed and the log sink is bound.
pub struct Board<H: Hardware> {
    hw: H,
    descriptor: &'static BoardDescriptor,
    clocks: Clocks,
    log: LogSink,
    state: BringupState,
}

impl<H: Hardware> Board<H> {
    /// Runs the bring-up pipeline at most once per `latch`. Later calls
    /// return `Ok(None)` and leave the hardware alone.
    pub fn take(
        latch: &InitLatch,
        hw: H,
        descriptor: &'static BoardDescriptor,
    ) -> Result<Option<Self>, BringupFailure<H>> {
        if !latch.try_take() {
            log::warn!("board: already initialized");
            return Ok(None);
        }
        Self::bring_up(hw, descriptor).map(Some)
    }

    /// Runs the bring-up pipeline:
    ///
    ///   clocks → bus gates → pin muxing → peripherals → log sink
    pub fn bring_up(mut hw: H, descriptor: &'static BoardDescriptor) -> Result<Self, BringupFailure<H>> {
        let mut state = BringupState::Reset;
        let mut log = LogSink::new();

        macro_rules! stage {
            ($result:expr) => {
                match $result {
                    Ok(value) => value,
                    Err(error) => {
                        log::error!("board: bring-up failed after {:?}: {}", state, error);
                        let halted = advance(state, BringupState::Halted);
                        return Err(BringupFailure { error, reached: state, state: halted, hw });
                    }
                }
            };
        }

        let clocks = stage!(clocks::configure(&mut hw, &descriptor.clocks));
        state = advance(state, BringupState::ClocksConfigured);

        let gates = bus::required(descriptor.pins, descriptor.peripherals);
        bus::enable(&mut hw, &gates);
        state = advance(state, BringupState::BussesEnabled);

        stage!(pins::check(descriptor.pins));
        pins::apply(&mut hw, descriptor.pins);
        state = advance(state, BringupState::PinsMuxed);

        stage!(peripheral::init(&mut hw, descriptor.peripherals, &clocks));
        state = advance(state, BringupState::PeripheralsProgrammed);

        stage!(peripheral::check_log_usart(descriptor.peripherals, descriptor.log_usart));
        stage!(log.bind(descriptor.log_usart));
        let state = advance(state, BringupState::LogSinkBound);

        log::info!("board: up, sysclk={} Hz, log on {:?}", clocks.sysclk.raw(), descriptor.log_usart);

        Ok(Self { hw, descriptor, clocks, log, state })
    }

    pub fn state(&self) -> BringupState {
        self.state
    }

    pub fn clocks(&self) -> &Clocks {
        &self.clocks
    }

    pub fn descriptor(&self) -> &'static BoardDescriptor {
        self.descriptor
    }

    pub fn log_usart(&self) -> UsartId {
        self.descriptor.log_usart
    }

    /// Bytes written to the sink before it was bound
    pub fn log_dropped(&self) -> usize {
        self.log.dropped()
    }

    /// Sends `bytes` to the log USART, in call order.
    pub fn write_log(&mut self, bytes: &[u8]) -> usize {
        self.log.write(&mut self.hw, bytes)
    }

    pub fn flush_log(&mut self) {
        self.log.flush(&mut self.hw)
    }

    /// `core::fmt::Write` access to the log USART
    pub fn log(&mut self) -> LogWriter<'_, H> {
        LogWriter::new(&mut self.log, &mut self.hw)
    }

    /// Drives a pin whose role is general-purpose output.
    pub fn set_output(&mut self, port: Port, pin: u8, level: Level) -> Result<(), PinError> {
        match pins::find(self.descriptor.pins, port, pin).map(|p| p.role) {
            Some(PinRole::Output(_)) => {
                self.hw.set_pin(port, pin, level == Level::High);
                Ok(())
            }
            Some(_) => Err(PinError::NotAnOutput { port, pin }),
            None => Err(PinError::Unassigned { port, pin }),
        }
    }

    /// Samples a pin whose role is general-purpose input or output.
    pub fn read_input(&self, port: Port, pin: u8) -> Result<Level, PinError> {
        match pins::find(self.descriptor.pins, port, pin).map(|p| p.role) {
            Some(PinRole::Input) | Some(PinRole::Output(_)) => {
                if self.hw.pin_is_high(port, pin) {
                    Ok(Level::High)
                } else {
                    Ok(Level::Low)
                }
            }
            Some(_) => Err(PinError::NotAnInput { port, pin }),
            None => Err(PinError::Unassigned { port, pin }),
        }
    }

    pub fn hw(&self) -> &H {
        &self.hw
    }

    /// Gives the hardware back.
    pub fn free(self) -> H {
        self.hw
    }
}

fn advance(from: BringupState, to: BringupState) -> BringupState {
    debug_assert!(to > from, "bring-up state moved backwards");
    log::debug!("board: {:?} -> {:?}", from, to);
    to
}


// - tests --------------------------------------------------------------------
