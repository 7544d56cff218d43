//! Board support crate for the tanuki STM32F103 board
//!
//! Brings the board from reset to a known-good state: clock tree, bus
//! clock gates, pin multiplexing, on-chip peripherals and a diagnostic log
//! on USART1.
//!
//! The board is described once, as data, in [`board::TANUKI`]. Rates that
//! can't be reached and pins claimed twice are rejected while the crate
//! builds. The bring-up pipeline itself talks to the chip through the
//! capability traits in [`hw`], so it runs against the real registers on
//! the target and against a recording fake in host tests.
//!
//! # Usage - see demos/
//! ```ignore
//! let mut board = tanuki_bsp::board_init().unwrap();
//! writeln!(board.log(), "hello from {} Hz", board.clocks().sysclk.raw()).ok();
//! ```

#![cfg_attr(not(test), no_std)]

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use stm32f1xx_hal as hal;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use hal::pac;


/// Frequencies, in Hz
pub type Hertz = fugit::HertzU32;


// - modules ------------------------------------------------------------------

pub mod board;
pub mod bus;
pub mod clocks;
pub mod error;
pub mod hw;
pub mod i2c;
pub mod led;
pub mod log_sink;
pub mod peripheral;
pub mod pins;
pub mod spi;
pub mod usart;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod stm32f1;

#[cfg(test)]
mod mock;

pub use board::{Board, BoardDescriptor, BringupFailure, BringupState, InitLatch, TANUKI};
pub use clocks::Clocks;
pub use error::{BringupError, PinError};
pub use led::Led;


// - global static state ------------------------------------------------------

// `no_mangle` is used here to prevent linking different minor
// versions of this crate as that would let you bring the board up
// more than once (one per minor version)
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[no_mangle]
static TANUKI_BOARD: () = ();


// - board_init ---------------------------------------------------------------

/// Brings the board up *once*.
///
/// Later calls return `None` without touching the hardware. A clock that
/// never stabilizes halts the core; there is no sane fallback without a
/// running system clock.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn board_init() -> Option<Board<stm32f1::Stm32f1>> {
    if board::BOARD_LATCH.is_taken() {
        return None;
    }
    let hw = stm32f1::Stm32f1::take()?;
    // interrupts stay masked for the whole pipeline
    let result = critical_section::with(|_| Board::take(&board::BOARD_LATCH, hw, &TANUKI));
    match result {
        Ok(board) => board,
        Err(failure) => stm32f1::halt(failure.error, failure.reached),
    }
}
