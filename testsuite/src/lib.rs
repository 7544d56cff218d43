#![no_std]

use core::fmt::Write;

use panic_probe as _;         // panic handler
use defmt_rtt as _;           // global logger
use tanuki_bsp as tanuki;     // bsp


pub type Board = tanuki::Board<tanuki::stm32f1::Stm32f1>;


// - panic handler ------------------------------------------------------------

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}


// - board initialization -----------------------------------------------------

pub fn init() -> Board {
    defmt::debug!("initializing board");
    let mut board = defmt::unwrap!(tanuki::board_init());
    defmt::unwrap!(writeln!(board.log(), "testsuite: board up").map_err(|_| ()));
    board
}
