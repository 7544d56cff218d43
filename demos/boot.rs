#![no_main]
#![no_std]

use core::fmt::Write;

use cortex_m_rt::entry;
use panic_halt as _;

use tanuki::led::Led;
use tanuki_bsp as tanuki;

#[entry]
fn main() -> ! {
    // - board setup ----------------------------------------------------------

    let mut board = match tanuki::board_init() {
        Some(board) => board,
        None => panic!("board already initialized"),
    };

    let clocks = *board.clocks();
    writeln!(board.log(), "tanuki: sysclk {} Hz, pclk1 {} Hz, pclk2 {} Hz",
             clocks.sysclk.raw(), clocks.pclk1.raw(), clocks.pclk2.raw()).ok();

    // a second call is a no-op
    if tanuki::board_init().is_none() {
        writeln!(board.log(), "tanuki: board_init is idempotent").ok();
    }

    // - main loop ------------------------------------------------------------

    let half_second = clocks.sysclk.raw() / 2;
    let mut count = 0_u32;

    loop {
        board.status_led().on();
        cortex_m::asm::delay(half_second);

        board.status_led().off();
        cortex_m::asm::delay(half_second);

        count = count.wrapping_add(1);
        writeln!(board.log(), "tick {}", count).ok();
    }
}
