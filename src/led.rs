use crate::board::{Board, STATUS_LED};
use crate::hw::{Hardware, Port};
use crate::pins::Level;


// - traits -------------------------------------------------------------------

/// Generic LED
pub trait Led {
    /// Turns the LED off
    fn off(&mut self);

    /// Turns the LED on
    fn on(&mut self);

    fn toggle(&mut self);
}


// - StatusLed ----------------------------------------------------------------

/// LED wired between VDD and the pin, lit when the pin is low
pub struct StatusLed<'a, H: Hardware> {
    board: &'a mut Board<H>,
    port: Port,
    pin: u8,
}

impl<'a, H: Hardware> StatusLed<'a, H> {
    pub fn new(board: &'a mut Board<H>) -> Self {
        Self {
            board,
            port: STATUS_LED.0,
            pin: STATUS_LED.1,
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self.board.read_input(self.port, self.pin), Ok(Level::Low))
    }
}

impl<H: Hardware> Led for StatusLed<'_, H> {
    fn on(&mut self) {
        if let Ok(()) = self.board.set_output(self.port, self.pin, Level::Low) {}
    }

    fn off(&mut self) {
        if let Ok(()) = self.board.set_output(self.port, self.pin, Level::High) {}
    }

    fn toggle(&mut self) {
        if self.is_on() {
            self.off();
        } else {
            self.on();
        }
    }
}

impl<H: Hardware> Board<H> {
    pub fn status_led(&mut self) -> StatusLed<'_, H> {
        StatusLed::new(self)
    }
}


// - tests --------------------------------------------------------------------
