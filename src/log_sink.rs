//! Diagnostic output
//!
//! Exactly one USART carries log output. Until it is bound, written bytes
//! are dropped and counted; nothing is buffered. Once bound the sink can't
//! be rebound.

use core::fmt;

use crate::error::BringupError;
use crate::hw::{PeripheralControl, UsartId};


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    Unbound,
    Bound(UsartId),
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogSink {
    state: State,
    dropped: usize,
}

impl LogSink {
    pub const fn new() -> Self {
        Self {
            state: State::Unbound,
            dropped: 0,
        }
    }

    /// Binds the sink to `usart`. The USART must already be programmed.
    pub fn bind(&mut self, usart: UsartId) -> Result<(), BringupError> {
        match self.state {
            State::Unbound => {
                self.state = State::Bound(usart);
                Ok(())
            }
            State::Bound(_) => Err(BringupError::LogSinkAlreadyBound),
        }
    }

    pub fn bound(&self) -> Option<UsartId> {
        match self.state {
            State::Unbound => None,
            State::Bound(usart) => Some(usart),
        }
    }

    /// Bytes dropped because they were written before binding
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Sends `bytes` through the bound USART, blocking until each byte is
    /// accepted. Returns the number of bytes delivered.
    pub fn write<P: PeripheralControl>(&mut self, hw: &mut P, bytes: &[u8]) -> usize {
        let usart = match self.state {
            State::Unbound => {
                self.dropped += bytes.len();
                return 0;
            }
            State::Bound(usart) => usart,
        };
        for &byte in bytes {
            if let Err(never) = nb::block!(hw.usart_write(usart, byte)) {
                match never {}
            }
        }
        bytes.len()
    }

    /// Waits for the last byte to leave the wire.
    pub fn flush<P: PeripheralControl>(&mut self, hw: &mut P) {
        if let State::Bound(usart) = self.state {
            if let Err(never) = nb::block!(hw.usart_flush(usart)) {
                match never {}
            }
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}


// - LogWriter ----------------------------------------------------------------

/// `core::fmt::Write` adapter over a sink and the hardware it writes to.
pub struct LogWriter<'a, P> {
    sink: &'a mut LogSink,
    hw: &'a mut P,
}

impl<'a, P: PeripheralControl> LogWriter<'a, P> {
    pub fn new(sink: &'a mut LogSink, hw: &'a mut P) -> Self {
        Self { sink, hw }
    }
}

impl<P: PeripheralControl> fmt::Write for LogWriter<'_, P> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.sink.write(&mut *self.hw, s.as_bytes());
        Ok(())
    }
}


// - tests --------------------------------------------------------------------
