use heapless::Vec;

use crate::hw::{BusControl, BusGate};
use crate::peripheral::PeripheralConfig;
use crate::pins::PinAssignment;


/// Every gate this chip has: 5 GPIO ports, 3 USARTs, 2 I2Cs, 2 SPIs
pub const MAX_GATES: usize = 12;

pub type Gates = Vec<BusGate, MAX_GATES>;

/// Collects the clock gates the board uses: the GPIO ports of every pin
/// assignment first, then each referenced peripheral, each gate once.
pub fn required(pins: &[PinAssignment], peripherals: &[PeripheralConfig]) -> Gates {
    let mut gates = Gates::new();
    let wanted = pins.iter()
        .map(|p| BusGate::Gpio(p.port))
        .chain(peripherals.iter().map(|p| p.gate()));
    for gate in wanted {
        if !gates.contains(&gate) {
            // can't overflow, MAX_GATES covers every distinct gate
            let _ = gates.push(gate);
        }
    }
    gates
}

/// Enables each gate. Gating a running clock again is harmless.
pub fn enable<B: BusControl>(bus: &mut B, gates: &[BusGate]) {
    for &gate in gates {
        bus.enable_gate(gate);
    }
    log::debug!("bus: {} clock gates enabled", gates.len());
}


// - tests --------------------------------------------------------------------
