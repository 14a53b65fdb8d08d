//! Register transport boundary.
//!
//! The MFRC522 exposes its register file over several physical buses; the
//! protocol engine only ever talks to [`RegisterBus`]. One trait call is one
//! chip-select-framed exchange, atomic from the chip's point of view, and the
//! implementation carries no protocol knowledge. [`SpiRegisterBus`] is the
//! stock implementation over any [`embedded_hal::spi::SpiDevice`].

use embedded_hal::spi::{Operation, SpiDevice};

use crate::regs::Register;

/// Depth of the chip's FIFO; no burst ever moves more bytes than this.
pub const FIFO_DEPTH: usize = 64;

/// Access to the MFRC522 register file.
///
/// The driver assumes exclusive ownership of the bus for the duration of any
/// multi-step operation; interleaving foreign register traffic with a running
/// selection or authentication corrupts the chip-side session state.
pub trait RegisterBus {
    type Error: core::fmt::Debug;

    /// Write one register.
    fn write_register(&mut self, reg: Register, value: u8) -> Result<(), Self::Error>;

    /// Write a burst of bytes to one register address (FIFO loads).
    fn write_burst(&mut self, reg: Register, values: &[u8]) -> Result<(), Self::Error>;

    /// Read one register.
    fn read_register(&mut self, reg: Register) -> Result<u8, Self::Error>;

    /// Read `buf.len()` bytes from one register address (FIFO drains).
    ///
    /// When `rx_align` is nonzero the first byte is merged instead of
    /// overwritten: its low `rx_align` bits keep the value already in `buf`
    /// and only the high bits are taken from the chip. The selection engine
    /// relies on this to stitch a partially-known byte together with the
    /// bits a card just supplied.
    fn read_burst(&mut self, reg: Register, buf: &mut [u8], rx_align: u8)
        -> Result<(), Self::Error>;
}

/// [`RegisterBus`] over a SPI device.
///
/// Address framing per the datasheet: the 7-bit register number is shifted
/// left one, bit 7 set for a read and clear for a write, bit 0 always zero.
#[derive(Debug)]
pub struct SpiRegisterBus<SPI> {
    spi: SPI,
}

impl<SPI> SpiRegisterBus<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Hand the SPI device back.
    pub fn release(self) -> SPI {
        self.spi
    }

    fn read_addr(reg: Register) -> u8 {
        0x80 | ((reg as u8) << 1)
    }

    fn write_addr(reg: Register) -> u8 {
        ((reg as u8) << 1) & 0x7E
    }
}

impl<SPI: SpiDevice> RegisterBus for SpiRegisterBus<SPI> {
    type Error = SPI::Error;

    fn write_register(&mut self, reg: Register, value: u8) -> Result<(), Self::Error> {
        self.spi.write(&[Self::write_addr(reg), value])
    }

    fn write_burst(&mut self, reg: Register, values: &[u8]) -> Result<(), Self::Error> {
        self.spi.transaction(&mut [
            Operation::Write(&[Self::write_addr(reg)]),
            Operation::Write(values),
        ])
    }

    fn read_register(&mut self, reg: Register) -> Result<u8, Self::Error> {
        let mut frame = [Self::read_addr(reg), 0];
        self.spi.transfer_in_place(&mut frame)?;
        Ok(frame[1])
    }

    fn read_burst(
        &mut self,
        reg: Register,
        buf: &mut [u8],
        rx_align: u8,
    ) -> Result<(), Self::Error> {
        if buf.is_empty() {
            return Ok(());
        }
        let n = buf.len().min(FIFO_DEPTH);
        let addr = Self::read_addr(reg);

        // The chip streams the register for as long as the address keeps
        // getting clocked; the final byte clocks zero to close the burst.
        let mut clock_out: heapless::Vec<u8, FIFO_DEPTH> = heapless::Vec::new();
        clock_out.resize(n, addr).ok();
        if let Some(last) = clock_out.last_mut() {
            *last = 0;
        }
        let mut incoming: heapless::Vec<u8, FIFO_DEPTH> = heapless::Vec::new();
        incoming.resize(n, 0).ok();

        self.spi.transaction(&mut [
            Operation::Write(&[addr]),
            Operation::Transfer(&mut incoming, &clock_out),
        ])?;

        if rx_align > 0 {
            let mask = 0xFFu8 << rx_align;
            buf[0] = (buf[0] & !mask) | (incoming[0] & mask);
            buf[1..n].copy_from_slice(&incoming[1..n]);
        } else {
            buf[..n].copy_from_slice(&incoming);
        }
        Ok(())
    }
}
