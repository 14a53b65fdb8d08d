//! Reader-side protocol engine.
//!
//! [`Rc522`] owns the register bus and drives the chip through the generic
//! request/response primitive every higher-level operation is built from:
//! load the FIFO, start a command, poll the interrupt flags within a bounded
//! budget, decode the error register, drain the reply and optionally verify
//! its CRC_A trailer.
//!
//! The order of the failure checks in [`Rc522::communicate`] is part of the
//! contract: framing errors are decoded before the collision flag and the
//! collision flag before CRC verification, so a compound failure always
//! surfaces the same way to callers that branch on the outcome.

use log::{debug, trace, warn};

use crate::bus::RegisterBus;
use crate::config::Config;
use crate::error::Error;
use crate::regs::{
    bit_framing, coll, com_irq, command_reg, control, div_irq, err, fifo_level, status2,
    tx_control, PcdCommand, Register,
};

/// Shape of a received reply: how many bytes landed in the caller's buffer
/// and how many bits of the final byte are valid (0 meaning all eight).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub len: usize,
    pub last_bits: u8,
}

/// MFRC522 driver, generic over the register transport.
///
/// All operations are synchronous and run to completion on the caller's
/// context; the only suspension points are the iteration-bounded spin polls
/// configured through [`Config`].
#[derive(Debug)]
pub struct Rc522<B> {
    pub(crate) bus: B,
    pub(crate) config: Config,
}

impl<B: RegisterBus> Rc522<B> {
    pub fn new(bus: B) -> Self {
        Self::with_config(bus, Config::default())
    }

    pub fn with_config(bus: B, config: Config) -> Self {
        Self { bus, config }
    }

    /// Hand the register bus back.
    pub fn release(self) -> B {
        self.bus
    }

    /// Bring the chip into its standard operating state: transparent tx/rx
    /// framing, the 25 ms receive timeout armed on every transmission, 100 %
    /// ASK modulation, CRC_A preset, antenna on.
    pub fn init(&mut self) -> Result<(), Error<B::Error>> {
        self.bus.write_register(Register::TxModeReg, 0x00)?;
        self.bus.write_register(Register::RxModeReg, 0x00)?;
        self.bus.write_register(Register::ModWidthReg, 0x26)?;
        // TAuto=1: the timer starts when the transmission ends, which is what
        // turns "card never answered" into a timer interrupt for the poll
        // loop below.
        self.bus.write_register(Register::TModeReg, 0x80)?;
        self.bus.write_register(Register::TPrescalerReg, 0xA9)?; // 40 kHz tick
        self.bus.write_register(Register::TReloadRegHigh, 0x03)?;
        self.bus.write_register(Register::TReloadRegLow, 0xE8)?; // 1000 ticks = 25 ms
        self.bus.write_register(Register::TxAskReg, 0x40)?;
        self.bus.write_register(Register::ModeReg, 0x3D)?; // CRC preset 0x6363
        self.antenna_on()?;
        debug!("reader initialised, antenna on");
        Ok(())
    }

    /// Enable the antenna drivers if they are not both on already.
    pub fn antenna_on(&mut self) -> Result<(), Error<B::Error>> {
        let value = self.bus.read_register(Register::TxControlReg)?;
        if value & tx_control::TX12_RF_EN != tx_control::TX12_RF_EN {
            self.bus
                .write_register(Register::TxControlReg, value | tx_control::TX12_RF_EN)?;
        }
        Ok(())
    }

    pub fn antenna_off(&mut self) -> Result<(), Error<B::Error>> {
        self.clear_bitmask(Register::TxControlReg, tx_control::TX12_RF_EN)
    }

    /// Put the chip into soft power-down. Any register access wakes it.
    pub fn soft_power_down(&mut self) -> Result<(), Error<B::Error>> {
        self.set_bitmask(Register::CommandReg, command_reg::POWER_DOWN)
    }

    /// Read-modify-write: set `mask` bits in `reg`.
    pub fn set_bitmask(&mut self, reg: Register, mask: u8) -> Result<(), Error<B::Error>> {
        let value = self.bus.read_register(reg)?;
        self.bus.write_register(reg, value | mask)?;
        Ok(())
    }

    /// Read-modify-write: clear `mask` bits in `reg`.
    pub fn clear_bitmask(&mut self, reg: Register, mask: u8) -> Result<(), Error<B::Error>> {
        let value = self.bus.read_register(reg)?;
        self.bus.write_register(reg, value & !mask)?;
        Ok(())
    }

    /// Run the chip's CRC coprocessor over `data` and return the checksum as
    /// it appears on the wire: low byte first.
    pub fn calculate_crc(&mut self, data: &[u8]) -> Result<[u8; 2], Error<B::Error>> {
        self.bus
            .write_register(Register::CommandReg, PcdCommand::Idle as u8)?;
        self.bus.write_register(Register::DivIrqReg, div_irq::CRC)?;
        self.bus
            .write_register(Register::FifoLevelReg, fifo_level::FLUSH)?;
        self.bus.write_burst(Register::FifoDataReg, data)?;
        self.bus
            .write_register(Register::CommandReg, PcdCommand::CalcCrc as u8)?;

        for _ in 0..self.config.crc_poll_budget {
            let irq = self.bus.read_register(Register::DivIrqReg)?;
            if irq & div_irq::CRC != 0 {
                self.bus
                    .write_register(Register::CommandReg, PcdCommand::Idle as u8)?;
                let low = self.bus.read_register(Register::CrcResultRegLow)?;
                let high = self.bus.read_register(Register::CrcResultRegHigh)?;
                return Ok([low, high]);
            }
        }
        warn!("CRC coprocessor did not finish within the poll budget");
        Err(Error::Timeout)
    }

    /// Transmit `send` and receive into `recv` with the transceive command.
    pub fn transceive(
        &mut self,
        send: &[u8],
        recv: Option<&mut [u8]>,
        tx_last_bits: u8,
        rx_align: u8,
        check_crc: bool,
    ) -> Result<Reply, Error<B::Error>> {
        self.communicate(
            PcdCommand::Transceive,
            com_irq::RX | com_irq::IDLE,
            send,
            recv,
            tx_last_bits,
            rx_align,
            check_crc,
        )
    }

    /// The generic request/response primitive.
    ///
    /// `wait_irq` is the set of `ComIrqReg` bits that signals completion of
    /// `command`. `tx_last_bits` is the number of significant bits in the
    /// final byte of `send` (0 for all eight); `rx_align` the bit position
    /// the first received bit is packed at.
    #[allow(clippy::too_many_arguments)]
    pub fn communicate(
        &mut self,
        command: PcdCommand,
        wait_irq: u8,
        send: &[u8],
        mut recv: Option<&mut [u8]>,
        tx_last_bits: u8,
        rx_align: u8,
        check_crc: bool,
    ) -> Result<Reply, Error<B::Error>> {
        let framing = (rx_align << 4) | (tx_last_bits & 0x07);

        self.bus
            .write_register(Register::CommandReg, PcdCommand::Idle as u8)?;
        self.bus
            .write_register(Register::ComIrqReg, com_irq::CLEAR_ALL)?;
        self.bus
            .write_register(Register::FifoLevelReg, fifo_level::FLUSH)?;
        self.bus.write_burst(Register::FifoDataReg, send)?;
        self.bus.write_register(Register::BitFramingReg, framing)?;
        self.bus.write_register(Register::CommandReg, command as u8)?;
        if command == PcdCommand::Transceive {
            // Transceive is the one command that needs an explicit kick.
            self.set_bitmask(Register::BitFramingReg, bit_framing::START_SEND)?;
        }
        trace!(
            "issued {:?}: {} byte(s), {} bit(s) in last byte",
            command,
            send.len(),
            tx_last_bits
        );

        let mut completed = false;
        for _ in 0..self.config.irq_poll_budget {
            let irq = self.bus.read_register(Register::ComIrqReg)?;
            if irq & wait_irq != 0 {
                completed = true;
                break;
            }
            if irq & com_irq::TIMER != 0 {
                // RF timeout: the card never answered.
                return Err(Error::Timeout);
            }
        }
        if !completed {
            // Not even the timer fired; the reader itself may be gone.
            warn!("poll budget exhausted with no interrupt from the reader");
            return Err(Error::Timeout);
        }

        // Read once; the same snapshot feeds the framing check here and the
        // collision check after the reply has been drained.
        let error_bits = self.bus.read_register(Register::ErrorReg)?;
        if error_bits & (err::BUFFER_OVFL | err::PARITY | err::PROTOCOL) != 0 {
            warn!("reader error register {error_bits:#04x}");
            return Err(Error::Communication);
        }

        let mut reply = Reply { len: 0, last_bits: 0 };
        if let Some(buf) = recv.as_deref_mut() {
            let level =
                (self.bus.read_register(Register::FifoLevelReg)? & fifo_level::LEVEL_MASK) as usize;
            if level > buf.len() {
                return Err(Error::BufferTooSmall);
            }
            self.bus
                .read_burst(Register::FifoDataReg, &mut buf[..level], rx_align)?;
            reply.len = level;
            reply.last_bits = self.bus.read_register(Register::ControlReg)? & control::RX_LAST_BITS;
        }

        // After the drain, so the caller still gets the bytes that made it.
        if error_bits & err::COLLISION != 0 {
            return Err(Error::Collision);
        }

        if check_crc {
            if let Some(buf) = recv {
                if reply.len > 0 {
                    if reply.len == 1 && reply.last_bits == 4 {
                        // The chip's standard negative acknowledge pattern.
                        return Err(Error::MifareNack);
                    }
                    if reply.len < 2 || reply.last_bits != 0 {
                        return Err(Error::CrcMismatch);
                    }
                    let crc = self.calculate_crc(&buf[..reply.len - 2])?;
                    if buf[reply.len - 2] != crc[0] || buf[reply.len - 1] != crc[1] {
                        return Err(Error::CrcMismatch);
                    }
                }
            }
        }

        Ok(reply)
    }

    /// Drop a live Crypto1 session. Must be called before the card can be
    /// selected again or a different sector authenticated from scratch.
    pub fn stop_crypto1(&mut self) -> Result<(), Error<B::Error>> {
        self.clear_bitmask(Register::Status2Reg, status2::CRYPTO1_ON)
    }

    /// Reset collision handling so stale state from an earlier exchange
    /// cannot leak into the next one.
    pub(crate) fn prepare_for_anticollision(&mut self) -> Result<(), Error<B::Error>> {
        self.clear_bitmask(Register::CollReg, coll::VALUES_AFTER_COLL)
    }
}
