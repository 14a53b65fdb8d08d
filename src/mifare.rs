//! Card session operations: presence, request/wakeup, halt, Crypto1
//! authentication and block reads. Thin sequences over the communicate
//! engine; every retry decision stays with the caller.

use log::debug;

use crate::bus::RegisterBus;
use crate::error::Error;
use crate::pcd::Rc522;
use crate::picc::{MifareKey, MifareKeyType, Uid};
use crate::regs::{com_irq, picc_cmd, PcdCommand, Register};

/// A MIFARE block read replies with 16 data bytes plus the CRC_A trailer;
/// the caller's buffer must hold all of it.
pub const READ_BLOCK_REPLY_LEN: usize = 18;

impl<B: RegisterBus> Rc522<B> {
    /// REQA: invite idle cards in range to announce themselves.
    pub fn request_a(&mut self) -> Result<[u8; 2], Error<B::Error>> {
        self.reqa_or_wupa(picc_cmd::REQA)
    }

    /// WUPA: like [`request_a`](Self::request_a), but also brings halted
    /// cards back to the ready state.
    pub fn wakeup_a(&mut self) -> Result<[u8; 2], Error<B::Error>> {
        self.reqa_or_wupa(picc_cmd::WUPA)
    }

    fn reqa_or_wupa(&mut self, command: u8) -> Result<[u8; 2], Error<B::Error>> {
        self.prepare_for_anticollision()?;
        // Short frame: only 7 bits of the single command byte go out. Leave
        // headroom in the buffer so an overlong answer is diagnosed as a
        // malformed ATQA rather than as a full FIFO.
        let mut atqa = [0u8; 4];
        let reply = self.transceive(&[command], Some(&mut atqa), 7, 0, false)?;
        if reply.len != 2 || reply.last_bits != 0 {
            // The ATQA is exactly 16 bits, nothing else counts.
            return Err(Error::Communication);
        }
        Ok([atqa[0], atqa[1]])
    }

    /// HLTA: send the selected card to the halt state.
    ///
    /// A card that obeys goes quiet, so the expected success outcome is the
    /// RF timeout; any answer at all means the halt was not accepted.
    pub fn halt_a(&mut self) -> Result<(), Error<B::Error>> {
        let mut frame = [picc_cmd::HLTA, 0, 0, 0];
        let crc = self.calculate_crc(&frame[..2])?;
        frame[2] = crc[0];
        frame[3] = crc[1];
        match self.transceive(&frame, None, 0, 0, false) {
            Err(Error::Timeout) => Ok(()),
            Ok(_) => Err(Error::Communication),
            Err(e) => Err(e),
        }
    }

    /// Arm the chip's Crypto1 unit for one sector of a selected card.
    ///
    /// Success means all following traffic to that sector is enciphered by
    /// the chip; nothing comes back over the RF interface. End the session
    /// with [`stop_crypto1`](Self::stop_crypto1).
    pub fn authenticate(
        &mut self,
        key_type: MifareKeyType,
        block_addr: u8,
        key: &MifareKey,
        uid: &Uid,
    ) -> Result<(), Error<B::Error>> {
        let size = uid.len();
        if size < 4 {
            return Err(Error::InvalidArgument);
        }
        let mut frame = [0u8; 12];
        frame[0] = key_type.command();
        frame[1] = block_addr;
        frame[2..8].copy_from_slice(&key.0);
        // The cipher is keyed on the last four identifier bytes.
        frame[8..12].copy_from_slice(&uid.bytes[size - 4..size]);
        self.communicate(PcdCommand::MfAuthent, com_irq::IDLE, &frame, None, 0, 0, false)?;
        debug!("crypto1 session armed for block {block_addr}");
        Ok(())
    }

    /// Read one 16-byte block from a sector the chip is authenticated to.
    ///
    /// `buffer` must hold at least [`READ_BLOCK_REPLY_LEN`] bytes (checked
    /// before any bus activity) and receives the data plus the verified
    /// CRC_A trailer. Returns the reply length.
    pub fn mifare_read(&mut self, block_addr: u8, buffer: &mut [u8]) -> Result<usize, Error<B::Error>> {
        if buffer.len() < READ_BLOCK_REPLY_LEN {
            return Err(Error::BufferTooSmall);
        }
        let crc = self.calculate_crc(&[picc_cmd::MF_READ, block_addr])?;
        let frame = [picc_cmd::MF_READ, block_addr, crc[0], crc[1]];
        let reply = self.transceive(&frame, Some(buffer), 0, 0, true)?;
        Ok(reply.len)
    }

    /// Whether a card is in range right now.
    ///
    /// The demodulator registers are rewritten first in case an earlier
    /// aborted exchange left them in a non-default state. A collision counts
    /// as presence, since it means at least two cards answered.
    pub fn is_new_card_present(&mut self) -> Result<bool, Error<B::Error>> {
        self.bus.write_register(Register::TxModeReg, 0x00)?;
        self.bus.write_register(Register::RxModeReg, 0x00)?;
        self.bus.write_register(Register::ModWidthReg, 0x26)?;

        match self.request_a() {
            Ok(_) | Err(Error::Collision) => Ok(true),
            Err(e @ Error::Bus { .. }) => Err(e),
            Err(_) => Ok(false),
        }
    }

    /// Resolve the UID of a card in range from scratch.
    pub fn read_card_serial(&mut self) -> Result<Uid, Error<B::Error>> {
        let mut uid = Uid::default();
        self.select(&mut uid, 0)?;
        Ok(uid)
    }
}
