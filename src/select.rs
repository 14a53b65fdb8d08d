//! Anti-collision and selection.
//!
//! A card identifier is resolved one cascade level at a time, each level
//! owning a 3- or 4-byte slice of the UID. Within a level the engine keeps
//! transmitting the bits it already knows; every bus collision pins down one
//! more bit (the engine always continues with that bit set to one), so the
//! loop converges in at most 32 rounds per level and never by blind retry.
//! Resolving all 32 bits is not yet a selection; the closing full-level
//! frame is what actually selects the card and earns the SAK.

use log::{debug, warn};

use crate::bus::RegisterBus;
use crate::error::Error;
use crate::pcd::Rc522;
use crate::picc::Uid;
use crate::regs::{coll, picc_cmd, Register};

// Level frame layout, per ISO 14443-3:
//   byte 0      SEL: cascade-level command
//   byte 1      NVB: high nibble whole bytes in the frame, low nibble extra bits
//   bytes 2..6  UID slice for this level, byte 2 being the cascade tag when
//               more of the UID remains beyond this level
//   byte 6      BCC, XOR of bytes 2..6 (full frame only)
//   bytes 7..9  CRC_A (full frame only)
const SELECT_FRAME_LEN: usize = 9;

/// NVB value announcing a complete seven-byte frame.
const NVB_FULL: u8 = 0x70;

/// SAK bit signalling the UID is not complete yet.
const SAK_UID_NOT_COMPLETE: u8 = 0x04;

impl<B: RegisterBus> Rc522<B> {
    /// Resolve and select one card.
    ///
    /// `known_bits` lets a caller resume a selection with an identifier
    /// prefix it already holds in `uid` (0 selects any card from scratch).
    /// On success `uid` carries the full identifier (4, 7 or 10 bytes) and
    /// the SAK byte the card closed the selection with.
    pub fn select(&mut self, uid: &mut Uid, known_bits: u8) -> Result<(), Error<B::Error>> {
        if known_bits > 80 {
            return Err(Error::InvalidArgument);
        }
        self.prepare_for_anticollision()?;

        let mut buffer = [0u8; SELECT_FRAME_LEN];
        let mut cascade_level: u8 = 1;

        loop {
            let (sel_cmd, uid_index, use_cascade_tag) = match cascade_level {
                1 => (picc_cmd::SEL_CL1, 0usize, known_bits != 0 && uid.size > 4),
                2 => (picc_cmd::SEL_CL2, 3, known_bits != 0 && uid.size > 7),
                3 => (picc_cmd::SEL_CL3, 6, false),
                _ => return Err(Error::Internal),
            };
            buffer[0] = sel_cmd;

            // Bits of this level's 32-bit slice the caller already knows.
            let mut current_known = (i16::from(known_bits) - 8 * uid_index as i16).max(0) as i8;
            let mut index = 2;
            if use_cascade_tag {
                buffer[index] = picc_cmd::CT;
                index += 1;
            }
            let mut bytes_to_copy =
                (current_known / 8) as usize + usize::from(current_known % 8 != 0);
            if bytes_to_copy > 0 {
                bytes_to_copy = bytes_to_copy.min(if use_cascade_tag { 3 } else { 4 });
                buffer[index..index + bytes_to_copy]
                    .copy_from_slice(&uid.bytes[uid_index..uid_index + bytes_to_copy]);
            }
            if use_cascade_tag {
                // The tag occupies the first 8 bits of the slice on the wire.
                current_known += 8;
            }
            debug!("cascade level {cascade_level}: {current_known} bit(s) known");

            let sak_reply = loop {
                if current_known >= 32 {
                    // Whole slice known: transmit the closing SELECT frame.
                    buffer[1] = NVB_FULL;
                    buffer[6] = buffer[2] ^ buffer[3] ^ buffer[4] ^ buffer[5];
                    let crc = self.calculate_crc(&buffer[..7])?;
                    buffer[7] = crc[0];
                    buffer[8] = crc[1];

                    self.bus.write_register(Register::BitFramingReg, 0)?;
                    let frame = buffer;
                    // The SAK reply lands where BCC and CRC_A sat; they are
                    // not needed once transmitted.
                    match self.transceive(&frame, Some(&mut buffer[6..9]), 0, 0, false) {
                        Ok(reply) => break reply,
                        Err(Error::Collision) => {
                            self.resolve_collision(&mut buffer, &mut current_known)?
                        }
                        Err(e) => return Err(e),
                    }
                } else {
                    // Partial knowledge: anticollision frame carrying just
                    // the known bits.
                    let tx_last_bits = (current_known % 8) as u8;
                    let whole_bytes = (current_known / 8) as usize;
                    let frame_len = 2 + whole_bytes;
                    buffer[1] = ((frame_len as u8) << 4) | tx_last_bits;
                    let buffer_used = frame_len + usize::from(tx_last_bits != 0);
                    let rx_align = tx_last_bits;

                    self.bus
                        .write_register(Register::BitFramingReg, (rx_align << 4) | tx_last_bits)?;
                    let frame = buffer;
                    match self.transceive(
                        &frame[..buffer_used],
                        Some(&mut buffer[frame_len..]),
                        tx_last_bits,
                        rx_align,
                        false,
                    ) {
                        Ok(_) => {
                            // The card supplied every remaining bit of the
                            // slice; go round once more for the real SELECT.
                            current_known = 32;
                        }
                        Err(Error::Collision) => {
                            self.resolve_collision(&mut buffer, &mut current_known)?
                        }
                        Err(e) => return Err(e),
                    }
                }
            };

            // Take the resolved slice out of the frame before validating the
            // SAK; the BCC was ours, so it is not re-checked.
            let (src, count) = if buffer[2] == picc_cmd::CT {
                (3usize, 3usize)
            } else {
                (2, 4)
            };
            uid.bytes[uid_index..uid_index + count].copy_from_slice(&buffer[src..src + count]);

            // SAK must be exactly one byte plus its CRC_A.
            if sak_reply.len != 3 || sak_reply.last_bits != 0 {
                return Err(Error::Communication);
            }
            let crc = self.calculate_crc(&buffer[6..7])?;
            if crc[0] != buffer[7] || crc[1] != buffer[8] {
                return Err(Error::CrcMismatch);
            }

            if buffer[6] & SAK_UID_NOT_COMPLETE != 0 {
                cascade_level += 1;
            } else {
                uid.sak = buffer[6];
                uid.size = 3 * cascade_level + 1;
                debug!(
                    "selected card, {}-byte uid, sak {:#04x}",
                    uid.size, uid.sak
                );
                return Ok(());
            }
        }
    }

    /// Work out where the bus clashed and continue with that bit set to one.
    fn resolve_collision(
        &mut self,
        buffer: &mut [u8; SELECT_FRAME_LEN],
        current_known: &mut i8,
    ) -> Result<(), Error<B::Error>> {
        let coll_value = self.bus.read_register(Register::CollReg)?;
        if coll_value & coll::POSITION_NOT_VALID != 0 {
            // No usable position: the clash cannot be arbitrated.
            return Err(Error::Collision);
        }
        let mut position = coll_value & coll::POSITION_MASK;
        if position == 0 {
            position = 32;
        }
        if position as i8 <= *current_known {
            // A collision at a bit we already resolved means no progress is
            // possible; bail out rather than loop.
            return Err(Error::Internal);
        }
        warn!("collision at bit {position}, continuing with that bit set");

        *current_known = position as i8;
        let bit = ((*current_known - 1) % 8) as u8;
        let partial_byte = usize::from(*current_known % 8 != 0);
        let index = 1 + (*current_known / 8) as usize + partial_byte;
        buffer[index] |= 1 << bit;
        Ok(())
    }
}
