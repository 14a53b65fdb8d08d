//! A simulated MFRC522 for protocol-level tests.
//!
//! [`SimBus`] implements the driver's register transport and emulates the
//! chip itself: register file, FIFO, CRC coprocessor and the RF side of one
//! or more simulated cards, down to bit-accurate anticollision answers. It
//! keeps a log of every transmitted frame so tests can assert exactly what
//! the engine put on the air, plus a handful of misbehaviour knobs for the
//! failure paths.

#![allow(dead_code)]

use std::collections::HashMap;

use rc522::{regs::picc_cmd, Register, RegisterBus};

/// ISO/IEC 14443-A CRC_A reference: poly 0x8408 reflected, preset 0x6363,
/// transmitted low byte first.
pub fn crc_a(data: &[u8]) -> u16 {
    let mut crc: u16 = 0x6363;
    for &byte in data {
        let mut ch = byte ^ (crc & 0x00FF) as u8;
        ch ^= ch << 4;
        crc = (crc >> 8) ^ (u16::from(ch) << 8) ^ (u16::from(ch) << 3) ^ (u16::from(ch) >> 4);
    }
    crc
}

/// One simulated card in the field.
pub struct SimCard {
    pub uid: Vec<u8>,
    pub sak: u8,
    pub atqa: [u8; 2],
    pub key_a: [u8; 6],
    pub blocks: HashMap<u8, [u8; 16]>,
    pub halted: bool,
}

impl SimCard {
    pub fn new(uid: &[u8], sak: u8) -> Self {
        assert!(matches!(uid.len(), 4 | 7 | 10), "UID must be 4, 7 or 10 bytes");
        Self {
            uid: uid.to_vec(),
            sak,
            atqa: [0x04, 0x00],
            key_a: [0xFF; 6],
            blocks: HashMap::new(),
            halted: false,
        }
    }

    pub fn with_key_a(mut self, key: [u8; 6]) -> Self {
        self.key_a = key;
        self
    }

    pub fn with_block(mut self, addr: u8, data: [u8; 16]) -> Self {
        self.blocks.insert(addr, data);
        self
    }

    /// The 4 bytes this card puts on the wire for one cascade level, cascade
    /// tag included, or `None` if the level does not exist for this UID.
    fn level_bytes(&self, level: u8) -> Option<[u8; 4]> {
        let u = &self.uid;
        match (u.len(), level) {
            (4, 1) => Some([u[0], u[1], u[2], u[3]]),
            (7, 1) | (10, 1) => Some([picc_cmd::CT, u[0], u[1], u[2]]),
            (7, 2) => Some([u[3], u[4], u[5], u[6]]),
            (10, 2) => Some([picc_cmd::CT, u[3], u[4], u[5]]),
            (10, 3) => Some([u[6], u[7], u[8], u[9]]),
            _ => None,
        }
    }

    /// Level bytes plus BCC: the full 40-bit anticollision sequence.
    fn level_seq(&self, level: u8) -> Option<[u8; 5]> {
        let b = self.level_bytes(level)?;
        Some([b[0], b[1], b[2], b[3], b[0] ^ b[1] ^ b[2] ^ b[3]])
    }

    fn is_last_level(&self, level: u8) -> bool {
        matches!((self.uid.len(), level), (4, 1) | (7, 2) | (10, 3))
    }
}

/// One frame the driver transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFrame {
    pub bytes: Vec<u8>,
    pub last_bits: u8,
}

/// Error type of the simulated bus; it never actually fails.
#[derive(Debug)]
pub enum SimBusError {}

const REG_COUNT: usize = 0x40;

/// The simulated chip.
pub struct SimBus {
    regs: [u8; REG_COUNT],
    fifo: Vec<u8>,
    pub cards: Vec<SimCard>,
    /// Every frame the transceive command put on the air.
    pub frames: Vec<TxFrame>,
    /// Total register-bus operations, to prove "no bus activity" contracts.
    pub ops: usize,
    authenticated_sector: Option<u8>,

    // misbehaviour knobs
    /// Report collisions with the position-not-valid flag set.
    pub coll_position_invalid: bool,
    /// Report every anticollision frame as colliding at this raw position.
    pub stuck_collision: Option<u8>,
    /// Answer HLTA instead of going quiet.
    pub halt_acknowledged: bool,
    /// Append a third byte to the ATQA.
    pub atqa_extra_byte: bool,
    /// Answer a full SELECT with the bare SAK, no CRC_A trailer.
    pub short_sak: bool,
    /// Answer block reads with the 4-bit NAK pattern.
    pub nack_reads: bool,
    /// Flag a collision on REQA/WUPA (at least two cards answering).
    pub collide_on_request: bool,
}

impl SimBus {
    pub fn new() -> Self {
        Self::with_cards(Vec::new())
    }

    pub fn with_cards(cards: Vec<SimCard>) -> Self {
        Self {
            regs: [0; REG_COUNT],
            fifo: Vec::new(),
            cards,
            frames: Vec::new(),
            ops: 0,
            authenticated_sector: None,
            coll_position_invalid: false,
            stuck_collision: None,
            halt_acknowledged: false,
            atqa_extra_byte: false,
            short_sak: false,
            nack_reads: false,
            collide_on_request: false,
        }
    }

    fn reg(&self, reg: Register) -> u8 {
        self.regs[reg as usize]
    }

    /// Peek at a register value, for assertions.
    pub fn register(&self, reg: Register) -> u8 {
        self.reg(reg)
    }

    fn reg_mut(&mut self, reg: Register) -> &mut u8 {
        &mut self.regs[reg as usize]
    }

    fn pop_fifo(&mut self) -> u8 {
        if self.fifo.is_empty() {
            0
        } else {
            self.fifo.remove(0)
        }
    }

    fn done_irq(&mut self) {
        *self.reg_mut(Register::ComIrqReg) |= 0x30;
    }

    fn timer_irq(&mut self) {
        *self.reg_mut(Register::ComIrqReg) |= 0x01;
    }

    fn write(&mut self, reg: Register, value: u8) {
        match reg {
            Register::CommandReg => {
                *self.reg_mut(reg) = value;
                match value & 0x0F {
                    0x03 => self.exec_calc_crc(),
                    0x0E => self.exec_mf_authent(),
                    // transceive waits for the start-send kick
                    _ => {}
                }
            }
            // IRQ registers: bit 7 selects set (1) or clear (0) semantics.
            Register::ComIrqReg | Register::DivIrqReg => {
                if value & 0x80 == 0 {
                    *self.reg_mut(reg) &= !(value & 0x7F);
                } else {
                    *self.reg_mut(reg) |= value & 0x7F;
                }
            }
            Register::FifoLevelReg => {
                if value & 0x80 != 0 {
                    self.fifo.clear();
                }
            }
            Register::FifoDataReg => self.fifo.push(value),
            Register::BitFramingReg => {
                *self.reg_mut(reg) = value & 0x7F;
                if value & 0x80 != 0 && self.reg(Register::CommandReg) & 0x0F == 0x0C {
                    self.exec_transceive();
                }
            }
            Register::Status2Reg => {
                *self.reg_mut(reg) = value;
                if value & 0x08 == 0 {
                    self.authenticated_sector = None;
                }
            }
            _ => *self.reg_mut(reg) = value,
        }
    }

    fn read(&mut self, reg: Register) -> u8 {
        match reg {
            Register::FifoDataReg => self.pop_fifo(),
            Register::FifoLevelReg => self.fifo.len() as u8,
            _ => self.reg(reg),
        }
    }

    fn exec_calc_crc(&mut self) {
        let crc = crc_a(&self.fifo);
        self.fifo.clear();
        *self.reg_mut(Register::CrcResultRegLow) = crc as u8;
        *self.reg_mut(Register::CrcResultRegHigh) = (crc >> 8) as u8;
        *self.reg_mut(Register::DivIrqReg) |= 0x04;
    }

    fn exec_mf_authent(&mut self) {
        *self.reg_mut(Register::ErrorReg) = 0;
        let frame = std::mem::take(&mut self.fifo);
        if frame.len() != 12 || frame[0] != picc_cmd::MF_AUTH_KEY_A {
            // key B (and anything malformed) is simply never answered
            self.timer_irq();
            return;
        }
        let block = frame[1];
        let key: &[u8] = &frame[2..8];
        let uid_tail: &[u8] = &frame[8..12];
        let authenticated = self.cards.iter().any(|c| {
            c.uid.len() >= 4 && c.uid[c.uid.len() - 4..] == *uid_tail && c.key_a[..] == *key
        });
        if authenticated {
            self.authenticated_sector = Some(block / 4);
            *self.reg_mut(Register::Status2Reg) |= 0x08;
            *self.reg_mut(Register::ComIrqReg) |= 0x10;
        } else {
            // a failed Crypto1 handshake shows up as RF silence
            self.timer_irq();
        }
    }

    fn exec_transceive(&mut self) {
        let tx_last = self.reg(Register::BitFramingReg) & 0x07;
        let frame = std::mem::take(&mut self.fifo);
        self.frames.push(TxFrame {
            bytes: frame.clone(),
            last_bits: tx_last,
        });
        *self.reg_mut(Register::ErrorReg) = 0;
        *self.reg_mut(Register::ControlReg) = 0;

        if frame.len() == 1 && tx_last == 7 && matches!(frame[0], picc_cmd::REQA | picc_cmd::WUPA)
        {
            self.answer_request(frame[0]);
        } else if frame.len() == 4 && frame[0] == picc_cmd::HLTA && frame[1] == 0x00 {
            self.answer_halt(&frame);
        } else if !frame.is_empty()
            && matches!(frame[0], picc_cmd::SEL_CL1 | picc_cmd::SEL_CL2 | picc_cmd::SEL_CL3)
        {
            self.answer_select(&frame, tx_last);
        } else if frame.len() == 4 && frame[0] == picc_cmd::MF_READ {
            self.answer_mifare_read(&frame);
        } else {
            self.timer_irq();
        }
    }

    fn answer_request(&mut self, command: u8) {
        let atqa = self
            .cards
            .iter()
            .find(|c| !c.halted || command == picc_cmd::WUPA)
            .map(|c| c.atqa);
        let Some(atqa) = atqa else {
            self.timer_irq();
            return;
        };
        self.fifo = vec![atqa[0], atqa[1]];
        if self.atqa_extra_byte {
            self.fifo.push(0x00);
        }
        if self.collide_on_request {
            *self.reg_mut(Register::ErrorReg) |= 0x08;
        }
        self.done_irq();
    }

    fn answer_halt(&mut self, frame: &[u8]) {
        let crc = crc_a(&frame[..2]);
        assert_eq!(
            [frame[2], frame[3]],
            [crc as u8, (crc >> 8) as u8],
            "HLTA carried a bad CRC_A"
        );
        if self.halt_acknowledged {
            self.fifo = vec![0x00];
            self.done_irq();
        } else {
            for card in &mut self.cards {
                card.halted = true;
            }
            self.timer_irq();
        }
    }

    fn answer_select(&mut self, frame: &[u8], tx_last: u8) {
        let level = match frame[0] {
            picc_cmd::SEL_CL1 => 1,
            picc_cmd::SEL_CL2 => 2,
            _ => 3,
        };
        let nvb = frame[1];
        if nvb == 0x70 && frame.len() == 9 && tx_last == 0 {
            self.answer_full_select(frame, level);
        } else {
            self.answer_anticollision(frame, tx_last, level);
        }
    }

    fn answer_full_select(&mut self, frame: &[u8], level: u8) {
        assert_eq!(
            frame[6],
            frame[2] ^ frame[3] ^ frame[4] ^ frame[5],
            "SELECT frame carried a bad BCC"
        );
        let crc = crc_a(&frame[..7]);
        assert_eq!(
            [frame[7], frame[8]],
            [crc as u8, (crc >> 8) as u8],
            "SELECT frame carried a bad CRC_A"
        );

        let selected = self
            .cards
            .iter()
            .find(|c| c.level_bytes(level).map_or(false, |b| b == frame[2..6]));
        let Some(card) = selected else {
            self.timer_irq();
            return;
        };
        let sak = if card.is_last_level(level) { card.sak } else { 0x04 };
        if self.short_sak {
            self.fifo = vec![sak];
        } else {
            let crc = crc_a(&[sak]);
            self.fifo = vec![sak, crc as u8, (crc >> 8) as u8];
        }
        self.done_irq();
    }

    fn answer_anticollision(&mut self, frame: &[u8], tx_last: u8, level: u8) {
        let nvb = frame[1];
        let whole_bytes = (nvb >> 4) as usize;
        let extra_bits = (nvb & 0x07) as usize;
        assert_eq!(extra_bits as u8, tx_last, "NVB and bit framing disagree");
        // bits of the 32-bit level slice the reader already announced
        let known = (whole_bytes - 2) * 8 + extra_bits;

        if self.coll_position_invalid {
            *self.reg_mut(Register::ErrorReg) |= 0x08;
            *self.reg_mut(Register::CollReg) = 0x20;
            self.done_irq();
            return;
        }
        if let Some(raw) = self.stuck_collision {
            *self.reg_mut(Register::ErrorReg) |= 0x08;
            *self.reg_mut(Register::CollReg) = raw & 0x1F;
            self.done_irq();
            return;
        }

        let seqs: Vec<[u8; 5]> = self
            .cards
            .iter()
            .filter(|c| !c.halted)
            .filter_map(|c| c.level_seq(level))
            .filter(|seq| (0..known).all(|i| seq_bit(seq, i) == frame_bit(frame, i)))
            .collect();
        if seqs.is_empty() {
            self.timer_irq();
            return;
        }

        // first bit of the slice where the remaining candidates disagree
        let clash = (known..32).find(|&i| {
            let first = seq_bit(&seqs[0], i);
            seqs.iter().any(|seq| seq_bit(seq, i) != first)
        });

        let seq = seqs[0];
        let align = known % 8;
        match clash {
            None => {
                let mut resp = seq[known / 8..].to_vec();
                if align > 0 {
                    resp[0] &= 0xFF << align;
                }
                self.fifo = resp;
                self.done_irq();
            }
            Some(d) => {
                // bits up to the clash come through, the rest is zeroed
                let end = if d % 8 == 0 { d / 8 } else { d / 8 + 1 };
                let mut resp = seq[known / 8..end].to_vec();
                if let Some(first) = resp.first_mut() {
                    if align > 0 {
                        *first &= 0xFF << align;
                    }
                }
                if d % 8 != 0 {
                    if let Some(last) = resp.last_mut() {
                        *last &= 0xFF >> (8 - d % 8);
                    }
                }
                self.fifo = resp;
                *self.reg_mut(Register::ControlReg) = (d % 8) as u8;
                *self.reg_mut(Register::ErrorReg) |= 0x08;
                *self.reg_mut(Register::CollReg) = ((d + 1) & 0x1F) as u8;
                self.done_irq();
            }
        }
    }

    fn answer_mifare_read(&mut self, frame: &[u8]) {
        let crc = crc_a(&frame[..2]);
        assert_eq!(
            [frame[2], frame[3]],
            [crc as u8, (crc >> 8) as u8],
            "MF_READ carried a bad CRC_A"
        );
        if self.nack_reads {
            self.fifo = vec![0x04];
            *self.reg_mut(Register::ControlReg) = 4;
            self.done_irq();
            return;
        }
        let block_addr = frame[1];
        let readable = self.authenticated_sector == Some(block_addr / 4);
        let data = self
            .cards
            .iter()
            .find_map(|c| c.blocks.get(&block_addr))
            .copied();
        match (readable, data) {
            (true, Some(data)) => {
                let crc = crc_a(&data);
                self.fifo = data.to_vec();
                self.fifo.push(crc as u8);
                self.fifo.push((crc >> 8) as u8);
                self.done_irq();
            }
            // without a Crypto1 session the exchange just dies
            _ => self.timer_irq(),
        }
    }
}

fn seq_bit(seq: &[u8; 5], i: usize) -> bool {
    (seq[i / 8] >> (i % 8)) & 1 != 0
}

/// Bit `i` of the announced UID slice, i.e. of the frame payload past SEL
/// and NVB. LSB first, as transmitted.
fn frame_bit(frame: &[u8], i: usize) -> bool {
    (frame[2 + i / 8] >> (i % 8)) & 1 != 0
}

impl RegisterBus for SimBus {
    type Error = SimBusError;

    fn write_register(&mut self, reg: Register, value: u8) -> Result<(), Self::Error> {
        self.ops += 1;
        self.write(reg, value);
        Ok(())
    }

    fn write_burst(&mut self, reg: Register, values: &[u8]) -> Result<(), Self::Error> {
        self.ops += 1;
        for &value in values {
            self.write(reg, value);
        }
        Ok(())
    }

    fn read_register(&mut self, reg: Register) -> Result<u8, Self::Error> {
        self.ops += 1;
        Ok(self.read(reg))
    }

    fn read_burst(
        &mut self,
        reg: Register,
        buf: &mut [u8],
        rx_align: u8,
    ) -> Result<(), Self::Error> {
        self.ops += 1;
        if buf.is_empty() {
            return Ok(());
        }
        if reg == Register::FifoDataReg {
            let mut taken = vec![0u8; buf.len()];
            for slot in taken.iter_mut() {
                *slot = self.pop_fifo();
            }
            if rx_align > 0 {
                let mask = 0xFFu8 << rx_align;
                buf[0] = (buf[0] & !mask) | (taken[0] & mask);
                buf[1..].copy_from_slice(&taken[1..]);
            } else {
                buf.copy_from_slice(&taken);
            }
        } else {
            for slot in buf.iter_mut() {
                *slot = self.read(reg);
            }
        }
        Ok(())
    }
}
