//! Register file and command sets of the MFRC522.
//!
//! Everything in this module is an architectural constant of the chip (or of
//! ISO/IEC 14443-3) and has to match the silicon bit for bit. Addresses are
//! the raw 7-bit register numbers; the SPI framing (shift + read bit) is
//! applied by the bus implementation, not here.

/// Registers of the MFRC522 register file.
///
/// Addresses 0x00, 0x0F, 0x10 and a few others are reserved and deliberately
/// absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    CommandReg = 0x01,
    ComIEnReg = 0x02,
    DivIEnReg = 0x03,
    ComIrqReg = 0x04,
    DivIrqReg = 0x05,
    ErrorReg = 0x06,
    Status1Reg = 0x07,
    Status2Reg = 0x08,
    FifoDataReg = 0x09,
    FifoLevelReg = 0x0A,
    WaterLevelReg = 0x0B,
    ControlReg = 0x0C,
    BitFramingReg = 0x0D,
    CollReg = 0x0E,
    ModeReg = 0x11,
    TxModeReg = 0x12,
    RxModeReg = 0x13,
    TxControlReg = 0x14,
    TxAskReg = 0x15,
    TxSelReg = 0x16,
    RxSelReg = 0x17,
    RxThresholdReg = 0x18,
    DemodReg = 0x19,
    MfTxReg = 0x1C,
    MfRxReg = 0x1D,
    SerialSpeedReg = 0x1F,
    CrcResultRegHigh = 0x21,
    CrcResultRegLow = 0x22,
    ModWidthReg = 0x24,
    RfCfgReg = 0x26,
    GsNReg = 0x27,
    CwGsPReg = 0x28,
    ModGsPReg = 0x29,
    TModeReg = 0x2A,
    TPrescalerReg = 0x2B,
    TReloadRegHigh = 0x2C,
    TReloadRegLow = 0x2D,
    TCounterValRegHigh = 0x2E,
    TCounterValRegLow = 0x2F,
    TestSel1Reg = 0x31,
    TestSel2Reg = 0x32,
    TestPinEnReg = 0x33,
    TestPinValueReg = 0x34,
    TestBusReg = 0x35,
    AutoTestReg = 0x36,
    VersionReg = 0x37,
    AnalogTestReg = 0x38,
    TestDac1Reg = 0x39,
    TestDac2Reg = 0x3A,
    TestAdcReg = 0x3B,
}

/// Commands the MFRC522 itself executes (written to `CommandReg`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PcdCommand {
    /// Cancel the running command and sit idle.
    Idle = 0x00,
    Mem = 0x01,
    GenerateRandomId = 0x02,
    /// Run the CRC coprocessor over the FIFO content.
    CalcCrc = 0x03,
    Transmit = 0x04,
    NoCmdChange = 0x07,
    Receive = 0x08,
    /// Transmit the FIFO and switch to receive; needs the start-send kick in
    /// `BitFramingReg` to actually fire.
    Transceive = 0x0C,
    /// Start Crypto1 authentication against a MIFARE sector.
    MfAuthent = 0x0E,
    SoftReset = 0x0F,
}

/// Command bytes sent to the card (PICC) over RF, per ISO 14443-3 and the
/// MIFARE Classic command set.
pub mod picc_cmd {
    /// REQuest type A; invites idle cards; 7-bit short frame.
    pub const REQA: u8 = 0x26;
    /// Wake-UP type A; like REQA but also wakes halted cards.
    pub const WUPA: u8 = 0x52;
    /// Cascade tag. First data byte of an anticollision level whose slice
    /// does not finish the UID.
    pub const CT: u8 = 0x88;
    pub const SEL_CL1: u8 = 0x93;
    pub const SEL_CL2: u8 = 0x95;
    pub const SEL_CL3: u8 = 0x97;
    /// HaLT type A; sends an active card to the HALT state.
    pub const HLTA: u8 = 0x50;
    /// Request for answer-to-select (ISO 14443-4 layer, not driven here).
    pub const RATS: u8 = 0xE0;
    pub const MF_AUTH_KEY_A: u8 = 0x60;
    pub const MF_AUTH_KEY_B: u8 = 0x61;
    /// Read one 16-byte block from an authenticated sector.
    pub const MF_READ: u8 = 0x30;
    pub const MF_WRITE: u8 = 0xA0;
    pub const MF_DECREMENT: u8 = 0xC0;
    pub const MF_INCREMENT: u8 = 0xC1;
    pub const MF_RESTORE: u8 = 0xC2;
    pub const MF_TRANSFER: u8 = 0xB0;
    /// MIFARE Ultralight 4-byte page write.
    pub const UL_WRITE: u8 = 0xA2;
}

/// `ComIrqReg` bits.
pub mod com_irq {
    /// Timer ran down: nothing received within the configured RF timeout.
    pub const TIMER: u8 = 0x01;
    pub const IDLE: u8 = 0x10;
    pub const RX: u8 = 0x20;
    /// Written with bit 7 clear this acknowledges all seven interrupts.
    pub const CLEAR_ALL: u8 = 0x7F;
}

/// `DivIrqReg` bits.
pub mod div_irq {
    /// CRC coprocessor finished.
    pub const CRC: u8 = 0x04;
}

/// `ErrorReg` bits.
pub mod err {
    pub const PROTOCOL: u8 = 0x01;
    pub const PARITY: u8 = 0x02;
    pub const COLLISION: u8 = 0x08;
    pub const BUFFER_OVFL: u8 = 0x10;
}

/// `CollReg` bits.
pub mod coll {
    /// Position field mask; a raw 0 means bit 32.
    pub const POSITION_MASK: u8 = 0x1F;
    /// Set when the chip could not pin down the collision position.
    pub const POSITION_NOT_VALID: u8 = 0x20;
    /// Cleared so that bits received after a collision come back zeroed.
    pub const VALUES_AFTER_COLL: u8 = 0x80;
}

/// `Status2Reg` bits.
pub mod status2 {
    /// Crypto1 cipher armed; all card traffic is enciphered until cleared.
    pub const CRYPTO1_ON: u8 = 0x08;
}

/// `FifoLevelReg` bits.
pub mod fifo_level {
    /// Write-only: flush the FIFO.
    pub const FLUSH: u8 = 0x80;
    /// Current fill level, 0..=64.
    pub const LEVEL_MASK: u8 = 0x7F;
}

/// `BitFramingReg` bits.
pub mod bit_framing {
    /// Kick for the transceive command.
    pub const START_SEND: u8 = 0x80;
}

/// `ControlReg` bits.
pub mod control {
    /// Valid bits in the last received byte; 0 means the whole byte.
    pub const RX_LAST_BITS: u8 = 0x07;
}

/// `TxControlReg` bits.
pub mod tx_control {
    /// Both antenna driver enable bits.
    pub const TX12_RF_EN: u8 = 0x03;
}

/// `CommandReg` bits beyond the command nibble.
pub mod command_reg {
    /// Soft power-down request / status.
    pub const POWER_DOWN: u8 = 0x10;
}
