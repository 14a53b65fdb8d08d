//! MFRC522 contactless reader driver.
//!
//! The MFRC522 speaks ISO/IEC 14443 type A on the RF side and exposes a
//! register file to the host; this crate drives that register file to detect
//! a card, resolve its UID through the cascade anti-collision handshake
//! (even with several cards in the field), authenticate to a MIFARE Classic
//! sector and read data blocks. The actual Crypto1 cipher runs inside the
//! chip; the driver only arms and disarms it.
//!
//! The register transport is a trait ([`RegisterBus`]), so the engine runs
//! unchanged over the bundled SPI implementation ([`SpiRegisterBus`], any
//! `embedded_hal::spi::SpiDevice`), a different physical bus, or a simulated
//! chip in tests. Everything is synchronous and blocking; the only waits are
//! register-poll loops bounded by the budgets in [`Config`].
//!
//! ```no_run
//! # fn demo<SPI: embedded_hal::spi::SpiDevice>(spi: SPI) -> Result<(), rc522::Error<SPI::Error>> {
//! use rc522::{MifareKey, MifareKeyType, Rc522, SpiRegisterBus};
//!
//! let mut reader = Rc522::new(SpiRegisterBus::new(spi));
//! reader.init()?;
//! if reader.is_new_card_present()? {
//!     let uid = reader.read_card_serial()?;
//!     reader.authenticate(MifareKeyType::KeyA, 4, &MifareKey::FACTORY_DEFAULT, &uid)?;
//!     let mut block = [0u8; 18];
//!     reader.mifare_read(4, &mut block)?;
//!     reader.stop_crypto1()?;
//!     reader.halt_a()?;
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), no_std)]

pub mod bus;
pub mod config;
pub mod error;
pub mod mifare;
pub mod pcd;
pub mod picc;
pub mod regs;

mod select;

pub use bus::{RegisterBus, SpiRegisterBus, FIFO_DEPTH};
pub use config::Config;
pub use error::{Error, Result};
pub use mifare::READ_BLOCK_REPLY_LEN;
pub use pcd::{Rc522, Reply};
pub use picc::{MifareKey, MifareKeyType, PiccType, Uid, MIFARE_KEY_SIZE};
pub use regs::{PcdCommand, Register};
