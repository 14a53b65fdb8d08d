//! Driver outcome type.
//!
//! Every protocol operation resolves to exactly one variant; nothing is
//! layered or combined. The only retries anywhere in the crate happen in the
//! selection engine, which resolves one more UID bit per collision; a
//! `Collision` that reaches the caller is one the engine could not recover
//! from.

use core::fmt;

use snafu::Snafu;

/// What a protocol operation came back with, when not `Ok`.
///
/// `E` is the register transport's error type. HAL bus errors usually only
/// guarantee `Debug`, so the `Bus` variant carries the value as plain data
/// rather than as an error-trait source.
#[derive(Debug, Snafu)]
pub enum Error<E: fmt::Debug> {
    /// The register transport itself failed; nothing protocol-level can be
    /// said about the exchange.
    #[snafu(display("register bus fault: {cause:?}"))]
    Bus { cause: E },
    /// The reader flagged a framing problem (buffer overflow, parity or
    /// protocol error), or a reply did not have the shape the operation
    /// requires.
    #[snafu(display("communication with the card failed"))]
    Communication,
    /// More than one card answered and the bit clash could not be resolved.
    #[snafu(display("unresolvable collision between cards"))]
    Collision,
    /// The card did not answer within the RF timeout, or the poll budget ran
    /// out. An ordinary outcome, not an escalation: it is how "no card in
    /// range" and a successful HLTA present themselves.
    #[snafu(display("card did not answer in time"))]
    Timeout,
    /// The reply would not fit the buffer the caller supplied.
    #[snafu(display("reply larger than the supplied buffer"))]
    BufferTooSmall,
    /// The protocol engine contradicted itself (e.g. a collision reported at
    /// an already-resolved bit). A driver or chip fault, not a bad card
    /// interaction.
    #[snafu(display("internal protocol engine fault"))]
    Internal,
    /// A caller-supplied argument was rejected before any bus activity.
    #[snafu(display("invalid argument"))]
    InvalidArgument,
    /// The CRC_A trailer of a reply did not match the recomputed checksum.
    #[snafu(display("reply failed CRC_A verification"))]
    CrcMismatch,
    /// The card answered a MIFARE command with the 4-bit NAK pattern.
    #[snafu(display("MIFARE NAK"))]
    MifareNack,
}

impl<E: fmt::Debug> From<E> for Error<E> {
    fn from(cause: E) -> Self {
        Self::Bus { cause }
    }
}

/// Shorthand for results carrying the driver error over bus error `E`.
pub type Result<T, E> = core::result::Result<T, Error<E>>;
