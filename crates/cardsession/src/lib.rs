//! Card session facades
//!
//! Sequences of driver calls packaged into higher-level operations: a
//! generic APDU card session with a transaction log, and a contactless
//! memory card session with a fixed sector/block model.

mod apdu_card;
mod memory_card;

pub use apdu_card::{ApduCardSession, CardInfo, Transaction, DEFAULT_TIMEOUT, MAX_LOG_ENTRIES};
pub use memory_card::{
    CardType, MemoryCardSession, Sector, BLOCKS_PER_SECTOR, ERROR_MARKER, SECTOR_COUNT,
};
