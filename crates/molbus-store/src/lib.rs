//! The append-only message store (C2): a paired messages/index log per
//! session, with two backends sharing one contract — a durable
//! file-channel backend and an in-memory backend for tests and tools.

pub mod error;
pub mod file;
pub mod memory;

pub use error::StoreError;
pub use file::FileMessageStore;
pub use memory::MemoryMessageStore;
use molbus_protocol::packet::MAX_BODY_LEN;

/// Persists one session's event stream and serves random-access reads for
/// rewind (§4.2).
///
/// The scratch buffer returned by [`acquire`](MessageStore::acquire) is
/// owned by the store and loaned to the caller (normally an
/// `EventPublisher`): the caller writes length-prefixed, framed messages
/// into it directly — the same byte layout as a MoldUDP64 packet body —
/// then calls [`commit`](MessageStore::commit) to persist a contiguous run
/// of them.
pub trait MessageStore: Send {
    /// Returns the writable scratch buffer (sized to [`MAX_BODY_LEN`]).
    fn acquire(&mut self) -> &mut [u8; MAX_BODY_LEN];

    /// Appends `count` consecutive framed messages (2-byte length prefix +
    /// body each) found in the scratch buffer, whose lengths are given by
    /// `lengths[index..index + count)`. The messages are assumed to start
    /// at byte offset 0 of the scratch buffer and to be laid out back to
    /// back in exactly that order.
    fn commit(&mut self, lengths: &[u16], index: usize, count: usize) -> Result<(), StoreError>;

    /// Writes message `seq`'s body into `dst[dst_index..]`, returning its
    /// length. Fails with [`StoreError::OutOfRange`] if `seq` is not in
    /// `[1, count()]`.
    fn read(&mut self, dst: &mut [u8], dst_index: usize, seq: u64) -> Result<usize, StoreError>;

    /// Copies as many whole framed records (2-byte prefix + body) as fit
    /// in `dst`, starting at `seq_start`, stopping at `count()` or once the
    /// next record would not fit. Returns `(bytes_written, messages_packed)`.
    /// Used by the rewinder to assemble a reply packet without
    /// re-framing (§4.5).
    fn read_range_framed(
        &mut self,
        dst: &mut [u8],
        seq_start: u64,
        max_count: u16,
    ) -> Result<(usize, u16), StoreError>;

    /// Number of messages currently stored (== `nextSequenceNumber - 1`).
    fn count(&self) -> u64;

    fn close(&mut self) -> Result<(), StoreError>;
}
