use crate::error::PacketError;
use crate::session::SessionName;

/// Fixed MoldUDP64 packet header length: 10-byte session + 8-byte first-seq
/// + 2-byte message count.
pub const HEADER_LEN: usize = 20;
/// Wire MTU for one packet (header + framed messages).
pub const MTU: usize = 1472;
/// Maximum length of a single event/command message.
pub const MAX_MESSAGE_LEN: usize = 1450;
/// Bytes available for framed messages within one MTU-sized packet.
pub const MAX_BODY_LEN: usize = MTU - HEADER_LEN;

/// The decoded fixed header of a MoldUDP64 packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub session: SessionName,
    pub first_seq: u64,
    pub msg_count: u16,
}

impl Header {
    /// Sequence numbers carried by this packet: `[first_seq, first_seq + msg_count)`.
    pub fn seq_range(&self) -> std::ops::Range<u64> {
        self.first_seq..(self.first_seq + self.msg_count as u64)
    }
}

/// Writes the 20-byte MoldUDP64 header into `buf[0..20]`.
///
/// # Panics
/// Panics if `buf` is shorter than [`HEADER_LEN`].
pub fn encode_header(buf: &mut [u8], session: &SessionName, first_seq: u64, msg_count: u16) {
    assert!(buf.len() >= HEADER_LEN, "buffer too small for header");
    buf[0..10].copy_from_slice(session);
    buf[10..18].copy_from_slice(&first_seq.to_be_bytes());
    buf[18..20].copy_from_slice(&msg_count.to_be_bytes());
}

/// Writes the 2-byte big-endian length prefix for a message.
///
/// # Panics
/// Panics if `buf` is shorter than 2 bytes.
pub fn encode_length_prefix(buf: &mut [u8], len: u16) {
    buf[0..2].copy_from_slice(&len.to_be_bytes());
}

/// Parses the fixed header out of the first `bytes_read` bytes of `buf`.
pub fn parse_header(buf: &[u8], bytes_read: usize) -> Result<Header, PacketError> {
    if bytes_read < HEADER_LEN {
        return Err(PacketError::Malformed);
    }
    let mut session = [0u8; 10];
    session.copy_from_slice(&buf[0..10]);
    let first_seq = u64::from_be_bytes(buf[10..18].try_into().expect("8 bytes"));
    let msg_count = u16::from_be_bytes(buf[18..20].try_into().expect("2 bytes"));
    Ok(Header { session, first_seq, msg_count })
}

/// Iterates the framed messages following the header in a received packet.
///
/// Stops (returning `None`) once the declared message count is exhausted or
/// a length-prefix overrun is detected; a caller that needs to know *why*
/// iteration stopped short should inspect [`Messages::truncated`] after the
/// iterator is exhausted.
pub struct Messages<'a> {
    buf: &'a [u8],
    bytes_read: usize,
    cursor: usize,
    remaining: u16,
    truncated: bool,
}

impl<'a> Messages<'a> {
    /// Begins iterating the messages of a packet whose header occupies
    /// `buf[0..HEADER_LEN]` and which declared `msg_count` messages.
    pub fn new(buf: &'a [u8], bytes_read: usize, msg_count: u16) -> Self {
        Self {
            buf,
            bytes_read,
            cursor: HEADER_LEN,
            remaining: msg_count,
            truncated: false,
        }
    }

    /// True if iteration stopped early due to a length-prefix overrun
    /// rather than exhausting the declared message count.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl<'a> Iterator for Messages<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.truncated {
            return None;
        }
        if self.cursor + 2 > self.bytes_read {
            self.truncated = true;
            return None;
        }
        let len = u16::from_be_bytes(
            self.buf[self.cursor..self.cursor + 2]
                .try_into()
                .expect("2 bytes"),
        ) as usize;
        let body_start = self.cursor + 2;
        let body_end = body_start + len;
        if body_end > self.bytes_read {
            self.truncated = true;
            return None;
        }
        self.cursor = body_end;
        self.remaining -= 1;
        Some(&self.buf[body_start..body_end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_packet(session: &SessionName, first_seq: u64, messages: &[&[u8]]) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN];
        encode_header(&mut buf, session, first_seq, messages.len() as u16);
        for m in messages {
            let mut prefix = [0u8; 2];
            encode_length_prefix(&mut prefix, m.len() as u16);
            buf.extend_from_slice(&prefix);
            buf.extend_from_slice(m);
        }
        buf
    }

    #[test]
    fn round_trips_header_and_messages() {
        let session = *b"20240101AA";
        let packet = build_packet(&session, 5, &[b"abcd", b"", b"hello world"]);
        let header = parse_header(&packet, packet.len()).unwrap();
        assert_eq!(header.session, session);
        assert_eq!(header.first_seq, 5);
        assert_eq!(header.msg_count, 3);
        assert_eq!(header.seq_range(), 5..8);

        let msgs: Vec<&[u8]> = Messages::new(&packet, packet.len(), header.msg_count).collect();
        assert_eq!(msgs, vec![b"abcd".as_slice(), b"".as_slice(), b"hello world".as_slice()]);
    }

    #[test]
    fn short_header_is_malformed() {
        let buf = [0u8; 19];
        assert_eq!(parse_header(&buf, buf.len()), Err(PacketError::Malformed));
    }

    #[test]
    fn overrun_length_prefix_truncates_iteration() {
        let session = *b"20240101AA";
        let mut packet = build_packet(&session, 1, &[b"ok"]);
        // Corrupt the declared count to claim a second message that isn't there.
        let header = parse_header(&packet, packet.len()).unwrap();
        let mut iter = Messages::new(&packet, packet.len(), 2);
        assert_eq!(iter.next(), Some(b"ok".as_slice()));
        assert_eq!(iter.next(), None);
        assert!(iter.truncated());
        let _ = header;
        packet.truncate(packet.len() - 1);
        let mut iter2 = Messages::new(&packet, packet.len(), 1);
        assert_eq!(iter2.next(), None);
        assert!(iter2.truncated());
    }
}
