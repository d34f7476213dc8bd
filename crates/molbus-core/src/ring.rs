use molbus_protocol::packet::MAX_BODY_LEN;

/// One outstanding command packet: the framed message bytes (same layout
/// as a MoldUDP64 packet body) plus the applicationSequenceNumber range
/// it covers.
#[derive(Clone)]
pub struct PacketSlot {
    pub body: Box<[u8; MAX_BODY_LEN]>,
    pub body_len: usize,
    pub first_app_seq: u32,
    pub count: u16,
}

impl Default for PacketSlot {
    fn default() -> Self {
        Self {
            body: Box::new([0u8; MAX_BODY_LEN]),
            body_len: 0,
            first_app_seq: 0,
            count: 0,
        }
    }
}

/// Growable ring of outstanding command packets (§4.7/C7): packet `i mod
/// capacity()` holds the messages with contiguous applicationSequenceNumbers
/// `[firstAppSeqNum, firstAppSeqNum + count)`, retransmitted until the
/// sequencer's echo confirms receipt.
///
/// Doubles capacity rather than dropping the oldest unconfirmed packet —
/// losing an unconfirmed command would mean losing the command itself,
/// which the publisher is not allowed to do.
pub struct PacketRing {
    slots: Vec<PacketSlot>,
    next_packet_index: u64,
    next_confirmed_packet_index: u64,
}

impl PacketRing {
    pub fn new(initial_capacity: usize) -> Self {
        assert!(initial_capacity > 0, "ring capacity must be non-zero");
        Self {
            slots: (0..initial_capacity).map(|_| PacketSlot::default()).collect(),
            next_packet_index: 0,
            next_confirmed_packet_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of packets sent but not yet confirmed.
    pub fn in_flight(&self) -> u64 {
        self.next_packet_index - self.next_confirmed_packet_index
    }

    /// Doubles capacity if the ring is completely full of unconfirmed
    /// packets, preserving each in-flight packet's logical position.
    pub fn grow_if_full(&mut self) {
        if self.in_flight() as usize != self.capacity() {
            return;
        }
        let old_capacity = self.capacity();
        let new_capacity = old_capacity * 2;
        let mut new_slots: Vec<PacketSlot> =
            (0..new_capacity).map(|_| PacketSlot::default()).collect();
        for offset in 0..old_capacity as u64 {
            let logical = self.next_confirmed_packet_index + offset;
            let old_physical = (logical % old_capacity as u64) as usize;
            let new_physical = (logical % new_capacity as u64) as usize;
            new_slots[new_physical] = std::mem::take(&mut self.slots[old_physical]);
        }
        self.slots = new_slots;
        tracing::debug!(old_capacity, new_capacity, "packet ring grown");
    }

    /// The slot for the next packet to be sent (after `grow_if_full`).
    pub fn next_slot_mut(&mut self) -> &mut PacketSlot {
        self.grow_if_full();
        let capacity = self.capacity() as u64;
        let physical = (self.next_packet_index % capacity) as usize;
        &mut self.slots[physical]
    }

    /// Marks the current packet as sent, advancing the send cursor.
    pub fn advance_sent(&mut self) {
        self.next_packet_index += 1;
    }

    /// Iterates the unconfirmed packets, oldest first, for retransmission.
    pub fn unconfirmed(&self) -> impl Iterator<Item = &PacketSlot> {
        let capacity = self.capacity() as u64;
        (self.next_confirmed_packet_index..self.next_packet_index)
            .map(move |logical| &self.slots[(logical % capacity) as usize])
    }

    /// Mutable counterpart of [`unconfirmed`](Self::unconfirmed), used to
    /// rewrite buffered messages in place (e.g. applicationId learning).
    pub fn unconfirmed_mut(&mut self) -> impl Iterator<Item = &mut PacketSlot> {
        self.range_mut(self.next_confirmed_packet_index, self.next_packet_index)
    }

    /// Every message still buffered anywhere in the ring: packets already
    /// handed to the send loop (unconfirmed) plus the packet currently
    /// being filled by `commit`, which hasn't been enqueued for send yet.
    /// Used when applicationId learning must rewrite a field stamped
    /// before the id was known, regardless of send state.
    pub fn all_buffered_mut(&mut self) -> impl Iterator<Item = &mut PacketSlot> {
        self.range_mut(self.next_confirmed_packet_index, self.next_packet_index + 1)
    }

    fn range_mut(&mut self, start: u64, end: u64) -> impl Iterator<Item = &mut PacketSlot> {
        let capacity = self.capacity() as u64;
        let indices: std::collections::HashSet<usize> =
            (start..end).map(|logical| (logical % capacity) as usize).collect();
        self.slots
            .iter_mut()
            .enumerate()
            .filter(move |(i, _)| indices.contains(i))
            .map(|(_, slot)| slot)
    }

    /// Confirms all packets whose messages are entirely below
    /// `confirmed_app_seq` (exclusive), per an echoed applicationSequenceNumber.
    ///
    /// A confirmed slot is reset to `PacketSlot::default()` immediately: the
    /// physical index it occupies will be handed back out by `next_slot_mut`
    /// once the ring wraps, and `commit` relies on `count == 0`/`body_len ==
    /// 0` to recognize a slot as empty rather than append after stale bytes.
    pub fn confirm_up_to(&mut self, confirmed_app_seq: u32) {
        while self.next_confirmed_packet_index < self.next_packet_index {
            let capacity = self.capacity() as u64;
            let physical = (self.next_confirmed_packet_index % capacity) as usize;
            let slot = &self.slots[physical];
            let slot_end = slot.first_app_seq.wrapping_add(u32::from(slot.count));
            if slot_end <= confirmed_app_seq {
                self.slots[physical] = PacketSlot::default();
                self.next_confirmed_packet_index += 1;
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(ring: &mut PacketRing, first_app_seq: u32, count: u16) {
        let slot = ring.next_slot_mut();
        slot.first_app_seq = first_app_seq;
        slot.count = count;
        slot.body_len = 0;
        ring.advance_sent();
    }

    #[test]
    fn grows_when_full_and_preserves_slots() {
        let mut ring = PacketRing::new(2);
        fill(&mut ring, 1, 1);
        fill(&mut ring, 2, 1);
        assert_eq!(ring.capacity(), 2);
        // Ring now full (2 in flight, capacity 2); next fill must grow.
        fill(&mut ring, 3, 1);
        assert_eq!(ring.capacity(), 4);
        let seqs: Vec<u32> = ring.unconfirmed().map(|s| s.first_app_seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn confirm_up_to_advances_cursor() {
        let mut ring = PacketRing::new(4);
        fill(&mut ring, 1, 2);
        fill(&mut ring, 3, 2);
        fill(&mut ring, 5, 2);
        ring.confirm_up_to(5);
        let seqs: Vec<u32> = ring.unconfirmed().map(|s| s.first_app_seq).collect();
        assert_eq!(seqs, vec![5]);
    }
}
