//! Acknowledgment ring.
//!
//! Every packet carries the (id, rxtime) pairs of the last [`ACK_SLOTS`]
//! packets its sender received, so the peer learns the timing of its own
//! transmissions even when some of the packets carrying acks are lost.

use crate::core::ACK_SLOTS;

/// One received packet, as echoed back to its sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ack {
    /// The received packet's id. 0 marks an empty slot.
    pub id: u32,
    /// Local monotonic time the packet arrived.
    pub rxtime: u32,
}

impl Ack {
    /// Check if this slot has never been written.
    pub fn is_empty(&self) -> bool {
        self.id == 0
    }
}

/// Fixed-capacity circular buffer of [`Ack`]s.
///
/// `next` is the slot the next push overwrites, which is also the oldest
/// entry once the ring has filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckRing {
    slots: [Ack; ACK_SLOTS],
    next: usize,
}

impl AckRing {
    /// Empty ring.
    pub fn new() -> Self {
        Self {
            slots: [Ack::default(); ACK_SLOTS],
            next: 0,
        }
    }

    /// Ring rebuilt from received slots; `first` is taken modulo the
    /// capacity since it comes off the wire.
    pub fn from_slots(slots: [Ack; ACK_SLOTS], first: u8) -> Self {
        Self {
            slots,
            next: usize::from(first) % ACK_SLOTS,
        }
    }

    /// Record a received packet, overwriting the oldest slot.
    pub fn push(&mut self, id: u32, rxtime: u32) {
        self.slots[self.next] = Ack { id, rxtime };
        self.next = (self.next + 1) % ACK_SLOTS;
    }

    /// Index the next push will write, as carried in `first_ack`.
    pub fn next_index(&self) -> u8 {
        self.next as u8
    }

    /// Slot at `index` (modulo the capacity).
    pub fn slot(&self, index: u8) -> Ack {
        self.slots[usize::from(index) % ACK_SLOTS]
    }

    /// Raw slots in storage order.
    pub fn slots(&self) -> &[Ack; ACK_SLOTS] {
        &self.slots
    }

    /// Forget every entry.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Non-empty entries, oldest first, starting at `first`.
    pub fn iter_from(&self, first: u8) -> impl Iterator<Item = Ack> + '_ {
        let first = usize::from(first);
        (0..ACK_SLOTS)
            .map(move |i| self.slots[(first + i) % ACK_SLOTS])
            .filter(|ack| !ack.is_empty())
    }

    /// Non-empty entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = Ack> + '_ {
        self.iter_from(self.next as u8)
    }
}

impl Default for AckRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_advances_and_wraps() {
        let mut ring = AckRing::new();
        assert_eq!(ring.next_index(), 0);
        ring.push(1, 100);
        assert_eq!(ring.next_index(), 1);
        assert_eq!(ring.slot(0), Ack { id: 1, rxtime: 100 });

        for id in 2..=ACK_SLOTS as u32 {
            ring.push(id, id * 100);
        }
        assert_eq!(ring.next_index(), 0);

        // One more overwrites the oldest entry.
        ring.push(65, 6500);
        assert_eq!(ring.slot(0).id, 65);
        assert_eq!(ring.next_index(), 1);
    }

    #[test]
    fn test_iter_skips_empty_slots() {
        let mut ring = AckRing::new();
        ring.push(7, 700);
        ring.push(8, 800);
        let ids: Vec<u32> = ring.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![7, 8]);
    }

    #[test]
    fn test_iter_oldest_first_after_wrap() {
        let mut ring = AckRing::new();
        for id in 1..=(ACK_SLOTS as u32 + 3) {
            ring.push(id, id);
        }
        let ids: Vec<u32> = ring.iter().map(|a| a.id).collect();
        assert_eq!(ids.len(), ACK_SLOTS);
        assert_eq!(ids[0], 4);
        assert_eq!(*ids.last().unwrap(), ACK_SLOTS as u32 + 3);
    }

    #[test]
    fn test_from_slots_reduces_first_index() {
        let mut slots = [Ack::default(); ACK_SLOTS];
        slots[3] = Ack { id: 9, rxtime: 1 };
        let ring = AckRing::from_slots(slots, 64 + 3);
        assert_eq!(ring.next_index(), 3);
        assert_eq!(ring.iter().next(), Some(Ack { id: 9, rxtime: 1 }));
    }

    #[test]
    fn test_clear() {
        let mut ring = AckRing::new();
        ring.push(1, 1);
        ring.clear();
        assert_eq!(ring, AckRing::new());
        assert_eq!(ring.iter().count(), 0);
    }
}
