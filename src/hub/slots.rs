//! Bounded connection slot table
//!
//! The hub's bounded-resource guarantee lives here: at most `max_slots`
//! peers are ever held, admission takes the first vacant-or-dead slot, and
//! a full table rejects by closing the newcomer — no queueing, no growth.
//! The table is owned exclusively by the hub's main loop; no other task
//! touches it.

use crate::transport::Transport;

/// Stable identifier of a slot, used only for exclude-sender logic.
pub type SlotId = usize;

/// Returned when every slot is occupied and alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotsFull;

impl std::fmt::Display for SlotsFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot table full")
    }
}

impl std::error::Error for SlotsFull {}

#[derive(Debug)]
pub(crate) struct Slot<T> {
    pub transport: T,
    pub alive: bool,
    /// Distinguishes successive occupancies of the same slot index, so
    /// events from a previous occupant's reader can be discarded.
    pub epoch: u64,
}

/// Fixed-capacity table of live peer connections.
#[derive(Debug)]
pub struct SlotTable<T> {
    slots: Vec<Option<Slot<T>>>,
    next_epoch: u64,
}

impl<T: Transport> SlotTable<T> {
    /// Create an empty table with `max_slots` capacity.
    pub fn new(max_slots: usize) -> Self {
        let mut slots = Vec::with_capacity(max_slots);
        slots.resize_with(max_slots, || None);
        Self {
            slots,
            next_epoch: 0,
        }
    }

    /// Table capacity.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied, alive slots.
    pub fn alive_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.as_ref().is_some_and(|s| s.alive))
            .count()
    }

    /// Admit a connection into the first vacant or dead slot.
    ///
    /// A dead occupant is closed before its slot is reused. When all slots
    /// are occupied and alive the newcomer is closed immediately and
    /// `SlotsFull` returned.
    pub async fn admit(&mut self, transport: T) -> Result<SlotId, SlotsFull> {
        let candidate = self
            .slots
            .iter()
            .position(|s| !s.as_ref().is_some_and(|s| s.alive && s.transport.is_connected()));

        match candidate {
            Some(id) => {
                if let Some(mut old) = self.slots[id].take() {
                    old.transport.close().await;
                }
                self.next_epoch += 1;
                self.slots[id] = Some(Slot {
                    transport,
                    alive: true,
                    epoch: self.next_epoch,
                });
                Ok(id)
            }
            None => {
                let mut transport = transport;
                transport.close().await;
                Err(SlotsFull)
            }
        }
    }

    /// Epoch of the slot's current occupant, `None` when vacant.
    pub fn epoch(&self, id: SlotId) -> Option<u64> {
        self.slots.get(id)?.as_ref().map(|s| s.epoch)
    }

    /// Flag a slot for pruning. Out-of-range or vacant ids are ignored.
    pub fn mark_dead(&mut self, id: SlotId) {
        if let Some(Some(slot)) = self.slots.get_mut(id) {
            slot.alive = false;
        }
    }

    /// Close and clear every slot that is marked dead or whose transport
    /// reports not-connected. Called once per scheduling tick; a second
    /// call on an already-cleared slot is a no-op.
    pub async fn prune(&mut self) -> usize {
        let mut pruned = 0;
        for (id, entry) in self.slots.iter_mut().enumerate() {
            let dead = entry
                .as_ref()
                .is_some_and(|s| !s.alive || !s.transport.is_connected());
            if dead {
                if let Some(mut slot) = entry.take() {
                    slot.transport.close().await;
                    tracing::debug!(slot = id, "pruned dead slot");
                    pruned += 1;
                }
            }
        }
        pruned
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (SlotId, &mut Slot<T>)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(id, entry)| entry.as_mut().map(|slot| (id, slot)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[tokio::test]
    async fn test_admit_fills_first_free_slot() {
        let mut table = SlotTable::new(3);

        assert_eq!(table.admit(MockTransport::connected()).await, Ok(0));
        assert_eq!(table.admit(MockTransport::connected()).await, Ok(1));
        assert_eq!(table.admit(MockTransport::connected()).await, Ok(2));
        assert_eq!(table.alive_count(), 3);
    }

    #[tokio::test]
    async fn test_full_table_rejects_and_closes() {
        let mut table = SlotTable::new(2);
        table.admit(MockTransport::connected()).await.unwrap();
        table.admit(MockTransport::connected()).await.unwrap();

        let result = table.admit(MockTransport::connected()).await;
        assert_eq!(result, Err(SlotsFull));
        // Occupancy never exceeds capacity.
        assert_eq!(table.alive_count(), 2);
    }

    #[tokio::test]
    async fn test_dead_slot_is_reused() {
        let mut table = SlotTable::new(2);
        let a = table.admit(MockTransport::connected()).await.unwrap();
        table.admit(MockTransport::connected()).await.unwrap();

        table.mark_dead(a);
        assert_eq!(table.alive_count(), 1);

        // The dead occupant's slot is reclaimed for the newcomer.
        let c = table.admit(MockTransport::connected()).await.unwrap();
        assert_eq!(c, a);
        assert_eq!(table.alive_count(), 2);
    }

    #[tokio::test]
    async fn test_prune_clears_dead_and_disconnected() {
        let mut table = SlotTable::new(3);
        let a = table.admit(MockTransport::connected()).await.unwrap();
        let b = table.admit(MockTransport::connected()).await.unwrap();
        table.admit(MockTransport::connected()).await.unwrap();

        table.mark_dead(a);
        // Slot b's transport drops on its own.
        for (id, slot) in table.iter_mut() {
            if id == b {
                slot.transport.connected = false;
            }
        }

        assert_eq!(table.prune().await, 2);
        assert_eq!(table.alive_count(), 1);

        // Idempotent: nothing left to prune.
        assert_eq!(table.prune().await, 0);
    }

    #[tokio::test]
    async fn test_occupancy_bounded_over_churn() {
        let mut table = SlotTable::new(4);

        for round in 0..50usize {
            match table.admit(MockTransport::connected()).await {
                Ok(id) => {
                    if round % 3 == 0 {
                        table.mark_dead(id);
                    }
                }
                Err(SlotsFull) => {}
            }
            assert!(table.alive_count() <= table.capacity());
            if round % 7 == 0 {
                table.prune().await;
            }
        }
    }

    #[tokio::test]
    async fn test_reused_slot_gets_new_epoch() {
        let mut table = SlotTable::new(1);

        let a = table.admit(MockTransport::connected()).await.unwrap();
        let first_epoch = table.epoch(a).unwrap();

        table.mark_dead(a);
        let b = table.admit(MockTransport::connected()).await.unwrap();
        assert_eq!(b, a);
        assert_ne!(table.epoch(b).unwrap(), first_epoch);
    }

    #[tokio::test]
    async fn test_mark_dead_out_of_range_is_ignored() {
        let mut table: SlotTable<MockTransport> = SlotTable::new(1);
        table.mark_dead(42);
        assert_eq!(table.alive_count(), 0);
    }
}
