//! Broadcast relay fan-out
//!
//! An inbound chunk from one slot goes verbatim to every other alive slot.
//! The payload is opaque at this layer; no framing, no reassembly. A write
//! failure marks that one slot dead and the fan-out continues, so a single
//! bad peer never blocks the rest.

use crate::hub::slots::{SlotId, SlotTable};
use crate::transport::Transport;

/// Forward `chunk` from `from` to every other alive slot.
///
/// Returns the number of peers reached. Slots that fail a write are marked
/// dead and collected on the next prune.
pub async fn fan_out<T: Transport>(
    table: &mut SlotTable<T>,
    from: SlotId,
    chunk: &[u8],
) -> usize {
    let mut reached = 0;
    for (id, slot) in table.iter_mut() {
        if id == from || !slot.alive {
            continue;
        }
        match slot.transport.send(chunk).await {
            Ok(()) => reached += 1,
            Err(e) => {
                tracing::debug!(slot = id, error = %e, "relay write failed, marking slot dead");
                slot.alive = false;
            }
        }
    }
    reached
}
