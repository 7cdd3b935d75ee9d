//! Quorum barrier
//!
//! Waits for every ack of one store/remove against a single shared
//! deadline. All waiters are multiplexed with `Select`, so the first
//! failure (timeout or departed node) ends the barrier immediately.

use std::time::Instant;

use crossbeam::channel::Select;

use crate::cluster::{AckWaiter, NodeId};
use crate::error::Result;

/// Block until every waiter has its ack, or fail on the first that can't
///
/// `on_ack` runs once per node as its ack arrives. On failure the
/// remaining waiters are dropped, which unregisters them.
pub fn await_all<F>(waiters: Vec<AckWaiter>, deadline: Instant, mut on_ack: F) -> Result<()>
where
    F: FnMut(NodeId),
{
    let mut pending = waiters;

    while !pending.is_empty() {
        let (index, received) = {
            let mut select = Select::new();
            for waiter in &pending {
                select.recv(waiter.receiver());
            }

            let oper = match select.select_deadline(deadline) {
                Ok(oper) => oper,
                Err(_) => {
                    let missing: Vec<String> = pending.iter().map(|w| w.node().to_string()).collect();
                    tracing::warn!(
                        "Deadline passed for {} with no ack from node(s) {}",
                        pending[0].file(),
                        missing.join(", ")
                    );
                    return Err(pending[0].timeout_error());
                }
            };
            let index = oper.index();
            let received = oper.recv(pending[index].receiver());
            (index, received)
        };

        let waiter = pending.swap_remove(index);
        if received.is_err() {
            return Err(waiter.unavailable_error());
        }
        on_ack(waiter.node());
    }

    Ok(())
}
