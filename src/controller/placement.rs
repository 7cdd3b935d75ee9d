//! Replica placement
//!
//! Least-loaded selection over the live nodes.

use std::collections::HashMap;

use crate::cluster::NodeId;

/// Pick `r` nodes with the fewest current replica assignments
///
/// Nodes absent from `counts` (new joiners included) count as zero.
/// Ties break on ascending port so placement is deterministic. Returns
/// fewer than `r` nodes only if fewer are live.
pub fn select_candidates(live: &[NodeId], counts: &HashMap<NodeId, usize>, r: usize) -> Vec<NodeId> {
    let mut ranked: Vec<(usize, NodeId)> = live
        .iter()
        .map(|node| (counts.get(node).copied().unwrap_or(0), *node))
        .collect();
    ranked.sort();
    ranked.into_iter().take(r).map(|(_, node)| node).collect()
}
