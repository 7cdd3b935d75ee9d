//! Catalog Tests
//!
//! Tests for the file index state machine and replica placement.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use replistore::catalog::{Catalog, FileStatus};
use replistore::cluster::NodeId;
use replistore::controller::select_candidates;
use replistore::StoreError;

// =============================================================================
// Helper Functions
// =============================================================================

fn nodes(ports: &[u16]) -> Vec<NodeId> {
    ports.iter().map(|p| NodeId(*p)).collect()
}

/// Begin a store on fixed replicas
fn begin(catalog: &Catalog, name: &str, replicas: &[u16]) -> replistore::catalog::OpId {
    let op = catalog.next_op();
    let chosen = nodes(replicas);
    catalog
        .begin_store(name, 10, op, move |_| chosen)
        .unwrap();
    op
}

/// Store and commit
fn stored(catalog: &Catalog, name: &str, replicas: &[u16]) {
    let op = begin(catalog, name, replicas);
    assert!(catalog.commit_store(name, op));
}

// =============================================================================
// Store Transition Tests
// =============================================================================

#[test]
fn test_begin_store_records_in_progress() {
    let catalog = Catalog::new();
    let op = begin(&catalog, "a", &[1, 2]);

    let record = catalog.get("a").unwrap();
    assert_eq!(record.status, FileStatus::StoreInProgress);
    assert_eq!(record.replicas, nodes(&[1, 2]));
    assert_eq!(record.op, op);
    assert!(record.in_flight);
    assert!(!record.is_visible());
}

#[test]
fn test_begin_store_sees_in_flight_counts() {
    let catalog = Catalog::new();
    begin(&catalog, "a", &[1, 2]);

    let op = catalog.next_op();
    catalog
        .begin_store("b", 1, op, |counts| {
            assert_eq!(counts.get(&NodeId(1)), Some(&1));
            assert_eq!(counts.get(&NodeId(2)), Some(&1));
            assert_eq!(counts.get(&NodeId(3)), None);
            nodes(&[3])
        })
        .unwrap();
}

#[test]
fn test_duplicate_store_rejected() {
    let catalog = Catalog::new();
    begin(&catalog, "a", &[1]);

    let op = catalog.next_op();
    let result = catalog.begin_store("a", 10, op, |_| nodes(&[2]));
    assert!(matches!(result, Err(StoreError::FileAlreadyExists(_))));

    // The first record is untouched
    assert_eq!(catalog.get("a").unwrap().replicas, nodes(&[1]));
}

#[test]
fn test_commit_store_makes_visible() {
    let catalog = Catalog::new();
    stored(&catalog, "a", &[1]);

    let record = catalog.get("a").unwrap();
    assert_eq!(record.status, FileStatus::StoreComplete);
    assert!(!record.in_flight);
    assert_eq!(catalog.list_complete(), vec!["a"]);
}

#[test]
fn test_abort_store_deletes_record() {
    let catalog = Catalog::new();
    let op = begin(&catalog, "a", &[1]);

    assert!(catalog.abort_store("a", op));
    assert!(catalog.get("a").is_none());
    assert!(catalog.is_empty());
}

#[test]
fn test_stale_op_cannot_commit_or_abort() {
    let catalog = Catalog::new();
    let op = begin(&catalog, "a", &[1]);
    let stale = catalog.next_op();

    assert!(!catalog.commit_store("a", stale));
    assert!(!catalog.abort_store("a", stale));
    assert_eq!(catalog.get("a").unwrap().status, FileStatus::StoreInProgress);

    assert!(catalog.commit_store("a", op));
    // Second commit of the same op is a no-op
    assert!(!catalog.commit_store("a", op));
    assert!(!catalog.abort_store("a", op));
}

// =============================================================================
// Remove Transition Tests
// =============================================================================

#[test]
fn test_remove_lifecycle() {
    let catalog = Catalog::new();
    stored(&catalog, "a", &[1, 2]);

    let op = catalog.next_op();
    assert_eq!(catalog.begin_remove("a", op).unwrap(), nodes(&[1, 2]));
    assert_eq!(catalog.get("a").unwrap().status, FileStatus::RemoveInProgress);
    assert!(catalog.list_complete().is_empty());
    assert!(catalog.load_target("a").is_err());

    assert!(catalog.release_replica("a", op, NodeId(1)));
    assert_eq!(catalog.get("a").unwrap().replicas, nodes(&[2]));

    assert!(catalog.commit_remove("a", op));
    assert!(catalog.get("a").is_none());
}

#[test]
fn test_remove_requires_complete_store() {
    let catalog = Catalog::new();
    begin(&catalog, "a", &[1]);

    let result = catalog.begin_remove("a", catalog.next_op());
    assert!(matches!(result, Err(StoreError::FileNotFound(_))));

    let result = catalog.begin_remove("missing", catalog.next_op());
    assert!(matches!(result, Err(StoreError::FileNotFound(_))));
}

#[test]
fn test_store_rejected_during_remove() {
    let catalog = Catalog::new();
    stored(&catalog, "a", &[1]);
    catalog.begin_remove("a", catalog.next_op()).unwrap();

    let result = catalog.begin_store("a", 1, catalog.next_op(), |_| nodes(&[1]));
    assert!(matches!(result, Err(StoreError::FileAlreadyExists(_))));
}

#[test]
fn test_failed_remove_can_be_reissued() {
    let catalog = Catalog::new();
    stored(&catalog, "a", &[1, 2, 3]);

    let first = catalog.next_op();
    catalog.begin_remove("a", first).unwrap();
    catalog.release_replica("a", first, NodeId(2));

    // Overlapping remove refused while the first is running
    assert!(catalog.begin_remove("a", catalog.next_op()).is_err());

    assert!(catalog.fail_remove("a", first));
    let record = catalog.get("a").unwrap();
    assert_eq!(record.status, FileStatus::RemoveInProgress);
    assert!(!record.in_flight);

    let second = catalog.next_op();
    assert_eq!(catalog.begin_remove("a", second).unwrap(), nodes(&[1, 3]));

    // The first attempt no longer owns the record
    assert!(!catalog.release_replica("a", first, NodeId(1)));
    assert!(!catalog.commit_remove("a", first));
    assert!(catalog.commit_remove("a", second));
}

#[test]
fn test_restore_after_remove() {
    let catalog = Catalog::new();
    stored(&catalog, "a", &[1]);
    let op = catalog.next_op();
    catalog.begin_remove("a", op).unwrap();
    catalog.commit_remove("a", op);

    stored(&catalog, "a", &[2]);
    assert_eq!(catalog.get("a").unwrap().replicas, nodes(&[2]));
}

// =============================================================================
// Read / Membership Tests
// =============================================================================

#[test]
fn test_list_only_complete_sorted() {
    let catalog = Catalog::new();
    stored(&catalog, "zeta", &[1]);
    stored(&catalog, "alpha", &[1]);
    begin(&catalog, "pending", &[1]);
    stored(&catalog, "going", &[1]);
    catalog.begin_remove("going", catalog.next_op()).unwrap();

    assert_eq!(catalog.list_complete(), vec!["alpha", "zeta"]);
    assert_eq!(catalog.len(), 4);
}

#[test]
fn test_load_target_returns_size_and_replicas() {
    let catalog = Catalog::new();
    stored(&catalog, "a", &[4, 2]);

    let (size, replicas) = catalog.load_target("a").unwrap();
    assert_eq!(size, 10);
    assert_eq!(replicas, nodes(&[4, 2]));
}

#[test]
fn test_strike_node() {
    let catalog = Catalog::new();
    stored(&catalog, "a", &[1, 2]);
    stored(&catalog, "b", &[2, 3]);
    stored(&catalog, "c", &[3, 4]);

    assert_eq!(catalog.strike_node(NodeId(2)), 2);
    assert_eq!(catalog.get("a").unwrap().replicas, nodes(&[1]));
    assert_eq!(catalog.get("b").unwrap().replicas, nodes(&[3]));
    assert_eq!(catalog.get("c").unwrap().replicas, nodes(&[3, 4]));

    let counts = catalog.replica_counts();
    assert_eq!(counts.get(&NodeId(2)), None);
    assert_eq!(counts.get(&NodeId(3)), Some(&2));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_store_single_winner() {
    let catalog = Arc::new(Catalog::new());
    let mut handles = vec![];

    for i in 0..8u16 {
        let catalog = Arc::clone(&catalog);
        handles.push(thread::spawn(move || {
            let op = catalog.next_op();
            catalog.begin_store("contested", 1, op, |_| vec![NodeId(i)]).is_ok()
        }));
    }

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

// =============================================================================
// Placement Tests
// =============================================================================

#[test]
fn test_placement_prefers_least_loaded() {
    let live = nodes(&[5001, 5002, 5003]);
    let mut counts = HashMap::new();
    counts.insert(NodeId(5001), 4);
    counts.insert(NodeId(5002), 1);

    assert_eq!(select_candidates(&live, &counts, 2), nodes(&[5003, 5002]));
}

#[test]
fn test_placement_ties_break_on_port() {
    let live = nodes(&[5003, 5001, 5002]);
    assert_eq!(select_candidates(&live, &HashMap::new(), 2), nodes(&[5001, 5002]));
}

#[test]
fn test_placement_ignores_departed_nodes() {
    let live = nodes(&[5002]);
    let mut counts = HashMap::new();
    counts.insert(NodeId(5001), 0);

    assert_eq!(select_candidates(&live, &counts, 1), nodes(&[5002]));
}

#[test]
fn test_placement_short_when_too_few_live() {
    let live = nodes(&[1, 2]);
    assert_eq!(select_candidates(&live, &HashMap::new(), 3).len(), 2);
}
