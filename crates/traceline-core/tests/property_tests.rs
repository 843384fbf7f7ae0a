//! # Property-Based Tests
//!
//! Determinism, dedup, merge idempotence, and pagination invariants under
//! generated inputs.

#![allow(clippy::unwrap_used, clippy::panic)]

use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeSet;
use traceline_core::{
    ArtifactKind, Direction, LineageGraph, Recorder, SortField, SortOrder, StoreId, apply_batch,
    batch_from_bytes, batch_to_bytes, collect_batch, fingerprint, list_executions,
};

fn run_stage(graph: &mut LineageGraph, stage: &str, tool: &str, payloads: &[Vec<u8>]) {
    let run = Recorder::begin_stage(
        graph,
        "p",
        stage,
        stage,
        tool,
        std::collections::BTreeMap::new(),
        1_000,
    )
    .expect("stage");
    for (i, payload) in payloads.iter().enumerate() {
        Recorder::log_artifact(
            graph,
            run.execution,
            &format!("{stage}/artifact-{i}"),
            payload,
            Direction::Output,
            ArtifactKind::Dataset,
            std::collections::BTreeMap::new(),
            1_001 + i as u64,
        )
        .expect("log");
    }
}

proptest! {
    /// Identical operation sequences on two graphs produce identical graphs.
    #[test]
    fn determinism_same_operations_same_graph(
        payloads in vec(vec(any::<u8>(), 0..64), 1..20)
    ) {
        let mut g1 = LineageGraph::new(StoreId(2));
        let mut g2 = LineageGraph::new(StoreId(2));
        run_stage(&mut g1, "train", "t.py", &payloads);
        run_stage(&mut g2, "train", "t.py", &payloads);

        prop_assert_eq!(g1.artifact_count(), g2.artifact_count());
        prop_assert_eq!(g1.event_count(), g2.event_count());
        for (a, b) in g1.artifacts().zip(g2.artifacts()) {
            prop_assert_eq!(a.id, b.id);
            prop_assert_eq!(a.hash, b.hash);
        }
    }

    /// Artifact node count equals the number of distinct payloads, no matter
    /// how often each payload is logged.
    #[test]
    fn dedup_one_node_per_distinct_content(
        payloads in vec(vec(any::<u8>(), 0..32), 1..30)
    ) {
        let mut graph = LineageGraph::new(StoreId(2));
        run_stage(&mut graph, "train", "t.py", &payloads);

        let distinct: BTreeSet<_> = payloads.iter().map(|p| fingerprint(p)).collect();
        prop_assert_eq!(graph.artifact_count(), distinct.len());
    }

    /// Wire encode/decode is the identity on collected batches.
    #[test]
    fn wire_roundtrip_preserves_batches(
        payloads in vec(vec(any::<u8>(), 0..32), 1..10)
    ) {
        let mut graph = LineageGraph::new(StoreId(2));
        run_stage(&mut graph, "train", "t.py", &payloads);

        let batch = collect_batch(&graph, "p", 0).expect("collect");
        let bytes = batch_to_bytes(&batch).expect("serialize");
        let restored = batch_from_bytes(&bytes).expect("deserialize");
        prop_assert_eq!(batch, restored);
    }

    /// Applying the same batch any number of times equals applying it once.
    #[test]
    fn merge_is_idempotent(
        payloads in vec(vec(any::<u8>(), 0..32), 1..10),
        replays in 1usize..4
    ) {
        let mut site = LineageGraph::new(StoreId(2));
        run_stage(&mut site, "train", "t.py", &payloads);
        let batch = collect_batch(&site, "p", 0).expect("collect");

        let mut central = LineageGraph::new(StoreId(1));
        let (first_map, _) = apply_batch(&mut central, &batch).expect("apply");
        let counts = (central.execution_count(), central.artifact_count(), central.event_count());

        for _ in 0..replays {
            let (map, report) = apply_batch(&mut central, &batch).expect("replay");
            prop_assert_eq!(&map, &first_map);
            prop_assert_eq!(report.created(), 0);
        }
        prop_assert_eq!(
            counts,
            (central.execution_count(), central.artifact_count(), central.event_count())
        );
    }

    /// Merge order between two sites never changes what central converges to.
    #[test]
    fn merge_commutes_on_entity_counts(
        payloads_a in vec(vec(any::<u8>(), 0..16), 1..8),
        payloads_b in vec(vec(any::<u8>(), 0..16), 1..8)
    ) {
        let mut site_a = LineageGraph::new(StoreId(2));
        run_stage(&mut site_a, "train", "t.py", &payloads_a);
        let batch_a = collect_batch(&site_a, "p", 0).expect("collect a");

        let mut site_b = LineageGraph::new(StoreId(3));
        run_stage(&mut site_b, "train", "t.py", &payloads_b);
        let batch_b = collect_batch(&site_b, "p", 0).expect("collect b");

        let mut ab = LineageGraph::new(StoreId(1));
        apply_batch(&mut ab, &batch_a).expect("a then b");
        apply_batch(&mut ab, &batch_b).expect("a then b");

        let mut ba = LineageGraph::new(StoreId(1));
        apply_batch(&mut ba, &batch_b).expect("b then a");
        apply_batch(&mut ba, &batch_a).expect("b then a");

        prop_assert_eq!(ab.execution_count(), ba.execution_count());
        prop_assert_eq!(ab.artifact_count(), ba.artifact_count());
        prop_assert_eq!(ab.event_count(), ba.event_count());
    }

    /// Walking all pages yields every execution exactly once.
    #[test]
    fn pagination_is_a_partition(
        run_count in 1usize..40,
        page_size in 1usize..10
    ) {
        let mut graph = LineageGraph::new(StoreId(2));
        for i in 0..run_count {
            Recorder::begin_stage(
                &mut graph,
                "p",
                "train",
                "train",
                "t.py",
                std::collections::BTreeMap::new(),
                1_000 + i as u64,
            )
            .expect("stage");
        }

        let mut seen = BTreeSet::new();
        let mut page = 1;
        loop {
            let result = list_executions(
                &graph, "p", page, page_size, None, SortField::StartedAt, SortOrder::Asc,
            )
            .expect("list");
            prop_assert_eq!(result.total_items, run_count);
            if result.items.is_empty() {
                break;
            }
            for row in &result.items {
                prop_assert!(seen.insert(row.id), "row appeared twice");
            }
            page += 1;
        }
        prop_assert_eq!(seen.len(), run_count);
    }
}
