// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
mod common;

use std::sync::Arc;

use proptest::prelude::*;
use proptest::sample::Index;
use proptest::test_runner::{Config as PropConfig, RngAlgorithm, TestRng, TestRunner};

use common::{instance, world};
use protoscene_core::values::{MfNode, NodeId};
use protoscene_core::{compute_path, resolve_path, InitialValues, TemplateBuilder};

// A path computed on a template body must lead back to its node on the body
// itself, and find the same DEF node in every instance, whatever the graph
// looks like: several roots, and nodes shared by two parents.
//
// Re-run with another seed locally via PROPTEST_SEED, or change SEED_BYTES.
#[test]
fn body_paths_replay_on_bodies_and_instances() {
    const SEED_BYTES: [u8; 32] = [
        0x50, 0x41, 0x54, 0x48, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0, 0, 0, 0,
    ];
    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &SEED_BYTES);
    let mut runner = TestRunner::new_with_rng(PropConfig::default(), rng);

    // (node count, root count, parent pick per node, optional second parent
    // per node, target pick)
    let graph = (1usize..12, 1usize..4).prop_flat_map(|(n, roots)| {
        (
            Just(n),
            Just(roots.min(n)),
            prop::collection::vec(any::<Index>(), n),
            prop::collection::vec(prop::option::of(any::<Index>()), n),
            any::<Index>(),
        )
    });

    runner
        .run(&graph, |(n, roots, parents, shared, target)| {
            let (mut world, catalog) = world();
            let group = catalog.node_type("Group").expect("group");

            let mut b = TemplateBuilder::new("Graph");
            let ids: Vec<NodeId> = (0..n)
                .map(|i| b.node(&group, Some(format!("N{i}").as_str())))
                .collect();
            let mut children: Vec<Vec<NodeId>> = vec![Vec::new(); n];
            for (i, (pick, second)) in parents.iter().zip(&shared).enumerate().skip(roots) {
                let parent = pick.index(i);
                children[parent].push(ids[i]);
                if let Some(second) = second {
                    let second = second.index(i);
                    if second != parent {
                        children[second].push(ids[i]);
                    }
                }
            }
            for (i, kids) in children.into_iter().enumerate() {
                if !kids.is_empty() {
                    b.set_field(ids[i], "children", MfNode(kids).into())
                        .expect("children");
                }
            }
            for &root in &ids[..roots] {
                b.root(root).expect("root");
            }
            let model = Arc::new(b.build().expect("build"));

            for &id in &ids {
                let path = compute_path(model.as_ref(), model.roots(), id);
                prop_assert!(path.is_some(), "every node hangs below a root");
                let path = path.expect("checked above");
                prop_assert_eq!(resolve_path(model.as_ref(), &path, model.roots()), Some(id));
            }

            let t = target.index(n);
            let path = compute_path(model.as_ref(), model.roots(), ids[t]).expect("reachable");
            let node = instance(&mut world, &model, InitialValues::new());
            prop_assert_eq!(world.impl_nodes(node).len(), roots);
            let scope = world.instance_scope(node).expect("instance scope");
            let expected = world.find_node(scope, &format!("N{t}"));
            prop_assert!(expected.is_some());
            prop_assert_eq!(resolve_path(&world, &path, world.impl_nodes(node)), expected);
            Ok(())
        })
        .expect("paths replay");
}
