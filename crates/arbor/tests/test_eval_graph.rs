//! Tests for evaluation order, incremental updates and cycle handling.

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use arbor::{
        config::EvalConfig,
        eval::{DataTree, DataTreeEvaluator, Entity, EntityKind, EvalErrorKind},
    };
    use proptest::prelude::*;
    use serde_json::{Value, json};

    const NODES: usize = 8;

    /// A node is either a literal or a template over other nodes.
    #[derive(Debug, Clone)]
    enum Node {
        Literal(u8),
        Refs(Vec<usize>),
    }

    fn render(node: &Node) -> Value {
        match node {
            Node::Literal(n) => json!(format!("v{n}")),
            Node::Refs(refs) => {
                let parts: Vec<String> = refs.iter().map(|r| format!("{{{{N{r}.text}}}}")).collect();
                Value::String(format!("[{}]", parts.join("-")))
            }
        }
    }

    fn build(nodes: &[Option<Node>]) -> DataTree {
        let mut tree = DataTree::new();
        for (i, n) in nodes.iter().enumerate() {
            if let Some(n) = n {
                tree.insert(format!("N{i}"), Entity::new(EntityKind::Widget).with("text", render(n)));
            }
        }
        tree
    }

    /// Nodes that only reference lower indices, so the graph is acyclic.
    fn dag() -> impl Strategy<Value = Vec<Option<Node>>> {
        (0..NODES)
            .map(|i| {
                let literal = any::<u8>().prop_map(Node::Literal);
                let node = if i == 0 {
                    literal.boxed()
                } else {
                    prop_oneof![literal, prop::collection::vec(0..i, 1..3).prop_map(Node::Refs)].boxed()
                };
                prop::option::weighted(0.9, node)
            })
            .collect::<Vec<_>>()
    }

    /// Nodes referencing anything, cycles included.
    fn any_graph() -> impl Strategy<Value = Vec<Option<Node>>> {
        prop::collection::vec(
            prop_oneof![
                any::<u8>().prop_map(Node::Literal),
                prop::collection::vec(0..NODES, 1..3).prop_map(Node::Refs),
            ]
            .prop_map(Some),
            NODES,
        )
    }

    fn evaluator() -> DataTreeEvaluator {
        DataTreeEvaluator::with_rhai(&EvalConfig::default())
    }

    #[test]
    fn data_change_reevaluates_only_dependents() {
        let tree = |name: &str| {
            DataTree::new()
                .with("Api1", Entity::new(EntityKind::Action).with("data", json!({"name": name})))
                .with("Button1", Entity::new(EntityKind::Widget).with("text", "{{Api1.data.name}}"))
                .with("Text1", Entity::new(EntityKind::Widget).with("text", "{{1 + 1}}"))
        };
        let mut ev = evaluator();
        ev.create_first_tree(tree("a"));
        let pass = ev.update_data_tree(tree("b"));
        assert_eq!(pass.evaluation_order, vec!["Button1.text"]);
        assert_eq!(ev.eval_tree().get("Button1.text"), Some(&json!("b")));
    }

    #[test]
    fn mutual_bindings_are_cycles() {
        let tree = DataTree::new()
            .with("Text1", Entity::new(EntityKind::Widget).with("text", "{{Text2.text}}"))
            .with("Text2", Entity::new(EntityKind::Widget).with("text", "{{Text1.text}}"));
        let mut ev = evaluator();
        let pass = ev.create_first_tree(tree);
        let paths: BTreeSet<String> = pass
            .errors
            .iter()
            .filter(|e| e.kind == EvalErrorKind::CyclicalDependency)
            .filter_map(|e| e.path.clone())
            .collect();
        assert_eq!(
            paths,
            ["Text1.text", "Text2.text"].into_iter().map(String::from).collect()
        );
        assert!(pass.evaluation_order.is_empty());
    }

    #[test]
    fn cycle_keeps_last_good_value() {
        let mut ev = evaluator();
        let ok = DataTree::new()
            .with("Text1", Entity::new(EntityKind::Widget).with("text", "{{Text2.text}}"))
            .with("Text2", Entity::new(EntityKind::Widget).with("text", "x"));
        ev.create_first_tree(ok.clone());
        assert_eq!(ev.eval_tree().get("Text1.text"), Some(&json!("x")));

        let mut cyclic = ok.clone();
        cyclic.set("Text2.text", json!("{{Text1.text}}"));
        let pass = ev.update_data_tree(cyclic);
        assert_eq!(pass.errors.len(), 2);
        assert_eq!(ev.eval_tree().get("Text1.text"), Some(&json!("x")));

        let pass = ev.update_data_tree(ok);
        assert!(pass.is_create_first_tree);
        assert!(pass.errors.is_empty());
        assert!(!ev.has_cyclical_dependency());
    }

    proptest! {
        #[test]
        fn order_respects_dependencies(nodes in any_graph()) {
            let mut ev = evaluator();
            let pass = ev.create_first_tree(build(&nodes));
            let order = &pass.evaluation_order;
            for (i, path) in order.iter().enumerate() {
                for dep in ev.graph().dependencies(path) {
                    if let Some(j) = order.iter().position(|p| p == dep) {
                        prop_assert!(j < i, "{} evaluated before its dependency {}", path, dep);
                    }
                }
            }
        }

        #[test]
        fn cycles_are_contained(nodes in any_graph()) {
            let mut ev = evaluator();
            let pass = ev.create_first_tree(build(&nodes));
            let flagged: BTreeSet<String> = pass
                .errors
                .iter()
                .filter(|e| e.kind == EvalErrorKind::CyclicalDependency)
                .filter_map(|e| e.path.clone())
                .collect();
            prop_assert_eq!(&flagged, ev.cyclic_paths());
            for path in &flagged {
                prop_assert!(!pass.evaluation_order.contains(path));
                prop_assert_eq!(ev.eval_tree().get(path), Some(&Value::Null));
            }
            for path in ev.sorted_paths() {
                prop_assert!(!flagged.contains(path));
            }
        }

        #[test]
        fn incremental_matches_full_rebuild(before in dag(), after in dag()) {
            let mut incremental = evaluator();
            incremental.create_first_tree(build(&before));
            let pass = incremental.update_data_tree(build(&after));
            prop_assert!(!pass.is_create_first_tree);

            let mut full = evaluator();
            full.create_first_tree(build(&after));
            prop_assert_eq!(incremental.eval_tree(), full.eval_tree());
            prop_assert_eq!(incremental.inverse_dependency_map(), full.inverse_dependency_map());
        }
    }
}
