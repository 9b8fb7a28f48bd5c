//! Tests for layer and sizing invariants under random edit sequences.

#[cfg(test)]
mod tests {
    use arbor::{
        config::GRID_COLUMNS,
        layout::{Alignment, DropTarget, LayoutMutator, flatten_layers, wrap_children},
        widget::{
            CANVAS_WIDGET, GridPosition, LayoutDirection, MAIN_CONTAINER_ID, ResponsiveBehavior,
            Widget, WidgetId, WidgetTree,
        },
    };
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Add {
            fill: bool,
            columns: i32,
            layer: usize,
            new_layer: bool,
            align: u8,
        },
        Remove(usize),
        Move {
            pick: usize,
            layer: usize,
            new_layer: bool,
            align: u8,
            index: usize,
        },
        Fill(usize, bool),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (any::<bool>(), 1i32..24, 0usize..6, any::<bool>(), 0u8..3).prop_map(
                |(fill, columns, layer, new_layer, align)| Op::Add {
                    fill,
                    columns,
                    layer,
                    new_layer,
                    align
                }
            ),
            (0usize..32).prop_map(Op::Remove),
            (0usize..32, 0usize..6, any::<bool>(), 0u8..3, 0usize..10).prop_map(
                |(pick, layer, new_layer, align, index)| Op::Move {
                    pick,
                    layer,
                    new_layer,
                    align,
                    index
                }
            ),
            (0usize..32, any::<bool>()).prop_map(|(i, f)| Op::Fill(i, f)),
        ]
    }

    fn alignment(n: u8) -> Alignment {
        match n {
            0 => Alignment::Start,
            1 => Alignment::Center,
            _ => Alignment::End,
        }
    }

    fn main_id() -> WidgetId {
        MAIN_CONTAINER_ID.into()
    }

    fn empty_canvas() -> WidgetTree {
        let mut root = Widget::new(MAIN_CONTAINER_ID, CANVAS_WIDGET);
        root.position = GridPosition::new(0, 0, 0, GRID_COLUMNS);
        [root].into_iter().collect()
    }

    fn target(layer: usize, new_layer: bool, align: u8, index: usize) -> DropTarget {
        DropTarget {
            parent_id: main_id(),
            index,
            layer_index: layer,
            row_index: index,
            alignment: alignment(align),
            is_new_layer: new_layer,
            direction: LayoutDirection::Vertical,
        }
    }

    fn children(tree: &WidgetTree) -> Vec<WidgetId> {
        tree.get(&main_id()).map(|w| w.children.clone()).unwrap_or_default()
    }

    fn apply(m: &LayoutMutator, tree: &mut WidgetTree, op: &Op, next: &mut usize) {
        let kids = children(tree);
        let pick = |i: usize| kids.get(i % kids.len().max(1)).cloned();
        match op {
            Op::Add {
                fill,
                columns,
                layer,
                new_layer,
                align,
            } => {
                *next += 1;
                let id = WidgetId::from(format!("w{next}"));
                let mut w = Widget::new(id.clone(), "TEXT_WIDGET");
                w.parent_id = Some(main_id());
                w.position = GridPosition::new(0, 4, 0, *columns);
                if *fill {
                    w.responsive_behavior = ResponsiveBehavior::Fill;
                }
                tree.insert(w);
                if let Some(root) = tree.get_mut(&main_id()) {
                    root.children.push(id.clone());
                }
                m.reorder_children(tree, &[id], &target(*layer, *new_layer, *align, kids.len()));
            }
            Op::Remove(i) => {
                if let Some(id) = pick(*i) {
                    m.remove_widgets(tree, &[id]);
                }
            }
            Op::Move {
                pick: i,
                layer,
                new_layer,
                align,
                index,
            } => {
                if let Some(id) = pick(*i) {
                    m.reorder_children(tree, &[id], &target(*layer, *new_layer, *align, *index));
                }
            }
            Op::Fill(i, fill) => {
                if let Some(id) = pick(*i) {
                    m.update_fill_child_status(tree, &id, *fill);
                }
            }
        }
    }

    fn check_fill_columns(tree: &WidgetTree) -> Result<(), TestCaseError> {
        let Some(root) = tree.get(&main_id()) else {
            return Ok(());
        };
        for layer in root.flex_layers.iter().filter(|l| l.has_fill_child) {
            let widgets: Vec<&Widget> = layer.ids().filter_map(|id| tree.get(id)).collect();
            let hug: i32 = widgets
                .iter()
                .filter(|w| !w.is_fill())
                .map(|w| w.position.columns())
                .sum();
            let fills: Vec<&&Widget> = widgets.iter().filter(|w| w.is_fill()).collect();
            let share = (GRID_COLUMNS - hug).max(0) / fills.len() as i32;
            for f in &fills {
                prop_assert_eq!(f.position.columns(), share);
            }
            if hug <= GRID_COLUMNS {
                prop_assert!(hug + share * fills.len() as i32 <= GRID_COLUMNS);
            }
        }
        Ok(())
    }

    #[test]
    fn wrap_then_flatten_preserves_order() {
        let mut tree = empty_canvas();
        let ids: Vec<WidgetId> = ["c", "a", "b"].iter().map(|s| WidgetId::from(*s)).collect();
        for id in &ids {
            let mut w = Widget::new(id.clone(), "TEXT_WIDGET");
            w.parent_id = Some(main_id());
            tree.insert(w);
        }
        let layers = wrap_children(&ids, &tree);
        assert_eq!(layers.len(), 3);
        assert_eq!(flatten_layers(&layers), ids);
    }

    proptest! {
        #[test]
        fn layer_invariant_holds(ops in prop::collection::vec(op(), 1..40)) {
            let m = LayoutMutator::default();
            let mut tree = empty_canvas();
            let mut next = 0;
            for op in &ops {
                apply(&m, &mut tree, op, &mut next);
                let violations = tree.validate();
                prop_assert!(violations.is_empty(), "{:?} after {:?}", violations, op);
                check_fill_columns(&tree)?;
            }
        }

        #[test]
        fn wrap_round_trip(n in 0usize..12) {
            let mut tree = empty_canvas();
            let ids: Vec<WidgetId> = (0..n).map(|i| WidgetId::from(format!("w{i}"))).collect();
            for id in &ids {
                let mut w = Widget::new(id.clone(), "TEXT_WIDGET");
                w.parent_id = Some(main_id());
                tree.insert(w);
            }
            prop_assert_eq!(flatten_layers(&wrap_children(&ids, &tree)), ids);
        }
    }
}
