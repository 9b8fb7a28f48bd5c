//! Data tree builders.

use serde_json::Value;

use crate::eval::{DataTree, Entity, EntityKind};

/// A widget entity with one `text` property.
pub fn text(value: impl Into<Value>) -> Entity {
    Entity::new(EntityKind::Widget).with("text", value)
}

/// An action entity with a `data` property.
pub fn action(data: impl Into<Value>) -> Entity {
    Entity::new(EntityKind::Action).with("data", data)
}

/// A chain `N0.text <- N1.text <- ...` of `len` widgets, where `N0` holds
/// `seed` and each later widget appends a suffix to its predecessor.
pub fn chain(len: usize, seed: &str) -> DataTree {
    let mut tree = DataTree::new();
    for i in 0..len {
        let e = if i == 0 {
            text(seed)
        } else {
            text(format!("{{{{N{}.text}}}}+", i - 1))
        };
        tree.insert(format!("N{i}"), e);
    }
    tree
}
