//! Unevaluated and evaluated data trees.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a data-tree entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntityKind {
    /// A canvas widget.
    #[default]
    #[serde(rename = "WIDGET")]
    Widget,
    /// A query or API action.
    #[serde(rename = "ACTION")]
    Action,
    /// A JS object.
    #[serde(rename = "JSACTION")]
    JsAction,
    /// Application globals.
    #[serde(rename = "APPSMITH")]
    AppData,
}

/// A named entity: a bag of properties, some of which may be bindings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Entity {
    /// Entity kind.
    #[serde(rename = "ENTITY_TYPE", default)]
    pub kind: EntityKind,
    /// Properties holding trigger code rather than reactive bindings.
    #[serde(rename = "triggerPaths", default, skip_serializing_if = "BTreeSet::is_empty")]
    pub trigger_paths: BTreeSet<String>,
    /// Property values.
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Entity {
    /// Construct an entity with no properties.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Builder-style trigger property setter.
    pub fn with_trigger(mut self, key: &str, code: &str) -> Self {
        self.trigger_paths.insert(key.to_string());
        self.properties.insert(key.to_string(), Value::String(code.to_string()));
        self
    }

    /// True if the property holds trigger code.
    pub fn is_trigger(&self, key: &str) -> bool {
        self.trigger_paths.contains(key)
    }
}

/// Change to a property between two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffEvent {
    /// Property added.
    New,
    /// Property removed.
    Delete,
    /// Property value changed.
    Edit,
}

/// One entry of a tree diff.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeDiff {
    /// Kind of change.
    pub event: DiffEvent,
    /// `Entity.property` path.
    pub property_path: String,
}

/// Map of entity name to entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataTree {
    /// Entities by name.
    entities: BTreeMap<String, Entity>,
}

/// Split `Entity.property` into its parts.
pub fn split_path(path: &str) -> Option<(&str, &str)> {
    path.split_once('.')
}

impl DataTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity, returning the one it replaces.
    pub fn insert(&mut self, name: impl Into<String>, entity: Entity) -> Option<Entity> {
        self.entities.insert(name.into(), entity)
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, entity: Entity) -> Self {
        self.insert(name, entity);
        self
    }

    /// Remove an entity.
    pub fn remove(&mut self, name: &str) -> Option<Entity> {
        self.entities.remove(name)
    }

    /// Borrow an entity.
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Mutably borrow an entity.
    pub fn entity_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities.get_mut(name)
    }

    /// True if an entity exists.
    pub fn has_entity(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Iterate entities in name order.
    pub fn entities(&self) -> impl Iterator<Item = (&String, &Entity)> + '_ {
        self.entities.iter()
    }

    /// Value at `Entity.property`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let (entity, prop) = split_path(path)?;
        self.entities.get(entity)?.properties.get(prop)
    }

    /// Set the value at `Entity.property`. Returns false if the entity is
    /// missing.
    pub fn set(&mut self, path: &str, value: Value) -> bool {
        let Some((entity, prop)) = split_path(path) else {
            return false;
        };
        match self.entities.get_mut(entity) {
            Some(e) => {
                e.properties.insert(prop.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Every `Entity.property` path, trigger properties included.
    pub fn paths(&self) -> impl Iterator<Item = String> + '_ {
        self.entities.iter().flat_map(|(name, e)| {
            e.properties.keys().map(move |k| format!("{name}.{k}"))
        })
    }

    /// True if `path` names a trigger property.
    pub fn is_trigger(&self, path: &str) -> bool {
        split_path(path)
            .and_then(|(e, p)| self.entities.get(e).map(|e| e.is_trigger(p)))
            .unwrap_or(false)
    }

    /// An entity as a JSON object, for use as a script scope value.
    pub fn entity_value(&self, name: &str) -> Option<Value> {
        self.entities
            .get(name)
            .map(|e| Value::Object(e.properties.clone()))
    }

    /// The whole tree as JSON.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entities
                .keys()
                .filter_map(|k| self.entity_value(k).map(|v| (k.clone(), v)))
                .collect(),
        )
    }

    /// Property-level differences from `older` to `self`. Trigger flag
    /// changes count as edits.
    pub fn diff(&self, older: &Self) -> Vec<TreeDiff> {
        let mut out = Vec::new();
        let names: BTreeSet<&String> = self.entities.keys().chain(older.entities.keys()).collect();
        for name in names {
            let new = self.entities.get(name);
            let old = older.entities.get(name);
            let keys: BTreeSet<&String> = new
                .iter()
                .chain(old.iter())
                .flat_map(|e| e.properties.keys())
                .collect();
            for key in keys {
                let n = new.and_then(|e| e.properties.get(key));
                let o = old.and_then(|e| e.properties.get(key));
                let trig_changed = new.is_some_and(|e| e.is_trigger(key))
                    != old.is_some_and(|e| e.is_trigger(key));
                let event = match (o, n) {
                    (None, Some(_)) => DiffEvent::New,
                    (Some(_), None) => DiffEvent::Delete,
                    (Some(a), Some(b)) if a != b || trig_changed => DiffEvent::Edit,
                    _ => continue,
                };
                out.push(TreeDiff {
                    event,
                    property_path: format!("{name}.{key}"),
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serde_shape() {
        let tree: DataTree = serde_json::from_value(json!({
            "Api1": {"ENTITY_TYPE": "ACTION", "data": {"name": "x"}},
            "Button1": {"text": "{{Api1.data.name}}", "onClick": "{{Api1.run()}}", "triggerPaths": ["onClick"]}
        }))
        .unwrap();
        assert_eq!(tree.entity("Api1").unwrap().kind, EntityKind::Action);
        assert_eq!(tree.entity("Button1").unwrap().kind, EntityKind::Widget);
        assert!(tree.is_trigger("Button1.onClick"));
        assert_eq!(tree.get("Api1.data"), Some(&json!({"name": "x"})));
        assert_eq!(tree.paths().count(), 3);
        assert!(tree.to_value()["Button1"].get("triggerPaths").is_none());
    }

    #[test]
    fn diff_reports_property_changes() {
        let old = DataTree::new()
            .with("A", Entity::new(EntityKind::Widget).with("x", 1).with("y", 2))
            .with("B", Entity::new(EntityKind::Widget).with("z", 1));
        let new = DataTree::new()
            .with("A", Entity::new(EntityKind::Widget).with("x", 5).with("y", 2))
            .with("C", Entity::new(EntityKind::Widget).with("w", 1));
        let d = new.diff(&old);
        let events: Vec<_> = d.iter().map(|d| (d.event, d.property_path.as_str())).collect();
        assert_eq!(
            events,
            vec![
                (DiffEvent::Edit, "A.x"),
                (DiffEvent::Delete, "B.z"),
                (DiffEvent::New, "C.w"),
            ]
        );
    }
}
