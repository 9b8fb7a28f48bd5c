//! Undo/redo history of serialized editor entities.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Direction of a replay step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplayEvent {
    /// Step back.
    Undo,
    /// Step forward.
    Redo,
}

/// Result of a replay step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResult {
    /// The snapshot now current.
    pub replay_entity: Value,
    /// Entity type given when the history was created.
    pub replay_entity_type: String,
    /// Step taken.
    pub event: ReplayEvent,
    /// Top-level keys that differ between the two snapshots.
    pub updates: Vec<String>,
}

/// Linear snapshot history with a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayEntity {
    /// Entity type.
    kind: String,
    /// Snapshots, oldest first.
    history: Vec<Value>,
    /// Index of the current snapshot.
    cursor: usize,
    /// Maximum snapshots kept; at least one.
    limit: usize,
}

/// Keys whose values differ between two objects. Non-objects compare whole.
fn changed_keys(a: &Value, b: &Value) -> Vec<String> {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<String> = a
                .keys()
                .chain(b.keys())
                .filter(|k| a.get(*k) != b.get(*k))
                .cloned()
                .collect();
            keys.sort();
            keys.dedup();
            keys
        }
        _ if a != b => vec![String::new()],
        _ => Vec::new(),
    }
}

impl ReplayEntity {
    /// A history holding `initial`.
    pub fn new(kind: impl Into<String>, initial: Value, limit: usize) -> Self {
        Self {
            kind: kind.into(),
            history: vec![initial],
            cursor: 0,
            limit: limit.max(1),
        }
    }

    /// Entity type.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Current snapshot.
    pub fn current(&self) -> &Value {
        &self.history[self.cursor]
    }

    /// True if a step back is possible.
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    /// True if a step forward is possible.
    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.history.len()
    }

    /// Record a snapshot. A snapshot equal to the current one is ignored.
    /// Recording discards the redo tail. Returns true if recorded.
    pub fn update(&mut self, snapshot: Value) -> bool {
        if *self.current() == snapshot {
            return false;
        }
        self.history.truncate(self.cursor + 1);
        self.history.push(snapshot);
        if self.history.len() > self.limit {
            let excess = self.history.len() - self.limit;
            self.history.drain(..excess);
        }
        self.cursor = self.history.len() - 1;
        true
    }

    /// Move the cursor one step. Returns `None` at either end.
    pub fn replay(&mut self, event: ReplayEvent) -> Option<ReplayResult> {
        let from = self.cursor;
        match event {
            ReplayEvent::Undo if self.can_undo() => self.cursor -= 1,
            ReplayEvent::Redo if self.can_redo() => self.cursor += 1,
            _ => return None,
        }
        Some(ReplayResult {
            replay_entity: self.current().clone(),
            replay_entity_type: self.kind.clone(),
            event,
            updates: changed_keys(&self.history[from], self.current()),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn undo_redo() {
        let mut r = ReplayEntity::new("canvas", json!({"w": 1}), 10);
        assert!(r.replay(ReplayEvent::Undo).is_none());
        assert!(r.update(json!({"w": 2, "t": "x"})));
        assert!(!r.update(json!({"w": 2, "t": "x"})));

        let res = r.replay(ReplayEvent::Undo).unwrap();
        assert_eq!(res.replay_entity, json!({"w": 1}));
        assert_eq!(res.updates, vec!["t", "w"]);
        assert!(r.replay(ReplayEvent::Undo).is_none());

        let res = r.replay(ReplayEvent::Redo).unwrap();
        assert_eq!(res.replay_entity, json!({"w": 2, "t": "x"}));
        assert!(!r.can_redo());
    }

    #[test]
    fn update_truncates_redo_and_respects_limit() {
        let mut r = ReplayEntity::new("canvas", json!(0), 3);
        for i in 1..5 {
            r.update(json!(i));
        }
        assert_eq!(r.current(), &json!(4));
        r.replay(ReplayEvent::Undo);
        r.replay(ReplayEvent::Undo);
        assert_eq!(r.current(), &json!(2));
        assert!(!r.can_undo());

        r.update(json!(9));
        assert!(!r.can_redo());
        r.replay(ReplayEvent::Undo);
        assert_eq!(r.current(), &json!(2));
    }
}
