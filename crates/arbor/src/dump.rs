//! Tabular debug dumps of highlights and evaluation results.

use std::io::Write;

use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    eval::{DataTree, EvalError},
    layout::HighlightInfo,
};

/// A table with the shared preset.
fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(UTF8_FULL);
    table.set_header(header.to_vec());
    table
}

/// Compact single-line JSON.
fn short(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        v => v.to_string(),
    }
}

/// Render highlights, one row each.
pub fn highlight_table(highlights: &[HighlightInfo]) -> Table {
    let mut t = table(&["#", "layer", "index", "row", "align", "bar", "new", "rect"]);
    for (i, h) in highlights.iter().enumerate() {
        t.add_row(vec![
            Cell::new(i).fg(Color::Green),
            Cell::new(h.layer_index),
            Cell::new(h.index),
            Cell::new(h.row_index),
            Cell::new(format!("{:?}", h.alignment)),
            Cell::new(format!("{:?}", h.orientation)),
            Cell::new(if h.is_new_layer { "yes" } else { "" }),
            Cell::new(format!(
                "{:.0},{:.0} {:.0}x{:.0}",
                h.rect.x, h.rect.y, h.rect.w, h.rect.h
            )),
        ]);
    }
    t
}

/// Render evaluated paths in order with their values and errors.
pub fn evaluation_table(order: &[String], tree: &DataTree, errors: &[EvalError]) -> Table {
    let mut t = table(&["#", "path", "value", "error"]);
    for (i, path) in order.iter().enumerate() {
        let err = errors
            .iter()
            .filter(|e| e.path.as_deref() == Some(path.as_str()))
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        t.add_row(vec![
            Cell::new(i).fg(Color::Green),
            Cell::new(path),
            Cell::new(tree.get(path).map(short).unwrap_or_default()),
            Cell::new(err).fg(Color::Red),
        ]);
    }
    t
}

/// Write a table followed by a newline.
pub fn write_table(w: &mut dyn Write, table: &Table) -> Result<()> {
    writeln!(w, "{table}").map_err(|x| Error::Invalid(x.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::eval::{Entity, EntityKind, EvalErrorKind};

    #[test]
    fn evaluation_rows() {
        let tree = DataTree::new().with(
            "Text1",
            Entity::new(EntityKind::Widget).with("text", "hi").with("bad", Value::Null),
        );
        let errors = vec![EvalError::new(EvalErrorKind::Evaluation, "boom").at("Text1.bad")];
        let t = evaluation_table(&["Text1.text".into(), "Text1.bad".into()], &tree, &errors);
        let mut out = Vec::new();
        write_table(&mut out, &t).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Text1.text"));
        assert!(out.contains("boom"));
        assert_eq!(short(&json!({"a": 1})), "{\"a\":1}");
    }
}
