//! Command-line driver for the arbor engine: evaluate data trees, replay
//! worker requests, and inspect drop highlights and reflows.

use std::{
    fs,
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use arbor::{
    DataTree, DataTreeEvaluator, EngineConfig, EvalSession, WidgetId, WidgetTree, dump,
    layout::{DragEndEvent, DragSession, GridMeasure, HighlightCalculator, LayoutMutator},
    widget::Widget,
    worker::WorkerRequest,
};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// CLI flags for arborctl.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration file (TOML).
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    /// Log to stderr.
    #[clap(short, long, global = true)]
    verbose: bool,
    /// Subcommand to run.
    #[clap(subcommand)]
    command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate an unevaluated data tree and print the results.
    Eval {
        /// Data tree JSON file.
        tree: PathBuf,
        /// Print the evaluated tree as JSON instead of a table.
        #[clap(long)]
        json: bool,
    },
    /// Feed newline-delimited worker requests through a session and print
    /// one response per line.
    Worker {
        /// Request file; stdin if omitted.
        requests: Option<PathBuf>,
    },
    /// List drop highlights for widgets dragged over a canvas.
    Highlights {
        /// Widget tree JSON file.
        widgets: PathBuf,
        /// Canvas to drop into.
        #[clap(long, default_value = "0")]
        canvas: String,
        /// Dragged widget ids.
        #[clap(long = "drag", required = true)]
        dragged: Vec<String>,
        /// Pixels per grid column.
        #[clap(long, default_value_t = 10.0)]
        column_width: f64,
        /// Pixels per grid row.
        #[clap(long, default_value_t = 10.0)]
        row_height: f64,
    },
    /// Apply a drag-end event to a widget tree and print the new tree.
    Drop {
        /// Widget tree JSON file.
        widgets: PathBuf,
        /// Drag-end event JSON file.
        event: PathBuf,
    },
}

/// Read and decode a JSON file.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let s = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing {}", path.display()))
}

/// Load the engine configuration, or the defaults.
fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let s = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(EngineConfig::from_toml_str(&s)?)
}

/// Evaluate `tree` and write a table or the evaluated JSON.
fn eval(cfg: &EngineConfig, tree: DataTree, json: bool, out: &mut dyn Write) -> Result<()> {
    let mut ev = DataTreeEvaluator::with_rhai(&cfg.eval);
    let pass = ev.create_first_tree(tree);
    info!(
        nodes = pass.evaluation_order.len(),
        errors = pass.errors.len(),
        "evaluated"
    );
    if json {
        serde_json::to_writer_pretty(&mut *out, ev.eval_tree())?;
        writeln!(out)?;
    } else {
        let t = dump::evaluation_table(&pass.evaluation_order, ev.eval_tree(), &pass.errors);
        dump::write_table(out, &t)?;
    }
    Ok(())
}

/// Run every request line through one session.
fn worker(cfg: &EngineConfig, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<()> {
    let mut session = EvalSession::new(cfg.eval);
    for (n, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let req: WorkerRequest =
            serde_json::from_str(&line).with_context(|| format!("request on line {}", n + 1))?;
        debug!(id = %req.request_id, method = req.body.method(), "request");
        let resp = session.handle(&req);
        serde_json::to_writer(&mut *out, &resp)?;
        writeln!(out)?;
    }
    session.dispose();
    Ok(())
}

/// Compute highlights from grid-derived measurements.
fn highlights(
    cfg: &EngineConfig,
    tree: &WidgetTree,
    canvas: &str,
    dragged: Vec<WidgetId>,
    cell: (f64, f64),
    out: &mut dyn Write,
) -> Result<()> {
    if !tree.contains(&WidgetId::from(canvas)) {
        bail!("canvas {canvas} not in tree");
    }
    let measure = GridMeasure::new(tree, cell.0, cell.1);
    let mut session = DragSession::new(HighlightCalculator::new(canvas, cfg.highlight), dragged);
    let hs = session.recalculate(tree, &measure, false);
    dump::write_table(out, &dump::highlight_table(hs))?;
    Ok(())
}

/// Apply a drag-end event. New widgets are created directly from their
/// description.
fn apply_drop(cfg: &EngineConfig, mut tree: WidgetTree, event: &DragEndEvent) -> Result<WidgetTree> {
    let mutator = LayoutMutator::new(cfg.layout);
    match event {
        DragEndEvent::AddNewWidget { new_widget, drop } => {
            let mut w = Widget::new(new_widget.new_widget_id.clone(), new_widget.widget_type.clone());
            w.parent_id = Some(drop.parent_id.clone());
            w.position.bottom_row = new_widget.rows;
            w.position.right_column = new_widget.columns;
            w.responsive_behavior = new_widget.responsive_behavior;
            tree.insert(w);
            mutator.reorder_children(&mut tree, &[new_widget.new_widget_id.clone()], drop);
            mutator.update_size_of_all_children(&mut tree, &drop.parent_id);
        }
        DragEndEvent::Reorder { moved, drop } => {
            if moved.is_empty() {
                bail!("empty drag selection");
            }
            mutator.reorder_children(&mut tree, moved, drop);
            mutator.update_size_of_all_children(&mut tree, &drop.parent_id);
        }
    }
    for v in tree.validate() {
        debug!(violation = ?v, "tree invariant");
    }
    Ok(tree)
}

/// Run the CLI.
fn main() -> Result<()> {
    let args = Args::parse();
    if args.verbose {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_target(false)
            .compact()
            .init();
    }
    let cfg = load_config(args.config.as_deref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.command {
        Command::Eval { tree, json } => eval(&cfg, read_json(&tree)?, json, &mut out),
        Command::Worker { requests } => match requests {
            Some(p) => {
                let f = fs::File::open(&p).with_context(|| format!("opening {}", p.display()))?;
                worker(&cfg, &mut BufReader::new(f), &mut out)
            }
            None => worker(&cfg, &mut io::stdin().lock(), &mut out),
        },
        Command::Highlights {
            widgets,
            canvas,
            dragged,
            column_width,
            row_height,
        } => highlights(
            &cfg,
            &read_json(&widgets)?,
            &canvas,
            dragged.into_iter().map(WidgetId::from).collect(),
            (column_width, row_height),
            &mut out,
        ),
        Command::Drop { widgets, event } => {
            let tree = apply_drop(&cfg, read_json(&widgets)?, &read_json(&event)?)?;
            serde_json::to_writer_pretty(&mut out, &tree)?;
            writeln!(out)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn widgets() -> WidgetTree {
        serde_json::from_value(json!({
            "0": {
                "widgetId": "0", "widgetName": "MainContainer", "type": "CANVAS_WIDGET",
                "topRow": 0, "bottomRow": 0, "leftColumn": 0, "rightColumn": 64,
                "children": ["a", "b"],
                "flexLayers": [{"children": [{"id": "a", "align": "start"}, {"id": "b", "align": "start"}], "hasFillChild": false}]
            },
            "a": {"widgetId": "a", "widgetName": "a", "type": "TEXT_WIDGET", "parentId": "0",
                  "topRow": 0, "bottomRow": 4, "leftColumn": 0, "rightColumn": 10},
            "b": {"widgetId": "b", "widgetName": "b", "type": "TEXT_WIDGET", "parentId": "0",
                  "topRow": 0, "bottomRow": 4, "leftColumn": 10, "rightColumn": 20}
        }))
        .unwrap()
    }

    #[test]
    fn eval_json() {
        let tree: DataTree = serde_json::from_value(json!({
            "Input1": {"ENTITY_TYPE": "WIDGET", "text": "hi"},
            "Text1": {"ENTITY_TYPE": "WIDGET", "text": "{{Input1.text}} there"}
        }))
        .unwrap();
        let mut out = Vec::new();
        eval(&EngineConfig::default(), tree, true, &mut out).unwrap();
        let v: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["Text1"]["text"], "hi there");

        let mut out = Vec::new();
        eval(&EngineConfig::default(), DataTree::new(), false, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("path"));
    }

    #[test]
    fn worker_lines() {
        let input = concat!(
            r#"{"requestId":"1","method":"SETUP"}"#,
            "\n\n",
            r#"{"requestId":"2","method":"EVAL_EXPRESSION","requestData":{"expression":"1 + 1"}}"#,
            "\n",
        );
        let mut out = Vec::new();
        worker(&EngineConfig::default(), &mut input.as_bytes(), &mut out).unwrap();
        let lines: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["responseData"], true);
        assert_eq!(lines[1]["requestId"], "2");
        assert!(worker(&EngineConfig::default(), &mut "nope\n".as_bytes(), &mut Vec::new()).is_err());
    }

    #[test]
    fn highlights_table() {
        let mut out = Vec::new();
        highlights(
            &EngineConfig::default(),
            &widgets(),
            "0",
            vec!["x".into()],
            (10.0, 10.0),
            &mut out,
        )
        .unwrap();
        assert!(String::from_utf8(out).unwrap().contains("layer"));
        assert!(
            highlights(&EngineConfig::default(), &widgets(), "zz", vec!["x".into()], (1.0, 1.0), &mut Vec::new())
                .is_err()
        );
    }

    #[test]
    fn drop_reorders() {
        let event: DragEndEvent = serde_json::from_value(json!({
            "type": "REORDER",
            "moved": ["b"],
            "drop": {"parentId": "0", "index": 0, "layerIndex": 0, "rowIndex": 0,
                     "alignment": "start", "isNewLayer": false, "direction": "Vertical"}
        }))
        .unwrap();
        let tree = apply_drop(&EngineConfig::default(), widgets(), &event).unwrap();
        let root = tree.get(&"0".into()).unwrap();
        assert_eq!(root.children, vec![WidgetId::from("b"), WidgetId::from("a")]);
    }
}
