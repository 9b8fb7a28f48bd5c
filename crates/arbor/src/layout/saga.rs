use std::{
    slice,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread,
    time::Instant,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{DropTarget, LayoutMutator};
use crate::{
    error::{Error, Result},
    widget::{LayoutDirection, ResponsiveBehavior, WidgetId, WidgetTree},
};

/// Description of a widget created by a drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWidget {
    /// Id the new widget will take.
    pub new_widget_id: WidgetId,
    /// Widget type tag.
    #[serde(rename = "type")]
    pub widget_type: String,
    /// Height in rows.
    pub rows: i32,
    /// Width in columns.
    pub columns: i32,
    /// Sizing mode.
    #[serde(default)]
    pub responsive_behavior: ResponsiveBehavior,
}

/// Materialises new widgets in a tree.
pub trait WidgetFactory {
    /// Return `tree` with a new child of `parent_id` built from `new_widget`.
    fn create_child_widget(
        &self,
        tree: &WidgetTree,
        parent_id: &WidgetId,
        new_widget: &NewWidget,
    ) -> Result<WidgetTree>;
}

/// Source and sink of the committed widget tree.
pub trait LayoutStore {
    /// The current tree.
    fn widgets(&self) -> WidgetTree;
    /// Persist an updated tree.
    fn commit_layout(&self, tree: WidgetTree);
}

/// A completed drag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DragEndEvent {
    /// A widget dragged in from the palette.
    AddNewWidget {
        /// Widget to create.
        new_widget: NewWidget,
        /// Drop target.
        drop: DropTarget,
    },
    /// Existing widgets moved to a new position.
    Reorder {
        /// Widgets being moved.
        moved: Vec<WidgetId>,
        /// Drop target.
        drop: DropTarget,
    },
}

/// Turns drag-end events into committed layouts.
#[derive(Debug)]
pub struct LayoutSaga<F, S> {
    /// Layout mutator.
    mutator: LayoutMutator,
    /// New widget collaborator.
    factory: F,
    /// Tree store collaborator.
    store: S,
}

impl<F: WidgetFactory, S: LayoutStore> LayoutSaga<F, S> {
    /// Construct a saga.
    pub fn new(mutator: LayoutMutator, factory: F, store: S) -> Self {
        Self {
            mutator,
            factory,
            store,
        }
    }

    /// The tree store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Compute the tree that results from an event without committing it.
    pub fn run(&self, event: &DragEndEvent) -> Result<WidgetTree> {
        let current = self.store.widgets();
        match event {
            DragEndEvent::AddNewWidget { new_widget, drop } => {
                let mut tree = self
                    .factory
                    .create_child_widget(&current, &drop.parent_id, new_widget)?;
                if !tree.contains(&new_widget.new_widget_id) {
                    return Err(Error::Layout(format!(
                        "factory did not create {}",
                        new_widget.new_widget_id
                    )));
                }
                self.mutator.reorder_children(
                    &mut tree,
                    slice::from_ref(&new_widget.new_widget_id),
                    drop,
                );
                if !drop.is_new_layer && drop.direction == LayoutDirection::Vertical {
                    self.mutator
                        .update_flex_child_columns(&mut tree, drop.layer_index, &drop.parent_id);
                }
                Ok(tree)
            }
            DragEndEvent::Reorder { moved, drop } => {
                if moved.is_empty() {
                    return Err(Error::Invalid("empty drag selection".into()));
                }
                let mut tree = current;
                self.mutator.reorder_children(&mut tree, moved, drop);
                if drop.direction == LayoutDirection::Vertical {
                    self.mutator
                        .update_size_of_all_children(&mut tree, &drop.parent_id);
                }
                Ok(tree)
            }
        }
    }

    /// Run an event and commit the result. Failures are logged and leave the
    /// store untouched.
    pub fn process(&self, event: &DragEndEvent) -> bool {
        self.process_if(event, || true)
    }

    /// Run an event and commit only if `current` still holds afterwards.
    fn process_if(&self, event: &DragEndEvent, current: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        let before = self.store.widgets();
        match self.run(event) {
            Ok(tree) if current() => {
                let changed = tree.changed_since(&before);
                self.store.commit_layout(tree);
                debug!(
                    elapsed = ?start.elapsed(),
                    changed = changed.len(),
                    "reorder computations done"
                );
                true
            }
            Ok(_) => {
                debug!("drag-end superseded, not committing");
                false
            }
            Err(e) => {
                warn!(error = %e, "drag-end failed");
                false
            }
        }
    }
}

/// Runs a saga on a background thread with a latest-wins policy.
///
/// Queued events are coalesced to the newest one, and a run that is
/// superseded while in flight does not commit.
#[derive(Debug)]
pub struct SagaRunner {
    /// Event channel to the worker thread.
    tx: Option<mpsc::Sender<(u64, DragEndEvent)>>,
    /// Sequence number of the newest dispatched event.
    generation: Arc<AtomicU64>,
    /// Worker thread.
    handle: Option<thread::JoinHandle<()>>,
}

impl SagaRunner {
    /// Spawn a worker thread that owns the saga.
    pub fn spawn<F, S>(saga: LayoutSaga<F, S>) -> Self
    where
        F: WidgetFactory + Send + 'static,
        S: LayoutStore + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<(u64, DragEndEvent)>();
        let generation = Arc::new(AtomicU64::new(0));
        let latest = Arc::clone(&generation);
        let handle = thread::spawn(move || {
            while let Ok(mut next) = rx.recv() {
                while let Ok(newer) = rx.try_recv() {
                    debug!(dropped = next.0, "coalescing drag-end events");
                    next = newer;
                }
                let (seq, event) = next;
                saga.process_if(&event, || latest.load(Ordering::SeqCst) == seq);
            }
        });
        Self {
            tx: Some(tx),
            generation,
            handle: Some(handle),
        }
    }

    /// Queue an event, superseding anything not yet committed.
    pub fn dispatch(&self, event: DragEndEvent) -> Result<()> {
        let seq = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx
            .as_ref()
            .ok_or_else(|| Error::Worker("saga runner stopped".into()))?
            .send((seq, event))
            .map_err(|e| Error::Worker(e.to_string()))
    }

    /// Stop accepting events and wait for the worker to drain.
    pub fn shutdown(mut self) {
        self.stop();
    }

    /// Close the channel and join the thread.
    fn stop(&mut self) {
        self.tx.take();
        if let Some(h) = self.handle.take()
            && h.join().is_err()
        {
            warn!("saga worker panicked");
        }
    }
}

impl Drop for SagaRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
