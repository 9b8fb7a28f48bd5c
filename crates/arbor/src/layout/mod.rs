//! Auto-layout: flex layers, drop highlights, reflow mutations and the
//! drag-end orchestration that commits them.

/// Drop highlight computation.
mod highlight;
/// Flex layer model.
mod layer;
/// Grid-derived measurements.
mod measure;
/// Reflow mutations.
mod mutator;
/// Drag-end orchestration.
mod saga;

pub use highlight::{
    DragSession, HighlightCalculator, HighlightInfo, HighlightSelection, Measure, Orientation,
};
pub use layer::{
    Alignment, Buckets, FlexLayer, LayerChild, flatten_layers, index_in_layer, layer_index_of,
    remove_from_layers, sibling_count, wrap_children,
};
pub use measure::GridMeasure;
pub use mutator::{DropTarget, LayoutMutator};
pub use saga::{DragEndEvent, LayoutSaga, LayoutStore, NewWidget, SagaRunner, WidgetFactory};
