mod classify;
mod clock;
mod gate;
mod graph;
mod links;
mod merge;
mod overrides;
mod policy;
mod records;
mod sync;

pub use clock::parse_utc;
pub use graph::{
    GraphLink, GraphNode, LayoutState, LinkKind, MeshGraph, NodeGroup, NodeKind, SignalTrace,
};
pub use links::LayerVisibility;
pub use overrides::{
    DEFAULT_LINK_DISTANCE, DEFAULT_LINK_STRENGTH, DEFAULT_REPULSION, ForceParams, MeshSettings,
    NodeShape,
};
pub use policy::{DEFAULT_LIVENESS_HOURS, MeshPolicy};
pub use records::{AgentRecord, MemoryRecord, MessageRecord};
pub use sync::{MeshSynchronizer, SyncInputs};
