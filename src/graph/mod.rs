//! Signal Graph Module
//!
//! Graph construction over interchangeable processing contexts:
//! - Realtime and offline contexts
//! - Playback source binding
//! - The canonical node chain and its command interface

pub mod builder;
pub mod command;
pub mod context;

pub use builder::{build_graph, GraphNodes, SignalGraph};
pub use command::{GraphCommand, ParamTarget};
pub use context::{
    ContextKind, NullTap, OfflineContext, ProcessingContext, RealtimeContext, SourceHandle,
    SourceNode,
};
