//! Execution-trace model for step-through program visualization.
//!
//! An external engine runs a program under a tracer and returns a flat log of
//! events. This crate classifies the captured values, rebuilds the call tree,
//! plays the log back step by step and turns each step into renderer data.

pub mod call_tree;
pub mod clock;
pub mod config;
pub mod diff;
pub mod dispatch;
pub mod engine;
pub mod event;
pub mod formula;
pub mod network;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod value;

pub use call_tree::{CallNode, CallTree, CallTreeView, NodeId};
pub use clock::VirtualClock;
pub use config::{Config, ConfigError};
pub use dispatch::{Dispatcher, RendererContract, RendererTable};
pub use engine::{ExecutionEngine, RunError, RunOutput};
pub use event::{EventKind, ExecutionEvent, ExecutionLog};
pub use playback::{Phase, Playback, PlaybackChange, TickScheduler, TickToken, Transition};
pub use session::{Session, StepView, VariableView};
pub use value::{Tag, Value, classify};
