//! Out-of-process validation: frame protocol, process runtimes, pooling

mod pool;
mod process;
mod protocol;

pub use pool::{PoolStatus, PooledRuntime, RuntimeState, ScriptRuntimePool};
pub use process::{ProcessRuntime, ProcessRuntimeFactory, RuntimeFactory, ScriptRuntime};
pub use protocol::{Operation, ScriptCommand, ScriptResult, ping_frame};
