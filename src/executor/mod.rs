pub mod commands;
pub mod coordinator;
pub mod dispatcher;
pub mod invoker;

pub use commands::Command;
pub use coordinator::{CoordinateMapper, DevicePoint, RenderFrame, RenderPoint, Rotation, ValidRegion};
pub use dispatcher::ActionExecutor;
pub use invoker::{ExecutionResult, Invoker, SettleTable};
