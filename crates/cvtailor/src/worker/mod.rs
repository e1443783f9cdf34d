pub mod dispatcher;
pub mod pool;

pub use dispatcher::{Dispatch, DispatchError, Dispatcher};
pub use pool::{AttemptReport, ShutdownHandle, WorkerPool};
