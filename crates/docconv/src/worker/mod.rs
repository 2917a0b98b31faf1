pub mod job;
pub mod pool;
pub mod supervisor;

pub use job::ConvertJob;
pub use pool::WorkerPool;
pub use supervisor::DeadlineSupervisor;
