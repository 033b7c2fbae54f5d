pub mod router;
pub mod task;

pub use router::TaskRouter;
pub use task::{ProviderCall, TaskRequest, TaskResult, TaskRunner, TaskType, DEFAULT_IDENTITY};
