pub mod job;
pub mod poller;

pub use job::{collect_outputs, AsyncJob, JobSnapshot, JobStatus, PollPolicy};
pub use poller::{run_variations, JobPoller, JobTarget, VariationOutcome};
