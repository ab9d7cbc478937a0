//! Job expansion and the concurrent dispatcher

mod dispatcher;
mod job;

pub use dispatcher::{Dispatcher, DispatcherConfig, RunReport};
pub use job::{
    validate_account_id, validate_region, DescriptorAction, Job, JobAction, JobDescriptor,
    JobError, ServiceType, WorkItem,
};
