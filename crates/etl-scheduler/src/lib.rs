//! Interval scheduler for the movies-etl pipelines.
//!
//! Every cycle runs the registered pipelines one after another against a
//! single change source and cursor book, then sleeps. Shutdown is
//! cooperative through a `CancellationToken`: it is checked before each
//! cycle and raced against the sleep, so an in-flight pass always finishes.
//!
//! # Example
//!
//! ```ignore
//! use etl_scheduler::{Scheduler, SchedulerConfig};
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::default(), source, cursors);
//! scheduler.register(Box::new(movies));
//! scheduler.pre_check(&startup_retry).await?;
//! scheduler.run(shutdown_token).await?;
//! ```

mod config;
mod error;
mod registry;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use registry::{PassResult, PipelineStatus, StatusRegistry};
pub use scheduler::Scheduler;
