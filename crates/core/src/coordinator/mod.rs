//! Worker pool coordinator.
//!
//! Fans discovered scans out over a fixed number of workers and streams one
//! [`PipelineRun`](crate::pipeline::PipelineRun) per scan to a
//! [`ReportCollector`], which produces the final [`RunSummary`].
//!
//! # Example
//!
//! ```ignore
//! let (tx, collector) = create_report_channel(config.pipeline.report_buffer);
//! let summary = tokio::spawn(collector.run());
//!
//! let pool = WorkerPool::new(pipeline, config.pipeline.workers);
//! let status = pool.run(scans, tx).await;
//! let summary = summary.await?;
//! ```

mod pool;
mod report;
mod types;

pub use pool::WorkerPool;
pub use report::{create_report_channel, ReportCollector};
pub use types::{PoolStatus, RunSummary, ScanFailure};
