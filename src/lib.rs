pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod source;

pub use config::PipelineConfig;
pub use error::{Result, ScraperError};
pub use pipeline::{Pipeline, RunOutput, Stage, StageFailure};
