//! The extraction pipeline: load → extract → normalize → transform → serialize.
//!
//! Each stage takes its input by value or reference and returns a fresh output;
//! nothing is shared between runs. The first failing stage ends the run.

pub mod extract;
pub mod loader;
pub mod normalize;
pub mod record;
pub mod serialize;
pub mod transform;

use std::fmt;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::ScraperError;
use crate::metrics::{time_stage, PipelineMetrics};

pub use extract::{extract_all_tables, extract_table, RawTable};
pub use loader::{load, Document, DocumentFormat};
pub use normalize::normalize;
pub use record::{CastType, Record, Value};
pub use serialize::{serialize, OutputFormat, OutputOptions};
pub use transform::{transform, TransformStep, Transformer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configure,
    Load,
    Extract,
    Normalize,
    Transform,
    Serialize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Configure => "configure",
            Stage::Load => "load",
            Stage::Extract => "extract",
            Stage::Normalize => "normalize",
            Stage::Transform => "transform",
            Stage::Serialize => "serialize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run that stopped at `stage`.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: ScraperError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageFailure>;
}

impl<T> AtStage<T> for crate::error::Result<T> {
    fn at(self, stage: Stage) -> Result<T, StageFailure> {
        self.map_err(|error| {
            error!(stage = %stage, kind = error.kind(), "{}", error);
            PipelineMetrics::record_failure(stage, error.kind());
            StageFailure { stage, error }
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub run_id: Uuid,
    /// Hex SHA-256 of the raw input text.
    pub input_sha256: String,
    pub rows_extracted: usize,
    pub records: usize,
    pub bytes: Vec<u8>,
}

/// A validated configuration with its steps compiled. Reusable across runs.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    transformer: Transformer,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, StageFailure> {
        config.validate().at(Stage::Configure)?;
        let transformer = Transformer::new(&config.steps).at(Stage::Configure)?;
        Ok(Self {
            config,
            transformer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole pipeline over one document's raw text.
    pub fn run(&self, raw_text: &str) -> Result<RunOutput, StageFailure> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", run_id = %run_id);
        let _enter = span.enter();

        let input_sha256 = hex::encode(Sha256::digest(raw_text.as_bytes()));
        info!(
            "Starting run over {} bytes of {} (sha256 {})",
            raw_text.len(),
            self.config.format,
            input_sha256
        );

        let document = {
            let _timing = time_stage(Stage::Load);
            let loaded = if self.config.unwrap_comments {
                loader::load_unwrapping_comments(raw_text, self.config.format)
            } else {
                load(raw_text, self.config.format)
            };
            loaded.at(Stage::Load)?
        };

        let table = {
            let _timing = time_stage(Stage::Extract);
            extract_table(&document, &self.config.selector, self.config.table_index)
                .at(Stage::Extract)?
        };
        drop(document);
        let rows_extracted = table.row_count();
        PipelineMetrics::record_extracted(rows_extracted);

        let records = {
            let _timing = time_stage(Stage::Normalize);
            normalize(table, self.config.skip_rows, &self.config.headers).at(Stage::Normalize)?
        };

        let records = {
            let _timing = time_stage(Stage::Transform);
            self.transformer.apply(records).at(Stage::Transform)?
        };

        let bytes = {
            let _timing = time_stage(Stage::Serialize);
            serialize(
                &records,
                &self.config.output_columns,
                &self.config.output_options(),
            )
            .at(Stage::Serialize)?
        };

        PipelineMetrics::record_success(records.len(), bytes.len());
        info!(
            "Run finished: {} rows extracted, {} records written",
            rows_extracted,
            records.len()
        );

        Ok(RunOutput {
            run_id,
            input_sha256,
            rows_extracted,
            records: records.len(),
            bytes,
        })
    }
}
