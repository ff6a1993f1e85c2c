use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::constants::{DEFAULT_ABSENT_VALUE, DEFAULT_DELIMITER};
use crate::error::{Result, ScraperError};
use crate::pipeline::loader::DocumentFormat;
use crate::pipeline::normalize::first_duplicate;
use crate::pipeline::serialize::{check_xml_names, OutputFormat, OutputOptions};
use crate::pipeline::transform::TransformStep;

/// Everything one run needs to know, usually loaded from a TOML file:
///
/// ```toml
/// format = "html"
/// selector = "table"
/// skip_rows = 1
/// headers = ["date", "sb", "result"]
/// output_columns = ["date", "winner", "loser"]
///
/// [[steps]]
/// op = "split"
/// column = "result"
/// delimiter = ", "
/// into = ["winner", "loser"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub format: DocumentFormat,
    pub selector: String,
    #[serde(default)]
    pub table_index: usize,
    pub skip_rows: usize,
    pub headers: Vec<String>,
    #[serde(default)]
    pub steps: Vec<TransformStep>,
    pub output_columns: Vec<String>,

    /// Strip HTML comment markers before parsing.
    #[serde(default)]
    pub unwrap_comments: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default = "default_absent_value")]
    pub absent_value: String,
}

fn default_delimiter() -> char {
    DEFAULT_DELIMITER
}

fn default_absent_value() -> String {
    DEFAULT_ABSENT_VALUE.to_string()
}

impl PipelineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that do not need a document. Regex patterns are
    /// checked when the pipeline compiles its steps.
    pub fn validate(&self) -> Result<()> {
        if self.selector.trim().is_empty() {
            return Err(ScraperError::Config("selector must not be empty".to_string()));
        }
        if self.headers.is_empty() {
            return Err(ScraperError::Config("headers must not be empty".to_string()));
        }
        if let Some(dup) = first_duplicate(&self.headers) {
            return Err(ScraperError::Config(format!("duplicate header '{}'", dup)));
        }
        if self.output_columns.is_empty() {
            return Err(ScraperError::Config(
                "output_columns must not be empty".to_string(),
            ));
        }
        if let Some(dup) = first_duplicate(&self.output_columns) {
            return Err(ScraperError::Config(format!(
                "duplicate output column '{}'",
                dup
            )));
        }
        if !self.delimiter.is_ascii() {
            return Err(ScraperError::Config(format!(
                "delimiter {:?} must be a single ASCII character",
                self.delimiter
            )));
        }
        if self.output_format == OutputFormat::Xml {
            check_xml_names(&self.output_columns)?;
        }
        Ok(())
    }

    pub fn output_options(&self) -> OutputOptions {
        OutputOptions {
            format: self.output_format,
            delimiter: self.delimiter,
            absent_value: self.absent_value.clone(),
        }
    }
}
