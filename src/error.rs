use thiserror::Error;

use crate::pipeline::loader::DocumentFormat;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Failed to parse {format} document: {message}")]
    Parse {
        format: DocumentFormat,
        message: String,
    },

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Selector '{selector}' matched {found} table(s), but index {index} was requested")]
    NotFound {
        selector: String,
        index: usize,
        found: usize,
    },

    #[error("Row {row} has {found} cells but {expected} headers were declared")]
    SchemaMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Record {record}: column '{column}' does not exist")]
    MissingColumn { record: usize, column: String },

    #[error("Record {record}: column '{column}' already exists")]
    DuplicateColumn { record: usize, column: String },

    #[error("Record {record}: delimiter '{delimiter}' not found in column '{column}' (value '{value}')")]
    DelimiterNotFound {
        record: usize,
        column: String,
        delimiter: String,
        value: String,
    },

    #[error("Record {record}: splitting column '{column}' produced {found} part(s), expected {expected}")]
    ArityMismatch {
        record: usize,
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Record {record}: cannot cast '{value}' in column '{column}' to {target}")]
    Cast {
        record: usize,
        column: String,
        value: String,
        target: String,
    },

    #[error("Invalid regex '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML write failed: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ScraperError {
    /// Short machine-friendly name, used as a metrics label and in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ScraperError::Parse { .. } => "parse",
            ScraperError::Selector { .. } => "selector",
            ScraperError::NotFound { .. } => "not_found",
            ScraperError::SchemaMismatch { .. } => "schema_mismatch",
            ScraperError::MissingColumn { .. } => "missing_column",
            ScraperError::DuplicateColumn { .. } => "duplicate_column",
            ScraperError::DelimiterNotFound { .. } => "delimiter_not_found",
            ScraperError::ArityMismatch { .. } => "arity_mismatch",
            ScraperError::Cast { .. } => "cast",
            ScraperError::Regex { .. } => "regex",
            ScraperError::Config(_) => "config",
            ScraperError::Io(_) => "io",
            ScraperError::Toml(_) => "toml",
            ScraperError::Csv(_) => "csv",
            ScraperError::Xml(_) => "xml",
            ScraperError::Http(_) => "http",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;
