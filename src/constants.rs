//! Defaults shared by the config layer, the extractor and the CLI.

// Extraction
pub const DEFAULT_HTML_SELECTOR: &str = "table";
pub const HTML_ROW_TAG: &str = "tr";
pub const HTML_CELL_TAGS: [&str; 2] = ["th", "td"];
pub const HTML_TABLE_TAG: &str = "table";

// Output
pub const DEFAULT_DELIMITER: char = ',';
pub const DEFAULT_ABSENT_VALUE: &str = "";
pub const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const XML_ROOT_ELEMENT: &str = "records";
pub const XML_RECORD_ELEMENT: &str = "record";

// Logging
pub const LOG_DIR: &str = "logs";
pub const LOG_FILE_PREFIX: &str = "table_scraper.log";
pub const DEFAULT_LOG_FILTER: &str = "table_scraper=info";
