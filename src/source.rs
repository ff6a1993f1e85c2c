//! Getting raw document text into the pipeline. The pipeline itself never does
//! I/O; the CLI calls these before handing the text over.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::{info, instrument};

use crate::error::{Result, ScraperError};

const USER_AGENT: &str = concat!("table_scraper/", env!("CARGO_PKG_VERSION"));
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[instrument]
pub fn read_file(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path)?;
    info!("Read {} bytes from {}", text.len(), path.display());
    Ok(text)
}

/// Plain blocking GET. Non-2xx responses are errors.
#[instrument]
pub fn fetch_url(url: &str) -> Result<String> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .build()?;
    let response = client.get(url).send()?.error_for_status()?;
    let text = response.text()?;
    info!("Fetched {} bytes from {}", text.len(), url);
    Ok(text)
}

/// Read from `input` if given, otherwise fetch `url`.
pub fn read_source(input: Option<&Path>, url: Option<&str>) -> Result<String> {
    match (input, url) {
        (Some(path), _) => read_file(path),
        (None, Some(url)) => fetch_url(url),
        (None, None) => Err(ScraperError::Config(
            "either an input file or a URL is required".to_string(),
        )),
    }
}
