use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::constants::{DEFAULT_ABSENT_VALUE, DEFAULT_DELIMITER, XML_RECORD_ELEMENT, XML_ROOT_ELEMENT};
use crate::error::{Result, ScraperError};
use crate::pipeline::record::Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Xml,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    pub format: OutputFormat,
    /// Field delimiter for delimited output. Must be a single ASCII character.
    pub delimiter: char,
    /// Rendering of `Value::Absent`.
    pub absent_value: String,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Csv,
            delimiter: DEFAULT_DELIMITER,
            absent_value: DEFAULT_ABSENT_VALUE.to_string(),
        }
    }
}

/// Render `records` in `column_order`. The whole output is built in memory so a
/// failure part-way leaves nothing behind.
#[instrument(skip(records, column_order, options), fields(records = records.len(), format = ?options.format))]
pub fn serialize(
    records: &[Record],
    column_order: &[String],
    options: &OutputOptions,
) -> Result<Vec<u8>> {
    if options.format == OutputFormat::Xml {
        check_xml_names(column_order)?;
    }
    let rows = ordered_rows(records, column_order, &options.absent_value)?;
    let bytes = match options.format {
        OutputFormat::Csv => write_delimited(column_order, &rows, options.delimiter)?,
        OutputFormat::Xml => write_xml(column_order, &rows)?,
    };
    info!("Serialized {} record(s) into {} bytes", records.len(), bytes.len());
    Ok(bytes)
}

fn ordered_rows(records: &[Record], column_order: &[String], absent: &str) -> Result<Vec<Vec<String>>> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            column_order
                .iter()
                .map(|column| {
                    record
                        .get(column)
                        .map(|value| value.render(absent))
                        .ok_or_else(|| ScraperError::MissingColumn {
                            record: index,
                            column: column.clone(),
                        })
                })
                .collect()
        })
        .collect()
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    if delimiter.is_ascii() && delimiter != '"' && delimiter != '\n' && delimiter != '\r' {
        Ok(delimiter as u8)
    } else {
        Err(ScraperError::Config(format!(
            "delimiter {:?} must be a single ASCII character other than a quote or newline",
            delimiter
        )))
    }
}

fn write_delimited(column_order: &[String], rows: &[Vec<String>], delimiter: char) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .from_writer(Vec::new());

    writer.write_record(column_order)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| ScraperError::Io(e.into_error()))
}

fn write_xml(column_order: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>> {
    let mut xml = Writer::new_with_indent(Vec::new(), b' ', 2);
    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    xml.write_event(Event::Start(BytesStart::new(XML_ROOT_ELEMENT)))?;
    for row in rows {
        xml.write_event(Event::Start(BytesStart::new(XML_RECORD_ELEMENT)))?;
        for (column, value) in column_order.iter().zip(row) {
            xml.write_event(Event::Start(BytesStart::new(column.as_str())))?;
            xml.write_event(Event::Text(BytesText::new(value)))?;
            xml.write_event(Event::End(BytesEnd::new(column.as_str())))?;
        }
        xml.write_event(Event::End(BytesEnd::new(XML_RECORD_ELEMENT)))?;
    }
    xml.write_event(Event::End(BytesEnd::new(XML_ROOT_ELEMENT)))?;
    Ok(xml.into_inner())
}

/// Every column must be usable as an XML element name.
pub fn check_xml_names(columns: &[String]) -> Result<()> {
    match columns.iter().find(|c| !is_xml_name(c)) {
        Some(column) => Err(ScraperError::Config(format!(
            "column '{}' is not a valid XML element name",
            column
        ))),
        None => Ok(()),
    }
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
