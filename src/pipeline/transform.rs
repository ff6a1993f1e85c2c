use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{Result, ScraperError};
use crate::pipeline::normalize::first_duplicate;
use crate::pipeline::record::{CastType, Record, Value};

/// One declarative column operation. In TOML each step is a table tagged by `op`:
///
/// ```toml
/// [[steps]]
/// op = "split"
/// column = "result"
/// delimiter = ", "
/// into = ["winner", "loser"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformStep {
    Rename {
        from: String,
        to: String,
    },
    Drop {
        column: String,
    },
    Cast {
        column: String,
        to: CastType,
    },
    /// Split on the first occurrence(s) of `delimiter` into exactly `into.len()`
    /// new columns, replacing `column`.
    Split {
        column: String,
        delimiter: String,
        into: Vec<String>,
    },
    /// Write the first match of `pattern` (capture group 1 if the pattern has one)
    /// to `into`, or `Value::Absent` when nothing matches.
    RegexExtract {
        column: String,
        pattern: String,
        into: String,
        #[serde(default)]
        cast: Option<CastType>,
    },
    /// Remove the first match of `pattern` from `column`. No match is not an error.
    RegexStrip {
        column: String,
        pattern: String,
    },
    /// Add a sequential integer identifier column.
    Enumerate {
        into: String,
        #[serde(default = "default_enumerate_start")]
        start: i64,
    },
    Trim {
        column: String,
    },
}

fn default_enumerate_start() -> i64 {
    1
}

impl TransformStep {
    pub fn op_name(&self) -> &'static str {
        match self {
            TransformStep::Rename { .. } => "rename",
            TransformStep::Drop { .. } => "drop",
            TransformStep::Cast { .. } => "cast",
            TransformStep::Split { .. } => "split",
            TransformStep::RegexExtract { .. } => "regex_extract",
            TransformStep::RegexStrip { .. } => "regex_strip",
            TransformStep::Enumerate { .. } => "enumerate",
            TransformStep::Trim { .. } => "trim",
        }
    }
}

/// A step ready to run: patterns compiled once, up front.
#[derive(Debug, Clone)]
enum CompiledStep {
    Rename { from: String, to: String },
    Drop { column: String },
    Cast { column: String, to: CastType },
    Split { column: String, delimiter: String, into: Vec<String> },
    RegexExtract { column: String, regex: Regex, into: String, cast: Option<CastType> },
    RegexStrip { column: String, regex: Regex },
    Enumerate { into: String, start: i64 },
    Trim { column: String },
}

fn compile_regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| ScraperError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

impl CompiledStep {
    fn compile(step: &TransformStep) -> Result<Self> {
        let compiled = match step.clone() {
            TransformStep::Rename { from, to } => CompiledStep::Rename { from, to },
            TransformStep::Drop { column } => CompiledStep::Drop { column },
            TransformStep::Cast { column, to } => CompiledStep::Cast { column, to },
            TransformStep::Split { column, delimiter, into } => {
                if delimiter.is_empty() {
                    return Err(ScraperError::Config(format!(
                        "split of '{}' needs a non-empty delimiter",
                        column
                    )));
                }
                if into.len() < 2 {
                    return Err(ScraperError::Config(format!(
                        "split of '{}' needs at least two target columns",
                        column
                    )));
                }
                if let Some(dup) = first_duplicate(&into) {
                    return Err(ScraperError::Config(format!(
                        "split of '{}' names target column '{}' twice",
                        column, dup
                    )));
                }
                CompiledStep::Split { column, delimiter, into }
            }
            TransformStep::RegexExtract { column, pattern, into, cast } => {
                CompiledStep::RegexExtract {
                    column,
                    regex: compile_regex(&pattern)?,
                    into,
                    cast,
                }
            }
            TransformStep::RegexStrip { column, pattern } => CompiledStep::RegexStrip {
                column,
                regex: compile_regex(&pattern)?,
            },
            TransformStep::Enumerate { into, start } => CompiledStep::Enumerate { into, start },
            TransformStep::Trim { column } => CompiledStep::Trim { column },
        };
        Ok(compiled)
    }

    fn apply(&self, index: usize, record: &mut Record) -> Result<()> {
        match self {
            CompiledStep::Rename { from, to } => {
                if !record.contains(from) {
                    return Err(missing(index, from));
                }
                if from != to && record.contains(to) {
                    return Err(duplicate(index, to));
                }
                record.rename(from, to.as_str());
            }
            CompiledStep::Drop { column } => {
                record.remove(column).ok_or_else(|| missing(index, column))?;
            }
            CompiledStep::Cast { column, to } => {
                let value = lookup(record, index, column)?;
                if !value.is_absent() {
                    let raw = value.to_string();
                    let cast = to.parse(&raw).ok_or_else(|| ScraperError::Cast {
                        record: index,
                        column: column.clone(),
                        value: raw,
                        target: to.to_string(),
                    })?;
                    record.set(column, cast);
                }
            }
            CompiledStep::Split { column, delimiter, into } => {
                let raw = lookup(record, index, column)?.to_string();
                if !raw.contains(delimiter.as_str()) {
                    return Err(ScraperError::DelimiterNotFound {
                        record: index,
                        column: column.clone(),
                        delimiter: delimiter.clone(),
                        value: raw,
                    });
                }
                let parts: Vec<&str> = raw.splitn(into.len(), delimiter.as_str()).collect();
                if parts.len() != into.len() {
                    return Err(ScraperError::ArityMismatch {
                        record: index,
                        column: column.clone(),
                        expected: into.len(),
                        found: parts.len(),
                    });
                }
                if let Some(taken) = into.iter().find(|c| *c != column && record.contains(c)) {
                    return Err(duplicate(index, taken));
                }
                record.remove(column);
                for (name, part) in into.iter().zip(parts) {
                    if !record.insert(name.as_str(), Value::text(part.trim())) {
                        return Err(duplicate(index, name));
                    }
                }
            }
            CompiledStep::RegexExtract { column, regex, into, cast } => {
                let value = lookup(record, index, column)?;
                let raw = value.to_string();
                let extracted = match first_match(regex, &raw) {
                    Some(found) if !value.is_absent() => match cast {
                        Some(cast) => cast.parse(found).ok_or_else(|| ScraperError::Cast {
                            record: index,
                            column: into.clone(),
                            value: found.to_string(),
                            target: cast.to_string(),
                        })?,
                        None => Value::text(found),
                    },
                    _ => Value::Absent,
                };
                if !record.set(into, extracted.clone()) {
                    record.insert(into.as_str(), extracted);
                }
            }
            CompiledStep::RegexStrip { column, regex } => {
                let value = lookup(record, index, column)?;
                if value.is_absent() {
                    return Ok(());
                }
                let raw = value.to_string();
                if let Some(m) = regex.find(&raw) {
                    let stripped = format!("{}{}", &raw[..m.start()], &raw[m.end()..]);
                    record.set(column, Value::text(stripped.trim()));
                }
            }
            CompiledStep::Enumerate { into, start } => {
                let id = i64::try_from(index)
                    .ok()
                    .and_then(|offset| start.checked_add(offset))
                    .ok_or_else(|| {
                        ScraperError::Config(format!(
                            "enumerate into '{}' overflows at record {} (start {})",
                            into, index, start
                        ))
                    })?;
                if !record.insert(into.as_str(), Value::Integer(id)) {
                    return Err(duplicate(index, into));
                }
            }
            CompiledStep::Trim { column } => {
                if let Value::Text(s) = lookup(record, index, column)? {
                    let trimmed = s.trim().to_string();
                    record.set(column, Value::Text(trimmed));
                }
            }
        }
        Ok(())
    }
}

fn lookup<'r>(record: &'r Record, index: usize, column: &str) -> Result<&'r Value> {
    record.get(column).ok_or_else(|| missing(index, column))
}

fn missing(record: usize, column: &str) -> ScraperError {
    ScraperError::MissingColumn {
        record,
        column: column.to_string(),
    }
}

fn duplicate(record: usize, column: &str) -> ScraperError {
    ScraperError::DuplicateColumn {
        record,
        column: column.to_string(),
    }
}

/// Capture group 1 when the pattern has groups and it participated, otherwise the
/// whole match. Trimmed.
fn first_match<'t>(regex: &Regex, text: &'t str) -> Option<&'t str> {
    let caps = regex.captures(text)?;
    let m = caps.get(1).or_else(|| caps.get(0))?;
    Some(m.as_str().trim())
}

/// Validated, compiled list of steps. Immutable once built.
#[derive(Debug, Clone)]
pub struct Transformer {
    steps: Vec<CompiledStep>,
    names: Vec<&'static str>,
}

impl Transformer {
    pub fn new(steps: &[TransformStep]) -> Result<Self> {
        let compiled = steps
            .iter()
            .map(CompiledStep::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            steps: compiled,
            names: steps.iter().map(TransformStep::op_name).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step over every record, one step at a time, in declaration order.
    /// Stops at the first error.
    #[instrument(skip(self, records), fields(records = records.len(), steps = self.steps.len()))]
    pub fn apply(&self, mut records: Vec<Record>) -> Result<Vec<Record>> {
        for (step_index, (step, name)) in self.steps.iter().zip(&self.names).enumerate() {
            debug!("Applying step {} ({})", step_index, name);
            for (index, record) in records.iter_mut().enumerate() {
                step.apply(index, record)?;
            }
        }
        info!(
            "Applied {} step(s) to {} record(s)",
            self.steps.len(),
            records.len()
        );
        Ok(records)
    }
}

/// Compile `steps` and apply them to `records`.
pub fn transform(records: Vec<Record>, steps: &[TransformStep]) -> Result<Vec<Record>> {
    Transformer::new(steps)?.apply(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(fields: &[(&str, &str)]) -> Record {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), Value::text(*v)))
            .collect()
    }

    fn split_result() -> TransformStep {
        TransformStep::Split {
            column: "result".to_string(),
            delimiter: ", ".to_string(),
            into: vec!["winner".to_string(), "loser".to_string()],
        }
    }

    #[test]
    fn test_split_then_regex_scores() {
        let records = vec![record(&[("result", "New England Patriots 34, Atlanta Falcons 28")])];
        let steps = vec![
            split_result(),
            TransformStep::RegexExtract {
                column: "winner".to_string(),
                pattern: r" \d+$".to_string(),
                into: "winner_score".to_string(),
                cast: Some(CastType::Integer),
            },
            TransformStep::RegexStrip {
                column: "winner".to_string(),
                pattern: r" \d+$".to_string(),
            },
        ];

        let out = transform(records, &steps).unwrap();
        assert_eq!(out[0].get("winner"), Some(&Value::text("New England Patriots")));
        assert_eq!(out[0].get("winner_score"), Some(&Value::Integer(34)));
        assert_eq!(out[0].get("loser"), Some(&Value::text("Atlanta Falcons 28")));
        assert_eq!(
            out[0].columns().collect::<Vec<_>>(),
            vec!["winner", "loser", "winner_score"]
        );
    }

    #[test]
    fn test_regex_extract_without_match_is_absent() {
        let records = vec![record(&[("team", "Denver Broncos")])];
        let steps = vec![TransformStep::RegexExtract {
            column: "team".to_string(),
            pattern: r"\d+".to_string(),
            into: "score".to_string(),
            cast: Some(CastType::Integer),
        }];
        let out = transform(records, &steps).unwrap();
        assert_eq!(out[0].get("score"), Some(&Value::Absent));
    }

    #[test]
    fn test_regex_extract_uses_first_capture_group() {
        let records = vec![record(&[("sb", "LI (51)")])];
        let steps = vec![TransformStep::RegexExtract {
            column: "sb".to_string(),
            pattern: r"\((\d+)\)".to_string(),
            into: "number".to_string(),
            cast: Some(CastType::Integer),
        }];
        let out = transform(records, &steps).unwrap();
        assert_eq!(out[0].get("number"), Some(&Value::Integer(51)));
    }

    #[test]
    fn test_regex_strip_is_lenient_and_idempotent() {
        let step = TransformStep::RegexStrip {
            column: "winner".to_string(),
            pattern: r" \d+$".to_string(),
        };
        let records = vec![record(&[("winner", "Green Bay Packers 35")]), record(&[("winner", "TBD")])];
        let once = transform(records, std::slice::from_ref(&step)).unwrap();
        let twice = transform(once.clone(), std::slice::from_ref(&step)).unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice[0].get("winner"), Some(&Value::text("Green Bay Packers")));
        assert_eq!(twice[1].get("winner"), Some(&Value::text("TBD")));
    }

    #[test]
    fn test_cast_date_and_failure() {
        let step = TransformStep::Cast {
            column: "date".to_string(),
            to: CastType::Date("%B. %d, %Y".to_string()),
        };
        let out = transform(vec![record(&[("date", "Feb. 5, 2017")])], std::slice::from_ref(&step)).unwrap();
        assert_eq!(
            out[0].get("date"),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2017, 2, 5).unwrap()))
        );

        let records = vec![record(&[("date", "Feb. 5, 2017")]), record(&[("date", "TBD")])];
        let err = transform(records, &[step]).unwrap_err();
        match err {
            ScraperError::Cast { record, value, .. } => {
                assert_eq!(record, 1);
                assert_eq!(value, "TBD");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_split_errors() {
        let err = transform(vec![record(&[("result", "no comma here")])], &[split_result()]).unwrap_err();
        assert!(matches!(err, ScraperError::DelimiterNotFound { .. }));

        let three_way = TransformStep::Split {
            column: "result".to_string(),
            delimiter: ", ".to_string(),
            into: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        };
        let err = transform(vec![record(&[("result", "x, y")])], &[three_way]).unwrap_err();
        assert!(matches!(
            err,
            ScraperError::ArityMismatch {
                expected: 3,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let steps = vec![TransformStep::Rename {
            from: "nope".to_string(),
            to: "x".to_string(),
        }];
        let err = transform(vec![record(&[("a", "1")])], &steps).unwrap_err();
        assert!(matches!(err, ScraperError::MissingColumn { record: 0, .. }));

        let steps = vec![TransformStep::Drop {
            column: "nope".to_string(),
        }];
        assert!(transform(vec![record(&[("a", "1")])], &steps).is_err());
    }

    #[test]
    fn test_rename_onto_existing_column_fails() {
        let steps = vec![TransformStep::Rename {
            from: "a".to_string(),
            to: "b".to_string(),
        }];
        let err = transform(vec![record(&[("a", "1"), ("b", "2")])], &steps).unwrap_err();
        assert!(matches!(err, ScraperError::DuplicateColumn { .. }));
    }

    #[test]
    fn test_enumerate_and_drop() {
        let records = vec![record(&[("sb", "I")]), record(&[("sb", "II")])];
        let steps = vec![
            TransformStep::Drop {
                column: "sb".to_string(),
            },
            TransformStep::Enumerate {
                into: "sb".to_string(),
                start: 1,
            },
        ];
        let out = transform(records, &steps).unwrap();
        assert_eq!(out[0].get("sb"), Some(&Value::Integer(1)));
        assert_eq!(out[1].get("sb"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_enumerate_overflow_is_an_error() {
        let records = vec![record(&[("sb", "I")]), record(&[("sb", "II")])];
        let steps = vec![TransformStep::Enumerate {
            into: "id".to_string(),
            start: i64::MAX,
        }];
        let err = transform(records, &steps).unwrap_err();
        assert!(matches!(err, ScraperError::Config(_)));

        let one = transform(vec![record(&[("sb", "I")])], &steps).unwrap();
        assert_eq!(one[0].get("id"), Some(&Value::Integer(i64::MAX)));
    }

    #[test]
    fn test_split_with_repeated_target_rejected_at_compile() {
        let steps = vec![TransformStep::Split {
            column: "result".to_string(),
            delimiter: ", ".to_string(),
            into: vec!["team".to_string(), "team".to_string()],
        }];
        assert!(matches!(Transformer::new(&steps), Err(ScraperError::Config(_))));
    }

    #[test]
    fn test_invalid_regex_rejected_before_any_record() {
        let steps = vec![TransformStep::RegexStrip {
            column: "a".to_string(),
            pattern: "(".to_string(),
        }];
        assert!(matches!(Transformer::new(&steps), Err(ScraperError::Regex { .. })));
    }

    #[test]
    fn test_steps_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Steps {
            steps: Vec<TransformStep>,
        }
        let parsed: Steps = toml::from_str(
            r#"
            [[steps]]
            op = "cast"
            column = "date"
            to = { date = "%B. %d, %Y" }

            [[steps]]
            op = "regex_extract"
            column = "winner"
            pattern = ' \d+$'
            into = "winner_score"
            cast = "integer"

            [[steps]]
            op = "enumerate"
            into = "id"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.steps.len(), 3);
        assert_eq!(
            parsed.steps[0],
            TransformStep::Cast {
                column: "date".to_string(),
                to: CastType::Date("%B. %d, %Y".to_string()),
            }
        );
        assert_eq!(
            parsed.steps[2],
            TransformStep::Enumerate {
                into: "id".to_string(),
                start: 1,
            }
        );
    }
}
