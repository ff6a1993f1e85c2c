use std::path::PathBuf;

use anyhow::Result;
use table_scraper::pipeline::{OutputFormat, TransformStep};
use table_scraper::{Pipeline, PipelineConfig, ScraperError, Stage};

const SUPER_BOWLS: &str = include_str!("fixtures/super_bowls.html");
const SUPER_BOWLS_COMMENTED: &str = include_str!("fixtures/super_bowls_commented.html");
const DEEP_SEARCH: &str = include_str!("fixtures/deep_search_results.xml");

fn pipeline_config(name: &str) -> Result<PipelineConfig> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("pipelines")
        .join(name);
    Ok(PipelineConfig::from_file(path)?)
}

#[test]
fn test_super_bowl_history() -> Result<()> {
    let pipeline = Pipeline::new(pipeline_config("super_bowls.toml")?)?;
    let out = pipeline.run(SUPER_BOWLS)?;

    assert_eq!(out.rows_extracted, 5);
    assert_eq!(out.records, 3);
    assert_eq!(
        String::from_utf8(out.bytes)?,
        "id,date,sb_number,winner,winner_pts,loser,loser_pts,stadium,city,state\n\
         1,2017-02-05,51,New England Patriots,34,Atlanta Falcons,28,NRG Stadium,Houston,Texas\n\
         2,2016-02-07,,Denver Broncos,24,Carolina Panthers,10,Levi's Stadium,Santa Clara,California\n\
         3,2015-02-01,49,New England Patriots,28,Seattle Seahawks,24,University of Phoenix Stadium,Glendale,Arizona\n"
    );
    Ok(())
}

#[test]
fn test_runs_are_independent() -> Result<()> {
    let pipeline = Pipeline::new(pipeline_config("super_bowls.toml")?)?;
    let first = pipeline.run(SUPER_BOWLS)?;
    let second = pipeline.run(SUPER_BOWLS)?;

    assert_eq!(first.bytes, second.bytes);
    assert_eq!(first.input_sha256, second.input_sha256);
    assert_ne!(first.run_id, second.run_id);
    Ok(())
}

#[test]
fn test_selector_miss_stops_at_extract() -> Result<()> {
    let mut config = pipeline_config("super_bowls.toml")?;
    config.selector = "table#playoffs".to_string();
    let pipeline = Pipeline::new(config)?;

    let failure = pipeline.run(SUPER_BOWLS).unwrap_err();
    assert_eq!(failure.stage, Stage::Extract);
    match failure.error {
        ScraperError::NotFound { index, found, .. } => {
            assert_eq!(index, 0);
            assert_eq!(found, 0);
        }
        other => panic!("expected NotFound, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_table_index_past_matches() -> Result<()> {
    let mut config = pipeline_config("super_bowls.toml")?;
    config.selector = "table".to_string();
    config.table_index = 1;
    let pipeline = Pipeline::new(config)?;

    let failure = pipeline.run(SUPER_BOWLS).unwrap_err();
    assert_eq!(failure.stage, Stage::Extract);
    assert!(matches!(
        failure.error,
        ScraperError::NotFound { index: 1, found: 1, .. }
    ));
    Ok(())
}

#[test]
fn test_bad_date_fails_transform() -> Result<()> {
    let page = SUPER_BOWLS.replace("Feb. 1, 2015", "TBD");
    let pipeline = Pipeline::new(pipeline_config("super_bowls.toml")?)?;

    let failure = pipeline.run(&page).unwrap_err();
    assert_eq!(failure.stage, Stage::Transform);
    match failure.error {
        ScraperError::Cast { record, column, value, .. } => {
            assert_eq!(record, 2);
            assert_eq!(column, "date");
            assert_eq!(value, "TBD");
        }
        other => panic!("expected Cast, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_result_without_separator_fails_split() -> Result<()> {
    let page = SUPER_BOWLS.replace(
        "Denver Broncos 24, Carolina Panthers 10",
        "Denver Broncos 24 Carolina Panthers 10",
    );
    let pipeline = Pipeline::new(pipeline_config("super_bowls.toml")?)?;

    let failure = pipeline.run(&page).unwrap_err();
    assert_eq!(failure.stage, Stage::Transform);
    assert!(matches!(
        failure.error,
        ScraperError::DelimiterNotFound { record: 1, .. }
    ));
    Ok(())
}

#[test]
fn test_ragged_row_fails_normalize() -> Result<()> {
    let page = SUPER_BOWLS.replace("<td>Glendale</td>", "");
    let pipeline = Pipeline::new(pipeline_config("super_bowls.toml")?)?;

    let failure = pipeline.run(&page).unwrap_err();
    assert_eq!(failure.stage, Stage::Normalize);
    assert!(matches!(
        failure.error,
        ScraperError::SchemaMismatch { row: 4, expected: 6, found: 5 }
    ));
    Ok(())
}

#[test]
fn test_commented_table_needs_unwrapping() -> Result<()> {
    let mut config = pipeline_config("super_bowls.toml")?;
    config.skip_rows = 1;

    let failure = Pipeline::new(config.clone())?
        .run(SUPER_BOWLS_COMMENTED)
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Extract);

    config.unwrap_comments = true;
    let out = Pipeline::new(config)?.run(SUPER_BOWLS_COMMENTED)?;
    assert_eq!(out.records, 1);
    assert!(String::from_utf8(out.bytes)?
        .ends_with("1,2017-02-05,51,New England Patriots,34,Atlanta Falcons,28,NRG Stadium,Houston,Texas\n"));
    Ok(())
}

#[test]
fn test_unused_column_never_reaches_output() -> Result<()> {
    let mut config = pipeline_config("super_bowls.toml")?;
    config.steps.push(TransformStep::Drop {
        column: "stadium".to_string(),
    });
    let pipeline = Pipeline::new(config)?;

    let failure = pipeline.run(SUPER_BOWLS).unwrap_err();
    assert_eq!(failure.stage, Stage::Serialize);
    assert!(matches!(
        failure.error,
        ScraperError::MissingColumn { record: 0, ref column } if column == "stadium"
    ));
    Ok(())
}

#[test]
fn test_property_search_xml() -> Result<()> {
    let pipeline = Pipeline::new(pipeline_config("deep_search_results.toml")?)?;
    let out = pipeline.run(DEEP_SEARCH)?;

    assert_eq!(out.rows_extracted, 2);
    assert_eq!(
        String::from_utf8(out.bytes)?,
        "zpid,street,zipcode,year_built,last_sold,zestimate_usd\n\
         48749425,2114 Bigelow Ave N,98109,1924,2008-11-26,1219500\n\
         48749426,2116 Bigelow Ave N,98109,1931,2012-06-04,NA\n"
    );
    Ok(())
}

#[test]
fn test_property_search_as_xml_output() -> Result<()> {
    let mut config = pipeline_config("deep_search_results.toml")?;
    config.output_format = OutputFormat::Xml;
    let out = Pipeline::new(config)?.run(DEEP_SEARCH)?;

    let text = String::from_utf8(out.bytes)?;
    assert!(text.contains("<records>"));
    assert_eq!(text.matches("<record>").count(), 2);
    assert!(text.contains("<street>2114 Bigelow Ave N</street>"));
    assert!(text.contains("<zestimate_usd>NA</zestimate_usd>"));
    Ok(())
}

#[test]
fn test_truncated_xml_fails_load() -> Result<()> {
    let truncated = &DEEP_SEARCH[..DEEP_SEARCH.len() / 2];
    let pipeline = Pipeline::new(pipeline_config("deep_search_results.toml")?)?;

    let failure = pipeline.run(truncated).unwrap_err();
    assert_eq!(failure.stage, Stage::Load);
    assert!(matches!(failure.error, ScraperError::Parse { .. }));
    Ok(())
}

#[test]
fn test_bad_xml_column_fails_before_reading() -> Result<()> {
    let mut config = pipeline_config("deep_search_results.toml")?;
    config.output_format = OutputFormat::Xml;
    config.output_columns.push("2nd sale".to_string());

    let failure = Pipeline::new(config).unwrap_err();
    assert_eq!(failure.stage, Stage::Configure);
    assert!(matches!(failure.error, ScraperError::Config(_)));
    Ok(())
}
