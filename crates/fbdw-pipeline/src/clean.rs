//! CSV cleaners that run before the bronze load.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use fbdw_core::{coerce_decimal, coerce_integer, Record, Value};
use fbdw_storage::{read_csv_table, write_csv_records};
use regex::Regex;
use tracing::{info, warn};

use crate::catalog::{DATE_DMY, MATCH_COUNT_COLUMNS, MATCH_ODDS_COLUMNS};
use crate::config::CleanerConfig;
use crate::summary::{RunSummary, Stage, UnitOutcome};

static LEAGUE_SEASON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}/\d{2,4}$").expect("league season regex"));

pub const SCORE_COLUMNS: [&str; 2] = ["Home_team_score", "Away_team_score"];

fn odds_numeric_columns() -> impl Iterator<Item = &'static str> {
    MATCH_COUNT_COLUMNS.into_iter().chain(MATCH_ODDS_COLUMNS)
}

/// `16/08/2014` → `2014-08-16`; anything else, two-digit years included, → null.
pub fn iso_from_dmy(raw: Option<&Value>) -> Value {
    raw.and_then(Value::as_text)
        .and_then(|text| NaiveDate::parse_from_str(text.trim(), DATE_DMY).ok())
        .filter(|date| date.year() >= 1000)
        .map(Value::Date)
        .unwrap_or(Value::Null)
}

fn missing_columns<'a>(headers: &[String], required: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    required
        .into_iter()
        .filter(|column| !headers.iter().any(|h| h == column))
        .collect()
}

pub fn clean_odds_rows(rows: &mut [Record]) {
    for row in rows {
        for column in odds_numeric_columns() {
            let value = coerce_decimal(row.get(column)).map_or(Value::Null, Value::Decimal);
            row.insert(column, value);
        }
        let date = iso_from_dmy(row.get("Date"));
        row.insert("Date", date);
    }
}

fn clean_odds_file(input: &Path, output: &Path) -> UnitOutcome {
    let mut unit = UnitOutcome::new(input.display().to_string());
    unit.enter(Stage::Extracting);
    let (headers, mut rows) = match read_csv_table(input) {
        Ok(table) => table,
        Err(err) => {
            unit.fail(err);
            return unit;
        }
    };
    unit.rows_found = rows.len();

    unit.enter(Stage::Normalizing);
    let missing = missing_columns(&headers, odds_numeric_columns().chain(["Date"]));
    if !missing.is_empty() {
        unit.fail(format!("missing columns {}", missing.join(", ")));
        return unit;
    }
    clean_odds_rows(&mut rows);

    unit.enter(Stage::Loading);
    match write_csv_records(output, &headers, &rows) {
        Ok(()) => {
            unit.rows_loaded = rows.len();
            unit.done();
        }
        Err(err) => unit.fail(err),
    }
    unit
}

/// Cleans every `*.csv` in the odds input directory into the output directory,
/// one file at a time; a bad file is reported and skipped.
pub fn clean_odds(config: &CleanerConfig) -> Result<RunSummary> {
    let mut summary = RunSummary::start("clean odds");
    let pattern = config.odds_input_dir.join("*.csv");
    let pattern = pattern.to_string_lossy();
    let files = match crate::load::input_files(&pattern) {
        Ok(files) => files,
        Err(err) => {
            warn!(pattern = %pattern, error = %err, "odds files skipped");
            let mut unit = UnitOutcome::new(pattern.into_owned());
            unit.fail(format!("{err:#}"));
            summary.push(unit);
            return Ok(summary.finish());
        }
    };
    info!(files = files.len(), dir = %config.odds_input_dir.display(), "cleaning odds files");

    for input in files {
        let Some(name) = input.file_name() else {
            continue;
        };
        let output = config.odds_output_dir.join(name);
        let unit = clean_odds_file(&input, &output);
        if let Some(err) = &unit.error {
            warn!(path = %input.display(), error = %err, "odds file skipped");
        } else {
            info!(path = %output.display(), rows = unit.rows_loaded, "odds file cleaned");
        }
        summary.push(unit);
    }
    Ok(summary.finish())
}

pub fn is_league_season(season: &str) -> bool {
    LEAGUE_SEASON.is_match(season.trim())
}

/// Keeps rows of league seasons (`2018/19`, `2018/2019`) with integer scores.
pub fn filter_match_details(rows: Vec<Record>) -> Vec<Record> {
    rows.into_iter()
        .filter(|row| row.text("Season").is_some_and(|season| is_league_season(&season)))
        .map(|mut row| {
            for column in SCORE_COLUMNS {
                let score = coerce_integer(row.get(column));
                row.insert(column, score);
            }
            row
        })
        .collect()
}

pub fn clean_match_details(config: &CleanerConfig) -> Result<RunSummary> {
    let input = &config.match_details_input;
    let output = &config.match_details_output;
    let mut summary = RunSummary::start("clean match details");
    let mut unit = UnitOutcome::new(input.display().to_string());

    unit.enter(Stage::Extracting);
    let (headers, rows) = read_csv_table(input).with_context(|| format!("reading {}", input.display()))?;
    unit.rows_found = rows.len();

    unit.enter(Stage::Normalizing);
    let missing = missing_columns(&headers, ["Season"]);
    if missing.is_empty() {
        let kept = filter_match_details(rows);
        unit.rows_skipped = unit.rows_found - kept.len();

        unit.enter(Stage::Loading);
        write_csv_records(output, &headers, &kept).with_context(|| format!("writing {}", output.display()))?;
        unit.rows_loaded = kept.len();
        unit.done();
        info!(
            read = unit.rows_found,
            kept = unit.rows_loaded,
            filtered = unit.rows_skipped,
            path = %output.display(),
            "match details cleaned"
        );
    } else {
        unit.fail("missing column Season");
    }

    summary.push(unit);
    summary.note(format!(
        "rows read={} kept={} filtered={}",
        summary.units[0].rows_found, summary.units[0].rows_loaded, summary.units[0].rows_skipped
    ));
    Ok(summary.finish())
}
