//! Silver layer: conformed tables built from bronze, and in-place fix-ups.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use fbdw_core::{normalize_record, season_from_date, FieldMapping, FieldSpec, LookupMapping, Record, Value};
use tracing::{info, warn};

use crate::catalog::{MATCH_COUNT_COLUMNS, MATCH_ODDS_COLUMNS};
use crate::config::SilverConfig;
use crate::reference::{ReferenceKind, ReferenceTable};
use crate::summary::{RunSummary, Stage, UnitOutcome};
use crate::warehouse::{ColumnFix, LoadMode, TableRef, Warehouse};

pub const ISO_DATE: &str = "%Y-%m-%d";

/// Tried in order. `%Y` also accepts two-digit years, so those results are
/// rejected and fall through to `%d/%m/%y`.
pub const MATCH_DATE_FORMATS: [&str; 3] = ["%d/%m/%Y", ISO_DATE, "%d/%m/%y"];

pub const MATCH_ODDS_TABLE: &str = "Match_Odds_Conformed";
pub const TEAM_DETAILS_TABLE: &str = "Team_extra_details";
pub const PLAYER_STATS_TABLE: &str = "Player_Stats_Conformed";

const MATCH_COUNT_NAMES: [&str; 16] = [
    "FullTimeHomeGoals",
    "FullTimeAwayGoals",
    "HalfTimeHomeGoals",
    "HalfTimeAwayGoals",
    "HomeShots",
    "AwayShots",
    "HomeShotsOnTarget",
    "AwayShotsOnTarget",
    "HomeFouls",
    "AwayFouls",
    "HomeCorners",
    "AwayCorners",
    "HomeYellowCards",
    "AwayYellowCards",
    "HomeRedCards",
    "AwayRedCards",
];

const MATCH_ODDS_NAMES: [&str; 3] = ["B365HomeOdds", "B365DrawOdds", "B365AwayOdds"];

fn count(idx: usize) -> FieldSpec {
    FieldSpec::integer(MATCH_COUNT_NAMES[idx]).from_source(MATCH_COUNT_COLUMNS[idx])
}

pub fn match_odds_mapping() -> FieldMapping {
    let mut fields = vec![
        FieldSpec::date("MatchDate", ISO_DATE),
        FieldSpec::text("Season"),
        FieldSpec::text("HomeTeam_Conformed"),
        FieldSpec::text("AwayTeam_Conformed"),
        count(0),
        count(1),
        FieldSpec::text("FullTimeResult").from_source("FTR"),
        count(2),
        count(3),
        FieldSpec::text("HalfTimeResult").from_source("HTR"),
    ];
    fields.extend((4..MATCH_COUNT_NAMES.len()).map(count));
    fields.extend(
        MATCH_ODDS_NAMES
            .iter()
            .zip(MATCH_ODDS_COLUMNS)
            .map(|(name, source)| FieldSpec::decimal(*name).from_source(source)),
    );
    FieldMapping::new(fields)
}

pub fn team_details_mapping() -> FieldMapping {
    FieldMapping::new(vec![
        FieldSpec::text("Season"),
        FieldSpec::text("Squad_Conformed"),
        FieldSpec::nullable_integer("Season_Attendance").from_source("Attendance"),
        FieldSpec::text("TopScorer_PlayerName"),
        FieldSpec::nullable_integer("TopScorer_Goals"),
        FieldSpec::text("Goalkeeper_PlayerName").from_source("Goalkeeper"),
        FieldSpec::text("Qualification_Notes"),
    ])
}

pub fn player_stats_mapping() -> FieldMapping {
    let ints = |names: &[&str]| names.iter().map(|n| FieldSpec::integer(*n)).collect::<Vec<_>>();
    let mut fields = vec![
        FieldSpec::text("Season"),
        FieldSpec::text("Player"),
        FieldSpec::text("Nation_Conformed"),
        FieldSpec::text("Position"),
        FieldSpec::text("Squad_Conformed"),
    ];
    fields.extend(ints(&["Age", "Born", "MP", "Starts", "Min"]));
    fields.push(FieldSpec::decimal("Ninety_Count").from_source("90s"));
    fields.extend(ints(&["Gls", "Ast", "CrdY", "CrdR"]));
    fields.extend([
        FieldSpec::decimal("Gls_per_90").from_source("Gls_1"),
        FieldSpec::decimal("Ast_per_90").from_source("Ast_1"),
        FieldSpec::nullable_integer("Market_Value_Euro_K").from_source("market_value_euro_k"),
        FieldSpec::date("Market_Value_Last_Update", ISO_DATE).from_source("market_value_last_update"),
    ]);
    FieldMapping::new(fields)
}

pub fn parse_match_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    MATCH_DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(text, format)
            .ok()
            .filter(|date| date.year() >= 1000)
    })
}

/// `"Diego Costa - 20"` → (`Diego Costa`, 20). Joint scorers keep the first name;
/// text without a `-` yields nothing.
pub fn split_top_scorer(text: &str) -> (Option<String>, Option<i64>) {
    let Some((players, goals)) = text.trim().rsplit_once('-') else {
        return (None, None);
    };
    let player = players.split(',').next().unwrap_or_default().trim();
    let player = (!player.is_empty()).then(|| player.to_string());
    (player, goals.trim().parse().ok())
}

/// `FW,MF` → `FW`.
pub fn simplify_position(position: &str) -> &str {
    position.split(',').next().unwrap_or_default().trim()
}

/// Rows ready for a silver table plus the number of source rows left out.
#[derive(Debug, Default)]
pub struct Conformed {
    pub found: usize,
    pub skipped: usize,
    pub rows: Vec<Record>,
}

pub fn conform_match_rows(rows: &[Record], teams: &LookupMapping) -> Conformed {
    let mapping = match_odds_mapping();
    let mut conformed = Conformed {
        found: rows.len(),
        ..Conformed::default()
    };
    for row in rows {
        let Some(date) = row.text("Date").and_then(|d| parse_match_date(&d)) else {
            conformed.skipped += 1;
            continue;
        };
        let mut row = row.clone();
        row.insert("MatchDate", Value::Date(date));
        row.insert("Season", Value::from(season_from_date(Some(date))));
        row.insert("HomeTeam_Conformed", teams.resolve_value(row.get("HomeTeam")));
        row.insert("AwayTeam_Conformed", teams.resolve_value(row.get("AwayTeam")));
        conformed.rows.push(normalize_record(&row, &mapping));
    }
    if conformed.skipped > 0 {
        warn!(dropped = conformed.skipped, "match rows without a parseable date dropped");
    }
    conformed
}

pub fn conform_team_rows(rows: &[Record], teams: &LookupMapping, notes: &LookupMapping) -> Conformed {
    let mapping = team_details_mapping();
    let rows = rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            let (scorer, goals) = row
                .text("Top_Team_Scorer")
                .map(|text| split_top_scorer(&text))
                .unwrap_or_default();
            row.insert("Squad_Conformed", teams.resolve_value(row.get("Squad")));
            row.insert("TopScorer_PlayerName", Value::from(scorer));
            row.insert("TopScorer_Goals", Value::from(goals));
            row.insert("Qualification_Notes", notes.resolve_value(row.get("Notes")));
            normalize_record(&row, &mapping)
        })
        .collect::<Vec<_>>();
    Conformed {
        found: rows.len(),
        skipped: 0,
        rows,
    }
}

pub fn conform_player_rows(rows: &[Record], teams: &LookupMapping, nations: &LookupMapping) -> Conformed {
    let mapping = player_stats_mapping();
    let rows = rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            let position = row.text("Pos").map(|pos| simplify_position(&pos).to_string());
            row.insert("Nation_Conformed", nations.resolve_value(row.get("Nation")));
            row.insert("Squad_Conformed", teams.resolve_value(row.get("Squad")));
            row.insert("Position", Value::from(position));
            normalize_record(&row, &mapping)
        })
        .collect::<Vec<_>>();
    Conformed {
        found: rows.len(),
        skipped: 0,
        rows,
    }
}

/// Mapping table as currently stored in the warehouse, with its fallback policy.
pub async fn stored_lookup(warehouse: &mut dyn Warehouse, kind: ReferenceKind) -> Result<LookupMapping> {
    let reference = ReferenceTable::bundled(kind).with_context(|| format!("bundled {kind:?} mapping"))?;
    let rows = warehouse
        .fetch_text(
            &reference.destination(),
            &[reference.key_column.as_str(), reference.value_column.as_str()],
        )
        .await
        .with_context(|| format!("reading {}", reference.destination().qualified()))?;
    Ok(LookupMapping::from_records(&rows, &reference.key_column, &reference.value_column)
        .with_fallback(reference.fallback()))
}

async fn read_bronze(warehouse: &mut dyn Warehouse, table: &str, columns: &[&str]) -> Result<Vec<Record>> {
    let table = TableRef::bronze(table);
    warehouse
        .fetch_text(&table, columns)
        .await
        .with_context(|| format!("reading {}", table.qualified()))
}

async fn build_matches(warehouse: &mut dyn Warehouse) -> Result<Conformed> {
    let mut columns = vec!["Date", "HomeTeam", "AwayTeam", "FTR", "HTR"];
    columns.extend(MATCH_COUNT_COLUMNS);
    columns.extend(MATCH_ODDS_COLUMNS);
    let rows = read_bronze(warehouse, "staging_epl_matchs", &columns).await?;
    let teams = stored_lookup(warehouse, ReferenceKind::Teams).await?;
    Ok(conform_match_rows(&rows, &teams))
}

async fn build_team_details(warehouse: &mut dyn Warehouse) -> Result<Conformed> {
    let columns = ["Season", "Squad", "Attendance", "Top_Team_Scorer", "Goalkeeper", "Notes"];
    let rows = read_bronze(warehouse, "staging_league_table_overall", &columns).await?;
    let teams = stored_lookup(warehouse, ReferenceKind::Teams).await?;
    let notes = stored_lookup(warehouse, ReferenceKind::Notes).await?;
    Ok(conform_team_rows(&rows, &teams, &notes))
}

async fn build_player_stats(warehouse: &mut dyn Warehouse) -> Result<Conformed> {
    let columns = [
        "Season",
        "Player",
        "Nation",
        "Pos",
        "Squad",
        "Age",
        "Born",
        "MP",
        "Starts",
        "Min",
        "90s",
        "Gls",
        "Ast",
        "CrdY",
        "CrdR",
        "Gls_1",
        "Ast_1",
        "market_value_euro_k",
        "market_value_last_update",
    ];
    let rows = read_bronze(warehouse, "staging_player_stats", &columns).await?;
    let teams = stored_lookup(warehouse, ReferenceKind::Teams).await?;
    let nations = stored_lookup(warehouse, ReferenceKind::Nations).await?;
    Ok(conform_player_rows(&rows, &teams, &nations))
}

async fn replace_conformed(
    warehouse: &mut dyn Warehouse,
    table: &str,
    mapping: &FieldMapping,
    conformed: Result<Conformed>,
) -> UnitOutcome {
    let destination = TableRef::silver(table);
    let mut unit = UnitOutcome::new(destination.qualified());
    unit.enter(Stage::Extracting);
    let conformed = match conformed {
        Ok(conformed) => conformed,
        Err(err) => {
            warn!(table = %destination, error = %format!("{err:#}"), "conform failed");
            unit.fail(format!("{err:#}"));
            return unit;
        }
    };
    unit.rows_found = conformed.found;
    unit.rows_skipped = conformed.skipped;

    unit.enter(Stage::Loading);
    match warehouse
        .load(&destination, mapping, &conformed.rows, LoadMode::Replace)
        .await
    {
        Ok(inserted) => {
            info!(table = %destination, rows = inserted, "silver table replaced");
            unit.rows_loaded = inserted as usize;
            unit.done();
        }
        Err(err) => {
            warn!(table = %destination, error = %err, "silver load rolled back");
            unit.fail(err);
        }
    }
    unit
}

pub async fn conform_matches(warehouse: &mut dyn Warehouse) -> RunSummary {
    let mut summary = RunSummary::start("conform matches");
    let conformed = build_matches(warehouse).await;
    summary.push(replace_conformed(warehouse, MATCH_ODDS_TABLE, &match_odds_mapping(), conformed).await);
    summary.finish()
}

pub async fn conform_team_details(warehouse: &mut dyn Warehouse) -> RunSummary {
    let mut summary = RunSummary::start("conform team details");
    let conformed = build_team_details(warehouse).await;
    summary.push(replace_conformed(warehouse, TEAM_DETAILS_TABLE, &team_details_mapping(), conformed).await);
    summary.finish()
}

pub async fn conform_player_stats(warehouse: &mut dyn Warehouse) -> RunSummary {
    let mut summary = RunSummary::start("conform player stats");
    let conformed = build_player_stats(warehouse).await;
    summary.push(replace_conformed(warehouse, PLAYER_STATS_TABLE, &player_stats_mapping(), conformed).await);
    summary.finish()
}

pub async fn conform_all(warehouse: &mut dyn Warehouse) -> RunSummary {
    let mut summary = RunSummary::start("conform all");
    summary.merge(conform_matches(warehouse).await);
    summary.merge(conform_team_details(warehouse).await);
    summary.merge(conform_player_stats(warehouse).await);
    summary.finish()
}

async fn apply_fixes(warehouse: &mut dyn Warehouse, table: &str, label: &str, fixes: &[ColumnFix]) -> UnitOutcome {
    let table = TableRef::silver(table);
    let mut unit = UnitOutcome::new(format!("{} {label}", table.qualified()));
    unit.rows_found = fixes.len();
    unit.enter(Stage::Loading);
    match warehouse.replace_values(&table, fixes).await {
        Ok(changed) => {
            info!(table = %table, fix = label, rows = changed, "fix-up applied");
            unit.rows_loaded = changed as usize;
            unit.done();
        }
        Err(err) => {
            warn!(table = %table, fix = label, error = %err, "fix-up rolled back");
            unit.fail(err);
        }
    }
    unit
}

/// Known corrections to already-conformed silver tables.
pub async fn run_fixups(config: &SilverConfig, warehouse: &mut dyn Warehouse) -> RunSummary {
    let mut summary = RunSummary::start("fix silver");

    let team_fixes: Vec<ColumnFix> = ["HomeTeam_Conformed", "AwayTeam_Conformed"]
        .into_iter()
        .flat_map(|column| {
            config
                .team_fixes
                .iter()
                .map(move |fix| ColumnFix::new(column, fix.from.as_str(), fix.to.as_str()))
        })
        .collect();
    summary.push(apply_fixes(warehouse, MATCH_ODDS_TABLE, "team names", &team_fixes).await);

    let nation_fixes: Vec<ColumnFix> = config
        .nation_fixes
        .iter()
        .map(|fix| ColumnFix::new("Nation_Conformed", fix.from.as_str(), fix.to.as_str()))
        .collect();
    summary.push(apply_fixes(warehouse, PLAYER_STATS_TABLE, "nation names", &nation_fixes).await);

    if config.simplify_positions {
        let table = TableRef::silver(PLAYER_STATS_TABLE);
        match warehouse.distinct_values(&table, "Position").await {
            Ok(positions) => {
                let fixes: Vec<ColumnFix> = positions
                    .iter()
                    .filter(|position| position.contains(','))
                    .map(|position| ColumnFix::new("Position", position.as_str(), simplify_position(position)))
                    .collect();
                summary.push(apply_fixes(warehouse, PLAYER_STATS_TABLE, "positions", &fixes).await);
            }
            Err(err) => {
                let mut unit = UnitOutcome::new(format!("{} positions", table.qualified()));
                unit.enter(Stage::Extracting);
                unit.fail(err);
                summary.push(unit);
            }
        }
    }

    summary.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValueFix;
    use crate::warehouse::memory::MemoryWarehouse;

    fn rec(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn teams() -> LookupMapping {
        LookupMapping::from_pairs([("Man City", "Manchester City FC"), ("Chelsea", "Chelsea FC")])
    }

    #[test]
    fn match_dates_accept_three_formats() {
        let expected = NaiveDate::from_ymd_opt(2014, 8, 16);
        assert_eq!(parse_match_date("16/08/2014"), expected);
        assert_eq!(parse_match_date("2014-08-16"), expected);
        assert_eq!(parse_match_date("16/08/14"), expected);
        assert_eq!(parse_match_date("Aug 16"), None);
    }

    #[test]
    fn top_scorer_splits_at_the_last_dash() {
        assert_eq!(
            split_top_scorer("James Ward-Prowse - 9"),
            (Some("James Ward-Prowse".to_string()), Some(9))
        );
        assert_eq!(
            split_top_scorer("Rasmus Højlund,Bruno Fernandes-10"),
            (Some("Rasmus Højlund".to_string()), Some(10))
        );
        assert_eq!(split_top_scorer("Harry Kane"), (None, None));
    }

    #[test]
    fn matches_get_dates_seasons_and_canonical_teams() {
        let rows = vec![
            rec(&[
                ("Date", "16/08/14"),
                ("HomeTeam", "Man City"),
                ("AwayTeam", "Leeds"),
                ("FTHG", "2"),
                ("FTAG", "0"),
                ("FTR", "H"),
                ("HS", ""),
                ("B365H", "1.44"),
            ]),
            rec(&[("Date", "not a date"), ("HomeTeam", "Chelsea"), ("AwayTeam", "Man City")]),
        ];
        let conformed = conform_match_rows(&rows, &teams());
        assert_eq!(conformed.found, 2);
        assert_eq!(conformed.skipped, 1);

        let row = &conformed.rows[0];
        let columns: Vec<&str> = row.field_names().collect();
        assert_eq!(columns, match_odds_mapping().columns().collect::<Vec<_>>());
        assert_eq!(row.get("MatchDate"), Some(&Value::Date(NaiveDate::from_ymd_opt(2014, 8, 16).expect("date"))));
        assert_eq!(row.get("Season"), Some(&Value::text("2014/15")));
        assert_eq!(row.get("HomeTeam_Conformed"), Some(&Value::text("Manchester City FC")));
        assert_eq!(row.get("AwayTeam_Conformed"), Some(&Value::text("Leeds")));
        assert_eq!(row.get("FullTimeHomeGoals"), Some(&Value::Int(2)));
        assert_eq!(row.get("HomeShots"), Some(&Value::Int(0)));
        assert_eq!(row.get("B365HomeOdds"), Some(&Value::Decimal(1.44)));
        assert_eq!(row.get("B365AwayOdds"), Some(&Value::Null));
    }

    #[test]
    fn team_details_map_notes_and_keep_null_attendance() {
        let notes = LookupMapping::from_pairs([("", "No Event"), ("Relegated", "Relegated")])
            .with_fallback(fbdw_core::Fallback::Constant("No Event".to_string()));
        let mut no_notes = rec(&[("Season", "2014/15"), ("Squad", "Chelsea"), ("Top_Team_Scorer", "Diego Costa - 20")]);
        no_notes.insert("Notes", Value::Null);
        no_notes.insert("Attendance", "41,546");
        let relegated = rec(&[("Season", "2014/15"), ("Squad", "QPR"), ("Notes", "Relegated"), ("Attendance", "")]);

        let conformed = conform_team_rows(&[no_notes, relegated], &teams(), &notes);
        let chelsea = &conformed.rows[0];
        assert_eq!(chelsea.get("Squad_Conformed"), Some(&Value::text("Chelsea FC")));
        assert_eq!(chelsea.get("Season_Attendance"), Some(&Value::Int(41546)));
        assert_eq!(chelsea.get("TopScorer_PlayerName"), Some(&Value::text("Diego Costa")));
        assert_eq!(chelsea.get("TopScorer_Goals"), Some(&Value::Int(20)));
        assert_eq!(chelsea.get("Qualification_Notes"), Some(&Value::text("No Event")));

        let qpr = &conformed.rows[1];
        assert_eq!(qpr.get("Squad_Conformed"), Some(&Value::text("QPR")));
        assert_eq!(qpr.get("Season_Attendance"), Some(&Value::Null));
        assert_eq!(qpr.get("TopScorer_Goals"), Some(&Value::Null));
        assert_eq!(qpr.get("Qualification_Notes"), Some(&Value::text("Relegated")));
    }

    #[test]
    fn player_rows_use_nation_names_and_first_position() {
        let nations = LookupMapping::from_pairs([("beBEL", "Belgique")]);
        let row = rec(&[
            ("Season", "2014/15"),
            ("Player", "Kevin De Bruyne"),
            ("Nation", "beBEL"),
            ("Pos", "MF,FW"),
            ("Squad", "Man City"),
            ("Min", "2048"),
            ("90s", "22.8"),
            ("market_value_last_update", "2023-12-15"),
        ]);
        let conformed = conform_player_rows(&[row], &teams(), &nations);
        let out = &conformed.rows[0];
        assert_eq!(out.get("Nation_Conformed"), Some(&Value::text("Belgique")));
        assert_eq!(out.get("Position"), Some(&Value::text("MF")));
        assert_eq!(out.get("Squad_Conformed"), Some(&Value::text("Manchester City FC")));
        assert_eq!(out.get("Ninety_Count"), Some(&Value::Decimal(22.8)));
        assert_eq!(out.get("Market_Value_Euro_K"), Some(&Value::Null));
        assert_eq!(
            out.get("Market_Value_Last_Update"),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2023, 12, 15).expect("date")))
        );
    }

    #[tokio::test]
    async fn conforming_without_bronze_fails_the_unit() {
        let mut warehouse = MemoryWarehouse::new();
        let summary = conform_matches(&mut warehouse).await;
        assert_eq!(summary.failed_units(), 1);
        assert!(summary.units[0].error.as_deref().unwrap_or_default().contains("bronze.staging_epl_matchs"));
    }

    #[tokio::test]
    async fn fixups_correct_teams_nations_and_positions() {
        let matches = TableRef::silver(MATCH_ODDS_TABLE);
        let players = TableRef::silver(PLAYER_STATS_TABLE);
        let mut warehouse = MemoryWarehouse::new()
            .with_table(
                matches.clone(),
                vec![rec(&[("HomeTeam_Conformed", "Leeds"), ("AwayTeam_Conformed", "Leeds")])],
            )
            .with_table(
                players.clone(),
                vec![
                    rec(&[("Nation_Conformed", "République dominica"), ("Position", "FW,MF")]),
                    rec(&[("Nation_Conformed", "Belgique"), ("Position", "MF")]),
                ],
            );

        let config = SilverConfig {
            team_fixes: vec![ValueFix::new("Leeds", "Leeds United FC")],
            nation_fixes: vec![ValueFix::new("République dominica", "République dominicaine")],
            simplify_positions: true,
        };
        let summary = run_fixups(&config, &mut warehouse).await;
        assert_eq!(summary.failed_units(), 0);
        assert_eq!(summary.rows_loaded(), 4);

        let fixed = &warehouse.rows(&matches)[0];
        assert_eq!(fixed.get("HomeTeam_Conformed"), Some(&Value::text("Leeds United FC")));
        assert_eq!(fixed.get("AwayTeam_Conformed"), Some(&Value::text("Leeds United FC")));
        let player = &warehouse.rows(&players)[0];
        assert_eq!(player.get("Nation_Conformed"), Some(&Value::text("République dominicaine")));
        assert_eq!(player.get("Position"), Some(&Value::text("FW")));
    }
}
