//! Bronze dataset catalog: one entry per staging table, each with the field
//! mapping that turns a scraped or cleaned file into that table's rows.

use std::path::Path;

use fbdw_core::{FieldMapping, FieldSpec};

use crate::config::EtlConfig;
use crate::warehouse::{LoadMode, TableRef};

pub const DATE_DMY: &str = "%d/%m/%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    Csv,
}

/// Directory a dataset's default glob is rooted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRoot {
    SeasonDumps,
    PlayerInfo,
    CleanOdds,
}

#[derive(Debug, Clone)]
pub struct DatasetSpec {
    pub name: &'static str,
    pub destination: TableRef,
    pub root: InputRoot,
    /// Glob relative to `root`.
    pub pattern: &'static str,
    pub format: InputFormat,
    pub mode: LoadMode,
    /// Prepend a `Season` column derived from each file's path.
    pub inject_season: bool,
    pub mapping: FieldMapping,
}

impl DatasetSpec {
    /// Input glob after applying any configured override.
    pub fn input_glob(&self, config: &EtlConfig) -> String {
        if let Some(input) = config.dataset_override(self.name).and_then(|o| o.input.clone()) {
            return input;
        }
        let root: &Path = match self.root {
            InputRoot::SeasonDumps => &config.output_root,
            InputRoot::PlayerInfo => &config.player_info_root,
            InputRoot::CleanOdds => &config.cleaners.odds_output_dir,
        };
        root.join(self.pattern).to_string_lossy().into_owned()
    }

    pub fn load_mode(&self, config: &EtlConfig) -> LoadMode {
        config
            .dataset_override(self.name)
            .and_then(|o| o.mode)
            .unwrap_or(self.mode)
    }

    pub fn skipped(&self, config: &EtlConfig) -> bool {
        config.dataset_override(self.name).is_some_and(|o| o.skip)
    }
}

fn season() -> FieldSpec {
    FieldSpec::text("Season")
}

fn ints<'a>(names: &'a [&'a str]) -> impl Iterator<Item = FieldSpec> + 'a {
    names.iter().map(|n| FieldSpec::integer(*n))
}

/// `Rk Squad MP W D L GF GA GD Pts Pts/MP`, reading the `_1`-suffixed
/// duplicates when `suffix` is set (the away half of the home/away table).
fn league_columns(suffix: &str) -> Vec<FieldSpec> {
    let src = |name: &str| format!("{name}{suffix}");
    let mut fields = vec![season(), FieldSpec::integer("Rk"), FieldSpec::text("Squad")];
    fields.extend(
        ["MP", "W", "D", "L", "GF", "GA"]
            .iter()
            .map(|n| FieldSpec::integer(*n).from_source(src(*n))),
    );
    fields.push(FieldSpec::text("GD").from_source(src("GD")));
    fields.push(FieldSpec::integer("Pts").from_source(src("Pts")));
    fields.push(FieldSpec::decimal("Pts_per_MP").from_source(src("Pts/MP")));
    fields
}

fn league_table_overall() -> FieldMapping {
    let mut fields = league_columns("");
    fields.extend([
        FieldSpec::integer("Attendance"),
        FieldSpec::text("Top_Team_Scorer").from_source("Top Team Scorer"),
        FieldSpec::text("Goalkeeper"),
        FieldSpec::text("Notes"),
    ]);
    FieldMapping::new(fields)
}

fn squad_stats() -> FieldMapping {
    let mut fields = vec![
        season(),
        FieldSpec::text("Squad"),
        FieldSpec::integer("Players_Count").from_source("# Pl"),
        FieldSpec::decimal("Age"),
        FieldSpec::decimal("Poss"),
    ];
    fields.extend(ints(&["MP", "Starts", "Min"]));
    fields.push(FieldSpec::decimal("Ninety_Count").from_source("90s"));
    fields.extend(ints(&["Gls", "Ast"]));
    fields.push(FieldSpec::integer("G_plus_A").from_source("G+A"));
    fields.push(FieldSpec::integer("G_minus_PK").from_source("G-PK"));
    fields.extend(ints(&["PK", "PKatt", "CrdY", "CrdR"]));
    fields.extend([
        FieldSpec::decimal("Gls_per_90").from_source("Gls_1"),
        FieldSpec::decimal("Ast_per_90").from_source("Ast_1"),
        FieldSpec::decimal("GA_per_90").from_source("G+A_1"),
        FieldSpec::decimal("G_minus_PK_90").from_source("G-PK_1"),
        FieldSpec::decimal("GA_minus_PK").from_source("G+A-PK"),
    ]);
    FieldMapping::new(fields)
}

fn player_stats() -> FieldMapping {
    let mut fields = vec![
        season(),
        FieldSpec::integer("Rk"),
        FieldSpec::text("Player"),
        FieldSpec::text("Nation"),
        FieldSpec::text("Pos"),
        FieldSpec::text("Squad"),
    ];
    fields.extend(ints(&["Age", "Born", "MP", "Starts", "Min"]));
    fields.push(FieldSpec::decimal("90s"));
    fields.extend(ints(&["Gls", "Ast", "CrdY", "CrdR"]));
    fields.extend([
        FieldSpec::decimal("Gls_1"),
        FieldSpec::decimal("Ast_1"),
        FieldSpec::integer("market_value_euro_k")
            .from_source("market_value_€k")
            .optional(),
        FieldSpec::date("market_value_last_update", DATE_DMY).optional(),
    ]);
    FieldMapping::new(fields)
}

pub const MATCH_COUNT_COLUMNS: [&str; 16] = [
    "FTHG", "FTAG", "HTHG", "HTAG", "HS", "AS", "HST", "AST", "HF", "AF", "HC", "AC", "HY", "AY",
    "HR", "AR",
];

pub const MATCH_ODDS_COLUMNS: [&str; 3] = ["B365H", "B365D", "B365A"];

fn epl_matchs() -> FieldMapping {
    let mut fields = vec![
        FieldSpec::text("Date"),
        FieldSpec::text("HomeTeam"),
        FieldSpec::text("AwayTeam"),
    ];
    fields.extend(ints(&MATCH_COUNT_COLUMNS[..2]));
    fields.push(FieldSpec::text("FTR"));
    fields.extend(ints(&MATCH_COUNT_COLUMNS[2..4]));
    fields.push(FieldSpec::text("HTR"));
    fields.extend(ints(&MATCH_COUNT_COLUMNS[4..]));
    fields.extend(MATCH_ODDS_COLUMNS.iter().map(|n| FieldSpec::decimal(*n)));
    FieldMapping::new(fields)
}

pub const DATASET_NAMES: [&str; 6] = [
    "league_table_overall",
    "league_table_home",
    "league_table_away",
    "squad_stats",
    "player_stats",
    "epl_matchs",
];

pub fn bronze_dataset(name: &str) -> Option<DatasetSpec> {
    let dump = |name: &'static str, pattern: &'static str, mapping: FieldMapping| DatasetSpec {
        name,
        destination: TableRef::bronze(format!("staging_{name}")),
        root: InputRoot::SeasonDumps,
        pattern,
        format: InputFormat::Json,
        mode: LoadMode::Append,
        inject_season: true,
        mapping,
    };

    let dataset = match name {
        "league_table_overall" => dump(
            "league_table_overall",
            "*/league_table_overall.json",
            league_table_overall(),
        ),
        "league_table_home" => dump(
            "league_table_home",
            "*/league_table_home.json",
            FieldMapping::new(league_columns("")),
        ),
        "league_table_away" => dump(
            "league_table_away",
            "*/league_table_away.json",
            FieldMapping::new(league_columns("_1")),
        ),
        "squad_stats" => dump("squad_stats", "*/squad_stats.json", squad_stats()),
        "player_stats" => DatasetSpec {
            root: InputRoot::PlayerInfo,
            ..dump("player_stats", "*_player_info.json", player_stats())
        },
        "epl_matchs" => DatasetSpec {
            root: InputRoot::CleanOdds,
            format: InputFormat::Csv,
            inject_season: false,
            ..dump("epl_matchs", "*.csv", epl_matchs())
        },
        _ => return None,
    };
    Some(dataset)
}

pub fn bronze_catalog() -> Vec<DatasetSpec> {
    DATASET_NAMES.iter().filter_map(|n| bronze_dataset(n)).collect()
}
