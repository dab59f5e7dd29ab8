//! Transfermarkt enrichment of the scraped player tables.
//!
//! Reads `{output_root}/{season}/player_stats.json`, attaches a `player_info`
//! object plus the flattened market value columns to each player row, and
//! writes `{player_info_root}/{season}_player_info.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use fbdw_adapters::transfermarkt::parse_player_info;
use fbdw_adapters::{PlayerInfo, PlayerInfoCache, Transfermarkt};
use fbdw_core::season_start_from_folder;
use fbdw_storage::{read_json_rows, write_json_dump, PageSource, SnapshotStore};
use indexmap::IndexMap;
use scraper::Html;
use serde_json::Value as JsonValue;
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;

use crate::config::EtlConfig;
use crate::sources::PoliteFetcher;
use crate::summary::{RunSummary, Stage, UnitOutcome};

pub const PLAYER_STATS_FILE: &str = "player_stats.json";
pub const PLAYER_INFO_KEY: &str = "player_info";
pub const MARKET_VALUE_KEY: &str = "market_value_€k";
pub const MARKET_VALUE_UPDATE_KEY: &str = "market_value_last_update";

/// One player row as dumped by the scraper, in column order.
pub type PlayerRow = IndexMap<String, JsonValue>;

/// Season folders under `root` that hold a player table, oldest first.
pub fn season_inputs(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = std::fs::read_dir(root).with_context(|| format!("reading {}", root.display()))?;
    let mut seasons = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", root.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let input = entry.path().join(PLAYER_STATS_FILE);
        if season_start_from_folder(&name).is_some() && input.is_file() {
            seasons.push((name, input));
        }
    }
    seasons.sort();
    Ok(seasons)
}

/// Whether a row already carries enrichment worth keeping.
pub fn has_player_info(row: &PlayerRow) -> bool {
    match row.get(PLAYER_INFO_KEY) {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::Bool(flag)) => *flag,
        Some(JsonValue::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(JsonValue::String(s)) => !s.is_empty(),
        Some(JsonValue::Array(items)) => !items.is_empty(),
        Some(JsonValue::Object(fields)) => !fields.is_empty(),
    }
}

fn player_name(row: &PlayerRow) -> Option<String> {
    row.get("Player")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

pub fn attach_player_info(row: &mut PlayerRow, info: &PlayerInfo) -> Result<(), serde_json::Error> {
    row.insert(PLAYER_INFO_KEY.to_string(), serde_json::to_value(info)?);
    row.insert(
        MARKET_VALUE_KEY.to_string(),
        info.market_value_thousands().map_or(JsonValue::Null, JsonValue::from),
    );
    row.insert(
        MARKET_VALUE_UPDATE_KEY.to_string(),
        info.market_value_last_update().map_or(JsonValue::Null, JsonValue::from),
    );
    Ok(())
}

struct Enricher<'a> {
    fetcher: PoliteFetcher<'a>,
    site: Transfermarkt,
    cache: PlayerInfoCache,
}

impl Enricher<'_> {
    /// Search, then profile. `Ok(None)` when the search lists no player.
    async fn scrape_player(&mut self, name: &str) -> Result<Option<PlayerInfo>> {
        let search_url = self.site.search_url(name);
        let search_page = self.fetcher.fetch(search_url.as_str()).await?;
        let Some(profile_url) = self.profile_link(&search_page)? else {
            return Ok(None);
        };

        let profile_page = self.fetcher.fetch(profile_url.as_str()).await?;
        let doc = Html::parse_document(&profile_page);
        Ok(parse_player_info(&doc, profile_url.as_str(), Local::now().naive_local()))
    }

    fn profile_link(&self, search_page: &str) -> Result<Option<Url>> {
        let doc = Html::parse_document(search_page);
        Ok(self.site.find_profile_link(&doc)?)
    }

    async fn lookup(&mut self, name: &str) -> Option<PlayerInfo> {
        if let Some(info) = self.cache.get(name) {
            debug!(player = name, "player info cache hit");
            return Some(info.clone());
        }
        match self.scrape_player(name).await {
            Ok(Some(info)) => {
                self.cache.insert(name, info.clone());
                Some(info)
            }
            Ok(None) => {
                warn!(player = name, "no transfermarkt profile found");
                None
            }
            Err(err) => {
                warn!(player = name, error = %err, "player lookup failed");
                None
            }
        }
    }

    async fn enrich_season(&mut self, input: &Path, output: &Path, indent: usize) -> UnitOutcome {
        let mut unit = UnitOutcome::new(output.display().to_string());
        unit.enter(Stage::Extracting);
        let mut rows: Vec<PlayerRow> = match read_json_rows(input) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(path = %input.display(), error = %err, "could not read player table");
                unit.fail(err);
                return unit;
            }
        };
        unit.rows_found = rows.len();

        unit.enter(Stage::Normalizing);
        for row in &mut rows {
            let Some(name) = player_name(row) else {
                unit.rows_skipped += 1;
                continue;
            };
            if has_player_info(row) {
                unit.rows_skipped += 1;
                continue;
            }
            match self.lookup(&name).await {
                Some(info) => match attach_player_info(row, &info) {
                    Ok(()) => unit.rows_loaded += 1,
                    Err(err) => {
                        warn!(player = %name, error = %err, "could not attach player info");
                        unit.rows_failed += 1;
                    }
                },
                None => unit.rows_failed += 1,
            }
        }

        unit.enter(Stage::Loading);
        match write_json_dump(output, &rows, indent) {
            Ok(()) => unit.done(),
            Err(err) => {
                warn!(path = %output.display(), error = %err, "could not write enriched players");
                unit.fail(err);
            }
        }
        unit
    }
}

/// Enriches every season's player table. Per-player failures are counted,
/// never fatal; the cache lives for the whole run and holds successes only.
pub async fn enrich_players(config: &EtlConfig, source: &mut dyn PageSource) -> Result<RunSummary> {
    let site = Transfermarkt::new(&config.enrich.base_url).context("transfermarkt base url")?;
    let seasons = season_inputs(&config.output_root)?;
    let snapshots = config.snapshot_root.clone().map(SnapshotStore::new);

    let mut enricher = Enricher {
        fetcher: PoliteFetcher::new(source, "transfermarkt", config.enrich.delay())
            .wait_for(config.enrich.wait_for.clone())
            .with_snapshots(snapshots),
        site,
        cache: PlayerInfoCache::new(),
    };
    let mut summary = RunSummary::start("enrich");
    info!(seasons = seasons.len(), root = %config.output_root.display(), "enriching player tables");

    for (season, input) in &seasons {
        let output = config.player_info_root.join(format!("{season}_player_info.json"));
        let unit = enricher
            .enrich_season(input, &output, config.enrich.json_indent)
            .instrument(info_span!("season", season = %season))
            .await;
        info!(
            season = %season,
            updated = unit.rows_loaded,
            skipped = unit.rows_skipped,
            errors = unit.rows_failed,
            "season enriched"
        );
        summary.push(unit);
    }

    let (updated, skipped, errors) = summary.units.iter().fold((0, 0, 0), |(u, s, e), unit| {
        (u + unit.rows_loaded, s + unit.rows_skipped, e + unit.rows_failed)
    });
    summary.note(format!("players updated={updated} skipped={skipped} errors={errors}"));
    summary.note(format!("player info cache size={}", enricher.cache.len()));
    Ok(summary.finish())
}
