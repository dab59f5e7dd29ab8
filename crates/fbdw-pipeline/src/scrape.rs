//! FBref season scraping: two pages per season, five JSON dumps per season folder.

use std::path::{Path, PathBuf};

use anyhow::Result;
use fbdw_adapters::{FbrefCompetition, SeasonTable, SeasonTables};
use fbdw_core::season_folder;
use fbdw_storage::{write_json_dump, FetchError, PageSource, SnapshotStore};
use scraper::Html;
use tracing::{info, info_span, warn, Instrument};

use crate::config::EtlConfig;
use crate::sources::PoliteFetcher;
use crate::summary::{RunSummary, Stage, UnitOutcome};

/// Scrapes every configured season into `{output_root}/{YYYY-YYYY}/{dataset}.json`.
///
/// A season whose competition page cannot be fetched is skipped whole: its five
/// datasets fail and nothing is written. A missing player page only empties
/// `player_stats.json`. The run always moves on to the next season.
pub async fn scrape_seasons(config: &EtlConfig, source: &mut dyn PageSource) -> Result<RunSummary> {
    let competition = config.scrape.competition();
    let seasons: Vec<i32> = config.scrape.seasons().collect();
    let season_delay = config.scrape.season_delay.to_delay();
    let snapshots = config.snapshot_root.clone().map(SnapshotStore::new);

    let mut fetcher = PoliteFetcher::new(source, "fbref", config.scrape.page_delay.to_delay())
        .wait_for(config.scrape.wait_for.clone())
        .with_snapshots(snapshots);
    let mut summary = RunSummary::start("scrape");

    info!(
        first = config.scrape.first_season,
        last = config.scrape.last_season,
        competition = %competition.slug,
        "scraping seasons"
    );

    for (idx, &year) in seasons.iter().enumerate() {
        let folder = season_folder(year);
        let units = scrape_season(&mut fetcher, &competition, year, config)
            .instrument(info_span!("season", season = %folder))
            .await;
        for unit in units {
            summary.push(unit);
        }
        if idx + 1 < seasons.len() {
            season_delay.wait().await;
        }
    }

    Ok(summary.finish())
}

async fn scrape_season(
    fetcher: &mut PoliteFetcher<'_>,
    competition: &FbrefCompetition,
    year: i32,
    config: &EtlConfig,
) -> Vec<UnitOutcome> {
    let season_dir = config.output_root.join(season_folder(year));
    let competition_page = match fetch_logged(fetcher, &competition.season_url(year)).await {
        Ok(html) => html,
        Err(err) => {
            warn!("competition page unavailable, skipping season");
            return SeasonTable::ALL
                .into_iter()
                .map(|table| {
                    let mut unit = UnitOutcome::new(dump_path(&season_dir, table).display().to_string());
                    unit.fail(&err);
                    unit
                })
                .collect();
        }
    };
    let player_page = match fetch_logged(fetcher, &competition.player_stats_url(year)).await {
        Ok(html) => Some(html),
        Err(_) => {
            warn!("player stats page unavailable, player_stats.json will be empty");
            None
        }
    };
    let tables = extract_tables(&competition_page, player_page.as_deref());

    SeasonTable::ALL
        .into_iter()
        .map(|table| write_table(&season_dir, table, tables.get(table), config.scrape.json_indent))
        .collect()
}

async fn fetch_logged(fetcher: &mut PoliteFetcher<'_>, url: &str) -> Result<String, FetchError> {
    let fetched = fetcher.fetch(url).await;
    match &fetched {
        Ok(html) => info!(url, bytes = html.len(), "fetched page"),
        Err(err) => warn!(url, error = %err, "page fetch failed"),
    }
    fetched
}

fn extract_tables(competition_page: &str, player_page: Option<&str>) -> SeasonTables {
    let competition_doc = Html::parse_document(competition_page);
    let player_doc = player_page.map(Html::parse_document);
    SeasonTables::extract(Some(&competition_doc), player_doc.as_ref())
}

fn dump_path(season_dir: &Path, table: SeasonTable) -> PathBuf {
    season_dir.join(format!("{}.json", table.dataset()))
}

fn write_table(season_dir: &Path, table: SeasonTable, rows: &[fbdw_core::Record], indent: usize) -> UnitOutcome {
    let path = dump_path(season_dir, table);
    let mut unit = UnitOutcome::new(path.display().to_string());
    unit.enter(Stage::Fetching);
    unit.enter(Stage::Extracting);
    unit.rows_found = rows.len();
    if rows.is_empty() {
        warn!(dataset = table.dataset(), "no rows for dataset, writing empty dump");
    }

    unit.enter(Stage::Loading);
    match write_json_dump(&path, rows, indent) {
        Ok(()) => {
            unit.rows_loaded = rows.len();
            unit.done();
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not write dump");
            unit.fail(err);
        }
    }
    unit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::fake::CannedPages;
    use fbdw_core::{Record, Value};
    use fbdw_storage::read_json_rows;

    const COMPETITION: &str = r#"<html><body>
        <table id="results2014-201591_overall"><thead><tr>
          <th>Rk</th><th>Squad</th><th>MP</th><th>Pts</th></tr></thead>
          <tbody>
            <tr><th>1</th><td>Chelsea</td><td>38</td><td>87</td></tr>
            <tr><th>2</th><td>Manchester City</td><td>38</td><td>79</td></tr>
          </tbody></table>
        </body></html>"#;

    fn config(root: &Path) -> EtlConfig {
        let mut config = EtlConfig::default();
        config.output_root = root.to_path_buf();
        config.scrape.first_season = 2014;
        config.scrape.last_season = 2014;
        config.scrape.page_delay = crate::config::DelayRange::new(0.0, 0.0);
        config.scrape.season_delay = crate::config::DelayRange::new(0.0, 0.0);
        config
    }

    #[tokio::test]
    async fn missing_player_page_writes_an_empty_player_dump() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path());
        let competition_url = config.scrape.competition().season_url(2014);
        let mut pages = CannedPages::default().with_page(competition_url, COMPETITION);

        let summary = scrape_seasons(&config, &mut pages).await.expect("scrape");
        assert_eq!(pages.requests.len(), 2);
        assert_eq!(summary.units.len(), SeasonTable::ALL.len());
        assert_eq!(summary.failed_units(), 0);

        let season = dir.path().join("2014-2015");
        let overall: Vec<Record> = read_json_rows(&season.join("league_table_overall.json")).expect("overall");
        assert_eq!(overall.len(), 2);
        assert_eq!(overall[1].get("Squad"), Some(&Value::text("Manchester City")));

        let squads: Vec<Record> = read_json_rows(&season.join("squad_stats.json")).expect("squads");
        assert!(squads.is_empty());
        assert_eq!(
            std::fs::read_to_string(season.join("player_stats.json")).expect("player dump"),
            "[]\n"
        );
    }

    #[tokio::test]
    async fn missing_competition_page_skips_the_season() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path());
        let player_url = config.scrape.competition().player_stats_url(2014);
        let mut pages = CannedPages::default().with_page(player_url, COMPETITION);

        let summary = scrape_seasons(&config, &mut pages).await.expect("scrape");
        assert_eq!(pages.requests.len(), 1);
        assert_eq!(summary.failed_units(), SeasonTable::ALL.len());
        assert!(summary.units.iter().all(|u| u.stage == Stage::Fetching));
        assert!(!dir.path().join("2014-2015").exists());
    }
}
