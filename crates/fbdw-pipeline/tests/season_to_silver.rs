use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use fbdw_adapters::Transfermarkt;
use fbdw_core::Value;
use fbdw_pipeline::config::DatasetOverride;
use fbdw_pipeline::{
    clean_odds, conform_all, enrich_players, load_bronze, load_mappings, run_fixups, scrape_seasons,
    EtlConfig, LoadMode, MemoryWarehouse, TableRef,
};
use fbdw_storage::{FetchError, PageSource};

const ODDS: &str = "\
Div,Date,HomeTeam,AwayTeam,FTHG,FTAG,FTR,HTHG,HTAG,HTR,HS,AS,HST,AST,HF,AF,HC,AC,HY,AY,HR,AR,B365H,B365D,B365A
E0,18/08/2014,Chelsea,Man City,1,1,D,0,1,A,12,10,5,4,11,9,6,3,2,1,0,0,2.1,3.4,3.6
E0,not a date,Chelsea,Tottenham,2,0,H,1,0,H,15,6,7,1,10,12,8,2,1,3,0,0,1.5,4.2,6.5
";

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn fixture(rel: &str) -> String {
    let path = repo_root().join("fixtures").join(rel);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

/// Serves fixture pages by URL and records what was asked for.
#[derive(Default)]
struct FixtureSite {
    pages: HashMap<String, String>,
    requests: Vec<String>,
}

impl FixtureSite {
    fn serve(&mut self, url: impl Into<String>, fixture_path: &str) {
        self.pages.insert(url.into(), fixture(fixture_path));
    }
}

#[async_trait]
impl PageSource for FixtureSite {
    fn name(&self) -> &'static str {
        "fixtures"
    }

    async fn fetch_html(&mut self, url: &str, _wait_for: Option<&str>) -> Result<String, FetchError> {
        self.requests.push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| FetchError::HttpStatus {
            status: 404,
            url: url.to_string(),
        })
    }
}

fn test_config(dir: &Path) -> EtlConfig {
    let mut config = EtlConfig::default();
    config.output_root = dir.join("fbref");
    config.player_info_root = dir.join("player_info");
    config.cleaners.odds_input_dir = dir.join("odds/raw");
    config.cleaners.odds_output_dir = dir.join("odds/clean");
    config.scrape.first_season = 2014;
    config.scrape.last_season = 2014;
    config.scrape.page_delay.min_secs = 0.0;
    config.scrape.page_delay.max_secs = 0.0;
    config.scrape.season_delay.min_secs = 0.0;
    config.scrape.season_delay.max_secs = 0.0;
    config.enrich.delay_secs = 0.0;
    config
}

fn text(value: &str) -> Option<Value> {
    Some(Value::text(value))
}

#[tokio::test]
async fn season_pages_flow_through_bronze_into_silver() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());

    let mut fbref = FixtureSite::default();
    let competition = config.scrape.competition();
    fbref.serve(competition.season_url(2014), "fbref/2014-2015_competition.html");
    fbref.serve(competition.player_stats_url(2014), "fbref/2014-2015_player_stats.html");
    let scraped = scrape_seasons(&config, &mut fbref).await.expect("scrape");
    assert_eq!(fbref.requests.len(), 2);
    assert_eq!(scraped.failed_units(), 0);
    assert!(config.output_root.join("2014-2015/player_stats.json").is_file());

    let mut transfermarkt = FixtureSite::default();
    let site = Transfermarkt::new(&config.enrich.base_url).expect("site");
    transfermarkt.serve(site.search_url("Kevin De Bruyne"), "transfermarkt/search_kevin_de_bruyne.html");
    transfermarkt.serve(
        "https://www.transfermarkt.com/kevin-de-bruyne/profil/spieler/88755",
        "transfermarkt/profile_kevin_de_bruyne.html",
    );
    let enriched = enrich_players(&config, &mut transfermarkt).await.expect("enrich");
    assert_eq!(enriched.units[0].rows_loaded, 1);
    assert_eq!(enriched.units[0].rows_failed, 2);

    std::fs::create_dir_all(&config.cleaners.odds_input_dir).expect("mkdir");
    std::fs::write(config.cleaners.odds_input_dir.join("E0_2014.csv"), ODDS).expect("odds");
    let cleaned = clean_odds(&config.cleaners).expect("clean");
    assert_eq!(cleaned.failed_units(), 0);

    let mut warehouse = MemoryWarehouse::new();
    let loaded = load_bronze(&config, &mut warehouse, None).await.expect("load");
    assert_eq!(loaded.failed_units(), 0, "{:?}", loaded.units);

    let overall = warehouse.rows(&TableRef::bronze("staging_league_table_overall"));
    assert_eq!(overall.len(), 3);
    assert_eq!(overall[0].get("Season"), text("2014/15").as_ref());
    assert_eq!(overall[0].get("Attendance"), Some(&Value::Int(41_546)));

    let away = warehouse.rows(&TableRef::bronze("staging_league_table_away"));
    assert_eq!(away[0].get("Pts"), Some(&Value::Int(38)));

    let players = warehouse.rows(&TableRef::bronze("staging_player_stats"));
    assert_eq!(players.len(), 3);
    assert_eq!(players[1].get("Season"), text("2014/15").as_ref());
    assert_eq!(players[1].get("Min"), Some(&Value::Int(2_048)));
    assert_eq!(players[1].get("market_value_euro_k"), Some(&Value::Int(45_000)));
    assert_eq!(
        players[1].get("market_value_last_update"),
        NaiveDate::from_ymd_opt(2023, 12, 15).map(Value::Date).as_ref()
    );
    assert_eq!(players[0].get("market_value_euro_k"), Some(&Value::Int(0)));
    assert_eq!(players[0].get("market_value_last_update"), Some(&Value::Null));

    let mappings = load_mappings(&mut warehouse).await.expect("mappings");
    assert_eq!(mappings.failed_units(), 0);
    let silver = conform_all(&mut warehouse).await;
    assert_eq!(silver.failed_units(), 0, "{:?}", silver.units);

    let matches = warehouse.rows(&TableRef::silver("Match_Odds_Conformed"));
    assert_eq!(matches.len(), 1, "undated match is dropped");
    assert_eq!(matches[0].get("Season"), text("2014/15").as_ref());
    assert_eq!(matches[0].get("HomeTeam_Conformed"), text("Chelsea FC").as_ref());
    assert_eq!(matches[0].get("AwayTeam_Conformed"), text("Manchester City FC").as_ref());
    assert_eq!(matches[0].get("B365DrawOdds"), Some(&Value::Decimal(3.4)));

    let teams = warehouse.rows(&TableRef::silver("Team_extra_details"));
    assert_eq!(teams.len(), 3);
    assert_eq!(teams[0].get("Squad_Conformed"), text("Chelsea FC").as_ref());
    assert_eq!(teams[0].get("TopScorer_PlayerName"), text("Diego Costa").as_ref());
    assert_eq!(teams[0].get("TopScorer_Goals"), Some(&Value::Int(20)));
    assert_eq!(
        teams[0].get("Qualification_Notes"),
        text("Champions League (via league finish)").as_ref()
    );
    assert_eq!(teams[2].get("Qualification_Notes"), text("Relegated").as_ref());

    let player_rows = warehouse.rows(&TableRef::silver("Player_Stats_Conformed"));
    let kdb = &player_rows[1];
    assert_eq!(kdb.get("Nation_Conformed"), text("Belgique").as_ref());
    assert_eq!(kdb.get("Position"), text("MF").as_ref());
    assert_eq!(kdb.get("Squad_Conformed"), text("Manchester City FC").as_ref());
    assert_eq!(kdb.get("Market_Value_Euro_K"), Some(&Value::Int(45_000)));
    assert_eq!(player_rows[2].get("Squad_Conformed"), text("Tottenham Hotspur FC").as_ref());

    let fixups = run_fixups(&config.silver, &mut warehouse).await;
    assert_eq!(fixups.failed_units(), 0, "{:?}", fixups.units);
}

#[tokio::test]
async fn replace_with_no_input_files_empties_the_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(dir.path());
    config.datasets.insert(
        "league_table_home".to_string(),
        DatasetOverride {
            mode: Some(LoadMode::Replace),
            ..DatasetOverride::default()
        },
    );

    let home = TableRef::bronze("staging_league_table_home");
    let stale: fbdw_core::Record = [("Season", Value::text("2013/14")), ("Squad", Value::text("Chelsea"))]
        .into_iter()
        .collect();
    let mut warehouse = MemoryWarehouse::new().with_table(home.clone(), vec![stale]);

    let summary = load_bronze(&config, &mut warehouse, Some("league_table_home"))
        .await
        .expect("load");
    assert_eq!(summary.units.len(), 1);
    assert!(!summary.units[0].failed());
    assert_eq!(summary.rows_loaded(), 0);
    assert_eq!(warehouse.truncations(&home), 1);
    assert!(warehouse.rows(&home).is_empty());
}
