use fbdw_core::{season_folder, Record};
use scraper::Html;
use tracing::info;

use crate::table::{extract_table, TableHint};

/// One FBref competition, addressed by its numeric id and URL slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FbrefCompetition {
    pub base_url: String,
    pub competition_id: u32,
    pub slug: String,
}

impl Default for FbrefCompetition {
    fn default() -> Self {
        Self {
            base_url: "https://fbref.com".to_string(),
            competition_id: 9,
            slug: "Premier-League".to_string(),
        }
    }
}

impl FbrefCompetition {
    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// League tables and squad stats.
    pub fn season_url(&self, start_year: i32) -> String {
        let season = season_folder(start_year);
        format!(
            "{}/en/comps/{}/{season}/{season}-{}-Stats",
            self.base(),
            self.competition_id,
            self.slug
        )
    }

    /// Standard player stats.
    pub fn player_stats_url(&self, start_year: i32) -> String {
        let season = season_folder(start_year);
        format!(
            "{}/en/comps/{}/{season}/stats/{season}-{}-Stats",
            self.base(),
            self.competition_id,
            self.slug
        )
    }

    pub fn page_url(&self, page: SeasonPage, start_year: i32) -> String {
        match page {
            SeasonPage::Competition => self.season_url(start_year),
            SeasonPage::PlayerStats => self.player_stats_url(start_year),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeasonPage {
    Competition,
    PlayerStats,
}

/// The five tables scraped per season, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeasonTable {
    LeagueTableOverall,
    LeagueTableHome,
    LeagueTableAway,
    SquadStats,
    PlayerStats,
}

impl SeasonTable {
    pub const ALL: [SeasonTable; 5] = [
        Self::LeagueTableOverall,
        Self::LeagueTableHome,
        Self::LeagueTableAway,
        Self::SquadStats,
        Self::PlayerStats,
    ];

    /// Dataset name; also the JSON file stem inside a season folder.
    pub fn dataset(self) -> &'static str {
        match self {
            Self::LeagueTableOverall => "league_table_overall",
            Self::LeagueTableHome => "league_table_home",
            Self::LeagueTableAway => "league_table_away",
            Self::SquadStats => "squad_stats",
            Self::PlayerStats => "player_stats",
        }
    }

    pub fn page(self) -> SeasonPage {
        match self {
            Self::PlayerStats => SeasonPage::PlayerStats,
            _ => SeasonPage::Competition,
        }
    }

    pub fn hint(self) -> TableHint {
        match self {
            Self::LeagueTableOverall => TableHint::Overall,
            Self::LeagueTableHome => TableHint::Home,
            Self::LeagueTableAway => TableHint::Away,
            Self::SquadStats => TableHint::IdContains("stats_squads_standard".to_string()),
            Self::PlayerStats => TableHint::IdContains("stats_standard".to_string()),
        }
    }
}

/// Everything extracted for one season. Tables from a page that could not be fetched are empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeasonTables {
    pub league_table_overall: Vec<Record>,
    pub league_table_home: Vec<Record>,
    pub league_table_away: Vec<Record>,
    pub squad_stats: Vec<Record>,
    pub player_stats: Vec<Record>,
}

impl SeasonTables {
    pub fn extract(competition_page: Option<&Html>, player_page: Option<&Html>) -> Self {
        let mut tables = Self::default();
        for table in SeasonTable::ALL {
            let page = match table.page() {
                SeasonPage::Competition => competition_page,
                SeasonPage::PlayerStats => player_page,
            };
            if let Some(doc) = page {
                let records = extract_table(doc, &table.hint());
                info!(dataset = table.dataset(), rows = records.len(), "parsed table");
                *tables.get_mut(table) = records;
            }
        }
        tables
    }

    pub fn get(&self, table: SeasonTable) -> &[Record] {
        match table {
            SeasonTable::LeagueTableOverall => &self.league_table_overall,
            SeasonTable::LeagueTableHome => &self.league_table_home,
            SeasonTable::LeagueTableAway => &self.league_table_away,
            SeasonTable::SquadStats => &self.squad_stats,
            SeasonTable::PlayerStats => &self.player_stats,
        }
    }

    fn get_mut(&mut self, table: SeasonTable) -> &mut Vec<Record> {
        match table {
            SeasonTable::LeagueTableOverall => &mut self.league_table_overall,
            SeasonTable::LeagueTableHome => &mut self.league_table_home,
            SeasonTable::LeagueTableAway => &mut self.league_table_away,
            SeasonTable::SquadStats => &mut self.squad_stats,
            SeasonTable::PlayerStats => &mut self.player_stats,
        }
    }

    pub fn total_rows(&self) -> usize {
        SeasonTable::ALL.iter().map(|t| self.get(*t).len()).sum()
    }
}
