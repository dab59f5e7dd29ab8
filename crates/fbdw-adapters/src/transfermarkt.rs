//! Transfermarkt quick search and player profile header parsing.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AdapterError;

static INFO_BOX: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.data-header__info-box").expect("info box selector"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").expect("span selector"));
static PROFILE_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='/profil/spieler/']").expect("profile link selector"));
static MARKET_VALUE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a.data-header__market-value-wrapper").expect("market value selector")
});
static LAST_UPDATE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".data-header__last-update").expect("last update selector"));
static MARKET_VALUE_HISTORY: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href*='/marktwertverlauf/spieler/']").expect("value history selector")
});

static AGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d+)\)").expect("age regex"));
static CAPS_GOALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*/\s*(\d+)").expect("caps regex"));
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(bn|m|k)?").expect("amount regex")
});
static LAST_UPDATE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)last update:\s*([A-Za-z]{3,9}\.? \d{1,2}, \d{4})").expect("last update regex")
});

pub const SCRAPED_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Profile header facts for one player, keyed as in the enriched player dumps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub date_of_birth: Option<String>,
    pub age: Option<u32>,
    pub place_of_birth: Option<String>,
    pub citizenship: Option<String>,
    pub height: Option<String>,
    pub position: Option<String>,
    pub current_international: Option<String>,
    pub caps_goals: Option<String>,
    pub caps: Option<u32>,
    pub goals: Option<u32>,
    pub market_value: Option<String>,
    pub profile_url: String,
    pub scraped_date: String,
}

impl PlayerInfo {
    /// Market value in thousands of euros.
    pub fn market_value_thousands(&self) -> Option<i64> {
        self.market_value.as_deref().and_then(market_value_thousands)
    }

    /// Market value update date as `dd/mm/YYYY`.
    pub fn market_value_last_update(&self) -> Option<String> {
        self.market_value.as_deref().and_then(last_update_ddmmyyyy)
    }
}

/// `€45.00m` → 45000, `€800k` → 800, `€1.20bn` → 1200000. The figure before any `Last update` tail is used.
pub fn market_value_thousands(text: &str) -> Option<i64> {
    let head = text.split("Last update").next().unwrap_or(text);
    let caps = AMOUNT.captures(head)?;
    let amount: f64 = caps[1].replace(',', ".").parse().ok()?;
    let factor = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        Some(unit) if unit == "bn" => 1_000_000.0,
        Some(unit) if unit == "m" => 1_000.0,
        _ => 1.0,
    };
    Some((amount * factor).round() as i64)
}

/// `Last update: Dec 15, 2023` → `15/12/2023`.
pub fn last_update_ddmmyyyy(text: &str) -> Option<String> {
    let caps = LAST_UPDATE_DATE.captures(text)?;
    let raw = caps[1].replace('.', "");
    let date = NaiveDate::parse_from_str(&raw, "%b %d, %Y")
        .or_else(|_| NaiveDate::parse_from_str(&raw, "%B %d, %Y"))
        .ok()?;
    Some(date.format("%d/%m/%Y").to_string())
}

fn squash(text: impl Iterator<Item = impl AsRef<str>>) -> String {
    let joined: Vec<String> = text
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    joined.join(" ")
}

fn element_text(el: ElementRef<'_>) -> String {
    squash(el.text())
}

/// First element sibling named `tag` after the span whose own text contains `label`.
fn labelled_value(doc: &Html, label: &str, tag: &str) -> Option<String> {
    doc.select(&SPAN)
        .filter(|span| {
            span.children()
                .filter_map(|child| child.value().as_text())
                .any(|text| text.contains(label))
        })
        .find_map(|span| {
            span.next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|sib| sib.value().name() == tag)
        })
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Header market value, with its `Last update: …` tail when the page shows one.
fn market_value(doc: &Html) -> Option<String> {
    if let Some(wrapper) = doc.select(&MARKET_VALUE).next() {
        let figure: String = wrapper
            .descendants()
            .filter(|node| {
                !node
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(|el| el.value().classes().any(|c| c == "data-header__last-update"))
            })
            .filter_map(|node| node.value().as_text())
            .map(|text| text.trim())
            .collect();
        let figure = figure.replace("Market value:", "").trim().to_string();
        let update = wrapper.select(&LAST_UPDATE).next().map(element_text);
        let text = match update {
            Some(update) if !figure.is_empty() => format!("{figure} {update}"),
            Some(update) => update,
            None => figure,
        };
        if !text.is_empty() {
            return Some(text);
        }
    }
    doc.select(&MARKET_VALUE_HISTORY)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Parses the profile header. `None` when the page has no `data-header__info-box`.
pub fn parse_player_info(doc: &Html, profile_url: &str, scraped_at: NaiveDateTime) -> Option<PlayerInfo> {
    doc.select(&INFO_BOX).next()?;

    let date_of_birth = labelled_value(doc, "Date of birth", "span");
    let age = date_of_birth
        .as_deref()
        .and_then(|dob| AGE.captures(dob))
        .and_then(|caps| caps[1].parse().ok());

    let caps_goals = labelled_value(doc, "Caps/Goals", "a");
    let (caps, goals) = caps_goals
        .as_deref()
        .and_then(|text| CAPS_GOALS.captures(text))
        .map(|c| (c[1].parse().ok(), c[2].parse().ok()))
        .unwrap_or((None, None));

    Some(PlayerInfo {
        date_of_birth,
        age,
        place_of_birth: labelled_value(doc, "Place of birth", "span"),
        citizenship: labelled_value(doc, "Citizenship", "span"),
        height: labelled_value(doc, "Height", "span"),
        position: labelled_value(doc, "Position", "span"),
        current_international: labelled_value(doc, "Current international", "span"),
        caps_goals,
        caps,
        goals,
        market_value: market_value(doc),
        profile_url: profile_url.to_string(),
        scraped_date: scraped_at.format(SCRAPED_DATE_FORMAT).to_string(),
    })
}

/// Transfermarkt site addressing.
#[derive(Debug, Clone)]
pub struct Transfermarkt {
    base_url: Url,
}

impl Transfermarkt {
    pub fn new(base_url: &str) -> Result<Self, AdapterError> {
        let base_url = Url::parse(base_url).map_err(|source| AdapterError::Url {
            url: base_url.to_string(),
            source,
        })?;
        Ok(Self { base_url })
    }

    pub fn search_url(&self, player_name: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path("/schnellsuche/ergebnis/schnellsuche");
        url.query_pairs_mut().clear().append_pair("query", player_name);
        url
    }

    /// Absolute URL of the first player profile linked from a search result page.
    pub fn find_profile_link(&self, doc: &Html) -> Result<Option<Url>, AdapterError> {
        let Some(href) = doc
            .select(&PROFILE_LINK)
            .filter_map(|a| a.value().attr("href"))
            .next()
        else {
            return Ok(None);
        };
        self.base_url
            .join(href)
            .map(Some)
            .map_err(|source| AdapterError::Url {
                url: href.to_string(),
                source,
            })
    }
}

/// Player name → scraped info, for the lifetime of one enrichment run.
#[derive(Debug, Clone, Default)]
pub struct PlayerInfoCache {
    entries: HashMap<String, PlayerInfo>,
}

impl PlayerInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, player_name: &str) -> Option<&PlayerInfo> {
        self.entries.get(player_name)
    }

    pub fn insert(&mut self, player_name: impl Into<String>, info: PlayerInfo) {
        self.entries.insert(player_name.into(), info);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
