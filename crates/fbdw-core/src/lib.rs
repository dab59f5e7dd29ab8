//! Core record model, field mappings and season rules for the football warehouse ETL.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const CRATE_NAME: &str = "fbdw-core";

/// Season label used when a file name carries no recognisable season.
pub const UNKNOWN_SEASON: &str = "Unknown/Season";

const ISO_DATE: &str = "%Y-%m-%d";

static SEASON_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_(\d{2})_(\d{2})\.[A-Za-z0-9]+$").expect("season suffix regex")
});
static SEASON_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{4})_").expect("season prefix regex"));
static SEASON_FOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{4})$").expect("season folder regex"));

/// Scalar cell value carried by a [`Record`].
///
/// Records are flat. Deserializing a nested JSON array or object (an enriched
/// `player_info`, say) stores it as compact JSON text, so it serializes back as
/// a string rather than the original structure. Code that must keep nested
/// values works on `serde_json::Value` rows instead.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Int(i64),
    Decimal(f64),
    Date(NaiveDate),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(Cow::Borrowed(s.as_str())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Date(d) => write!(f, "{}", d.format(ISO_DATE)),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Booleans become text and nested arrays or objects become their compact JSON text.
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Text(b.to_string()),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Decimal).unwrap_or(Self::Null),
            },
            serde_json::Value::String(s) => Self::Text(s),
            nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::Text(nested.to_string())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Decimal(d) if d.is_finite() => serializer.serialize_f64(*d),
            Self::Decimal(_) => serializer.serialize_none(),
            Self::Date(d) => serializer.collect_str(&d.format(ISO_DATE)),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

/// Ordered field-name → value mapping; one row of an extracted or loaded table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Inserts (or moves) `name` to the first position.
    pub fn insert_first(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.shift_insert(0, name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).and_then(Value::as_text)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Destination column type and the coercion rule applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    /// Thousands separators stripped; unparseable or missing values become `0`.
    Integer,
    /// Like [`ColumnType::Integer`] but unparseable values become null.
    NullableInteger,
    Decimal,
    /// Parsed with exactly one `chrono` format string.
    Date { format: String },
}

impl ColumnType {
    pub fn date(format: impl Into<String>) -> Self {
        Self::Date {
            format: format.into(),
        }
    }

    pub fn coerce(&self, raw: Option<&Value>) -> Value {
        match self {
            Self::Text => coerce_text(raw),
            Self::Integer => Value::Int(coerce_integer(raw)),
            Self::NullableInteger => parse_integer(raw).map(Value::Int).unwrap_or(Value::Null),
            Self::Decimal => coerce_decimal(raw).map(Value::Decimal).unwrap_or(Value::Null),
            Self::Date { format } => coerce_date(raw, format)
                .map(Value::Date)
                .unwrap_or(Value::Null),
        }
    }
}

/// One source → destination column rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub source: String,
    pub destination: String,
    pub column_type: ColumnType,
    pub required: bool,
}

impl FieldSpec {
    pub fn new(destination: impl Into<String>, column_type: ColumnType) -> Self {
        let destination = destination.into();
        Self {
            source: destination.clone(),
            destination,
            column_type,
            required: true,
        }
    }

    pub fn text(destination: impl Into<String>) -> Self {
        Self::new(destination, ColumnType::Text)
    }

    pub fn integer(destination: impl Into<String>) -> Self {
        Self::new(destination, ColumnType::Integer)
    }

    pub fn nullable_integer(destination: impl Into<String>) -> Self {
        Self::new(destination, ColumnType::NullableInteger)
    }

    pub fn decimal(destination: impl Into<String>) -> Self {
        Self::new(destination, ColumnType::Decimal)
    }

    pub fn date(destination: impl Into<String>, format: impl Into<String>) -> Self {
        Self::new(destination, ColumnType::date(format))
    }

    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Reads the source field, falling back to an already-renamed destination field.
    pub fn lookup<'r>(&self, record: &'r Record) -> Option<&'r Value> {
        record.get(&self.source).or_else(|| {
            if self.source == self.destination {
                None
            } else {
                record.get(&self.destination)
            }
        })
    }
}

/// Ordered destination schema; output records expose exactly these columns in this order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    fields: Vec<FieldSpec>,
}

impl FieldMapping {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.destination.as_str())
    }

    pub fn column_type(&self, destination: &str) -> Option<&ColumnType> {
        self.fields
            .iter()
            .find(|f| f.destination == destination)
            .map(|f| &f.column_type)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("required column `{column}` (for `{destination}`) is absent from the source")]
    MissingColumn { column: String, destination: String },
}

/// Renames, coerces and reorders `records` into the mapping's destination schema.
///
/// Single bad values never fail: they become `0` for integer columns and null
/// otherwise. A required column missing from every record is fatal for the set.
pub fn normalize(records: &[Record], mapping: &FieldMapping) -> Result<Vec<Record>, NormalizeError> {
    if !records.is_empty() {
        if let Some(missing) = mapping
            .fields()
            .iter()
            .filter(|f| f.required)
            .find(|f| records.iter().all(|r| f.lookup(r).is_none()))
        {
            return Err(NormalizeError::MissingColumn {
                column: missing.source.clone(),
                destination: missing.destination.clone(),
            });
        }
    }

    Ok(records
        .iter()
        .map(|record| normalize_record(record, mapping))
        .collect())
}

pub fn normalize_record(record: &Record, mapping: &FieldMapping) -> Record {
    mapping
        .fields()
        .iter()
        .map(|f| (f.destination.clone(), f.column_type.coerce(f.lookup(record))))
        .collect()
}

pub fn coerce_text(raw: Option<&Value>) -> Value {
    match raw {
        None | Some(Value::Null) => Value::Null,
        Some(Value::Text(s)) => Value::Text(s.clone()),
        Some(other) => Value::Text(other.to_string()),
    }
}

/// Integer parse with thousands-separator stripping; fractional input truncates.
pub fn parse_integer(raw: Option<&Value>) -> Option<i64> {
    match raw? {
        Value::Int(i) => Some(*i),
        Value::Decimal(d) if d.is_finite() => Some(d.trunc() as i64),
        Value::Text(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| *c != ',' && !c.is_whitespace())
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<i64>().ok().or_else(|| {
                cleaned
                    .parse::<f64>()
                    .ok()
                    .filter(|d| d.is_finite())
                    .map(|d| d.trunc() as i64)
            })
        }
        _ => None,
    }
}

pub fn coerce_integer(raw: Option<&Value>) -> i64 {
    parse_integer(raw).unwrap_or(0)
}

pub fn coerce_decimal(raw: Option<&Value>) -> Option<f64> {
    match raw? {
        Value::Decimal(d) => Some(*d).filter(|d| d.is_finite()),
        Value::Int(i) => Some(*i as f64),
        Value::Text(s) => s.trim().parse::<f64>().ok().filter(|d| d.is_finite()),
        _ => None,
    }
}

pub fn coerce_date(raw: Option<&Value>, format: &str) -> Option<NaiveDate> {
    match raw? {
        Value::Date(d) => Some(*d),
        Value::Text(s) => NaiveDate::parse_from_str(s.trim(), format).ok(),
        _ => None,
    }
}

/// `2014` → `2014/15`.
pub fn season_label(start_year: i32) -> String {
    format!("{start_year}/{:02}", (start_year + 1).rem_euclid(100))
}

/// `2014` → `2014-2015`, the folder and URL form of a season.
pub fn season_folder(start_year: i32) -> String {
    format!("{start_year}-{}", start_year + 1)
}

pub fn season_start_from_folder(name: &str) -> Option<i32> {
    let caps = SEASON_FOLDER.captures(name.trim())?;
    caps.get(1)?.as_str().parse().ok()
}

/// Season from a file name: `..._14_15.json` → `2014/15`, `2014-2015_....json` → `2014/15`.
pub fn season_from_filename(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    if let Some(caps) = SEASON_SUFFIX.captures(name) {
        return format!("20{}/{}", &caps[1], &caps[2]);
    }
    if let Some(caps) = SEASON_PREFIX.captures(name) {
        return format!("{}/{}", &caps[1], &caps[2][2..]);
    }
    UNKNOWN_SEASON.to_string()
}

/// Like [`season_from_filename`], then falls back to a `YYYY-YYYY` parent directory.
pub fn season_from_path(path: &Path) -> String {
    let from_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(season_from_filename)
        .unwrap_or_else(|| UNKNOWN_SEASON.to_string());
    if from_name != UNKNOWN_SEASON {
        return from_name;
    }

    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .and_then(season_start_from_folder)
        .map(season_label)
        .unwrap_or(from_name)
}

/// August or later starts a new season; earlier months belong to the previous one.
pub fn season_from_date(date: Option<NaiveDate>) -> Option<String> {
    let date = date?;
    let start = if date.month() >= 8 {
        date.year()
    } else {
        date.year() - 1
    };
    Some(season_label(start))
}

/// What a [`LookupMapping`] yields for a key it has no entry for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Fallback {
    /// The key itself, unchanged.
    #[default]
    Identity,
    /// A fixed value, also used for null keys.
    Constant(String),
}

/// Static source-variant → canonical-name table.
///
/// Unmapped keys go through the [`Fallback`] policy, so a lookup of a present key never fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupMapping {
    entries: BTreeMap<String, String>,
    fallback: Fallback,
}

impl LookupMapping {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            fallback: Fallback::Identity,
        }
    }

    /// Builds a mapping from rows of a two-column mapping table; rows missing either side are ignored.
    pub fn from_records(records: &[Record], key_column: &str, value_column: &str) -> Self {
        Self {
            entries: records
                .iter()
                .filter_map(|r| {
                    let key = r.text(key_column)?.into_owned();
                    let value = r.text(value_column)?.into_owned();
                    Some((key, value))
                })
                .collect(),
            fallback: Fallback::Identity,
        }
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn fallback(&self) -> &Fallback {
        &self.fallback
    }

    pub fn resolve<'a>(&'a self, key: &'a str) -> &'a str {
        match (self.entries.get(key), &self.fallback) {
            (Some(canonical), _) => canonical.as_str(),
            (None, Fallback::Identity) => key,
            (None, Fallback::Constant(value)) => value.as_str(),
        }
    }

    /// Resolves through the value's text form. A null key stays null under
    /// [`Fallback::Identity`] and takes the constant under [`Fallback::Constant`].
    pub fn resolve_value(&self, value: Option<&Value>) -> Value {
        match (value.and_then(Value::as_text), &self.fallback) {
            (Some(text), _) => Value::Text(self.resolve(&text).to_string()),
            (None, Fallback::Identity) => Value::Null,
            (None, Fallback::Constant(value)) => Value::Text(value.clone()),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_records(&self, key_column: &str, value_column: &str) -> Vec<Record> {
        self.iter()
            .map(|(k, v)| {
                let mut record = Record::new();
                record.insert(key_column, k);
                record.insert(value_column, v);
                record
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    fn league_mapping() -> FieldMapping {
        FieldMapping::new(vec![
            FieldSpec::text("Season"),
            FieldSpec::integer("Rk"),
            FieldSpec::text("Squad"),
            FieldSpec::integer("Attendance"),
            FieldSpec::decimal("Pts_per_MP").from_source("Pts/MP"),
            FieldSpec::date("Updated", "%d/%m/%Y").optional(),
        ])
    }

    #[test]
    fn suffix_file_names_map_to_season_labels() {
        for start in 0..100 {
            for end in [0, 1, 9, 15, 99] {
                let name = format!("epl_table_{start:02}_{end:02}.json");
                assert_eq!(season_from_filename(&name), format!("20{start:02}/{end:02}"));
            }
        }
        assert_eq!(season_from_filename("epl_table_14_15.json"), "2014/15");
        assert_eq!(season_from_filename("squad_stats_23_24.csv"), "2023/24");
    }

    #[test]
    fn prefix_file_names_map_to_season_labels() {
        assert_eq!(season_from_filename("2014-2015_player_info.json"), "2014/15");
        assert_eq!(season_from_filename("/data/players/2099-2100_player_info.json"), "2099/00");
    }

    #[test]
    fn unrecognised_file_names_yield_unknown_season() {
        for name in ["epl_table.json", "table_2014_15.json", "epl_14-15.json", "", "14_15"] {
            assert_eq!(season_from_filename(name), UNKNOWN_SEASON, "{name}");
        }
    }

    #[test]
    fn season_falls_back_to_parent_folder() {
        let path = Path::new("/out/2016-2017/league_table_overall.json");
        assert_eq!(season_from_path(path), "2016/17");
        let path = Path::new("/out/misc/league_table_overall.json");
        assert_eq!(season_from_path(path), UNKNOWN_SEASON);
        let path = Path::new("/out/2016-2017/epl_table_14_15.json");
        assert_eq!(season_from_path(path), "2014/15");
    }

    #[test]
    fn date_seasons_split_in_august() {
        for year in 1990..2040 {
            for month in 1..=12 {
                let date = NaiveDate::from_ymd_opt(year, month, 15).unwrap();
                let label = season_from_date(Some(date)).unwrap();
                let start = if month >= 8 { year } else { year - 1 };
                assert!(label.starts_with(&start.to_string()), "{date} -> {label}");
                assert_eq!(&label[5..], format!("{:02}", (start + 1) % 100));
            }
        }
    }

    #[test]
    fn date_season_scenarios() {
        let april = NaiveDate::from_ymd_opt(2016, 4, 10).unwrap();
        let august = NaiveDate::from_ymd_opt(2015, 8, 8).unwrap();
        let july = NaiveDate::from_ymd_opt(2015, 7, 31).unwrap();
        assert_eq!(season_from_date(Some(april)).as_deref(), Some("2015/16"));
        assert_eq!(season_from_date(Some(august)).as_deref(), Some("2015/16"));
        assert_eq!(season_from_date(Some(july)).as_deref(), Some("2014/15"));
        assert_eq!(season_from_date(None), None);
        assert_eq!(season_label(1999), "1999/00");
    }

    #[test]
    fn integers_strip_thousands_separators_and_default_to_zero() {
        assert_eq!(coerce_integer(Some(&Value::text("2,307"))), 2307);
        assert_eq!(coerce_integer(Some(&Value::text(" 40,123,456 "))), 40_123_456);
        assert_eq!(coerce_integer(Some(&Value::text("12.0"))), 12);
        assert_eq!(coerce_integer(Some(&Value::text("n/a"))), 0);
        assert_eq!(coerce_integer(Some(&Value::text(""))), 0);
        assert_eq!(coerce_integer(Some(&Value::Null)), 0);
        assert_eq!(coerce_integer(None), 0);
        assert_eq!(parse_integer(Some(&Value::text("abc"))), None);
    }

    #[test]
    fn decimals_and_dates_default_to_null() {
        assert_eq!(coerce_decimal(Some(&Value::text("2.37"))), Some(2.37));
        assert_eq!(coerce_decimal(Some(&Value::text("-"))), None);
        assert_eq!(coerce_decimal(Some(&Value::text("NaN"))), None);
        assert_eq!(
            coerce_date(Some(&Value::text("15/12/2023")), "%d/%m/%Y"),
            NaiveDate::from_ymd_opt(2023, 12, 15)
        );
        assert_eq!(coerce_date(Some(&Value::text("2023-12-15")), "%d/%m/%Y"), None);
    }

    #[test]
    fn normalizer_renames_coerces_and_orders_columns() {
        let raw = vec![rec(&[
            ("Squad", Value::text("Arsenal")),
            ("Pts/MP", Value::text("2.37")),
            ("Rk", Value::text("1")),
            ("Attendance", Value::text("59,993")),
            ("Season", Value::text("2014/15")),
            ("Extra", Value::text("dropped")),
        ])];

        let out = normalize(&raw, &league_mapping()).unwrap();
        assert_eq!(out.len(), 1);
        let names: Vec<_> = out[0].field_names().collect();
        assert_eq!(names, ["Season", "Rk", "Squad", "Attendance", "Pts_per_MP", "Updated"]);
        assert_eq!(out[0].get("Rk"), Some(&Value::Int(1)));
        assert_eq!(out[0].get("Attendance"), Some(&Value::Int(59_993)));
        assert_eq!(out[0].get("Pts_per_MP"), Some(&Value::Decimal(2.37)));
        assert_eq!(out[0].get("Updated"), Some(&Value::Null));
        assert!(!out[0].contains("Extra"));
    }

    #[test]
    fn normalizing_conformant_records_is_idempotent() {
        let raw = vec![
            rec(&[
                ("Season", Value::text("2015/16")),
                ("Rk", Value::text("x")),
                ("Squad", Value::text("Leicester City")),
                ("Attendance", Value::text("32,000")),
                ("Pts/MP", Value::text("bad")),
                ("Updated", Value::text("01/05/2016")),
            ]),
            rec(&[
                ("Season", Value::text("2015/16")),
                ("Rk", Value::text("2")),
                ("Squad", Value::Null),
            ]),
        ];
        let mapping = league_mapping();
        let once = normalize(&raw, &mapping).unwrap();
        let twice = normalize(&once, &mapping).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_required_column_is_fatal_but_empty_input_is_not() {
        let raw = vec![rec(&[("Squad", Value::text("Arsenal"))])];
        let err = normalize(&raw, &league_mapping()).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::MissingColumn {
                column: "Season".into(),
                destination: "Season".into()
            }
        );
        assert!(normalize(&[], &league_mapping()).unwrap().is_empty());
    }

    #[test]
    fn lookup_mapping_falls_back_to_the_source_value() {
        let teams = LookupMapping::from_pairs([("Man City", "Manchester City FC")]);
        assert_eq!(teams.fallback(), &Fallback::Identity);
        assert_eq!(teams.resolve("Man City"), "Manchester City FC");
        for key in ["Leeds", "", "man city", "Arsenal FC"] {
            assert_eq!(teams.resolve(key), key);
        }
        assert_eq!(teams.resolve_value(None), Value::Null);
        assert_eq!(
            teams.resolve_value(Some(&Value::text("Hull"))),
            Value::text("Hull")
        );
    }

    #[test]
    fn constant_fallback_covers_unmapped_and_null_keys() {
        let notes = LookupMapping::from_pairs([("Relegated", "Relegated"), ("", "No Event")])
            .with_fallback(Fallback::Constant("No Event".into()));
        assert_eq!(notes.resolve("Relegated"), "Relegated");
        assert_eq!(notes.resolve("Promoted via play-offs"), "No Event");
        assert_eq!(notes.resolve_value(None), Value::text("No Event"));
        assert_eq!(notes.resolve_value(Some(&Value::Null)), Value::text("No Event"));
    }

    #[test]
    fn records_read_json_in_field_order_and_flatten_nested_values() {
        let json = r#"{"Rk":"1","Squad":"Arsenal","Pts":90,"xG":1.5,"info":{"a":1},"Notes":null}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        let names: Vec<_> = record.field_names().collect();
        assert_eq!(names, ["Rk", "Squad", "Pts", "xG", "info", "Notes"]);
        assert_eq!(record.get("Pts"), Some(&Value::Int(90)));
        assert_eq!(record.get("info"), Some(&Value::text(r#"{"a":1}"#)));
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"Rk":"1","Squad":"Arsenal","Pts":90,"xG":1.5,"info":"{\"a\":1}","Notes":null}"#
        );
    }
}
