//! Bundled source-variant → canonical-name tables (teams, nations, league notes).

use std::collections::BTreeMap;

use fbdw_core::{Fallback, FieldMapping, FieldSpec, LookupMapping, Record};
use serde::Deserialize;

use crate::warehouse::TableRef;

const TEAMS_YAML: &str = include_str!("../../../reference/teams.yaml");
const NATIONS_YAML: &str = include_str!("../../../reference/nations.yaml");
const NOTES_YAML: &str = include_str!("../../../reference/notes.yaml");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Teams,
    Nations,
    Notes,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 3] = [Self::Teams, Self::Nations, Self::Notes];

    fn yaml(self) -> &'static str {
        match self {
            Self::Teams => TEAMS_YAML,
            Self::Nations => NATIONS_YAML,
            Self::Notes => NOTES_YAML,
        }
    }
}

/// One mapping table as shipped in `reference/*.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceTable {
    pub table: String,
    pub key_column: String,
    pub value_column: String,
    /// Value for unmapped and null keys; identity when absent.
    #[serde(default)]
    pub fallback_constant: Option<String>,
    pub entries: BTreeMap<String, String>,
}

impl ReferenceTable {
    pub fn bundled(kind: ReferenceKind) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(kind.yaml())
    }

    pub fn destination(&self) -> TableRef {
        TableRef::silver(self.table.clone())
    }

    pub fn fallback(&self) -> Fallback {
        self.fallback_constant
            .clone()
            .map(Fallback::Constant)
            .unwrap_or_default()
    }

    pub fn lookup(&self) -> LookupMapping {
        LookupMapping::from_pairs(self.entries.clone()).with_fallback(self.fallback())
    }

    pub fn mapping(&self) -> FieldMapping {
        FieldMapping::new(vec![
            FieldSpec::text(self.key_column.as_str()),
            FieldSpec::text(self.value_column.as_str()),
        ])
    }

    pub fn records(&self) -> Vec<Record> {
        self.lookup().to_records(&self.key_column, &self.value_column)
    }
}
