use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where a unit of work (page, file, season, player batch, table) got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Fetching,
    Extracting,
    Normalizing,
    Loading,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Normalizing => "normalizing",
            Self::Loading => "loading",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Progress of one unit of work.
///
/// A unit is terminal once it is `Done` or failed. Failed is not a [`Stage`]:
/// a unit has failed exactly when `error` is set, and `stage` then keeps the
/// stage it failed in. Neither [`enter`](Self::enter) nor [`done`](Self::done)
/// moves a failed unit again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitOutcome {
    pub unit: String,
    /// Last stage entered; for a failed unit, the stage it failed in.
    pub stage: Stage,
    pub rows_found: usize,
    pub rows_loaded: usize,
    pub rows_skipped: usize,
    pub rows_failed: usize,
    pub error: Option<String>,
}

impl UnitOutcome {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            stage: Stage::Pending,
            rows_found: 0,
            rows_loaded: 0,
            rows_skipped: 0,
            rows_failed: 0,
            error: None,
        }
    }

    /// Moves forward to `stage`. Failed and finished units stay where they are.
    pub fn enter(&mut self, stage: Stage) {
        if self.error.is_none() && self.stage != Stage::Done && stage > self.stage {
            self.stage = stage;
        }
    }

    pub fn done(&mut self) {
        self.enter(Stage::Done);
    }

    /// Marks the unit failed in its current stage. A unit that never left
    /// `Pending` is treated as having failed while fetching its input.
    pub fn fail(&mut self, error: impl fmt::Display) {
        if self.stage == Stage::Pending {
            self.stage = Stage::Fetching;
        }
        if self.error.is_none() {
            self.error = Some(error.to_string());
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "{}: failed while {} ({error})", self.unit, self.stage)?,
            None => write!(f, "{}: {}", self.unit, self.stage)?,
        }
        write!(
            f,
            " found={} loaded={} skipped={}",
            self.rows_found, self.rows_loaded, self.rows_skipped
        )?;
        if self.rows_failed > 0 {
            write!(f, " errors={}", self.rows_failed)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub job: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub units: Vec<UnitOutcome>,
    /// Job-level facts that belong to no single unit (cache size, totals).
    pub notes: Vec<String>,
}

impl RunSummary {
    pub fn start(job: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job: job.into(),
            started_at: now,
            finished_at: now,
            units: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn push(&mut self, unit: UnitOutcome) {
        self.units.push(unit);
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.units.extend(other.units);
        self.notes.extend(other.notes);
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn failed_units(&self) -> usize {
        self.units.iter().filter(|u| u.failed()).count()
    }

    pub fn rows_loaded(&self) -> usize {
        self.units.iter().map(|u| u.rows_loaded).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} finished in {}s", self.job, (self.finished_at - self.started_at).num_seconds())?;
        for unit in &self.units {
            writeln!(f, "  {unit}")?;
        }
        for note in &self.notes {
            writeln!(f, "  {note}")?;
        }
        write!(
            f,
            "units={} failed={} rows_loaded={}",
            self.units.len(),
            self.failed_units(),
            self.rows_loaded()
        )
    }
}
