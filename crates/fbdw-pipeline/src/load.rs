//! Bronze loads: files on disk → normalized records → staging tables.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fbdw_core::{normalize, season_from_path, Record};
use fbdw_storage::{read_csv_records, read_json_records};
use tracing::{info, info_span, warn, Instrument};

use crate::catalog::{bronze_catalog, bronze_dataset, DatasetSpec, InputFormat};
use crate::config::EtlConfig;
use crate::reference::{ReferenceKind, ReferenceTable};
use crate::summary::{RunSummary, Stage, UnitOutcome};
use crate::warehouse::{LoadMode, Warehouse};

/// Input files matching a glob, in sorted order.
pub fn input_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in glob::glob(pattern).with_context(|| format!("invalid input glob `{pattern}`"))? {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(err) => warn!(pattern, error = %err, "unreadable glob entry"),
        }
    }
    files.sort();
    Ok(files)
}

/// Reads one input file and normalizes it with the dataset's mapping.
pub fn prepare_file(dataset: &DatasetSpec, path: &Path, unit: &mut UnitOutcome) -> Result<Vec<Record>> {
    unit.enter(Stage::Extracting);
    let mut records = match dataset.format {
        InputFormat::Json => read_json_records(path)?,
        InputFormat::Csv => read_csv_records(path)?,
    };
    unit.rows_found = records.len();

    if dataset.inject_season {
        let season = season_from_path(path);
        for record in &mut records {
            record.insert_first("Season", season.as_str());
        }
    }

    unit.enter(Stage::Normalizing);
    Ok(normalize(&records, &dataset.mapping)?)
}

async fn load_dataset(
    config: &EtlConfig,
    warehouse: &mut dyn Warehouse,
    dataset: &DatasetSpec,
    summary: &mut RunSummary,
) {
    let pattern = dataset.input_glob(config);
    let files = match input_files(&pattern) {
        Ok(files) => files,
        Err(err) => {
            warn!(pattern = %pattern, error = %err, "dataset skipped");
            let mut unit = UnitOutcome::new(pattern);
            unit.fail(format!("{err:#}"));
            summary.push(unit);
            return;
        }
    };
    let mode = dataset.load_mode(config);
    info!(files = files.len(), pattern = %pattern, ?mode, "loading dataset");

    let mut pending = Vec::new();
    let mut pending_units = Vec::new();
    for path in &files {
        let mut unit = UnitOutcome::new(path.display().to_string());
        let rows = match prepare_file(dataset, path, &mut unit) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(path = %path.display(), stage = %unit.stage, error = %err, "file skipped");
                unit.fail(format!("{err:#}"));
                summary.push(unit);
                continue;
            }
        };

        match mode {
            LoadMode::Append => {
                unit.enter(Stage::Loading);
                match warehouse.load(&dataset.destination, &dataset.mapping, &rows, mode).await {
                    Ok(inserted) => {
                        unit.rows_loaded = inserted as usize;
                        unit.done();
                        info!(path = %path.display(), rows = inserted, "file loaded");
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "file load rolled back");
                        unit.fail(err);
                    }
                }
                summary.push(unit);
            }
            LoadMode::Replace => {
                pending.extend(rows);
                pending_units.push(unit);
            }
        }
    }

    if mode == LoadMode::Replace {
        let mut unit = UnitOutcome::new(dataset.destination.qualified());
        unit.enter(Stage::Loading);
        unit.rows_found = pending.len();
        match warehouse.load(&dataset.destination, &dataset.mapping, &pending, mode).await {
            Ok(inserted) => {
                unit.rows_loaded = inserted as usize;
                unit.done();
                for file in &mut pending_units {
                    file.done();
                }
            }
            Err(err) => {
                warn!(table = %dataset.destination, error = %err, "replace rolled back");
                for file in &mut pending_units {
                    file.fail(&err);
                }
                unit.fail(err);
            }
        }
        summary.units.extend(pending_units);
        summary.push(unit);
    }
}

/// Loads every bronze dataset, or just `only`.
pub async fn load_bronze(
    config: &EtlConfig,
    warehouse: &mut dyn Warehouse,
    only: Option<&str>,
) -> Result<RunSummary> {
    let datasets = match only {
        Some(name) => match bronze_dataset(name) {
            Some(dataset) => vec![dataset],
            None => bail!("unknown dataset `{name}`"),
        },
        None => bronze_catalog(),
    };

    let mut summary = RunSummary::start(format!("load ({})", warehouse.name()));
    for dataset in &datasets {
        if only.is_none() && dataset.skipped(config) {
            summary.note(format!("{}: skipped by configuration", dataset.name));
            continue;
        }
        load_dataset(config, warehouse, dataset, &mut summary)
            .instrument(info_span!("dataset", name = dataset.name))
            .await;
    }
    Ok(summary.finish())
}

/// Replaces the team, nation and notes mapping tables with the bundled ones.
pub async fn load_mappings(warehouse: &mut dyn Warehouse) -> Result<RunSummary> {
    let mut summary = RunSummary::start(format!("mappings ({})", warehouse.name()));
    for kind in ReferenceKind::ALL {
        let table = ReferenceTable::bundled(kind).with_context(|| format!("bundled {kind:?} mapping"))?;
        let destination = table.destination();
        let records = table.records();

        let mut unit = UnitOutcome::new(destination.qualified());
        unit.rows_found = records.len();
        unit.enter(Stage::Loading);
        match warehouse
            .load(&destination, &table.mapping(), &records, LoadMode::Replace)
            .await
        {
            Ok(inserted) => {
                unit.rows_loaded = inserted as usize;
                unit.done();
            }
            Err(err) => {
                warn!(table = %destination, error = %err, "mapping load rolled back");
                unit.fail(err);
            }
        }
        summary.push(unit);
    }
    Ok(summary.finish())
}
