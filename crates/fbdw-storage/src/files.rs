//! JSON dumps and CSV files exchanged between the scrape, clean and load stages.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use fbdw_core::{Record, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid csv in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl FileError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path) -> impl FnOnce(serde_json::Error) -> Self + '_ {
        move |source| Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path) -> impl FnOnce(csv::Error) -> Self + '_ {
        move |source| Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), FileError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(FileError::io(parent))
        }
        _ => Ok(()),
    }
}

/// Writes `rows` as a pretty JSON array indented by `indent` spaces; no rows gives `[]`.
pub fn write_json_dump<T: Serialize>(path: &Path, rows: &[T], indent: usize) -> Result<(), FileError> {
    ensure_parent(path)?;
    let indent = vec![b' '; indent];
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(&indent));
    rows.serialize(&mut ser).map_err(FileError::json(path))?;
    buf.push(b'\n');

    let mut file = fs::File::create(path).map_err(FileError::io(path))?;
    file.write_all(&buf).map_err(FileError::io(path))?;
    debug!(path = %path.display(), rows = rows.len(), "wrote json dump");
    Ok(())
}

/// Reads a JSON array into any deserializable row type.
pub fn read_json_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, FileError> {
    let text = fs::read_to_string(path).map_err(FileError::io(path))?;
    serde_json::from_str(&text).map_err(FileError::json(path))
}

/// Reads a JSON array of flat objects.
pub fn read_json_records(path: &Path) -> Result<Vec<Record>, FileError> {
    read_json_rows(path)
}

/// Reads a CSV file with a header row; empty cells become null.
pub fn read_csv_records(path: &Path) -> Result<Vec<Record>, FileError> {
    read_csv_table(path).map(|(_, records)| records)
}

/// Like [`read_csv_records`], also returning the header row so a file with no
/// data rows can be rewritten with its columns intact.
pub fn read_csv_table(path: &Path) -> Result<(Vec<String>, Vec<Record>), FileError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(FileError::csv(path))?;
    let headers: Vec<String> = rdr
        .headers()
        .map_err(FileError::csv(path))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row.map_err(FileError::csv(path))?;
        let record: Record = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let value = match row.get(idx).map(str::trim) {
                    Some(cell) if !cell.is_empty() => Value::text(cell),
                    _ => Value::Null,
                };
                (name.clone(), value)
            })
            .collect();
        records.push(record);
    }
    debug!(path = %path.display(), rows = records.len(), "read csv");
    Ok((headers, records))
}

/// Writes `rows` under `headers`; missing fields and nulls become empty cells.
pub fn write_csv_records(path: &Path, headers: &[String], rows: &[Record]) -> Result<(), FileError> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path).map_err(FileError::csv(path))?;
    wtr.write_record(headers).map_err(FileError::csv(path))?;
    for row in rows {
        let cells = headers
            .iter()
            .map(|h| row.get(h).map(Value::to_string).unwrap_or_default());
        wtr.write_record(cells).map_err(FileError::csv(path))?;
    }
    wtr.flush().map_err(FileError::io(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn row(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn empty_dump_is_an_empty_array() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("2014-2015").join("league_table_home.json");
        write_json_dump::<Record>(&path, &[], 2).expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read").trim(), "[]");
        assert!(read_json_records(&path).expect("read back").is_empty());
    }

    #[test]
    fn dumps_use_the_requested_indent() {
        let dir = tempdir().expect("tempdir");
        let two = dir.path().join("two.json");
        let four = dir.path().join("four.json");
        let rows = vec![row(&[("Rk", "1"), ("Squad", "Chelsea")])];

        write_json_dump(&two, &rows, 2).expect("write");
        write_json_dump(&four, &rows, 4).expect("write");

        let two = fs::read_to_string(&two).expect("read");
        let four = fs::read_to_string(&four).expect("read");
        assert!(two.contains("\n    \"Rk\": \"1\""), "{two}");
        assert!(four.contains("\n        \"Rk\": \"1\""), "{four}");
        assert_eq!(read_json_records(&dir.path().join("two.json")).expect("read"), rows);
    }

    #[test]
    fn csv_round_trip_keeps_columns_and_nulls() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("E0.csv");
        fs::write(&path, "\u{feff}Date,HomeTeam,FTHG\n16/08/2014,Arsenal,2\n,Leeds,\n").expect("seed");

        let records = read_csv_records(&path).expect("read");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Date"), Some(&Value::text("16/08/2014")));
        assert_eq!(records[1].get("FTHG"), Some(&Value::Null));

        let out = dir.path().join("out").join("E0.csv");
        let headers: Vec<String> = ["Date", "HomeTeam", "FTHG"].map(String::from).to_vec();
        write_csv_records(&out, &headers, &records).expect("write");
        assert_eq!(
            fs::read_to_string(&out).expect("read"),
            "Date,HomeTeam,FTHG\n16/08/2014,Arsenal,2\n,Leeds,\n"
        );
    }
}
