//! CSV-backed relational sink.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use csv::StringRecord;
use ic_attribution::AttributionRow;
use ic_models::Attribution;
use ic_store::write_atomic;
use tracing::info;

use crate::error::{WorkerError, WorkerResult};
use crate::providers::ResultsSink;

/// Keeps `<dir>/<table>.csv` keyed by `(episode, time)`.
///
/// An insert replaces rows whose identity is already present and appends
/// the rest. The file is rewritten atomically, so a failed insert leaves the
/// previous table intact and retrying it cannot duplicate rows.
#[derive(Debug, Clone)]
pub struct CsvResultsSink {
    dir: PathBuf,
}

impl CsvResultsSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }
}

fn to_record(row: &AttributionRow) -> StringRecord {
    StringRecord::from(vec![
        row.episode.to_string(),
        row.time.to_string(),
        row.attribution
            .as_ref()
            .map(Attribution::as_str)
            .unwrap_or_default()
            .to_string(),
    ])
}

fn read_table(path: &Path) -> WorkerResult<Vec<StringRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    if !reader.headers()?.iter().eq(AttributionRow::COLUMNS) {
        return Err(WorkerError::sink_failed(format!(
            "{} does not have columns {:?}",
            path.display(),
            AttributionRow::COLUMNS
        )));
    }
    Ok(reader.records().collect::<Result<_, _>>()?)
}

fn upsert_rows(path: &Path, rows: &[AttributionRow]) -> WorkerResult<usize> {
    let mut table = read_table(path)?;
    let mut index: HashMap<(String, String), usize> = table
        .iter()
        .enumerate()
        .map(|(i, r)| ((r[0].to_string(), r[1].to_string()), i))
        .collect();

    for row in rows {
        let record = to_record(row);
        let key = (record[0].to_string(), record[1].to_string());
        match index.get(&key) {
            Some(&i) => table[i] = record,
            None => {
                index.insert(key, table.len());
                table.push(record);
            }
        }
    }

    write_atomic(path, |w| {
        let mut writer = csv::Writer::from_writer(w);
        writer.write_record(AttributionRow::COLUMNS)?;
        for record in &table {
            writer.write_record(record)?;
        }
        writer.flush()?;
        Ok(())
    })?;
    Ok(rows.len())
}

#[async_trait]
impl ResultsSink for CsvResultsSink {
    async fn bulk_insert(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[AttributionRow],
    ) -> WorkerResult<usize> {
        if columns != AttributionRow::COLUMNS.as_slice() {
            return Err(WorkerError::sink_failed(format!(
                "table {table} expects columns {:?}, got {columns:?}",
                AttributionRow::COLUMNS
            )));
        }

        let path = self.table_path(table);
        let rows = rows.to_vec();
        let target = path.clone();
        let inserted = tokio::task::spawn_blocking(move || upsert_rows(&target, &rows))
            .await
            .map_err(|e| WorkerError::sink_failed(format!("insert task failed: {e}")))??;

        info!(table, path = %path.display(), rows = inserted, "Inserted rows");
        Ok(inserted)
    }
}
