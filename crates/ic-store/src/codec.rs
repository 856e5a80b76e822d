//! Row-oriented export/import of the results table.
//!
//! The file is UTF-8 CSV with a fixed header. List-valued cells use a
//! bracketed, re-parseable form:
//!
//! - boxes: `[(top, left, bottom, right), (top, left, bottom, right)]`
//! - labels: `['alice', 'unknown']`
//!
//! An absent field is an empty cell; an empty list is `[]`. Rows are
//! written and read in store order.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::LazyLock;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use ic_models::{Attribution, BoundingBox, Entry, EntryKey, Timestamp};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

static BOX_TUPLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([^()]*)\)").unwrap());
static QUOTED_LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'([^']*)'").unwrap());

/// Columns of the results table, in export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Episode,
    Time,
    EventBoxes,
    SubjectBoxes,
    SubjectLabels,
    Attribution,
}

impl Column {
    pub const ALL: [Column; 6] = [
        Column::Episode,
        Column::Time,
        Column::EventBoxes,
        Column::SubjectBoxes,
        Column::SubjectLabels,
        Column::Attribution,
    ];

    /// Header name of the column.
    pub fn name(&self) -> &'static str {
        match self {
            Column::Episode => "episode",
            Column::Time => "time",
            Column::EventBoxes => "event_boxes",
            Column::SubjectBoxes => "subject_boxes",
            Column::SubjectLabels => "subject_labels",
            Column::Attribution => "attribution",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// Rows read back from a results file.
#[derive(Debug, Clone, PartialEq)]
pub struct Imported {
    /// Entries in file order.
    pub entries: Vec<Entry>,
    /// Whether the header matched the fixed schema. When false, `entries`
    /// is empty and the file should be reset.
    pub header_valid: bool,
    /// Rows that could not be parsed and were dropped.
    pub skipped_rows: usize,
}

/// Render a list of boxes as `[(t, l, b, r), ...]`.
pub fn render_boxes(boxes: &[BoundingBox]) -> String {
    let tuples: Vec<String> = boxes
        .iter()
        .map(|b| format!("({}, {}, {}, {})", b.top, b.left, b.bottom, b.right))
        .collect();
    format!("[{}]", tuples.join(", "))
}

/// Render a list of labels as `['a', 'b']`.
pub fn render_labels(labels: &[String]) -> String {
    let quoted: Vec<String> = labels.iter().map(|l| format!("'{}'", l)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Parse a box-list cell. An empty cell is an absent field.
pub fn parse_boxes(column: Column, cell: &str) -> StoreResult<Option<Vec<BoundingBox>>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }

    let mut boxes = Vec::new();
    for caps in BOX_TUPLE.captures_iter(cell) {
        let coords = caps[1]
            .split(',')
            .map(|s| s.trim().parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|e| StoreError::malformed_cell(column.name(), cell, e.to_string()))?;
        boxes.push(BoundingBox::from_slice(&coords)?);
    }

    ensure_only_list_syntax(column, cell, &BOX_TUPLE)?;
    Ok(Some(boxes))
}

/// Parse a label-list cell. An empty cell is an absent field.
pub fn parse_labels(column: Column, cell: &str) -> StoreResult<Option<Vec<String>>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }

    let labels = QUOTED_LABEL
        .captures_iter(cell)
        .map(|caps| caps[1].to_string())
        .collect();

    ensure_only_list_syntax(column, cell, &QUOTED_LABEL)?;
    Ok(Some(labels))
}

/// Anything left after removing the list items must be brackets,
/// separators or whitespace.
fn ensure_only_list_syntax(column: Column, cell: &str, items: &Regex) -> StoreResult<()> {
    let residue = items.replace_all(cell, "");
    if let Some(c) = residue
        .chars()
        .find(|c| !matches!(c, '[' | ']' | ',') && !c.is_whitespace())
    {
        return Err(StoreError::malformed_cell(
            column.name(),
            cell,
            format!("unexpected character '{}'", c),
        ));
    }
    Ok(())
}

/// Reject labels the label-list and attribution cells cannot represent.
///
/// An empty label would read back as "not attributed", and a label spelled
/// like a sentinel would read back as that sentinel.
pub fn check_label(label: &str) -> StoreResult<()> {
    if label.contains('\'') {
        return Err(StoreError::invalid_label(label, "labels cannot contain single quotes"));
    }
    if label.is_empty() {
        return Err(StoreError::invalid_label(label, "labels cannot be empty"));
    }
    if label == Attribution::NO_SUBJECT_FOUND || label == Attribution::NO_EVENT_FOUND {
        return Err(StoreError::invalid_label(label, "label is reserved"));
    }
    Ok(())
}

/// Parse the identity cells of a row.
pub fn parse_key(episode: &str, time: &str) -> StoreResult<EntryKey> {
    let episode_cell = episode.trim();
    if episode_cell.is_empty() {
        return Err(StoreError::invalid_key("missing episode"));
    }
    let episode = episode_cell
        .parse::<u32>()
        .map_err(|_| StoreError::invalid_key(format!("episode '{}' is not a number", episode_cell)))?;

    if time.trim().is_empty() {
        return Err(StoreError::invalid_key("missing time"));
    }
    let time = time
        .parse::<Timestamp>()
        .map_err(|e| StoreError::invalid_key(e.to_string()))?;

    Ok(EntryKey::new(episode, time))
}

/// Render one cell of an entry.
pub fn render_cell(entry: &Entry, column: Column) -> String {
    match column {
        Column::Episode => entry.key.episode.to_string(),
        Column::Time => entry.key.time.to_string(),
        Column::EventBoxes => entry.event_boxes.as_deref().map(render_boxes).unwrap_or_default(),
        Column::SubjectBoxes => entry
            .subject_boxes
            .as_deref()
            .map(render_boxes)
            .unwrap_or_default(),
        Column::SubjectLabels => entry
            .subject_labels
            .as_deref()
            .map(render_labels)
            .unwrap_or_default(),
        Column::Attribution => entry
            .attribution
            .as_ref()
            .map(|a| a.as_str().to_string())
            .unwrap_or_default(),
    }
}

/// Write the header followed by one row per entry.
pub fn export<'a, W, I>(entries: I, sink: W) -> StoreResult<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a Entry>,
{
    let mut writer = WriterBuilder::new().from_writer(sink);
    writer.write_record(Column::ALL.iter().map(Column::name))?;

    let mut rows = 0;
    for entry in entries {
        writer.write_record(Column::ALL.iter().map(|c| render_cell(entry, *c)))?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

/// Read a results file.
///
/// A header whose column set differs from the fixed schema is reported via
/// [`Imported::header_valid`] rather than as an error. Unparseable rows are
/// logged and dropped. Repeated identities are merged field by field, later
/// rows winning.
pub fn import<R: Read>(source: R) -> StoreResult<Imported> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(source);

    let headers = reader.headers()?.clone();
    let Some(positions) = header_positions(&headers) else {
        warn!(
            header = ?headers.iter().collect::<Vec<_>>(),
            "Results file header does not match the expected columns"
        );
        return Ok(Imported {
            entries: Vec::new(),
            header_valid: false,
            skipped_rows: 0,
        });
    };

    let mut entries: Vec<Entry> = Vec::new();
    let mut index: HashMap<EntryKey, usize> = HashMap::new();
    let mut skipped_rows = 0;

    for (row, record) in reader.records().enumerate() {
        // header is line 1
        let line = row + 2;
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                warn!(line, error = %e, "Skipping unreadable row");
                skipped_rows += 1;
                continue;
            }
        };

        let entry = match parse_row(&record, &positions) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(line, error = %e, "Skipping malformed row");
                skipped_rows += 1;
                continue;
            }
        };

        match index.get(&entry.key) {
            Some(&i) => {
                warn!(line, key = %entry.key, "Duplicate entry in results file, merging");
                let merged = merge_rows(&entries[i], entry);
                match merged.check_subjects() {
                    Ok(()) => entries[i] = merged,
                    Err(e) => {
                        warn!(line, error = %e, "Skipping conflicting duplicate row");
                        skipped_rows += 1;
                    }
                }
            }
            None => {
                index.insert(entry.key, entries.len());
                entries.push(entry);
            }
        }
    }

    debug!(rows = entries.len(), skipped_rows, "Imported results file");
    Ok(Imported {
        entries,
        header_valid: true,
        skipped_rows,
    })
}

/// Map each column to its position, or `None` if the header's column set
/// is not exactly the schema's.
fn header_positions(headers: &StringRecord) -> Option<HashMap<Column, usize>> {
    if headers.len() != Column::ALL.len() {
        return None;
    }
    let mut positions = HashMap::new();
    for (i, name) in headers.iter().enumerate() {
        // spreadsheet tools prepend a byte order mark
        let name = if i == 0 { name.trim_start_matches('\u{feff}') } else { name };
        let column = Column::from_name(name.trim())?;
        if positions.insert(column, i).is_some() {
            return None;
        }
    }
    Some(positions)
}

fn parse_row(record: &StringRecord, positions: &HashMap<Column, usize>) -> StoreResult<Entry> {
    let cell = |column: Column| record.get(positions[&column]).unwrap_or("");

    let key = parse_key(cell(Column::Episode), cell(Column::Time))?;
    let entry = Entry {
        key,
        event_boxes: parse_boxes(Column::EventBoxes, cell(Column::EventBoxes))?,
        subject_boxes: parse_boxes(Column::SubjectBoxes, cell(Column::SubjectBoxes))?,
        subject_labels: parse_labels(Column::SubjectLabels, cell(Column::SubjectLabels))?,
        attribution: Attribution::from_cell(cell(Column::Attribution)),
    };
    entry.check_subjects()?;
    Ok(entry)
}

fn merge_rows(earlier: &Entry, later: Entry) -> Entry {
    Entry {
        key: earlier.key,
        event_boxes: later.event_boxes.or_else(|| earlier.event_boxes.clone()),
        subject_boxes: later.subject_boxes.or_else(|| earlier.subject_boxes.clone()),
        subject_labels: later.subject_labels.or_else(|| earlier.subject_labels.clone()),
        attribution: later.attribution.or_else(|| earlier.attribution.clone()),
    }
}
