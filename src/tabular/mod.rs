//! CSV layer over vault files: header-aware range reads, streaming, bounded export,
//! a table writer and the folder registry.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

pub mod parse;
pub mod stream;
pub mod export;
pub mod writer;
pub mod registry;

pub use export::{DirectorySink, ExportSink};
pub use parse::parse_cell;
pub use writer::{to_iso_local, to_iso_with_offset};

/// Column-oriented rows: `columns[i]` holds every value of `names[i]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ColumnSet {
    pub names: Vec<String>,
    pub columns: Vec<Vec<JsonValue>>,
}

impl ColumnSet {
    pub fn with_names(names: Vec<String>) -> Self {
        let columns = vec![Vec::new(); names.len()];
        Self { names, columns }
    }

    pub fn get(&self, name: &str) -> Option<&[JsonValue]> {
        self.names.iter().position(|n| n == name).map(|i| self.columns[i].as_slice())
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// `{name: [values...]}`
    pub fn to_json(&self) -> JsonValue {
        let mut m = Map::new();
        for (n, c) in self.names.iter().zip(&self.columns) {
            m.insert(n.clone(), JsonValue::Array(c.clone()));
        }
        JsonValue::Object(m)
    }
}

/// Parsed rows in one of two shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CsvRows {
    Columns(ColumnSet),
    Rows(Vec<Map<String, JsonValue>>),
}

impl CsvRows {
    pub fn len(&self) -> usize {
        match self {
            CsvRows::Columns(c) => c.row_count(),
            CsvRows::Rows(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Result of one range read. `end` is the offset just past the last complete line
/// consumed, which is where the next line-aligned read starts.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRange {
    pub rows: CsvRows,
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
}
