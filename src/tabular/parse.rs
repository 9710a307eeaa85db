use csv::ReaderBuilder;
use serde_json::{Map, Value as JsonValue};

use super::{ColumnSet, CsvRows};
use crate::error::VaultResult;

/// Parse a cell as a JSON literal (number, boolean, array, object, null, quoted string),
/// falling back to the raw text.
pub fn parse_cell(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

fn reader(text: &str) -> csv::Reader<&[u8]> {
    ReaderBuilder::new().has_headers(false).flexible(true).from_reader(text.as_bytes())
}

/// Column names of a header line.
pub fn split_header(line: &str) -> VaultResult<Vec<String>> {
    let mut rdr = reader(line);
    match rdr.records().next() {
        Some(rec) => Ok(rec?.iter().map(|s| s.trim().to_string()).collect()),
        None => Ok(Vec::new()),
    }
}

/// Parse complete CSV lines against `names`. Missing cells become null, extra cells are
/// dropped, blank lines are skipped.
pub fn parse_rows(text: &str, names: &[String], transpose: bool) -> VaultResult<CsvRows> {
    let mut rdr = reader(text);
    if transpose {
        let mut rows = Vec::new();
        for rec in rdr.records() {
            let rec = rec?;
            if is_blank(&rec) { continue; }
            let mut row = Map::new();
            for (i, name) in names.iter().enumerate() {
                row.insert(name.clone(), rec.get(i).map_or(JsonValue::Null, parse_cell));
            }
            rows.push(row);
        }
        Ok(CsvRows::Rows(rows))
    } else {
        let mut set = ColumnSet::with_names(names.to_vec());
        for rec in rdr.records() {
            let rec = rec?;
            if is_blank(&rec) { continue; }
            for (i, col) in set.columns.iter_mut().enumerate() {
                col.push(rec.get(i).map_or(JsonValue::Null, parse_cell));
            }
        }
        Ok(CsvRows::Columns(set))
    }
}

fn is_blank(rec: &csv::StringRecord) -> bool {
    rec.iter().all(|c| c.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cells_parse_as_json_or_text() {
        assert_eq!(parse_cell("42"), json!(42));
        assert_eq!(parse_cell("-1.5"), json!(-1.5));
        assert_eq!(parse_cell("true"), json!(true));
        assert_eq!(parse_cell("null"), json!(null));
        assert_eq!(parse_cell("[1,2]"), json!([1, 2]));
        assert_eq!(parse_cell("hello"), json!("hello"));
        assert_eq!(parse_cell(""), json!(""));
    }

    #[test]
    fn header_split_handles_quotes() {
        let names = split_header("timestamp,\"red, raw\",ir\r").unwrap();
        assert_eq!(names, vec!["timestamp", "red, raw", "ir"]);
    }

    #[test]
    fn rows_columns_and_transposed() {
        let names: Vec<String> = vec!["t".into(), "v".into(), "note".into()];
        let text = "1,0.5,ok\n2,0.75\n\n3,1,\"a,b\",extra\n";
        let cols = parse_rows(text, &names, false).unwrap();
        let CsvRows::Columns(set) = cols else { panic!("expected columns") };
        assert_eq!(set.get("t").unwrap(), &[json!(1), json!(2), json!(3)]);
        assert_eq!(set.get("note").unwrap(), &[json!("ok"), json!(null), json!("a,b")]);

        let rows = parse_rows(text, &names, true).unwrap();
        let CsvRows::Rows(rows) = rows else { panic!("expected rows") };
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1]["v"], json!(0.75));
    }
}
