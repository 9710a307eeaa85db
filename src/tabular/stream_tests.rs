use super::*;
use serde_json::json;

use crate::config::VaultConfig;
use crate::tabular::DirectorySink;

fn vault(chunk: usize) -> Vault {
    Vault::in_memory(VaultConfig { chunk_size: Some(chunk), ..VaultConfig::default() })
}

fn sample_csv(rows: usize) -> String {
    let mut s = String::from("timestamp,red,ir\n");
    for i in 0..rows {
        s.push_str(&format!("{},{},{}\n", 1_700_000_000_000u64 + i as u64 * 40, 1000 + i, 2000 + i * 2));
    }
    s
}

fn column(rows: &CsvRows, name: &str) -> Vec<serde_json::Value> {
    match rows {
        CsvRows::Columns(set) => set.get(name).unwrap().to_vec(),
        CsvRows::Rows(r) => r.iter().map(|m| m[name].clone()).collect(),
    }
}

#[tokio::test]
async fn header_reads_across_chunks() {
    let v = vault(4);
    v.write_file("/data/ppg.csv", sample_csv(3)).await.unwrap();
    assert_eq!(v.get_header("/data/ppg.csv").await.unwrap(), "timestamp,red,ir");
    assert_eq!(v.get_header("/data/missing.csv").await.unwrap(), "");
}

#[tokio::test]
async fn full_range_parses_all_rows() {
    let v = vault(64);
    v.write_file("/data/ppg.csv", sample_csv(10)).await.unwrap();
    let r = v.read_range("/data/ppg.csv", 0, None, false).await.unwrap().unwrap();
    assert_eq!(r.rows.len(), 10);
    assert_eq!(r.end, r.total_size);
    assert_eq!(column(&r.rows, "red")[3], json!(1003));

    let t = v.read_range("/data/ppg.csv", 0, None, true).await.unwrap().unwrap();
    let CsvRows::Rows(rows) = &t.rows else { panic!("expected row objects") };
    assert_eq!(rows[9]["ir"], json!(2018));
    assert!(v.read_range("/data/none.csv", 0, None, false).await.unwrap().is_none());
}

#[tokio::test]
async fn partial_lines_are_dropped_at_both_ends() {
    let v = vault(16);
    let csv = "a,b\n1,2\n3,4\n5,6\n";
    v.write_file("/d/x.csv", csv).await.unwrap();
    // [5, 12) starts inside "1,2", so only "3,4" is parsed
    let r = v.read_range("/d/x.csv", 5, Some(12), false).await.unwrap().unwrap();
    assert_eq!(column(&r.rows, "a"), vec![json!(3)]);
    assert_eq!(r.end, 12);
    // start on a boundary, end mid-line: only "1,2"
    let r = v.read_range("/d/x.csv", 4, Some(10), false).await.unwrap().unwrap();
    assert_eq!(column(&r.rows, "b"), vec![json!(2)]);
    assert_eq!(r.end, 8);
}

#[tokio::test]
async fn unterminated_last_line_counts_at_eof() {
    let v = vault(16);
    v.write_file("/d/x.csv", "a,b\n1,2\n3,4").await.unwrap();
    let r = v.read_range("/d/x.csv", 0, None, false).await.unwrap().unwrap();
    assert_eq!(column(&r.rows, "a"), vec![json!(1), json!(3)]);
    let r = v.read_range("/d/x.csv", 0, Some(10), false).await.unwrap().unwrap();
    assert_eq!(column(&r.rows, "a"), vec![json!(1)]);
}

#[tokio::test]
async fn streamed_ranges_equal_full_read() {
    let v = vault(50);
    v.write_file("/data/ppg.csv", sample_csv(200)).await.unwrap();
    let full = v.read_range("/data/ppg.csv", 0, None, false).await.unwrap().unwrap();

    let mut red = Vec::new();
    let mut last_end = 0;
    let calls = v.stream_ranges("/data/ppg.csv", 300, false, |rows, start, end, total| {
        assert_eq!(start, last_end);
        assert!(end - start <= 300);
        assert_eq!(total, full.total_size);
        red.extend(column(&rows, "red"));
        last_end = end;
    }).await.unwrap();
    assert!(calls > 10);
    assert_eq!(last_end, full.total_size);
    assert_eq!(red, column(&full.rows, "red"));
}

#[tokio::test]
async fn stream_without_header_makes_no_calls() {
    let v = vault(16);
    let mut calls = 0;
    assert_eq!(v.stream_ranges("/d/missing.csv", 64, false, |_, _, _, _| calls += 1).await.unwrap(), 0);
    v.write_file("/d/blank.csv", "\n\n").await.unwrap();
    assert_eq!(v.stream_ranges("/d/blank.csv", 64, false, |_, _, _, _| calls += 1).await.unwrap(), 0);
    assert_eq!(calls, 0);
}

#[tokio::test]
async fn stream_widens_for_long_lines() {
    let v = vault(32);
    let long = "x".repeat(100);
    let csv = format!("k,v\n1,{long}\n2,short\n");
    v.write_file("/d/long.csv", csv.as_str()).await.unwrap();
    let mut keys = Vec::new();
    v.stream_ranges("/d/long.csv", 16, true, |rows, _, _, _| keys.extend(column(&rows, "k"))).await.unwrap();
    assert_eq!(keys, vec![json!(1), json!(2)]);
}

#[tokio::test]
async fn export_pieces_are_bounded_and_complete() {
    let v = vault(128);
    let csv = sample_csv(100);
    v.write_file("/data/ppg.csv", csv.as_str()).await.unwrap();
    let mut pieces: Vec<(String, Vec<u8>)> = Vec::new();
    let n = v.export_bounded("/data/ppg.csv", 400, &mut pieces).await.unwrap();
    assert_eq!(n, pieces.len());
    assert!(n > 5);
    assert_eq!(pieces[0].0, "ppg.csv");
    assert_eq!(pieces[1].0, "ppg_1.csv");

    let header = "timestamp,red,ir\n";
    let mut body = String::new();
    for (_, bytes) in &pieces {
        assert!(bytes.len() <= 400);
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with(header));
        assert!(text.ends_with('\n'));
        body.push_str(&text[header.len()..]);
    }
    assert_eq!(format!("{header}{body}"), csv);
}

#[tokio::test]
async fn export_rejects_budget_smaller_than_a_line() {
    let v = vault(128);
    v.write_file("/data/ppg.csv", sample_csv(3)).await.unwrap();
    let mut pieces: Vec<(String, Vec<u8>)> = Vec::new();
    let err = v.export_bounded("/data/ppg.csv", 20, &mut pieces).await.unwrap_err();
    assert_eq!(err.code_str(), "unsupported_value");
    assert_eq!(v.export_bounded("/data/none.csv", 512, &mut pieces).await.unwrap(), 0);
}

#[tokio::test]
async fn directory_sink_writes_files() {
    let tmp = tempfile::tempdir().unwrap();
    let v = vault(64);
    v.write_file("/data/ppg.csv", sample_csv(20)).await.unwrap();
    let mut sink = DirectorySink::new(tmp.path().join("out")).unwrap();
    let n = v.export_bounded("/data/ppg.csv", 256, &mut sink).await.unwrap();
    assert_eq!(sink.written().len(), n);
    assert!(tmp.path().join("out").join("ppg.csv").exists());
}
