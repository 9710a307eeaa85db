use super::*;
use std::ops::ControlFlow;

use crate::storage::Collection;

fn vault() -> Vault {
    Vault::in_memory(VaultConfig::default())
}

fn chunk_keys(v: &Vault, path: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    if v.store().contains(Collection::Files, path).unwrap() { keys.push(path.to_string()); }
    keys.extend(v.store().scan_prefix(Collection::Files, &Keys::chunk_prefix(path)).unwrap().into_iter().map(|(k, _)| k));
    keys
}

#[tokio::test]
async fn text_roundtrip_below_and_above_chunk_size() {
    let v = vault();
    v.write_file_with("data/small.txt", "hello", Some(16)).await.unwrap();
    assert_eq!(v.read_file("/data/small.txt").await.unwrap(), Some(Value::from("hello")));
    assert_eq!(chunk_keys(&v, "/data/small.txt").len(), 1);

    let big = "0123456789".repeat(5);
    v.write_file_with("/data/big.txt", big.as_str(), Some(16)).await.unwrap();
    assert_eq!(chunk_keys(&v, "/data/big.txt").len(), 4);
    assert_eq!(v.read_file("/data/big.txt").await.unwrap(), Some(Value::Text(big)));
    assert_eq!(v.get_file_size("/data/big.txt").await.unwrap(), 50);
}

#[tokio::test]
async fn binary_and_typed_roundtrip_across_chunks() {
    let v = vault();
    let blob: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    v.write_file_with("/media/b.bin", Value::binary(blob.clone(), Some("application/octet-stream")), Some(64)).await.unwrap();
    assert_eq!(
        v.read_file("/media/b.bin").await.unwrap(),
        Some(Value::binary(blob, Some("application/octet-stream")))
    );

    let samples: Vec<f64> = (0..100).map(|i| i as f64 * 0.5).collect();
    // 800 bytes over 60-byte chunks: element boundaries do not line up with chunk boundaries
    v.write_file_with("/ppg/raw", TypedArray::from(samples.clone()), Some(60)).await.unwrap();
    assert_eq!(v.read_file("/ppg/raw").await.unwrap(), Some(Value::Typed(TypedArray::F64(samples))));
}

#[tokio::test]
async fn unchunked_and_empty_writes() {
    let v = vault();
    v.write_file_with("/d/one", "x".repeat(1000), None).await.unwrap();
    assert_eq!(chunk_keys(&v, "/d/one").len(), 1);
    v.write_file_with("/d/empty", "", Some(8)).await.unwrap();
    assert!(v.exists("/d/empty").await.unwrap());
    assert_eq!(v.read_file("/d/empty").await.unwrap(), Some(Value::from("")));
    assert_eq!(v.get_file_size("/d/empty").await.unwrap(), 0);
}

#[tokio::test]
async fn rewrite_with_shorter_value_drops_stale_chunks() {
    let v = vault();
    v.write_file_with("/d/f", "a".repeat(100), Some(10)).await.unwrap();
    assert_eq!(chunk_keys(&v, "/d/f").len(), 10);
    v.write_file_with("/d/f", "short", Some(10)).await.unwrap();
    assert_eq!(chunk_keys(&v, "/d/f"), vec!["/d/f".to_string()]);
    let listing = v.list_directory("/d").await.unwrap();
    assert_eq!(listing.len(), 1);
    let dir = v.store().get(Collection::Directories, "/d").unwrap().unwrap();
    assert_eq!(DirectoryRecord::decode(&dir).unwrap().files.len(), 1);
}

#[tokio::test]
async fn append_merges_then_spills() {
    let v = vault();
    let p = "/data/log.txt";
    // absent file: append acts as write
    v.append_file_with(p, "abc", Some(8)).await.unwrap();
    assert_eq!(chunk_keys(&v, p).len(), 1);
    // fits in chunk 0
    v.append_file_with(p, "def", Some(8)).await.unwrap();
    assert_eq!(chunk_keys(&v, p).len(), 1);
    // 6 + 13 = 19 bytes: fill chunk 0 to 8, then 8 + 3
    v.append_file_with(p, "ghijklmnopqrs", Some(8)).await.unwrap();
    let keys = chunk_keys(&v, p);
    assert_eq!(keys, vec![p.to_string(), Keys::chunk(p, 1), Keys::chunk(p, 2)]);
    assert_eq!(v.read_bytes(p, 0, Some(8)).await.unwrap(), b"abcdefgh");
    assert_eq!(v.read_file(p).await.unwrap(), Some(Value::from("abcdefghijklmnopqrs")));
    assert_eq!(v.list_filenames("/data").await.unwrap(), vec![p.to_string()]);
}

#[tokio::test]
async fn append_keeps_chunks_bounded_and_ordered_past_nine() {
    let v = vault();
    let p = "/data/stream.csv";
    let mut expected = String::new();
    for i in 0..40 {
        let line = format!("{i},{}\n", i * 3);
        expected.push_str(&line);
        v.append_file_with(p, line.as_str(), Some(7)).await.unwrap();
    }
    let keys = chunk_keys(&v, p);
    assert!(keys.len() > 10);
    let mut sizes = Vec::new();
    let n = v.process_chunks_in_order(p, |_, payload| { sizes.push(payload.len()); ControlFlow::Continue(()) }).await.unwrap();
    assert_eq!(n, keys.len());
    assert!(sizes.iter().all(|&s| s <= 7));
    assert!(sizes[..sizes.len() - 1].iter().all(|&s| s == 7));
    assert_eq!(v.read_file(p).await.unwrap(), Some(Value::Text(expected)));
}

#[tokio::test]
async fn append_refreshes_typed_element_count() {
    let v = vault();
    let p = "/ppg/samples";
    v.append_file_with(p, TypedArray::from(vec![1i32, 2, 3]), Some(8)).await.unwrap();
    v.append_file_with(p, TypedArray::from(vec![4i32, 5]), Some(8)).await.unwrap();
    let first = v.store().get(Collection::Files, p).unwrap().unwrap();
    let rec = types::ChunkRecord::decode(&first).unwrap();
    assert_eq!(rec.meta.element_count, Some(5));
    assert_eq!(v.read_file(p).await.unwrap(), Some(Value::Typed(TypedArray::I32(vec![1, 2, 3, 4, 5]))));

    let err = v.append_file_with(p, "text", Some(8)).await.unwrap_err();
    assert_eq!(err.code_str(), "unsupported_value");
    let err = v.append_file_with(p, TypedArray::from(vec![1.0f32]), Some(8)).await.unwrap_err();
    assert_eq!(err.code_str(), "unsupported_value");
    // failed appends leave the file untouched
    assert_eq!(v.get_file_size(p).await.unwrap(), 20);
}

#[tokio::test]
async fn concurrent_appends_do_not_lose_data() {
    let v = std::sync::Arc::new(vault());
    let mut handles = Vec::new();
    for w in 0..4 {
        let v = v.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                v.append_file_with("/data/c.txt", format!("{w}:{i:02};"), Some(16)).await.unwrap();
            }
        }));
    }
    for h in handles { h.await.unwrap(); }
    // every record is 5 bytes
    assert_eq!(v.get_file_size("/data/c.txt").await.unwrap(), 4 * 25 * 5);
}

#[tokio::test]
async fn missing_file_is_not_an_error() {
    let v = vault();
    assert_eq!(v.read_file("/nope/x").await.unwrap(), None);
    assert!(!v.exists("/nope/x").await.unwrap());
    assert_eq!(v.get_file_size("/nope/x").await.unwrap(), 0);
    assert!(!v.delete_file("/nope/x").await.unwrap());
    assert!(v.read_bytes("/nope/x", 0, None).await.unwrap().is_empty());
    assert_eq!(v.read_file_as_text("/nope/x").await.unwrap(), None);
}

#[tokio::test]
async fn delete_file_removes_every_chunk() {
    let v = vault();
    v.write_file_with("/d/f", "z".repeat(95), Some(10)).await.unwrap();
    v.write_file_with("/d/keep", "k", Some(10)).await.unwrap();
    assert!(v.delete_file("/d/f").await.unwrap());
    assert!(chunk_keys(&v, "/d/f").is_empty());
    assert_eq!(v.list_filenames("/d").await.unwrap(), vec!["/d/keep".to_string()]);
    assert!(v.exists("/d/keep").await.unwrap());
}

#[tokio::test]
async fn byte_ranges_span_chunks() {
    let v = vault();
    v.write_file_with("/d/alpha", "abcdefghijklmnopqrstuvwxyz", Some(5)).await.unwrap();
    assert_eq!(v.read_bytes("/d/alpha", 3, Some(12)).await.unwrap(), b"defghijkl");
    assert_eq!(v.read_text_range("/d/alpha", 20, None).await.unwrap(), "uvwxyz");
    assert_eq!(v.read_text_range("/d/alpha", 24, Some(100)).await.unwrap(), "yz");
    assert!(v.read_bytes("/d/alpha", 10, Some(10)).await.unwrap().is_empty());
    assert_eq!(v.read_file_as_text("/d/alpha").await.unwrap().as_deref(), Some("abcdefghijklmnopqrstuvwxyz"));
}

#[tokio::test]
async fn chunk_visitor_can_stop_early() {
    let v = vault();
    v.write_file_with("/d/f", "x".repeat(50), Some(10)).await.unwrap();
    let mut seen = Vec::new();
    let n = v.process_chunks_in_order("/d/f", |i, _| {
        seen.push(i);
        if i == 2 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
    }).await.unwrap();
    assert_eq!(n, 3);
    assert_eq!(seen, vec![0, 1, 2]);
}

#[tokio::test]
async fn bad_paths_are_rejected() {
    let v = vault();
    for p in ["", "/", "toplevel.txt", "/a/../b", "/a/b_chunk_00000001"] {
        let err = v.write_file(p, "x").await.unwrap_err();
        assert_eq!(err.code_str(), "bad_path", "path {p:?}");
    }
}

#[tokio::test]
async fn persistent_vault_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = VaultConfig { root: tmp.path().to_path_buf(), chunk_size: Some(4), ..VaultConfig::default() };
    {
        let v = Vault::open(cfg.clone()).unwrap();
        v.write_file("/data/a.txt", "persisted!").await.unwrap();
        v.append_file("/data/a.txt", "+more").await.unwrap();
        v.close().unwrap();
    }
    let v = Vault::open(cfg).unwrap();
    assert_eq!(v.read_file("/data/a.txt").await.unwrap(), Some(Value::from("persisted!+more")));
    assert_eq!(v.list_filenames("/data").await.unwrap(), vec!["/data/a.txt".to_string()]);
}

#[tokio::test]
async fn composed_and_decomposed_names_address_one_file() {
    let v = vault();
    v.write_file("/data/caf\u{00E9}.csv", "a\n").await.unwrap();
    v.append_file("/data/cafe\u{0301}.csv", "b\n").await.unwrap();
    assert_eq!(v.list_filenames("/data").await.unwrap().len(), 1);
    assert_eq!(v.read_file_as_text("/data/cafe\u{0301}.csv").await.unwrap().as_deref(), Some("a\nb\n"));
}
