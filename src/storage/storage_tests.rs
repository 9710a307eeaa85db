use super::*;
use std::ops::ControlFlow;

fn put_file(store: &StoreHandle, key: &str, value: &[u8]) {
    store.transaction(|t| { t.put(Collection::Files, key, value.to_vec()); Ok(()) }).unwrap();
}

#[test]
fn commit_makes_all_writes_visible() {
    let store = StoreHandle::in_memory("t");
    store.transaction(|t| {
        t.put(Collection::Directories, "/data", b"{}".to_vec());
        t.put(Collection::Files, "/data/a", b"A".to_vec());
        // own writes are visible inside the transaction
        assert_eq!(t.get(Collection::Files, "/data/a"), Some(&b"A"[..]));
        Ok(())
    }).unwrap();
    assert_eq!(store.get(Collection::Files, "/data/a").unwrap(), Some(b"A".to_vec()));
    assert!(store.contains(Collection::Directories, "/data").unwrap());
}

#[test]
fn failed_closure_rolls_back_everything() {
    let store = StoreHandle::in_memory("t");
    put_file(&store, "/data/keep", b"old");
    let before = store.bytes_used();
    let res: VaultResult<()> = store.transaction(|t| {
        t.put(Collection::Files, "/data/keep", b"new".to_vec());
        t.put(Collection::Files, "/data/extra", b"x".to_vec());
        t.delete_prefix(Collection::Files, "/data/");
        Err(VaultError::unsupported("boom"))
    });
    assert!(matches!(res, Err(VaultError::UnsupportedValue(_))));
    assert_eq!(store.get(Collection::Files, "/data/keep").unwrap(), Some(b"old".to_vec()));
    assert_eq!(store.get(Collection::Files, "/data/extra").unwrap(), None);
    assert_eq!(store.bytes_used(), before);
}

#[test]
fn panic_inside_closure_rolls_back() {
    let store = StoreHandle::in_memory("t");
    put_file(&store, "/data/keep", b"old");
    let before = store.bytes_used();
    let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        store.transaction(|t| -> VaultResult<()> {
            t.put(Collection::Files, "/data/keep", b"new".to_vec());
            t.put(Collection::Files, "/data/half", b"x".to_vec());
            panic!("closure failed mid-transaction");
        })
    }));
    assert!(res.is_err());
    assert_eq!(store.get(Collection::Files, "/data/keep").unwrap(), Some(b"old".to_vec()));
    assert_eq!(store.get(Collection::Files, "/data/half").unwrap(), None);
    assert_eq!(store.bytes_used(), before);
    // the write lock was released and the store still commits
    put_file(&store, "/data/after", b"ok");
    assert_eq!(store.len(Collection::Files).unwrap(), 2);
}

#[test]
fn quota_exceeded_aborts_commit() {
    let store = StoreHandle::build(
        StoreSettings { name: "q".into(), quota_bytes: Some(32), sync_on_commit: false },
        None, Collections::default(), None,
    );
    put_file(&store, "/d/a", b"0123456789");
    let res = store.transaction(|t| { t.put(Collection::Files, "/d/b", vec![7u8; 64]); Ok(()) });
    match res {
        Err(e) => { assert_eq!(e.code_str(), "storage_transaction"); assert!(e.to_string().contains("quota")); }
        Ok(_) => panic!("expected quota failure"),
    }
    assert_eq!(store.get(Collection::Files, "/d/b").unwrap(), None);
    assert_eq!(store.get(Collection::Files, "/d/a").unwrap(), Some(b"0123456789".to_vec()));
}

#[test]
fn prefix_scan_is_ordered_and_bounded() {
    let store = StoreHandle::in_memory("t");
    for k in ["/a/f_chunk_00000002", "/a/f", "/a/f_chunk_00000010", "/a/f_chunk_00000001", "/a/g", "/b/f"] {
        put_file(&store, k, k.as_bytes());
    }
    let keys: Vec<String> = store.scan_prefix(Collection::Files, "/a/f_chunk_").unwrap()
        .into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["/a/f_chunk_00000001", "/a/f_chunk_00000002", "/a/f_chunk_00000010"]);

    let window: Vec<String> = store.range(Collection::Files, "/a/f_chunk_00000002", "/a/g").unwrap()
        .into_iter().map(|(k, _)| k).collect();
    assert_eq!(window, vec!["/a/f_chunk_00000002", "/a/f_chunk_00000010"]);
    assert!(store.range(Collection::Files, "/b", "/a").unwrap().is_empty());

    // visitor can stop early
    let mut seen = 0;
    store.read(|v| v.scan_prefix(Collection::Files, "/a/", |_, _| {
        seen += 1;
        Ok(if seen == 2 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) })
    })).unwrap();
    assert_eq!(seen, 2);
}

#[test]
fn prefix_scan_includes_astral_keys() {
    let store = StoreHandle::in_memory("t");
    put_file(&store, "/a/\u{1F600}", b"smile");
    let all = store.scan_prefix(Collection::Files, "/a/").unwrap();
    assert_eq!(all.len(), 1);
    let n = store.transaction(|t| Ok(t.delete_prefix(Collection::Files, "/a/"))).unwrap();
    assert_eq!(n, 1);
}

#[test]
fn reopen_replays_wal_and_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let store = StoreHandle::open(tmp.path(), StoreSettings::named("db")).unwrap();
        put_file(&store, "/data/one", b"1");
        store.checkpoint().unwrap();
        put_file(&store, "/data/two", b"2");
        store.transaction(|t| { t.delete(Collection::Files, "/data/one"); Ok(()) }).unwrap();
        // simulate a crash: skip the checkpoint on drop
        store.closed.store(true, Ordering::SeqCst);
    }
    let store = StoreHandle::open(tmp.path(), StoreSettings::named("db")).unwrap();
    assert_eq!(store.get(Collection::Files, "/data/one").unwrap(), None);
    assert_eq!(store.get(Collection::Files, "/data/two").unwrap(), Some(b"2".to_vec()));
    assert!(tmp.path().join("db").join("store.json").exists());
    store.close().unwrap();

    // after close the WAL is empty and the snapshot carries the data
    let wal_len = std::fs::metadata(tmp.path().join("db").join("wal").join("current.lg")).unwrap().len();
    assert_eq!(wal_len, 0);
    let store = StoreHandle::open(tmp.path(), StoreSettings::named("db")).unwrap();
    assert_eq!(store.len(Collection::Files).unwrap(), 1);
}

#[test]
fn closed_handle_rejects_operations() {
    let store = StoreHandle::in_memory("t");
    store.close().unwrap();
    assert!(store.is_closed());
    let err = store.get(Collection::Files, "/x/y").unwrap_err();
    assert!(err.is_retryable());
    assert!(store.transaction(|_| Ok(())).is_err());
    // closing twice is harmless
    store.close().unwrap();
}

#[test]
fn torn_wal_tail_is_cut_before_new_commits() {
    let tmp = tempfile::tempdir().unwrap();
    let wal_path = tmp.path().join("db").join("wal").join("current.lg");
    {
        let store = StoreHandle::open(tmp.path(), StoreSettings::named("db")).unwrap();
        put_file(&store, "/data/a.txt", b"A");
        store.closed.store(true, Ordering::SeqCst);
    }
    // crash mid-append: a header promising 100 bytes followed by 3 of them
    {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new().append(true).open(&wal_path).unwrap();
        let mut header = [0u8; 12];
        header[0..4].copy_from_slice(&0x4356_5731u32.to_le_bytes());
        header[4] = 1;
        header[5] = 1;
        header[8..12].copy_from_slice(&100u32.to_le_bytes());
        f.write_all(&header).unwrap();
        f.write_all(&[1, 2, 3]).unwrap();
    }
    {
        let store = StoreHandle::open(tmp.path(), StoreSettings::named("db")).unwrap();
        assert_eq!(store.get(Collection::Files, "/data/a.txt").unwrap(), Some(b"A".to_vec()));
        put_file(&store, "/data/b.txt", b"B");
        store.closed.store(true, Ordering::SeqCst);
    }
    let store = StoreHandle::open(tmp.path(), StoreSettings::named("db")).unwrap();
    assert_eq!(store.get(Collection::Files, "/data/a.txt").unwrap(), Some(b"A".to_vec()));
    assert_eq!(store.get(Collection::Files, "/data/b.txt").unwrap(), Some(b"B".to_vec()));
}
