use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use Satchel::error::StoreError;
use Satchel::store;
use Satchel::StoreConfig;

#[test]
fn enqueue_dequeue_release_roundtrip() -> Result<()> {
    let root = unique_root("basic");
    fs::create_dir_all(&root)?;

    let h = store::create(&StoreConfig::default().with_root_path(root.to_str().unwrap()))
        .expect("create store");

    // Первый объект получает sid=1; payload — конкатенация двух буферов.
    let sid = store::enqueue(h, b"AB", b"CD", 0).expect("enqueue");
    assert_eq!(sid, 1);

    let o = store::dequeue(h, 0).expect("dequeue");
    assert_eq!(o.sid, 1);
    assert_eq!(o.size(), 4);
    assert_eq!(o.payload, b"ABCD");

    store::release(h, 1).expect("release");
    store::destroy(h);
    Ok(())
}

#[test]
fn dequeue_returns_enqueue_order() -> Result<()> {
    let root = unique_root("order");
    fs::create_dir_all(&root)?;
    let h = store::create(&StoreConfig::default().with_root_path(root.to_str().unwrap()))
        .expect("create store");

    let mut sids = Vec::new();
    for i in 0..20u8 {
        let payload = vec![i; (i as usize % 5) + 1];
        sids.push(store::enqueue(h, &payload, &[], 0).expect("enqueue"));
    }
    // sid'ы строго возрастают от единицы.
    assert_eq!(sids, (1..=20).collect::<Vec<u64>>());

    for (i, expect_sid) in sids.iter().enumerate() {
        let o = store::dequeue(h, 0).expect("dequeue in order");
        assert_eq!(o.sid, *expect_sid);
        assert_eq!(o.payload, vec![i as u8; (i % 5) + 1]);
        store::release(h, o.sid).expect("release");
    }

    assert_eq!(store::getcount(h), 20, "relinquish ещё не было");
    store::destroy(h);
    Ok(())
}

#[test]
fn dequeue_times_out_on_empty() -> Result<()> {
    let root = unique_root("timeout");
    fs::create_dir_all(&root)?;
    let h = store::create(&StoreConfig::default().with_root_path(root.to_str().unwrap()))
        .expect("create store");

    // 0 — неблокирующий режим.
    assert_eq!(store::dequeue(h, 0).unwrap_err(), StoreError::Timeout);
    // Небольшое ожидание тоже истекает без данных.
    assert_eq!(store::dequeue(h, 20).unwrap_err(), StoreError::Timeout);

    // Состояние не изменилось: объект после таймаутов читается нормально.
    store::enqueue(h, b"X", b"", 0).expect("enqueue");
    let o = store::dequeue(h, 0).expect("dequeue");
    assert_eq!(o.payload, b"X");

    store::destroy(h);
    Ok(())
}

#[test]
fn release_without_cached_entry_fails() -> Result<()> {
    let root = unique_root("badrel");
    fs::create_dir_all(&root)?;
    let h = store::create(&StoreConfig::default().with_root_path(root.to_str().unwrap()))
        .expect("create store");

    store::enqueue(h, b"A", b"", 0).expect("enqueue");
    // Объект ещё не материализован в кэше.
    assert_eq!(store::release(h, 1).unwrap_err(), StoreError::FailedStore);

    store::destroy(h);
    Ok(())
}

#[test]
fn blocking_dequeue_wakes_on_enqueue() -> Result<()> {
    let root = unique_root("wake");
    fs::create_dir_all(&root)?;
    let h = store::create(&StoreConfig::default().with_root_path(root.to_str().unwrap()))
        .expect("create store");

    let consumer = std::thread::spawn(move || store::dequeue(h, 2000));
    std::thread::sleep(std::time::Duration::from_millis(50));
    store::enqueue(h, b"PING", b"", 0).expect("enqueue");

    let o = consumer.join().unwrap().expect("consumer woken by enqueue");
    assert_eq!(o.payload, b"PING");

    store::destroy(h);
    Ok(())
}

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("satchel-{}-{}-{}", prefix, pid, t))
}
