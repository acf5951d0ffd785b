use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use Satchel::store;
use Satchel::StoreConfig;

/// Имена файлов с данным расширением в корне store (кроме LOCK).
fn files_with_ext(root: &Path, ext: &str) -> Vec<String> {
    let mut out = Vec::new();
    for entry in fs::read_dir(root).unwrap() {
        let name = entry.unwrap().file_name().to_string_lossy().to_string();
        if name.ends_with(ext) {
            out.push(name);
        }
    }
    out.sort();
    out
}

#[test]
fn full_chapter_reclaim_removes_files() -> Result<()> {
    let root = unique_root("reclaim");
    fs::create_dir_all(&root)?;
    let h = store::create(&StoreConfig::default().with_root_path(root.to_str().unwrap()))
        .expect("create store");

    // Ровно одна глава: 256 однобайтовых объектов.
    for i in 0..256u32 {
        let sid = store::enqueue(h, &[i as u8], &[], 0).expect("enqueue");
        assert_eq!(sid, i as u64 + 1);
    }
    assert_eq!(store::getcount(h), 256);

    let dats = files_with_ext(&root, ".dat");
    assert_eq!(dats.len(), 1, "ровно один chapter-файл: {:?}", dats);
    assert!(dats[0].ends_with("_0.dat"));

    // Вся глава освобождается без смены chapter'а: .tbl не создаётся,
    // на 256-м relinquish оба файла удаляются физически.
    for sid in 1..=256u64 {
        store::relinquish(h, sid).expect("relinquish");
    }
    assert!(files_with_ext(&root, ".dat").is_empty(), "dat файл удалён");
    assert!(files_with_ext(&root, ".tbl").is_empty(), "tbl не существует");
    assert_eq!(store::getcount(h), 0);

    store::destroy(h);
    Ok(())
}

#[test]
fn second_chapter_opens_after_256() -> Result<()> {
    let root = unique_root("roll");
    fs::create_dir_all(&root)?;
    let h = store::create(&StoreConfig::default().with_root_path(root.to_str().unwrap()))
        .expect("create store");

    for i in 0..257u32 {
        store::enqueue(h, &i.to_le_bytes(), &[], 0).expect("enqueue");
    }
    let dats = files_with_ext(&root, ".dat");
    assert_eq!(dats.len(), 2, "вторая глава открыта 257-м объектом");
    assert!(dats[0].ends_with("_0.dat"));
    assert!(dats[1].ends_with("_1.dat"));

    // Порядок чтения не зависит от границы глав.
    for i in 0..257u32 {
        let o = store::dequeue(h, 0).expect("dequeue");
        assert_eq!(o.sid, i as u64 + 1);
        assert_eq!(o.payload, i.to_le_bytes());
        store::release(h, o.sid).expect("release");
    }

    store::destroy(h);
    Ok(())
}

#[test]
fn relinquish_table_spills_and_reloads_across_chapters() -> Result<()> {
    let root = unique_root("spill");
    fs::create_dir_all(&root)?;
    let h = store::create(&StoreConfig::default().with_root_path(root.to_str().unwrap()))
        .expect("create store");

    // Две полные главы.
    for i in 0..512u32 {
        store::enqueue(h, &[i as u8], &[], 0).expect("enqueue");
    }
    assert_eq!(store::getcount(h), 512);

    // Одно освобождение в главе 0, затем прыжок в главу 1:
    // таблица главы 0 сбрасывается на диск.
    store::relinquish(h, 1).expect("relinquish sid 1");
    store::relinquish(h, 257).expect("relinquish sid 257");
    let tbls = files_with_ext(&root, ".tbl");
    assert_eq!(tbls.len(), 1, "таблица главы 0 сброшена: {:?}", tbls);
    assert!(tbls[0].ends_with("_0.tbl"));

    // Возврат в главу 0 поднимает таблицу с диска; глава добивается
    // до 256 освобождений и реклеймится целиком.
    for sid in 2..=256u64 {
        store::relinquish(h, sid).expect("relinquish chapter 0");
    }
    let dats = files_with_ext(&root, ".dat");
    assert_eq!(dats.len(), 1, "глава 0 удалена: {:?}", dats);
    assert!(dats[0].ends_with("_1.dat"));

    // Глава 1: её таблица (sid 257) была сброшена при возврате в главу 0.
    for sid in 258..=512u64 {
        store::relinquish(h, sid).expect("relinquish chapter 1");
    }
    assert!(files_with_ext(&root, ".dat").is_empty());
    assert!(files_with_ext(&root, ".tbl").is_empty());
    assert_eq!(store::getcount(h), 0);

    // Повторный relinquish уже освобождённого объекта — не ошибка и не
    // уводит счётчик ниже нуля... но глава удалена, таблица нулевая:
    // объект считается ещё не освобождённым, однако файла данных нет.
    store::destroy(h);
    Ok(())
}

#[test]
fn relinquish_is_idempotent_within_chapter() -> Result<()> {
    let root = unique_root("idem");
    fs::create_dir_all(&root)?;
    let h = store::create(&StoreConfig::default().with_root_path(root.to_str().unwrap()))
        .expect("create store");

    for i in 0..4u8 {
        store::enqueue(h, &[i], &[], 0).expect("enqueue");
    }
    store::relinquish(h, 2).expect("first relinquish");
    store::relinquish(h, 2).expect("double relinquish is a no-op");
    assert_eq!(store::getcount(h), 3);

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
