//! Misuse-паники хэндлов — в собственном процессе, отдельно от остальных
//! store-тестов (double destroy делит таблицу со всеми тестами файла).

use std::fs;
use std::path::PathBuf;

use Satchel::store;
use Satchel::StoreConfig;

#[test]
#[should_panic(expected = "is not in use")]
fn double_destroy_is_fatal() {
    let root = unique_root("dd");
    fs::create_dir_all(&root).unwrap();
    let cfg = StoreConfig::default().with_root_path(root.to_str().unwrap());

    let h = store::create(&cfg).expect("create");
    store::destroy(h);
    store::destroy(h); // misuse
}

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("satchel-{}-{}-{}", prefix, pid, t))
}
