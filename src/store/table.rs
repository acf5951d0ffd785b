//! store/table — per-chapter таблица освобождений (`.tbl`).
//!
//! Формат (LE): [freed u8 x 256][free_cnt i32]. Отсутствие файла
//! эквивалентно нулевой таблице («освобождений ещё не было»). Таблица
//! сбрасывается на диск лишь при смене chapter'а у relinquish-курсора,
//! поэтому для целиком прожитых глав файл чаще всего не создаётся вовсе.

use byteorder::{ByteOrder, LittleEndian};
use log::warn;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

use crate::consts::{FREE_TABLE_SIZE, STORE_DATA_COUNT};
use crate::error::StoreError;

use super::io::tbl_path;

/// Битовая карта освобождённых объектов chapter'а.
#[derive(Debug, Clone)]
pub(crate) struct FreeTable {
    pub freed: [bool; STORE_DATA_COUNT as usize],
    pub free_cnt: u32,
}

impl Default for FreeTable {
    fn default() -> Self {
        Self {
            freed: [false; STORE_DATA_COUNT as usize],
            free_cnt: 0,
        }
    }
}

impl FreeTable {
    fn encode(&self) -> [u8; FREE_TABLE_SIZE] {
        let mut buf = [0u8; FREE_TABLE_SIZE];
        for (i, &f) in self.freed.iter().enumerate() {
            buf[i] = f as u8;
        }
        LittleEndian::write_i32(
            &mut buf[STORE_DATA_COUNT as usize..],
            self.free_cnt as i32,
        );
        buf
    }

    fn decode(buf: &[u8; FREE_TABLE_SIZE]) -> Self {
        let mut t = FreeTable::default();
        for i in 0..STORE_DATA_COUNT as usize {
            t.freed[i] = buf[i] != 0;
        }
        t.free_cnt = LittleEndian::read_i32(&buf[STORE_DATA_COUNT as usize..]).max(0) as u32;
        t
    }
}

/// Сохранить таблицу chapter'а (перезапись целиком).
pub(crate) fn save_table(
    root: &Path,
    service_id: u64,
    file_id: u32,
    table: &FreeTable,
) -> Result<(), StoreError> {
    let path = tbl_path(root, service_id, file_id);
    let res = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .and_then(|mut f| f.write_all(&table.encode()));
    if let Err(e) = res {
        warn!("failed to update relinquish table {}: {}", path.display(), e);
        return Err(StoreError::FailedStore);
    }
    Ok(())
}

/// Загрузить таблицу chapter'а. Ok(None) — файла нет (нулевая таблица).
pub(crate) fn load_table(
    root: &Path,
    service_id: u64,
    file_id: u32,
) -> Result<Option<FreeTable>, StoreError> {
    let path = tbl_path(root, service_id, file_id);
    let mut f = match OpenOptions::new().read(true).open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            warn!("failed to open relinquish table {}: {}", path.display(), e);
            return Err(StoreError::FailedStore);
        }
    };
    let mut buf = [0u8; FREE_TABLE_SIZE];
    if let Err(e) = f.read_exact(&mut buf) {
        warn!("failed to read relinquish table {}: {}", path.display(), e);
        return Err(StoreError::FailedStore);
    }
    Ok(Some(FreeTable::decode(&buf)))
}

/// Удалить `.tbl` chapter'а; отсутствие файла не ошибка.
pub(crate) fn delete_table_file(root: &Path, service_id: u64, file_id: u32) {
    let path = tbl_path(root, service_id, file_id);
    if let Err(e) = std::fs::remove_file(&path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove table file {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn unique_root(prefix: &str) -> PathBuf {
        let pid = std::process::id();
        let t = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("satchel-{}-{}-{}", prefix, pid, t))
    }

    #[test]
    fn roundtrip_and_missing_is_none() {
        let root = unique_root("tbl");
        fs::create_dir_all(&root).unwrap();

        assert!(load_table(&root, 0, 0).unwrap().is_none());

        let mut t = FreeTable::default();
        t.freed[0] = true;
        t.freed[255] = true;
        t.free_cnt = 2;
        save_table(&root, 0, 0, &t).unwrap();

        let got = load_table(&root, 0, 0).unwrap().expect("table present");
        assert!(got.freed[0] && got.freed[255]);
        assert!(!got.freed[1]);
        assert_eq!(got.free_cnt, 2);

        delete_table_file(&root, 0, 0);
        assert!(load_table(&root, 0, 0).unwrap().is_none());
        // Повторное удаление отсутствующего файла — не ошибка.
        delete_table_file(&root, 0, 0);
    }
}
