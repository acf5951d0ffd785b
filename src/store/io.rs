//! store/io — имена chapter-файлов, разбиение id и низкоуровневое чтение.
//!
//! Storage id (sid) 1-based; data_id = sid - 1. Разбиение:
//! file_id = data_id >> 8, offset = data_id & 0xFF — 256 объектов на
//! chapter. Записи внутри файла строго последовательные, поэтому
//! позиционирование после ошибки — прогулка по префиксам
//! [u32 size][size байт] от начала файла.

use byteorder::{ByteOrder, LittleEndian};
use log::warn;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::consts::OBJECT_HDR_SIZE;
use crate::error::StoreError;

// -------- id split --------

#[inline]
pub(crate) fn data_id_of(sid: u64) -> u32 {
    (sid - 1) as u32
}

#[inline]
pub(crate) fn file_id_of(data_id: u32) -> u32 {
    data_id >> 8
}

#[inline]
pub(crate) fn offset_of(data_id: u32) -> u32 {
    data_id & 0xFF
}

// -------- paths --------

pub(crate) fn dat_path(root: &Path, service_id: u64, file_id: u32) -> PathBuf {
    root.join(format!("{}_{}.dat", service_id, file_id))
}

pub(crate) fn tbl_path(root: &Path, service_id: u64, file_id: u32) -> PathBuf {
    root.join(format!("{}_{}.tbl", service_id, file_id))
}

// -------- file open/delete --------

pub(crate) fn open_dat_read(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

/// Открыть chapter на дозапись. Режим read+write (не append): ресинк после
/// ошибки пишет с выгулянной позиции, затирая рваный хвост по месту.
pub(crate) fn open_dat_write(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)
}

/// Удалить chapter-файл; любая неудача (включая отсутствие) — ошибка store.
pub(crate) fn delete_dat_file(root: &Path, service_id: u64, file_id: u32) -> Result<(), StoreError> {
    let path = dat_path(root, service_id, file_id);
    if let Err(e) = std::fs::remove_file(&path) {
        warn!("failed to remove data file {}: {}", path.display(), e);
        return Err(StoreError::FailedStore);
    }
    Ok(())
}

// -------- record walking --------

/// Перешагнуть count записей от текущей позиции файла.
pub(crate) fn walk_records(f: &mut File, count: u32) -> io::Result<()> {
    let mut size_buf = [0u8; 4];
    for _ in 0..count {
        f.read_exact(&mut size_buf)?;
        let current_size = LittleEndian::read_u32(&size_buf);
        f.seek(SeekFrom::Current(current_size as i64))?;
    }
    Ok(())
}

/// Прочитать одну запись с текущей позиции: [u32 size][size байт].
/// Возвращает буфер объекта (hdr + payload).
pub(crate) fn read_object_buf(f: &mut File) -> io::Result<Vec<u8>> {
    let mut size_buf = [0u8; 4];
    f.read_exact(&mut size_buf)?;
    let object_size = LittleEndian::read_u32(&size_buf) as usize;
    if object_size < OBJECT_HDR_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("object size {} below header size", object_size),
        ));
    }
    let mut buf = vec![0u8; object_size];
    f.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::object::encode_record;
    use std::fs;
    use std::io::Write;
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
    fn id_split_is_256_per_chapter() {
        assert_eq!(data_id_of(1), 0);
        assert_eq!(file_id_of(data_id_of(1)), 0);
        assert_eq!(offset_of(data_id_of(256)), 255);
        assert_eq!(file_id_of(data_id_of(257)), 1);
        assert_eq!(offset_of(data_id_of(257)), 0);
    }

    #[test]
    fn walk_skips_records() {
        let root = unique_root("walk");
        fs::create_dir_all(&root).unwrap();
        let path = dat_path(&root, 0, 0);

        let mut f = open_dat_write(&path).unwrap();
        for p in [b"AA".as_ref(), b"BBBB".as_ref(), b"C".as_ref()] {
            f.write_all(&encode_record(0, p, b"")).unwrap();
        }
        drop(f);

        let mut f = open_dat_read(&path).unwrap();
        walk_records(&mut f, 2).unwrap();
        let buf = read_object_buf(&mut f).unwrap();
        assert_eq!(&buf[crate::consts::OBJECT_HDR_SIZE..], b"C");
    }

    #[test]
    fn short_record_is_io_error() {
        let root = unique_root("short");
        fs::create_dir_all(&root).unwrap();
        let path = dat_path(&root, 0, 0);

        let mut f = open_dat_write(&path).unwrap();
        let rec = encode_record(0, b"PAYLOAD", b"");
        f.write_all(&rec[..rec.len() - 3]).unwrap(); // рваный хвост
        drop(f);

        let mut f = open_dat_read(&path).unwrap();
        assert!(read_object_buf(&mut f).is_err());
    }
}
