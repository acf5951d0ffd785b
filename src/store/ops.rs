//! store/ops — пять операций хранилища.
//!
//! Три независимых курсора (write/read/retrieve) плюс relinquish-курсор
//! позволяют одновременно писать, последовательно читать и выборочно
//! доставать объекты. Все id 1-based и строго возрастают у enqueue;
//! dequeue возвращает объекты в том же порядке.
//!
//! Ошибка I/O помечает курсор: следующий вызов ресинхронизируется
//! прогулкой по валидному префиксу chapter-файла (seek в начало + проход
//! offset записей). Повторная неудача всплывает наружу. Усечения рваного
//! хвоста нет: дозапись после ресинка затирает его по месту.
//!
//! Таймауты: отрицательный — ждать бесконечно, 0 — не ждать, иначе
//! миллисекунды. Ожидания два: пустая очередь в dequeue и залоченный
//! слот кэша при вставке.

use std::io::{Seek, SeekFrom};
use std::sync::{Condvar, MutexGuard};
use std::time::Duration;

use log::warn;

use crate::consts::STORE_DATA_COUNT;
use crate::error::StoreError;
use crate::metrics::{
    record_cache_hit, record_cache_miss, record_chapter_reclaimed, record_store_dequeue,
    record_store_enqueue, record_store_retrieve,
};

use super::io::{
    dat_path, data_id_of, delete_dat_file, file_id_of, offset_of, open_dat_read, open_dat_write,
    read_object_buf, walk_records,
};
use super::object::{decode_object, encode_record, stamp_sid, StoreObject};
use super::table::{delete_table_file, load_table, save_table, FreeTable};
use super::{StoreShared, StoreState};

/// Подождать на кондваре по правилам таймаута (<0 — бесконечно).
/// Возвращает (guard, истёк_ли_таймаут). Вызывающий сам перепроверяет
/// условие: пробуждения бывают ложными.
fn wait_ms<'a>(
    cond: &Condvar,
    guard: MutexGuard<'a, StoreState>,
    timeout_ms: i32,
) -> (MutexGuard<'a, StoreState>, bool) {
    if timeout_ms < 0 {
        (cond.wait(guard).unwrap(), false)
    } else {
        let (g, res) = cond
            .wait_timeout(guard, Duration::from_millis(timeout_ms as u64))
            .unwrap();
        (g, res.timed_out())
    }
}

pub(crate) fn enqueue(
    shared: &StoreShared,
    data1: &[u8],
    data2: &[u8],
    _timeout_ms: i32,
) -> Result<u64, StoreError> {
    let mut st = shared.state.lock().unwrap();

    let sid = st.write_data_id;
    let data_id = data_id_of(sid);
    let file_id = file_id_of(data_id);
    let offset = offset_of(data_id);

    if st.write_fd.is_none() {
        let path = dat_path(&shared.root, shared.service_id, file_id);
        let mut f = match open_dat_write(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!("failed to open data file {}: {}", path.display(), e);
                return Err(StoreError::FailedStore);
            }
        };
        if st.write_error {
            let mut resync = f.seek(SeekFrom::Start(0)).map(|_| ());
            if resync.is_ok() {
                resync = walk_records(&mut f, offset);
            }
            if let Err(e) = resync {
                warn!(
                    "failed to re-sync write cursor in {}: {}",
                    path.display(),
                    e
                );
                return Err(StoreError::FailedStore);
            }
        } else if let Err(e) = f.seek(SeekFrom::End(0)) {
            warn!("failed to seek to end of {}: {}", path.display(), e);
            return Err(StoreError::FailedStore);
        }
        st.write_fd = Some(f);
    }

    let rec = encode_record(shared.handle_index as i32, data1, data2);
    {
        let f = st.write_fd.as_mut().unwrap();
        let mut res = std::io::Write::write_all(f, &rec);
        if res.is_ok() && shared.flush {
            res = f.sync_data();
        }
        if let Err(e) = res {
            warn!(
                "failed to write object to store {}: {}",
                shared.service_id, e
            );
            st.write_error = true;
            st.write_fd = None;
            return Err(StoreError::FailedStore);
        }
    }

    // Закрыть chapter до инкремента: идентификаторы 1-based.
    if st.write_data_id % STORE_DATA_COUNT as u64 == 0 {
        st.write_fd = None;
    }
    st.write_error = false;
    st.write_data_id += 1;
    st.data_count += 1;
    record_store_enqueue(data1.len() + data2.len());
    shared.cond.notify_all();
    Ok(sid)
}

pub(crate) fn dequeue(shared: &StoreShared, timeout_ms: i32) -> Result<StoreObject, StoreError> {
    let mut st = shared.state.lock().unwrap();

    while st.read_data_id == st.write_data_id {
        if timeout_ms == 0 {
            return Err(StoreError::Timeout);
        }
        let (g, timed_out) = wait_ms(&shared.cond, st, timeout_ms);
        st = g;
        if (timed_out || timeout_ms >= 0) && st.read_data_id == st.write_data_id {
            return Err(StoreError::Timeout);
        }
    }

    let data_id = data_id_of(st.read_data_id);
    let file_id = file_id_of(data_id);
    let offset = offset_of(data_id);

    if st.read_fd.is_none() {
        let path = dat_path(&shared.root, shared.service_id, file_id);
        match open_dat_read(&path) {
            Ok(f) => st.read_fd = Some(f),
            Err(e) => {
                warn!("failed to open data file {}: {}", path.display(), e);
                return Err(StoreError::FailedStore);
            }
        }
    }
    if st.read_error {
        let f = st.read_fd.as_mut().unwrap();
        let mut resync = f.seek(SeekFrom::Start(0)).map(|_| ());
        if resync.is_ok() {
            resync = walk_records(f, offset);
        }
        if let Err(e) = resync {
            warn!("failed to re-sync read cursor: {}", e);
            st.read_fd = None;
            return Err(StoreError::FailedStore);
        }
    }

    let mut buf = {
        let f = st.read_fd.as_mut().unwrap();
        match read_object_buf(f) {
            Ok(b) => b,
            Err(e) => {
                warn!(
                    "failed to read object from store {}: {}",
                    shared.service_id, e
                );
                st.read_error = true;
                st.read_fd = None;
                return Err(StoreError::FailedStore);
            }
        }
    };
    stamp_sid(&mut buf, st.read_data_id);

    while st.cache.is_blocked(data_id) {
        if timeout_ms == 0 {
            st.read_error = true;
            return Err(StoreError::Timeout);
        }
        let (g, timed_out) = wait_ms(&shared.cond, st, timeout_ms);
        st = g;
        if (timed_out || timeout_ms >= 0) && st.cache.is_blocked(data_id) {
            // Позиция файла уже продвинута: следующий вызов ресинкнется.
            st.read_error = true;
            return Err(StoreError::Timeout);
        }
    }

    let obj = match decode_object(&buf) {
        Some(o) => o,
        None => {
            warn!("malformed object header at data_id {}", data_id);
            st.read_error = true;
            st.read_fd = None;
            return Err(StoreError::FailedStore);
        }
    };
    st.cache.insert_locked(data_id, buf);

    if st.read_data_id % STORE_DATA_COUNT as u64 == 0 {
        st.read_fd = None;
    }
    st.read_error = false;
    st.read_data_id += 1;
    record_store_dequeue();
    Ok(obj)
}

pub(crate) fn retrieve(
    shared: &StoreShared,
    sid: u64,
    timeout_ms: i32,
) -> Result<StoreObject, StoreError> {
    if sid == 0 {
        return Err(StoreError::FailedStore);
    }
    let mut st = shared.state.lock().unwrap();

    let data_id = data_id_of(sid);
    let file_id = file_id_of(data_id);
    let offset = offset_of(data_id);

    if let Some(buf) = st.cache.get(data_id) {
        if let Some(obj) = decode_object(buf) {
            record_cache_hit();
            record_store_retrieve();
            return Ok(obj);
        }
    }
    record_cache_miss();

    let prev_data_id = data_id_of(st.retrieve_data_id);
    let prev_file_id = file_id_of(prev_data_id);
    let prev_offset = offset_of(prev_data_id);

    if file_id != prev_file_id {
        st.retrieve_fd = None;
    }

    let walk_count;
    if st.retrieve_fd.is_none() {
        let path = dat_path(&shared.root, shared.service_id, file_id);
        match open_dat_read(&path) {
            Ok(f) => st.retrieve_fd = Some(f),
            Err(e) => {
                warn!("failed to open data file {}: {}", path.display(), e);
                return Err(StoreError::FailedStore);
            }
        }
        walk_count = offset;
    } else if offset > prev_offset {
        // Курсор стоит сразу после записи prev_offset.
        walk_count = offset - prev_offset - 1;
    } else {
        let f = st.retrieve_fd.as_mut().unwrap();
        if let Err(e) = f.seek(SeekFrom::Start(0)) {
            warn!("failed to rewind retrieve cursor: {}", e);
            st.retrieve_fd = None;
            return Err(StoreError::FailedStore);
        }
        walk_count = offset;
    }

    let mut buf = {
        let f = st.retrieve_fd.as_mut().unwrap();
        let res = match walk_records(f, walk_count) {
            Ok(()) => read_object_buf(f),
            Err(e) => Err(e),
        };
        match res {
            Ok(b) => b,
            Err(e) => {
                warn!(
                    "failed to retrieve object sid {} from store {}: {}",
                    sid, shared.service_id, e
                );
                st.retrieve_fd = None;
                return Err(StoreError::FailedStore);
            }
        }
    };
    stamp_sid(&mut buf, sid);
    st.retrieve_data_id = sid;

    while st.cache.is_blocked(data_id) {
        if timeout_ms == 0 {
            return Err(StoreError::Timeout);
        }
        let (g, timed_out) = wait_ms(&shared.cond, st, timeout_ms);
        st = g;
        if (timed_out || timeout_ms >= 0) && st.cache.is_blocked(data_id) {
            return Err(StoreError::Timeout);
        }
    }

    let obj = match decode_object(&buf) {
        Some(o) => o,
        None => {
            warn!("malformed object header at sid {}", sid);
            st.retrieve_fd = None;
            return Err(StoreError::FailedStore);
        }
    };
    st.cache.insert_locked(data_id, buf);
    record_store_retrieve();
    Ok(obj)
}

pub(crate) fn release(shared: &StoreShared, sid: u64) -> Result<(), StoreError> {
    if sid == 0 {
        return Err(StoreError::FailedStore);
    }
    let mut st = shared.state.lock().unwrap();
    let data_id = data_id_of(sid);
    if !st.cache.release(data_id) {
        warn!("release of invalid resource: sid {}", sid);
        return Err(StoreError::FailedStore);
    }
    shared.cond.notify_all();
    Ok(())
}

pub(crate) fn relinquish(shared: &StoreShared, sid: u64) -> Result<(), StoreError> {
    if sid == 0 {
        return Err(StoreError::FailedStore);
    }
    let mut st = shared.state.lock().unwrap();

    let data_id = data_id_of(sid);
    let file_id = file_id_of(data_id);
    let offset = offset_of(data_id) as usize;
    let prev_file_id = file_id_of(data_id_of(st.relinquish_data_id));

    st.cache.clear_if(data_id);

    if file_id != prev_file_id {
        st.relinquish_data_id = sid;
        // Накопленную таблицу прежнего chapter'а сбрасываем на диск,
        // таблицу нового — поднимаем (отсутствие файла == нулевая).
        if st.relinquish_table.free_cnt > 0 {
            save_table(
                &shared.root,
                shared.service_id,
                prev_file_id,
                &st.relinquish_table,
            )?;
        }
        st.relinquish_table =
            load_table(&shared.root, shared.service_id, file_id)?.unwrap_or_default();
    }

    if !st.relinquish_table.freed[offset] {
        st.relinquish_table.freed[offset] = true;
        st.relinquish_table.free_cnt += 1;
        st.data_count = st.data_count.saturating_sub(1);

        if st.relinquish_table.free_cnt == STORE_DATA_COUNT {
            // Chapter освобождён целиком: физический реклейм обоих файлов.
            // Таблицы может не быть вовсе (глава прожита без смены курсора).
            delete_table_file(&shared.root, shared.service_id, file_id);
            delete_dat_file(&shared.root, shared.service_id, file_id)?;
            st.relinquish_table = FreeTable::default();
            record_chapter_reclaimed();
        }
    }
    Ok(())
}
