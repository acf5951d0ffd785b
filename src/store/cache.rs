//! store/cache — reclaim-кэш материализованных объектов.
//!
//! Кольцо фиксированного размера, индекс — data_id % cache_size (это не
//! LRU: курсор чтения движется последовательно, и коллизии возможны только
//! когда retrieve отстаёт на целый cache_size). Залоченную запись нельзя
//! вытеснить: писатель ждёт release() держателя (ограничен своим timeout).
//! Наружу выдаются копии буферов, не ссылки на внутреннее хранилище.

use crate::metrics::record_cache_eviction;

#[derive(Debug, Default)]
pub(crate) struct CacheEntry {
    pub buf: Option<Vec<u8>>,
    pub locked: bool,
    pub data_id: u32,
}

#[derive(Debug)]
pub(crate) struct DataCache {
    entries: Vec<CacheEntry>,
}

impl DataCache {
    pub fn new(size: usize) -> Self {
        let mut entries = Vec::with_capacity(size);
        entries.resize_with(size, CacheEntry::default);
        Self { entries }
    }

    #[inline]
    fn index(&self, data_id: u32) -> usize {
        data_id as usize % self.entries.len()
    }

    /// Буфер объекта, если слот занят именно этим data_id.
    pub fn get(&self, data_id: u32) -> Option<&Vec<u8>> {
        let e = &self.entries[self.index(data_id)];
        match &e.buf {
            Some(buf) if e.data_id == data_id => Some(buf),
            _ => None,
        }
    }

    /// Слот цели занят другим залоченным объектом (вставка должна ждать).
    pub fn is_blocked(&self, data_id: u32) -> bool {
        let e = &self.entries[self.index(data_id)];
        e.locked && e.buf.is_some()
    }

    /// Занять слот объектом (залоченным). Прежний незалоченный обитатель
    /// вытесняется; ждать залоченного — обязанность вызывающего.
    pub fn insert_locked(&mut self, data_id: u32, buf: Vec<u8>) {
        let idx = self.index(data_id);
        let e = &mut self.entries[idx];
        if e.buf.take().is_some() {
            record_cache_eviction();
        }
        e.buf = Some(buf);
        e.locked = true;
        e.data_id = data_id;
    }

    /// Снять лок с записи. false, если слот занят не этим data_id.
    pub fn release(&mut self, data_id: u32) -> bool {
        let idx = self.index(data_id);
        let e = &mut self.entries[idx];
        if e.buf.is_none() || e.data_id != data_id {
            return false;
        }
        e.locked = false;
        true
    }

    /// Выбросить запись, если слот занят этим data_id (relinquish).
    pub fn clear_if(&mut self, data_id: u32) {
        let idx = self.index(data_id);
        let e = &mut self.entries[idx];
        if e.buf.is_some() && e.data_id == data_id {
            e.buf = None;
            e.locked = false;
            e.data_id = 0;
        }
    }
}
