//! Lightweight global metrics.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Block pool (alloc/recycle/maintain)
//! - Sub-queues (push/drop)
//! - File store (enqueue/dequeue/retrieve)
//! - Reclaim cache (hits/misses/evictions)
//! - Chapter reclamation

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Pool -----
static POOL_ALLOCS_TOTAL: AtomicU64 = AtomicU64::new(0);
static POOL_RECYCLES_TOTAL: AtomicU64 = AtomicU64::new(0);
static POOL_MAINTAIN_RUNS: AtomicU64 = AtomicU64::new(0);
static POOL_BLOCKS_FREED: AtomicU64 = AtomicU64::new(0);

// ----- Sub-queues -----
static SUBQ_PUSHES: AtomicU64 = AtomicU64::new(0);
static SUBQ_DROPS: AtomicU64 = AtomicU64::new(0);

// ----- Store -----
static STORE_ENQUEUES: AtomicU64 = AtomicU64::new(0);
static STORE_ENQUEUE_BYTES: AtomicU64 = AtomicU64::new(0);
static STORE_DEQUEUES: AtomicU64 = AtomicU64::new(0);
static STORE_RETRIEVES: AtomicU64 = AtomicU64::new(0);

// ----- Reclaim cache -----
static CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static CACHE_MISSES: AtomicU64 = AtomicU64::new(0);
static CACHE_EVICTIONS: AtomicU64 = AtomicU64::new(0);

// ----- Chapters -----
static CHAPTERS_RECLAIMED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    // Pool
    pub pool_allocs_total: u64,
    pub pool_recycles_total: u64,
    pub pool_maintain_runs: u64,
    pub pool_blocks_freed: u64,

    // Sub-queues
    pub subq_pushes: u64,
    pub subq_drops: u64,

    // Store
    pub store_enqueues: u64,
    pub store_enqueue_bytes: u64,
    pub store_dequeues: u64,
    pub store_retrieves: u64,

    // Reclaim cache
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,

    // Chapters
    pub chapters_reclaimed: u64,
}

impl MetricsSnapshot {
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    pub fn avg_enqueue_bytes(&self) -> f64 {
        if self.store_enqueues == 0 {
            0.0
        } else {
            self.store_enqueue_bytes as f64 / self.store_enqueues as f64
        }
    }
}

// ----- Recorders (pool) -----

pub fn record_pool_alloc() {
    POOL_ALLOCS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_pool_recycle() {
    POOL_RECYCLES_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_pool_maintain(blocks_freed: u64) {
    POOL_MAINTAIN_RUNS.fetch_add(1, Ordering::Relaxed);
    POOL_BLOCKS_FREED.fetch_add(blocks_freed, Ordering::Relaxed);
}

// ----- Recorders (sub-queues) -----

pub fn record_subq_push() {
    SUBQ_PUSHES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_subq_drop() {
    SUBQ_DROPS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (store) -----

pub fn record_store_enqueue(bytes: usize) {
    STORE_ENQUEUES.fetch_add(1, Ordering::Relaxed);
    STORE_ENQUEUE_BYTES.fetch_add(bytes as u64, Ordering::Relaxed);
}

pub fn record_store_dequeue() {
    STORE_DEQUEUES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_store_retrieve() {
    STORE_RETRIEVES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (cache) -----

pub fn record_cache_hit() {
    CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_cache_miss() {
    CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_cache_eviction() {
    CACHE_EVICTIONS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (chapters) -----

pub fn record_chapter_reclaimed() {
    CHAPTERS_RECLAIMED.fetch_add(1, Ordering::Relaxed);
}

/// Снять консистентный снапшот всех счётчиков.
pub fn metrics_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        pool_allocs_total: POOL_ALLOCS_TOTAL.load(Ordering::Relaxed),
        pool_recycles_total: POOL_RECYCLES_TOTAL.load(Ordering::Relaxed),
        pool_maintain_runs: POOL_MAINTAIN_RUNS.load(Ordering::Relaxed),
        pool_blocks_freed: POOL_BLOCKS_FREED.load(Ordering::Relaxed),

        subq_pushes: SUBQ_PUSHES.load(Ordering::Relaxed),
        subq_drops: SUBQ_DROPS.load(Ordering::Relaxed),

        store_enqueues: STORE_ENQUEUES.load(Ordering::Relaxed),
        store_enqueue_bytes: STORE_ENQUEUE_BYTES.load(Ordering::Relaxed),
        store_dequeues: STORE_DEQUEUES.load(Ordering::Relaxed),
        store_retrieves: STORE_RETRIEVES.load(Ordering::Relaxed),

        cache_hits: CACHE_HITS.load(Ordering::Relaxed),
        cache_misses: CACHE_MISSES.load(Ordering::Relaxed),
        cache_evictions: CACHE_EVICTIONS.load(Ordering::Relaxed),

        chapters_reclaimed: CHAPTERS_RECLAIMED.load(Ordering::Relaxed),
    }
}

/// Обнулить все счётчики (тесты/диагностика).
pub fn metrics_reset() {
    POOL_ALLOCS_TOTAL.store(0, Ordering::Relaxed);
    POOL_RECYCLES_TOTAL.store(0, Ordering::Relaxed);
    POOL_MAINTAIN_RUNS.store(0, Ordering::Relaxed);
    POOL_BLOCKS_FREED.store(0, Ordering::Relaxed);
    SUBQ_PUSHES.store(0, Ordering::Relaxed);
    SUBQ_DROPS.store(0, Ordering::Relaxed);
    STORE_ENQUEUES.store(0, Ordering::Relaxed);
    STORE_ENQUEUE_BYTES.store(0, Ordering::Relaxed);
    STORE_DEQUEUES.store(0, Ordering::Relaxed);
    STORE_RETRIEVES.store(0, Ordering::Relaxed);
    CACHE_HITS.store(0, Ordering::Relaxed);
    CACHE_MISSES.store(0, Ordering::Relaxed);
    CACHE_EVICTIONS.store(0, Ordering::Relaxed);
    CHAPTERS_RECLAIMED.store(0, Ordering::Relaxed);
}
