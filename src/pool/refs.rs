//! pool/refs — два вида ссылок на content-блоки.
//!
//! Лёгкая ссылка (Refptr) не занимает слот: это хэндл цели плюс инвариант
//! «держатель владеет одним счётчиком». Block-ссылка занимает слот типа Ref
//! и потому может состоять в кольцах (sub-queue, storage-очереди); при её
//! утилизации maintain() ровно один раз вызывает notify-колбэк и снимает
//! один счётчик с цели. Цель возвращается в пул при достижении нуля.

use crate::error::PoolError;
use crate::metrics::record_pool_alloc;

use super::block::{NotifyFn, SlotContent};
use super::link::{CellKind, Link};
use super::{BlockType, Pool};

/// Лёгкая ссылка: держит один refcount цели, слот не занимает.
/// Не копируется; дубликат — только через Pool::duplicate_light().
/// Обязана быть возвращена через Pool::release_light(): просто брошенный
/// Refptr навсегда оставляет цель занятой.
#[derive(Debug)]
pub struct Refptr {
    slot: u32,
}

impl Refptr {
    /// Целевой блок ссылки.
    #[inline]
    pub fn target(&self) -> Link {
        Link::main(self.slot)
    }
}

impl Pool {
    /// Принять свежевыделенный content-блок под управление пула:
    /// счётчик = 1, возвращается лёгкая ссылка. После вызова блок
    /// используется только через ссылки.
    pub fn make_dynamic(&self, blk: Link) -> Result<Refptr, PoolError> {
        let mut g = self.inner.lock().unwrap();
        let base = g.cast_base(blk).ok_or(PoolError::InvalidBlock)?;
        let s = base.slot();
        if !g.slots[s as usize].tag.is_content()
            || g.slots[s as usize].refcount != 0
            || g.is_attached(base)
        {
            return Err(PoolError::InvalidBlock);
        }
        g.slots[s as usize].refcount = 1;
        Ok(Refptr { slot: s })
    }

    /// Дубликат лёгкой ссылки (инкремент счётчика цели).
    pub fn duplicate_light(&self, ptr: &Refptr) -> Refptr {
        let mut g = self.inner.lock().unwrap();
        g.slots[ptr.slot as usize].refcount += 1;
        Refptr { slot: ptr.slot }
    }

    /// Вернуть лёгкую ссылку. При нулевом счётчике цель уходит на
    /// recycle-список; её цепочки разберёт maintain().
    pub fn release_light(&self, ptr: Refptr) {
        let mut g = self.inner.lock().unwrap();
        g.release_count(ptr.slot);
    }

    /// Выделить block-ссылку на цель лёгкой ссылки. Ссылка пригодна для
    /// колец; notify (если задан) сработает ровно один раз при её
    /// утилизации. Счётчик цели инкрементируется.
    pub fn make_block_ref(
        &self,
        ptr: &Refptr,
        notify: Option<NotifyFn>,
    ) -> Result<Link, PoolError> {
        let mut g = self.inner.lock().unwrap();
        let s = g.alloc_slot().ok_or(PoolError::Exhausted)?;
        g.slots[s as usize].tag = BlockType::Ref;
        g.slots[s as usize].content = SlotContent::Ref {
            target: ptr.slot,
            notify,
        };
        g.slots[ptr.slot as usize].refcount += 1;
        record_pool_alloc();
        Ok(Link::main(s))
    }

    /// Получить свежую лёгкую ссылку из block-ссылки (инкремент цели).
    pub fn duplicate_block_ref(&self, rblk: Link) -> Option<Refptr> {
        let mut g = self.inner.lock().unwrap();
        if (rblk.slot() as usize) >= g.slots.len() || g.cell(rblk).kind != CellKind::Main {
            return None;
        }
        let target = match &g.slots[rblk.slot() as usize].content {
            SlotContent::Ref { target, .. } => *target,
            _ => return None,
        };
        g.slots[target as usize].refcount += 1;
        Some(Refptr { slot: target })
    }
}
