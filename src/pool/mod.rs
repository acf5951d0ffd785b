//! pool — арена типизированных блоков под одним pool-wide локом.
//!
//! Подмодули:
//! - link.rs  — адресация link-ячеек, операции intrusive-колец.
//! - block.rs — варианты блоков и логические данные бандла.
//! - refs.rs  — лёгкие refptr'ы и block-ссылки с notify-колбэком.
//! - flow.rs  — sub-queue, flows и active-список.
//!
//! Арена нарезается на одинаковые слоты; слоты 0..2 — постоянные головы
//! (free list, recycle list, active flows). Освобождение ленивое: блок
//! попадает в recycle-список дёшево из любого пути, а maintain() разбирает
//! его содержимое (цепочки чанков, canonical-списки, notify у ссылок) и
//! возвращает слоты во free list.

pub mod block;
pub mod flow;
pub mod link;
pub mod refs;

use std::sync::Mutex;

use log::{debug, warn};

use crate::consts::{
    ACTIVE_FLOWS_HEAD_SLOT, ADMIN_SLOT_COUNT, BLOCK_SLOT_SIZE, FREE_HEAD_SLOT,
    GENERIC_DATA_CAPACITY, LINK_CELLS_PER_SLOT, RECYCLE_HEAD_SLOT,
};
use crate::error::PoolError;
use crate::metrics::{record_pool_alloc, record_pool_maintain, record_pool_recycle};

pub use self::block::{
    BlockType, CanonicalBlock, CanonicalLogical, ChunkBlock, DeliveryData, DeliveryPolicy,
    EndpointId, FlowBlock, GenericBlock, NotifyFn, PrimaryBlock, PrimaryLogical, SubqStats,
};
pub use self::flow::FlowDir;
pub use self::link::Link;
pub use self::refs::Refptr;

use self::block::SlotContent;
use self::link::{CellKind, LinkCell};

/// Один слот арены.
pub(crate) struct Slot {
    pub tag: BlockType,
    pub refcount: u32,
    pub cells: [LinkCell; LINK_CELLS_PER_SLOT as usize],
    pub content: SlotContent,
}

pub(crate) struct PoolInner {
    pub(crate) slots: Vec<Slot>,
}

/// Перепись слотов пула; free + in_use + pending_recycle == total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCounts {
    pub total: usize,
    pub free: usize,
    pub in_use: usize,
    pub pending_recycle: usize,
}

/// Пул блоков. Все мутации — под одним внутренним локом.
pub struct Pool {
    inner: Mutex<PoolInner>,
}

#[inline]
fn free_head() -> Link {
    Link::main(FREE_HEAD_SLOT)
}

#[inline]
fn recycle_head() -> Link {
    Link::main(RECYCLE_HEAD_SLOT)
}

#[inline]
pub(crate) fn active_flows_head() -> Link {
    Link::main(ACTIVE_FLOWS_HEAD_SLOT)
}

/// Ёмкость пользовательских данных generic-блока (фиксирована на компиляции).
pub const fn generic_data_capacity() -> usize {
    GENERIC_DATA_CAPACITY
}

impl Pool {
    /// Создать пул, нарезав `pool_size` байт на слоты по BLOCK_SLOT_SIZE.
    /// Первые слоты заняты служебными головами списков.
    pub fn create(pool_size: usize) -> Result<Pool, PoolError> {
        let total = pool_size / BLOCK_SLOT_SIZE;
        if total <= ADMIN_SLOT_COUNT as usize {
            return Err(PoolError::FailedMem);
        }

        let mut inner = PoolInner {
            slots: Vec::with_capacity(total),
        };
        for s in 0..total as u32 {
            let main = Link::main(s);
            let tag = if s < ADMIN_SLOT_COUNT {
                BlockType::Head
            } else {
                BlockType::Undefined
            };
            let kind0 = if s < ADMIN_SLOT_COUNT {
                CellKind::Head
            } else {
                CellKind::Main
            };
            inner.slots.push(Slot {
                tag,
                refcount: 0,
                cells: [
                    LinkCell::singleton(main, kind0),
                    LinkCell::singleton(Link::new(s, 1), CellKind::Unused),
                    LinkCell::singleton(Link::new(s, 2), CellKind::Unused),
                    LinkCell::singleton(Link::new(s, 3), CellKind::Unused),
                ],
                content: SlotContent::None,
            });
        }
        for s in ADMIN_SLOT_COUNT..total as u32 {
            inner.insert_before(free_head(), Link::main(s));
        }

        Ok(Pool {
            inner: Mutex::new(inner),
        })
    }

    // ---------------- allocation ----------------

    /// Выделить primary-блок бандла.
    pub fn alloc_primary(&self) -> Result<Link, PoolError> {
        let mut g = self.inner.lock().unwrap();
        let s = g.alloc_slot().ok_or(PoolError::Exhausted)?;
        g.slots[s as usize].tag = BlockType::Primary;
        g.slots[s as usize].content = SlotContent::Primary(PrimaryBlock::default());
        g.init_list_head(Link::new(s, 1)); // canonical blocks
        g.init_list_head(Link::new(s, 2)); // encoded chunks
        record_pool_alloc();
        Ok(Link::main(s))
    }

    /// Выделить canonical-блок.
    pub fn alloc_canonical(&self) -> Result<Link, PoolError> {
        let mut g = self.inner.lock().unwrap();
        let s = g.alloc_slot().ok_or(PoolError::Exhausted)?;
        g.slots[s as usize].tag = BlockType::Canonical;
        g.slots[s as usize].content = SlotContent::Canonical(CanonicalBlock::default());
        g.init_list_head(Link::new(s, 1)); // encoded chunks
        record_pool_alloc();
        Ok(Link::main(s))
    }

    /// Выделить чанк закодированных CBOR-данных.
    pub fn alloc_cbor_chunk(&self) -> Result<Link, PoolError> {
        let mut g = self.inner.lock().unwrap();
        let s = g.alloc_slot().ok_or(PoolError::Exhausted)?;
        g.slots[s as usize].tag = BlockType::CborData;
        g.slots[s as usize].content = SlotContent::Chunk(ChunkBlock::default());
        record_pool_alloc();
        Ok(Link::main(s))
    }

    /// Выделить пользовательский блок. `magic` проверяется последующими
    /// кастами; `req_capacity` сверяется с ёмкостью слота.
    pub fn alloc_generic(&self, magic: u32, req_capacity: usize) -> Result<Link, PoolError> {
        if req_capacity > GENERIC_DATA_CAPACITY {
            return Err(PoolError::FailedMem);
        }
        let mut g = self.inner.lock().unwrap();
        let s = g.alloc_slot().ok_or(PoolError::Exhausted)?;
        g.slots[s as usize].tag = BlockType::ServiceObject;
        g.slots[s as usize].content = SlotContent::Generic(GenericBlock::new(magic));
        record_pool_alloc();
        Ok(Link::main(s))
    }

    /// Выделить flow с парой sub-queue и secondary link'ом active-списка.
    pub fn alloc_flow(&self, magic: u32, req_capacity: usize) -> Result<Link, PoolError> {
        if req_capacity > GENERIC_DATA_CAPACITY {
            return Err(PoolError::FailedMem);
        }
        let mut g = self.inner.lock().unwrap();
        let s = g.alloc_slot().ok_or(PoolError::Exhausted)?;
        g.slots[s as usize].tag = BlockType::Flow;
        g.slots[s as usize].content = SlotContent::Flow(FlowBlock::new(magic));
        g.init_list_head(Link::new(s, 1)); // input subq
        g.init_list_head(Link::new(s, 2)); // output subq
        g.init_link(Link::new(s, 3), CellKind::Secondary); // active list
        record_pool_alloc();
        Ok(Link::main(s))
    }

    /// Выделить отдельную голову списка (временные цепочки вызывающего кода).
    pub fn alloc_list_head(&self) -> Result<Link, PoolError> {
        let mut g = self.inner.lock().unwrap();
        let s = g.alloc_slot().ok_or(PoolError::Exhausted)?;
        g.slots[s as usize].tag = BlockType::Head;
        g.init_link(Link::main(s), CellKind::Head);
        record_pool_alloc();
        Ok(Link::main(s))
    }

    // ---------------- list ops ----------------

    /// Вставить синглтон node после pos (pos-голова => в начало кольца).
    pub fn insert_after(&self, pos: Link, node: Link) -> Result<(), PoolError> {
        let mut g = self.inner.lock().unwrap();
        g.checked_insert(pos, node, true)
    }

    /// Вставить синглтон node перед pos (pos-голова => в конец кольца).
    pub fn insert_before(&self, pos: Link, node: Link) -> Result<(), PoolError> {
        let mut g = self.inner.lock().unwrap();
        g.checked_insert(pos, node, false)
    }

    /// Извлечь узел из его кольца (идемпотентно).
    pub fn extract(&self, node: Link) -> Result<(), PoolError> {
        let mut g = self.inner.lock().unwrap();
        if !g.link_valid(node) {
            return Err(PoolError::InvalidBlock);
        }
        g.extract(node);
        Ok(())
    }

    /// Слить кольцо src в dst целиком (включая голову src); затем вызывающий
    /// извлекает лишнюю голову через extract().
    pub fn merge(&self, dst: Link, src: Link) -> Result<(), PoolError> {
        let mut g = self.inner.lock().unwrap();
        if !g.link_valid(dst) || !g.link_valid(src) {
            return Err(PoolError::InvalidBlock);
        }
        g.merge(dst, src);
        Ok(())
    }

    /// Блок состоит в каком-либо кольце.
    pub fn is_attached(&self, l: Link) -> bool {
        let g = self.inner.lock().unwrap();
        g.link_valid(l) && g.is_attached(l)
    }

    /// Голова с пустым кольцом.
    pub fn is_empty_list(&self, head: Link) -> bool {
        let g = self.inner.lock().unwrap();
        g.link_valid(head) && g.is_list_head(head) && g.list_is_empty(head)
    }

    /// Обойти кольцо, вызвав f для каждого не-головного узла. При
    /// always_remove узлы предварительно извлекаются, и колбэк обязан
    /// пристроить их (иначе блоки утекут до ближайшего recycle).
    /// Возвращает число посещённых узлов.
    pub fn foreach(
        &self,
        list: Link,
        always_remove: bool,
        mut f: impl FnMut(Link),
    ) -> Result<usize, PoolError> {
        let nodes = {
            let mut g = self.inner.lock().unwrap();
            if !g.link_valid(list) || !g.is_list_head(list) {
                return Err(PoolError::InvalidBlock);
            }
            g.collect_list(list, always_remove)
        };
        for n in &nodes {
            f(*n);
        }
        Ok(nodes.len())
    }

    // ---------------- casts / accessors ----------------

    /// Восстановить владеющий блок: secondary и встроенные ячейки сводятся
    /// к своему слоту, ref-блоки разыменовываются на один шаг.
    pub fn obtain_base(&self, blk: Link) -> Option<Link> {
        let g = self.inner.lock().unwrap();
        g.obtain_base(blk)
    }

    /// Тег блока (Head для головных ячеек).
    pub fn block_type(&self, blk: Link) -> Option<BlockType> {
        let g = self.inner.lock().unwrap();
        if (blk.slot() as usize) >= g.slots.len() {
            return None;
        }
        match g.cell(blk).kind {
            CellKind::Unused => None,
            CellKind::Head => Some(BlockType::Head),
            CellKind::Main | CellKind::Secondary => Some(g.slots[blk.slot() as usize].tag),
        }
    }

    /// Текущий refcount блока (0 у блоков без ссылок).
    pub fn refcount(&self, blk: Link) -> Option<u32> {
        let g = self.inner.lock().unwrap();
        let base = g.cast_base(blk)?;
        Some(g.slots[base.slot() as usize].refcount)
    }

    /// Кастнуть к primary и выполнить f под pool-локом.
    pub fn with_primary<R>(&self, blk: Link, f: impl FnOnce(&mut PrimaryBlock) -> R) -> Option<R> {
        let mut g = self.inner.lock().unwrap();
        let base = g.cast_base(blk)?;
        match &mut g.slots[base.slot() as usize].content {
            SlotContent::Primary(pb) => Some(f(pb)),
            _ => None,
        }
    }

    /// Кастнуть к canonical и выполнить f под pool-локом.
    pub fn with_canonical<R>(
        &self,
        blk: Link,
        f: impl FnOnce(&mut CanonicalBlock) -> R,
    ) -> Option<R> {
        let mut g = self.inner.lock().unwrap();
        let base = g.cast_base(blk)?;
        match &mut g.slots[base.slot() as usize].content {
            SlotContent::Canonical(cb) => Some(f(cb)),
            _ => None,
        }
    }

    /// Кастнуть к flow и выполнить f под pool-локом.
    pub fn with_flow<R>(&self, blk: Link, f: impl FnOnce(&mut FlowBlock) -> R) -> Option<R> {
        let mut g = self.inner.lock().unwrap();
        let base = g.cast_base(blk)?;
        match &mut g.slots[base.slot() as usize].content {
            SlotContent::Flow(fb) => Some(f(fb)),
            _ => None,
        }
    }

    /// Кастнуть к CBOR-чанку и выполнить f под pool-локом.
    pub fn with_chunk<R>(&self, blk: Link, f: impl FnOnce(&mut ChunkBlock) -> R) -> Option<R> {
        let mut g = self.inner.lock().unwrap();
        let base = g.cast_base(blk)?;
        match &mut g.slots[base.slot() as usize].content {
            SlotContent::Chunk(ch) => Some(f(ch)),
            _ => None,
        }
    }

    /// Кастнуть к generic-блоку со сверкой magic.
    pub fn with_generic<R>(
        &self,
        blk: Link,
        required_magic: u32,
        f: impl FnOnce(&mut GenericBlock) -> R,
    ) -> Option<R> {
        let mut g = self.inner.lock().unwrap();
        let base = g.cast_base(blk)?;
        match &mut g.slots[base.slot() as usize].content {
            SlotContent::Generic(gb) if gb.magic == required_magic => Some(f(gb)),
            _ => None,
        }
    }

    /// Размер пользовательских данных блока (чанк либо generic).
    pub fn user_content_size(&self, blk: Link) -> Option<usize> {
        let g = self.inner.lock().unwrap();
        let base = g.cast_base(blk)?;
        match &g.slots[base.slot() as usize].content {
            SlotContent::Chunk(ch) => Some(ch.used),
            SlotContent::Generic(gb) => Some(gb.used),
            _ => None,
        }
    }

    /// Установить длину полезной части CBOR-чанка.
    pub fn set_cbor_content_size(&self, blk: Link, size: usize) -> Result<(), PoolError> {
        if size > crate::consts::MAX_ENCODED_CHUNK_SIZE {
            return Err(PoolError::FailedMem);
        }
        let mut g = self.inner.lock().unwrap();
        let base = g.cast_base(blk).ok_or(PoolError::InvalidBlock)?;
        match &mut g.slots[base.slot() as usize].content {
            SlotContent::Chunk(ch) => {
                ch.used = size;
                Ok(())
            }
            _ => Err(PoolError::InvalidBlock),
        }
    }

    // ---------------- bundle chains ----------------

    /// Голова списка canonical-блоков primary.
    pub fn pri_canonical_list(&self, blk: Link) -> Option<Link> {
        self.typed_head(blk, BlockType::Primary, 1)
    }

    /// Голова цепочки encoded-чанков primary.
    pub fn pri_chunk_list(&self, blk: Link) -> Option<Link> {
        self.typed_head(blk, BlockType::Primary, 2)
    }

    /// Голова цепочки encoded-чанков canonical.
    pub fn canonical_chunk_list(&self, blk: Link) -> Option<Link> {
        self.typed_head(blk, BlockType::Canonical, 1)
    }

    fn typed_head(&self, blk: Link, want: BlockType, cell: u32) -> Option<Link> {
        let g = self.inner.lock().unwrap();
        let base = g.cast_base(blk)?;
        if g.slots[base.slot() as usize].tag == want {
            Some(Link::new(base.slot(), cell))
        } else {
            None
        }
    }

    /// Дописать CBOR-чанк в конец цепочки.
    pub fn append_cbor_block(&self, head: Link, blk: Link) -> Result<(), PoolError> {
        let mut g = self.inner.lock().unwrap();
        if !g.link_valid(head) || !g.is_list_head(head) {
            return Err(PoolError::InvalidBlock);
        }
        let base = g.cast_base(blk).ok_or(PoolError::InvalidBlock)?;
        if !g.slots[base.slot() as usize].tag.is_generic_data() || g.is_attached(base) {
            return Err(PoolError::InvalidBlock);
        }
        g.insert_before(head, base);
        Ok(())
    }

    /// Прицепить canonical к бандлу: в список primary + обратная ссылка.
    pub fn store_canonical_block(&self, primary: Link, canonical: Link) -> Result<(), PoolError> {
        let mut g = self.inner.lock().unwrap();
        let pri = g.cast_base(primary).ok_or(PoolError::InvalidBlock)?;
        let can = g.cast_base(canonical).ok_or(PoolError::InvalidBlock)?;
        if g.slots[pri.slot() as usize].tag != BlockType::Primary
            || g.slots[can.slot() as usize].tag != BlockType::Canonical
            || g.is_attached(can)
        {
            return Err(PoolError::InvalidBlock);
        }
        g.insert_before(Link::new(pri.slot(), 1), can);
        match &mut g.slots[can.slot() as usize].content {
            SlotContent::Canonical(cb) => cb.bundle_ref = Some(pri),
            _ => unreachable!("tag checked above"),
        }
        Ok(())
    }

    /// Слить цепочку encoded-чанков в буфер вызывающего. Пропускает
    /// seek_start байт от начала цепочки, копирует не больше out.len() байт
    /// и посещает не больше max_count чанков (0 — без лимита).
    /// Возвращает число скопированных байт.
    pub fn copy_block_chain(
        &self,
        list: Link,
        out: &mut [u8],
        seek_start: usize,
        max_count: usize,
    ) -> Result<usize, PoolError> {
        let g = self.inner.lock().unwrap();
        if !g.link_valid(list) || !g.is_list_head(list) {
            return Err(PoolError::InvalidBlock);
        }
        let mut skipped = 0usize;
        let mut copied = 0usize;
        let mut visited = 0usize;
        let mut cur = g.next_of(list);
        while cur != list && copied < out.len() {
            if max_count != 0 && visited >= max_count {
                break;
            }
            if let SlotContent::Chunk(ch) = &g.slots[cur.slot() as usize].content {
                visited += 1;
                let mut part = ch.content();
                if skipped < seek_start {
                    let skip = (seek_start - skipped).min(part.len());
                    skipped += skip;
                    part = &part[skip..];
                }
                let n = part.len().min(out.len() - copied);
                out[copied..copied + n].copy_from_slice(&part[..n]);
                copied += n;
            }
            cur = g.next_of(cur);
        }
        Ok(copied)
    }

    /// Сбросить encoded-данные primary (логические данные изменились,
    /// потребуется перекодирование). Чанки уходят на recycle-список.
    pub fn pri_drop_encode_data(&self, blk: Link) -> Result<(), PoolError> {
        let mut g = self.inner.lock().unwrap();
        let base = g.cast_base(blk).ok_or(PoolError::InvalidBlock)?;
        if g.slots[base.slot() as usize].tag != BlockType::Primary {
            return Err(PoolError::InvalidBlock);
        }
        g.splice_into_recycle(Link::new(base.slot(), 2));
        match &mut g.slots[base.slot() as usize].content {
            SlotContent::Primary(pb) => {
                pb.block_encode_size_cache = 0;
                pb.bundle_encode_size_cache = 0;
            }
            _ => unreachable!("tag checked above"),
        }
        record_pool_recycle();
        Ok(())
    }

    /// Сбросить encoded-данные canonical-блока.
    pub fn canonical_drop_encode_data(&self, blk: Link) -> Result<(), PoolError> {
        let mut g = self.inner.lock().unwrap();
        let base = g.cast_base(blk).ok_or(PoolError::InvalidBlock)?;
        if g.slots[base.slot() as usize].tag != BlockType::Canonical {
            return Err(PoolError::InvalidBlock);
        }
        g.splice_into_recycle(Link::new(base.slot(), 1));
        match &mut g.slots[base.slot() as usize].content {
            SlotContent::Canonical(cb) => {
                cb.block_encode_size_cache = 0;
                cb.encoded_content_offset = 0;
                cb.encoded_content_length = 0;
            }
            _ => unreachable!("tag checked above"),
        }
        record_pool_recycle();
        Ok(())
    }

    // ---------------- recycle / maintain ----------------

    /// Отправить блок на recycle-список (дёшево, из любого пути).
    /// Фактический разбор и возврат слота делает maintain().
    /// Выделенную голову (alloc_list_head) возвращайте пустой: её кольцо
    /// здесь не разбирается.
    pub fn recycle_block(&self, blk: Link) -> Result<(), PoolError> {
        let mut g = self.inner.lock().unwrap();
        if (blk.slot() as usize) >= g.slots.len() {
            return Err(PoolError::InvalidBlock);
        }
        let base = match g.cell(blk).kind {
            CellKind::Main => blk,
            CellKind::Head if blk.is_main() => blk,
            CellKind::Secondary => blk.base(),
            _ => return Err(PoolError::InvalidBlock),
        };
        let s = base.slot();
        if s < ADMIN_SLOT_COUNT || g.slots[s as usize].tag == BlockType::Undefined {
            return Err(PoolError::InvalidBlock);
        }
        g.extract(base);
        g.insert_before(recycle_head(), base);
        record_pool_recycle();
        Ok(())
    }

    /// Отправить всё содержимое кольца list на recycle-список.
    /// Сама голова остаётся пустой головой у вызывающего.
    pub fn recycle_all_in_list(&self, list: Link) -> Result<(), PoolError> {
        let mut g = self.inner.lock().unwrap();
        if !g.link_valid(list) || !g.is_list_head(list) {
            return Err(PoolError::InvalidBlock);
        }
        g.splice_into_recycle(list);
        record_pool_recycle();
        Ok(())
    }

    /// Разобрать recycle-список: у ссылок сработают notify-колбэки и
    /// декремент цели, у primary/canonical/flow — рекурсивный разбор их
    /// цепочек; слоты возвращаются во free list. Возвращает число
    /// освобождённых слотов.
    pub fn maintain(&self) -> usize {
        let mut g = self.inner.lock().unwrap();
        let freed = g.maintain_locked();
        record_pool_maintain(freed as u64);
        freed
    }

    /// Перепись слотов (инвариант: free + in_use + pending == total).
    pub fn counts(&self) -> PoolCounts {
        let g = self.inner.lock().unwrap();
        let total = g.slots.len() - ADMIN_SLOT_COUNT as usize;
        let free = g.ring_len(free_head());
        let pending = g.ring_len(recycle_head());
        PoolCounts {
            total,
            free,
            pending_recycle: pending,
            in_use: total - free - pending,
        }
    }

    /// Журнальная перепись состояния арены (диагностика).
    pub fn debug_scan(&self) {
        let g = self.inner.lock().unwrap();
        let mut census = [0usize; 8];
        for s in g.slots.iter().skip(ADMIN_SLOT_COUNT as usize) {
            census[s.tag as usize] += 1;
        }
        debug!(
            "pool scan: free={} head={} ref={} cbor={} service={} primary={} canonical={} flow={}",
            census[0], census[1], census[2], census[3], census[4], census[5], census[6], census[7],
        );
    }
}

impl PoolInner {
    /// Снять первый слот с free list; при пустом списке — разовая
    /// maintenance-попытка пополнения.
    pub(crate) fn alloc_slot(&mut self) -> Option<u32> {
        if self.list_is_empty(free_head()) {
            self.maintain_locked();
        }
        let first = self.next_of(free_head());
        if first == free_head() {
            return None;
        }
        self.extract(first);
        let s = first.slot();
        let slot = &mut self.slots[s as usize];
        slot.refcount = 0;
        slot.content = SlotContent::None;
        self.init_link(first, CellKind::Main);
        Some(s)
    }

    fn checked_insert(&mut self, pos: Link, node: Link, after: bool) -> Result<(), PoolError> {
        if !self.link_valid(pos) || !self.link_valid(node) {
            return Err(PoolError::InvalidBlock);
        }
        if self.is_attached(node) || self.is_list_head(node) {
            return Err(PoolError::InvalidBlock);
        }
        if after {
            self.insert_after(pos, node);
        } else {
            self.insert_before(pos, node);
        }
        Ok(())
    }

    pub(crate) fn cast_base(&self, blk: Link) -> Option<Link> {
        if (blk.slot() as usize) >= self.slots.len() {
            return None;
        }
        match self.cell(blk).kind {
            CellKind::Main => Some(blk),
            CellKind::Secondary => Some(blk.base()),
            _ => None,
        }
    }

    pub(crate) fn obtain_base(&self, blk: Link) -> Option<Link> {
        if (blk.slot() as usize) >= self.slots.len() {
            return None;
        }
        let base = match self.cell(blk).kind {
            CellKind::Unused => return None,
            CellKind::Main => blk,
            CellKind::Head | CellKind::Secondary => blk.base(),
        };
        match &self.slots[base.slot() as usize].content {
            SlotContent::Ref { target, .. } => Some(Link::main(*target)),
            _ => Some(base),
        }
    }

    /// Перелить содержимое кольца head в recycle-список (голова остаётся).
    pub(crate) fn splice_into_recycle(&mut self, head: Link) {
        if self.list_is_empty(head) {
            return;
        }
        self.merge(recycle_head(), head);
        self.extract(head);
    }

    /// Декремент refcount; при нуле цель уходит на recycle-список.
    pub(crate) fn release_count(&mut self, slot: u32) {
        let rc = &mut self.slots[slot as usize].refcount;
        debug_assert!(*rc > 0, "refcount underflow");
        *rc = rc.saturating_sub(1);
        if *rc == 0 {
            let main = Link::main(slot);
            self.extract(main);
            self.insert_before(recycle_head(), main);
        }
    }

    pub(crate) fn maintain_locked(&mut self) -> usize {
        let mut freed = 0usize;
        loop {
            let first = self.next_of(recycle_head());
            if first == recycle_head() {
                break;
            }
            self.extract(first);
            let s = first.slot();

            match self.slots[s as usize].tag {
                BlockType::Ref => {
                    let mut pending: Option<(u32, Option<NotifyFn>)> = None;
                    if let SlotContent::Ref { target, notify } =
                        &mut self.slots[s as usize].content
                    {
                        pending = Some((*target, notify.take()));
                    }
                    if let Some((t, n)) = pending {
                        if let Some(mut f) = n {
                            f(Link::main(t));
                        }
                        self.release_count(t);
                    }
                }
                BlockType::Primary => {
                    self.splice_into_recycle(Link::new(s, 1));
                    self.splice_into_recycle(Link::new(s, 2));
                }
                BlockType::Canonical => {
                    self.splice_into_recycle(Link::new(s, 1));
                }
                BlockType::Flow => {
                    self.extract(Link::new(s, 3));
                    self.splice_into_recycle(Link::new(s, 1));
                    self.splice_into_recycle(Link::new(s, 2));
                }
                _ => {}
            }

            let slot = &mut self.slots[s as usize];
            if slot.tag.is_content() && slot.refcount > 0 {
                // Живые ссылки на блок: слот не возвращаем, блок числится
                // занятым до release последней ссылки.
                warn!(
                    "maintain: block in slot {} recycled with refcount {}",
                    s, slot.refcount
                );
                continue;
            }
            self.free_slot(s);
            freed += 1;
        }
        freed
    }

    fn free_slot(&mut self, s: u32) {
        let main = Link::main(s);
        self.slots[s as usize].tag = BlockType::Undefined;
        self.slots[s as usize].refcount = 0;
        self.slots[s as usize].content = SlotContent::None;
        self.init_link(main, CellKind::Main);
        for c in 1..LINK_CELLS_PER_SLOT {
            self.init_link(Link::new(s, c), CellKind::Unused);
        }
        self.insert_before(free_head(), main);
    }

    pub(crate) fn ring_len(&self, head: Link) -> usize {
        let mut n = 0usize;
        let mut cur = self.next_of(head);
        while cur != head {
            n += 1;
            cur = self.next_of(cur);
        }
        n
    }
}
