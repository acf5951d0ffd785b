//! pool/link — адресация link-ячеек и операции над intrusive-списками.
//!
//! Вместо сырых указателей блок адресуется парой (слот, ячейка), упакованной
//! в `Link`. Ячейка 0 — собственная связь блока; ячейки 1..3 — встроенные
//! головы списков (цепочки чанков, sub-queue) либо secondary link, несущий
//! блок во втором индексе (active-список). `Link::base()` восстанавливает
//! владеющий блок из любой ячейки — замена арифметики смещений оригинала.
//!
//! Инварианты колец:
//! - всякий блок — либо голова, либо синглтон, либо не-головный член ровно
//!   одного кольца;
//! - next(singleton) == self;
//! - extract() идемпотентен и всегда оставляет синглтон.

use crate::consts::LINK_CELLS_PER_SLOT;

use super::PoolInner;

/// Хэндл link-ячейки: slot * LINK_CELLS_PER_SLOT + cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link(u32);

impl Link {
    #[inline]
    pub(crate) fn new(slot: u32, cell: u32) -> Self {
        debug_assert!(cell < LINK_CELLS_PER_SLOT);
        Link(slot * LINK_CELLS_PER_SLOT + cell)
    }

    /// Main-link слота (ячейка 0).
    #[inline]
    pub(crate) fn main(slot: u32) -> Self {
        Link::new(slot, 0)
    }

    #[inline]
    pub(crate) fn slot(self) -> u32 {
        self.0 / LINK_CELLS_PER_SLOT
    }

    #[inline]
    pub(crate) fn cell(self) -> u32 {
        self.0 % LINK_CELLS_PER_SLOT
    }

    /// Владеющий блок этой ячейки (main-link того же слота).
    #[inline]
    pub fn base(self) -> Link {
        Link::main(self.slot())
    }

    #[inline]
    pub(crate) fn is_main(self) -> bool {
        self.cell() == 0
    }
}

/// Роль link-ячейки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellKind {
    /// Не используется текущим вариантом блока.
    Unused,
    /// Собственная связь блока (ячейка 0).
    Main,
    /// Голова кольца (выделенная либо встроенная).
    Head,
    /// Secondary link: несёт блок во втором кольце.
    Secondary,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LinkCell {
    pub kind: CellKind,
    pub next: Link,
    pub prev: Link,
}

impl LinkCell {
    pub(crate) fn singleton(at: Link, kind: CellKind) -> Self {
        Self {
            kind,
            next: at,
            prev: at,
        }
    }
}

impl PoolInner {
    #[inline]
    pub(crate) fn cell(&self, l: Link) -> &LinkCell {
        &self.slots[l.slot() as usize].cells[l.cell() as usize]
    }

    #[inline]
    pub(crate) fn cell_mut(&mut self, l: Link) -> &mut LinkCell {
        &mut self.slots[l.slot() as usize].cells[l.cell() as usize]
    }

    /// Ссылка валидна: слот в арене и ячейка задействована.
    pub(crate) fn link_valid(&self, l: Link) -> bool {
        (l.slot() as usize) < self.slots.len() && self.cell(l).kind != CellKind::Unused
    }

    /// Сделать ячейку синглтоном заданной роли.
    pub(crate) fn init_link(&mut self, l: Link, kind: CellKind) {
        *self.cell_mut(l) = LinkCell::singleton(l, kind);
    }

    /// Инициализировать ячейку пустой головой кольца.
    pub(crate) fn init_list_head(&mut self, l: Link) {
        self.init_link(l, CellKind::Head);
    }

    #[inline]
    pub(crate) fn is_list_head(&self, l: Link) -> bool {
        self.cell(l).kind == CellKind::Head
    }

    /// Блок состоит в кольце (не синглтон).
    #[inline]
    pub(crate) fn is_attached(&self, l: Link) -> bool {
        self.cell(l).next != l
    }

    #[inline]
    pub(crate) fn list_is_empty(&self, head: Link) -> bool {
        !self.is_attached(head)
    }

    #[inline]
    pub(crate) fn next_of(&self, l: Link) -> Link {
        self.cell(l).next
    }

    /// Вставить синглтон node сразу после pos (для головы — в начало кольца).
    pub(crate) fn insert_after(&mut self, pos: Link, node: Link) {
        debug_assert!(!self.is_attached(node));
        let pos_next = self.cell(pos).next;
        {
            let n = self.cell_mut(node);
            n.next = pos_next;
            n.prev = pos;
        }
        self.cell_mut(pos).next = node;
        self.cell_mut(pos_next).prev = node;
    }

    /// Вставить синглтон node перед pos (для головы — в конец кольца).
    pub(crate) fn insert_before(&mut self, pos: Link, node: Link) {
        debug_assert!(!self.is_attached(node));
        let pos_prev = self.cell(pos).prev;
        {
            let n = self.cell_mut(node);
            n.next = pos;
            n.prev = pos_prev;
        }
        self.cell_mut(pos_prev).next = node;
        self.cell_mut(pos).prev = node;
    }

    /// Извлечь node из его кольца; после вызова node — синглтон.
    /// Идемпотентен.
    pub(crate) fn extract(&mut self, node: Link) {
        let (next, prev) = {
            let c = self.cell(node);
            (c.next, c.prev)
        };
        self.cell_mut(prev).next = next;
        self.cell_mut(next).prev = prev;
        let c = self.cell_mut(node);
        c.next = node;
        c.prev = node;
    }

    /// Слить два кольца целиком, включая обе головы. После слияния
    /// вызывающий извлекает одну из голов (extract).
    pub(crate) fn merge(&mut self, dst: Link, src: Link) {
        let dst_last = self.cell(dst).prev;
        let src_last = self.cell(src).prev;
        self.cell_mut(dst).prev = src_last;
        self.cell_mut(src_last).next = dst;
        self.cell_mut(src).prev = dst_last;
        self.cell_mut(dst_last).next = src;
    }

    /// Обойти кольцо head, собрав все не-головные узлы в порядке обхода.
    /// При always_remove каждый узел извлекается (становится синглтоном).
    pub(crate) fn collect_list(&mut self, head: Link, always_remove: bool) -> Vec<Link> {
        let mut out = Vec::new();
        let mut cur = self.next_of(head);
        while cur != head {
            let next = self.next_of(cur);
            out.push(cur);
            if always_remove {
                self.extract(cur);
            }
            cur = next;
        }
        out
    }
}
