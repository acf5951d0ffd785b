//! pool/flow — sub-queue бандлов и active-список потоков.
//!
//! Каждый flow несёт пару sub-queue (input/output): кольца block-ссылок с
//! учётом push/pop/drop и глубиной high-water. Переполнение лимита глубины
//! отбрасывает вставку с ошибкой QueueFull. Active-список пула позволяет
//! форвардеру обходить только те потоки, у которых есть работа: flow
//! зацепляется secondary link'ом (ячейка 3) и снимается при обработке.

use log::debug;

use crate::error::PoolError;
use crate::metrics::{record_subq_drop, record_subq_push};

use super::block::{SlotContent, SubqStats};
use super::link::Link;
use super::{active_flows_head, BlockType, Pool, PoolInner};

/// Сторона flow: входная либо выходная sub-queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDir {
    Input,
    Output,
}

impl FlowDir {
    #[inline]
    fn cell(self) -> u32 {
        match self {
            FlowDir::Input => 1,
            FlowDir::Output => 2,
        }
    }
}

impl PoolInner {
    fn flow_slot(&self, blk: Link) -> Option<u32> {
        let base = self.cast_base(blk)?;
        let s = base.slot();
        if self.slots[s as usize].tag == BlockType::Flow {
            Some(s)
        } else {
            None
        }
    }
}

impl Pool {
    /// Голова кольца запрошенной sub-queue.
    pub fn flow_subq_list(&self, flow: Link, dir: FlowDir) -> Option<Link> {
        let g = self.inner.lock().unwrap();
        let s = g.flow_slot(flow)?;
        Some(Link::new(s, dir.cell()))
    }

    /// Поставить block-ссылку в хвост sub-queue. При достигнутом лимите
    /// глубины вставка отбрасывается (учитывается в dropped) с QueueFull.
    pub fn append_subq_bundle(
        &self,
        flow: Link,
        dir: FlowDir,
        rblk: Link,
    ) -> Result<(), PoolError> {
        let mut g = self.inner.lock().unwrap();
        let s = g.flow_slot(flow).ok_or(PoolError::InvalidBlock)?;
        let node = g.cast_base(rblk).ok_or(PoolError::InvalidBlock)?;
        if g.slots[node.slot() as usize].tag != BlockType::Ref || g.is_attached(node) {
            return Err(PoolError::InvalidBlock);
        }

        let fb = match &mut g.slots[s as usize].content {
            SlotContent::Flow(fb) => fb,
            _ => return Err(PoolError::InvalidBlock),
        };
        let st = match dir {
            FlowDir::Input => &mut fb.input,
            FlowDir::Output => &mut fb.output,
        };
        if st.depth() >= st.current_depth_limit {
            st.stats.dropped += 1;
            record_subq_drop();
            return Err(PoolError::QueueFull);
        }
        st.stats.pushed += 1;
        let depth = st.depth();
        if depth > st.stats.high_water {
            st.stats.high_water = depth;
        }

        g.insert_before(Link::new(s, dir.cell()), node);
        record_subq_push();
        Ok(())
    }

    /// Снять головную block-ссылку из sub-queue; None, если очередь пуста.
    pub fn shift_subq_bundle(&self, flow: Link, dir: FlowDir) -> Option<Link> {
        let mut g = self.inner.lock().unwrap();
        let s = g.flow_slot(flow)?;
        let head = Link::new(s, dir.cell());
        let first = g.next_of(head);
        if first == head {
            return None;
        }
        g.extract(first);
        match &mut g.slots[s as usize].content {
            SlotContent::Flow(fb) => {
                let st = match dir {
                    FlowDir::Input => &mut fb.input,
                    FlowDir::Output => &mut fb.output,
                };
                st.stats.pulled += 1;
            }
            _ => unreachable!("flow tag checked"),
        }
        Some(first)
    }

    /// Статистика sub-queue (снимок).
    pub fn subq_stats(&self, flow: Link, dir: FlowDir) -> Option<SubqStats> {
        let g = self.inner.lock().unwrap();
        let s = g.flow_slot(flow)?;
        match &g.slots[s as usize].content {
            SlotContent::Flow(fb) => Some(match dir {
                FlowDir::Input => fb.input.stats,
                FlowDir::Output => fb.output.stats,
            }),
            _ => None,
        }
    }

    /// Текущая глубина sub-queue.
    pub fn subq_depth(&self, flow: Link, dir: FlowDir) -> Option<usize> {
        let g = self.inner.lock().unwrap();
        let s = g.flow_slot(flow)?;
        match &g.slots[s as usize].content {
            SlotContent::Flow(fb) => Some(match dir {
                FlowDir::Input => fb.input.depth(),
                FlowDir::Output => fb.output.depth(),
            }),
            _ => None,
        }
    }

    /// Установить лимит глубины sub-queue.
    pub fn set_subq_depth_limit(
        &self,
        flow: Link,
        dir: FlowDir,
        limit: usize,
    ) -> Result<(), PoolError> {
        let mut g = self.inner.lock().unwrap();
        let s = g.flow_slot(flow).ok_or(PoolError::InvalidBlock)?;
        match &mut g.slots[s as usize].content {
            SlotContent::Flow(fb) => {
                let st = match dir {
                    FlowDir::Input => &mut fb.input,
                    FlowDir::Output => &mut fb.output,
                };
                st.current_depth_limit = limit;
                Ok(())
            }
            _ => Err(PoolError::InvalidBlock),
        }
    }

    /// Зацепить flow на active-список пула (идемпотентно): его обработает
    /// ближайший process_all_flows().
    pub fn mark_flow_active(&self, flow: Link) -> Result<(), PoolError> {
        let mut g = self.inner.lock().unwrap();
        let s = g.flow_slot(flow).ok_or(PoolError::InvalidBlock)?;
        let sec = Link::new(s, 3);
        if !g.is_attached(sec) {
            g.insert_before(active_flows_head(), sec);
        }
        Ok(())
    }

    /// Журнальная сводка статистики обеих sub-queue потока (диагностика).
    pub fn debug_print_queue_stats(&self, flow: Link, label: &str) {
        let (i, o) = match (
            self.subq_stats(flow, FlowDir::Input),
            self.subq_stats(flow, FlowDir::Output),
        ) {
            (Some(i), Some(o)) => (i, o),
            _ => return,
        };
        debug!(
            "{}: in pushed={} pulled={} dropped={} hw={} | out pushed={} pulled={} dropped={} hw={}",
            label,
            i.pushed,
            i.pulled,
            i.dropped,
            i.high_water,
            o.pushed,
            o.pulled,
            o.dropped,
            o.high_water,
        );
    }

    /// Снять и обработать все активные потоки: active-список опустошается,
    /// форвардер вызывается для каждого flow-блока (вне pool-лока).
    /// Возвращает число обработанных потоков.
    pub fn process_all_flows(&self, mut forwarder: impl FnMut(Link)) -> usize {
        let flows: Vec<Link> = {
            let mut g = self.inner.lock().unwrap();
            g.collect_list(active_flows_head(), true)
                .into_iter()
                .map(|sec| sec.base())
                .collect()
        };
        for f in &flows {
            forwarder(*f);
        }
        flows.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::consts::{ADMIN_SLOT_COUNT, BLOCK_SLOT_SIZE};
    use crate::error::PoolError;

    use super::super::Pool;
    use super::FlowDir;

    fn small_pool(slots: usize) -> Pool {
        Pool::create((slots + ADMIN_SLOT_COUNT as usize) * BLOCK_SLOT_SIZE).unwrap()
    }

    fn queued_ref(pool: &Pool) -> (crate::pool::Refptr, crate::pool::Link) {
        let blk = pool.alloc_cbor_chunk().unwrap();
        let rp = pool.make_dynamic(blk).unwrap();
        let rb = pool.make_block_ref(&rp, None).unwrap();
        (rp, rb)
    }

    #[test]
    fn subq_fifo_and_stats() {
        let pool = small_pool(12);
        let flow = pool.alloc_flow(0xF10, 0).unwrap();

        let (rp1, rb1) = queued_ref(&pool);
        let (rp2, rb2) = queued_ref(&pool);
        pool.append_subq_bundle(flow, FlowDir::Input, rb1).unwrap();
        pool.append_subq_bundle(flow, FlowDir::Input, rb2).unwrap();

        assert_eq!(pool.subq_depth(flow, FlowDir::Input), Some(2));
        let st = pool.subq_stats(flow, FlowDir::Input).unwrap();
        assert_eq!(st.pushed, 2);
        assert_eq!(st.high_water, 2);

        assert_eq!(pool.shift_subq_bundle(flow, FlowDir::Input), Some(rb1));
        assert_eq!(pool.shift_subq_bundle(flow, FlowDir::Input), Some(rb2));
        assert_eq!(pool.shift_subq_bundle(flow, FlowDir::Input), None);
        let st = pool.subq_stats(flow, FlowDir::Input).unwrap();
        assert_eq!(st.pulled, 2);

        pool.recycle_block(rb1).unwrap();
        pool.recycle_block(rb2).unwrap();
        pool.release_light(rp1);
        pool.release_light(rp2);
        pool.maintain();
    }

    #[test]
    fn depth_limit_drops_and_counts() {
        let pool = small_pool(12);
        let flow = pool.alloc_flow(0xF10, 0).unwrap();
        pool.set_subq_depth_limit(flow, FlowDir::Output, 1).unwrap();

        let (rp1, rb1) = queued_ref(&pool);
        let (rp2, rb2) = queued_ref(&pool);
        pool.append_subq_bundle(flow, FlowDir::Output, rb1).unwrap();
        assert_eq!(
            pool.append_subq_bundle(flow, FlowDir::Output, rb2),
            Err(PoolError::QueueFull)
        );
        let st = pool.subq_stats(flow, FlowDir::Output).unwrap();
        assert_eq!(st.dropped, 1);
        assert_eq!(pool.subq_depth(flow, FlowDir::Output), Some(1));

        // Отклонённая ссылка осталась у вызывающего.
        pool.recycle_block(rb2).unwrap();
        pool.release_light(rp2);
        pool.recycle_block(pool.shift_subq_bundle(flow, FlowDir::Output).unwrap())
            .unwrap();
        pool.release_light(rp1);
        pool.maintain();
    }

    #[test]
    fn active_list_drains_on_process() {
        let pool = small_pool(8);
        let f1 = pool.alloc_flow(0xA, 0).unwrap();
        let f2 = pool.alloc_flow(0xB, 0).unwrap();

        pool.mark_flow_active(f1).unwrap();
        pool.mark_flow_active(f1).unwrap(); // идемпотентно
        pool.mark_flow_active(f2).unwrap();

        let mut seen = Vec::new();
        let n = pool.process_all_flows(|fl| seen.push(fl));
        assert_eq!(n, 2);
        assert_eq!(seen, vec![f1, f2]);

        // Список очищен: повторный проход пуст.
        assert_eq!(pool.process_all_flows(|_| {}), 0);
    }

    #[test]
    fn flow_recycle_releases_queued_refs() {
        let pool = small_pool(12);
        let flow = pool.alloc_flow(0xF10, 0).unwrap();
        let (rp, rb) = queued_ref(&pool);
        pool.append_subq_bundle(flow, FlowDir::Input, rb).unwrap();
        pool.mark_flow_active(flow).unwrap();

        pool.recycle_block(flow).unwrap();
        pool.maintain();
        // Ссылка из очереди утилизована, цель держится лёгкой ссылкой.
        assert_eq!(pool.counts().in_use, 1);

        pool.release_light(rp);
        pool.maintain();
        assert_eq!(pool.counts().free, 12);
    }
}
