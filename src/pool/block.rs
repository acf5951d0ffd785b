//! pool/block — типы блоков и их содержимое.
//!
//! Все варианты живут в одном слоте арены (размер слота = максимальный
//! вариант), поэтому любой слот взаимозаменяем с любым другим. Generic-блоки
//! несут magic-число вызывающего кода: последующие касты сверяют его как
//! проверку целостности типа.

use crate::consts::{
    GENERIC_DATA_CAPACITY, MAX_ENCODED_CHUNK_SIZE, TAG_CANONICAL, TAG_CBOR_DATA, TAG_FLOW,
    TAG_HEAD, TAG_MAX, TAG_PRIMARY, TAG_REF, TAG_SERVICE_OBJECT, TAG_UNDEFINED,
};

use super::link::Link;

/// Тег блока. Порядок значим: теги в [CborData, Flow] — content-блоки,
/// допускающие refcount (range check).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BlockType {
    Undefined = TAG_UNDEFINED,
    Head = TAG_HEAD,
    Ref = TAG_REF,
    CborData = TAG_CBOR_DATA,
    ServiceObject = TAG_SERVICE_OBJECT,
    Primary = TAG_PRIMARY,
    Canonical = TAG_CANONICAL,
    Flow = TAG_FLOW,
}

impl BlockType {
    /// Блок с содержимым (refcount-capable).
    #[inline]
    pub fn is_content(self) -> bool {
        (self as u8) >= TAG_CBOR_DATA && (self as u8) < TAG_MAX
    }

    /// Бинарные данные (CBOR-чанк либо пользовательский объект).
    #[inline]
    pub fn is_generic_data(self) -> bool {
        matches!(self, BlockType::CborData | BlockType::ServiceObject)
    }
}

/// ipn-scheme endpoint id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointId {
    pub node: u64,
    pub service: u64,
}

impl EndpointId {
    pub fn new(node: u64, service: u64) -> Self {
        Self { node, service }
    }
}

/// Политика доставки бандла.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    #[default]
    None,
    LocalCustody,
    CustodyTracking,
}

/// Логические поля primary-блока (v7).
#[derive(Debug, Clone, Default)]
pub struct PrimaryLogical {
    pub version: u8,
    pub flags: u32,
    pub crc_type: u8,
    pub destination: EndpointId,
    pub source: EndpointId,
    pub report_to: EndpointId,
    pub creation_time: u64,
    pub creation_sequence: u64,
    pub lifetime: u64,
    pub fragment_offset: u64,
    pub total_adu_length: u64,
}

/// Метаданные доставки, сопровождающие бандл через узел.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryData {
    pub delivery_policy: DeliveryPolicy,
    pub ingress_intf_id: u32,
    pub egress_intf_id: u32,
    pub storage_intf_id: u32,
    pub committed_storage_id: u64,
    pub local_retx_interval: u64,
    pub ingress_time: u64,
    pub egress_time: u64,
}

/// Primary-блок: логические данные + доставка + кэши размеров кодирования.
/// Списки canonical-блоков и encoded-чанков — встроенные головы
/// (ячейки 1 и 2 слота).
#[derive(Debug, Default)]
pub struct PrimaryBlock {
    pub logical: PrimaryLogical,
    pub delivery: DeliveryData,
    pub block_encode_size_cache: usize,
    pub bundle_encode_size_cache: usize,
}

/// Логические поля canonical-блока.
#[derive(Debug, Clone, Default)]
pub struct CanonicalLogical {
    pub block_type_code: u8,
    pub block_num: u64,
    pub flags: u32,
    pub crc_type: u8,
}

/// Canonical-блок: обратная ссылка на владеющий primary, смещение и длина
/// контента внутри цепочки чанков (ячейка 1 слота — голова цепочки).
#[derive(Debug, Default)]
pub struct CanonicalBlock {
    pub logical: CanonicalLogical,
    pub bundle_ref: Option<Link>,
    pub block_encode_size_cache: usize,
    pub encoded_content_offset: usize,
    pub encoded_content_length: usize,
}

/// Чанк закодированных данных (<= MAX_ENCODED_CHUNK_SIZE байт).
#[derive(Debug)]
pub struct ChunkBlock {
    pub data: [u8; MAX_ENCODED_CHUNK_SIZE],
    pub used: usize,
}

impl Default for ChunkBlock {
    fn default() -> Self {
        Self {
            data: [0u8; MAX_ENCODED_CHUNK_SIZE],
            used: 0,
        }
    }
}

impl ChunkBlock {
    /// Заполненная часть чанка.
    #[inline]
    pub fn content(&self) -> &[u8] {
        &self.data[..self.used]
    }

    /// Записать содержимое с начала чанка. Err, если не помещается.
    pub fn set_content(&mut self, bytes: &[u8]) -> Result<(), crate::error::PoolError> {
        if bytes.len() > MAX_ENCODED_CHUNK_SIZE {
            return Err(crate::error::PoolError::FailedMem);
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.used = bytes.len();
        Ok(())
    }
}

/// Пользовательский объект с magic-валидацией типа.
#[derive(Debug)]
pub struct GenericBlock {
    pub magic: u32,
    pub data: [u8; GENERIC_DATA_CAPACITY],
    pub used: usize,
}

impl GenericBlock {
    pub(crate) fn new(magic: u32) -> Self {
        Self {
            magic,
            data: [0u8; GENERIC_DATA_CAPACITY],
            used: 0,
        }
    }

    #[inline]
    pub fn content(&self) -> &[u8] {
        &self.data[..self.used]
    }
}

/// Статистика sub-queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubqStats {
    pub pushed: u64,
    pub pulled: u64,
    pub dropped: u64,
    pub high_water: usize,
}

/// Состояние одной sub-queue (голова списка — встроенная ячейка слота flow).
#[derive(Debug)]
pub(crate) struct SubqState {
    pub stats: SubqStats,
    pub current_depth_limit: usize,
}

impl Default for SubqState {
    fn default() -> Self {
        Self {
            stats: SubqStats::default(),
            current_depth_limit: usize::MAX,
        }
    }
}

impl SubqState {
    #[inline]
    pub fn depth(&self) -> usize {
        (self.stats.pushed - self.stats.pulled) as usize
    }
}

/// Flow: внешний id, пара sub-queue (ячейки 1/2) и secondary link
/// для active-списка пула (ячейка 3).
#[derive(Debug)]
pub struct FlowBlock {
    pub external_id: u32,
    pub magic: u32,
    pub(crate) input: SubqState,
    pub(crate) output: SubqState,
}

impl FlowBlock {
    pub(crate) fn new(magic: u32) -> Self {
        Self {
            external_id: 0,
            magic,
            input: SubqState::default(),
            output: SubqState::default(),
        }
    }
}

/// Колбэк уведомления об уничтожении block-ссылки. Вызывается ровно один
/// раз при утилизации ref-блока, до декремента счётчика цели; получает
/// main-link цели. Не должен обращаться к пулу (держится pool lock).
pub type NotifyFn = Box<dyn FnMut(Link) + Send>;

/// Содержимое слота.
pub(crate) enum SlotContent {
    None,
    Ref {
        target: u32,
        notify: Option<NotifyFn>,
    },
    Chunk(ChunkBlock),
    Generic(GenericBlock),
    Primary(PrimaryBlock),
    Canonical(CanonicalBlock),
    Flow(FlowBlock),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_check() {
        assert!(!BlockType::Undefined.is_content());
        assert!(!BlockType::Head.is_content());
        assert!(!BlockType::Ref.is_content());
        assert!(BlockType::CborData.is_content());
        assert!(BlockType::ServiceObject.is_content());
        assert!(BlockType::Primary.is_content());
        assert!(BlockType::Canonical.is_content());
        assert!(BlockType::Flow.is_content());
    }

    #[test]
    fn chunk_capacity_enforced() {
        let mut c = ChunkBlock::default();
        assert!(c.set_content(&[0xAA; MAX_ENCODED_CHUNK_SIZE]).is_ok());
        assert_eq!(c.content().len(), MAX_ENCODED_CHUNK_SIZE);
        assert!(c.set_content(&[0xAA; MAX_ENCODED_CHUNK_SIZE + 1]).is_err());
    }
}
