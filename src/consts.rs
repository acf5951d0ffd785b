//! Общие константы форматов (pool geometry, block tags, store chapters).

// -------- Pool geometry --------

/// Учётная единица арены: столько байт бюджетируется на один слот.
/// `Pool::create(size)` нарезает память на size / BLOCK_SLOT_SIZE слотов.
pub const BLOCK_SLOT_SIZE: usize = 512;

/// Максимальный размер закодированного CBOR-чанка в одном блоке.
/// Все чанки (включая логические данные primary/canonical) хранятся в записях
/// одинакового размера и сцепляются в цепочки для больших объектов.
pub const MAX_ENCODED_CHUNK_SIZE: usize = 320;

/// Ёмкость пользовательских данных generic/service блока.
pub const GENERIC_DATA_CAPACITY: usize = MAX_ENCODED_CHUNK_SIZE;

/// Число link-ячеек на слот: ячейка 0 — собственная связь блока,
/// ячейки 1..3 — встроенные головы списков либо secondary link.
pub const LINK_CELLS_PER_SLOT: u32 = 4;

// Служебные слоты арены (постоянные головы списков)
pub const FREE_HEAD_SLOT: u32 = 0;
pub const RECYCLE_HEAD_SLOT: u32 = 1;
pub const ACTIVE_FLOWS_HEAD_SLOT: u32 = 2;
pub const ADMIN_SLOT_COUNT: u32 = 3;

// -------- Block type tags --------
// Порядок значим: теги >= TAG_CBOR_DATA и < TAG_MAX допускают refcount,
// проверка реализована как range check. Не менять порядок.

pub const TAG_UNDEFINED: u8 = 0;
pub const TAG_HEAD: u8 = 1;
pub const TAG_REF: u8 = 2;
pub const TAG_CBOR_DATA: u8 = 3;
pub const TAG_SERVICE_OBJECT: u8 = 4;
pub const TAG_PRIMARY: u8 = 5;
pub const TAG_CANONICAL: u8 = 6;
pub const TAG_FLOW: u8 = 7;
pub const TAG_MAX: u8 = 8;

// -------- Store chapters --------

/// Объектов на один chapter-файл. Вшито в кодирование id
/// (file_id = data_id >> 8, offset = data_id & 0xFF) — не менять
/// без смены разбиения id.
pub const STORE_DATA_COUNT: u32 = 256;

/// Заголовок объекта на диске: [handle i32][sid u64][size u32], LE.
pub const OBJECT_HDR_SIZE: usize = 16;

/// Таблица освобождений chapter'а на диске: [freed u8 x 256][free_cnt i32], LE.
pub const FREE_TABLE_SIZE: usize = STORE_DATA_COUNT as usize + 4;

/// sid, записываемый в заголовок при enqueue; настоящая величина
/// штампуется читателем после чтения.
pub const SID_VACANT: u64 = 0;

// -------- Store defaults --------

pub const STORE_DEFAULT_ROOT: &str = ".pfile";
pub const STORE_DEFAULT_CACHE_SIZE: usize = 16384;

/// Максимум одновременных store-хэндлов в процессе.
pub const STORE_MAX_HANDLES: usize = 60;

/// Имя lock-файла в корне store (см. lock.rs).
pub const STORE_LOCK_FILE: &str = "LOCK";
