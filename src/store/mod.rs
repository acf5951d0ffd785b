//! store — персистентное файловое хранилище бандлов (write-forward журнал,
//! порезанный на chapter-файлы по 256 объектов).
//!
//! Разделение по подмодулям:
//! - object.rs — кодек записи [u32 size][hdr][payload] и StoreObject.
//! - io.rs     — имена файлов, разбиение id, прогулка по записям.
//! - cache.rs  — reclaim-кэш с локом записей (индекс data_id % cache_size).
//! - table.rs  — per-chapter таблица освобождений (`.tbl`).
//! - ops.rs    — enqueue/dequeue/retrieve/release/relinquish.
//!
//! В этом модуле (mod.rs) лежат процессная таблица хэндлов (единственный
//! якорь жизненного цикла), монотонный счётчик service_id и реестр
//! root-локов: инстансы одного процесса на общем корне разделяют один
//! эксклюзивный fs2-лок, второй процесс корень занять не может.
//!
//! Хэндл-ориентированный API: create()/destroy() плюс операции вида
//! enqueue(h, ...). Обращение по уничтоженному хэндлу — паника (misuse).

pub mod cache;
pub mod io;
pub mod object;
pub mod ops;
pub mod table;

pub use self::object::StoreObject;

use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, OnceLock, Weak};

use log::warn;

use crate::config::StoreConfig;
use crate::consts::STORE_MAX_HANDLES;
use crate::error::StoreError;
use crate::lock::{try_acquire_exclusive_lock, LockGuard};

use self::cache::DataCache;
use self::table::FreeTable;

/// Хэндл store-инстанса в процессной таблице.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreHandle(pub(crate) usize);

impl StoreHandle {
    /// Индекс в таблице (персистится в заголовке объекта).
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Изменяемое состояние инстанса (под его локом).
pub(crate) struct StoreState {
    pub write_fd: Option<File>,
    pub write_data_id: u64,
    pub write_error: bool,

    pub read_fd: Option<File>,
    pub read_data_id: u64,
    pub read_error: bool,

    pub retrieve_fd: Option<File>,
    pub retrieve_data_id: u64,

    pub relinquish_data_id: u64,
    pub relinquish_table: FreeTable,

    pub cache: DataCache,
    pub data_count: u64,
}

impl StoreState {
    fn new(cache_size: usize) -> Self {
        Self {
            write_fd: None,
            write_data_id: 1,
            write_error: false,
            read_fd: None,
            read_data_id: 1,
            read_error: false,
            retrieve_fd: None,
            retrieve_data_id: 1,
            relinquish_data_id: 1,
            relinquish_table: FreeTable::default(),
            cache: DataCache::new(cache_size),
            data_count: 0,
        }
    }
}

/// Неизменяемая часть инстанса + лок/кондвар его состояния.
pub(crate) struct StoreShared {
    pub handle_index: usize,
    pub service_id: u64,
    pub root: PathBuf,
    pub flush: bool,
    pub state: Mutex<StoreState>,
    pub cond: Condvar,
    _root_lock: Arc<LockGuard>,
}

struct StoreTable {
    stores: Vec<Option<Arc<StoreShared>>>,
    next_service_id: u64,
    root_locks: HashMap<PathBuf, Weak<LockGuard>>,
}

impl StoreTable {
    fn new() -> Self {
        let mut stores = Vec::with_capacity(STORE_MAX_HANDLES);
        stores.resize_with(STORE_MAX_HANDLES, || None);
        Self {
            stores,
            next_service_id: 0,
            root_locks: HashMap::new(),
        }
    }
}

static TABLE: OnceLock<Mutex<StoreTable>> = OnceLock::new();

#[inline]
fn table_lock() -> &'static Mutex<StoreTable> {
    TABLE.get_or_init(|| Mutex::new(StoreTable::new()))
}

/// Сбросить процессную таблицу хэндлов: все существующие хэндлы становятся
/// недействительными, дескрипторы и root-локи закрываются по мере
/// освобождения последних ссылок. service_id остаётся монотонным —
/// идентификаторы не переиспользуются.
pub fn init() {
    let mut tab = table_lock().lock().unwrap();
    for s in tab.stores.iter_mut() {
        *s = None;
    }
}

/// Создать store-инстанс: слот в таблице, свежий service_id, корень с
/// эксклюзивным (на процесс) fs2-локом и reclaim-кэш.
pub fn create(cfg: &StoreConfig) -> Result<StoreHandle, StoreError> {
    let root = PathBuf::from(&cfg.root_path);
    if let Err(e) = fs::create_dir_all(&root) {
        warn!("failed to create store root {}: {}", root.display(), e);
        return Err(StoreError::FailedStore);
    }

    let mut tab = table_lock().lock().unwrap();
    let idx = match tab.stores.iter().position(|s| s.is_none()) {
        Some(i) => i,
        None => return Err(StoreError::InvalidHandle),
    };

    // Инстансы одного процесса на общем корне разделяют один лок.
    let root_lock = match tab.root_locks.get(&root).and_then(Weak::upgrade) {
        Some(l) => l,
        None => {
            let guard = match try_acquire_exclusive_lock(&root) {
                Ok(g) => g,
                Err(e) => {
                    warn!("failed to lock store root {}: {}", root.display(), e);
                    return Err(StoreError::FailedOs);
                }
            };
            let arc = Arc::new(guard);
            tab.root_locks.insert(root.clone(), Arc::downgrade(&arc));
            arc
        }
    };

    let service_id = tab.next_service_id;
    tab.next_service_id += 1;

    let shared = Arc::new(StoreShared {
        handle_index: idx,
        service_id,
        root,
        flush: cfg.flush,
        state: Mutex::new(StoreState::new(cfg.effective_cache_size())),
        cond: Condvar::new(),
        _root_lock: root_lock,
    });
    tab.stores[idx] = Some(shared);
    Ok(StoreHandle(idx))
}

/// Уничтожить инстанс. Паника по недействительному хэндлу.
pub fn destroy(h: StoreHandle) {
    // Паникуем уже после отпускания лока таблицы.
    let removed = {
        let mut tab = table_lock().lock().unwrap();
        tab.stores.get_mut(h.0).map(|slot| slot.take().is_some())
    };
    match removed {
        None => panic!("store handle {} out of range", h.0),
        Some(false) => panic!("store handle {} is not in use", h.0),
        Some(true) => {}
    }
}

/// Текущее число объектов (enqueued минус relinquished).
pub fn getcount(h: StoreHandle) -> u64 {
    let shared = get(h);
    let st = shared.state.lock().unwrap();
    st.data_count
}

pub(crate) fn get(h: StoreHandle) -> Arc<StoreShared> {
    // Паникуем уже после отпускания лока таблицы.
    let found = {
        let tab = table_lock().lock().unwrap();
        tab.stores.get(h.0).cloned()
    };
    match found {
        None => panic!("store handle {} out of range", h.0),
        Some(None) => panic!("store handle {} is not in use", h.0),
        Some(Some(shared)) => shared,
    }
}

// -------- операции (делегируют в ops.rs) --------

/// Дописать объект (конкатенация двух буферов) в журнал. Возвращает
/// присвоенный storage id (1-based, строго возрастающий). Параметр timeout
/// зарезервирован: запись не блокируется.
pub fn enqueue(
    h: StoreHandle,
    data1: &[u8],
    data2: &[u8],
    timeout_ms: i32,
) -> Result<u64, StoreError> {
    ops::enqueue(&get(h), data1, data2, timeout_ms)
}

/// Снять очередной объект в порядке enqueue. Ждёт данных до timeout
/// (отрицательный — бесконечно, 0 — без ожидания).
pub fn dequeue(h: StoreHandle, timeout_ms: i32) -> Result<StoreObject, StoreError> {
    ops::dequeue(&get(h), timeout_ms)
}

/// Материализовать объект по sid (вне порядка чтения). Кэш-попадание не
/// делает I/O; dequeue-курсор не затрагивается.
pub fn retrieve(h: StoreHandle, sid: u64, timeout_ms: i32) -> Result<StoreObject, StoreError> {
    ops::retrieve(&get(h), sid, timeout_ms)
}

/// Снять лок с кэш-записи объекта, разрешив её вытеснение.
pub fn release(h: StoreHandle, sid: u64) -> Result<(), StoreError> {
    ops::release(&get(h), sid)
}

/// Логически удалить объект; при полном освобождении chapter'а его файлы
/// удаляются физически.
pub fn relinquish(h: StoreHandle, sid: u64) -> Result<(), StoreError> {
    ops::relinquish(&get(h), sid)
}
