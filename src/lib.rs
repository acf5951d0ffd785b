#![allow(non_snake_case)]

// Базовые модули
pub mod config;
pub mod consts;
pub mod error;
pub mod metrics;

// Пул блоков (папка с mod.rs)
pub mod pool; // src/pool/{mod,link,block,refs,flow}.rs

// Файловое хранилище (папка с mod.rs)
pub mod store; // src/store/{mod,object,io,cache,table,ops}.rs

// Утилиты
pub mod crc; // parameter-driven CRC-16
pub mod lock; // fs2-лок корня store

// Удобные реэкспорты
pub use config::StoreConfig;
pub use crc::CrcParameters;
pub use error::{PoolError, StoreError};
pub use pool::{BlockType, FlowDir, Link, Pool, PoolCounts, Refptr};
pub use store::{StoreHandle, StoreObject};
