//! # Hospital Core
//!
//! 医院管理后端的核心模块，提供基础数据结构、错误定义、存储接口和通用工具。

pub mod error;
pub mod models;
pub mod store;
pub mod utils;

pub use error::{ErrorKind, HospitalError, Result};
pub use models::*;
pub use store::{BookingStore, CredentialStore, LedgerStore, RecordStore};
