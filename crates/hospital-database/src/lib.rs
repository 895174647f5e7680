//! # 医院数据库模块
//!
//! PostgreSQL 后端。排期、付款、注册等写操作调用数据库中的存储过程，
//! 并在显式事务中先取得所需的表锁或行锁。

pub mod connection;
pub mod models;
pub mod queries;
pub mod store;

// 重新导出主要类型
pub use connection::{DatabasePool, PoolSettings};
pub use queries::{map_db_error, HospitalQueries};
pub use store::PgHospitalStore;
