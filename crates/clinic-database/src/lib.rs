//! # 挂号数据库模块
//!
//! 负责中心、医务人员和挂号记录的持久化。`RegistrationStore` 是业务层唯一依赖的接口，
//! 提供 PostgreSQL 实现和内存实现两种后端。

pub mod connection;
pub mod memory;
pub mod models;
pub mod queries;
pub mod store;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use queries::DatabaseQueries;
pub use store::{GroupCount, RegistrationStore};
