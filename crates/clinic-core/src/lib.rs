//! # Clinic Core
//!
//! 挂号门户的核心模块，提供基础数据结构、错误定义、二维码生成和通用工具。

pub mod error;
pub mod models;
pub mod qr;
pub mod utils;

pub use error::{ClinicError, Result};
pub use models::*;
