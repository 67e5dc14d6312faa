//! # 挂号照片存储模块
//!
//! 负责患者上传照片的保存，返回可公开访问的URL。

pub mod cloudinary;
pub mod storage;

pub use cloudinary::{CloudinaryConfig, CloudinaryImageStore};
pub use storage::*;
