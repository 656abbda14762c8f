//! 批处理任务公共模块
//!
//! - 配置加载（环境变量）
//! - 错误类型
//! - 数据模型（凭据、结果记录）
//! - 工具函数（存储键、运行 ID）

pub mod config;
pub mod errors;
pub mod models;
pub mod utils;
