//! 计算引擎配置
//!
//! 配置按以下顺序叠加：内置默认值、TOML配置文件、`COMPUTE_ENGINE__` 前缀的环境变量。
//! 所有分节都带有 `#[serde(default)]`，配置文件只需写出需要覆盖的字段。

pub mod models;

pub use models::*;
