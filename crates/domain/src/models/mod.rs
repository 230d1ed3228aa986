//! # 数据模型
//!
//! 控制平面的核心数据结构：任务、队列任务、Worker 与扩缩容相关类型。
//!
//! ## 状态管理
//!
//! 所有状态字段都是枚举，合法转换由 `can_transition_to` 表定义，
//! 非法转换在 API 边界被拒绝并返回 `InvalidTransition`。
//!
//! ### 队列任务状态流转
//! ```text
//! Queued → Assigned → InProgress → Completed
//!                         ↓
//!                   Failed / Timeout ──重试──→ Queued
//! ```
//!
//! ### Worker状态流转
//! ```text
//! Starting → Idle ⇄ Working
//!              ↓       ↓
//!           Offline / Error ──restart──→ Starting
//! ```

pub mod scaling;
pub mod strategy;
pub mod task;
pub mod worker;

pub use scaling::*;
pub use strategy::*;
pub use task::*;
pub use worker::*;
