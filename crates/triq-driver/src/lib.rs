//! # Triq Driver
//!
//! 夹爪会话驱动层：
//!
//! - `config`: 抓取配置（TOML）
//! - `session`: 会话状态缓存与抓取阶段机
//! - `link`: 单次发送 / 应答与状态轮询
//! - `gripper`: 会话对象与保活线程
//!
//! ## 并发模型
//!
//! 一把互斥锁覆盖完整的链路周期（编码 → 发送 → 应答 → 缓存更新）。
//! 前台操作与保活线程都以周期为单位持锁；只读方通过 `ArcSwap`
//! 快照观察会话，不参与锁竞争。

pub mod config;
pub mod error;
pub mod gripper;
pub mod link;
pub mod session;

pub use config::{GripProfile, ProfileError};
pub use error::DriverError;
pub use gripper::{Gripper, GripperView};
pub use link::{Link, LinkSettings};
pub use session::{GripPhase, SessionState};
