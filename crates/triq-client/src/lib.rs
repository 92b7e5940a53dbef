//! # Triq Client
//!
//! 面向应用的夹爪客户端层：
//!
//! - `hand`: 通用机器人接口到夹爪会话的适配（`Hand`）
//! - `types`: 跨设备族的公共数据类型
//! - `error`: 三分类调用结果（执行成功 / 拒绝 / 接受但失败）

pub mod error;
pub mod hand;
pub mod types;

pub use error::ClientError;
pub use hand::Hand;
pub use types::{RobotAxes, RobotForces, RobotIo, RobotPose};

// 常用下游类型再导出，应用侧单一依赖入口
pub use triq_driver::{GripPhase, GripProfile, Gripper, GripperView};
pub use triq_protocol::{Axis, FaultCode, GraspMode};
