//! 客户端层错误定义
//!
//! 通用机器人接口的调用结果分三类：
//!
//! - `Ok(())`：请求被接受且已确认执行
//! - `Unsupported` / `Rejected`：请求在发送前即被判定不可执行（无副作用）
//! - `Driver`：请求被接受但执行失败（链路 / 协议 / 设备故障）

use thiserror::Error;
use triq_driver::DriverError;

#[derive(Error, Debug)]
pub enum ClientError {
    /// 该操作对夹爪设备没有意义（机械臂专属接口）
    #[error("Operation not supported by this device: {0}")]
    Unsupported(&'static str),

    /// 参数或状态不满足前置条件，请求未发送
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// 请求已接受但执行失败
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl ClientError {
    /// 是否属于"拒绝"类结果（未产生任何设备侧副作用）
    pub fn is_rejection(&self) -> bool {
        match self {
            ClientError::Unsupported(_) | ClientError::Rejected(_) => true,
            // 未激活先决条件在驱动层检查，同样未发送任何帧
            ClientError::Driver(DriverError::NotActivated) => true,
            ClientError::Driver(_) => false,
        }
    }
}
