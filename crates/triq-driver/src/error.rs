//! 驱动层错误定义

use thiserror::Error;
use triq_protocol::{FaultCode, ProtocolError};
use triq_transport::TransportError;

/// 驱动层错误类型
///
/// 传输错误与协议错误自下游透传；`NotActivated` 与 `Fault`
/// 属于会话语义层面的失败，由驱动自身产生。
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Gripper is not activated, call activate() first")]
    NotActivated,

    #[error("Gripper reported fault: {0:?}")]
    Fault(FaultCode),

    #[error("Timed out waiting for gripper state")]
    Timeout,
}
