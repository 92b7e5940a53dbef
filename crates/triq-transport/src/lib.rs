//! # Triq Transport Layer
//!
//! 字节流传输抽象层，提供统一的收发接口。
//!
//! 连接的建立与关闭策略属于调用方；本层只做带超时上界的
//! 发送与接收，超出上界立即返回失败，绝不无界阻塞。

use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "tcp")]
pub use tcp::TcpTransport;

#[cfg(any(feature = "mock", test))]
pub mod mock;

#[cfg(any(feature = "mock", test))]
pub use mock::MockTransport;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Receive timeout")]
    Timeout,
    #[error("Connection closed by peer")]
    Closed,
}

/// 字节流传输接口
///
/// `receive` 返回一次读取到的字节数；一次读取不保证凑齐完整帧，
/// 帧的累积与定界由上层（链路驱动）完成。
pub trait Transport {
    /// 发送整段字节，全部写出才算成功
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// 带超时上界的一次接收
    ///
    /// 超时返回 `TransportError::Timeout`；对端关闭返回 `Closed`。
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;
}
