//! # Triq Protocol
//!
//! 三指自适应夹爪的寄存器级协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `registers`: 命令寄存器编码 / 状态寄存器解析
//! - `wire`: Modbus-TCP 应用帧的构建与校验
//!
//! ## 设计
//!
//! 协议层是纯函数式的：编码只依赖输入结构体，解析只依赖输入字节，
//! 不做任何 I/O，也不保留内部状态。位打包的寄存器字节在协议边界
//! 一次性解析为具名字段结构体，上层不再接触原始字节。

pub mod registers;
pub mod wire;

// 重新导出常用类型
pub use registers::*;
pub use wire::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid frame marker: 0x{found:04X}")]
    InvalidMarker { found: u16 },

    #[error("Transaction id mismatch: expected {expected}, got {actual}")]
    TransactionMismatch { expected: u16, actual: u16 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: u8 },

    #[error("Device exception for function 0x{function:02X}: code 0x{code:02X}")]
    ExceptionResponse { function: u8, code: u8 },
}
