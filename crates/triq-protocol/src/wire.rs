//! Modbus-TCP 应用帧的构建与校验
//!
//! 寄存器映像通过 Modbus-TCP 帧在字节流上传输：
//! 命令侧是 Write Multiple Registers（0x10），状态侧是
//! Read Input Registers（0x04）。MBAP 头中固定为 0x0000 的
//! protocol id 充当帧前导标记，校验失败的帧整体丢弃。
//!
//! 本模块同样是纯函数式的，发送 / 接收由传输层负责。

use crate::{ProtocolError, STATUS_IMAGE_LEN};

// ============================================================================
// 帧常量
// ============================================================================

/// MBAP protocol id，作为帧前导标记校验
pub const PROTOCOL_MARKER: u16 = 0x0000;

/// 夹爪的 Modbus 单元号
pub const UNIT_ID: u8 = 0x09;

/// 功能码
pub const FUNC_WRITE_REGISTERS: u8 = 0x10;
pub const FUNC_READ_INPUT_REGISTERS: u8 = 0x04;

/// 寄存器基地址（命令与状态映像均从 0 开始）
pub const COMMAND_BASE_ADDR: u16 = 0x0000;
pub const STATUS_BASE_ADDR: u16 = 0x0000;

/// 状态映像占用的 16 位寄存器数
pub const STATUS_REGISTER_COUNT: u16 = (STATUS_IMAGE_LEN / 2) as u16;

/// 写应答帧定长
pub const WRITE_ACK_LEN: usize = 12;

/// 读请求帧定长
pub const READ_REQUEST_LEN: usize = 12;

/// 读应答帧定长与状态映像在帧内的固定偏移
pub const READ_RESPONSE_LEN: usize = 9 + STATUS_IMAGE_LEN;
pub const STATUS_IMAGE_OFFSET: usize = 9;

// ============================================================================
// 帧构建
// ============================================================================

/// 构建命令寄存器写请求帧
///
/// `payload` 为 `CommandRegister::encode()` 的输出，长度必须为偶数
/// （12 或 16 字节），以整数个 16 位寄存器写入。
pub fn build_write_request(txn_id: u16, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() % 2 == 0, "register payload must be even-sized");

    let register_count = (payload.len() / 2) as u16;
    // MBAP length 字段：unit id 之后的字节数
    let mbap_len = (7 + payload.len()) as u16;

    let mut frame = Vec::with_capacity(13 + payload.len());
    frame.extend_from_slice(&txn_id.to_be_bytes());
    frame.extend_from_slice(&PROTOCOL_MARKER.to_be_bytes());
    frame.extend_from_slice(&mbap_len.to_be_bytes());
    frame.push(UNIT_ID);
    frame.push(FUNC_WRITE_REGISTERS);
    frame.extend_from_slice(&COMMAND_BASE_ADDR.to_be_bytes());
    frame.extend_from_slice(&register_count.to_be_bytes());
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame
}

/// 构建状态寄存器读请求帧（定长 12 字节）
pub fn build_read_request(txn_id: u16) -> [u8; READ_REQUEST_LEN] {
    let mut frame = [0u8; READ_REQUEST_LEN];
    frame[0..2].copy_from_slice(&txn_id.to_be_bytes());
    frame[2..4].copy_from_slice(&PROTOCOL_MARKER.to_be_bytes());
    frame[4..6].copy_from_slice(&6u16.to_be_bytes());
    frame[6] = UNIT_ID;
    frame[7] = FUNC_READ_INPUT_REGISTERS;
    frame[8..10].copy_from_slice(&STATUS_BASE_ADDR.to_be_bytes());
    frame[10..12].copy_from_slice(&STATUS_REGISTER_COUNT.to_be_bytes());
    frame
}

// ============================================================================
// 帧校验
// ============================================================================

/// 校验 MBAP 头：前导标记与事务号
fn check_header(frame: &[u8], txn_id: u16) -> Result<(), ProtocolError> {
    let marker = u16::from_be_bytes([frame[2], frame[3]]);
    if marker != PROTOCOL_MARKER {
        return Err(ProtocolError::InvalidMarker { found: marker });
    }

    let echoed = u16::from_be_bytes([frame[0], frame[1]]);
    if echoed != txn_id {
        return Err(ProtocolError::TransactionMismatch {
            expected: txn_id,
            actual: echoed,
        });
    }

    Ok(())
}

/// 校验功能码回显；异常位（0x80）置位时取出异常码
fn check_function(frame: &[u8], expected: u8) -> Result<(), ProtocolError> {
    let function = frame[7];
    if function == expected | 0x80 {
        return Err(ProtocolError::ExceptionResponse {
            function: expected,
            code: frame[8],
        });
    }
    if function != expected {
        return Err(ProtocolError::InvalidValue {
            field: "function",
            value: function,
        });
    }
    Ok(())
}

/// 校验命令写应答帧（硬件确认）
///
/// 应答定长 12 字节；长度不符、标记不符或事务号不符都视为无效应答。
pub fn parse_write_ack(frame: &[u8], txn_id: u16) -> Result<(), ProtocolError> {
    if frame.len() < WRITE_ACK_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: WRITE_ACK_LEN,
            actual: frame.len(),
        });
    }
    check_header(frame, txn_id)?;
    check_function(frame, FUNC_WRITE_REGISTERS)?;
    Ok(())
}

/// 校验状态读应答帧并取出定长状态映像
///
/// 映像位于帧内固定偏移 9 处；截断或字节数不符的帧整体丢弃，
/// 不产生部分映像。
pub fn parse_read_response(frame: &[u8], txn_id: u16) -> Result<&[u8], ProtocolError> {
    if frame.len() < READ_RESPONSE_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: READ_RESPONSE_LEN,
            actual: frame.len(),
        });
    }
    check_header(frame, txn_id)?;
    check_function(frame, FUNC_READ_INPUT_REGISTERS)?;

    let byte_count = frame[8] as usize;
    if byte_count != STATUS_IMAGE_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: STATUS_IMAGE_LEN,
            actual: byte_count,
        });
    }

    Ok(&frame[STATUS_IMAGE_OFFSET..STATUS_IMAGE_OFFSET + STATUS_IMAGE_LEN])
}

/// 构建写应答帧（Mock 设备 / 测试夹具用）
pub fn build_write_ack(txn_id: u16, register_count: u16) -> [u8; WRITE_ACK_LEN] {
    let mut frame = [0u8; WRITE_ACK_LEN];
    frame[0..2].copy_from_slice(&txn_id.to_be_bytes());
    frame[2..4].copy_from_slice(&PROTOCOL_MARKER.to_be_bytes());
    frame[4..6].copy_from_slice(&6u16.to_be_bytes());
    frame[6] = UNIT_ID;
    frame[7] = FUNC_WRITE_REGISTERS;
    frame[8..10].copy_from_slice(&COMMAND_BASE_ADDR.to_be_bytes());
    frame[10..12].copy_from_slice(&register_count.to_be_bytes());
    frame
}

/// 构建读应答帧（Mock 设备 / 测试夹具用）
pub fn build_read_response(txn_id: u16, image: &[u8; STATUS_IMAGE_LEN]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(READ_RESPONSE_LEN);
    frame.extend_from_slice(&txn_id.to_be_bytes());
    frame.extend_from_slice(&PROTOCOL_MARKER.to_be_bytes());
    frame.extend_from_slice(&((3 + STATUS_IMAGE_LEN) as u16).to_be_bytes());
    frame.push(UNIT_ID);
    frame.push(FUNC_READ_INPUT_REGISTERS);
    frame.push(STATUS_IMAGE_LEN as u8);
    frame.extend_from_slice(image);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandRegister, StatusRegister, build_status_image};

    /// 测试完整命令映像的写请求帧：29 字节，MBAP + 0x10 + 16 字节数据
    #[test]
    fn test_build_write_request_full_image() {
        let mut cmd = CommandRegister::new();
        cmd.activate = true;
        cmd.individual_scissor = true;
        let payload = cmd.encode();

        let frame = build_write_request(0x1234, &payload);
        assert_eq!(frame.len(), 29);
        assert_eq!(&frame[0..2], &[0x12, 0x34]); // 事务号
        assert_eq!(&frame[2..4], &[0x00, 0x00]); // 前导标记
        assert_eq!(&frame[4..6], &[0x00, 0x17]); // length = 7 + 16
        assert_eq!(frame[6], UNIT_ID);
        assert_eq!(frame[7], FUNC_WRITE_REGISTERS);
        assert_eq!(&frame[10..12], &[0x00, 0x08]); // 8 个寄存器
        assert_eq!(frame[12], 16); // 字节数
        assert_eq!(&frame[13..], &payload[..]);
    }

    #[test]
    fn test_build_write_request_without_scissor() {
        let payload = CommandRegister::new().encode();
        let frame = build_write_request(1, &payload);
        assert_eq!(frame.len(), 25);
        assert_eq!(&frame[10..12], &[0x00, 0x06]); // 6 个寄存器
        assert_eq!(frame[12], 12);
    }

    #[test]
    fn test_build_read_request_fixture() {
        let frame = build_read_request(0xABCD);
        assert_eq!(
            frame,
            [0xAB, 0xCD, 0x00, 0x00, 0x00, 0x06, 0x09, 0x04, 0x00, 0x00, 0x00, 0x08]
        );
    }

    #[test]
    fn test_parse_write_ack_roundtrip() {
        let ack = build_write_ack(7, 8);
        assert!(parse_write_ack(&ack, 7).is_ok());
    }

    /// 测试应答校验失败路径：短帧 / 坏标记 / 事务号不符 / 设备异常
    #[test]
    fn test_parse_write_ack_rejections() {
        let ack = build_write_ack(7, 8);

        assert!(matches!(
            parse_write_ack(&ack[..10], 7),
            Err(ProtocolError::InvalidLength { .. })
        ));

        let mut bad_marker = ack;
        bad_marker[2] = 0xFF;
        assert!(matches!(
            parse_write_ack(&bad_marker, 7),
            Err(ProtocolError::InvalidMarker { found: 0xFF00 })
        ));

        assert!(matches!(
            parse_write_ack(&ack, 8),
            Err(ProtocolError::TransactionMismatch { expected: 8, actual: 7 })
        ));

        let mut exception = ack;
        exception[7] = FUNC_WRITE_REGISTERS | 0x80;
        exception[8] = 0x02;
        assert!(matches!(
            parse_write_ack(&exception, 7),
            Err(ProtocolError::ExceptionResponse { code: 0x02, .. })
        ));
    }

    /// 测试读应答帧中状态映像的定位与提取
    #[test]
    fn test_parse_read_response_extracts_image() {
        let mut status = StatusRegister::default();
        status.activated = true;
        status.fault = crate::FaultCode::ActionDelayed;
        let image = build_status_image(&status);

        let frame = build_read_response(42, &image);
        assert_eq!(frame.len(), READ_RESPONSE_LEN);

        let extracted = parse_read_response(&frame, 42).unwrap();
        assert_eq!(extracted, &image);

        let decoded = StatusRegister::decode(extracted).unwrap();
        assert_eq!(decoded, status);
    }

    /// 测试截断的读应答被整体丢弃
    #[test]
    fn test_parse_read_response_truncated() {
        let image = [0u8; STATUS_IMAGE_LEN];
        let frame = build_read_response(1, &image);
        assert!(matches!(
            parse_read_response(&frame[..frame.len() - 3], 1),
            Err(ProtocolError::InvalidLength { .. })
        ));
    }

    /// 测试字节数字段不符被拒绝
    #[test]
    fn test_parse_read_response_bad_byte_count() {
        let image = [0u8; STATUS_IMAGE_LEN];
        let mut frame = build_read_response(1, &image);
        frame[8] = 6;
        assert!(matches!(
            parse_read_response(&frame, 1),
            Err(ProtocolError::InvalidLength { expected: STATUS_IMAGE_LEN, actual: 6 })
        ));
    }
}
