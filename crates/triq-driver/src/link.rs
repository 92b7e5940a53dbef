//! 链路驱动：单次发送 / 应答与状态轮询
//!
//! 链路层把一次命令下发封装为"编码 → 发送 → 等应答 → 校验"的
//! 完整往返，把一次状态读取封装为"发请求 → 累积定长应答 → 解析"。
//! 应答可能分片到达，按截止时刻累积到定长为止；超时即失败，
//! 不存在无限等待路径。

use std::time::{Duration, Instant};
use tracing::trace;
use triq_protocol::{
    CommandRegister, ProtocolError, READ_RESPONSE_LEN, StatusRegister, WRITE_ACK_LEN,
    build_read_request, build_write_request, parse_read_response, parse_write_ack,
};
use triq_transport::{Transport, TransportError};

use crate::error::DriverError;

/// 链路超时参数
#[derive(Debug, Clone, Copy)]
pub struct LinkSettings {
    /// 写应答等待上限
    pub ack_timeout: Duration,
    /// 读应答等待上限
    pub response_timeout: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(100),
            response_timeout: Duration::from_millis(100),
        }
    }
}

/// 链路驱动
///
/// 持有递增的事务号；应答按事务号配对，串扰帧在解析层被拒绝。
pub struct Link {
    settings: LinkSettings,
    txn: u16,
}

impl Link {
    pub fn new(settings: LinkSettings) -> Self {
        Self { settings, txn: 0 }
    }

    fn next_txn(&mut self) -> u16 {
        self.txn = self.txn.wrapping_add(1);
        self.txn
    }

    /// 下发当前命令映像并等待写应答
    ///
    /// 成功返回表示设备已确认收到命令；任何一步失败都整体返回错误，
    /// 调用方的缓存状态不应因此改变。
    ///
    /// 上一次超时后迟到的应答可能滞留在流里；事务号不符的帧被丢弃，
    /// 在截止时刻前继续等待本次应答，重试因此能重新对齐。
    pub fn transmit(
        &mut self,
        transport: &mut dyn Transport,
        command: &CommandRegister,
    ) -> Result<(), DriverError> {
        let txn = self.next_txn();
        let image = command.encode();
        let frame = build_write_request(txn, &image);
        trace!(txn, len = frame.len(), "Transmitting command frame");
        transport.send(&frame)?;

        let deadline = Instant::now() + self.settings.ack_timeout;
        let mut ack = [0u8; WRITE_ACK_LEN];
        loop {
            read_exact(transport, &mut ack, deadline)?;
            match parse_write_ack(&ack, txn) {
                Err(ProtocolError::TransactionMismatch { actual, .. }) => {
                    trace!(expected = txn, actual, "Discarding stale ack frame");
                },
                Err(e) => return Err(e.into()),
                Ok(()) => return Ok(()),
            }
        }
    }

    /// 发起一次状态读取并解析状态寄存器
    pub fn poll(&mut self, transport: &mut dyn Transport) -> Result<StatusRegister, DriverError> {
        let txn = self.next_txn();
        let frame = build_read_request(txn);
        trace!(txn, "Polling status registers");
        transport.send(&frame)?;

        let deadline = Instant::now() + self.settings.response_timeout;
        let mut response = [0u8; READ_RESPONSE_LEN];
        loop {
            read_exact(transport, &mut response, deadline)?;
            match parse_read_response(&response, txn) {
                Err(ProtocolError::TransactionMismatch { actual, .. }) => {
                    trace!(expected = txn, actual, "Discarding stale response frame");
                },
                Err(e) => return Err(e.into()),
                Ok(image) => return Ok(StatusRegister::decode(image)?),
            }
        }
    }
}

/// 在截止时刻前把 `buf` 累积填满
///
/// 单次 receive 可能只交付部分字节；剩余等待时间随累积推进收缩，
/// 到期仍未填满按超时处理。
fn read_exact(
    transport: &mut dyn Transport,
    buf: &mut [u8],
    deadline: Instant,
) -> Result<(), DriverError> {
    let mut filled = 0;
    while filled < buf.len() {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .ok_or(TransportError::Timeout)?;
        filled += transport.receive(&mut buf[filled..], remaining)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use triq_protocol::{Axis, FUNC_WRITE_REGISTERS, InitStatus, build_status_image};
    use triq_transport::mock::MockTransport;

    #[test]
    fn test_transmit_checks_ack() {
        let (mut transport, handle) = MockTransport::new();
        let mut link = Link::new(LinkSettings::default());

        let mut command = CommandRegister::new();
        command.activate = true;
        command.set_position(Axis::FingerA, 0x42);

        link.transmit(&mut transport, &command).unwrap();

        let frames = handle.sent_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][7], FUNC_WRITE_REGISTERS);
        // 命令映像从数据区第 13 字节起
        assert_eq!(frames[0][13], 0x01);
    }

    /// 设备静默时发送在应答超时处失败，不会无限等待
    #[test]
    fn test_transmit_times_out_without_ack() {
        let (mut transport, handle) = MockTransport::new();
        handle.set_silent(true);
        let mut link = Link::new(LinkSettings {
            ack_timeout: Duration::from_millis(20),
            response_timeout: Duration::from_millis(20),
        });

        let start = Instant::now();
        let err = link.transmit(&mut transport, &CommandRegister::new()).unwrap_err();
        assert!(matches!(err, DriverError::Transport(TransportError::Timeout)));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_poll_decodes_status() {
        let (mut transport, handle) = MockTransport::new();
        let mut status = StatusRegister::default();
        status.activated = true;
        status.init = InitStatus::Complete;
        status.axes[0].position = 0x7F;
        handle.set_status_image(build_status_image(&status));

        let mut link = Link::new(LinkSettings::default());
        let decoded = link.poll(&mut transport).unwrap();
        assert!(decoded.activated);
        assert_eq!(decoded.axis(Axis::FingerA).position, 0x7F);
    }

    /// 应答分片到达时按截止时刻累积到定长
    #[test]
    fn test_poll_accumulates_chunked_response() {
        let (mut transport, handle) = MockTransport::with_chunk(3);
        handle.set_status_image(build_status_image(&StatusRegister::default()));

        let mut link = Link::new(LinkSettings::default());
        let decoded = link.poll(&mut transport).unwrap();
        assert!(!decoded.activated);
    }

    /// 迟到的应答帧按事务号丢弃，重试能重新对齐而不是永久失步
    #[test]
    fn test_late_ack_discarded_on_retry() {
        let (mut transport, handle) = MockTransport::new();
        let mut link = Link::new(LinkSettings {
            ack_timeout: Duration::from_millis(20),
            response_timeout: Duration::from_millis(20),
        });

        // 第一次发送的应答迟到：本次以超时失败，应答滞留在流里
        handle.defer_next_reply();
        let err = link.transmit(&mut transport, &CommandRegister::new()).unwrap_err();
        assert!(matches!(err, DriverError::Transport(TransportError::Timeout)));

        // 重试先读到滞留应答，按事务号丢弃后取到本次应答
        link.transmit(&mut transport, &CommandRegister::new()).unwrap();

        // 后续轮询同样不受影响
        handle.set_status_image(build_status_image(&StatusRegister::default()));
        link.poll(&mut transport).unwrap();
    }

    /// 事务号逐次递增，应答与请求按事务号配对
    #[test]
    fn test_transaction_ids_increment() {
        let (mut transport, handle) = MockTransport::new();
        handle.set_status_image(build_status_image(&StatusRegister::default()));
        let mut link = Link::new(LinkSettings::default());

        link.transmit(&mut transport, &CommandRegister::new()).unwrap();
        link.poll(&mut transport).unwrap();
        link.transmit(&mut transport, &CommandRegister::new()).unwrap();

        let frames = handle.sent_frames();
        let txns: Vec<u16> = frames
            .iter()
            .map(|f| u16::from_be_bytes([f[0], f[1]]))
            .collect();
        assert_eq!(txns, vec![1, 2, 3]);
    }
}
