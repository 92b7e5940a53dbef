//! Mock 传输后端（无硬件测试用）
//!
//! 模拟夹爪控制器的应答行为：收到写请求排队一个写应答，
//! 收到读请求排队一个携带当前状态映像的读应答。
//! 测试通过 `MockHandle` 在会话运行期间修改状态映像、
//! 注入发送延迟或切断应答。

use crate::{Transport, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use triq_protocol::{
    FUNC_READ_INPUT_REGISTERS, FUNC_WRITE_REGISTERS, STATUS_IMAGE_LEN, build_read_response,
    build_write_ack,
};

/// Mock 设备的共享可观测 / 可控状态
#[derive(Default)]
struct DeviceState {
    /// 设备当前应答的状态映像
    status_image: Mutex<[u8; STATUS_IMAGE_LEN]>,
    /// 所有被发送出去的帧（按序记录）
    sent: Mutex<Vec<Vec<u8>>>,
    /// send() 内注入的人为延迟（微秒）
    send_delay_us: AtomicU64,
    /// 切断应答：写不产生 ack，读不产生应答
    silent: AtomicBool,
    /// 下一个应答迟到一拍：在再下一次 send 时才进入接收队列
    defer_next: AtomicBool,
}

/// 测试侧控制句柄
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<DeviceState>,
}

impl MockHandle {
    /// 替换设备应答的状态映像
    pub fn set_status_image(&self, image: [u8; STATUS_IMAGE_LEN]) {
        *self.state.status_image.lock().unwrap() = image;
    }

    /// 取出目前为止发送过的全部帧副本
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state.sent.lock().unwrap().len()
    }

    /// 在每次 send() 中注入延迟，放大持锁窗口以暴露交错问题
    pub fn set_send_delay(&self, delay: Duration) {
        self.state.send_delay_us.store(delay.as_micros() as u64, Ordering::Relaxed);
    }

    /// 切断 / 恢复设备应答
    pub fn set_silent(&self, silent: bool) {
        self.state.silent.store(silent, Ordering::Relaxed);
    }

    /// 让下一个应答迟到一拍：请求方先超时，滞留帧随后到达
    pub fn defer_next_reply(&self) {
        self.state.defer_next.store(true, Ordering::Relaxed);
    }
}

/// 协议感知的 Mock 传输
pub struct MockTransport {
    state: Arc<DeviceState>,
    /// 待被 receive 取走的应答字节
    pending: VecDeque<u8>,
    /// 迟到一拍的应答，在下一次 send 时汇入 pending
    deferred: VecDeque<u8>,
    /// 单次 receive 最多返回的字节数，用于锻炼上层的帧累积逻辑
    chunk: usize,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        Self::with_chunk(usize::MAX)
    }

    /// 限制单次 receive 的返回字节数（模拟分片到达）
    pub fn with_chunk(chunk: usize) -> (Self, MockHandle) {
        let state = Arc::new(DeviceState::default());
        let handle = MockHandle {
            state: state.clone(),
        };
        (
            Self {
                state,
                pending: VecDeque::new(),
                deferred: VecDeque::new(),
                chunk,
            },
            handle,
        )
    }
}

impl Transport for MockTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let delay_us = self.state.send_delay_us.load(Ordering::Relaxed);
        if delay_us > 0 {
            std::thread::sleep(Duration::from_micros(delay_us));
        }

        self.state.sent.lock().unwrap().push(bytes.to_vec());

        // 上一拍被延迟的应答此刻到达，排在本次应答之前
        self.pending.append(&mut self.deferred);

        if self.state.silent.load(Ordering::Relaxed) || bytes.len() < 12 {
            return Ok(());
        }

        let defer = self.state.defer_next.swap(false, Ordering::Relaxed);
        let txn = u16::from_be_bytes([bytes[0], bytes[1]]);
        let mut reply = Vec::new();
        match bytes[7] {
            FUNC_WRITE_REGISTERS => {
                let count = u16::from_be_bytes([bytes[10], bytes[11]]);
                reply.extend_from_slice(&build_write_ack(txn, count));
            },
            FUNC_READ_INPUT_REGISTERS => {
                let image = *self.state.status_image.lock().unwrap();
                reply = build_read_response(txn, &image);
            },
            _ => {},
        }
        if defer {
            self.deferred.extend(reply);
        } else {
            self.pending.extend(reply);
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        if self.pending.is_empty() {
            // 与真实 socket 一致：等满超时上界再报告
            std::thread::sleep(timeout.min(Duration::from_millis(5)));
            return Err(TransportError::Timeout);
        }

        let n = buf.len().min(self.chunk).min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            // 队列非空已校验，n 以队列长度为上界
            *slot = self.pending.pop_front().unwrap();
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triq_protocol::{CommandRegister, build_write_request};

    /// 测试写请求换来定长写应答
    #[test]
    fn test_mock_acks_write_request() {
        let (mut mock, handle) = MockTransport::new();
        let frame = build_write_request(5, &CommandRegister::new().encode());
        mock.send(&frame).unwrap();

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(n, 12);
        assert_eq!(&buf[0..2], &[0x00, 0x05]);
        assert_eq!(handle.sent_count(), 1);
    }

    /// 测试切断应答后 receive 以 Timeout 结束
    #[test]
    fn test_mock_silent_mode() {
        let (mut mock, handle) = MockTransport::new();
        handle.set_silent(true);

        let frame = build_write_request(1, &CommandRegister::new().encode());
        mock.send(&frame).unwrap();

        let mut buf = [0u8; 64];
        let err = mock.receive(&mut buf, Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
        // 帧仍被记录，便于事后断言
        assert_eq!(handle.sent_count(), 1);
    }

    /// 测试迟到一拍的应答：先超时，下一次 send 后滞留帧先到
    #[test]
    fn test_mock_deferred_reply() {
        let (mut mock, handle) = MockTransport::new();
        handle.defer_next_reply();

        let first = build_write_request(1, &CommandRegister::new().encode());
        mock.send(&first).unwrap();
        let mut buf = [0u8; 64];
        assert!(mock.receive(&mut buf, Duration::from_millis(5)).is_err());

        let second = build_write_request(2, &CommandRegister::new().encode());
        mock.send(&second).unwrap();
        let n = mock.receive(&mut buf, Duration::from_millis(5)).unwrap();
        assert_eq!(n, 24);
        // 滞留的事务 1 应答排在事务 2 应答之前
        assert_eq!(&buf[0..2], &[0x00, 0x01]);
        assert_eq!(&buf[12..14], &[0x00, 0x02]);
    }

    /// 测试分片接收（chunk 限制）
    #[test]
    fn test_mock_chunked_receive() {
        let (mut mock, _handle) = MockTransport::with_chunk(5);
        let frame = build_write_request(2, &CommandRegister::new().encode());
        mock.send(&frame).unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(mock.receive(&mut buf, Duration::from_millis(10)).unwrap(), 5);
        assert_eq!(mock.receive(&mut buf, Duration::from_millis(10)).unwrap(), 5);
        assert_eq!(mock.receive(&mut buf, Duration::from_millis(10)).unwrap(), 2);
    }
}
