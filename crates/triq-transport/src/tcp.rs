//! TCP 传输后端
//!
//! 夹爪控制器暴露一个 TCP 服务端口；本模块用阻塞 socket 加
//! 每次调用设置的读超时实现 `Transport`。

use crate::{Transport, TransportError};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;
use tracing::{debug, trace};

/// 基于 `std::net::TcpStream` 的传输后端
pub struct TcpTransport {
    stream: TcpStream,
    /// 当前生效的读超时，避免每次 receive 都走一次系统调用
    current_timeout: Option<Duration>,
}

impl TcpTransport {
    /// 以连接超时建立到控制器的 TCP 连接
    ///
    /// 关闭 Nagle 算法：命令 / 应答都是小帧，延迟比吞吐重要。
    pub fn connect(addr: SocketAddr, connect_timeout: Duration) -> Result<Self, TransportError> {
        let stream = TcpStream::connect_timeout(&addr, connect_timeout)?;
        stream.set_nodelay(true)?;
        debug!("Connected to gripper controller at {}", addr);
        Ok(Self {
            stream,
            current_timeout: None,
        })
    }

    /// 关闭连接（双向）
    pub fn shutdown(&mut self) -> Result<(), TransportError> {
        self.stream.shutdown(Shutdown::Both)?;
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes)?;
        trace!("Sent {} bytes", bytes.len());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        if self.current_timeout != Some(timeout) {
            // set_read_timeout(Some(ZERO)) 是非法参数，归一化为 1ms
            let effective = timeout.max(Duration::from_millis(1));
            self.stream.set_read_timeout(Some(effective))?;
            self.current_timeout = Some(timeout);
        }

        match self.stream.read(buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => {
                trace!("Received {} bytes", n);
                Ok(n)
            },
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Err(TransportError::Timeout)
            },
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}
