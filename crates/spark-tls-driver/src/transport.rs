//! 字节传输抽象：真实套接字或内存管道。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 操作引擎只在外层 I/O 泵中触碰传输，其余逻辑不关心数据来自套接字还是内存；
//! - 套接字一侧用 [`SocketIo`] 描述最小能力集，便于在测试中用脚本化实现替换真实 `TcpStream`。
//!
//! ## 契约（What）
//! - `recv` 返回 0 表示对端关闭；would-block 以 `io::ErrorKind::WouldBlock` 报告；
//! - `set_io_timeout` 在每次传输调用前由操作引擎传入剩余时长，`None` 表示无限等待；
//! - 内存管道没有独立的句柄，连接自身的 `netIn`/`netOut` 即为管道两端。

use std::io;
use std::net::TcpStream;
use std::time::Duration;

use socket2::SockRef;

use crate::config::IoMode;

/// 双工字节套接字的最小能力集。
pub trait SocketIo {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// 设置下一次 `recv`/`send` 的超时。
    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let _ = timeout;
        Ok(())
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        let _ = nonblocking;
        Ok(())
    }
}

impl SocketIo for TcpStream {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(self, buf)
    }

    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let socket = SockRef::from(&*self);
        socket.set_read_timeout(timeout)?;
        socket.set_write_timeout(timeout)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        SockRef::from(&*self).set_nonblocking(nonblocking)
    }
}

/// 仅用于内存管道连接的占位套接字类型，不可实例化。
#[derive(Debug)]
pub enum NoSocket {}

impl SocketIo for NoSocket {
    fn recv(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        match *self {}
    }

    fn send(&mut self, _buf: &[u8]) -> io::Result<usize> {
        match *self {}
    }
}

/// 连接绑定的传输。
#[derive(Debug)]
pub enum Transport<S> {
    Socket { io: S, mode: IoMode },
    MemoryPipe,
}

impl<S> Transport<S> {
    pub fn is_socket(&self) -> bool {
        matches!(self, Transport::Socket { .. })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    use super::SocketIo;

    #[test]
    fn tcp_stream_honours_timeouts() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("绑定本地端口失败");
        let addr = listener.local_addr().expect("读取本地地址失败");
        let mut client = TcpStream::connect(addr).expect("连接本地监听失败");
        let (mut server, _) = listener.accept().expect("接受连接失败");

        client
            .set_io_timeout(Some(Duration::from_millis(20)))
            .expect("设置超时失败");
        let mut buf = [0u8; 4];
        let err = client.recv(&mut buf).expect_err("无数据时应超时");
        assert!(matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ));

        server.write_all(b"ping").expect("写入失败");
        client.set_io_timeout(None).expect("清除超时失败");
        assert_eq!(client.recv(&mut buf).expect("读取失败"), 4);
        assert_eq!(&buf, b"ping");

        client.send(b"pong").expect("发送失败");
        let mut echo = [0u8; 4];
        server.read_exact(&mut echo).expect("读取失败");
        assert_eq!(&echo, b"pong");
    }
}
