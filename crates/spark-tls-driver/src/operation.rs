//! 操作引擎：`write`/`read`/`handshake`/`shutdown` 的收敛循环与外层 I/O 泵。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 引擎只会 wrap/unwrap 单条记录，调用方却需要“写完全部数据”“读到一条记录的明文”“完成握手”
//!   “完成关闭握手”四种语义；本模块负责把前者编排成后者；
//! - 非阻塞调用方需要在 `WantRead`/`WantWrite` 之后原样重试，因此所有进度都保存在连接的缓冲中，
//!   而不是函数栈上。
//!
//! ## 逻辑（How）
//! - [`TlsConnection::converge`] 只使用已缓冲的字节反复调用 wrap/unwrap，直到操作完成，
//!   或者需要更多入站密文（[`Progress::WantsRead`]），或者需要先把出站密文发出去（[`Progress::WantsWrite`]）；
//! - [`TlsConnection::execute`] 是外层泵：根据收敛结果执行一次真实的传输读写，再回到收敛循环；
//! - 入站读取量由 [`bytes_to_complete_record`] 精确计算，绝不越过当前记录。
//!
//! ## 契约（What）
//! - 协议错误首次出现时被暂存并启动关闭握手；关闭握手收敛后再抛出，期间再次出错则直接抛出首个错误；
//! - 套接字模式下，任何操作都先冲刷上一次被打断时残留的出站密文；
//! - `read` 最多交付一条记录的明文，多余部分留在 `app_in_leftover` 交给下一次 `read`。
//!
//! ## 风险与权衡（Trade-offs）
//! - 每产出一条出站记录就立即冲刷，牺牲批量发送的吞吐换取握手阶段不会双方互等；
//! - 内存管道模式不冲刷，出站密文累积在 `outgoing` 中，由调用方自行搬运。

use std::io;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, trace_span, warn};

use crate::config::IoMode;
use crate::connection::TlsConnection;
use crate::engine::{EngineError, EngineResult, HandshakeStatus, RecordStatus, TlsEngine};
use crate::error::TlsError;
use crate::framing::bytes_to_complete_record;
use crate::transport::{SocketIo, Transport};

/// 调用方请求的高层操作。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Operation {
    Write,
    Read,
    Handshake,
    Shutdown,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::Write => "write",
            Operation::Read => "read",
            Operation::Handshake => "handshake",
            Operation::Shutdown => "shutdown",
        }
    }
}

/// 收敛循环交给外层泵的结论。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Progress {
    Complete,
    WantsRead,
    WantsWrite,
}

/// `read` 的目标缓冲及已填充长度；跨越外层泵的多次收敛保持不变。
pub(crate) struct ReadTarget<'a> {
    dest: &'a mut [u8],
    filled: usize,
}

impl<'a> ReadTarget<'a> {
    fn new(dest: &'a mut [u8]) -> Self {
        Self { dest, filled: 0 }
    }

    fn none() -> ReadTarget<'static> {
        ReadTarget {
            dest: &mut [],
            filled: 0,
        }
    }

    fn remaining(&mut self) -> &mut [u8] {
        &mut self.dest[self.filled..]
    }
}

impl<E: TlsEngine, S: SocketIo> TlsConnection<E, S> {
    /// 加密并发送 `data`，全部消费后返回其长度。
    ///
    /// # 契约说明（What）
    /// - 被 `WantRead`/`WantWrite`/`TimedOut` 打断时，未消费的明文保留在暂存区；
    ///   续作必须传入相同长度的数据，否则返回 [`TlsError::BadWriteRetry`]；
    /// - 其他错误会清空暂存区。
    pub fn write(&mut self, data: &[u8]) -> Result<usize, TlsError> {
        let span = trace_span!("tls_operation", op = "write");
        let _guard = span.enter();
        match self.staged_len {
            Some(len) if len != data.len() => return Err(TlsError::BadWriteRetry),
            Some(_) => {}
            None => {
                self.scratch.clear();
                self.scratch.write_bytes(data);
                self.staged_len = Some(data.len());
            }
        }
        match self.execute(Operation::Write, &mut ReadTarget::none()) {
            Ok(()) => {
                self.staged_len = None;
                Ok(data.len())
            }
            Err(error) => {
                if !interrupts_only(&error) {
                    self.staged_len = None;
                    self.scratch.clear();
                }
                Err(error)
            }
        }
    }

    /// 读取至多一条记录的明文；返回 0 表示对端已干净关闭。
    ///
    /// 若本次已有明文写入 `dest`，随后的 `WantRead`/`WantWrite`/`TimedOut` 不再上抛，
    /// 而是先交付已读到的字节。
    pub fn read(&mut self, dest: &mut [u8]) -> Result<usize, TlsError> {
        let span = trace_span!("tls_operation", op = "read");
        let _guard = span.enter();
        if dest.is_empty() {
            return Ok(0);
        }
        let mut target = ReadTarget::new(dest);
        match self.execute(Operation::Read, &mut target) {
            Ok(()) => Ok(target.filled),
            Err(error) if target.filled > 0 && interrupts_only(&error) => Ok(target.filled),
            Err(error) => Err(error),
        }
    }

    /// 分配并读取至多 `len` 字节；`len == 0` 时不触碰引擎。
    pub fn read_chunk(&mut self, len: usize) -> Result<Bytes, TlsError> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        let mut chunk = BytesMut::zeroed(len);
        let read = self.read(&mut chunk)?;
        chunk.truncate(read);
        Ok(chunk.freeze())
    }

    /// 执行初次握手；握手完成后再次调用为空操作，不发起重协商。
    pub fn handshake(&mut self) -> Result<(), TlsError> {
        let span = trace_span!("tls_operation", op = "handshake");
        let _guard = span.enter();
        if self.handshake_complete {
            return Ok(());
        }
        self.engine.begin_handshake()?;
        self.execute(Operation::Handshake, &mut ReadTarget::none())
    }

    /// 发送 close-notify 并等待对端的 close-notify。
    pub fn shutdown(&mut self) -> Result<(), TlsError> {
        let span = trace_span!("tls_operation", op = "shutdown");
        let _guard = span.enter();
        self.engine.close_outbound();
        self.execute(Operation::Shutdown, &mut ReadTarget::none())
    }

    /// 把残留的出站密文全部写入套接字；内存管道连接为空操作。
    pub fn flush_transport(&mut self) -> Result<(), TlsError> {
        let deadline = self.operation_deadline();
        self.flush_net_out(deadline)
    }

    /// 外层 I/O 泵。
    pub(crate) fn execute(
        &mut self,
        operation: Operation,
        target: &mut ReadTarget<'_>,
    ) -> Result<(), TlsError> {
        if self.options.no_ticket {
            self.engine.invalidate_session();
        }
        let deadline = self.operation_deadline();
        loop {
            match self.converge(operation, target)? {
                Progress::Complete => return Ok(()),
                Progress::WantsRead => self.fill_record(deadline)?,
                Progress::WantsWrite => self.flush_net_out(deadline)?,
            }
        }
    }

    /// 收敛循环：只使用已缓冲的字节驱动引擎。
    pub(crate) fn converge(
        &mut self,
        operation: Operation,
        target: &mut ReadTarget<'_>,
    ) -> Result<Progress, TlsError> {
        if operation == Operation::Read && self.app_in_leftover.pending() > 0 {
            let copied = self.app_in_leftover.read_into(target.remaining());
            target.filled += copied;
            return Ok(Progress::Complete);
        }
        let socket = self.transport.is_socket();
        if socket && self.net_out.pending() > 0 {
            return Ok(Progress::WantsWrite);
        }

        let mut direct = true;
        // 跨越外层泵的多次收敛：上一轮已交付的明文同样计入。
        let mut did_read_app_data = target.filled > 0;
        loop {
            let last_status = self.engine.handshake_status();
            let mut wrapping = match last_status {
                HandshakeStatus::NeedTask => {
                    self.handshake_complete = false;
                    while let Some(task) = self.engine.delegated_task() {
                        task();
                    }
                    continue;
                }
                HandshakeStatus::NeedWrap => {
                    self.handshake_complete = false;
                    true
                }
                HandshakeStatus::NeedUnwrap => {
                    self.handshake_complete = false;
                    false
                }
                HandshakeStatus::Finished => {
                    if !self.engine.is_outbound_done() {
                        self.handshake_complete = true;
                    }
                    operation != Operation::Read
                }
                HandshakeStatus::NotHandshaking => operation != Operation::Read,
            };
            if self.engine.is_outbound_done() {
                wrapping = false;
            }

            let outcome = if wrapping {
                self.wrap_once(operation)
            } else {
                // 一次 read 至多交付一条记录的明文。
                if operation == Operation::Read && did_read_app_data {
                    break;
                }
                let outcome = self.unwrap_once(target, direct);
                if let Ok(result) = &outcome {
                    did_read_app_data = result.bytes_produced > 0;
                }
                outcome
            };
            let result = match outcome {
                Ok(result) => result,
                Err(error) => {
                    if let Some(first) = self.deferred_error.take() {
                        warn!(
                            op = operation.name(),
                            first = %first,
                            second = %error,
                            "second engine error, abandoning closing handshake"
                        );
                        return Err(first);
                    }
                    debug!(op = operation.name(), %error, "engine error deferred until closing handshake");
                    self.deferred_error = Some(error.into());
                    self.engine.close_outbound();
                    continue;
                }
            };

            if result.handshake_status == HandshakeStatus::Finished
                && !self.engine.is_outbound_done()
            {
                self.handshake_complete = true;
            }
            if socket && self.net_out.pending() > 0 {
                return Ok(Progress::WantsWrite);
            }
            if result.status == RecordStatus::Closed {
                self.engine.close_outbound();
            }
            if self.engine.is_outbound_done() && self.engine.is_inbound_done() {
                debug!(op = operation.name(), "closing handshake converged");
                if let Some(error) = self.deferred_error.take() {
                    return Err(error);
                }
                match operation {
                    Operation::Read | Operation::Shutdown => break,
                    Operation::Write | Operation::Handshake => return Err(TlsError::SessionClosed),
                }
            }

            let status = self.engine.handshake_status();
            if !is_settled(status) && status != last_status {
                continue;
            }
            match result.status {
                RecordStatus::BufferOverflow if wrapping => {
                    return Err(TlsError::FramingViolation(format!(
                        "wrap overflowed a {}-byte packet buffer",
                        self.engine.packet_buffer_size()
                    )));
                }
                RecordStatus::BufferOverflow => {
                    direct = false;
                    continue;
                }
                RecordStatus::BufferUnderflow => return Ok(Progress::WantsRead),
                RecordStatus::Ok | RecordStatus::Closed => {}
            }
            if !is_settled(self.engine.handshake_status()) {
                continue;
            }
            if result.status == RecordStatus::Closed {
                continue;
            }
            match operation {
                Operation::Read if did_read_app_data => break,
                Operation::Handshake => break,
                Operation::Write if self.scratch.is_empty() => break,
                Operation::Read | Operation::Write | Operation::Shutdown => continue,
            }
        }

        if let Some(error) = self.deferred_error.take() {
            return Err(error);
        }
        Ok(Progress::Complete)
    }

    fn wrap_once(&mut self, operation: Operation) -> Result<EngineResult, EngineError> {
        let packet_size = self.engine.packet_buffer_size();
        let out = self.net_out.window_mut();
        out.ensure_write_capacity(packet_size);
        let src: &[u8] = match operation {
            Operation::Write => self.scratch.read_view(),
            _ => &[],
        };
        let result = self.engine.wrap(src, out.write_view())?;
        out.apply_write(result.bytes_produced);
        if operation == Operation::Write {
            self.scratch.apply_read(result.bytes_consumed);
        }
        Ok(result)
    }

    fn unwrap_once(
        &mut self,
        target: &mut ReadTarget<'_>,
        direct: bool,
    ) -> Result<EngineResult, EngineError> {
        let src = self.net_in.window().read_view();
        let result = if direct {
            let result = self.engine.unwrap(src, target.remaining())?;
            target.filled += result.bytes_produced;
            result
        } else {
            let app_size = self.engine.application_buffer_size();
            self.app_in_leftover.ensure_write_capacity(app_size);
            let outcome = self.engine.unwrap(src, self.app_in_leftover.write_view());
            if let Ok(result) = &outcome {
                self.app_in_leftover.apply_write(result.bytes_produced);
            }
            let copied = self.app_in_leftover.read_into(target.remaining());
            target.filled += copied;
            outcome?
        };
        self.net_in.window_mut().apply_read(result.bytes_consumed);
        Ok(result)
    }

    /// 从套接字读入恰好补齐当前记录所需的字节；内存管道则判定 EOF 或要求调用方补充密文。
    fn fill_record(&mut self, deadline: Option<Instant>) -> Result<(), TlsError> {
        if !self.transport.is_socket() {
            return Err(self.memory_wants_read());
        }
        let needed = bytes_to_complete_record(self.net_in.window().read_view())?;
        let Transport::Socket { io, mode } = &mut self.transport else {
            return Err(TlsError::WantRead);
        };
        let mode = *mode;
        let window = self.net_in.window_mut();
        window.ensure_write_capacity(needed);
        loop {
            apply_deadline(io, deadline)?;
            match io.recv(&mut window.write_view()[..needed]) {
                Ok(0) => {
                    trace!(needed, "transport reached eof");
                    return Err(self.deferred_error.take().unwrap_or(TlsError::UnexpectedEof));
                }
                Ok(received) => {
                    trace!(needed, received, "read ciphertext from transport");
                    window.apply_write(received);
                    return Ok(());
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    return Err(transport_failure(
                        &mut self.deferred_error,
                        error,
                        mode,
                        TlsError::WantRead,
                    ));
                }
            }
        }
    }

    fn memory_wants_read(&mut self) -> TlsError {
        if self.net_in.did_write_eof() {
            return self.deferred_error.take().unwrap_or(TlsError::UnexpectedEof);
        }
        TlsError::WantRead
    }

    fn flush_net_out(&mut self, deadline: Option<Instant>) -> Result<(), TlsError> {
        let Transport::Socket { io, mode } = &mut self.transport else {
            return Ok(());
        };
        let mode = *mode;
        while self.net_out.pending() > 0 {
            apply_deadline(io, deadline)?;
            match io.send(self.net_out.window().read_view()) {
                Ok(0) => {
                    return Err(TlsError::Io(io::Error::from(io::ErrorKind::WriteZero)));
                }
                Ok(sent) if sent > self.net_out.pending() => {
                    return Err(TlsError::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "transport reported {sent} bytes sent out of {} offered",
                            self.net_out.pending()
                        ),
                    )));
                }
                Ok(sent) => {
                    trace!(sent, remaining = self.net_out.pending() - sent, "flushed ciphertext");
                    self.net_out.window_mut().apply_read(sent);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    return Err(transport_failure(
                        &mut self.deferred_error,
                        error,
                        mode,
                        TlsError::WantWrite,
                    ));
                }
            }
        }
        Ok(())
    }

    fn operation_deadline(&self) -> Option<Instant> {
        match self.transport {
            Transport::Socket {
                mode: IoMode::Blocking {
                    timeout: Some(timeout),
                },
                ..
            } => Some(Instant::now() + timeout),
            _ => None,
        }
    }
}

/// 握手不再要求任何动作；部分引擎在握手收敛后持续报告 `Finished`。
fn is_settled(status: HandshakeStatus) -> bool {
    matches!(status, HandshakeStatus::NotHandshaking | HandshakeStatus::Finished)
}

/// 被打断但缓冲仍可续作的结果。
fn interrupts_only(error: &TlsError) -> bool {
    error.is_resumable() || matches!(error, TlsError::TimedOut)
}

fn apply_deadline<S: SocketIo>(io: &mut S, deadline: Option<Instant>) -> Result<(), TlsError> {
    let Some(deadline) = deadline else {
        return Ok(());
    };
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .filter(|left| *left > Duration::ZERO)
        .ok_or(TlsError::TimedOut)?;
    io.set_io_timeout(Some(remaining)).map_err(TlsError::Io)
}

/// 把传输错误映射为调用方可见的结果。
///
/// would-block 在非阻塞模式下是续作信号，在带超时的阻塞模式下意味着超时；
/// 其余错误优先上报暂存的协议错误。
fn transport_failure(
    deferred: &mut Option<TlsError>,
    error: io::Error,
    mode: IoMode,
    want: TlsError,
) -> TlsError {
    match error.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => match mode {
            IoMode::NonBlocking => want,
            IoMode::Blocking { timeout: Some(_) } => TlsError::TimedOut,
            IoMode::Blocking { timeout: None } if error.kind() == io::ErrorKind::TimedOut => {
                TlsError::TimedOut
            }
            IoMode::Blocking { timeout: None } => want,
        },
        _ => deferred.take().unwrap_or(TlsError::Io(error)),
    }
}

impl<E: TlsEngine, S: SocketIo> io::Read for TlsConnection<E, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        TlsConnection::read(self, buf).map_err(io::Error::from)
    }
}

impl<E: TlsEngine, S: SocketIo> io::Write for TlsConnection<E, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        TlsConnection::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_transport().map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use tracing_test::traced_test;

    use crate::config::{IoMode, TlsSessionOptions};
    use crate::error::TlsError;
    use crate::testing::{LoopbackEngine, connect_memory_pair, shuttle};
    use crate::transport::SocketIo;
    use crate::TlsConnection;

    fn pair() -> (TlsConnection<LoopbackEngine>, TlsConnection<LoopbackEngine>) {
        connect_memory_pair(LoopbackEngine::client(), LoopbackEngine::server())
            .expect("内存管道握手应完成")
    }

    #[test]
    fn read_delivers_leftover_before_touching_engine() {
        let (mut client, mut server) = pair();
        client.write(b"abcdefgh").expect("写入应成功");
        shuttle(&mut client, &mut server);

        let mut small = [0u8; 3];
        assert_eq!(server.read(&mut small).expect("首次读取"), 3);
        assert_eq!(&small, b"abc");
        assert_eq!(server.pending(), 5);

        let unwraps_before = server.engine().unwrap_calls();
        let mut rest = [0u8; 16];
        assert_eq!(server.read(&mut rest).expect("残留读取"), 5);
        assert_eq!(&rest[..5], b"defgh");
        assert_eq!(server.engine().unwrap_calls(), unwraps_before, "残留数据不应再调用 unwrap");
    }

    #[test]
    fn handshake_is_noop_once_complete() {
        let (mut client, _server) = pair();
        assert!(client.is_handshake_complete());
        assert_eq!(client.protocol_version(), Some("LOOPBACK"));
        let begins = client.engine().begin_calls();
        client.handshake().expect("重复握手应为空操作");
        assert_eq!(client.engine().begin_calls(), begins);
    }

    #[test]
    fn protocol_version_hidden_until_handshake_completes() {
        let client = TlsConnection::over_memory(LoopbackEngine::client(), TlsSessionOptions::default());
        assert_eq!(client.protocol_version(), None);
    }

    #[test]
    #[traced_test]
    fn deferred_error_waits_for_closing_handshake() {
        let (mut client, mut server) = pair();
        client.engine_mut().inject_unwrap_failures(1);

        let mut buf = [0u8; 32];
        let first = client.read(&mut buf).expect_err("对端 close-notify 未到达前应等待");
        assert!(matches!(first, TlsError::WantRead));
        assert!(client.has_deferred_error());
        assert_eq!(client.engine().close_notify_sent(), 1, "应先尝试关闭握手");
        assert!(logs_contain("engine error deferred until closing handshake"));

        // 对端读到 close-notify 后回应自己的 close-notify。
        shuttle(&mut client, &mut server);
        assert_eq!(server.read(&mut buf).expect("对端读到 EOF"), 0);
        shuttle(&mut server, &mut client);

        let surfaced = client.read(&mut buf).expect_err("关闭握手收敛后应抛出暂存错误");
        assert!(matches!(surfaced, TlsError::Protocol(_)));
        assert!(!client.has_deferred_error());
        assert!(logs_contain("closing handshake converged"));
    }

    #[test]
    #[traced_test]
    fn second_error_propagates_the_first() {
        let (mut client, _server) = pair();
        client.engine_mut().inject_unwrap_failures(2);

        let mut buf = [0u8; 8];
        let error = client.read(&mut buf).expect_err("第二次错误应立即上抛");
        match error {
            TlsError::Protocol(inner) => assert!(inner.to_string().contains("injected failure #1")),
            other => panic!("意外的错误类型: {other:?}"),
        }
        assert_eq!(client.engine().close_notify_sent(), 1);
        assert!(logs_contain("second engine error"));
    }

    #[test]
    fn write_and_handshake_fail_after_clean_close() {
        let (mut client, mut server) = pair();
        assert!(matches!(client.shutdown(), Err(TlsError::WantRead)));
        shuttle(&mut client, &mut server);
        let mut buf = [0u8; 4];
        assert_eq!(server.read(&mut buf).expect("对端读到 EOF"), 0);
        shuttle(&mut server, &mut client);
        client.shutdown().expect("关闭握手应完成");

        assert!(matches!(client.write(b"late"), Err(TlsError::SessionClosed)));
        assert!(matches!(server.write(b"late"), Err(TlsError::SessionClosed)));
    }

    #[test]
    fn memory_eof_without_close_notify_is_unexpected() {
        let (mut client, _server) = pair();
        let incoming = client.incoming().expect("内存管道连接应暴露入站管道");
        incoming.write_eof();
        let mut buf = [0u8; 4];
        assert!(matches!(client.read(&mut buf), Err(TlsError::UnexpectedEof)));
    }

    #[test]
    fn retried_write_must_match_staged_length() {
        let mut client = TlsConnection::over_memory(LoopbackEngine::client(), TlsSessionOptions::default());
        // 握手尚未完成，写入在等待服务端应答时被打断。
        assert!(matches!(client.write(b"hello"), Err(TlsError::WantRead)));
        assert!(matches!(client.write(b"hi"), Err(TlsError::BadWriteRetry)));
    }

    #[test]
    fn no_ticket_invalidates_session_per_operation() {
        let options = TlsSessionOptions::default().with_no_ticket(true);
        let mut client = TlsConnection::over_memory(LoopbackEngine::client(), options);
        let _ = client.handshake();
        let _ = client.handshake();
        assert_eq!(client.engine().invalidations(), 2);
    }

    #[test]
    fn read_chunk_of_zero_is_empty() {
        let mut client = TlsConnection::over_memory(LoopbackEngine::client(), TlsSessionOptions::default());
        let chunk = client.read_chunk(0).expect("零长度读取应立即返回");
        assert!(chunk.is_empty());
        assert_eq!(client.engine().unwrap_calls(), 0);
    }

    #[test]
    fn deferred_error_is_taken_once() {
        let (mut client, _server) = pair();
        client.engine_mut().inject_unwrap_failures(1);

        let mut buf = [0u8; 8];
        assert!(matches!(client.read(&mut buf), Err(TlsError::WantRead)));
        assert!(matches!(client.take_deferred_error(), Some(TlsError::Protocol(_))));
        assert!(client.take_deferred_error().is_none());
        assert!(!client.has_deferred_error());
    }

    #[test]
    fn configured_server_hostname_is_exposed() {
        let options = TlsSessionOptions::new().with_server_hostname("example.test");
        let client = TlsConnection::over_memory(LoopbackEngine::client(), options);
        assert_eq!(client.server_hostname(), Some("example.test"));
    }

    /// 报告发送量超过提交量的传输。
    struct OverReporting;

    impl SocketIo for OverReporting {
        fn recv(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }

        fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len() + 1)
        }
    }

    #[test]
    fn send_count_beyond_offered_bytes_is_rejected() {
        let options = TlsSessionOptions::new().with_io_mode(IoMode::NonBlocking);
        let mut client = TlsConnection::over_socket(LoopbackEngine::client(), OverReporting, options)
            .expect("非阻塞模式设置应成功");
        match client.handshake() {
            Err(TlsError::Io(error)) => assert_eq!(error.kind(), io::ErrorKind::InvalidData),
            other => panic!("意外的握手结果: {other:?}"),
        }
    }
}
