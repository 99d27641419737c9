//! 测试支撑：确定性的回环 TLS 引擎与脚本化套接字。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 操作引擎的正确性取决于它如何回应引擎的各种状态组合（溢出、不足、委托任务、关闭握手、错误），
//!   真实 TLS 库很难稳定复现这些组合；[`LoopbackEngine`] 以可预测的方式逐一产出它们；
//! - [`ScriptedSocket`] 记录每一次 `recv` 请求的长度，用于断言入站读取从不越过记录边界。
//!
//! ## 逻辑（How）
//! - 回环引擎沿用 TLS 记录头格式（类型 + 版本 + 16 位长度），应用数据仅做按字节异或“加密”；
//! - 客户端握手：`NeedWrap`(hello) → `NeedUnwrap` → `Finished`；服务端握手：`NeedUnwrap` →
//!   `NeedTask`(模拟证书校验) → `NeedWrap`(finished) → `Finished`；
//! - 故障注入：[`LoopbackEngine::inject_unwrap_failures`] 让接下来若干次 unwrap 直接失败且不消费输入；
//!   未知类型的记录（见 [`corrupt_record`]）被视为致命错误并终止入站方向。
//!
//! ## 风险与权衡（Trade-offs）
//! - 仅在 `cfg(test)` 或 `test-util` 特性下编译，不参与正式构建。

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::TlsSessionOptions;
use crate::connection::TlsConnection;
use crate::engine::{
    DelegatedTask, EngineError, EngineResult, HandshakeStatus, RecordStatus, TlsEngine,
};
use crate::error::TlsError;
use crate::framing::TLS_HEADER_LEN;
use crate::transport::SocketIo;

/// 回环引擎上报的协议版本。
pub const LOOPBACK_PROTOCOL: &str = "LOOPBACK";

const CONTENT_ALERT: u8 = 21;
const CONTENT_HANDSHAKE: u8 = 22;
const CONTENT_APPLICATION: u8 = 23;
const CLOSE_NOTIFY: [u8; 2] = [1, 0];
const CLIENT_HELLO: &[u8] = b"loopback client hello";
const SERVER_FINISHED: &[u8] = b"loopback server finished";
const MASK: u8 = 0x5a;
const DEFAULT_FRAGMENT: usize = 16 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Idle,
    SendHello,
    AwaitFinished,
    AwaitHello,
    Verify,
    Established,
}

/// 确定性的假 TLS 引擎。
#[derive(Debug)]
pub struct LoopbackEngine {
    server: bool,
    phase: Phase,
    verified: Arc<AtomicBool>,
    task_issued: bool,
    max_fragment: usize,
    close_requested: bool,
    close_sent: bool,
    inbound_done: bool,
    pending_failures: usize,
    failures_raised: usize,
    stats: LoopbackStats,
}

#[derive(Clone, Copy, Debug, Default)]
struct LoopbackStats {
    wraps: usize,
    unwraps: usize,
    begins: usize,
    close_notify_sent: usize,
    invalidations: usize,
    tasks_run: usize,
}

impl LoopbackEngine {
    pub fn client() -> Self {
        Self::with_role(false)
    }

    pub fn server() -> Self {
        Self::with_role(true)
    }

    fn with_role(server: bool) -> Self {
        Self {
            server,
            phase: Phase::Idle,
            verified: Arc::new(AtomicBool::new(false)),
            task_issued: false,
            max_fragment: DEFAULT_FRAGMENT,
            close_requested: false,
            close_sent: false,
            inbound_done: false,
            pending_failures: 0,
            failures_raised: 0,
            stats: LoopbackStats::default(),
        }
    }

    /// 单条应用数据记录承载的最大明文长度。
    pub fn with_max_fragment(mut self, max_fragment: usize) -> Self {
        self.max_fragment = max_fragment.clamp(1, u16::MAX as usize);
        self
    }

    /// 接下来 `count` 次 unwrap 直接返回协议错误，且不消费任何输入。
    pub fn inject_unwrap_failures(&mut self, count: usize) {
        self.pending_failures += count;
    }

    pub fn wrap_calls(&self) -> usize {
        self.stats.wraps
    }

    pub fn unwrap_calls(&self) -> usize {
        self.stats.unwraps
    }

    /// 显式 `begin_handshake` 的调用次数（不含 wrap/unwrap 触发的自动开始）。
    pub fn begin_calls(&self) -> usize {
        self.stats.begins
    }

    pub fn close_notify_sent(&self) -> usize {
        self.stats.close_notify_sent
    }

    pub fn invalidations(&self) -> usize {
        self.stats.invalidations
    }

    pub fn tasks_run(&self) -> usize {
        self.stats.tasks_run
    }

    fn start(&mut self) {
        if self.phase == Phase::Idle {
            self.phase = if self.server {
                Phase::AwaitHello
            } else {
                Phase::SendHello
            };
        }
    }

    fn phase_status(&self) -> HandshakeStatus {
        match self.phase {
            Phase::Idle | Phase::Established => HandshakeStatus::NotHandshaking,
            Phase::SendHello => HandshakeStatus::NeedWrap,
            Phase::AwaitFinished | Phase::AwaitHello => HandshakeStatus::NeedUnwrap,
            Phase::Verify if self.verified.load(Ordering::Acquire) => HandshakeStatus::NeedWrap,
            Phase::Verify => HandshakeStatus::NeedTask,
        }
    }

    fn fatal(&mut self, message: String) -> EngineError {
        self.inbound_done = true;
        EngineError::Protocol(message)
    }

    fn result(&self, status: RecordStatus, consumed: usize, produced: usize) -> EngineResult {
        EngineResult::new(status, self.handshake_status(), consumed, produced)
    }
}

/// 按记录格式把 `payload` 写入 `dst`，放不下时返回 `None`。
fn emit(dst: &mut [u8], content_type: u8, payload: &[u8]) -> Option<usize> {
    let total = TLS_HEADER_LEN + payload.len();
    if dst.len() < total {
        return None;
    }
    let len = payload.len() as u16;
    dst[..TLS_HEADER_LEN].copy_from_slice(&[content_type, 3, 3, (len >> 8) as u8, len as u8]);
    dst[TLS_HEADER_LEN..total].copy_from_slice(payload);
    Some(total)
}

/// 一条回环引擎无法识别的记录；unwrap 时触发致命错误。
pub fn corrupt_record() -> Vec<u8> {
    vec![99, 3, 3, 0, 3, 0xde, 0xad, 0x00]
}

impl TlsEngine for LoopbackEngine {
    fn wrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult, EngineError> {
        self.stats.wraps += 1;
        self.start();
        if self.close_requested && !self.close_sent {
            let Some(produced) = emit(dst, CONTENT_ALERT, &CLOSE_NOTIFY) else {
                return Ok(self.result(RecordStatus::BufferOverflow, 0, 0));
            };
            self.close_sent = true;
            self.stats.close_notify_sent += 1;
            return Ok(self.result(RecordStatus::Closed, 0, produced));
        }
        if self.close_sent {
            return Ok(self.result(RecordStatus::Closed, 0, 0));
        }
        match self.phase_status() {
            HandshakeStatus::NeedWrap if self.phase == Phase::SendHello => {
                let Some(produced) = emit(dst, CONTENT_HANDSHAKE, CLIENT_HELLO) else {
                    return Ok(self.result(RecordStatus::BufferOverflow, 0, 0));
                };
                self.phase = Phase::AwaitFinished;
                Ok(self.result(RecordStatus::Ok, 0, produced))
            }
            HandshakeStatus::NeedWrap => {
                let Some(produced) = emit(dst, CONTENT_HANDSHAKE, SERVER_FINISHED) else {
                    return Ok(self.result(RecordStatus::BufferOverflow, 0, 0));
                };
                self.phase = Phase::Established;
                Ok(EngineResult::new(
                    RecordStatus::Ok,
                    HandshakeStatus::Finished,
                    0,
                    produced,
                ))
            }
            HandshakeStatus::NotHandshaking if !src.is_empty() => {
                let take = src.len().min(self.max_fragment);
                let masked: Vec<u8> = src[..take].iter().map(|byte| byte ^ MASK).collect();
                let Some(produced) = emit(dst, CONTENT_APPLICATION, &masked) else {
                    return Ok(self.result(RecordStatus::BufferOverflow, 0, 0));
                };
                Ok(self.result(RecordStatus::Ok, take, produced))
            }
            _ => Ok(self.result(RecordStatus::Ok, 0, 0)),
        }
    }

    fn unwrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult, EngineError> {
        self.stats.unwraps += 1;
        if self.pending_failures > 0 {
            self.pending_failures -= 1;
            self.failures_raised += 1;
            return Err(EngineError::Protocol(format!(
                "injected failure #{}",
                self.failures_raised
            )));
        }
        if self.inbound_done {
            return Ok(self.result(RecordStatus::Closed, 0, 0));
        }
        self.start();
        if src.len() < TLS_HEADER_LEN {
            return Ok(self.result(RecordStatus::BufferUnderflow, 0, 0));
        }
        let total = TLS_HEADER_LEN + u16::from_be_bytes([src[3], src[4]]) as usize;
        if src.len() < total {
            return Ok(self.result(RecordStatus::BufferUnderflow, 0, 0));
        }
        let payload = &src[TLS_HEADER_LEN..total];
        match src[0] {
            CONTENT_ALERT if payload == CLOSE_NOTIFY => {
                self.inbound_done = true;
                Ok(self.result(RecordStatus::Closed, total, 0))
            }
            CONTENT_HANDSHAKE if self.phase == Phase::AwaitHello && payload == CLIENT_HELLO => {
                self.phase = Phase::Verify;
                Ok(self.result(RecordStatus::Ok, total, 0))
            }
            CONTENT_HANDSHAKE
                if self.phase == Phase::AwaitFinished && payload == SERVER_FINISHED =>
            {
                self.phase = Phase::Established;
                Ok(EngineResult::new(
                    RecordStatus::Ok,
                    HandshakeStatus::Finished,
                    total,
                    0,
                ))
            }
            CONTENT_APPLICATION if self.phase == Phase::Established => {
                if dst.len() < payload.len() {
                    return Ok(self.result(RecordStatus::BufferOverflow, 0, 0));
                }
                for (out, byte) in dst.iter_mut().zip(payload) {
                    *out = byte ^ MASK;
                }
                Ok(self.result(RecordStatus::Ok, total, payload.len()))
            }
            content_type => Err(self.fatal(format!(
                "unexpected record type {content_type} in phase {:?}",
                self.phase
            ))),
        }
    }

    fn handshake_status(&self) -> HandshakeStatus {
        if self.close_requested && !self.close_sent {
            return HandshakeStatus::NeedWrap;
        }
        if self.close_sent {
            return if self.inbound_done {
                HandshakeStatus::NotHandshaking
            } else {
                HandshakeStatus::NeedUnwrap
            };
        }
        self.phase_status()
    }

    fn delegated_task(&mut self) -> Option<DelegatedTask> {
        if self.phase != Phase::Verify || self.task_issued {
            return None;
        }
        self.task_issued = true;
        self.stats.tasks_run += 1;
        let verified = Arc::clone(&self.verified);
        Some(Box::new(move || verified.store(true, Ordering::Release)))
    }

    fn begin_handshake(&mut self) -> Result<(), EngineError> {
        self.stats.begins += 1;
        self.start();
        Ok(())
    }

    fn close_outbound(&mut self) {
        self.close_requested = true;
    }

    fn is_outbound_done(&self) -> bool {
        self.close_sent
    }

    fn is_inbound_done(&self) -> bool {
        self.inbound_done
    }

    fn packet_buffer_size(&self) -> usize {
        TLS_HEADER_LEN + self.max_fragment.max(SERVER_FINISHED.len())
    }

    fn application_buffer_size(&self) -> usize {
        self.max_fragment
    }

    fn is_server(&self) -> bool {
        self.server
    }

    fn protocol_version(&self) -> Option<&str> {
        (self.phase == Phase::Established).then_some(LOOPBACK_PROTOCOL)
    }

    fn invalidate_session(&mut self) {
        self.stats.invalidations += 1;
    }
}

/// 把 `from` 的出站密文搬到 `to` 的入站管道，返回搬运的字节数。
///
/// 任一端不是内存管道连接时不做任何事；`to` 已写入 EOF 时密文被丢弃。
pub fn shuttle<A: TlsEngine, B: TlsEngine>(
    from: &mut TlsConnection<A>,
    to: &mut TlsConnection<B>,
) -> usize {
    let Some(outgoing) = from.outgoing() else {
        return 0;
    };
    let bytes = outgoing.read_all();
    match to.incoming() {
        Some(incoming) => incoming.write(&bytes).unwrap_or(0),
        None => 0,
    }
}

/// 在两条内存管道连接之间往返搬运密文，直到双方握手完成。
pub fn connect_memory_pair<A: TlsEngine, B: TlsEngine>(
    client_engine: A,
    server_engine: B,
) -> Result<(TlsConnection<A>, TlsConnection<B>), TlsError> {
    let mut client = TlsConnection::over_memory(client_engine, TlsSessionOptions::default());
    let mut server = TlsConnection::over_memory(server_engine, TlsSessionOptions::default());
    for _ in 0..16 {
        let client_step = client.handshake();
        shuttle(&mut client, &mut server);
        let server_step = server.handshake();
        shuttle(&mut server, &mut client);
        for step in [client_step, server_step] {
            if let Err(error) = step
                && !error.is_resumable()
            {
                return Err(error);
            }
        }
        if client.is_handshake_complete() && server.is_handshake_complete() {
            return Ok((client, server));
        }
    }
    Err(TlsError::WantRead)
}

#[derive(Debug, Default)]
struct ScriptState {
    inbound: VecDeque<u8>,
    inbound_closed: bool,
    sent: Vec<u8>,
    recv_requests: Vec<usize>,
    timeouts: Vec<Option<Duration>>,
    nonblocking: Option<bool>,
    blocked_sends: usize,
    interrupted_recvs: usize,
    send_limit: Option<usize>,
}

/// 内存中的脚本化套接字；入站数据耗尽时报告 would-block。
#[derive(Debug, Clone)]
pub struct ScriptedSocket {
    state: Arc<Mutex<ScriptState>>,
}

/// 测试一侧操纵 [`ScriptedSocket`] 的句柄。
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedSocket {
    pub fn new() -> (Self, ScriptHandle) {
        let state = Arc::new(Mutex::new(ScriptState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            ScriptHandle { state },
        )
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SocketIo for ScriptedSocket {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        state.recv_requests.push(buf.len());
        if state.interrupted_recvs > 0 {
            state.interrupted_recvs -= 1;
            return Err(io::ErrorKind::Interrupted.into());
        }
        if state.inbound.is_empty() {
            if state.inbound_closed {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let count = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.blocked_sends > 0 {
            state.blocked_sends -= 1;
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let count = state.send_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        state.sent.extend_from_slice(&buf[..count]);
        Ok(count)
    }

    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.state().timeouts.push(timeout);
        Ok(())
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        self.state().nonblocking = Some(nonblocking);
        Ok(())
    }
}

impl ScriptHandle {
    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 追加对端发来的字节。
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.state().inbound.extend(bytes.iter().copied());
    }

    /// 入站数据耗尽后 `recv` 返回 0。
    pub fn close_inbound(&self) {
        self.state().inbound_closed = true;
    }

    pub fn inbound_len(&self) -> usize {
        self.state().inbound.len()
    }

    /// 取出套接字已发送的全部字节。
    pub fn take_sent(&self) -> Vec<u8> {
        std::mem::take(&mut self.state().sent)
    }

    /// 每次 `recv` 请求的缓冲长度，按调用顺序排列。
    pub fn recv_requests(&self) -> Vec<usize> {
        self.state().recv_requests.clone()
    }

    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        self.state().timeouts.clone()
    }

    pub fn nonblocking(&self) -> Option<bool> {
        self.state().nonblocking
    }

    /// 接下来 `count` 次 `send` 报告 would-block。
    pub fn block_sends(&self, count: usize) {
        self.state().blocked_sends += count;
    }

    /// 接下来 `count` 次 `recv` 报告 `Interrupted`。
    pub fn interrupt_recvs(&self, count: usize) {
        self.state().interrupted_recvs += count;
    }

    /// 单次 `send` 最多接受的字节数。
    pub fn limit_sends(&self, limit: usize) {
        self.state().send_limit = Some(limit.max(1));
    }
}
