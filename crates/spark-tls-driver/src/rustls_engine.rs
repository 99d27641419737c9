//! 基于 `rustls` 的 [`TlsEngine`] 实现。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 操作引擎面向的是“wrap 一段明文 / unwrap 一条记录”的记录级接口，而 rustls 暴露的是
//!   `read_tls` → `process_new_packets` → `reader()` 与 `writer()` → `write_tls` 两条泵；
//!   本适配器把后者折叠成前者，使同一套编排逻辑可以驱动真实 TLS 会话。
//!
//! ## 逻辑（How）
//! - unwrap 每次只喂给 rustls **一条**完整记录（依据记录头长度切片），随后立即处理并读出明文；
//! - 若明文放不下目标缓冲，返回 `BufferOverflow`，明文暂留在 rustls 内部，
//!   下一次以足够大的缓冲调用时交付，并在那一次报告该记录的消费长度；
//! - wrap 在握手完成后把至多一条记录的明文交给 `writer()`，再把 rustls 排队的全部密文写入目标缓冲；
//! - 握手状态由 `wants_write`/`is_handshaking` 推导，握手结束的那一次 wrap/unwrap 报告 `Finished`。
//!
//! ## 契约（What）
//! - 对端 close-notify 或任何致命错误都会结束入站方向；
//! - 证书校验失败映射为 [`EngineError::CertificateVerification`]，其余错误为 [`EngineError::Protocol`]。
//!
//! ## 风险与权衡（Trade-offs）
//! - rustls 的会话票据由配置层管理，`invalidate_session` 无法作用于单个连接，保持默认空实现。

use std::io::{Read, Write};
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{
    ClientConfig, ClientConnection, Connection, ProtocolVersion, ServerConfig, ServerConnection,
};

use crate::engine::{
    DelegatedTask, EngineError, EngineResult, HandshakeStatus, RecordStatus, TlsEngine,
};
use crate::framing::TLS_HEADER_LEN;

/// 单条记录的最大明文长度（2^14）。
const MAX_PLAINTEXT: usize = 16 * 1024;

/// 单条记录密文的上限：明文加上记录头、填充与认证标签的余量。
const MAX_PACKET: usize = MAX_PLAINTEXT + 2048;

/// 把 `rustls::Connection` 适配为 [`TlsEngine`]。
pub struct RustlsEngine {
    conn: Connection,
    server: bool,
    close_requested: bool,
    close_sent: bool,
    inbound_done: bool,
    handshake_pending: bool,
    retained: Option<RetainedRecord>,
}

/// 已解密但尚未交付的一条记录。
#[derive(Clone, Copy, Debug)]
struct RetainedRecord {
    record_len: usize,
    plaintext: usize,
}

impl RustlsEngine {
    pub fn new(conn: Connection) -> Self {
        let server = matches!(conn, Connection::Server(_));
        Self {
            conn,
            server,
            close_requested: false,
            close_sent: false,
            inbound_done: false,
            handshake_pending: true,
            retained: None,
        }
    }

    pub fn client(
        config: Arc<ClientConfig>,
        server_name: ServerName<'static>,
    ) -> Result<Self, EngineError> {
        let conn = ClientConnection::new(config, server_name).map_err(map_rustls_error)?;
        Ok(Self::new(Connection::Client(conn)))
    }

    pub fn server(config: Arc<ServerConfig>) -> Result<Self, EngineError> {
        let conn = ServerConnection::new(config).map_err(map_rustls_error)?;
        Ok(Self::new(Connection::Server(conn)))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn fail(&mut self, error: EngineError) -> EngineError {
        self.inbound_done = true;
        error
    }

    /// 当前握手状态；握手首次收敛时返回 `Finished`（仅一次）。
    fn report_status(&mut self) -> HandshakeStatus {
        let status = self.handshake_status();
        if self.handshake_pending
            && !self.conn.is_handshaking()
            && !self.conn.wants_write()
            && !self.close_requested
        {
            self.handshake_pending = false;
            return HandshakeStatus::Finished;
        }
        status
    }

    fn read_plaintext(&mut self, dst: &mut [u8]) -> Result<usize, EngineError> {
        if dst.is_empty() {
            return Ok(0);
        }
        self.conn
            .reader()
            .read_exact(dst)
            .map_err(|error| EngineError::Protocol(format!("reading decrypted data: {error}")))?;
        Ok(dst.len())
    }
}

fn map_rustls_error(error: rustls::Error) -> EngineError {
    match error {
        rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented => {
            EngineError::CertificateVerification(error.to_string())
        }
        other => EngineError::Protocol(other.to_string()),
    }
}

fn version_name(version: ProtocolVersion) -> &'static str {
    match version {
        ProtocolVersion::TLSv1_3 => "TLSv1.3",
        ProtocolVersion::TLSv1_2 => "TLSv1.2",
        _ => "unknown",
    }
}

impl TlsEngine for RustlsEngine {
    fn wrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult, EngineError> {
        let mut consumed = 0;
        if self.close_requested && !self.close_sent {
            self.conn.send_close_notify();
        } else if !self.close_sent && !self.conn.is_handshaking() && !src.is_empty() {
            let chunk = &src[..src.len().min(MAX_PLAINTEXT)];
            consumed = self
                .conn
                .writer()
                .write(chunk)
                .map_err(|error| EngineError::Protocol(format!("encrypting data: {error}")))?;
        }

        let capacity = dst.len();
        let mut out: &mut [u8] = dst;
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut out) {
                Ok(0) => break,
                Ok(_) => {}
                Err(error) => {
                    return Err(EngineError::Protocol(format!("writing tls records: {error}")));
                }
            }
        }
        let produced = capacity - out.len();

        if self.close_requested && !self.conn.wants_write() {
            self.close_sent = true;
        }
        let status = if self.close_sent {
            RecordStatus::Closed
        } else {
            RecordStatus::Ok
        };
        Ok(EngineResult::new(status, self.report_status(), consumed, produced))
    }

    fn unwrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult, EngineError> {
        if let Some(retained) = self.retained {
            if dst.len() < retained.plaintext {
                return Ok(EngineResult::new(
                    RecordStatus::BufferOverflow,
                    self.handshake_status(),
                    0,
                    0,
                ));
            }
            let produced = self.read_plaintext(&mut dst[..retained.plaintext])?;
            self.retained = None;
            return Ok(EngineResult::new(
                RecordStatus::Ok,
                self.report_status(),
                retained.record_len,
                produced,
            ));
        }
        if self.inbound_done {
            return Ok(EngineResult::new(
                RecordStatus::Closed,
                self.handshake_status(),
                0,
                0,
            ));
        }
        if src.len() < TLS_HEADER_LEN {
            return Ok(EngineResult::new(
                RecordStatus::BufferUnderflow,
                self.handshake_status(),
                0,
                0,
            ));
        }
        let record_len = TLS_HEADER_LEN + u16::from_be_bytes([src[3], src[4]]) as usize;
        if src.len() < record_len {
            return Ok(EngineResult::new(
                RecordStatus::BufferUnderflow,
                self.handshake_status(),
                0,
                0,
            ));
        }

        let mut record = &src[..record_len];
        while !record.is_empty() {
            match self.conn.read_tls(&mut record) {
                Ok(0) => break,
                Ok(_) => {}
                Err(error) => {
                    let error = EngineError::Protocol(format!("buffering tls record: {error}"));
                    return Err(self.fail(error));
                }
            }
        }
        let state = match self.conn.process_new_packets() {
            Ok(state) => state,
            Err(error) => return Err(self.fail(map_rustls_error(error))),
        };
        if state.peer_has_closed() {
            self.inbound_done = true;
        }

        let plaintext = state.plaintext_bytes_to_read();
        if plaintext > dst.len() {
            self.retained = Some(RetainedRecord {
                record_len,
                plaintext,
            });
            return Ok(EngineResult::new(
                RecordStatus::BufferOverflow,
                self.handshake_status(),
                0,
                0,
            ));
        }
        let produced = self.read_plaintext(&mut dst[..plaintext])?;
        let status = if self.inbound_done && produced == 0 {
            RecordStatus::Closed
        } else {
            RecordStatus::Ok
        };
        Ok(EngineResult::new(status, self.report_status(), record_len, produced))
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
        if self.conn.wants_write() {
            return HandshakeStatus::NeedWrap;
        }
        if self.conn.is_handshaking() && !self.inbound_done {
            return HandshakeStatus::NeedUnwrap;
        }
        HandshakeStatus::NotHandshaking
    }

    fn delegated_task(&mut self) -> Option<DelegatedTask> {
        None
    }

    fn begin_handshake(&mut self) -> Result<(), EngineError> {
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
        MAX_PACKET
    }

    fn application_buffer_size(&self) -> usize {
        MAX_PLAINTEXT
    }

    fn is_server(&self) -> bool {
        self.server
    }

    fn protocol_version(&self) -> Option<&str> {
        self.conn.protocol_version().map(version_name)
    }

    fn alpn_protocol(&self) -> Option<&[u8]> {
        self.conn.alpn_protocol()
    }
}

impl std::fmt::Debug for RustlsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustlsEngine")
            .field("server", &self.server)
            .field("handshaking", &self.conn.is_handshaking())
            .field("close_sent", &self.close_sent)
            .field("inbound_done", &self.inbound_done)
            .finish()
    }
}
