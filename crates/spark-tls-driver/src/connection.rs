use crate::bio::MemoryBio;
use crate::buffer::ByteWindow;
use crate::config::{IoMode, TlsSessionOptions};
use crate::engine::TlsEngine;
use crate::error::TlsError;
use crate::transport::{NoSocket, SocketIo, Transport};

/// 绑定到一个传输上的 TLS 会话。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把不透明引擎、传输以及四块缓冲聚合在一个所有者之下，使 `write/read/handshake/shutdown`
///   在被 `WantRead`/`WantWrite`/`TimedOut` 打断后可以原样续作；
/// - 暂存错误槽让协议错误先走完关闭握手再上报。
///
/// ## 结构（How）
/// - `net_in`/`net_out`：入站与出站密文。内存管道模式下二者就是调用方可见的 `incoming`/`outgoing`
///   管道，调用方直接读写，连接不再额外复制；
/// - `app_in_leftover`：一次 unwrap 解出、但调用方目标缓冲放不下的明文，下一次 `read` 原样交付；
/// - `scratch`：`write` 的明文暂存区，被打断的写入在此保留未消费的部分；
/// - `deferred_error`：只在协议错误后驱动关闭握手期间有值，收敛时被取走一次。
///
/// ## 契约（What）
/// - 同一连接同一时刻只允许一个进行中的操作；所有方法都要求 `&mut self`，由借用检查器保证；
/// - `handshake_complete` 在引擎报告 `Finished` 时置真，引擎重新进入握手时置假。
pub struct TlsConnection<E, S = NoSocket> {
    pub(crate) engine: E,
    pub(crate) transport: Transport<S>,
    pub(crate) net_in: MemoryBio,
    pub(crate) net_out: MemoryBio,
    pub(crate) app_in_leftover: ByteWindow,
    pub(crate) scratch: ByteWindow,
    pub(crate) staged_len: Option<usize>,
    pub(crate) handshake_complete: bool,
    pub(crate) deferred_error: Option<TlsError>,
    pub(crate) options: TlsSessionOptions,
}

impl<E: TlsEngine> TlsConnection<E, NoSocket> {
    /// 以内存管道为传输创建连接；密文通过 [`incoming`](Self::incoming)/[`outgoing`](Self::outgoing) 搬运。
    pub fn over_memory(engine: E, options: TlsSessionOptions) -> Self {
        Self::assemble(engine, Transport::MemoryPipe, options)
    }
}

impl<E: TlsEngine, S: SocketIo> TlsConnection<E, S> {
    /// 以套接字为传输创建连接，并按 `options.io_mode` 设置阻塞模式。
    pub fn over_socket(engine: E, mut socket: S, options: TlsSessionOptions) -> Result<Self, TlsError> {
        let mode = options.io_mode;
        socket
            .set_nonblocking(matches!(mode, IoMode::NonBlocking))
            .map_err(TlsError::Io)?;
        Ok(Self::assemble(engine, Transport::Socket { io: socket, mode }, options))
    }

    fn assemble(engine: E, transport: Transport<S>, options: TlsSessionOptions) -> Self {
        Self {
            engine,
            transport,
            net_in: MemoryBio::new(),
            net_out: MemoryBio::new(),
            app_in_leftover: ByteWindow::new(),
            scratch: ByteWindow::new(),
            staged_len: None,
            handshake_complete: false,
            deferred_error: None,
            options,
        }
    }

    /// 已解密、等待下一次 `read` 交付的字节数。
    pub fn pending(&self) -> usize {
        self.app_in_leftover.pending()
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.handshake_complete
    }

    /// 协商出的协议版本；握手完成前为 `None`。
    pub fn protocol_version(&self) -> Option<&str> {
        if !self.handshake_complete {
            return None;
        }
        self.engine.protocol_version()
    }

    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.engine.alpn_protocol()
    }

    pub fn is_server(&self) -> bool {
        self.engine.is_server()
    }

    pub fn server_hostname(&self) -> Option<&str> {
        self.options.server_hostname.as_deref()
    }

    pub fn options(&self) -> &TlsSessionOptions {
        &self.options
    }

    /// 入站密文管道；仅内存管道连接可用。
    pub fn incoming(&mut self) -> Option<&mut MemoryBio> {
        match self.transport {
            Transport::MemoryPipe => Some(&mut self.net_in),
            Transport::Socket { .. } => None,
        }
    }

    /// 出站密文管道；仅内存管道连接可用。
    pub fn outgoing(&mut self) -> Option<&mut MemoryBio> {
        match self.transport {
            Transport::MemoryPipe => Some(&mut self.net_out),
            Transport::Socket { .. } => None,
        }
    }

    /// 取走暂存的协议错误（只返回一次）。
    pub fn take_deferred_error(&mut self) -> Option<TlsError> {
        self.deferred_error.take()
    }

    pub fn has_deferred_error(&self) -> bool {
        self.deferred_error.is_some()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// 交还底层套接字，供干净关闭后继续以明文通信。
    ///
    /// 已读入但未被引擎消费的入站密文随连接一起丢弃；由于入站读取从不越过当前记录，
    /// 干净关闭之后该缓冲为空。内存管道连接返回 `None`。
    pub fn into_socket(self) -> Option<S> {
        match self.transport {
            Transport::Socket { io, .. } => Some(io),
            Transport::MemoryPipe => None,
        }
    }
}

impl<E, S> std::fmt::Debug for TlsConnection<E, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnection")
            .field("socket", &self.transport.is_socket())
            .field("net_in", &self.net_in)
            .field("net_out", &self.net_out)
            .field("app_in_leftover", &self.app_in_leftover)
            .field("handshake_complete", &self.handshake_complete)
            .field("deferred_error", &self.deferred_error)
            .finish()
    }
}
