use std::time::Duration;

/// 套接字传输的 I/O 模式。
///
/// - `Blocking`：传输调用阻塞；`timeout` 为整次操作的截止时长，到期返回 [`TlsError::TimedOut`]；
/// - `NonBlocking`：传输报告 would-block 时立即以 `WantRead`/`WantWrite` 返回，调用方稍后重试同一操作。
///
/// [`TlsError::TimedOut`]: crate::TlsError::TimedOut
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IoMode {
    Blocking { timeout: Option<Duration> },
    NonBlocking,
}

impl Default for IoMode {
    fn default() -> Self {
        IoMode::Blocking { timeout: None }
    }
}

/// 单个 TLS 会话的编排选项。
///
/// # 契约说明（What）
/// - `io_mode` 仅对套接字传输生效，内存管道始终以非阻塞语义运行；
/// - `no_ticket` 为真时，每次操作开始前都会调用 [`TlsEngine::invalidate_session`]；
/// - `server_hostname` 只做记录，供上层查询，不参与证书校验。
///
/// [`TlsEngine::invalidate_session`]: crate::TlsEngine::invalidate_session
#[derive(Clone, Debug, Default)]
pub struct TlsSessionOptions {
    pub io_mode: IoMode,
    pub no_ticket: bool,
    pub server_hostname: Option<String>,
}

impl TlsSessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_io_mode(mut self, io_mode: IoMode) -> Self {
        self.io_mode = io_mode;
        self
    }

    /// 阻塞模式并设置整次操作的超时。
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.io_mode = IoMode::Blocking {
            timeout: Some(timeout),
        };
        self
    }

    pub fn with_no_ticket(mut self, no_ticket: bool) -> Self {
        self.no_ticket = no_ticket;
        self
    }

    pub fn with_server_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.server_hostname = Some(hostname.into());
        self
    }
}
