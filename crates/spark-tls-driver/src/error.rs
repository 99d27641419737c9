//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 汇总操作引擎对调用方暴露的全部失败与“需要 I/O”信号，使 `write/read/handshake/shutdown`
//!   只返回一种错误类型；
//! - 为每个变体分配稳定错误码，运维脚本与测试可以按码断言，而无需匹配文案。
//!
//! ## 设计要求（What）
//! - `WantRead`/`WantWrite` 不是真正的错误，而是非阻塞调用方的续作信号，[`TlsError::is_resumable`]
//!   对二者返回 `true`；
//! - 引擎错误经 [`EngineError`] 转换而来，证书校验失败单独成类；
//! - 通过 `From<TlsError> for io::Error` 接入 `std::io::Read/Write` 生态。

use std::io;

use thiserror::Error;

use crate::engine::EngineError;

/// 描述一类错误的稳定错误码及默认文案。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ErrorCode {
    pub code: &'static str,
    pub message: &'static str,
}

pub const PROTOCOL: ErrorCode = ErrorCode {
    code: "spark.tls.protocol",
    message: "tls protocol error",
};

pub const CERTIFICATE_VERIFICATION: ErrorCode = ErrorCode {
    code: "spark.tls.certificate_verify_failed",
    message: "certificate verify failed",
};

pub const SESSION_CLOSED: ErrorCode = ErrorCode {
    code: "spark.tls.session_closed",
    message: "tls session has been closed",
};

pub const UNEXPECTED_EOF: ErrorCode = ErrorCode {
    code: "spark.tls.unexpected_eof",
    message: "eof occurred in violation of protocol",
};

pub const TIMED_OUT: ErrorCode = ErrorCode {
    code: "spark.tls.timeout",
    message: "tls operation timed out",
};

pub const WANT_READ: ErrorCode = ErrorCode {
    code: "spark.tls.want_read",
    message: "the operation did not complete (read)",
};

pub const WANT_WRITE: ErrorCode = ErrorCode {
    code: "spark.tls.want_write",
    message: "the operation did not complete (write)",
};

pub const FRAMING_VIOLATION: ErrorCode = ErrorCode {
    code: "spark.tls.framing_violation",
    message: "tls record framing violation",
};

pub const BAD_WRITE_RETRY: ErrorCode = ErrorCode {
    code: "spark.tls.bad_write_retry",
    message: "bad write retry",
};

pub const WRITE_AFTER_EOF: ErrorCode = ErrorCode {
    code: "spark.tls.write_after_eof",
    message: "cannot write() after write_eof()",
};

pub const IO: ErrorCode = ErrorCode {
    code: "spark.tls.io",
    message: "transport i/o error",
};

/// TLS 操作引擎错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把引擎错误、传输错误与续作信号放进同一个枚举，调用方用一次 `match`
///   即可区分“稍后重试”“会话已结束”“致命失败”；
/// - **契约 (What)**：
///   - `Protocol`/`CertificateVerification` 在通信过程中会被暂存，待关闭握手收敛后才抛出；
///   - `FramingViolation` 表示引擎或传输违反契约，而非对端行为所致；
///   - `Io` 原样携带底层错误，`Interrupted` 已在内部重试过；
/// - **设计权衡 (Trade-offs)**：`Io` 持有不可克隆的 [`io::Error`]，因此整个枚举不实现 `Clone`，
///   暂存槽以移动语义交出错误。
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("{0}")]
    Protocol(EngineError),

    #[error("{0}")]
    CertificateVerification(EngineError),

    /// 会话已经完成关闭握手，不能再写入或握手。
    #[error("tls session has been closed")]
    SessionClosed,

    /// 对端在未发送 close-notify 的情况下关闭了传输。
    #[error("eof occurred in violation of protocol")]
    UnexpectedEof,

    #[error("tls operation timed out")]
    TimedOut,

    /// 需要更多入站密文才能继续。
    #[error("the operation did not complete (read)")]
    WantRead,

    /// 需要传输层可写后才能继续。
    #[error("the operation did not complete (write)")]
    WantWrite,

    #[error("tls record framing violation: {0}")]
    FramingViolation(String),

    /// 续作的 `write` 传入了与被打断时不同长度的数据。
    #[error("bad write retry")]
    BadWriteRetry,

    #[error("cannot write() after write_eof()")]
    WriteAfterEof,

    #[error("transport i/o error: {0}")]
    Io(#[source] io::Error),
}

impl TlsError {
    /// 稳定错误码与默认文案。
    pub fn error_code(&self) -> ErrorCode {
        match self {
            TlsError::Protocol(_) => PROTOCOL,
            TlsError::CertificateVerification(_) => CERTIFICATE_VERIFICATION,
            TlsError::SessionClosed => SESSION_CLOSED,
            TlsError::UnexpectedEof => UNEXPECTED_EOF,
            TlsError::TimedOut => TIMED_OUT,
            TlsError::WantRead => WANT_READ,
            TlsError::WantWrite => WANT_WRITE,
            TlsError::FramingViolation(_) => FRAMING_VIOLATION,
            TlsError::BadWriteRetry => BAD_WRITE_RETRY,
            TlsError::WriteAfterEof => WRITE_AFTER_EOF,
            TlsError::Io(_) => IO,
        }
    }

    pub fn code(&self) -> &'static str {
        self.error_code().code
    }

    /// 是否为非阻塞续作信号；此类结果不应记为错误日志。
    pub fn is_resumable(&self) -> bool {
        matches!(self, TlsError::WantRead | TlsError::WantWrite)
    }
}

impl From<EngineError> for TlsError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Protocol(_) => TlsError::Protocol(error),
            EngineError::CertificateVerification(_) => TlsError::CertificateVerification(error),
        }
    }
}

impl From<TlsError> for io::Error {
    fn from(error: TlsError) -> Self {
        match error {
            TlsError::Io(inner) => inner,
            other => io::Error::new(io_kind(&other), other),
        }
    }
}

fn io_kind(error: &TlsError) -> io::ErrorKind {
    match error {
        TlsError::WantRead | TlsError::WantWrite => io::ErrorKind::WouldBlock,
        TlsError::TimedOut => io::ErrorKind::TimedOut,
        TlsError::UnexpectedEof => io::ErrorKind::UnexpectedEof,
        TlsError::SessionClosed => io::ErrorKind::NotConnected,
        TlsError::BadWriteRetry | TlsError::WriteAfterEof => io::ErrorKind::InvalidInput,
        TlsError::Protocol(_) | TlsError::CertificateVerification(_) | TlsError::FramingViolation(_) => {
            io::ErrorKind::InvalidData
        }
        TlsError::Io(inner) => inner.kind(),
    }
}
