//! 不透明 TLS 引擎的能力契约。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 操作引擎只依赖“把一段明文封装成记录（wrap）”与“把一条记录解密（unwrap）”两项能力，
//!   握手协议、密钥调度与记录加密全部留在引擎内部；
//! - 以 trait 表达该契约，使编排逻辑对 rustls、平台 TLS 或测试用假引擎保持多态。
//!
//! ## 契约（What）
//! - `BufferOverflow`：目标缓冲放不下一整条记录的产出，本次**未消费**任何输入；
//! - `BufferUnderflow`（仅 unwrap）：输入不足一条完整记录，本次**未消费**任何输入；
//! - `NeedTask`：调用方必须在再次 wrap/unwrap 之前同步执行并排空全部委托任务；
//! - `Finished` 只出现在 [`EngineResult`] 中，表示本次调用让握手收敛。
//!
//! ## 风险与权衡（Trade-offs）
//! - 委托任务以 `Box<dyn FnOnce() + Send>` 交付，引擎需要自行通过共享状态观察任务完成情况；
//!   换来的是操作引擎无需了解任务内容即可在调用线程上同步执行。

use thiserror::Error;

/// 一次 wrap/unwrap 的记录层结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordStatus {
    Ok,
    Closed,
    BufferOverflow,
    BufferUnderflow,
}

/// 握手状态机对调用方的要求。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandshakeStatus {
    NotHandshaking,
    NeedTask,
    NeedWrap,
    NeedUnwrap,
    Finished,
}

/// wrap/unwrap 的完整汇报。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EngineResult {
    pub status: RecordStatus,
    pub handshake_status: HandshakeStatus,
    pub bytes_consumed: usize,
    pub bytes_produced: usize,
}

impl EngineResult {
    pub fn new(
        status: RecordStatus,
        handshake_status: HandshakeStatus,
        bytes_consumed: usize,
        bytes_produced: usize,
    ) -> Self {
        Self {
            status,
            handshake_status,
            bytes_consumed,
            bytes_produced,
        }
    }
}

/// 引擎要求调用方同步执行的 CPU 密集型任务（例如证书链校验）。
pub type DelegatedTask = Box<dyn FnOnce() + Send + 'static>;

/// 引擎上报的协议级错误。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum EngineError {
    /// 记录解密、消息解析、告警等协议错误。
    #[error("{0}")]
    Protocol(String),
    /// 对端证书未通过校验。
    #[error("certificate verify failed: {0}")]
    CertificateVerification(String),
}

/// TLS 引擎能力接口。
///
/// 单个实例只被一个 [`TlsConnection`](crate::TlsConnection) 独占使用，不要求内部加锁。
pub trait TlsEngine {
    /// 把 `src` 中的明文（或握手/关闭消息）封装到 `dst`。
    fn wrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult, EngineError>;

    /// 从 `src` 解出至多一条记录，把明文写入 `dst`。
    fn unwrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult, EngineError>;

    fn handshake_status(&self) -> HandshakeStatus;

    /// 取出下一个待执行的委托任务。
    fn delegated_task(&mut self) -> Option<DelegatedTask>;

    /// 启动初次握手（或触发新握手）。
    fn begin_handshake(&mut self) -> Result<(), EngineError>;

    /// 开始关闭握手；之后的 wrap 产出 close-notify。可重复调用。
    fn close_outbound(&mut self);

    fn is_outbound_done(&self) -> bool;

    fn is_inbound_done(&self) -> bool;

    /// 单条记录密文的最大长度；操作引擎据此为 `netOut` 预留空间。
    fn packet_buffer_size(&self) -> usize;

    /// 单条记录明文的最大长度；解密残留缓冲据此扩容。
    fn application_buffer_size(&self) -> usize;

    fn is_server(&self) -> bool;

    /// 协商出的协议版本，例如 `"TLSv1.3"`。
    fn protocol_version(&self) -> Option<&str> {
        None
    }

    /// 协商出的 ALPN 协议标识。
    fn alpn_protocol(&self) -> Option<&[u8]> {
        None
    }

    /// 使当前会话不可复用（对应 `SSL_OP_NO_TICKET`）。
    fn invalidate_session(&mut self) {}
}
