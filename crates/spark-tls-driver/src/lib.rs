#![deny(unsafe_code)]
#![doc = r#"
# spark-tls-driver

## 设计动机（Why）
- **编排而非实现**：TLS 引擎只会把明文封装成记录（wrap）或把一条记录解密（unwrap），
  本 crate 把这两项能力编排为调用方真正需要的 `write`/`read`/`handshake`/`shutdown`；
- **可续作**：非阻塞套接字与内存管道都可能在操作中途缺少数据，所有进度保存在连接的缓冲中，
  `WantRead`/`WantWrite` 之后原样重试即可；
- **不越界读取**：入站读取量精确到当前 TLS 记录，干净关闭后原始套接字仍可用于明文通信。

## 核心契约（What）
- [`TlsEngine`]：不透明 TLS 引擎的能力接口，[`RustlsEngine`] 为基于 `rustls` 的实现；
- [`TlsConnection`]：一个 TLS 会话及其传输（套接字或内存管道），提供四个高层操作与会话元数据；
- [`TlsError`]：统一错误域，`WantRead`/`WantWrite` 为续作信号而非真正错误；
- [`ByteWindow`]/[`MemoryBio`]：带独立读写游标的字节窗口与内存管道。

## 实现策略（How）
- `operation` 模块中的收敛循环只使用已缓冲的字节驱动引擎，外层 I/O 泵负责真实的传输读写；
- 协议错误被暂存并先完成关闭握手，再上报调用方；
- 套接字超时借助 `socket2` 设置，整次操作共享一个截止时间。

## 风险与考量（Trade-offs）
- 单个连接同一时刻只允许一个进行中的操作，由 `&mut self` 在编译期保证；
- 不支持重协商：握手完成后 `handshake()` 为空操作。
"#]

mod bio;
mod buffer;
mod config;
mod connection;
mod engine;
mod error;
pub mod framing;
mod operation;
#[cfg(feature = "rustls")]
mod rustls_engine;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
mod transport;

pub use bio::MemoryBio;
pub use buffer::ByteWindow;
pub use config::{IoMode, TlsSessionOptions};
pub use connection::TlsConnection;
pub use engine::{
    DelegatedTask, EngineError, EngineResult, HandshakeStatus, RecordStatus, TlsEngine,
};
pub use error::{ErrorCode, TlsError};
#[cfg(feature = "rustls")]
pub use rustls_engine::RustlsEngine;
pub use transport::{NoSocket, SocketIo, Transport};
