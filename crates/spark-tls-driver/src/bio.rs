use crate::buffer::ByteWindow;
use crate::error::TlsError;

/// 内存管道的一端：一块 [`ByteWindow`] 加上由写入方设置的 EOF 标记。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 嵌入式场景下 TLS 连接不直接持有套接字，而是由调用方搬运密文：把收到的密文写入 `incoming`，
///   再把 `outgoing` 中的密文发往对端；
/// - EOF 标记让引擎区分“暂时没有更多密文”（需要调用方补充后重试）与“对端已关闭”（意外 EOF）。
///
/// ## 契约（What）
/// - `write_eof` 之后再 `write` 返回 [`TlsError::WriteAfterEof`]；
/// - `is_eof` 仅在已写入 EOF 且没有待读字节时为真；`did_write_eof` 只反映标记本身，
///   操作引擎在判断“是否还能等到更多密文”时使用后者。
#[derive(Debug, Default)]
pub struct MemoryBio {
    window: ByteWindow,
    eof_written: bool,
}

impl MemoryBio {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加字节，返回写入长度。
    pub fn write(&mut self, data: &[u8]) -> Result<usize, TlsError> {
        if self.eof_written {
            return Err(TlsError::WriteAfterEof);
        }
        self.window.write_bytes(data);
        Ok(data.len())
    }

    /// 读出至多 `max` 个字节。
    pub fn read(&mut self, max: usize) -> Vec<u8> {
        self.window.take(max)
    }

    /// 读出全部待读字节。
    pub fn read_all(&mut self) -> Vec<u8> {
        self.window.take(usize::MAX)
    }

    /// 标记写入方不会再写入。
    pub fn write_eof(&mut self) {
        self.eof_written = true;
    }

    pub fn did_write_eof(&self) -> bool {
        self.eof_written
    }

    pub fn is_eof(&self) -> bool {
        self.eof_written && self.window.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.window.pending()
    }

    pub(crate) fn window(&self) -> &ByteWindow {
        &self.window
    }

    pub(crate) fn window_mut(&mut self) -> &mut ByteWindow {
        &mut self.window
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryBio;
    use crate::error::TlsError;

    #[test]
    fn eof_requires_flag_and_drained_window() {
        let mut bio = MemoryBio::new();
        bio.write(b"tail").expect("写入应成功");
        bio.write_eof();
        assert!(bio.did_write_eof());
        assert!(!bio.is_eof(), "仍有待读字节时不应视为 EOF");
        assert_eq!(bio.read(2), b"ta");
        assert_eq!(bio.read_all(), b"il");
        assert!(bio.is_eof());
    }

    #[test]
    fn write_after_eof_is_rejected() {
        let mut bio = MemoryBio::new();
        bio.write_eof();
        assert!(matches!(bio.write(b"x"), Err(TlsError::WriteAfterEof)));
        assert_eq!(bio.pending(), 0);
    }
}
