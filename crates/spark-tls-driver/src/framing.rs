use crate::error::TlsError;

/// TLS 记录头长度：类型(1) + 版本(2) + 长度(2)。
pub const TLS_HEADER_LEN: usize = 5;

/// 计算凑齐当前这条 TLS 记录还需要从传输层读取的字节数。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 引擎只会说“输入不够”，不会说“还差多少”；若按引擎最大包长去读，可能越过记录边界，
///   把对端在 close-notify 之后发送的明文一并读走，而部分调用方会在干净关闭后复用原始套接字；
/// - 因此读取量必须精确到当前记录：不足 5 字节时只读到记录头为止，否则读到 `5 + length`。
///
/// ## 契约（What）
/// - `buffered`：`netIn` 的读视图，其起点即当前记录起点；
/// - 返回值恒大于 0；
/// - 若已缓冲的字节足以构成整条记录（引擎却仍报告不足），返回 [`TlsError::FramingViolation`]。
pub fn bytes_to_complete_record(buffered: &[u8]) -> Result<usize, TlsError> {
    let target = record_target_len(buffered);
    if buffered.len() >= target {
        return Err(TlsError::FramingViolation(format!(
            "engine requested more input but {} bytes already cover a {target}-byte record",
            buffered.len()
        )));
    }
    Ok(target - buffered.len())
}

/// 当前记录的总长度（含记录头）；记录头未齐时为 [`TLS_HEADER_LEN`]。
pub fn record_target_len(buffered: &[u8]) -> usize {
    if buffered.len() < TLS_HEADER_LEN {
        return TLS_HEADER_LEN;
    }
    TLS_HEADER_LEN + u16::from_be_bytes([buffered[3], buffered[4]]) as usize
}
