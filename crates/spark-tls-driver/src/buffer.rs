use core::fmt;

/// 带独立读写游标的可增长字节窗口。
///
/// # 设计初衷（Why）
/// - 连接内部的四块缓冲（网络入站、网络出站、解密残留、写入暂存）都需要“一端追加、一端消费”的语义，
///   同时又要把可写尾部以 `&mut [u8]` 的形式直接交给 TLS 引擎或套接字，避免额外拷贝；
/// - 引擎的 `wrap`/`unwrap` 以“消费了多少、产出了多少”汇报进度，因此游标推进必须与视图解耦。
///
/// # 结构设计（How）
/// - `bytes`：底层存储，长度即容量；
/// - `read_pos`/`write_pos`：满足 `0 <= read_pos <= write_pos <= capacity`；
/// - 读视图为 `[read_pos, write_pos)`，写视图为 `[write_pos, capacity)`；
/// - [`ByteWindow::ensure_write_capacity`] 在尾部空间不足时优先左移压实，仍不足则按“翻倍或恰好容纳”扩容。
///
/// # 契约说明（What）
/// - `apply_read(n)` 要求 `n <= pending()`，`apply_write(n)` 要求 `n <= 写视图长度`；违反即为编程错误，直接断言失败；
/// - 除压实外不会收缩，未读字节的顺序在任意操作后保持不变。
#[derive(Clone, Default)]
pub struct ByteWindow {
    bytes: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl ByteWindow {
    /// 创建空窗口，不预分配。
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建具有初始容量的窗口。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// 当前容量。
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// 已写入但尚未读取的字节数。
    pub fn pending(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    pub fn write_position(&self) -> usize {
        self.write_pos
    }

    /// 读视图 `[read_pos, write_pos)`。
    pub fn read_view(&self) -> &[u8] {
        &self.bytes[self.read_pos..self.write_pos]
    }

    /// 写视图 `[write_pos, capacity)`。
    pub fn write_view(&mut self) -> &mut [u8] {
        &mut self.bytes[self.write_pos..]
    }

    /// 读视图中第 `index` 个字节（相对 `read_pos`）。
    pub fn peek(&self, index: usize) -> Option<u8> {
        self.read_view().get(index).copied()
    }

    /// 在通过读视图消费 `n` 字节后推进读游标。
    pub fn apply_read(&mut self, n: usize) {
        assert!(
            n <= self.pending(),
            "apply_read({n}) 越过写游标：pending = {}",
            self.pending()
        );
        self.read_pos += n;
        if self.read_pos == self.write_pos {
            self.read_pos = 0;
            self.write_pos = 0;
        }
    }

    /// 在通过写视图产出 `n` 字节后推进写游标。
    pub fn apply_write(&mut self, n: usize) {
        assert!(
            n <= self.bytes.len() - self.write_pos,
            "apply_write({n}) 越过容量：free = {}",
            self.bytes.len() - self.write_pos
        );
        self.write_pos += n;
    }

    /// 保证写视图至少有 `n` 字节可用，且不丢失、不重排任何未读字节。
    ///
    /// # 执行逻辑（How）
    /// 1. 尾部空间已足够：直接返回；
    /// 2. 总空闲（含已消费前缀）足够：把未读字节左移到 0 偏移；
    /// 3. 否则重新分配为 `max(2 * capacity, pending + n)`，摊还 O(1)。
    ///
    /// 后两种情况结束后游标均为 `(0, pending)`。
    pub fn ensure_write_capacity(&mut self, n: usize) {
        let free_tail = self.bytes.len() - self.write_pos;
        if free_tail >= n {
            return;
        }
        let pending = self.pending();
        if self.bytes.len() - pending >= n {
            self.bytes.copy_within(self.read_pos..self.write_pos, 0);
        } else {
            let wanted = pending + n;
            let new_capacity = wanted.max(self.bytes.len().saturating_mul(2));
            let mut grown = vec![0; new_capacity];
            grown[..pending].copy_from_slice(&self.bytes[self.read_pos..self.write_pos]);
            self.bytes = grown;
        }
        self.read_pos = 0;
        self.write_pos = pending;
    }

    /// 追加一段字节，必要时扩容。
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.ensure_write_capacity(data.len());
        self.write_view()[..data.len()].copy_from_slice(data);
        self.apply_write(data.len());
    }

    /// 尽可能多地把未读字节复制到 `dst`，返回复制的字节数。
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        let count = self.pending().min(dst.len());
        dst[..count].copy_from_slice(&self.read_view()[..count]);
        self.apply_read(count);
        count
    }

    /// 取出至多 `max` 个未读字节。
    pub fn take(&mut self, max: usize) -> Vec<u8> {
        let count = self.pending().min(max);
        let out = self.read_view()[..count].to_vec();
        self.apply_read(count);
        out
    }

    /// 丢弃全部未读字节，保留存储。
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }
}

impl fmt::Debug for ByteWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteWindow")
            .field("capacity", &self.capacity())
            .field("read_pos", &self.read_pos)
            .field("write_pos", &self.write_pos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::ByteWindow;
    use proptest::prelude::*;

    #[test]
    fn peek_is_relative_to_read_cursor() {
        let mut window = ByteWindow::with_capacity(8);
        window.write_bytes(b"xyz");
        let mut sink = [0u8; 1];
        window.read_into(&mut sink);
        assert_eq!(window.peek(0), Some(b'y'));
        assert_eq!(window.peek(1), Some(b'z'));
        assert_eq!(window.peek(2), None);
    }

    #[test]
    fn compacts_before_growing() {
        let mut window = ByteWindow::with_capacity(8);
        window.write_bytes(b"abcdef");
        let mut sink = [0u8; 4];
        assert_eq!(window.read_into(&mut sink), 4);
        // 剩余 2 字节未读，尾部空闲 2 字节，总空闲 6 字节：应压实而不是扩容。
        window.ensure_write_capacity(5);
        assert_eq!(window.capacity(), 8);
        assert_eq!(window.read_position(), 0);
        assert_eq!(window.read_view(), b"ef");
    }

    #[test]
    fn grows_by_doubling_or_fit() {
        let mut window = ByteWindow::with_capacity(4);
        window.write_bytes(b"ab");
        window.ensure_write_capacity(3);
        assert_eq!(window.capacity(), 8);
        window.ensure_write_capacity(100);
        assert_eq!(window.capacity(), 102);
        assert_eq!(window.read_view(), b"ab");
    }

    #[test]
    fn fully_consumed_window_rewinds() {
        let mut window = ByteWindow::new();
        window.write_bytes(b"xyz");
        window.apply_read(3);
        assert_eq!((window.read_position(), window.write_position()), (0, 0));
        assert!(window.is_empty());
    }

    #[test]
    #[should_panic(expected = "apply_read")]
    fn reading_past_write_cursor_is_fatal() {
        let mut window = ByteWindow::new();
        window.write_bytes(b"a");
        window.apply_read(2);
    }

    #[test]
    #[should_panic(expected = "apply_write")]
    fn writing_past_capacity_is_fatal() {
        let mut window = ByteWindow::with_capacity(2);
        window.apply_write(3);
    }

    #[derive(Debug, Clone)]
    enum Step {
        Ensure(usize),
        Write(Vec<u8>),
        Read(usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0usize..64).prop_map(Step::Ensure),
            proptest::collection::vec(any::<u8>(), 0..48).prop_map(Step::Write),
            (0usize..64).prop_map(Step::Read),
        ]
    }

    proptest! {
        /// 任意合法操作序列下，游标不变式成立且未读字节与影子队列逐字节一致。
        #[test]
        fn cursor_invariant_and_fifo_order(steps in proptest::collection::vec(step(), 0..64)) {
            let mut window = ByteWindow::new();
            let mut shadow: std::collections::VecDeque<u8> = Default::default();
            for step in steps {
                match step {
                    Step::Ensure(n) => {
                        window.ensure_write_capacity(n);
                        prop_assert!(window.write_view().len() >= n);
                    }
                    Step::Write(data) => {
                        window.write_bytes(&data);
                        shadow.extend(data);
                    }
                    Step::Read(n) => {
                        let n = n.min(window.pending());
                        let mut out = vec![0u8; n];
                        prop_assert_eq!(window.read_into(&mut out), n);
                        let expected: Vec<u8> = shadow.drain(..n).collect();
                        prop_assert_eq!(out, expected);
                    }
                }
                prop_assert!(window.read_position() <= window.write_position());
                prop_assert!(window.write_position() <= window.capacity());
                let expected: Vec<u8> = shadow.iter().copied().collect();
                prop_assert_eq!(window.read_view(), expected.as_slice());
            }
        }
    }
}
