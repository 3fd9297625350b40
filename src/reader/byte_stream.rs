use std::io::{ErrorKind, Read};

use tracing::{debug, error, instrument, trace};

use crate::encoding::bom::MAX_BOM_LEN;
use crate::error::{Result, TextError};

/// 缓冲区容量，只影响系统调用次数，不影响正确性
pub const BUFFER_SIZE: usize = 4096;

/// 读取原始字节数据
/// 负责缓冲和管理IO
pub struct ByteStream<R: Read> {
    /// 读取器，由字节流独占
    reader: R,
    /// 最近一次读取到的数据，长度即有效字节数
    buffer: Vec<u8>,
    /// 下一个未消费字节在buffer中的位置
    cursor: usize,
    /// 读取器已经返回过0
    exhausted: bool,
    /// 已消费的字节总数，用于错误定位
    consumed: u64,
}

impl<R: Read> ByteStream<R> {
    /// 创建字节流并立即填充第一块缓冲区，供编码检测使用
    #[instrument(skip(reader))]
    pub fn new(reader: R) -> Result<Self> {
        debug!("Creating new ByteStream with buffer size: {}", BUFFER_SIZE);

        let mut stream = Self {
            reader,
            buffer: Vec::with_capacity(BUFFER_SIZE),
            cursor: 0,
            exhausted: false,
            consumed: 0,
        };
        stream.prime()?;
        Ok(stream)
    }

    /// 第一次填充至少要读到一个完整的BOM，除非流已经结束
    fn prime(&mut self) -> Result<()> {
        while self.buffer.len() < MAX_BOM_LEN && !self.exhausted {
            let filled = self.buffer.len();
            self.buffer.resize(BUFFER_SIZE, 0);
            let size = self.read_into(filled)?;
            self.buffer.truncate(filled + size);
        }
        trace!("Primed buffer with {} bytes", self.buffer.len());
        Ok(())
    }

    /// 读取单个字节
    ///
    /// # Returns
    /// - `Ok(Some(byte))` - 成功读取到字节
    /// - `Ok(None)` - 输入流结束
    /// - `Err(error)` - 读取过程中发生错误
    pub fn next_byte(&mut self) -> Result<Option<u8>> {
        let byte = self.peek_byte()?;
        if byte.is_some() {
            self.cursor += 1;
            self.consumed += 1;
        }
        Ok(byte)
    }

    /// 查看下一个字节，不移动游标
    pub fn peek_byte(&mut self) -> Result<Option<u8>> {
        if self.cursor == self.buffer.len() {
            self.fill_buffer()?;
        }

        let byte = self.buffer.get(self.cursor).copied();
        match byte {
            Some(byte) => trace!(
                "Next byte: 0x{:02X} ('{}')",
                byte,
                if byte.is_ascii_graphic() {
                    byte as char
                } else {
                    '.'
                }
            ),
            None => trace!("Input stream exhausted"),
        }
        Ok(byte)
    }

    /// 缓冲区耗尽时重新填充
    ///
    /// 旧数据已经全部消费，直接从索引0覆盖写入。
    #[instrument(skip(self))]
    fn fill_buffer(&mut self) -> Result<()> {
        if self.cursor < self.buffer.len() {
            trace!(
                "Buffer not empty, skipping fill (remaining: {})",
                self.buffer.len() - self.cursor
            );
            return Ok(());
        }
        if self.exhausted {
            return Ok(());
        }

        // 切片的长度是buffer的len长度，所以只需要调整长度就行，避免内存分配
        self.buffer.resize(BUFFER_SIZE, 0);
        self.cursor = 0;
        let size = self.read_into(0)?;
        self.buffer.truncate(size);
        if size > 0 {
            debug!("Buffer refilled with {} bytes at offset {}", size, self.consumed);
        }
        Ok(())
    }

    fn read_into(&mut self, start: usize) -> Result<usize> {
        loop {
            match self.reader.read(&mut self.buffer[start..]) {
                Ok(0) => {
                    debug!("Input stream closed");
                    self.exhausted = true;
                    return Ok(0);
                }
                Ok(size) => return Ok(size),
                // 被信号打断不算失败
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("I/O error during buffer fill: {}", e);
                    // 出错后缓冲区内容不可信
                    self.buffer.truncate(start);
                    return Err(TextError::Io { source: e });
                }
            }
        }
    }

    /// 缓冲区中尚未消费的字节
    pub fn buffered(&self) -> &[u8] {
        &self.buffer[self.cursor..]
    }

    /// 跳过缓冲区中的字节，最多跳到缓冲区末尾
    pub fn skip(&mut self, count: usize) {
        let count = count.min(self.buffer.len() - self.cursor);
        self.cursor += count;
        self.consumed += count as u64;
    }

    /// 已消费的字节数
    pub fn position(&self) -> u64 {
        self.consumed
    }

    /// 缓冲区已空且读取器没有更多数据
    ///
    /// 缓冲区为空但尚不知道是否结束时会阻塞读取一次。
    pub fn is_at_end(&mut self) -> Result<bool> {
        if self.cursor == self.buffer.len() {
            self.fill_buffer()?;
        }
        Ok(self.cursor == self.buffer.len() && self.exhausted)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::{self, Cursor};

    use super::*;

    /// 每次最多返回chunk个字节的读取器
    pub(crate) struct ChunkedReader {
        data: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl ChunkedReader {
        pub(crate) fn new(data: impl Into<Vec<u8>>, chunk: usize) -> Self {
            Self {
                data: Cursor::new(data.into()),
                chunk,
            }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(self.chunk);
            self.data.read(&mut buf[..len])
        }
    }

    /// 读完data后返回错误的读取器
    pub(crate) struct FailingReader {
        data: Cursor<Vec<u8>>,
    }

    impl FailingReader {
        pub(crate) fn new(data: impl Into<Vec<u8>>) -> Self {
            Self {
                data: Cursor::new(data.into()),
            }
        }
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(ErrorKind::PermissionDenied, "denied")),
                size => Ok(size),
            }
        }
    }

    fn drain<R: Read>(stream: &mut ByteStream<R>) -> Vec<u8> {
        let mut bytes = Vec::new();
        while let Some(byte) = stream.next_byte().unwrap() {
            bytes.push(byte);
        }
        bytes
    }

    #[test]
    fn refills_across_buffer_boundaries() {
        let data: Vec<u8> = (0..BUFFER_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
        let mut stream = ByteStream::new(Cursor::new(data.clone())).unwrap();

        assert_eq!(stream.buffered().len(), BUFFER_SIZE);
        assert_eq!(drain(&mut stream), data);
        assert_eq!(stream.position(), data.len() as u64);
        assert!(stream.is_at_end().unwrap());
    }

    #[test]
    fn prime_collects_a_full_bom_from_short_reads() {
        let mut stream = ByteStream::new(ChunkedReader::new(vec![0xEF, 0xBB, 0xBF, b'x'], 1)).unwrap();
        assert_eq!(stream.buffered(), &[0xEF, 0xBB, 0xBF]);

        stream.skip(3);
        assert_eq!(stream.next_byte().unwrap(), Some(b'x'));
        assert_eq!(stream.next_byte().unwrap(), None);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut stream = ByteStream::new(Cursor::new(b"ab".to_vec())).unwrap();
        assert_eq!(stream.peek_byte().unwrap(), Some(b'a'));
        assert_eq!(stream.peek_byte().unwrap(), Some(b'a'));
        assert_eq!(stream.next_byte().unwrap(), Some(b'a'));
        assert_eq!(stream.position(), 1);
        assert!(!stream.is_at_end().unwrap());
    }

    #[test]
    fn empty_stream_is_at_end() {
        let mut stream = ByteStream::new(Cursor::new(Vec::new())).unwrap();
        assert!(stream.is_at_end().unwrap());
        assert_eq!(stream.next_byte().unwrap(), None);
    }

    #[test]
    fn skip_is_clamped_to_buffer() {
        let mut stream = ByteStream::new(Cursor::new(vec![0xEF, 0xBB])).unwrap();
        stream.skip(3);
        assert_eq!(stream.position(), 2);
        assert!(stream.is_at_end().unwrap());
    }

    #[test]
    fn io_errors_propagate() {
        let mut stream = ByteStream::new(FailingReader::new(b"abcd".to_vec())).unwrap();
        assert_eq!(drain_until_error(&mut stream), b"abcd");
    }

    fn drain_until_error<R: Read>(stream: &mut ByteStream<R>) -> Vec<u8> {
        let mut bytes = Vec::new();
        loop {
            match stream.next_byte() {
                Ok(Some(byte)) => bytes.push(byte),
                Ok(None) => panic!("expected an I/O error"),
                Err(TextError::Io { source }) => {
                    assert_eq!(source.kind(), ErrorKind::PermissionDenied);
                    return bytes;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
    }
}
