pub mod byte_stream;
pub mod decoder;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use bon::bon;
use tracing::{debug, instrument, trace};

use crate::config::MalformedPolicy;
use crate::encoding::heuristic::EncodingHeuristic;
use crate::encoding::{Encoding, bom};
use crate::error::{Result, TextError};
use byte_stream::ByteStream;
use decoder::Decoder;

/// 从字节流读取文本
///
/// 编码在构造时确定：BOM > 启发式猜测 > 调用者提示 > UTF-8。
/// 读取器独占字节流，drop 时一并关闭；所有读取方法都需要 `&mut self`，
/// 不能在多个线程间共享同一个读取器。
pub struct StreamReader<R: Read> {
    decoder: Decoder<R>,
    /// peek_char 预读的字符，read_char 优先取走
    peeked: Option<char>,
    /// 行结束符之后预读时遇到的错误，留给下一次读取返回
    deferred: Option<TextError>,
}

impl StreamReader<File> {
    /// 打开文件并根据 BOM 检测编码，没有 BOM 时按 UTF-8 读取
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::builder().stream(file).build()
    }
}

#[bon]
impl<R: Read> StreamReader<R> {
    /// # Arguments
    /// * `stream` - 字节来源，由读取器独占
    /// * `encoding` - 编码提示，只在没有 BOM 且启发式无法判断时使用
    /// * `heuristic` - 没有 BOM 时的编码猜测策略
    /// * `malformed` - 非法字节序列的处理方式
    #[builder]
    pub fn new(
        stream: R,
        encoding: Option<Encoding>,
        heuristic: Option<&dyn EncodingHeuristic>,
        #[builder(default)] malformed: MalformedPolicy,
    ) -> Result<Self> {
        let mut byte_stream = ByteStream::new(stream)?;

        let detected = match bom::detect(byte_stream.buffered()) {
            Some((encoding, len)) => {
                byte_stream.skip(len);
                Some(encoding)
            }
            None => heuristic.and_then(|heuristic| heuristic.guess(byte_stream.buffered())),
        };
        let resolved = detected.or(encoding).unwrap_or(Encoding::Utf8);
        debug!(
            "Resolved encoding {} (detected: {:?}, hint: {:?})",
            resolved, detected, encoding
        );

        let decoder = Decoder::builder()
            .encoding(resolved)
            .byte_stream(byte_stream)
            .policy(malformed)
            .build();
        Ok(Self {
            decoder,
            peeked: None,
            deferred: None,
        })
    }

    /// 检测到的编码优先，检测不出时才使用 `hint`
    pub fn with_encoding(stream: R, hint: Encoding) -> Result<Self> {
        Self::builder().stream(stream).encoding(hint).build()
    }

    pub fn encoding(&self) -> Encoding {
        self.decoder.encoding()
    }

    /// 读取一个字符
    ///
    /// # Returns
    /// - `Ok(Some(c))` - 读取到字符
    /// - `Ok(None)` - 输入流结束
    /// - `Err(error)` - 截断、非法序列或IO错误
    pub fn read_char(&mut self) -> Result<Option<char>> {
        if let Some(e) = self.deferred.take() {
            return Err(e);
        }
        if let Some(ch) = self.peeked.take() {
            return Ok(Some(ch));
        }
        self.decoder.decode_char()
    }

    /// 查看下一个字符但不消费
    pub fn peek_char(&mut self) -> Result<Option<char>> {
        if let Some(e) = self.deferred.take() {
            return Err(e);
        }
        if self.peeked.is_none() {
            self.peeked = self.decoder.decode_char()?;
        }
        Ok(self.peeked)
    }

    pub fn is_at_end(&mut self) -> Result<bool> {
        Ok(self.deferred.is_none() && self.peeked.is_none() && self.decoder.is_at_end()?)
    }

    // 行读取把截断的字符当作输入结束
    fn read_char_in_line(&mut self) -> Result<Option<char>> {
        match self.read_char() {
            Err(e) if e.is_truncated() => {
                debug!("Stopping read at truncated input: {}", e);
                Ok(None)
            }
            other => other,
        }
    }

    /// `\r` 之后紧跟的 `\n` 属于同一个行结束符
    ///
    /// 这时当前行已经读完，预读的错误推迟到下一次读取再返回。
    fn skip_line_feed(&mut self) {
        match self.peek_char() {
            Ok(Some('\n')) => self.peeked = None,
            Ok(_) => {}
            Err(e) if e.is_truncated() => {
                debug!("Stopping read at truncated input: {}", e);
            }
            Err(e) => {
                debug!("Deferring error after carriage return: {}", e);
                self.deferred = Some(e);
            }
        }
    }

    /// 读取一行，不包含行结束符
    ///
    /// `\n`、`\r\n`、`\r` 都结束一行。流已经结束时返回空字符串。
    #[instrument(skip(self))]
    pub fn read_line(&mut self) -> Result<String> {
        let mut line = String::with_capacity(256);
        while let Some(ch) = self.read_char_in_line()? {
            match ch {
                '\r' => {
                    self.skip_line_feed();
                    break;
                }
                '\n' => break,
                _ => line.push(ch),
            }
        }
        trace!("Read line of {} bytes", line.len());
        Ok(line)
    }

    /// 读取剩余的全部文本，`\r\n` 和单独的 `\r` 都转换为 `\n`
    #[instrument(skip(self))]
    pub fn read_to_end(&mut self) -> Result<String> {
        let mut text = String::with_capacity(16384);
        while let Some(ch) = self.read_char_in_line()? {
            if ch == '\r' {
                text.push('\n');
                self.skip_line_feed();
            } else {
                text.push(ch);
            }
        }
        debug!("Read {} bytes of text to end of stream", text.len());
        Ok(text)
    }

    /// 把当前行最多 `dest.len()` 个字符读入 `dest`，返回实际读取的字符数
    ///
    /// 行结束符规则与 [`read_line`](Self::read_line) 相同；行比 `dest` 长时，
    /// 剩余部分留给下一次读取。
    pub fn read_into(&mut self, dest: &mut [char]) -> Result<usize> {
        let mut count = 0;
        while count < dest.len() {
            let Some(ch) = self.read_char_in_line()? else {
                break;
            };
            match ch {
                '\r' => {
                    self.skip_line_feed();
                    break;
                }
                '\n' => break,
                _ => {
                    dest[count] = ch;
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// 逐行迭代直到流结束
    pub fn lines(&mut self) -> Lines<'_, R> {
        Lines {
            reader: self,
            failed: false,
        }
    }

    /// 取回字节流，缓冲区中尚未解码的字节会丢失
    pub fn into_inner(self) -> R {
        self.decoder.take_stream().into_inner()
    }
}

/// [`StreamReader::lines`] 返回的迭代器
pub struct Lines<'a, R: Read> {
    reader: &'a mut StreamReader<R>,
    failed: bool,
}

impl<R: Read> Iterator for Lines<'_, R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let line = match self.reader.is_at_end() {
            Ok(true) => return None,
            Ok(false) => self.reader.read_line(),
            Err(e) => Err(e),
        };
        // 出错后不再继续读取
        self.failed = line.is_err();
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::reader::byte_stream::tests::FailingReader;

    fn reader(bytes: &[u8]) -> StreamReader<Cursor<Vec<u8>>> {
        StreamReader::builder()
            .stream(Cursor::new(bytes.to_vec()))
            .build()
            .unwrap()
    }

    #[test]
    fn peek_then_read_consumes_one_character() {
        let mut reader = reader("né".as_bytes());
        assert_eq!(reader.peek_char().unwrap(), Some('n'));
        assert_eq!(reader.peek_char().unwrap(), Some('n'));
        assert_eq!(reader.read_char().unwrap(), Some('n'));
        assert_eq!(reader.read_char().unwrap(), Some('é'));
        assert_eq!(reader.read_char().unwrap(), None);
        assert!(reader.is_at_end().unwrap());
    }

    #[test]
    fn peeked_character_keeps_reader_alive() {
        let mut reader = reader(b"z");
        assert_eq!(reader.peek_char().unwrap(), Some('z'));
        // 字节已经全部消费，但预读的字符还没有
        assert!(!reader.is_at_end().unwrap());
        assert_eq!(reader.read_line().unwrap(), "z");
        assert!(reader.is_at_end().unwrap());
    }

    #[test]
    fn read_into_stops_at_capacity_and_terminators() {
        let mut reader = reader(b"abcdef\r\nxy");
        let mut buf = ['\0'; 4];

        assert_eq!(reader.read_into(&mut buf).unwrap(), 4);
        assert_eq!(buf, ['a', 'b', 'c', 'd']);
        assert_eq!(reader.read_into(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &['e', 'f']);
        assert_eq!(reader.read_into(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &['x', 'y']);
        assert_eq!(reader.read_into(&mut buf).unwrap(), 0);
    }

    #[test]
    fn truncated_tail_ends_the_line() {
        let mut reader = reader(&[b'o', b'k', 0xE2, 0x82]);
        assert_eq!(reader.read_line().unwrap(), "ok");
        assert_eq!(reader.read_line().unwrap(), "");
    }

    #[test]
    fn truncated_character_is_reported_by_read_char() {
        let mut reader = reader(&[b'o', 0xE2, 0x82]);
        assert_eq!(reader.read_char().unwrap(), Some('o'));
        assert!(reader.read_char().unwrap_err().is_truncated());
    }

    #[test]
    fn io_errors_are_not_absorbed() {
        let mut reader = StreamReader::builder()
            .stream(FailingReader::new(b"first\nsecond".to_vec()))
            .build()
            .unwrap();
        assert_eq!(reader.read_line().unwrap(), "first");
        assert!(matches!(reader.read_line(), Err(TextError::Io { .. })));
    }

    #[test]
    fn malformed_start_of_next_line_keeps_finished_line() {
        let mut reader = StreamReader::builder()
            .stream(Cursor::new(b"ab\r\xFFc\rd".to_vec()))
            .malformed(MalformedPolicy::Error)
            .build()
            .unwrap();

        assert_eq!(reader.read_line().unwrap(), "ab");
        assert!(!reader.is_at_end().unwrap());
        match reader.read_line() {
            Err(TextError::MalformedSequence { offset, bytes, .. }) => {
                assert_eq!(offset, 3);
                assert_eq!(bytes, vec![0xFF]);
            }
            other => panic!("expected a malformed sequence error, got {other:?}"),
        }
        assert_eq!(reader.read_line().unwrap(), "c");
        assert_eq!(reader.read_line().unwrap(), "d");
    }

    #[test]
    fn read_into_after_carriage_return_defers_io_error() {
        let mut reader = StreamReader::builder()
            .stream(FailingReader::new(b"xy\r".to_vec()))
            .build()
            .unwrap();
        let mut buf = ['\0'; 8];

        assert_eq!(reader.read_into(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &['x', 'y']);
        assert!(matches!(reader.read_char(), Err(TextError::Io { .. })));
    }

    #[test]
    fn lines_stop_at_end_of_stream() {
        let mut reader = reader(b"one\r\ntwo\n\nthree");
        let lines: Vec<String> = reader.lines().collect::<Result<_>>().unwrap();
        assert_eq!(lines, ["one", "two", "", "three"]);
    }

    #[test]
    fn lines_stop_after_an_error() {
        let mut reader = StreamReader::builder()
            .stream(FailingReader::new(b"a\nb".to_vec()))
            .build()
            .unwrap();
        let results: Vec<_> = reader.lines().collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_deref().unwrap(), "a");
        assert!(results[1].is_err());
    }

    #[test]
    fn into_inner_returns_the_stream() {
        let reader = reader(b"abc");
        let cursor = reader.into_inner();
        assert_eq!(cursor.get_ref(), b"abc");
    }
}
