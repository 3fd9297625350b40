use std::io::Read;

use tracing::{error, instrument, trace, warn};

use crate::{
    config::MalformedPolicy,
    error::{Result, TextError},
    reader::byte_stream::ByteStream,
};

pub struct Utf8Decoder<R: Read> {
    byte_stream: ByteStream<R>,
    policy: MalformedPolicy,
}

impl<R: Read> Utf8Decoder<R> {
    pub fn new(byte_stream: ByteStream<R>, policy: MalformedPolicy) -> Self {
        Self {
            byte_stream,
            policy,
        }
    }

    /// 根据第一个字节确定UTF-8字符需要的字节数
    // UTF-8编码规则：
    // 1字节：0xxxxxxx
    // 2字节：110xxxxx 10xxxxxx
    // 3字节：1110xxxx 10xxxxxx 10xxxxxx
    // 4字节：11110xxx 10xxxxxx 10xxxxxx 10xxxxxx
    fn calculate_byte_count(first_byte: u8) -> u8 {
        match first_byte {
            b if b & 0b1000_0000 == 0 => 1,
            b if b & 0b1110_0000 == 0b1100_0000 => 2,
            b if b & 0b1111_0000 == 0b1110_0000 => 3,
            b if b & 0b1111_1000 == 0b1111_0000 => 4,
            _ => 0, // 无效的UTF-8起始字节
        }
    }

    /// 检查是否为UTF-8续字节 (10xxxxxx)
    fn is_continuation_byte(byte: u8) -> bool {
        byte & 0b1100_0000 == 0b1000_0000
    }

    /// 各长度能表示的最小码点，小于它就是超长编码
    fn min_code_point(byte_count: u8) -> u32 {
        match byte_count {
            2 => 0x80,
            3 => 0x800,
            _ => 0x1_0000,
        }
    }

    /// 解码一个字符
    ///
    /// # Returns
    /// - `Ok(Some(c))` - 成功解码
    /// - `Ok(None)` - 输入流结束
    /// - `Err(TruncatedSequence)` - 字符读到一半流结束
    /// - `Err(MalformedSequence)` - 非法序列且策略为 `Error`
    #[instrument(skip(self))]
    pub fn decode_char(&mut self) -> Result<Option<char>> {
        let offset = self.byte_stream.position();
        let Some(leading_byte) = self.byte_stream.next_byte()? else {
            trace!("UTF-8 decoder: reached EOF");
            return Ok(None);
        };

        let byte_count = Self::calculate_byte_count(leading_byte);
        if byte_count == 1 {
            // 单字节ASCII字符
            return Ok(Some(leading_byte as char));
        }
        if byte_count == 0 {
            return self.malformed(
                offset,
                format!("Invalid UTF-8 leading byte 0x{:02X}", leading_byte),
                vec![leading_byte],
            );
        }

        // 移除控制信息，保留数据位
        let mut code_point = u32::from(leading_byte & (0xFF >> (byte_count + 1)));
        let mut bytes_collected = vec![leading_byte];

        for i in 1..byte_count {
            // 续字节不合法时不消费它，它可能是下一个字符的开头
            let Some(continuation_byte) = self.byte_stream.peek_byte()? else {
                error!(
                    "UTF-8 decoder: unexpected EOF while reading continuation byte {} of {}",
                    i, byte_count
                );
                return Err(TextError::truncated(
                    format!("UTF-8 continuation byte {} of {}", i, byte_count),
                    offset,
                ));
            };

            if !Self::is_continuation_byte(continuation_byte) {
                return self.malformed(
                    offset,
                    format!(
                        "Expected UTF-8 continuation byte (10xxxxxx), got 0x{:02X}",
                        continuation_byte
                    ),
                    bytes_collected,
                );
            }

            self.byte_stream.next_byte()?;
            bytes_collected.push(continuation_byte);
            code_point = code_point << 6 | u32::from(continuation_byte & 0b0011_1111);
        }

        if code_point < Self::min_code_point(byte_count) {
            return self.malformed(
                offset,
                format!("Overlong encoding of U+{:04X}", code_point),
                bytes_collected,
            );
        }

        // 代理项和超出U+10FFFF的码点不是合法字符
        match char::from_u32(code_point) {
            Some(ch) => {
                trace!(
                    "UTF-8 decoder: decoded character '{}' (U+{:04X}) from {} bytes",
                    ch, code_point, byte_count
                );
                Ok(Some(ch))
            }
            None => self.malformed(
                offset,
                format!("Invalid Unicode code point U+{:08X}", code_point),
                bytes_collected,
            ),
        }
    }

    fn malformed(&self, offset: u64, message: String, bytes: Vec<u8>) -> Result<Option<char>> {
        match self.policy {
            MalformedPolicy::Replace => {
                warn!("UTF-8 decoder: {} at byte {}, replaced", message, offset);
                Ok(Some(char::REPLACEMENT_CHARACTER))
            }
            MalformedPolicy::Error => {
                error!("UTF-8 decoder: {} at byte {}", message, offset);
                Err(TextError::malformed(offset, message, bytes))
            }
        }
    }

    pub fn is_at_end(&mut self) -> Result<bool> {
        self.byte_stream.is_at_end()
    }

    pub fn take_stream(self) -> ByteStream<R> {
        self.byte_stream
    }
}
