use std::collections::VecDeque;
use std::io::Read;

use encoding_rs::CoderResult;
use tracing::{error, instrument, trace, warn};

use crate::{
    config::MalformedPolicy,
    error::{Result, TextError},
    reader::byte_stream::ByteStream,
};

/// 遗留编码解码器
///
/// 逐字节喂给 `encoding_rs` 的流式解码器，直到它产出字符，
/// 多字节字符跨越缓冲区边界时也不会被拆开。
pub struct LegacyDecoder<R: Read> {
    byte_stream: ByteStream<R>,
    encoding: &'static encoding_rs::Encoding,
    decoder: encoding_rs::Decoder,
    /// 一个字节可能解出多个字符，多出来的先缓存
    pending: VecDeque<char>,
    /// 已经喂给解码器但还没有产出字符的字节
    partial: Vec<u8>,
    policy: MalformedPolicy,
}

impl<R: Read> LegacyDecoder<R> {
    pub fn new(
        byte_stream: ByteStream<R>,
        encoding: &'static encoding_rs::Encoding,
        policy: MalformedPolicy,
    ) -> Self {
        Self {
            byte_stream,
            encoding,
            decoder: encoding.new_decoder_without_bom_handling(),
            pending: VecDeque::new(),
            partial: Vec::new(),
            policy,
        }
    }

    #[instrument(skip(self), fields(encoding = self.encoding.name()))]
    pub fn decode_char(&mut self) -> Result<Option<char>> {
        if let Some(ch) = self.pending.pop_front() {
            return Ok(Some(ch));
        }

        let offset = self.byte_stream.position() - self.partial.len() as u64;
        loop {
            let Some(byte) = self.byte_stream.next_byte()? else {
                if self.partial.is_empty() {
                    trace!("{} decoder: reached EOF", self.encoding.name());
                    return Ok(None);
                }
                error!(
                    "{} decoder: unexpected EOF after {} bytes of a character",
                    self.encoding.name(),
                    self.partial.len()
                );
                self.partial.clear();
                return Err(TextError::truncated(
                    format!("{} multi-byte character", self.encoding.name()),
                    offset,
                ));
            };

            self.partial.push(byte);
            let mut out = String::with_capacity(
                self.decoder.max_utf8_buffer_length(1).unwrap_or(16),
            );
            let (result, _, had_errors) = self.decoder.decode_to_string(&[byte], &mut out, false);
            debug_assert!(matches!(result, CoderResult::InputEmpty));

            if had_errors {
                let bytes = std::mem::take(&mut self.partial);
                match self.policy {
                    MalformedPolicy::Replace => {
                        warn!(
                            "{} decoder: malformed bytes {:02X?} at byte {}, replaced",
                            self.encoding.name(),
                            bytes,
                            offset
                        );
                    }
                    MalformedPolicy::Error => {
                        error!(
                            "{} decoder: malformed bytes {:02X?} at byte {}",
                            self.encoding.name(),
                            bytes,
                            offset
                        );
                        // 非法首字节之后的 ASCII 字节会被解码器退回并一起输出，保留下来
                        let mut chars = out.chars();
                        if chars.clone().next() == Some(char::REPLACEMENT_CHARACTER) {
                            chars.next();
                        }
                        self.pending.extend(chars);
                        return Err(TextError::malformed(
                            offset,
                            format!("Invalid {} sequence", self.encoding.name()),
                            bytes,
                        ));
                    }
                }
            }

            if !out.is_empty() {
                self.partial.clear();
                self.pending.extend(out.chars());
                return Ok(self.pending.pop_front());
            }
        }
    }

    pub fn is_at_end(&mut self) -> Result<bool> {
        Ok(self.pending.is_empty() && self.byte_stream.is_at_end()?)
    }

    pub fn codepage(&self) -> &'static encoding_rs::Encoding {
        self.encoding
    }

    pub fn take_stream(self) -> ByteStream<R> {
        self.byte_stream
    }
}
