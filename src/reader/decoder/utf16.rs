use std::io::Read;

use tracing::{error, instrument, trace, warn};

use crate::{
    config::MalformedPolicy,
    encoding::ByteOrder,
    error::{Result, TextError},
    reader::byte_stream::ByteStream,
};

const HIGH_SURROGATES: std::ops::RangeInclusive<u16> = 0xD800..=0xDBFF;
const LOW_SURROGATES: std::ops::RangeInclusive<u16> = 0xDC00..=0xDFFF;

pub struct Utf16Decoder<R: Read> {
    byte_stream: ByteStream<R>,
    byte_order: ByteOrder,
    /// 高代理项后面读到的非低代理码元，留给下一次解码
    pending_unit: Option<(u16, u64)>,
    policy: MalformedPolicy,
}

impl<R: Read> Utf16Decoder<R> {
    pub fn new(byte_stream: ByteStream<R>, byte_order: ByteOrder, policy: MalformedPolicy) -> Self {
        Self {
            byte_stream,
            byte_order,
            pending_unit: None,
            policy,
        }
    }

    /// 读取一个码元，只读到一个字节就结束算作截断
    fn read_unit(&mut self) -> Result<Option<(u16, u64)>> {
        let offset = self.byte_stream.position();
        let Some(first) = self.byte_stream.next_byte()? else {
            return Ok(None);
        };
        let Some(second) = self.byte_stream.next_byte()? else {
            error!("UTF-16 decoder: unexpected EOF after first byte of a code unit");
            return Err(TextError::truncated("UTF-16 code unit cut off after 1 byte", offset));
        };
        Ok(Some((self.byte_order.read_unit([first, second]), offset)))
    }

    #[instrument(skip(self))]
    pub fn decode_char(&mut self) -> Result<Option<char>> {
        let next = match self.pending_unit.take() {
            Some(pending) => Some(pending),
            None => self.read_unit()?,
        };
        let Some((unit, offset)) = next else {
            trace!("UTF-16 decoder: reached EOF");
            return Ok(None);
        };

        if LOW_SURROGATES.contains(&unit) {
            return self.malformed(offset, unit);
        }
        if !HIGH_SURROGATES.contains(&unit) {
            // 非代理项的码元都是合法字符
            return Ok(char::from_u32(u32::from(unit)));
        }

        let Some((low, low_offset)) = self.read_unit()? else {
            error!("UTF-16 decoder: unexpected EOF inside a surrogate pair");
            return Err(TextError::truncated("UTF-16 surrogate pair cut off", offset));
        };
        if !LOW_SURROGATES.contains(&low) {
            self.pending_unit = Some((low, low_offset));
            return self.malformed(offset, unit);
        }

        let code_point = 0x1_0000 + ((u32::from(unit) - 0xD800) << 10 | (u32::from(low) - 0xDC00));
        let ch = char::from_u32(code_point);
        trace!("UTF-16 decoder: decoded surrogate pair U+{:06X}", code_point);
        Ok(ch)
    }

    fn malformed(&self, offset: u64, unit: u16) -> Result<Option<char>> {
        let message = format!("Unpaired UTF-16 surrogate 0x{:04X}", unit);
        match self.policy {
            MalformedPolicy::Replace => {
                warn!("UTF-16 decoder: {} at byte {}, replaced", message, offset);
                Ok(Some(char::REPLACEMENT_CHARACTER))
            }
            MalformedPolicy::Error => {
                error!("UTF-16 decoder: {} at byte {}", message, offset);
                Err(TextError::malformed(
                    offset,
                    message,
                    self.byte_order.write_unit(unit).to_vec(),
                ))
            }
        }
    }

    pub fn is_at_end(&mut self) -> Result<bool> {
        Ok(self.pending_unit.is_none() && self.byte_stream.is_at_end()?)
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn take_stream(self) -> ByteStream<R> {
        self.byte_stream
    }
}
