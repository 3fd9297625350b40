pub mod legacy;
pub mod utf16;
pub mod utf8;

use std::fmt;
use std::io::Read;

use bon::bon;

use crate::config::MalformedPolicy;
use crate::encoding::Encoding;
use crate::error::Result;
use crate::reader::byte_stream::ByteStream;
pub use legacy::LegacyDecoder;
pub use utf16::Utf16Decoder;
pub use utf8::Utf8Decoder;

/// 按编码逐字符解码，每个变体独占字节流
pub enum Decoder<R: Read> {
    Utf8(Utf8Decoder<R>),
    Utf16(Utf16Decoder<R>),
    Legacy(LegacyDecoder<R>),
}

impl<R: Read> fmt::Display for Decoder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encoding())
    }
}

#[bon]
impl<R: Read> Decoder<R> {
    #[builder]
    pub fn new(
        encoding: Encoding,
        byte_stream: ByteStream<R>,
        #[builder(default)] policy: MalformedPolicy,
    ) -> Self {
        match encoding {
            Encoding::Utf8 => Decoder::Utf8(Utf8Decoder::new(byte_stream, policy)),
            Encoding::Utf16(order) => Decoder::Utf16(Utf16Decoder::new(byte_stream, order, policy)),
            Encoding::Legacy(codepage) => {
                Decoder::Legacy(LegacyDecoder::new(byte_stream, codepage, policy))
            }
        }
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            Decoder::Utf8(_) => Encoding::Utf8,
            Decoder::Utf16(decoder) => Encoding::Utf16(decoder.byte_order()),
            Decoder::Legacy(decoder) => Encoding::Legacy(decoder.codepage()),
        }
    }

    pub fn decode_char(&mut self) -> Result<Option<char>> {
        match self {
            Decoder::Utf8(decoder) => decoder.decode_char(),
            Decoder::Utf16(decoder) => decoder.decode_char(),
            Decoder::Legacy(decoder) => decoder.decode_char(),
        }
    }

    pub fn is_at_end(&mut self) -> Result<bool> {
        match self {
            Decoder::Utf8(decoder) => decoder.is_at_end(),
            Decoder::Utf16(decoder) => decoder.is_at_end(),
            Decoder::Legacy(decoder) => decoder.is_at_end(),
        }
    }

    pub fn take_stream(self) -> ByteStream<R> {
        match self {
            Decoder::Utf8(decoder) => decoder.take_stream(),
            Decoder::Utf16(decoder) => decoder.take_stream(),
            Decoder::Legacy(decoder) => decoder.take_stream(),
        }
    }
}
