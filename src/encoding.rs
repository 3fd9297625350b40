pub mod bom;
pub mod heuristic;

use std::fmt;

use encoding_rs::EncoderResult;
use tracing::{instrument, trace, warn};

use crate::config;
use crate::error::{Result, TextError};

/// UTF-16 码元的字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub fn read_unit(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(bytes),
            ByteOrder::BigEndian => u16::from_be_bytes(bytes),
        }
    }

    pub fn write_unit(self, unit: u16) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => unit.to_le_bytes(),
            ByteOrder::BigEndian => unit.to_be_bytes(),
        }
    }
}

/// 读写器支持的文本编码
///
/// 遗留编码携带具体的代码页，由 `encoding_rs` 完成转换。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16(ByteOrder),
    Legacy(&'static encoding_rs::Encoding),
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Encoding {
    pub const UTF8: Encoding = Encoding::Utf8;
    pub const UTF16_LE: Encoding = Encoding::Utf16(ByteOrder::LittleEndian);
    pub const UTF16_BE: Encoding = Encoding::Utf16(ByteOrder::BigEndian);

    /// 当前进程的遗留（ANSI）编码，见 [`config::legacy_encoding`]
    pub fn ansi() -> Self {
        Encoding::Legacy(config::legacy_encoding())
    }

    /// 把 `encoding_rs` 的编码映射到对应的变体
    pub fn from_encoding_rs(encoding: &'static encoding_rs::Encoding) -> Self {
        if encoding == encoding_rs::UTF_8 {
            Encoding::Utf8
        } else if encoding == encoding_rs::UTF_16LE {
            Encoding::UTF16_LE
        } else if encoding == encoding_rs::UTF_16BE {
            Encoding::UTF16_BE
        } else {
            Encoding::Legacy(encoding)
        }
    }

    /// 按 WHATWG 标签查找编码，大小写不敏感
    pub fn for_label(label: &str) -> Result<Self> {
        if label.eq_ignore_ascii_case("ansi") {
            return Ok(Encoding::ansi());
        }
        match encoding_rs::Encoding::for_label(label.trim().as_bytes()) {
            Some(encoding) if encoding != encoding_rs::REPLACEMENT => {
                Ok(Self::from_encoding_rs(encoding))
            }
            _ => Err(TextError::UnsupportedEncoding {
                encoding: label.to_string(),
                available: Self::get_list(),
            }),
        }
    }

    pub fn get_list() -> Vec<&'static str> {
        vec!["UTF-8", "UTF-16LE", "UTF-16BE", "ANSI", "<any WHATWG legacy label>"]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16(ByteOrder::LittleEndian) => "UTF-16LE",
            Encoding::Utf16(ByteOrder::BigEndian) => "UTF-16BE",
            Encoding::Legacy(encoding) => encoding.name(),
        }
    }

    /// 编码对应的 BOM，遗留编码没有 BOM
    pub fn bom(&self) -> Option<&'static [u8]> {
        match self {
            Encoding::Utf8 => Some(&bom::UTF8_BOM),
            Encoding::Utf16(ByteOrder::LittleEndian) => Some(&bom::UTF16_LE_BOM),
            Encoding::Utf16(ByteOrder::BigEndian) => Some(&bom::UTF16_BE_BOM),
            Encoding::Legacy(_) => None,
        }
    }

    /// 文本编码为字节
    ///
    /// 遗留编码无法表示的字符替换为 `?`。
    #[instrument(skip(text), fields(len = text.len()))]
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Utf16(order) => {
                let mut bytes = Vec::with_capacity(text.len() * 2);
                for unit in text.encode_utf16() {
                    bytes.extend_from_slice(&order.write_unit(unit));
                }
                bytes
            }
            Encoding::Legacy(encoding) => encode_legacy(*encoding, text),
        }
    }

    /// 把一段完整的字节解码为文本
    ///
    /// # Returns
    /// - `Ok(text)` - 解码成功
    /// - `Err(TruncatedSequence)` - 结尾的字符不完整
    /// - `Err(MalformedSequence)` - 出现非法字节序列
    ///
    /// 遗留编码按替换字符处理非法输入，不会失败。
    #[instrument(skip(bytes), fields(len = bytes.len()))]
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            Encoding::Utf8 => decode_utf8(bytes),
            Encoding::Utf16(order) => decode_utf16(*order, bytes),
            Encoding::Legacy(encoding) => {
                let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
                if had_errors {
                    warn!("{} decoder replaced malformed input", encoding.name());
                }
                Ok(text.into_owned())
            }
        }
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(e) => {
            let offset = e.valid_up_to();
            match e.error_len() {
                // 合法前缀之后只剩下不完整的字符
                None => Err(TextError::truncated(
                    format!("UTF-8 sequence cut off after {} bytes", bytes.len() - offset),
                    offset as u64,
                )),
                Some(len) => Err(TextError::malformed(
                    offset as u64,
                    "Invalid UTF-8 sequence",
                    bytes[offset..offset + len].to_vec(),
                )),
            }
        }
    }
}

fn decode_utf16(order: ByteOrder, bytes: &[u8]) -> Result<String> {
    let chunks = bytes.chunks_exact(2);
    let remainder = chunks.remainder();
    let units: Vec<u16> = chunks.map(|pair| order.read_unit([pair[0], pair[1]])).collect();

    let mut text = String::with_capacity(units.len());
    let mut offset = 0u64;
    for decoded in char::decode_utf16(units.iter().copied()) {
        match decoded {
            Ok(ch) => {
                text.push(ch);
                offset += ch.len_utf16() as u64 * 2;
            }
            Err(e) => {
                let unit = e.unpaired_surrogate();
                let is_last = offset as usize + 2 == units.len() * 2;
                // 结尾的高代理项缺少配对的低代理项
                if is_last && (0xD800..=0xDBFF).contains(&unit) {
                    return Err(TextError::truncated(
                        "UTF-16 surrogate pair cut off",
                        offset,
                    ));
                }
                return Err(TextError::malformed(
                    offset,
                    format!("Unpaired UTF-16 surrogate 0x{:04X}", unit),
                    order.write_unit(unit).to_vec(),
                ));
            }
        }
    }

    if !remainder.is_empty() {
        return Err(TextError::truncated(
            "UTF-16 code unit cut off after 1 byte",
            offset,
        ));
    }
    Ok(text)
}

fn encode_legacy(encoding: &'static encoding_rs::Encoding, text: &str) -> Vec<u8> {
    let mut encoder = encoding.new_encoder();
    let capacity = encoder
        .max_buffer_length_from_utf8_without_replacement(text.len())
        .unwrap_or(text.len());
    let mut bytes = Vec::with_capacity(capacity);
    let mut rest = text;

    loop {
        let (result, read) =
            encoder.encode_from_utf8_to_vec_without_replacement(rest, &mut bytes, true);
        rest = &rest[read..];
        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => {
                bytes.reserve(
                    encoder
                        .max_buffer_length_from_utf8_without_replacement(rest.len())
                        .unwrap_or(rest.len())
                        .max(16),
                );
            }
            EncoderResult::Unmappable(ch) => {
                trace!(
                    "{} cannot represent U+{:04X}, substituting '?'",
                    encoding.name(),
                    ch as u32
                );
                bytes.push(b'?');
            }
        }
    }
    bytes
}
