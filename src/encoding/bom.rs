//! 字节顺序标记（BOM）
//!
//! 只用于读取时识别编码，写入时的编码由调用者决定。

use tracing::debug;

use super::Encoding;

/// UTF-8 BOM
pub const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
/// UTF-16 小端 BOM，按小端读取得到码元 0xFEFF
pub const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];
/// UTF-16 大端 BOM，按小端读取得到码元 0xFFFE
pub const UTF16_BE_BOM: [u8; 2] = [0xFE, 0xFF];

/// 识别 BOM 最多需要的字节数
pub const MAX_BOM_LEN: usize = UTF8_BOM.len();

const UTF16_SIGNATURE: u16 = 0xFEFF;
const UTF16_REVERSED_SIGNATURE: u16 = 0xFFFE;

/// 检查缓冲区开头的 BOM
///
/// 返回识别出的编码和需要跳过的字节数，跳过的字节数不会超过缓冲区长度。
/// UTF-8 只比较前两个字节。
pub fn detect(buffer: &[u8]) -> Option<(Encoding, usize)> {
    let detected = match buffer {
        [0xEF, 0xBB, ..] => Some((Encoding::Utf8, UTF8_BOM.len().min(buffer.len()))),
        [first, second, ..] => match u16::from_le_bytes([*first, *second]) {
            UTF16_SIGNATURE => Some((Encoding::UTF16_LE, 2)),
            UTF16_REVERSED_SIGNATURE => Some((Encoding::UTF16_BE, 2)),
            _ => None,
        },
        _ => None,
    };

    if let Some((encoding, len)) = detected {
        debug!("Detected {} BOM ({} bytes)", encoding, len);
    }
    detected
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::utf8(&[0xEF, 0xBB, 0xBF, b'a'], Some((Encoding::Utf8, 3)))]
    #[case::utf8_without_third_byte(&[0xEF, 0xBB, b'x', b'a'], Some((Encoding::Utf8, 3)))]
    #[case::utf8_short_buffer(&[0xEF, 0xBB], Some((Encoding::Utf8, 2)))]
    #[case::utf16_le(&[0xFF, 0xFE, b'a', 0x00], Some((Encoding::UTF16_LE, 2)))]
    #[case::utf16_be(&[0xFE, 0xFF, 0x00, b'a'], Some((Encoding::UTF16_BE, 2)))]
    #[case::plain_ascii(b"abc", None)]
    #[case::single_byte(&[0xFF], None)]
    #[case::empty(&[], None)]
    fn detects_signatures(#[case] buffer: &[u8], #[case] expected: Option<(Encoding, usize)>) {
        assert_eq!(detect(buffer), expected);
    }
}
