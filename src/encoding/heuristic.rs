//! 没有 BOM 时的编码猜测
//!
//! 读取器只在构造时把第一块缓冲区交给启发式策略。返回 `None` 表示无法判断，
//! 由调用者的提示或 UTF-8 兜底。

use chardetng::EncodingDetector;
use tracing::{debug, trace};

use super::Encoding;

pub trait EncodingHeuristic {
    fn guess(&self, sample: &[u8]) -> Option<Encoding>;
}

impl<F> EncodingHeuristic for F
where
    F: Fn(&[u8]) -> Option<Encoding>,
{
    fn guess(&self, sample: &[u8]) -> Option<Encoding> {
        self(sample)
    }
}

/// 根据零字节出现在奇偶位置的比例识别无 BOM 的 UTF-16
///
/// ASCII 范围的 UTF-16 小端文本每个码元的高字节（奇数位置）都是 0，大端相反。
#[derive(Debug, Clone, Copy)]
pub struct Utf16Statistics {
    /// 零字节所在位置的最低占比（百分比）
    pub dominant_percent: usize,
    /// 另一侧零字节的最高占比（百分比）
    pub stray_percent: usize,
}

impl Default for Utf16Statistics {
    fn default() -> Self {
        Self {
            dominant_percent: 60,
            stray_percent: 10,
        }
    }
}

impl EncodingHeuristic for Utf16Statistics {
    fn guess(&self, sample: &[u8]) -> Option<Encoding> {
        let units = sample.len() / 2;
        if units < 2 {
            return None;
        }

        let (mut even_zeros, mut odd_zeros) = (0usize, 0usize);
        for pair in sample.chunks_exact(2) {
            even_zeros += usize::from(pair[0] == 0);
            odd_zeros += usize::from(pair[1] == 0);
        }
        trace!(
            "UTF-16 statistics: {} units, {} even zeros, {} odd zeros",
            units, even_zeros, odd_zeros
        );

        let dominant = |zeros: usize| zeros * 100 >= units * self.dominant_percent;
        let stray = |zeros: usize| zeros * 100 <= units * self.stray_percent;

        if dominant(odd_zeros) && stray(even_zeros) {
            Some(Encoding::UTF16_LE)
        } else if dominant(even_zeros) && stray(odd_zeros) {
            Some(Encoding::UTF16_BE)
        } else {
            None
        }
    }
}

/// UTF-16 统计之后再区分 UTF-8 和遗留编码
///
/// 纯 ASCII 无法判断；合法 UTF-8（允许结尾字符被缓冲区截断）判为 UTF-8；
/// 其余交给 `chardetng` 猜测遗留编码。
#[derive(Debug, Clone, Copy, Default)]
pub struct TextStatistics {
    pub utf16: Utf16Statistics,
}

impl EncodingHeuristic for TextStatistics {
    fn guess(&self, sample: &[u8]) -> Option<Encoding> {
        if let Some(encoding) = self.utf16.guess(sample) {
            debug!("Heuristic guessed {}", encoding);
            return Some(encoding);
        }

        if sample.is_ascii() {
            return None;
        }

        let is_utf8 = match std::str::from_utf8(sample) {
            Ok(_) => true,
            Err(e) => e.error_len().is_none(),
        };
        if is_utf8 {
            debug!("Heuristic guessed UTF-8");
            return Some(Encoding::Utf8);
        }

        let mut detector = EncodingDetector::new();
        detector.feed(sample, true);
        let guessed = Encoding::from_encoding_rs(detector.guess(None, false));
        debug!("Heuristic guessed {}", guessed);
        Some(guessed)
    }
}
