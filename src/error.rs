use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// 字符编码被流结尾截断
    #[error("Truncated sequence at byte {offset}: {context}")]
    TruncatedSequence { context: String, offset: u64 },

    #[error("Malformed sequence at byte {offset}: {message} (bytes: {bytes:02X?})")]
    MalformedSequence {
        offset: u64,
        message: String,
        bytes: Vec<u8>,
    },

    #[error("Unsupported encoding '{encoding}', available: {available:?}")]
    UnsupportedEncoding {
        encoding: String,
        available: Vec<&'static str>,
    },
}

impl TextError {
    pub fn truncated(context: impl Into<String>, offset: u64) -> Self {
        TextError::TruncatedSequence {
            context: context.into(),
            offset,
        }
    }

    pub fn malformed(offset: u64, message: impl Into<String>, bytes: Vec<u8>) -> Self {
        TextError::MalformedSequence {
            offset,
            message: message.into(),
            bytes,
        }
    }

    /// 行读取会把截断当作输入结束
    pub fn is_truncated(&self) -> bool {
        matches!(self, TextError::TruncatedSequence { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, TextError::MalformedSequence { .. })
    }
}

pub type Result<T> = std::result::Result<T, TextError>;
