use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::{debug, error, instrument, trace};

use crate::encoding::Encoding;
use crate::error::{Result, TextError};

/// 把文本按固定编码写入字节流
///
/// UTF-16 编码在构造时立即写入 BOM，UTF-8 和遗留编码不写。
/// 可以传入 `&mut W` 与调用者共享同一个流。
pub struct StreamWriter<W: Write> {
    stream: W,
    encoding: Encoding,
}

impl StreamWriter<File> {
    /// 创建（或截断）文件
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn create(path: impl AsRef<Path>, encoding: Encoding) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::new(file, encoding)
    }
}

impl<W: Write> StreamWriter<W> {
    pub fn new(mut stream: W, encoding: Encoding) -> Result<Self> {
        if let (Encoding::Utf16(_), Some(bom)) = (encoding, encoding.bom()) {
            debug!("Writing {} BOM", encoding);
            write_all(&mut stream, bom)?;
        }
        Ok(Self { stream, encoding })
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn write(&mut self, text: impl AsRef<str>) -> Result<()> {
        let bytes = self.encoding.encode(text.as_ref());
        trace!("Writing {} bytes as {}", bytes.len(), self.encoding);
        write_all(&mut self.stream, &bytes)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.stream
    }
}

fn write_all<W: Write>(stream: &mut W, bytes: &[u8]) -> Result<()> {
    stream.write_all(bytes).map_err(|e| {
        error!("I/O error while writing: {}", e);
        TextError::Io { source: e }
    })
}
