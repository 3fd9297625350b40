use std::env;
use std::sync::OnceLock;

use tracing::{debug, warn};

/// 显式指定遗留编码的环境变量，值为 WHATWG 编码标签，例如 `shift_jis`
pub const LEGACY_ENCODING_ENV: &str = "TEXTIO_LEGACY_ENCODING";

/// 按优先级查找 locale 的环境变量
const LOCALE_ENVS: [&str; 3] = ["LC_ALL", "LC_CTYPE", "LANG"];

static LEGACY_ENCODING: OnceLock<&'static encoding_rs::Encoding> = OnceLock::new();

/// 遇到非法字节序列时的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// 替换为 U+FFFD 并继续解码
    #[default]
    Replace,
    /// 返回 `MalformedSequence` 错误
    Error,
}

/// 进程范围内的遗留（ANSI）编码，首次调用时解析并缓存
pub fn legacy_encoding() -> &'static encoding_rs::Encoding {
    LEGACY_ENCODING.get_or_init(|| {
        let encoding = resolve_legacy_encoding(|key| env::var(key).ok());
        debug!("Resolved legacy encoding: {}", encoding.name());
        encoding
    })
}

/// 解析顺序：`TEXTIO_LEGACY_ENCODING` > locale 字符集 > windows-1252
pub(crate) fn resolve_legacy_encoding(
    lookup: impl Fn(&str) -> Option<String>,
) -> &'static encoding_rs::Encoding {
    if let Some(label) = lookup(LEGACY_ENCODING_ENV) {
        match legacy_for_label(&label) {
            Some(encoding) => return encoding,
            None => warn!(
                "{} names no usable legacy encoding: '{}'",
                LEGACY_ENCODING_ENV, label
            ),
        }
    }

    LOCALE_ENVS
        .iter()
        .filter_map(|&key| lookup(key))
        .find(|value| !value.is_empty())
        .and_then(|locale| codeset_of(&locale).and_then(legacy_for_label))
        .unwrap_or(encoding_rs::WINDOWS_1252)
}

// ja_JP.SJIS@variant -> SJIS
fn codeset_of(locale: &str) -> Option<&str> {
    let (_, rest) = locale.split_once('.')?;
    Some(rest.split('@').next().unwrap_or(rest))
}

// UTF-8 / UTF-16 locale 不是遗留编码
fn legacy_for_label(label: &str) -> Option<&'static encoding_rs::Encoding> {
    let encoding = encoding_rs::Encoding::for_label(label.trim().as_bytes())?;
    if encoding == encoding_rs::UTF_8
        || encoding == encoding_rs::UTF_16LE
        || encoding == encoding_rs::UTF_16BE
        || encoding == encoding_rs::REPLACEMENT
    {
        return None;
    }
    Some(encoding)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn explicit_label_wins() {
        let vars = lookup(&[(LEGACY_ENCODING_ENV, "shift_jis"), ("LANG", "ru_RU.KOI8-R")]);
        assert_eq!(resolve_legacy_encoding(vars), encoding_rs::SHIFT_JIS);
    }

    #[test]
    fn locale_codeset_is_used() {
        let vars = lookup(&[("LANG", "ru_RU.KOI8-R")]);
        assert_eq!(resolve_legacy_encoding(vars), encoding_rs::KOI8_R);

        let vars = lookup(&[("LC_ALL", "ja_JP.EUC-JP@euro"), ("LANG", "C")]);
        assert_eq!(resolve_legacy_encoding(vars), encoding_rs::EUC_JP);
    }

    #[test]
    fn utf8_locale_falls_back_to_windows_1252() {
        let vars = lookup(&[("LANG", "en_US.UTF-8")]);
        assert_eq!(resolve_legacy_encoding(vars), encoding_rs::WINDOWS_1252);
        assert_eq!(resolve_legacy_encoding(lookup(&[])), encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn bogus_label_is_ignored() {
        let vars = lookup(&[(LEGACY_ENCODING_ENV, "not-a-codepage"), ("LANG", "el_GR.ISO-8859-7")]);
        assert_eq!(resolve_legacy_encoding(vars), encoding_rs::ISO_8859_7);
    }
}
