//! 文本来源 - 业务能力层
//!
//! 把文档字节变成可分析的纯文本。二进制格式的解析不在本 crate 内，
//! 这里只提供一个纯文本实现，并按分页符整理出 `[Page N]` 块。

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{AppError, AppResult};

/// 文本提取接口
pub trait TextSource: Send + Sync {
    /// 提取纯文本；没有任何可分析文本时返回 `AppError::NoExtractableText`
    fn extract_text(&self, document: &[u8]) -> AppResult<String>;
}

/// 纯文本文档
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextSource;

impl TextSource for PlainTextSource {
    fn extract_text(&self, document: &[u8]) -> AppResult<String> {
        let text = String::from_utf8_lossy(document);
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::NoExtractableText);
        }

        let pages = split_pages(text);
        debug!("📄 提取文本 {} 字符，共 {} 页", text.chars().count(), pages.len());

        Ok(pages
            .iter()
            .enumerate()
            .map(|(i, page)| format!("[Page {}]\n{}", i + 1, page))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

/// 换页符或连续三个以上换行
static PAGE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\f|\n[ \t]*\n[ \t]*\n+").expect("分页正则表达式无效")
});

/// 按换页符或连续三个以上换行切页
fn split_pages(text: &str) -> Vec<&str> {
    let pages: Vec<&str> = PAGE_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if pages.is_empty() {
        vec![text]
    } else {
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_fatal() {
        let err = PlainTextSource.extract_text(b"  \n\t ").unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, AppError::NoExtractableText));
    }

    #[test]
    fn test_single_page() {
        let text = PlainTextSource
            .extract_text("登录功能\n\n用户可以登录".as_bytes())
            .unwrap();
        assert_eq!(text, "[Page 1]\n登录功能\n\n用户可以登录");
    }

    #[test]
    fn test_form_feed_and_triple_newline_split_pages() {
        let text = PlainTextSource
            .extract_text("第一页\x0c第二页\n\n\n\n第三页".as_bytes())
            .unwrap();
        assert_eq!(text, "[Page 1]\n第一页\n\n[Page 2]\n第二页\n\n[Page 3]\n第三页");
    }
}
