//! 响应提取服务 - 业务能力层
//!
//! 只负责"从模型的自由文本里取出结构化数据"这一个能力。
//! 模型输出可能带代码块标记、前后说明文字、被截断或有语法错误，
//! 这里的策略是永不报错：实在修不好就返回一个带提示文案的哨兵值。

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::utils::logging::truncate_text;

/// 无法解析时放进哨兵值 `result` 字段的提示
pub const FALLBACK_NOTICE: &str = "AI返回的内容格式无法解析，但分析可能已完成。请检查AI的原始响应。";

/// 找不到结束位置时候选文本的最大字符数
const MAX_CANDIDATE_CHARS: usize = 60_000;

/// 诊断日志里保留的前导上下文字符数
const LEADING_CONTEXT_CHARS: usize = 50;

/// 最多尝试的起始位置数量
const MAX_START_POSITIONS: usize = 16;

/// 代码块标记，允许带语言标签
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+\-]*").expect("代码块正则表达式无效"));

/// 提取结构化数据，失败时返回 `{"result": FALLBACK_NOTICE}`
pub fn extract(text: &str) -> Value {
    match try_extract(text) {
        Some(value) => value,
        None => {
            warn!("⚠️ 无法从模型输出中提取JSON，使用兜底结果");
            json!({ "result": FALLBACK_NOTICE })
        }
    }
}

/// 提取结构化数据，失败时返回 None
///
/// 编排层用它区分"真正提取到了"和"只拿到哨兵值"。
pub fn try_extract(text: &str) -> Option<Value> {
    debug!(
        "开始提取JSON，输入长度: {} 字符，预览: {}",
        text.chars().count(),
        truncate_text(text.trim(), 80)
    );

    let cleaned = strip_code_fences(text);
    let starts: Vec<usize> = cleaned
        .char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .map(|(i, _)| i)
        .take(MAX_START_POSITIONS)
        .collect();

    let Some(&first) = starts.first() else {
        debug!("输入中没有 '{{' 或 '['");
        return None;
    };
    debug!(
        "JSON 起始位置: {}，前导上下文: {:?}",
        first,
        leading_context(&cleaned, first)
    );

    // 嵌在前一个候选内部的起点留到最后：外层值被截断时，先修复外层
    let mut nested = Vec::new();
    let mut covered_end = 0;
    for &start in &starts {
        if start < covered_end {
            nested.push(start);
            continue;
        }
        let candidate = candidate_at(&cleaned, start);
        covered_end = start + candidate.len();
        if let Some(value) = parse_or_repair(candidate) {
            return Some(value);
        }
    }

    // 外层怎么都修不好时，退而求其次取内层的完整值
    nested
        .into_iter()
        .find_map(|start| parse_or_repair(candidate_at(&cleaned, start)))
}

/// 先直接解析，失败再修复后解析
fn parse_or_repair(candidate: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return Some(value);
    }
    let repaired = repair(candidate);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            debug!("✓ 修复后解析成功");
            Some(value)
        }
        Err(_) => None,
    }
}

/// 去掉代码块标记（允许带语言标签）
fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").into_owned()
}

fn leading_context(text: &str, start: usize) -> String {
    let before: Vec<char> = text[..start].chars().collect();
    let skip = before.len().saturating_sub(LEADING_CONTEXT_CHARS);
    before[skip..].iter().collect()
}

/// 从 `start` 开始的候选 JSON 文本
///
/// 深度回到 0 的位置就是值的结尾；一直没回到 0 说明被截断了，取剩余全部（有上限）。
fn candidate_at(text: &str, start: usize) -> &str {
    let rest = &text[start..];
    match value_end(rest) {
        Some(end) => &rest[..end],
        None => match rest.char_indices().nth(MAX_CANDIDATE_CHARS) {
            Some((cut, _)) => &rest[..cut],
            None => rest,
        },
    }
}

/// 扫描第一个完整值的结束位置（字节偏移，不含）
///
/// 引号在未被转义时切换"字符串内"状态，括号只在字符串外计数。
fn value_end(text: &str) -> Option<usize> {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escape = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn closer(open: char) -> char {
    if open == '{' {
        '}'
    } else {
        ']'
    }
}

/// 修复常见的语法问题
///
/// 依次处理：字符串内的裸换行、错配的右括号、未闭合的引号、
/// 结尾悬空的逗号/冒号/键/字面量、缺失的右括号、尾随逗号，最后截到第一个完整值。
fn repair(candidate: &str) -> String {
    let mut out = String::with_capacity(candidate.len() + 16);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    // 字符串外最后一个有意义的字符，字符串结束记为 '"'
    let mut last_sig: Option<char> = None;
    // 最近一个字符串之前的有意义字符
    let mut before_string: Option<char> = None;

    for ch in candidate.chars() {
        if in_string {
            if escape {
                escape = false;
                out.push(ch);
                continue;
            }
            match ch {
                '\\' => {
                    escape = true;
                    out.push(ch);
                }
                '"' => {
                    in_string = false;
                    last_sig = Some('"');
                    out.push(ch);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(ch),
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                before_string = last_sig;
                out.push(ch);
            }
            '{' | '[' => {
                stack.push(ch);
                last_sig = Some(ch);
                out.push(ch);
            }
            '}' | ']' => {
                let mut matched = false;
                while let Some(open) = stack.pop() {
                    if closer(open) == ch {
                        matched = true;
                        break;
                    }
                    out.push(closer(open));
                }
                if matched {
                    out.push(ch);
                    last_sig = Some(ch);
                }
            }
            c if c.is_whitespace() => out.push(c),
            c => {
                last_sig = Some(c);
                out.push(c);
            }
        }
    }

    if in_string {
        if escape {
            out.pop();
        }
        out.push('"');
        last_sig = Some('"');
    }

    let trimmed = out.trim_end().len();
    out.truncate(trimmed);

    match last_sig {
        Some(',') => {
            out.pop();
        }
        Some(':') => out.push_str(" null"),
        Some('"')
            if stack.last() == Some(&'{') && matches!(before_string, Some('{') | Some(',')) =>
        {
            out.push_str(": null");
        }
        Some(c) if c.is_ascii_alphabetic() => complete_literal(&mut out),
        _ => {}
    }

    for open in stack.iter().rev() {
        out.push(closer(*open));
    }

    let cleaned = remove_trailing_commas(&out);
    match value_end(&cleaned) {
        Some(end) => cleaned[..end].to_string(),
        None => cleaned,
    }
}

/// 补全被截断的 true / false / null
fn complete_literal(out: &mut String) {
    let word_start = out
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphabetic())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(out.len());
    let word = out[word_start..].to_string();
    for literal in ["true", "false", "null"] {
        if literal.starts_with(&word) {
            out.push_str(&literal[word.len()..]);
            return;
        }
    }
}

/// 去掉右括号前的逗号（字符串内的不动）
fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_code_fence() {
        let value = extract("```json\n{\"result\": \"ok\"}\n```");
        assert_eq!(value, json!({"result": "ok"}));
    }

    #[test]
    fn test_extract_with_prose_and_trailing_commentary() {
        let text = "好的，下面是分析结果：\n{\"result\": \"发现问题 {A}\", \"n\": [1, 2]}\n以上分析仅供参考 }";
        assert_eq!(
            extract(text),
            json!({"result": "发现问题 {A}", "n": [1, 2]})
        );
    }

    #[test]
    fn test_extract_skips_bracketed_prose() {
        let text = "注意[重要]：结果如下 {\"result\": \"ok\"}";
        assert_eq!(extract(text), json!({"result": "ok"}));
    }

    #[test]
    fn test_escaped_quotes_do_not_end_string() {
        let text = r#"{"result": "他说 \"你好}\" 然后离开"}"#;
        assert_eq!(extract(text)["result"], "他说 \"你好}\" 然后离开");
    }

    #[test]
    fn test_repair_missing_closers() {
        let value = extract(r#"{"summary": "文档", "sections": [{"id": "s1", "tags": ["a""#);
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("summary"));
        assert!(obj.contains_key("sections"));
        assert_eq!(value["sections"][0]["tags"][0], "a");
    }

    #[test]
    fn test_repair_trailing_comma_and_dangling_tokens() {
        assert_eq!(extract(r#"{"a": 1, "b": [1, 2,],}"#), json!({"a": 1, "b": [1, 2]}));
        assert_eq!(extract(r#"{"a": 1, "b":"#), json!({"a": 1, "b": null}));
        assert_eq!(extract(r#"{"a": 1, "b"#), json!({"a": 1, "b": null}));
        assert_eq!(extract(r#"{"a": tr"#), json!({"a": true}));
        assert_eq!(extract(r#"{"a": "被截断的文"#), json!({"a": "被截断的文"}));
    }

    #[test]
    fn test_repair_mismatched_closer() {
        assert_eq!(extract(r#"{"a": [1, 2}"#), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_raw_newline_inside_string() {
        let value = extract("{\"result\": \"第一行\n第二行\"}");
        assert_eq!(value["result"], "第一行\n第二行");
    }

    #[test]
    fn test_unrecoverable_returns_sentinel() {
        assert_eq!(extract("模型没有返回任何结构化内容"), json!({"result": FALLBACK_NOTICE}));
        assert!(try_extract("完全没有括号").is_none());
    }

    #[test]
    fn test_truncated_outline_keeps_outer_object() {
        let text = "```json\n{\"document_summary\": \"订单系统\", \"document_type\": \"产品需求文档\", \"sections\": [{\"id\": \"s1\", \"title\": \"下单\", \"content\": \"用户下单\", \"category\": \"功能需求\", \"relevance\": {\"设计缺陷检查\": 8}}, {\"id\": \"s2\", \"title\": \"支付\", \"content\": \"支付成";
        let value = try_extract(text).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("document_summary"));
        assert!(obj.contains_key("document_type"));
        let sections = value["sections"].as_array().unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0]["id"], "s1");
        assert_eq!(sections[1]["content"], "支付成");
    }

    #[test]
    fn test_truncated_with_complete_inner_values() {
        let value = try_extract(r#"{"a": {"b": [{"c": 1}, {"d": 2"#).unwrap();
        assert_eq!(value, json!({"a": {"b": [{"c": 1}, {"d": 2}]}}));
    }

    #[test]
    fn test_unrepairable_outer_falls_back_to_inner_value() {
        // 外层的 `[` 之后不是合法 JSON，修复也救不回来
        let value = try_extract("列表[未完成 {\"result\": \"ok\"}").unwrap();
        assert_eq!(value, json!({"result": "ok"}));
    }

    #[test]
    fn test_top_level_array() {
        assert_eq!(extract("结果: [1, 2, 3] 完"), json!([1, 2, 3]));
    }
}
