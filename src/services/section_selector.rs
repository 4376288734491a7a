//! 段落选择服务 - 业务能力层
//!
//! 给定文档结构和分析维度，挑出最相关的少量段落，并把它们渲染成
//! 不超过字符预算的提示词片段。纯内存计算，没有任何 IO。

use std::cmp::Ordering;

use tracing::debug;

use crate::models::{DimensionKey, Outline, Section};

/// 类别命中加权表时的额外分数
pub const CATEGORY_BOOST: f64 = 2.0;
/// 按分数取前几名
const TOP_N: usize = 3;
/// 最少段落数（不足时按字数补齐）
const MIN_SECTIONS: usize = 2;
/// 最多段落数
const MAX_SECTIONS: usize = 4;

/// 段落之间的分隔符
pub const SECTION_DELIMITER: &str = "\n\n---\n\n";
/// 内容被截断时追加的标记
pub const TRUNCATION_MARKER: &str = "\n\n[内容已截断以控制token消耗]";

/// 挑选与维度最相关的段落（最多 4 个，不重复）
///
/// 只有在文档本身少于 2 个段落时返回结果才会少于 2 个。
pub fn select(outline: &Outline, dimension: DimensionKey) -> Vec<&Section> {
    let sections = &outline.sections;

    let mut scored: Vec<(usize, f64)> = sections
        .iter()
        .enumerate()
        .map(|(i, s)| (i, s.relevance_for(dimension)))
        .filter(|(_, score)| *score > 0.0)
        .collect();

    if scored.len() < TOP_N {
        let affinity = dimension.affinity_categories();
        let boosted: Vec<(usize, f64)> = sections
            .iter()
            .enumerate()
            .filter(|(i, s)| {
                affinity.contains(&s.category) && !scored.iter().any(|(j, _)| j == i)
            })
            .map(|(i, s)| (i, s.relevance_for(dimension) + CATEGORY_BOOST))
            .collect();
        if !boosted.is_empty() {
            debug!(
                "维度 {} 相关段落不足，按类别补充 {} 个候选",
                dimension,
                boosted.len()
            );
        }
        scored.extend(boosted);
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    let mut picked: Vec<usize> = scored.into_iter().take(TOP_N).map(|(i, _)| i).collect();

    let dependencies: Vec<usize> = picked
        .iter()
        .flat_map(|&i| sections[i].dependencies.iter())
        .filter_map(|id| sections.iter().position(|s| &s.id == id))
        .collect();
    for dep in dependencies {
        if !picked.contains(&dep) {
            picked.push(dep);
        }
    }

    if picked.len() < MIN_SECTIONS {
        let mut remaining: Vec<usize> = (0..sections.len())
            .filter(|i| !picked.contains(i))
            .collect();
        remaining.sort_by(|a, b| sections[*b].word_count.cmp(&sections[*a].word_count));
        let needed = MIN_SECTIONS - picked.len();
        picked.extend(remaining.into_iter().take(needed));
    }

    picked.truncate(MAX_SECTIONS);
    debug!(
        "维度 {} 选中段落: {:?}",
        dimension,
        picked.iter().map(|&i| sections[i].id.as_str()).collect::<Vec<_>>()
    );
    picked.into_iter().map(|i| &sections[i]).collect()
}

/// 把段落渲染成 `[标题]\n内容` 块，超过预算时截断
///
/// 截断点优先选预算内最后一个分隔符（必须超过预算的 70%），否则按字符硬截断。
pub fn render(sections: &[&Section], max_chars: usize) -> String {
    let full = sections
        .iter()
        .map(|s| format!("[{}]\n{}", s.title, s.content))
        .collect::<Vec<_>>()
        .join(SECTION_DELIMITER);

    if full.chars().count() <= max_chars {
        return full;
    }

    let truncated: String = full.chars().take(max_chars).collect();
    let cut = match truncated.rfind(SECTION_DELIMITER) {
        Some(pos) if truncated[..pos].chars().count() as f64 > max_chars as f64 * 0.7 => {
            &truncated[..pos]
        }
        _ => truncated.as_str(),
    };
    format!("{}{}", cut, TRUNCATION_MARKER)
}
