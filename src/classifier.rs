//! Pattern Classifier
//!
//! Scores normalized text against per-category regular expressions and picks
//! the category with the most matches.

use crate::models::Category;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// Returned when no pattern of any category matches.
pub const DEFAULT_CATEGORY: Category = Category::Statistics;

/// Raw pattern sources per category as (native alternatives, English words).
/// Exhaustive so a new category cannot be added without its patterns.
fn pattern_sources(category: Category) -> &'static [(&'static str, &'static [&'static str])] {
    match category {
        Category::Trend => &[
            (
                r"趋势|变化|增长|下降|走势|发展|演变|波动|起伏",
                &[r"trends?", "growth", r"grow(?:s|ing|n)?", r"declin[a-z]*", "rising", "falling"],
            ),
            (
                r"(?:(?-u:\b)(?:past|recent|last)|过去|最近)\s*\d+\s*个?\s*(?:月|天|年|周|星期|days?|weeks?|months?|years?)|历史|期间",
                &["over time", "history"],
            ),
            (
                r"增长率|变化率|同比|环比|涨幅|跌幅|增速|降速",
                &["growth rate", "year over year", "month over month"],
            ),
            (
                r"连续|持续|逐年|逐月|逐日|年度|月度|日度",
                &["daily", "weekly", "monthly", "yearly", "annual"],
            ),
        ],
        Category::Comparison => &[
            (r"对比|比较|相比|对照|比拼", &["vs", "versus", r"compar[a-z]*"]),
            (
                r"哪个.*?[好高多大小优劣强弱]|谁.*?[好高多大小优劣强弱]",
                &[r"which .*?(?:better|higher|more)"],
            ),
            (r"差异|区别|差别|不同|优劣|强弱|高低", &[r"differen[a-z]*"]),
            (r"各.*?之间|与|跟", &["between", "against"]),
        ],
        Category::Ranking => &[
            (r"排名|排行|前.*?名|最.*?的|第.*?名|位列", &[r"top\d*", r"rank[a-z]*"]),
            (
                r"第[一二三四五六七八九十1-9]|最[高低大小多少好坏优劣强弱]",
                &["highest", "lowest", "best", "worst", "largest", "smallest"],
            ),
            (r"冠军|亚军|季军|榜首|末位|首位|倒数", &["bottom"]),
            (r"排序|排列|名次|座次|位次", &[r"sort(?:ed)?", "order by"]),
        ],
        Category::Statistics => &[
            (r"总|平均|合计|汇总", &["total", "average", "mean", "sum"]),
            (r"统计|概况|情况|数据|指标|概览", &[r"statistic[a-z]*", "summary", "overview"]),
            (
                r"数量|个数|计数|求和|累计|多少|几个",
                &["how many", "how much", "count"],
            ),
            (r"最大值|最小值|极值|均值", &["maximum", "minimum", "max", "min"]),
        ],
        Category::Proportion => &[
            (r"占比|比例|百分比|份额|占据", &["share", "proportion", "percentage"]),
            (
                r"分布|构成|组成|比重|权重",
                &["distribution", "breakdown", "composition"],
            ),
            (r"%|比率", &["percent", "ratio"]),
        ],
    }
}

/// Native alternatives match anywhere; English words only as whole ASCII
/// words, so `TOP10` after Chinese text still counts but `laptop` does not.
fn compile_pattern(native: &str, english: &[&str]) -> Regex {
    let words = english.join("|");
    let source = if words.is_empty() {
        format!("(?i){}", native)
    } else {
        format!(r"(?i){}|(?-u:\b)(?:{})(?-u:\b)", native, words)
    };
    Regex::new(&source).unwrap()
}

lazy_static! {
    static ref PATTERNS: HashMap<Category, Vec<Regex>> = Category::ALL
        .iter()
        .map(|&category| {
            let compiled = pattern_sources(category)
                .iter()
                .map(|(native, english)| compile_pattern(native, english))
                .collect();
            (category, compiled)
        })
        .collect();
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternClassifier;

impl PatternClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn patterns(&self, category: Category) -> &'static [Regex] {
        PATTERNS.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total match count per category, in enumeration order.
    pub fn scores(&self, text: &str) -> Vec<(Category, usize)> {
        Category::ALL
            .iter()
            .map(|&category| {
                let score = self
                    .patterns(category)
                    .iter()
                    .map(|pattern| pattern.find_iter(text).count())
                    .sum();
                (category, score)
            })
            .collect()
    }

    /// Highest-scoring category; ties go to the earlier category and an
    /// all-zero score falls back to [`DEFAULT_CATEGORY`].
    pub fn classify(&self, text: &str) -> Category {
        let scores = self.scores(text);
        let mut best = (DEFAULT_CATEGORY, 0usize);
        for (category, score) in &scores {
            if *score > best.1 {
                best = (*category, *score);
            }
        }
        debug!("Pattern scores {:?} -> {}", scores, best.0);
        best.0
    }

    /// Fraction of the category's patterns with at least one match, or 0.3
    /// when the category has no patterns.
    pub fn pattern_strength(&self, category: Category, text: &str) -> f64 {
        let patterns = self.patterns(category);
        if patterns.is_empty() {
            return 0.3;
        }
        let matched = patterns.iter().filter(|p| p.is_match(text)).count();
        (matched as f64 / patterns.len() as f64).min(1.0)
    }
}
