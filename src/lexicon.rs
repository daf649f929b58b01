//! Fixed vocabularies shared by preprocessing, extraction and column mapping.
//!
//! Chinese terms come first in every list; English equivalents follow so that
//! English questions are understood as well.

/// Relative-time phrases rewritten to canonical English tokens, applied in order.
pub const TIME_PHRASES: &[(&str, &str)] = &[
    ("今天", "today"),
    ("昨天", "yesterday"),
    ("明天", "tomorrow"),
    ("本周", "this week"),
    ("上周", "last week"),
    ("下周", "next week"),
    ("本月", "this month"),
    ("上月", "last month"),
    ("上个月", "last month"),
    ("下月", "next month"),
    ("今年", "this year"),
    ("去年", "last year"),
    ("明年", "next year"),
    ("最近", "recent"),
    ("过去", "past"),
];

/// Characters removed during normalization.
pub const PUNCTUATION: &[char] = &[
    '，', '。', '！', '？', '；', '：', '“', '”', '‘', '’', '（', '）', '【', '】', '、', ',', '.', '!',
    '?', ';', ':', '"', '\'', '(', ')', '[', ']',
];

/// Fixed relative-time tokens understood by the SQL time filter.
pub const FIXED_TIME_TOKENS: &[&str] = &[
    "today",
    "yesterday",
    "this week",
    "last week",
    "this month",
    "last month",
    "this year",
    "last year",
];

/// Business object categories; each contributes at most one entity.
pub const BUSINESS_OBJECTS: &[(&str, &[&str])] = &[
    ("department", &["部门", "科室", "分公司", "事业部", "中心", "department", "division"]),
    ("product", &["产品", "商品", "服务", "项目", "方案", "product", "item"]),
    ("customer", &["客户", "用户", "消费者", "买家", "顾客", "customer", "client", "user"]),
    ("employee", &["员工", "人员", "职员", "工作人员", "团队", "employee", "staff"]),
    ("region", &["地区", "区域", "城市", "省份", "市场", "region", "city", "market"]),
];

/// Business metric keywords; every match is an entity.
pub const BUSINESS_METRICS: &[&str] = &[
    "销售额", "营业额", "收入", "利润", "成本", "费用", "业绩", "绩效", "增长率", "占比", "份额",
    "数量", "单价", "客单价", "转化率", "留存率", "活跃度", "revenue", "sales", "profit", "cost",
    "growth rate", "conversion rate", "retention",
];

pub const DIMENSION_WORDS: &[&str] = &[
    "部门", "地区", "产品", "渠道", "客户", "时间", "department", "region", "product", "channel",
    "customer",
];

pub const METRIC_WORDS: &[&str] = &[
    "销售额", "收入", "利润", "数量", "客户数", "用户数", "金额", "revenue", "sales", "profit",
    "quantity", "amount",
];

/// Keywords that earn the keyword-density confidence bonus.
pub const BONUS_KEYWORDS: &[&str] = &[
    "销售", "业绩", "数据", "分析", "统计", "对比", "趋势", "营收", "利润", "成本", "客户", "产品",
    "部门", "地区", "sales", "revenue", "profit", "cost", "customer", "product", "department",
    "region", "trend", "analysis",
];

/// Keywords marking a question as data-analysis related.
pub const DATA_KEYWORDS: &[&str] = &[
    "销售", "数据", "统计", "分析", "报表", "趋势", "对比", "排名", "sales", "data", "statistic",
    "analy", "report", "trend", "compare", "rank", "revenue", "total", "average",
];

/// Comparison vocabulary mapped to the coarse filter condition tag.
pub const FILTER_CONDITIONS: &[(&str, &[&str])] = &[
    ("greater_than", &["大于", "超过", "greater than", "more than", "above"]),
    ("less_than", &["小于", "低于", "less than", "fewer than", "below"]),
    ("equal", &["等于", "equal to", "equals"]),
];

/// Substrings that mark a column as temporal.
pub const TIME_COLUMN_KEYWORDS: &[&str] = &["date", "time", "created", "updated"];

/// Column-name aliases tried after the term itself when mapping to schema columns.
pub fn column_aliases(term: &str) -> &'static [&'static str] {
    match term {
        "部门" => &["department", "dept"],
        "地区" | "区域" => &["region", "area"],
        "产品" | "商品" => &["product"],
        "渠道" => &["channel"],
        "客户" | "用户" => &["customer", "user"],
        "时间" => &["date", "time"],
        "销售额" | "sales" => &["sales_amount", "sales", "amount"],
        "收入" | "营业额" => &["revenue", "income"],
        "利润" => &["profit"],
        "数量" => &["quantity", "count"],
        "客户数" => &["customer_count"],
        "用户数" => &["user_count"],
        "金额" => &["amount"],
        _ => &[],
    }
}

/// Whether `lower` contains `term`. ASCII terms only count as whole words,
/// optionally pluralized with a trailing `s`; other terms match anywhere.
pub fn contains_term(lower: &str, term: &str) -> bool {
    if !term.is_ascii() {
        return lower.contains(term);
    }
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    lower.match_indices(term).any(|(start, _)| {
        let before = lower[..start].chars().next_back();
        let mut after = lower[start + term.len()..].chars();
        let next = match after.next() {
            Some('s') => after.next(),
            other => other,
        };
        !before.map_or(false, is_word) && !next.map_or(false, is_word)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_terms_match_whole_words() {
        assert!(contains_term("revenue by product", "product"));
        assert!(contains_term("top products", "product"));
        assert!(contains_term("销售额revenue", "revenue"));
        assert!(!contains_term("production cost", "product"));
        assert!(!contains_term("username list", "user"));
        assert!(!contains_term("costume", "cost"));
    }

    #[test]
    fn test_native_terms_match_anywhere() {
        assert!(contains_term("各部门的销售额", "部门"));
        assert!(!contains_term("各地区", "部门"));
    }
}
