use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::{
    IntentCategory, IntentClassifier, IntentDecision, IntentFuture, IntentStrategy,
    IntentSubtype, RelativeImportance,
};
use crate::models::ChatMessage;

const TIME_PATTERN: &str = r"(?i)(몇\s*시|몇\s*분|시간|시각|\bwhat\s+time\b|\bcurrent\s+time\b|\btime\s+is\s+it\b|\bo'?clock\b)";
const DATE_PATTERN: &str = r"(?i)(며칠|몇\s*일|몇\s*월|날짜|요일|오늘|내일|어제|모레|그제|\bdate\b|\btoday\b|\btomorrow\b|\byesterday\b|\bwhat\s+day\b|\bweekday\b)";
const DATETIME_PATTERN: &str = r"(?i)(날짜\s*(와|랑|및|하고)?\s*시간|시간\s*(과|이랑|및|하고)?\s*날짜|일시|\bdate\s*(and|&)\s*time\b|\bdatetime\b)";
const TIME_COMPARISON_PATTERN: &str = r"(?i)(얼마나\s*(됐|되었|지났|남았|걸렸|흘렀)|(된|난|지난)\s*지|몇\s*(년|개월|달|주|일|시간)\s*(째|됐|지났|남았|전|후|뒤)|며칠\s*(남았|지났|됐|전|후|뒤)|\bhow\s+long\s+(ago|since|until|till|has|have)\b|\bsince\s+when\b|\bdays?\s+(until|since|left)\b|\b\d+\s+(years?|months?|weeks?|days?)\s+ago\b)";
const CURRENT_TIME_PATTERN: &str = r"(?i)(현재|지금|요즘|요새|올해|금년|이번\s*(주|달|해|년)|\bnow\b|\bcurrently\b|\bcurrent\b|\bthis\s+(year|month|week)\b)";
const SEARCH_PATTERN: &str = r"(?i)(검색|찾아|알려\s*줘|알려\s*주|가격|뉴스|소식|정보|리뷰|후기|비교|추천|순위|누구|어디|무엇|뭐야|날씨|주가|환율|\bsearch\b|\bfind\b|\blook\s+up\b|\bprice\b|\bnews\b|\breview\b|\bwho\s+is\b|\bwhat\s+is\b|\bweather\b|\bstock\b)";
// Events whose timing has to be looked up before time arithmetic is possible.
const AMBIGUOUS_PATTERN: &str = r"(?i)(최신|최근|출시|발매|개봉|발표|개최|창립|설립|\blatest\b|\brecent(ly)?\b|\breleased?\b|\blaunch(ed)?\b|\bfounded\b|\bannounced\b)";

struct PatternFamilies {
    time: Option<Regex>,
    date: Option<Regex>,
    datetime: Option<Regex>,
    time_comparison: Option<Regex>,
    current_time: Option<Regex>,
    search: Option<Regex>,
    ambiguous: Option<Regex>,
}

static FAMILIES: LazyLock<PatternFamilies> = LazyLock::new(|| PatternFamilies {
    time: Regex::new(TIME_PATTERN).ok(),
    date: Regex::new(DATE_PATTERN).ok(),
    datetime: Regex::new(DATETIME_PATTERN).ok(),
    time_comparison: Regex::new(TIME_COMPARISON_PATTERN).ok(),
    current_time: Regex::new(CURRENT_TIME_PATTERN).ok(),
    search: Regex::new(SEARCH_PATTERN).ok(),
    ambiguous: Regex::new(AMBIGUOUS_PATTERN).ok(),
});

/// Which pattern families matched a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatternSignals {
    pub time: bool,
    pub date: bool,
    pub datetime: bool,
    pub time_comparison: bool,
    pub current_time: bool,
    pub search: bool,
    pub ambiguous: bool,
}

impl PatternSignals {
    fn any_datetime(self) -> bool {
        self.time || self.date || self.datetime
    }

    fn any_search(self) -> bool {
        self.search || self.ambiguous
    }

    fn datetime_subtype(self) -> IntentSubtype {
        if self.datetime || (self.time && self.date) {
            IntentSubtype::Datetime
        } else if self.time {
            IntentSubtype::Time
        } else {
            IntentSubtype::Date
        }
    }

    fn matched_families(self) -> Vec<&'static str> {
        [
            (self.time, "time"),
            (self.date, "date"),
            (self.datetime, "datetime"),
            (self.time_comparison, "time_comparison"),
            (self.current_time, "current_time"),
            (self.search, "search"),
            (self.ambiguous, "ambiguous"),
        ]
        .into_iter()
        .filter_map(|(matched, name)| matched.then_some(name))
        .collect()
    }
}

pub fn detect_signals(query: &str) -> PatternSignals {
    let families = &*FAMILIES;
    PatternSignals {
        time: is_match(&families.time, query),
        date: is_match(&families.date, query),
        datetime: is_match(&families.datetime, query),
        time_comparison: is_match(&families.time_comparison, query),
        current_time: is_match(&families.current_time, query),
        search: is_match(&families.search, query),
        ambiguous: is_match(&families.ambiguous, query),
    }
}

fn is_match(pattern: &Option<Regex>, query: &str) -> bool {
    pattern
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(query))
}

/// Maps matched families to a decision. The first rule that applies wins.
pub fn decide(signals: PatternSignals) -> IntentDecision {
    let anchored_in_time = signals.current_time || signals.any_datetime();

    if signals.time_comparison && anchored_in_time && signals.any_search() {
        return mixed(signals, RelativeImportance::Both, "elapsed-time question about a searchable subject");
    }

    if signals.time_comparison && anchored_in_time {
        return datetime(signals, IntentSubtype::Datetime, "elapsed-time question anchored to the calendar");
    }

    if signals.ambiguous
        && (signals.time_comparison || (signals.current_time && signals.search))
    {
        let importance = if signals.time_comparison {
            RelativeImportance::Both
        } else {
            RelativeImportance::Search
        };
        return mixed(signals, importance, "time-sensitive event that must be looked up");
    }

    if signals.any_datetime() && signals.any_search() {
        return mixed(signals, RelativeImportance::Search, "calendar reference combined with a search request");
    }

    if signals.any_datetime() {
        return datetime(signals, signals.datetime_subtype(), "date or time question");
    }

    if signals.any_search() {
        return IntentDecision {
            category: IntentCategory::Search,
            subtype: IntentSubtype::Search,
            datetime_needed: false,
            search_needed: true,
            relative_importance: RelativeImportance::Search,
            reasoning: reasoning("search request", signals),
        };
    }

    IntentDecision::general(reasoning("no pattern family matched", signals))
}

pub fn classify_by_patterns(query: &str) -> IntentDecision {
    decide(detect_signals(query))
}

fn mixed(signals: PatternSignals, importance: RelativeImportance, summary: &str) -> IntentDecision {
    IntentDecision {
        category: IntentCategory::Mixed,
        subtype: IntentSubtype::Datetime,
        datetime_needed: true,
        search_needed: true,
        relative_importance: importance,
        reasoning: reasoning(summary, signals),
    }
}

fn datetime(signals: PatternSignals, subtype: IntentSubtype, summary: &str) -> IntentDecision {
    IntentDecision {
        category: IntentCategory::Datetime,
        subtype,
        datetime_needed: true,
        search_needed: false,
        relative_importance: RelativeImportance::Datetime,
        reasoning: reasoning(summary, signals),
    }
}

fn reasoning(summary: &str, signals: PatternSignals) -> String {
    let matched = signals.matched_families();
    if matched.is_empty() {
        summary.to_string()
    } else {
        format!("{summary} (matched: {})", matched.join(", "))
    }
}

/// Deterministic classifier backed by the regular-expression families.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternIntentClassifier;

impl IntentClassifier for PatternIntentClassifier {
    fn strategy(&self) -> IntentStrategy {
        IntentStrategy::Pattern
    }

    fn classify<'a>(&'a self, query: &'a str, _history: &'a [ChatMessage]) -> IntentFuture<'a> {
        Box::pin(async move { classify_by_patterns(query) })
    }
}
