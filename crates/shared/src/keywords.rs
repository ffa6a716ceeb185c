use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

pub const MAX_KEYWORDS: usize = 5;
const MIN_KEYWORD_CHARS: usize = 3;

static ENGLISH_STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
        "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his",
        "himself", "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself",
        "they", "them", "their", "theirs", "themselves", "what", "which", "who", "whom", "this",
        "that", "that'll", "these", "those", "am", "is", "are", "was", "were", "be", "been",
        "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an", "the",
        "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by", "for",
        "with", "about", "against", "between", "into", "through", "during", "before", "after",
        "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
        "again", "further", "then", "once", "here", "there", "when", "where", "why", "how",
        "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
        "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can",
        "will", "just", "don", "don't", "should", "should've", "now", "d", "ll", "m", "o", "re",
        "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn", "didn't", "doesn",
        "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn", "isn't", "ma",
        "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan", "shan't",
        "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
        "wouldn't",
    ]
    .into_iter()
    .collect()
});

pub fn is_stopword(token: &str) -> bool {
    ENGLISH_STOPWORDS.contains(token)
}

/// Returns up to five lowercase keywords ranked by frequency. Ties keep the
/// order of first occurrence. An empty result means no search is warranted.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();

    let mut first_seen: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in lowered.split_whitespace() {
        if !is_keyword_candidate(token) {
            continue;
        }

        let count = counts.entry(token).or_insert(0);
        if *count == 0 {
            first_seen.push(token);
        }
        *count += 1;
    }

    let mut ranked = first_seen
        .into_iter()
        .map(|token| (counts.get(token).copied().unwrap_or(0), token))
        .collect::<Vec<_>>();
    // sort_by is stable, so equal counts stay in first-occurrence order.
    ranked.sort_by(|left, right| right.0.cmp(&left.0));

    ranked
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(_, token)| token.to_string())
        .collect()
}

fn is_keyword_candidate(token: &str) -> bool {
    token.chars().count() >= MIN_KEYWORD_CHARS
        && token.chars().all(char::is_alphanumeric)
        && !is_stopword(token)
}
