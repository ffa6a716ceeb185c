use crate::intent::RelativeImportance;

const SEARCH_HEADER: &str = "다음은 질문과 관련된 웹 검색 결과입니다:";
const DATETIME_HEADER: &str = "다음은 현재 날짜/시간 정보입니다:";
const SUPPLEMENTARY_DATETIME_HEADER: &str = "다음은 참고용 현재 날짜/시간 정보입니다:";

const CITATION_RULES: &str = "답변 지침:\n\
- 제공된 정보에서 질문에 답하는 데 필요한 사실을 추출해 답변하고, 답변을 거부하지 마세요.\n\
- \"모르겠습니다\"라고 답하기보다 제공된 구체적인 데이터를 우선 활용하세요.\n\
- 분석 없이 링크 목록만 나열하지 마세요.\n\
- 검색 결과를 인용할 때는 [n] 형식으로 출처 번호를 표시하세요.";

const SEARCH_ONLY_RULES: &str = "답변 지침:\n\
- 검색 결과를 꼼꼼히 분석한 뒤에만 관련 정보가 없다고 결론 내리세요.\n\
- 검색 결과의 구체적인 수치, 날짜, 이름을 활용해 답변하세요.\n\
- 분석 없이 링크 목록만 나열하지 마세요.\n\
- 검색 결과를 인용할 때는 [n] 형식으로 출처 번호를 표시하세요.";

const DATETIME_ONLY_RULES: &str =
    "위 날짜/시간 정보는 보조 자료입니다. 질문과 관련이 있을 때만 활용하세요.";

/// Side information gathered for one turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBlocks<'a> {
    pub datetime: Option<&'a str>,
    pub search: Option<&'a str>,
}

/// Merges the query with whichever context blocks exist. With no blocks the
/// query is returned unchanged.
pub fn assemble_prompt(
    query: &str,
    blocks: ContextBlocks<'_>,
    relative_importance: RelativeImportance,
) -> String {
    let datetime = blocks.datetime.map(str::trim).filter(|block| !block.is_empty());
    let search = blocks.search.map(str::trim).filter(|block| !block.is_empty());

    match (search, datetime) {
        (Some(search), Some(datetime)) => match relative_importance {
            RelativeImportance::Search => format!(
                "{query}\n\n{SEARCH_HEADER}\n\n{search}\n\n{SUPPLEMENTARY_DATETIME_HEADER}\n\n{datetime}\n\n{CITATION_RULES}"
            ),
            RelativeImportance::Datetime => format!(
                "{query}\n\n{DATETIME_HEADER}\n\n{datetime}\n\n{SEARCH_HEADER}\n\n{search}\n\n{CITATION_RULES}"
            ),
            RelativeImportance::Both => format!(
                "{query}\n\n질문에 답하려면 아래 두 가지 정보를 함께 사용해야 합니다.\n\n\
                 [1] 날짜/시간 정보\n\n{datetime}\n\n[2] 웹 검색 결과\n\n{search}\n\n\
                 [1]의 현재 시점과 [2]의 사실을 결합해 계산하거나 비교하세요.\n\n{CITATION_RULES}"
            ),
        },
        (Some(search), None) => {
            format!("{query}\n\n{SEARCH_HEADER}\n\n{search}\n\n{SEARCH_ONLY_RULES}")
        }
        (None, Some(datetime)) => format!(
            "{query}\n\n{SUPPLEMENTARY_DATETIME_HEADER}\n\n{datetime}\n\n{DATETIME_ONLY_RULES}"
        ),
        (None, None) => query.to_string(),
    }
}
