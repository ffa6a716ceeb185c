use std::path::PathBuf;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    NewChat,
    Status,
    Document(PathBuf),
    DetachDocument,
    ListTools,
    CallTool { name: String, arguments: String },
    Help,
    Quit,
    Unknown(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Ask(line.to_string());
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };
        match name.to_ascii_lowercase().as_str() {
            "new" | "reset" => Self::NewChat,
            "status" => Self::Status,
            "doc" | "document" if argument.is_empty() => Self::DetachDocument,
            "doc" | "document" => Self::Document(PathBuf::from(argument)),
            "tools" => Self::ListTools,
            "tool" if !argument.is_empty() => {
                let (name, arguments) = match argument.split_once(char::is_whitespace) {
                    Some((name, arguments)) => (name, arguments.trim()),
                    None => (argument, ""),
                };
                Self::CallTool {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                }
            }
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

pub const HELP_TEXT: &str = "명령어:\n\
  /new          새 대화를 시작합니다 (기록과 문서 초기화)\n\
  /status       현재 세션 상태를 표시합니다\n\
  /doc <경로>   문서를 첨부합니다 (txt, md, csv, html)\n\
  /doc          첨부한 문서를 해제합니다\n\
  /tools        사용 가능한 도구 목록\n\
  /tool <이름> [JSON 인자]   도구를 직접 호출합니다\n\
  /help         도움말\n\
  /quit         종료";
