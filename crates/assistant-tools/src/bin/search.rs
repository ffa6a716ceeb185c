use assistant_tools::init_tracing;
use assistant_tools::output::{SearchReport, join_query};
use clap::builder::TypedValueParser;
use clap::{Parser, ValueEnum};
use shared::config::load_dotenv;
use shared::keywords::extract_keywords;
use shared::search::{DEFAULT_MAX_RESULTS, SearchBackendKind, SearchSettings};
use tracing::error;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Auto,
    Google,
    Duckduckgo,
}

impl From<Backend> for SearchBackendKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Auto => Self::Auto,
            Backend::Google => Self::Google,
            Backend::Duckduckgo => Self::DuckDuckGo,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "search", about = "Web search rendered as a numbered citation block")]
struct Args {
    /// Query text; multiple words are joined with spaces.
    #[arg(required = true)]
    query: Vec<String>,

    #[arg(long, default_value_t = DEFAULT_MAX_RESULTS, value_parser = clap::value_parser!(u16).range(1..=10).map(usize::from))]
    max_results: usize,

    #[arg(long, value_enum, default_value_t = Backend::Auto, env = "SEARCH_BACKEND")]
    backend: Backend,

    /// Search with the extracted keywords instead of the raw query.
    #[arg(long)]
    keywords: bool,

    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = load_dotenv() {
        eprintln!("{err}");
        std::process::exit(1);
    }
    let args = Args::parse();
    init_tracing("search=warn,shared=warn");

    let settings = match SearchSettings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            error!(error = %err, "failed to load search settings");
            std::process::exit(1);
        }
    };
    let backend = match settings.build_backend(args.backend.into()) {
        Ok(backend) => backend,
        Err(err) => {
            error!(error = %err, "failed to build search backend");
            std::process::exit(1);
        }
    };

    let query = join_query(&args.query);
    let keywords = args.keywords.then(|| extract_keywords(&query));
    let search_query = match &keywords {
        Some(keywords) if !keywords.is_empty() => keywords.join(" "),
        _ => query.clone(),
    };

    let results = backend.search(&search_query, args.max_results).await;
    let report = SearchReport {
        query,
        search_query,
        backend: backend.backend_name(),
        keywords,
        results,
    };

    if args.json {
        match report.render_json() {
            Ok(encoded) => println!("{encoded}"),
            Err(err) => {
                error!(error = %err, "failed to encode search results");
                std::process::exit(1);
            }
        }
    } else {
        println!("{}", report.render_text());
    }
}
