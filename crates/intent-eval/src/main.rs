mod case;
mod cli;
mod engine;
mod fixture_io;

use cli::{CliError, CliOptions};
use engine::run_eval;
use shared::config::load_dotenv;

#[tokio::main]
async fn main() {
    let options = match CliOptions::parse(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(CliError::HelpRequested) => {
            print_usage();
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(err) = load_dotenv() {
        eprintln!("{err}");
        std::process::exit(2);
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "intent_eval=warn,shared=warn".to_string()),
        )
        .with_writer(std::io::stderr)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .init();

    match run_eval(&options).await {
        Ok(summary) => {
            summary.print();
            if summary.has_failures() {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("failed to run intent eval harness: {err}");
            std::process::exit(2);
        }
    }
}

fn print_usage() {
    eprintln!(
        "Usage: cargo run -p intent-eval -- [--mode pattern|model] [--case ID]\n\
         \n\
         Modes:\n\
         - pattern (default): offline checks of the regular-expression classifier\n\
         - model: live checks of the model-assisted classifier (needs MODEL_API_KEY)\n\
         \n\
         Options:\n\
         - --case ID   Only run cases whose id contains ID\n\
         - --help      Show this help text"
    );
}
