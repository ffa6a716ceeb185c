use assistant_tools::init_tracing;
use clap::{Parser, ValueEnum};
use shared::config::load_dotenv;
use shared::datetime::{
    DatetimeProvider, TimeSource, format_date, format_datetime_info, format_time,
    format_time_difference,
};
use shared::timezone::DEFAULT_TIME_ZONE;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Time,
    Date,
    Full,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "datetime", about = "Current date and time for a time zone")]
struct Args {
    #[arg(long, default_value = DEFAULT_TIME_ZONE, env = "ASSISTANT_TIMEZONE")]
    timezone: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Full)]
    format: OutputFormat,

    /// Print the selected block as JSON.
    #[arg(long)]
    json: bool,

    /// Days between FROM and TO (default today), as YYYY-MM-DD or YYYY/MM/DD.
    #[arg(long, num_args = 1..=2, value_names = ["FROM", "TO"])]
    diff: Vec<String>,
}

fn main() {
    if let Err(err) = load_dotenv() {
        eprintln!("{err}");
        std::process::exit(1);
    }
    let args = Args::parse();
    init_tracing("datetime=warn,shared=warn");

    let provider = DatetimeProvider::new(args.timezone.clone());
    let json = args.json || args.format == OutputFormat::Json;

    let rendered = if let Some(from) = args.diff.first() {
        let difference = match provider.time_difference(from, args.diff.get(1).map(String::as_str)) {
            Ok(difference) => difference,
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(2);
            }
        };
        if json {
            serde_json::to_string_pretty(&difference)
        } else {
            Ok(format_time_difference(&difference))
        }
    } else {
        match (args.format, json) {
            (OutputFormat::Time, true) => serde_json::to_string_pretty(&provider.current_time()),
            (OutputFormat::Date, true) => serde_json::to_string_pretty(&provider.current_date()),
            (_, true) => serde_json::to_string_pretty(&provider.datetime_info()),
            (OutputFormat::Time, false) => Ok(format_time(&provider.current_time())),
            (OutputFormat::Date, false) => Ok(format_date(&provider.current_date())),
            (_, false) => Ok(format_datetime_info(&provider.datetime_info())),
        }
    };

    match rendered {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => {
            error!(error = %err, "failed to encode datetime output");
            std::process::exit(1);
        }
    }
}
