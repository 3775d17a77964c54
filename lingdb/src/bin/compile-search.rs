//! CLI for compiling a search request into an SQL query.
//!
//! Pass a request as a JSON string via STDIN or command line argument
//! and this tool prints the compiled SQL and its parameter list.
//!
//! % cargo run --package lingdb --bin ldb-compile-search -- \
//!     '{"query": {"filter": ["Form", "transcription", "like", "%a%"]}}'
//! {"sql":"SELECT form.* FROM form WHERE ...","params":["%a%"]}
use lingdb::init;
use lingdb::init::InitOptions;
use lingdb::query::Pager;
use lingdb::result::{LdbError, LdbResult};
use lingdb::search::SearchCompiler;
use lingdb::sql::SqlRenderer;
use std::env;
use std::io::IsTerminal;
use std::io::Read;
use std::process;

const DEFAULT_MODEL: &str = "Form";

const HELP_TEXT: &str = r#"
Compile a search request into SQL and print it to STDOUT.

Synopsis:

ldb-compile-search '{"query": {"filter": ["Form", "transcription", "like", "%a%"]}}'

echo '{"query": {"filter": ["Tag", "name", "like", "%x%"]}}' | ldb-compile-search

Parameters:

    --model <name> [default="Form"]
        Model the search runs against.

    --case-insensitive
        The backing store folds case on text comparisons.  Text
        comparisons are collated binary to compensate.

    --descriptor
        Print the compiled search descriptor as JSON instead of SQL.

    --help

The request is read from the first free argument, or from STDIN when
no argument is given.  A "paginator" object with "page" and
"items_per_page" adds LIMIT/OFFSET to the SQL.

Search errors print their coordinate/message mapping to STDERR as
JSON and the exit status is nonzero.
"#;

fn main() {
    let options = read_options();

    if options.opt_present("help") {
        println!("{HELP_TEXT}");
        return;
    }

    match run(&options) {
        Ok(output) => println!("{output}"),
        Err(LdbError::Search(perr)) => {
            eprintln!("{}", perr.to_json().dump());
            process::exit(1);
        }
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    }
}

fn run(options: &getopts::Matches) -> LdbResult<String> {
    let mut init_ops = InitOptions::new();
    init_ops.appname = Some("ldb-compile-search".to_string());
    let registry = init::with_options(&init_ops)?;

    let model = options
        .opt_str("model")
        .unwrap_or(DEFAULT_MODEL.to_string());
    let case_sensitive = !options.opt_present("case-insensitive");

    let request = json::parse(&read_request(options)?)
        .or_else(|e| Err(format!("Cannot parse request JSON: {e}")))?;

    let compiler = SearchCompiler::new(registry.clone(), &model, case_sensitive)?;
    let search = compiler.compile(&request["query"])?;

    if options.opt_present("descriptor") {
        return Ok(search.to_json().dump());
    }

    let paginator = &request["paginator"];
    let pager = match paginator.is_null() {
        true => None,
        false => Some(Pager::from_json(paginator)?),
    };

    let sql = SqlRenderer::new(registry).render(&search, &model, pager.as_ref())?;

    Ok(sql.to_json().dump())
}

/// The request JSON: first free argument if present, otherwise STDIN.
fn read_request(options: &getopts::Matches) -> LdbResult<String> {
    if let Some(arg) = options.free.first() {
        return Ok(arg.clone());
    }

    if std::io::stdin().is_terminal() {
        return Err("No request JSON provided; see --help".into());
    }

    let mut request = String::new();
    std::io::stdin()
        .read_to_string(&mut request)
        .or_else(|e| Err(format!("Error reading STDIN: {e}")))?;

    Ok(request)
}

/// Read the command line arguments
fn read_options() -> getopts::Matches {
    let args: Vec<String> = env::args().collect();
    let mut opts = getopts::Options::new();

    opts.optopt("", "model", "Search Target Model", "");

    opts.optflag("", "case-insensitive", "");
    opts.optflag("", "descriptor", "");
    opts.optflag("h", "help", "");

    opts.parse(&args[1..]) // skip the command name
        .expect("Error parsing command line options")
}
