//! graphcheck: command-line entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build the LLM provider and the retriever
//!   6. Optionally import a corpus into the evidence index
//!   7. Spawn Ctrl-C → cancellation watcher
//!   8. Run the claim batch and print one JSON report per claim

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::info;

use graphcheck::config;
use graphcheck::error::AppError;
use graphcheck::llm::providers;
use graphcheck::logger;
use graphcheck::pipeline::{self, ClaimOutcome, ClaimRequest, Pipeline};
use graphcheck::prompt::Prompts;
use graphcheck::retrieval;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();
    logger::validate_filter(&config.log_level)?;
    logger::init(effective_log_level, force_cli_level, config.log_file.as_deref())?;

    info!(
        provider = %config.llm.provider,
        retrieval = %config.retrieval.backend,
        top_k = config.retrieval.top_k,
        concurrency = config.concurrency,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let provider = providers::build(&config.llm, config.llm_api_key.clone())?;
    let retriever = retrieval::build(&config.retrieval)?;
    let prompts = match &config.prompts_dir {
        Some(dir) => Prompts::load(dir),
        None => Prompts::default(),
    };

    if let Some(corpus) = args.import_dir {
        import_corpus(&retriever, corpus).await?;
    }

    if args.claims.is_empty() {
        info!("no claims given, nothing to check");
        return Ok(());
    }

    // Ctrl-C cancels in-flight claims; finished reports are still printed.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, cancelling remaining claims");
            ctrlc_token.cancel();
        }
    });

    let requests: Vec<ClaimRequest> = args
        .claims
        .into_iter()
        .map(|claim| {
            let request = ClaimRequest::new(claim);
            match &args.path {
                Some(path) => request.with_path(path.clone()),
                None => request,
            }
        })
        .collect();

    let pipeline = Pipeline::new(provider, retriever, prompts, config.retrieval.top_k);
    let outcomes = pipeline::run_batch(pipeline, requests, config.concurrency, shutdown).await;

    let mut failed = 0;
    for outcome in &outcomes {
        if !matches!(outcome, ClaimOutcome::Completed(_)) {
            failed += 1;
        }
        let line = serde_json::to_string(outcome).map_err(std::io::Error::from)?;
        println!("{line}");
    }
    info!(claims = outcomes.len(), failed, "done");

    Ok(())
}

#[cfg(feature = "fts-index")]
async fn import_corpus(retriever: &retrieval::Retriever, corpus: PathBuf) -> Result<(), AppError> {
    use graphcheck::retrieval::fts::DEFAULT_CHUNK_SIZE;

    let retrieval::Retriever::Fts(store) = retriever else {
        return Err(AppError::Config("--import requires [retrieval] backend = \"fts\"".into()));
    };
    let store = store.clone();
    let added = tokio::task::spawn_blocking(move || store.import_dir(&corpus, DEFAULT_CHUNK_SIZE))
        .await
        .map_err(|e| AppError::Config(format!("import task failed: {e}")))??;
    info!(added, "corpus imported into evidence index");
    Ok(())
}

#[cfg(not(feature = "fts-index"))]
async fn import_corpus(_retriever: &retrieval::Retriever, _corpus: PathBuf) -> Result<(), AppError> {
    Err(AppError::Config("--import requires the fts-index feature".into()))
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
    path: Option<Vec<String>>,
    import_dir: Option<PathBuf>,
    claims: Vec<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;
    let mut path = None;
    let mut import_dir = None;
    let mut claims = Vec::new();

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            claims.extend(iter.by_ref());
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: graphcheck [OPTIONS] <CLAIM>...");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -p, --path <ENTS>          Resolution path, e.g. (ENT2),(ENT1) (default: definition order)");
                println!("      --import <DIR>         Index .txt/.md files from DIR before checking");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => config_path = Some(required_value(&mut iter, "-f/--config")),
            "-p" | "--path" => path = Some(parse_path(&required_value(&mut iter, "-p/--path"))),
            "--import" => import_dir = Some(PathBuf::from(required_value(&mut iter, "--import"))),
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            a if a.starts_with('-') && a.len() > 1 => {
                eprintln!("error: unknown option '{a}'");
                std::process::exit(1);
            }
            _ => claims.push(arg),
        }
    }

    CliArgs { log_level: logger::level_for_verbosity(verbosity), config_path, path, import_dir, claims }
}

fn required_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> String {
    match iter.next() {
        Some(value) => value,
        None => {
            eprintln!("error: {flag} requires an argument");
            std::process::exit(1);
        }
    }
}

/// `"(ENT2), (ENT1)"` → `["(ENT2)", "(ENT1)"]`.
fn parse_path(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}
