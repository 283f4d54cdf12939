//! Confidence Benchmark CLI
//!
//! Release-readiness harness for a question-answering endpoint.
//!
//! ## Quick Start
//!
//! ```bash
//! # Full benchmark for a tenant (pack from packs/acme.json)
//! export CONFIDENCE_BENCH_TOKEN=...
//! ./confidence-bench run --tenant acme --endpoint https://qa.example.com
//!
//! # Explicit pack, five runs, no pacing
//! ./confidence-bench run --tenant acme --pack ./acme.json --runs 5 --pacing-ms 0
//!
//! # Check a pack without touching the endpoint
//! ./confidence-bench validate-pack --pack ./acme.json
//!
//! # One diagnostic request, every extracted field printed
//! ./confidence-bench probe "what are your opening hours?" --tenant acme
//! ```
//!
//! ## Exit Codes
//!
//! - `0` all gates passed
//! - `1` one or more gates failed
//! - `2` configuration error (nothing was sent)
//! - `3` run aborted; the artifact carries `status = error`

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use confidence_bench::config::HarnessConfig;
use confidence_bench::error::HarnessError;
use confidence_bench::executor::{CaseResult, HttpTransport, QueryExecutor};
use confidence_bench::pack::{Category, TestPack};
use confidence_bench::persist::{ConfigSnapshot, ProgressPersister};
use confidence_bench::report::ReportPresenter;
use confidence_bench::runner::run_benchmark;

const DEFAULT_CONFIG: &str = "bench.toml";

#[derive(Parser)]
#[command(name = "confidence-bench")]
#[command(about = "Confidence-pack benchmark and release gates for a QA endpoint")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every subcommand; flags override the config file
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Path to the harness config (TOML); `bench.toml` is used when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tenant whose pack is exercised
    #[arg(short, long)]
    tenant: Option<String>,

    /// Endpoint base URL
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Directory holding tenant packs (`<tenant>.json`)
    #[arg(long)]
    packs_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(&self) -> Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::load(path)?,
            None => HarnessConfig::load_or_default(Path::new(DEFAULT_CONFIG))?,
        };

        if let Some(tenant) = &self.tenant {
            config.tenant_id = tenant.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint.base_url = endpoint.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            config.request_timeout_secs = timeout;
        }
        if let Some(dir) = &self.packs_dir {
            config.packs_dir = dir.clone();
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark and evaluate release gates
    ///
    /// Every case is sent once per run, one at a time. The result artifact is written
    /// before the first request and kept current throughout.
    Run {
        #[command(flatten)]
        common: ConfigArgs,

        /// Test pack JSON (defaults to `<packs_dir>/<tenant>.json`)
        #[arg(short, long)]
        pack: Option<PathBuf>,

        /// Number of full sweeps over the pack
        #[arg(short, long)]
        runs: Option<usize>,

        /// Delay after each case in ms (excluded from gated latency)
        #[arg(long)]
        pacing_ms: Option<u64>,

        /// Rewrite the artifact every N cases
        #[arg(long)]
        checkpoint_every: Option<usize>,

        /// Record per-stage timing headers
        #[arg(long)]
        capture_timing: bool,

        /// Directory for result artifacts
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Cycle each category up to at least N inputs
        #[arg(long)]
        scale: Option<usize>,
    },

    /// Validate a test pack without contacting the endpoint
    ValidatePack {
        #[command(flatten)]
        common: ConfigArgs,

        /// Test pack JSON (defaults to `<packs_dir>/<tenant>.json`)
        #[arg(short, long)]
        pack: Option<PathBuf>,
    },

    /// Send one diagnostic request and print every extracted field
    Probe {
        /// Message to send
        message: String,

        #[command(flatten)]
        common: ConfigArgs,
    },
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let code = match dispatch(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            exit_code(&e)
        }
    };

    std::process::exit(code);
}

async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Run {
            common,
            pack,
            runs,
            pacing_ms,
            checkpoint_every,
            capture_timing,
            output_dir,
            scale,
        } => {
            let mut config = common.load()?;
            if let Some(runs) = runs {
                config.runs = runs;
            }
            if let Some(pacing) = pacing_ms {
                config.pacing_ms = pacing;
            }
            if let Some(every) = checkpoint_every {
                config.checkpoint_every = every;
            }
            if capture_timing {
                config.capture_timing = true;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            run(config, pack.as_deref(), scale).await
        }

        Commands::ValidatePack { common, pack } => {
            let config = common.load()?;
            validate_pack(&config, pack.as_deref())?;
            Ok(0)
        }

        Commands::Probe { message, common } => {
            let mut config = common.load()?;
            config.capture_timing = true;
            probe(&config, &message).await?;
            Ok(0)
        }
    }
}

/// Exit code for an error that escaped a subcommand
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<HarnessError>()
        .map(HarnessError::exit_code)
        .unwrap_or(3)
}

/// Full benchmark: resolve everything that can fail before the first request, then run
async fn run(config: HarnessConfig, pack_path: Option<&Path>, scale: Option<usize>) -> Result<i32> {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              CONFIDENCE BENCHMARK                            ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    config.validate()?;
    let token = config.resolve_token()?;

    let (pack, source) = TestPack::resolve(pack_path, &config)?;
    let pack = match scale {
        Some(n) => pack.scaled(n),
        None => pack,
    };

    println!("Tenant:   {}", config.tenant_id);
    println!("Endpoint: {}", config.endpoint.url());
    println!("Pack:     {} ({})", source.path().display(), &pack.digest()[..12]);
    for category in Category::ALL {
        println!("  {:<14} {} inputs", category.name(), pack.inputs(category).len());
    }
    println!(
        "Runs: {} | Pacing: {}ms | Checkpoint every {} cases",
        config.runs, config.pacing_ms, config.checkpoint_every
    );

    let transport = HttpTransport::new(&config, token)?;
    let snapshot = ConfigSnapshot::from_config(&config, "http");
    let planned = pack.total_cases() * config.runs;
    let mut persister = ProgressPersister::new(&config, snapshot, pack.digest(), planned);
    eprintln!("\nWriting results to {}", persister.path().display());

    let outcome = run_benchmark(&config, &pack, &transport, &mut persister)
        .await
        .with_context(|| format!("benchmark aborted; see {}", persister.path().display()))?;

    ReportPresenter::new(&config.tenant_id, &outcome.summary, &outcome.gates, &outcome.runs).print();
    println!("\nResults saved to {}", outcome.artifact.display());

    Ok(if outcome.gates.all_passed { 0 } else { 1 })
}

fn validate_pack(config: &HarnessConfig, pack_path: Option<&Path>) -> Result<()> {
    let path = match pack_path {
        Some(p) => p.to_path_buf(),
        None => {
            if config.tenant_id.trim().is_empty() {
                return Err(HarnessError::config("pass --pack or --tenant").into());
            }
            config.validate_tenant()?;
            config.tenant_pack_path()
        }
    };

    println!("Validating {}...", path.display());
    let pack = TestPack::load(&path)?;

    for category in Category::ALL {
        let count = pack.inputs(category).len();
        let line = format!("  {:<14} {} inputs", category.name(), count);
        if count == 0 {
            println!("{} {}", line, "(empty: rates for this category report 0)".yellow());
        } else {
            println!("{}", line);
        }
    }
    println!("  Total: {}", pack.total_cases());
    println!("  Digest: {}", pack.digest());
    println!("{}", "✓ Pack is valid".green());
    Ok(())
}

async fn probe(config: &HarnessConfig, message: &str) -> Result<()> {
    config.validate()?;
    let token = config.resolve_token()?;
    let transport = HttpTransport::new(config, token)?;

    println!("POST {}", transport.url());
    let executor = QueryExecutor::new(&transport, config);
    let result = executor.execute(message, Category::ShouldHit, 1).await;
    print_case(&result);
    Ok(())
}

fn print_case(case: &CaseResult) {
    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    let ms = |v: Option<f64>| v.map(|x| format!("{:.1}ms", x)).unwrap_or_else(|| "-".to_string());

    println!("\n  Outcome:          {:?}", case.outcome());
    println!("  Status:           {}", case.status_code);
    println!("  HTTP latency:     {:.1}ms", case.http_latency_ms);
    println!("  faq_hit:          {}", case.faq_hit);
    println!("  debug_branch:     {}", opt(&case.debug_branch));
    println!(
        "  retrieval_score:  {}",
        case.retrieval_score.map(|s| format!("{:.4}", s)).unwrap_or_else(|| "-".to_string())
    );
    println!(
        "  candidates_count: {}",
        case.candidates_count.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
    );
    println!("  retrieval_stage:  {}", opt(&case.retrieval_stage));
    println!("  normalized_input: {}", opt(&case.normalized_input));
    println!("  chosen_faq_id:    {}", opt(&case.chosen_faq_id));
    println!(
        "  selector_called:  {} (source: {})",
        case.selector_called,
        case.selector_signal.map(|s| format!("{:?}", s)).unwrap_or_else(|| "none".to_string())
    );
    println!("  response_text:    {}", opt(&case.response_text));

    let t = &case.timings;
    println!("\n  Stage timings:");
    println!("    embed {} | retrieval {} | rerank {}", ms(t.embed_ms), ms(t.retrieval_ms), ms(t.rerank_ms));
    println!("    selector {} | generation {} | server total {}", ms(t.selector_ms), ms(t.generation_ms), ms(t.server_total_ms));
    println!(
        "    cache_hit {}",
        t.cache_hit.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
    );

    if let Some(kind) = &case.error_kind {
        println!("\n  {} {}: {}", "✗".red(), kind, opt(&case.error_message));
    }
    if let Some(body) = &case.body_snippet {
        println!("\n  Body: {}", body);
    }
    for line in &case.header_snippet {
        println!("    {}", line);
    }
}
