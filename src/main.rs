use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;

use vantage_risk::logging::init_tracing;
use vantage_risk::{
    load_sample, synthesize, write_csv, AuditLedger, BenchmarkPolicy, DecisionEngine, DecisionRecord,
    LendingService, LoanApplication, LogisticScorer, QueryService, ServiceConfig, SimulationBenchmark,
};

#[derive(Parser)]
#[command(name = "vantage-risk", version, about = "Expected-utility lending decisions with an audit ledger")]
struct Cli {
    /// Config file (defaults to ./vantage.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override storage.database_path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the ledger and write the reference model artifact if none exists
    Init,
    /// Score one application and record the decision
    Decide {
        #[arg(long)]
        income: f64,
        #[arg(long)]
        fico: f64,
        #[arg(long)]
        dti: f64,
        #[arg(long)]
        loan_amount: f64,
        #[arg(long, default_value_t = 1.0)]
        risk_aversion: f64,
    },
    /// Approval rate, average utility, and the most recent decisions
    Summary,
    /// Decisions whose fico, decision, or timestamp contains PATTERN
    Search { pattern: String },
    /// Backtest the fico rule against the utility policy
    Simulate {
        #[arg(long)]
        sample_size: Option<usize>,
        /// Override simulation.risk_aversion
        #[arg(long)]
        risk_aversion: Option<f64>,
        /// Seed the draw for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Write a synthetic labeled corpus for backtests
    GenerateSample {
        #[arg(long, default_value_t = 50_000)]
        rows: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Re-derive the ledger's digest chain
    Verify,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = ServiceConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.storage.database_path = db;
    }

    match cli.command {
        Command::Init => run_init(&config),
        Command::Decide {
            income,
            fico,
            dti,
            loan_amount,
            risk_aversion,
        } => run_decide(&config, income, fico, dti, loan_amount, risk_aversion),
        Command::Summary => run_summary(&config),
        Command::Search { pattern } => run_search(&config, &pattern),
        Command::Simulate {
            sample_size,
            risk_aversion,
            seed,
        } => run_simulate(&config, sample_size, risk_aversion, seed),
        Command::GenerateSample { rows, seed, output } => run_generate(&config, rows, seed, output),
        Command::Verify => run_verify(&config),
    }
}

fn open_ledger(config: &ServiceConfig) -> Result<Arc<AuditLedger>> {
    let path = &config.storage.database_path;
    let ledger = AuditLedger::open(path).with_context(|| format!("Failed to open ledger at {}", path.display()))?;
    Ok(Arc::new(ledger))
}

fn load_scorer(config: &ServiceConfig) -> Result<LogisticScorer> {
    let path = &config.model.artifact_path;
    LogisticScorer::from_file(path).with_context(|| {
        format!("No usable model at {} (run `vantage-risk init` for the reference model)", path.display())
    })
}

fn run_init(config: &ServiceConfig) -> Result<()> {
    let ledger = open_ledger(config)?;
    println!("✓ Ledger ready at {} ({} records)", config.storage.database_path.display(), ledger.count()?);

    let artifact = &config.model.artifact_path;
    if artifact.exists() {
        println!("✓ Model artifact present at {}", artifact.display());
    } else {
        if let Some(parent) = artifact.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(artifact, LogisticScorer::reference().to_json()?)
            .with_context(|| format!("Failed to write {}", artifact.display()))?;
        println!("✓ Reference model written to {}", artifact.display());
    }

    Ok(())
}

fn run_decide(
    config: &ServiceConfig,
    income: f64,
    fico: f64,
    dti: f64,
    loan_amount: f64,
    risk_aversion: f64,
) -> Result<()> {
    let application = LoanApplication::new(income, fico, dti, loan_amount, risk_aversion)?;
    let engine = DecisionEngine::with_interest_rate(Arc::new(load_scorer(config)?), config.policy.interest_rate);
    let service = LendingService::new(engine, open_ledger(config)?);

    let result = service.analyze(&application)?;

    println!("Decision:            {}", result.decision);
    println!("Expected utility:    {:.2}", result.expected_utility);
    println!("P(default):          {:.1}%", result.probability_of_default * 100.0);
    println!("Risk aversion (λ):   {}", result.risk_aversion);
    println!("Audit record:        #{}", result.record_id);
    println!("{}", result.summary);

    Ok(())
}

fn run_summary(config: &ServiceConfig) -> Result<()> {
    let query = QueryService::with_page_size(open_ledger(config)?, config.audit.page_size);
    let overview = query.overview()?;

    println!("Decisions:        {}", overview.summary.total);
    println!("Approval rate:    {:.1}%", overview.summary.approval_rate);
    println!("Average utility:  {:.2}", overview.summary.average_utility);
    println!();
    print_records(&overview.logs);

    Ok(())
}

fn run_search(config: &ServiceConfig, pattern: &str) -> Result<()> {
    let query = QueryService::new(open_ledger(config)?);
    let records = query.search(pattern)?;

    println!("{} matching decisions", records.len());
    print_records(&records);

    Ok(())
}

fn run_simulate(
    config: &ServiceConfig,
    sample_size: Option<usize>,
    risk_aversion: Option<f64>,
    seed: Option<u64>,
) -> Result<()> {
    let policy = BenchmarkPolicy {
        interest_rate: config.policy.interest_rate,
        risk_aversion: risk_aversion.unwrap_or(config.simulation.risk_aversion),
        fico_threshold: config.simulation.fico_threshold,
    };
    if !policy.risk_aversion.is_finite() || policy.risk_aversion < 0.0 {
        anyhow::bail!("--risk-aversion must be >= 0");
    }

    let benchmark = SimulationBenchmark::new(Arc::new(load_scorer(config)?), policy);
    let corpus = load_sample(&config.simulation.sample_path)?;
    let sample_size = sample_size.unwrap_or(config.simulation.sample_size);

    let result = match seed {
        Some(seed) => benchmark.run_with_rng(&corpus, sample_size, &mut StdRng::seed_from_u64(seed))?,
        None => benchmark.run(&corpus, sample_size)?,
    };

    println!("Backtest over {} applications (λ = {})", result.sample_size, result.risk_aversion);
    println!(
        "Rule-based (fico >= {}):  {:>14.2}  ({} approved)",
        policy.fico_threshold, result.rule_based_profit, result.rule_based_selected
    );
    println!(
        "Utility-based:            {:>14.2}  ({} approved)",
        result.ai_utility_profit, result.ai_selected
    );
    println!("Improvement:              {:>13.1}%", result.improvement_percent);

    Ok(())
}

fn run_generate(config: &ServiceConfig, rows: usize, seed: u64, output: Option<PathBuf>) -> Result<()> {
    let path = output.unwrap_or_else(|| config.simulation.sample_path.clone());
    let corpus = synthesize(rows, &mut StdRng::seed_from_u64(seed));
    write_csv(&path, &corpus)?;

    let defaults = corpus.iter().filter(|app| app.defaulted).count();
    println!("✓ Wrote {} rows to {} ({} defaults)", corpus.len(), path.display(), defaults);

    Ok(())
}

fn run_verify(config: &ServiceConfig) -> Result<()> {
    let report = open_ledger(config)?.verify_chain()?;

    match report.first_broken_id {
        None => {
            println!("✓ Audit chain intact ({} records)", report.records_checked);
            Ok(())
        }
        Some(id) => anyhow::bail!(
            "Audit chain broken at record #{} after checking {} records",
            id,
            report.records_checked
        ),
    }
}

fn print_records(records: &[DecisionRecord]) {
    if records.is_empty() {
        return;
    }

    println!(
        "{:>6}  {:<19}  {:>6}  {:>10}  {:>5}  {:>12}  {}",
        "id", "timestamp", "fico", "loan", "λ", "utility", "decision"
    );
    for record in records {
        println!(
            "{:>6}  {:<19}  {:>6.0}  {:>10.2}  {:>5.2}  {:>12.2}  {}",
            record.id,
            record.timestamp.format(vantage_risk::ledger::TIMESTAMP_FORMAT).to_string(),
            record.fico,
            record.loan_amount,
            record.risk_aversion,
            record.expected_utility,
            record.decision
        );
    }
}
