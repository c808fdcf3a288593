use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use nocturne_core::{
    AtmospherePatch, AuditSink, CompileConfig, Compiler, MultiAuditSink, StateBackend,
    TracingAuditSink, TurnSignal, now_unix_secs,
};
use nocturne_store::{Store, default_base_dir, load_config, pools, prepare_base_dir};
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(Parser)]
#[command(name = "noct", about = "Nocturne persistent-state preamble compiler")]
struct Cli {
    /// Conversation the command applies to
    #[arg(long, global = true, default_value = "default")]
    session: String,

    /// Person on the other side of the bar
    #[arg(long, global = true, default_value = "guest")]
    recipient: String,

    /// Pretend the current time is this Unix timestamp
    #[arg(long, global = true)]
    at: Option<u64>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and print the preamble
    Compile {
        /// Also print section labels and token counts to stderr
        #[arg(long)]
        explain: bool,
    },

    /// Record one user turn
    Turn {
        /// Engagement multiplier, 1.0 is neutral
        #[arg(long, default_value_t = 1.0)]
        engagement: f64,

        /// Measured voice drift of the last reply
        #[arg(long)]
        drift: Option<f64>,
    },

    /// Close the session and credit the recipient's trust
    Close {
        #[arg(long, default_value_t = 1.0)]
        engagement: f64,
    },

    /// Remember a fact about the recipient
    Remember {
        /// The note to keep
        note: String,
    },

    /// Show or update the recipient's atmosphere
    Atmosphere {
        #[arg(long)]
        music: Option<String>,
        #[arg(long)]
        drink: Option<String>,
        #[arg(long)]
        seat: Option<String>,
        #[arg(long)]
        weather: Option<String>,
        #[arg(long)]
        nickname: Option<String>,
    },

    /// Print every dimension with its band
    State,

    /// Replace the content pool with the built-in one or a TOML file
    Seed {
        /// Pool file to load instead of the built-in pool
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

struct Env {
    store: Arc<Store>,
    config: CompileConfig,
}

fn open_env() -> Result<Env> {
    let base = default_base_dir();
    let config = load_config(&base)
        .with_context(|| format!("failed to load config from {}", base.display()))?;
    let db_path = prepare_base_dir(&base).context("failed to prepare data directory")?;
    let store = Store::open(&db_path).context("failed to open state store")?;
    Ok(Env {
        store: Arc::new(store),
        config,
    })
}

fn compiler(env: &Env) -> Result<Compiler> {
    let sink = MultiAuditSink::new(vec![
        Box::new(env.store.clone()) as Box<dyn AuditSink>,
        Box::new(TracingAuditSink),
    ]);
    let backend: Arc<dyn StateBackend> = env.store.clone();
    Compiler::new(backend, Arc::new(sink), env.config.clone())
        .context("invalid compiler configuration")
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let env = open_env()?;
    let now = cli.at.unwrap_or_else(now_unix_secs);

    match &cli.command {
        Commands::Compile { explain } => cmd_compile(&cli, &env, now, *explain).await,
        Commands::Turn { engagement, drift } => cmd_turn(&cli, &env, now, *engagement, *drift),
        Commands::Close { engagement } => cmd_close(&cli, &env, now, *engagement),
        Commands::Remember { note } => cmd_remember(&cli, &env, now, note),
        Commands::Atmosphere {
            music,
            drink,
            seat,
            weather,
            nickname,
        } => {
            let patch = AtmospherePatch {
                music_preference: music.clone(),
                drink: drink.clone(),
                seat: seat.clone(),
                weather: weather.clone(),
                nickname: nickname.clone(),
            };
            cmd_atmosphere(&cli, &env, &patch)
        }
        Commands::State => cmd_state(&cli, &env, now),
        Commands::Seed { file } => cmd_seed(&env, file.as_deref()),
    }
}

async fn cmd_compile(cli: &Cli, env: &Env, now: u64, explain: bool) -> Result<()> {
    let compiler = compiler(env)?;
    let ctx = compiler.compile_at(&cli.session, &cli.recipient, now).await;

    println!("{}", ctx.render());

    if explain {
        for section in &ctx.sections {
            eprintln!("{:<17} {:>4} tokens", section.label, section.tokens);
        }
        eprintln!(
            "total: {} / {} tokens, truncated={}, degraded={}",
            ctx.total_tokens,
            env.config.token_budget,
            ctx.truncated,
            ctx.degraded
        );
    }
    Ok(())
}

fn cmd_turn(
    cli: &Cli,
    env: &Env,
    now: u64,
    engagement: f64,
    drift: Option<f64>,
) -> Result<()> {
    if let Some(d) = drift
        && !(0.0..=1.0).contains(&d)
    {
        bail!("--drift must be between 0 and 1, got {d}");
    }

    let compiler = compiler(env)?;
    let handle = compiler.handle(&cli.session, &cli.recipient);
    let mut rng = match env.config.rng_seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_os_rng(),
    };

    let out = handle
        .record_turn(
            &TurnSignal {
                engagement,
                drift_observed: drift,
            },
            now,
            &mut rng,
        )
        .context("failed to record turn")?;

    println!(
        "entropy={:.3} momentum={:.3} drift={:.3}",
        out.entropy.value, out.momentum.value, out.drift.value
    );
    Ok(())
}

fn cmd_close(cli: &Cli, env: &Env, now: u64, engagement: f64) -> Result<()> {
    let compiler = compiler(env)?;
    let trust = compiler
        .handle(&cli.session, &cli.recipient)
        .close_session(engagement, now)
        .context("failed to close session")?;
    println!("trust={:.3}", trust.value);
    Ok(())
}

fn cmd_remember(cli: &Cli, env: &Env, now: u64, note: &str) -> Result<()> {
    env.store
        .remember(&cli.recipient, note, now)
        .context("failed to store memory")?;
    println!("remembered for {}", cli.recipient);
    Ok(())
}

fn cmd_atmosphere(cli: &Cli, env: &Env, patch: &AtmospherePatch) -> Result<()> {
    let atm = if patch.is_empty() {
        env.store.atmosphere(&cli.recipient)
    } else {
        env.store.update_atmosphere(&cli.recipient, patch)
    }
    .context("failed to access atmosphere")?;

    let json = serde_json::to_string_pretty(&atm).context("failed to serialize atmosphere")?;
    println!("{json}");
    Ok(())
}

fn cmd_state(cli: &Cli, env: &Env, now: u64) -> Result<()> {
    let compiler = compiler(env)?;
    let snapshot = compiler
        .handle(&cli.session, &cli.recipient)
        .snapshot(now, compiler.drift_table())
        .context("failed to read state")?;

    let json = serde_json::to_string_pretty(&snapshot).context("failed to serialize state")?;
    println!("{json}");
    Ok(())
}

fn cmd_seed(env: &Env, file: Option<&Path>) -> Result<()> {
    let n = pools::seed(&env.store, file).context("failed to seed content pool")?;
    println!("seeded {n} pool entries");
    Ok(())
}
