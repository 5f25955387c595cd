use clap::{
    Parser,
    Subcommand,
    ValueEnum,
};
use color_eyre::eyre::{
    Report,
    Result,
    eyre,
};
use console_host::ConsoleHost;
use mystery_box::{
    App,
    Config,
    UserId,
    config::CONFIG_FILE,
    ledger::{
        LedgerStorage,
        json_file_storage::JsonFileLedgerStorage,
        sled_storage::SledLedgerStorage,
    },
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        OnceLock,
    },
    time::Duration,
};
use tokio::time;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

mod console_host;

const SLED_DIR: &str = "mystery_box.sled";
const POLL_INTERVAL: Duration = Duration::from_millis(25);

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file; defaults to <data-dir>/mystery_box.config.json
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = StorageKind::Json)]
    storage: StorageKind,

    /// Write daily rolling log files here instead of stdout
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StorageKind {
    Json,
    Sled,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show a player's unopened box count
    Count { user: UserId },
    /// Give a player boxes; a negative amount takes them away
    Grant {
        user: UserId,
        #[arg(allow_hyphen_values = true)]
        amount: i64,
    },
    /// Remove every player's boxes
    Wipe,
    /// Signal a world reset, wiping if the config says so
    NewSave,
    /// Open one box for a player against a logging host
    Simulate {
        #[arg(long)]
        user: UserId,
        /// Disconnect the player once this many ticks have run
        #[arg(long)]
        interrupt_after: Option<u32>,
        #[arg(long, default_value = "false")]
        full_inventory: bool,
    },
}

fn init_tracing(log_dir: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(rolling::daily(dir, "mystery-box.log"));
            let _ = LOG_GUARD.set(guard);
            let _ = fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init();
        }
        None => {
            let _ = fmt().with_env_filter(filter).try_init();
        }
    }
}

fn report(e: anyhow::Error) -> Report {
    eyre!("{e:#}")
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(args.log_dir.as_deref());

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| args.data_dir.join(CONFIG_FILE));
    let config = Config::load_or_init(&config_path).map_err(report)?;

    match args.storage {
        StorageKind::Json => {
            let storage = JsonFileLedgerStorage::in_dir(&args.data_dir).map_err(report)?;
            run(args.command, config, storage).await
        }
        StorageKind::Sled => {
            let storage =
                SledLedgerStorage::open(args.data_dir.join(SLED_DIR)).map_err(report)?;
            run(args.command, config, storage).await
        }
    }
}

async fn run<S: LedgerStorage + 'static>(
    command: Command,
    config: Config,
    storage: S,
) -> Result<()> {
    let full_inventory = matches!(
        command,
        Command::Simulate {
            full_inventory: true,
            ..
        }
    );
    let host = Arc::new(ConsoleHost::new(full_inventory));
    let mut app = App::new(config, Arc::clone(&host), storage).map_err(report)?;

    match command {
        Command::Count { user } => {
            let count = app.query_unopened_count(user).map_err(report)?;
            println!("{user}: {count}");
        }
        Command::Grant { user, amount } => {
            let count = app.grant_units(user, amount).map_err(report)?;
            println!("{user}: {count}");
        }
        Command::Wipe => {
            app.wipe_all_units().map_err(report)?;
            println!("all unopened boxes wiped");
        }
        Command::NewSave => {
            let wiped = app.on_new_save().map_err(report)?;
            println!("wiped: {wiped}");
        }
        Command::Simulate {
            user,
            interrupt_after,
            ..
        } => {
            simulate(&mut app, &host, user, interrupt_after).await?;
            let count = app.query_unopened_count(user).map_err(report)?;
            println!("{user}: {count} unopened");
        }
    }
    app.shutdown().map_err(report)
}

async fn simulate<S: LedgerStorage + 'static>(
    app: &mut App<ConsoleHost, S>,
    host: &ConsoleHost,
    user: UserId,
    interrupt_after: Option<u32>,
) -> Result<()> {
    host.connect(user);
    app.user_connected(user);
    let outcome = app.request_open(user).map_err(report)?;
    if !outcome.started() {
        println!("not started: {outcome:?}");
        return Ok(());
    }

    let mut interval = time::interval(POLL_INTERVAL);
    loop {
        interval.tick().await;
        let controller = app
            .registry()
            .find(user)
            .ok_or_else(|| eyre!("controller for {user} vanished"))?;
        if controller.is_ready() {
            break;
        }
        if interrupt_after.is_some_and(|ticks| controller.ticks() >= ticks) {
            break;
        }
    }

    let outcome = match interrupt_after {
        Some(_) => app.user_disconnected(user).map_err(report)?,
        None => Some(app.request_close(user).map_err(report)?),
    };
    println!("closed: {outcome:?}");
    Ok(())
}
