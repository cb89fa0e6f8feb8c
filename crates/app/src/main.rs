use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use primetime_core::{
    clock::MonotonicClock, AppConfig, AssetResolver, AssetStore, Command, JsonFileStore,
    MemoryStore, SceneRegistry, ShowSession, StateStore, Timeline,
};
use tracing_subscriber::EnvFilter;

fn main() -> primetime_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { timeline, assets } => run_validate(&timeline, assets.as_ref()),
        Commands::Simulate(args) => run_simulate(args),
    }
}

fn run_validate(path: &PathBuf, assets: Option<&PathBuf>) -> primetime_core::Result<()> {
    let timeline = Timeline::from_json_file(path)?;
    let assets = load_assets(assets)?;
    let config = AppConfig::default();
    let registry = SceneRegistry::with_builtin();

    tracing::info!(timeline = %timeline.id, name = %timeline.name, items = timeline.len(), "timeline is valid");
    for (index, item) in timeline.items.iter().enumerate() {
        let transition = timeline.transition_between(
            index.checked_sub(1),
            index,
            &config.playback.default_transition,
        )?;
        let duration = item
            .resolved_duration_ms(assets.as_ref())
            .map_or_else(|| "until advanced".to_string(), |ms| format!("{ms}ms"));
        tracing::info!(index, item = %item.id, scene = %item.scene_type, %duration, %transition, "item");
        if !registry.contains(&item.scene_type) {
            let known: Vec<&str> = registry.kinds().collect();
            tracing::warn!(item = %item.id, scene = %item.scene_type, ?known, "unknown scene type; clients will show the fallback");
        }
    }
    Ok(())
}

fn run_simulate(args: SimulateArgs) -> primetime_core::Result<()> {
    let config = match &args.config {
        Some(path) => AppConfig::from_json_file(path)?,
        None => AppConfig::default(),
    };
    let assets = load_assets(args.assets.as_ref())?;
    let store: Box<dyn StateStore + Send> = match &args.state_dir {
        Some(dir) => {
            let store = JsonFileStore::open(dir)?;
            tracing::info!(dir = %store.root().display(), "persisting playback state");
            Box::new(store)
        }
        None => Box::new(MemoryStore::new()),
    };

    let clock = MonotonicClock::start();
    let now = |simulated: u64| if args.realtime { clock.now_ms() } else { simulated };

    let mut session = if args.resume {
        ShowSession::restore(config, assets, store, now(0))?
    } else {
        ShowSession::new(config, assets, store)
    };
    for id in 1..=args.clients.max(1) {
        session.connect(id, now(0));
    }

    let resumed = args.resume && session.controller().timeline().is_some();
    if resumed {
        tracing::info!(index = session.controller().current_index(), "resumed persisted show");
    } else {
        let timeline = Timeline::from_json_file(&args.timeline)?;
        session.command(Command::Load(timeline), now(0))?;
        session.command(Command::Play(None), now(0))?;
    }

    let frame_ms = (1000 / args.fps.max(1)).max(1);
    tracing::info!(duration_ms = args.duration_ms, frame_ms, clients = args.clients, "simulating show");
    if args.realtime {
        loop {
            let at = clock.now_ms();
            if at > args.duration_ms {
                break;
            }
            session.step(at);
            std::thread::sleep(Duration::from_millis(frame_ms));
        }
    } else {
        session.run(0, args.duration_ms, frame_ms);
    }

    for change in session.controller().history() {
        tracing::info!(at_ms = change.at_ms, from = %change.from, to = %change.to, "transition");
    }
    for client in session.clients() {
        tracing::info!(
            client = client.id(),
            item = ?client.active_item(),
            degraded = client.is_degraded(),
            "client summary"
        );
    }
    Ok(())
}

fn load_assets(path: Option<&PathBuf>) -> primetime_core::Result<Arc<dyn AssetResolver>> {
    let store = match path {
        Some(path) => AssetStore::from_json_file(path)?,
        None => AssetStore::new(),
    };
    tracing::debug!(assets = store.len(), "asset catalogue loaded");
    Ok(Arc::new(store))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Live show controller for multi-display events", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a timeline file and print how each item will play.
    Validate {
        /// Path to the timeline JSON file.
        timeline: PathBuf,
        /// Optional JSON array of asset descriptors.
        #[arg(long)]
        assets: Option<PathBuf>,
    },
    /// Run a show against in-process rendering clients.
    Simulate(SimulateArgs),
}

#[derive(clap::Args, Debug)]
struct SimulateArgs {
    /// Path to the timeline JSON file.
    timeline: PathBuf,
    /// Optional configuration file; missing fields use defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Optional JSON array of asset descriptors.
    #[arg(long)]
    assets: Option<PathBuf>,
    /// Directory for persisted playback state.
    #[arg(long)]
    state_dir: Option<PathBuf>,
    /// Continue from the persisted state in `--state-dir` when there is one.
    #[arg(long, requires = "state_dir")]
    resume: bool,
    /// How long to run, in show milliseconds.
    #[arg(long, default_value_t = 30_000)]
    duration_ms: u64,
    /// Frame slots per second on every client.
    #[arg(long, default_value_t = 60)]
    fps: u64,
    /// Number of rendering clients.
    #[arg(long, default_value_t = 1)]
    clients: u32,
    /// Pace the simulation against the wall clock.
    #[arg(long)]
    realtime: bool,
}
