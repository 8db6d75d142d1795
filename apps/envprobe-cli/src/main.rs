use clap::{Parser, Subcommand, ValueEnum};
use envprobe_assets::AssetTable;
use envprobe_config::AppConfig;
use envprobe_input::Action;
use envprobe_render::{
    CUBE_TEXTURED, CubeFace, FrameOrchestrator, FrameStatus, RecordingContext, SceneLayout,
    TEXTURED,
};
use envprobe_tools::{RaceInspector, RaceSession, TraceSummary};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "envprobe-cli", about = "Headless tools for the envprobe race")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Settings file; defaults apply if it does not exist
    #[arg(long, default_value = "envprobe.json")]
    config: PathBuf,

    /// Environment cube resolution, overriding the settings file
    #[arg(long)]
    resolution: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Driver {
    /// No input at all
    Idle,
    /// Hold engage and accelerate
    Straight,
    /// Accelerate and steer away from the closest obstacle
    Dodge,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version, capture order and effective settings
    Info,
    /// Run the race without rendering
    Simulate {
        /// Number of updates to run
        #[arg(short, long, default_value = "600")]
        updates: u64,
        #[arg(short, long, value_enum, default_value = "straight")]
        driver: Driver,
    },
    /// Record the graphics commands of a few frames and summarize them
    Trace {
        #[arg(short, long, default_value = "1")]
        frames: u32,
        /// Print every recorded command
        #[arg(long)]
        dump: bool,
    },
    /// Write the effective settings as JSON
    WriteConfig {
        /// Destination; defaults to the --config path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(resolution) = cli.resolution {
        config.environment.resolution = resolution;
    }
    config.validate()?;

    match cli.command {
        Commands::Info => {
            println!("envprobe-cli v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "environment: {}px, {} mips",
                config.environment.resolution,
                config.environment.mip_levels()
            );
            let order: Vec<String> = CubeFace::ALL.iter().map(|f| f.to_string()).collect();
            println!("capture order: {}", order.join(", "));
            println!(
                "race: {} obstacles, finish at z={:.2}, {}s limit",
                config.race.obstacles.len(),
                config.race.finish.z,
                config.race.time_limit_secs
            );
            println!("material: {}", serde_json::to_string(&config.material)?);
        }
        Commands::Simulate { updates, driver } => {
            let mut session = RaceSession::new(config.race, config.material);
            for _ in 0..updates {
                steer(&mut session, driver);
                let step = session.race.update(&session.input);
                for event in session.race.drain_events() {
                    tracing::debug!(?event, "race event");
                }
                if session.race.is_over() {
                    tracing::info!(?step, "race finished");
                    break;
                }
            }
            println!("{}", RaceInspector::summary(&session.race));
        }
        Commands::Trace { frames, dump } => {
            let mut assets = AssetTable::builtin()?;
            assets.insert_shader(TEXTURED, "");
            assets.insert_shader(CUBE_TEXTURED, "");

            let mut ctx = RecordingContext::new();
            let race = &config.race;
            let mut orchestrator = FrameOrchestrator::new(
                &mut ctx,
                &assets,
                SceneLayout::new(&race.obstacles, race.finish),
                config.environment,
                1280,
                720,
            )?;
            let setup = TraceSummary::from_commands(&ctx.take_commands());
            println!("setup: {} resources", setup.resources_created);

            let mut session = RaceSession::new(config.race, config.material);
            session.input.press(Action::Engage);
            session.input.press(Action::Accelerate);
            for frame in 0..frames {
                let status = orchestrator.run_frame(&mut ctx, &mut session);
                let commands = ctx.take_commands();
                println!("-- frame {frame} ({status:?})");
                if dump {
                    for command in &commands {
                        println!("{command:?}");
                    }
                }
                println!("{}", TraceSummary::from_commands(&commands));
                if status == FrameStatus::Frozen {
                    break;
                }
            }

            orchestrator.release(&mut ctx);
            let teardown = TraceSummary::from_commands(&ctx.take_commands());
            println!(
                "teardown: {} resources, {} left live, {} invalid uses",
                teardown.resources_released,
                ctx.live_resources(),
                ctx.invalid_uses()
            );
        }
        Commands::WriteConfig { output } => {
            let path = output.unwrap_or(cli.config);
            config.save(&path)?;
            println!("wrote {}", path.display());
        }
    }

    Ok(())
}

/// Set held actions for the next update.
fn steer(session: &mut RaceSession, driver: Driver) {
    let input = &mut session.input;
    input.clear();
    if matches!(driver, Driver::Idle) {
        return;
    }
    input.press(Action::Engage);
    input.press(Action::Accelerate);
    if let Driver::Dodge = driver {
        let hero = session.race.hero_position();
        let ahead = session
            .race
            .config()
            .obstacles
            .iter()
            .filter(|o| o.z > hero.z && o.z - hero.z < 1.0)
            .min_by(|a, b| a.z.total_cmp(&b.z));
        if let Some(obstacle) = ahead {
            if (obstacle.x - hero.x).abs() < 0.2 {
                let action = if obstacle.x > hero.x {
                    Action::SteerRight
                } else {
                    Action::SteerLeft
                };
                input.press(action);
            }
        }
    }
}
