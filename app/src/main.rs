mod args;

use anyhow::Context;
use clap::Parser;
use log::{info, trace};

use dream_cli::Console;
use dream_engine::component::LifetimeComponent;
use dream_engine::core::log::ChannelLogger;
use dream_engine::core::runner;
use dream_engine::{EngineConfig, ProjectDirectory, ProjectRuntime};

use crate::args::CliArgs;

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("reading settings {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(threads) = args.threads {
        config.worker_threads = Some(threads);
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    let log_recv = if args.console {
        Some(ChannelLogger::install(config.level_filter())?)
    } else {
        env_logger::Builder::new()
            .filter_level(config.level_filter())
            .parse_default_env()
            .init();
        None
    };
    trace!("Starting with args: {:?}", args);

    let directory = ProjectDirectory::new(&args.project);
    let mut runtime = ProjectRuntime::open(config, directory)
        .with_context(|| format!("opening project {}", args.project.display()))?;
    runtime.add_component(LifetimeComponent::new());
    runtime.init()?;

    if args.console {
        Console::new(&mut runtime, log_recv).run()?;
    } else {
        let frames = runner::looped(&mut runtime, args.frames, |_| true)?;
        info!("Ran {} frame(s)", frames);
    }

    runtime.shutdown();
    Ok(())
}
