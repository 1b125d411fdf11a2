mod brain;
mod car;
mod error;
mod evolution;
mod phylogeny;
mod simulation;
mod track;
mod visualization;

use bevy::{log::LogPlugin, prelude::*, window::PresentMode};
use bevy_egui::EguiPlugin;
use clap::Parser;
use error::SimResult;
use evolution::EvolutionEngine;
use phylogeny::write_phylogeny_to_dot_file;
use simulation::SimulationConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use track::Track;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use visualization::*;

/// Evolves neural drivers on a 2D race track.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Track to race on (spa, monza, shanghai, cota, interlagos, bahrain, silverstone, zandvoort)
    track: String,

    /// Directory holding `<track>.png` boundary images
    #[arg(long, default_value = "images/tracks")]
    tracks_dir: PathBuf,

    /// Run without a window, logging one line per generation
    #[arg(long)]
    headless: bool,

    #[arg(long)]
    generations: Option<usize>,

    #[arg(long)]
    population: Option<usize>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Where the lineage graph is written (P in the viewer, end of headless runs)
    #[arg(long, default_value = "phylogeny.dot")]
    phylogeny_out: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn build_config(cli: &Cli) -> SimResult<SimulationConfig> {
    let mut config = SimulationConfig::default();
    if let Some(generations) = cli.generations {
        config.num_generations = generations;
    }
    if let Some(population) = cli.population {
        config.population_size = population;
    }
    config.validate()?;
    Ok(config)
}

fn run_headless(mut engine: EvolutionEngine, track: &Track, cli: &Cli) {
    let generations = engine.config().num_generations;
    info!("Running {} generations headless on '{}'", generations, track.info.name);
    for _ in 0..generations {
        engine.evaluate(track);
        engine.evolve_generation();
    }
    if let Some(best) = &engine.all_time_best_individual {
        info!("All-time best - ID: {}, Fitness: {:.2}, Gen: {}", best.id, best.fitness, best.generation);
    }
    if let Err(e) = write_phylogeny_to_dot_file(&engine, &cli.phylogeny_out) {
        error!("Failed to write phylogeny file: {}", e);
    }
}

fn run_viewer(engine: EvolutionEngine, track: Track, cli: &Cli) {
    let config = engine.config().clone();
    let evo = EvoResource::new(engine, &track);

    App::new()
        .insert_resource(ClearColor(Color::rgb(0.1, 0.1, 0.15)))
        .add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: format!("Track Evolution - {}", track.info.name),
                        resolution: (config.window_width, config.window_height).into(),
                        present_mode: PresentMode::AutoVsync,
                        ..default()
                    }),
                    ..default()
                })
                // Logging is already set up through tracing-subscriber
                .disable::<LogPlugin>(),
        )
        .add_plugins(EguiPlugin)
        .insert_resource(Time::<Fixed>::from_hz(config.ticks_per_second))
        .insert_resource(ViewerState {
            paused: false,
            fast_mode: false,
            show_radars: true,
            max_generations: config.num_generations,
            phylogeny_out: cli.phylogeny_out.clone(),
        })
        .insert_resource(TrackResource(track))
        .insert_resource(evo)
        .add_systems(Startup, setup_graphics)
        .add_systems(FixedUpdate, step_episode)
        .add_systems(Update, (keyboard_controls, sync_car_sprites, draw_radars, ui_system_info_panel))
        .run();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    // Everything that can fail does so here, before any simulation or window exists
    let setup = build_config(&cli).and_then(|config| Ok((config, Track::load(&cli.tracks_dir, &cli.track)?)));
    let (config, track) = match setup {
        Ok(setup) => setup,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = EvolutionEngine::new(config, cli.seed);
    if cli.headless {
        run_headless(engine, &track, &cli);
    } else {
        run_viewer(engine, track, &cli);
    }
    ExitCode::SUCCESS
}
