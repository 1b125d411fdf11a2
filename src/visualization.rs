use crate::brain::NeuralController;
use crate::evolution::EvolutionEngine;
use crate::phylogeny::write_phylogeny_to_dot_file;
use crate::simulation::{Episode, EpisodeReport, EpisodeStatus};
use crate::track::Track;
use bevy::app::AppExit;
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use bevy_egui::{egui, EguiContexts};
use nalgebra::Point2;
use std::path::PathBuf;
use tracing::{error, info};

// Marker component for the main camera
#[derive(Component)]
pub struct MainCamera;

// Sprite for the car at this index of the running episode
#[derive(Component)]
pub struct CarSprite(pub usize);

#[derive(Resource)]
pub struct TrackResource(pub Track);

// Optimizer plus the episode currently on screen
#[derive(Resource)]
pub struct EvoResource {
    pub engine: EvolutionEngine,
    pub episode: Episode<NeuralController>,
    pub last_report: Option<EpisodeReport>,
}

impl EvoResource {
    pub fn new(engine: EvolutionEngine, track: &Track) -> Self {
        let episode = engine.begin_episode(track);
        Self { engine, episode, last_report: None }
    }

    // Commits fitness for the finished episode, breeds, and starts the next one
    fn finish_generation(&mut self, track: &Track) {
        let report = self.episode.report();
        self.engine.commit_fitness(&report);
        self.engine.evolve_generation();
        self.episode = self.engine.begin_episode(track);
        self.last_report = Some(report);
    }
}

#[derive(Resource)]
pub struct ViewerState {
    pub paused: bool,
    pub fast_mode: bool, // Whole generations per frame, nothing drawn in between
    pub show_radars: bool,
    pub max_generations: usize,
    pub phylogeny_out: PathBuf,
}

// Track pixels are y-down with the origin top-left; the sprite is centered on the world origin
fn to_world(point: Point2<f64>, track: &Track) -> Vec2 {
    let half_w = track.map.width() as f32 / 2.0;
    let half_h = track.map.height() as f32 / 2.0;
    Vec2::new(point.x as f32 - half_w, half_h - point.y as f32)
}

// --- Systems ---

pub fn setup_graphics(
    mut commands: Commands,
    mut images: ResMut<Assets<Image>>,
    track: Res<TrackResource>,
    evo: Res<EvoResource>,
) {
    commands.spawn((Camera2dBundle::default(), MainCamera));

    let (width, height) = track.0.image.dimensions();
    let texture = Image::new(
        Extent3d { width, height, depth_or_array_layers: 1 },
        TextureDimension::D2,
        track.0.image.as_raw().clone(),
        TextureFormat::Rgba8UnormSrgb,
    );
    commands.spawn(SpriteBundle {
        texture: images.add(texture),
        transform: Transform::from_xyz(0.0, 0.0, 0.0),
        ..default()
    });

    let size = evo.engine.config().car_size as f32;
    for idx in 0..evo.episode.entrants().len() {
        commands.spawn((
            SpriteBundle {
                sprite: Sprite {
                    color: Color::rgb(0.9, 0.2, 0.2),
                    custom_size: Some(Vec2::splat(size)),
                    ..default()
                },
                transform: Transform::from_xyz(0.0, 0.0, 1.0),
                ..default()
            },
            CarSprite(idx),
        ));
    }
    info!("Viewer ready: {} cars on '{}'", evo.episode.entrants().len(), track.0.info.name);
}

// One simulation tick per fixed update; fast mode runs whole generations instead
pub fn step_episode(
    mut evo: ResMut<EvoResource>,
    track: Res<TrackResource>,
    state: Res<ViewerState>,
    mut exit: EventWriter<AppExit>,
) {
    if state.paused {
        return;
    }
    if evo.engine.generation() >= state.max_generations {
        info!("Reached {} generations, closing viewer", state.max_generations);
        exit.send(AppExit);
        return;
    }

    let status = if state.fast_mode {
        evo.episode.run()
    } else {
        evo.episode.step()
    };

    if status != EpisodeStatus::Running {
        evo.finish_generation(&track.0);
    }
}

pub fn sync_car_sprites(
    evo: Res<EvoResource>,
    track: Res<TrackResource>,
    mut sprites: Query<(&CarSprite, &mut Transform, &mut Visibility)>,
) {
    let entrants = evo.episode.entrants();
    for (CarSprite(idx), mut transform, mut visibility) in sprites.iter_mut() {
        let Some(entrant) = entrants.get(*idx) else {
            *visibility = Visibility::Hidden;
            continue;
        };
        let car = &entrant.car;
        let center = to_world(car.center, &track.0);
        transform.translation = center.extend(1.0);
        // Screen-space heading flips to a plain counter-clockwise rotation once y points up
        transform.rotation = Quat::from_rotation_z((car.angle as f32).to_radians());
        *visibility = if car.alive { Visibility::Visible } else { Visibility::Hidden };
    }
}

pub fn draw_radars(mut gizmos: Gizmos, evo: Res<EvoResource>, track: Res<TrackResource>, state: Res<ViewerState>) {
    if !state.show_radars {
        return;
    }
    for car in evo.episode.cars().filter(|car| car.alive) {
        let start = to_world(car.center, &track.0);
        for radar in &car.radars {
            gizmos.line_2d(start, to_world(radar.hit, &track.0), Color::GREEN);
            gizmos.circle_2d(to_world(radar.hit, &track.0), 2.0, Color::GREEN);
        }
    }
}

pub fn keyboard_controls(
    keyboard_input: Res<Input<KeyCode>>,
    mut state: ResMut<ViewerState>,
    mut evo: ResMut<EvoResource>,
    track: Res<TrackResource>,
    mut exit: EventWriter<AppExit>,
) {
    if keyboard_input.just_pressed(KeyCode::Escape) {
        info!("Quit requested");
        exit.send(AppExit);
    }

    if keyboard_input.just_pressed(KeyCode::Space) {
        state.paused = !state.paused;
        info!("Simulation {}", if state.paused { "paused" } else { "resumed" });
    }

    if keyboard_input.just_pressed(KeyCode::F) {
        state.fast_mode = !state.fast_mode;
        info!("Fast mode {}", if state.fast_mode { "on" } else { "off" });
    }

    if keyboard_input.just_pressed(KeyCode::G) {
        state.show_radars = !state.show_radars;
    }

    if keyboard_input.just_pressed(KeyCode::P) {
        if let Err(e) = write_phylogeny_to_dot_file(&evo.engine, &state.phylogeny_out) {
            error!("Failed to write phylogeny file: {}", e);
        }
    }

    if keyboard_input.just_pressed(KeyCode::R) {
        let evo = &mut *evo;
        evo.engine.reset();
        evo.episode = evo.engine.begin_episode(&track.0);
        evo.last_report = None;
    }
}

pub fn ui_system_info_panel(mut contexts: EguiContexts, evo: Res<EvoResource>, state: Res<ViewerState>) {
    egui::Window::new("Simulation Info & Controls").show(contexts.ctx_mut(), |ui| {
        ui.label(format!("Generation: {}", evo.episode.generation()));
        ui.label(format!("Still Alive: {}", evo.episode.alive_count()));
        ui.label(format!("Tick: {} ({:?})", evo.episode.tick(), evo.episode.status()));
        let longest = evo.episode.cars().map(|car| car.time).max().unwrap_or(0);
        ui.label(format!("Longest survival: {} ticks", longest));

        if let Some(report) = &evo.last_report {
            let best = report.fitness.iter().cloned().fold(0.0, f64::max);
            ui.separator();
            ui.label(format!("Last generation: {}", report.generation));
            ui.label(format!("Ended: {:?} after {} ticks", report.status, report.ticks));
            ui.label(format!("Best fitness: {:.2}", best));
        }
        if let Some(best) = &evo.engine.all_time_best_individual {
            ui.label(format!("All-time best: {:.2} (ID {}, gen {})", best.fitness, best.id, best.generation));
        }

        ui.separator();
        ui.label(if state.paused { "PAUSED" } else if state.fast_mode { "FAST" } else { "RUNNING" });
        ui.label("Space: pause | F: fast | G: radars | P: phylogeny | R: reset | Esc: quit");
    });
}
