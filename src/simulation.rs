use crate::car::{Car, CarParams, ControlOutputs, Decision, SensorVector};
use crate::error::{SimError, SimResult};
use crate::track::{BoundaryMap, TrackInfo};
use std::sync::Arc;
use tracing::debug;

/// Anything that turns a sensor vector into four control channels.
pub trait Controller {
    fn activate(&mut self, inputs: &SensorVector) -> ControlOutputs;
}

impl<F> Controller for F
where
    F: FnMut(&SensorVector) -> ControlOutputs,
{
    fn activate(&mut self, inputs: &SensorVector) -> ControlOutputs {
        self(inputs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeStatus {
    Running,
    AllDead,
    TickLimitReached,
}

impl EpisodeStatus {
    pub fn is_finished(self) -> bool {
        self != EpisodeStatus::Running
    }
}

/// One car, its controller and its fitness accumulator. Created together, dropped together.
pub struct Entrant<C> {
    pub car: Car,
    pub controller: C,
    pub fitness: f64,
}

/// Summary handed back to the optimizer when an episode ends.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeReport {
    pub generation: usize,
    pub status: EpisodeStatus,
    pub ticks: u32,
    pub survivors: usize,
    pub fitness: Vec<f64>,
}

/// Lockstep simulation of a whole population on one boundary map.
pub struct Episode<C> {
    map: Arc<BoundaryMap>,
    entrants: Vec<Entrant<C>>,
    generation: usize,
    tick: u32,
    tick_limit: u32,
    status: EpisodeStatus,
}

impl<C: Controller> Episode<C> {
    pub fn new(
        map: Arc<BoundaryMap>,
        track: &TrackInfo,
        controllers: Vec<C>,
        config: &SimulationConfig,
        generation: usize,
    ) -> Self {
        let params = config.car_params();
        let entrants = controllers
            .into_iter()
            .map(|controller| Entrant {
                car: Car::new(track.start, track.heading, params),
                controller,
                fitness: 0.0,
            })
            .collect();
        Self {
            map,
            entrants,
            generation,
            tick: 0,
            tick_limit: config.tick_limit,
            status: EpisodeStatus::Running,
        }
    }

    pub fn status(&self) -> EpisodeStatus {
        self.status
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn entrants(&self) -> &[Entrant<C>] {
        &self.entrants
    }

    pub fn cars(&self) -> impl Iterator<Item = &Car> {
        self.entrants.iter().map(|e| &e.car)
    }

    pub fn alive_count(&self) -> usize {
        self.entrants.iter().filter(|e| e.car.alive).count()
    }

    /// Advances every car by one tick and returns the resulting state.
    /// Calling this on a finished episode is a no-op.
    pub fn step(&mut self) -> EpisodeStatus {
        if self.status.is_finished() {
            return self.status;
        }

        // All decisions are made from last tick's sensors before anything moves.
        // Dead cars are never queried again.
        for entrant in &mut self.entrants {
            if !entrant.car.alive {
                continue;
            }
            let inputs = entrant.car.sensor_vector();
            let decision = Decision::from_outputs(&entrant.controller.activate(&inputs));
            entrant.car.apply_decision(decision);
        }

        let mut still_alive = 0;
        for entrant in &mut self.entrants {
            if !entrant.car.alive {
                continue;
            }
            entrant.car.update(&self.map);
            // A car that crashes this tick is not credited for it
            if entrant.car.alive {
                still_alive += 1;
                entrant.fitness += entrant.car.reward();
            }
        }

        if still_alive == 0 {
            self.status = EpisodeStatus::AllDead;
            return self.status;
        }

        self.tick += 1;
        if self.tick >= self.tick_limit {
            self.status = EpisodeStatus::TickLimitReached;
        }
        self.status
    }

    pub fn run(&mut self) -> EpisodeStatus {
        while !self.step().is_finished() {}
        debug!(
            "Episode for generation {} ended as {:?} after {} ticks",
            self.generation, self.status, self.tick
        );
        self.status
    }

    pub fn report(&self) -> EpisodeReport {
        EpisodeReport {
            generation: self.generation,
            status: self.status,
            ticks: self.tick,
            survivors: self.alive_count(),
            fitness: self.entrants.iter().map(|e| e.fitness).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossoverType {
    SinglePoint,
    Uniform,
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub tick_limit: u32,
    pub car_size: f64,
    pub initial_speed: f64,
    pub min_speed: f64,
    pub turn_step_degrees: f64,
    pub radar_max_length: u32,
    pub radar_bucket: u32,
    pub population_size: usize,
    pub num_generations: usize,
    pub tournament_size: usize, // For tournament selection
    pub elitism_count: usize, // Number of elite individuals to carry over
    pub mutation_rate_per_gene: f64,
    pub mutation_rate_per_individual: f64, // Chance an individual undergoes any mutation
    pub crossover_type: CrossoverType,
    pub hidden_nodes: usize,
    pub window_width: f32,
    pub window_height: f32,
    pub ticks_per_second: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_limit: 2400, // 40 seconds at 60 ticks per second
            car_size: 10.0,
            initial_speed: 5.0,
            min_speed: 5.0,
            turn_step_degrees: 20.0,
            radar_max_length: 300,
            radar_bucket: 30,
            population_size: 30,
            num_generations: 1000,
            tournament_size: 3,
            elitism_count: 2,
            mutation_rate_per_gene: 0.2,
            mutation_rate_per_individual: 0.8,
            crossover_type: CrossoverType::Uniform,
            hidden_nodes: 6,
            window_width: 1800.0,
            window_height: 1200.0,
            ticks_per_second: 60.0,
        }
    }
}

impl SimulationConfig {
    pub fn car_params(&self) -> CarParams {
        CarParams {
            size: self.car_size,
            initial_speed: self.initial_speed,
            min_speed: self.min_speed,
            turn_step: self.turn_step_degrees,
            radar_max_length: self.radar_max_length,
            radar_bucket: self.radar_bucket,
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        let fail = |msg: String| Err(SimError::InvalidConfig(msg));
        if self.population_size == 0 {
            return fail("population_size must be at least 1".into());
        }
        if self.tick_limit == 0 {
            return fail("tick_limit must be at least 1".into());
        }
        if self.elitism_count > self.population_size {
            return fail(format!(
                "elitism_count {} exceeds population_size {}",
                self.elitism_count, self.population_size
            ));
        }
        if self.tournament_size == 0 {
            return fail("tournament_size must be at least 1".into());
        }
        if self.radar_bucket == 0 {
            return fail("radar_bucket must be non-zero".into());
        }
        if self.car_size <= 0.0 {
            return fail(format!("car_size must be positive, got {}", self.car_size));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate_per_gene)
            || !(0.0..=1.0).contains(&self.mutation_rate_per_individual)
        {
            return fail("mutation rates must lie in [0, 1]".into());
        }
        if self.ticks_per_second <= 0.0 {
            return fail("ticks_per_second must be positive".into());
        }
        Ok(())
    }
}
