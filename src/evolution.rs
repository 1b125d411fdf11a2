use crate::brain::{NeuralController, NeuralGenome, MAX_WEIGHT, MIN_WEIGHT};
use crate::simulation::{CrossoverType, Episode, EpisodeReport, SimulationConfig};
use crate::track::Track;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::info;

/// (child_id, parent1_id, parent2_id, generation)
pub type LineageRecord = (usize, Option<usize>, Option<usize>, usize);

#[derive(Debug, Clone)]
pub struct Individual {
    pub id: usize,
    pub genome: NeuralGenome,
    pub fitness: f64,
    pub generation: usize, // Generation this individual was born in
}

impl Individual {
    fn new_random<R: Rng + ?Sized>(id: usize, rng: &mut R, config: &SimulationConfig, generation: usize) -> Self {
        Self {
            id,
            genome: NeuralGenome::new_random(config.hidden_nodes, rng),
            fitness: 0.0,
            generation,
        }
    }

    // Gaussian nudges per gene, gated by the per-individual rate
    fn mutate_genome<R: Rng + ?Sized>(genome: &mut NeuralGenome, rng: &mut R, config: &SimulationConfig) {
        if !rng.gen_bool(config.mutation_rate_per_individual) {
            return;
        }
        for weight in &mut genome.weights {
            if rng.gen_bool(config.mutation_rate_per_gene) {
                Self::mutate_float_gene(weight, MIN_WEIGHT, MAX_WEIGHT, rng);
            }
        }
    }

    fn mutate_float_gene<R: Rng + ?Sized>(value: &mut f64, min: f64, max: f64, rng: &mut R) {
        // Standard deviation is 10% of the allowed range
        let std_dev = (max - min) * 0.1;
        if let Ok(normal) = Normal::new(0.0, std_dev) {
            *value += normal.sample(rng);
            *value = value.clamp(min, max);
        }
    }

    fn from_parents<R: Rng + ?Sized>(
        id: usize,
        parent1: &Individual,
        parent2: &Individual,
        rng: &mut R,
        config: &SimulationConfig,
        generation: usize,
    ) -> Self {
        let mut genes = parent1.genome.to_flat_list();
        let other = parent2.genome.to_flat_list();
        let gene_count = genes.len().min(other.len());
        if gene_count > 0 {
            match config.crossover_type {
                CrossoverType::SinglePoint => {
                    let crossover_point = rng.gen_range(0..gene_count);
                    genes[crossover_point..gene_count].copy_from_slice(&other[crossover_point..gene_count]);
                }
                CrossoverType::Uniform => {
                    for i in 0..gene_count {
                        if rng.gen_bool(0.5) {
                            genes[i] = other[i];
                        }
                    }
                }
            }
        }
        let mut genome = NeuralGenome::from_flat_list(config.hidden_nodes, &genes);
        Self::mutate_genome(&mut genome, rng, config);

        Self { id, genome, fitness: 0.0, generation }
    }
}

#[derive(Debug)]
pub struct Population {
    pub individuals: Vec<Individual>,
    pub generation_count: usize,
}

impl Population {
    // Tournament selection
    fn select_one_parent<'a, R: Rng + ?Sized>(&'a self, rng: &mut R, tournament_size: usize) -> &'a Individual {
        let mut best = &self.individuals[rng.gen_range(0..self.individuals.len())];
        for _ in 1..tournament_size {
            let contender = &self.individuals[rng.gen_range(0..self.individuals.len())];
            if contender.fitness > best.fitness {
                best = contender;
            }
        }
        best
    }

    pub fn select_parents<'a, R: Rng + ?Sized>(
        &'a self,
        rng: &mut R,
        tournament_size: usize,
    ) -> (&'a Individual, &'a Individual) {
        let parent1 = self.select_one_parent(rng, tournament_size);
        let mut parent2 = self.select_one_parent(rng, tournament_size);
        // Different parents when the population allows it; a uniform pick always terminates
        if self.individuals.len() > 1 {
            while parent2.id == parent1.id {
                parent2 = self.select_one_parent(rng, 1);
            }
        }
        (parent1, parent2)
    }

    pub fn sort_by_fitness(&mut self) {
        self.individuals
            .sort_by(|a, b| b.fitness.partial_cmp(&a.fitness).unwrap_or(Ordering::Equal));
    }

    pub fn best(&self) -> Option<&Individual> {
        self.individuals.first()
    }

    pub fn average_fitness(&self) -> f64 {
        if self.individuals.is_empty() {
            return 0.0;
        }
        self.individuals.iter().map(|ind| ind.fitness).sum::<f64>() / self.individuals.len() as f64
    }
}

/// Stands in for the optimizer: owns the population, the generation counter and the rng.
pub struct EvolutionEngine {
    pub population: Population,
    config: SimulationConfig,
    rng: StdRng,
    next_id: usize,
    pub phylogeny_data: Vec<LineageRecord>,
    pub all_time_best_individual: Option<Individual>,
}

impl EvolutionEngine {
    pub fn new(config: SimulationConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut engine = Self {
            population: Population { individuals: Vec::new(), generation_count: 0 },
            config,
            rng,
            next_id: 0,
            phylogeny_data: Vec::new(),
            all_time_best_individual: None,
        };
        engine.seed_population();
        engine
    }

    fn seed_population(&mut self) {
        let initial_generation = 0;
        let mut individuals = Vec::with_capacity(self.config.population_size);
        for _ in 0..self.config.population_size {
            let id = self.allocate_id();
            individuals.push(Individual::new_random(id, &mut self.rng, &self.config, initial_generation));
        }
        self.phylogeny_data = individuals.iter().map(|ind| (ind.id, None, None, initial_generation)).collect();
        self.population = Population { individuals, generation_count: initial_generation };
    }

    fn allocate_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn generation(&self) -> usize {
        self.population.generation_count
    }

    /// Fresh random population at generation 0. Ids keep counting so old lineage never collides.
    pub fn reset(&mut self) {
        self.seed_population();
        self.all_time_best_individual = None;
        info!("Evolution engine reset");
    }

    pub fn controllers(&self) -> Vec<NeuralController> {
        self.population.individuals.iter().map(|ind| ind.genome.controller()).collect()
    }

    /// One episode with a car per individual, in population order.
    pub fn begin_episode(&self, track: &Track) -> Episode<NeuralController> {
        Episode::new(Arc::clone(&track.map), &track.info, self.controllers(), &self.config, self.generation())
    }

    /// Writes episode fitness back onto the population (same order as `begin_episode`).
    pub fn commit_fitness(&mut self, report: &EpisodeReport) {
        for (individual, fitness) in self.population.individuals.iter_mut().zip(&report.fitness) {
            individual.fitness = *fitness;
        }
        self.population.sort_by_fitness();
        self.update_all_time_best();

        info!(
            "Gen: {} - Best Fitness: {:.2}, Avg Fitness: {:.2}, Survivors: {}/{}, Ended: {:?} after {} ticks",
            self.population.generation_count,
            self.population.best().map_or(0.0, |ind| ind.fitness),
            self.population.average_fitness(),
            report.survivors,
            report.fitness.len(),
            report.status,
            report.ticks,
        );
    }

    pub fn evaluate(&mut self, track: &Track) -> EpisodeReport {
        let mut episode = self.begin_episode(track);
        episode.run();
        let report = episode.report();
        self.commit_fitness(&report);
        report
    }

    fn update_all_time_best(&mut self) {
        if let Some(current_gen_best) = self.population.best() {
            let improved = self
                .all_time_best_individual
                .as_ref()
                .map_or(true, |best| current_gen_best.fitness > best.fitness);
            if improved {
                info!(
                    "New all-time best individual! ID: {}, Fitness: {:.2}, Gen: {}",
                    current_gen_best.id, current_gen_best.fitness, current_gen_best.generation
                );
                self.all_time_best_individual = Some(current_gen_best.clone());
            }
        }
    }

    /// Breeds the next generation from the (evaluated, sorted) current one.
    pub fn evolve_generation(&mut self) {
        let next_generation_number = self.population.generation_count + 1;
        let mut new_population = Vec::with_capacity(self.config.population_size);

        // Elitism: carry the best individuals over unchanged
        new_population.extend(
            self.population.individuals.iter().take(self.config.elitism_count).cloned(),
        );

        while new_population.len() < self.config.population_size {
            let id = self.allocate_id();
            let (parent1, parent2) = self.population.select_parents(&mut self.rng, self.config.tournament_size);
            let offspring = Individual::from_parents(id, parent1, parent2, &mut self.rng, &self.config, next_generation_number);
            self.phylogeny_data.push((offspring.id, Some(parent1.id), Some(parent2.id), next_generation_number));
            new_population.push(offspring);
        }

        self.population.individuals = new_population;
        self.population.generation_count = next_generation_number;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{BoundaryMap, TrackInfo};
    use image::RgbaImage;

    fn test_config() -> SimulationConfig {
        SimulationConfig {
            population_size: 10,
            tick_limit: 60,
            tournament_size: 3,
            elitism_count: 1,
            mutation_rate_per_gene: 0.5,
            mutation_rate_per_individual: 1.0, // Ensure mutation happens for testing
            ..Default::default()
        }
    }

    fn test_track() -> Track {
        // Open square with a wall band on the right
        Track {
            info: TrackInfo { name: "test", start: (295, 295), heading: 0.0 },
            map: Arc::new(BoundaryMap::from_fn(600, 600, |x, _| x >= 450)),
            image: RgbaImage::new(1, 1),
        }
    }

    #[test]
    fn population_initialization_and_evaluation() {
        let config = test_config();
        let mut engine = EvolutionEngine::new(config.clone(), Some(1));
        assert_eq!(engine.population.individuals.len(), config.population_size);
        assert_eq!(engine.phylogeny_data.len(), config.population_size);

        let report = engine.evaluate(&test_track());
        assert_eq!(report.generation, 0);
        assert_eq!(report.fitness.len(), config.population_size);
        assert!(report.fitness.iter().all(|f| *f >= 0.0));
        // Sorted best first
        let fitness: Vec<f64> = engine.population.individuals.iter().map(|i| i.fitness).collect();
        assert!(fitness.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn tournament_selection() {
        let config = test_config();
        let mut engine = EvolutionEngine::new(config.clone(), Some(2));
        for (i, ind) in engine.population.individuals.iter_mut().enumerate() {
            ind.fitness = i as f64;
        }
        engine.population.sort_by_fitness();

        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            let (p1, p2) = engine.population.select_parents(&mut rng, config.tournament_size);
            assert_ne!(p1.id, p2.id);
        }
        // A tournament as large as the population almost always finds the best
        let best = engine.population.select_one_parent(&mut rng, 200);
        assert_eq!(best.fitness, 9.0);
    }

    #[test]
    fn crossover_and_mutation() {
        let config = test_config();
        let mut rng = StdRng::seed_from_u64(3);
        let parent1 = Individual::new_random(0, &mut rng, &config, 0);
        let parent2 = Individual::new_random(1, &mut rng, &config, 0);

        for crossover_type in [CrossoverType::SinglePoint, CrossoverType::Uniform] {
            let config = SimulationConfig { crossover_type, ..config.clone() };
            let child = Individual::from_parents(2, &parent1, &parent2, &mut rng, &config, 1);
            assert_eq!(child.genome.weights.len(), parent1.genome.weights.len());
            assert_ne!(child.genome, parent1.genome);
            assert!(child.genome.weights.iter().all(|w| (MIN_WEIGHT..=MAX_WEIGHT).contains(w)));
            assert_eq!(child.generation, 1);
        }
    }

    #[test]
    fn crossover_without_mutation_only_mixes_parent_genes() {
        let config = SimulationConfig { mutation_rate_per_individual: 0.0, ..test_config() };
        let mut rng = StdRng::seed_from_u64(4);
        let parent1 = Individual::new_random(0, &mut rng, &config, 0);
        let parent2 = Individual::new_random(1, &mut rng, &config, 0);
        let child = Individual::from_parents(2, &parent1, &parent2, &mut rng, &config, 1);
        for (i, w) in child.genome.weights.iter().enumerate() {
            assert!(*w == parent1.genome.weights[i] || *w == parent2.genome.weights[i]);
        }
    }

    #[test]
    fn evolve_keeps_elite_and_records_lineage() {
        let config = test_config();
        let mut engine = EvolutionEngine::new(config.clone(), Some(6));
        let track = test_track();
        engine.evaluate(&track);
        let elite = engine.population.best().cloned().unwrap();

        engine.evolve_generation();
        assert_eq!(engine.generation(), 1);
        assert_eq!(engine.population.individuals.len(), config.population_size);
        assert_eq!(engine.population.individuals[0].id, elite.id);
        assert_eq!(engine.phylogeny_data.len(), config.population_size * 2 - config.elitism_count);

        let report = engine.evaluate(&track);
        assert_eq!(report.generation, 1);
        // Simulation is deterministic, so the elite can only match or be beaten
        assert!(engine.all_time_best_individual.as_ref().unwrap().fitness >= elite.fitness);
    }

    #[test]
    fn all_time_best_tracking() {
        let config = test_config();
        let mut engine = EvolutionEngine::new(config, Some(7));
        engine.population.individuals[0].fitness = 10.0;
        engine.population.individuals[1].fitness = 3.0;
        engine.population.sort_by_fitness();
        engine.update_all_time_best();
        assert_eq!(engine.all_time_best_individual.as_ref().unwrap().fitness, 10.0);

        engine.population.individuals[0].fitness = 4.0;
        engine.update_all_time_best();
        assert_eq!(engine.all_time_best_individual.as_ref().unwrap().fitness, 10.0);
    }

    #[test]
    fn engine_reset() {
        let config = test_config();
        let mut engine = EvolutionEngine::new(config.clone(), Some(8));
        engine.evaluate(&test_track());
        engine.evolve_generation();
        assert_ne!(engine.generation(), 0);

        engine.reset();
        assert_eq!(engine.generation(), 0);
        assert_eq!(engine.phylogeny_data.len(), config.population_size);
        assert!(engine.all_time_best_individual.is_none());
        // Ids are never reused
        assert!(engine.population.individuals.iter().all(|ind| ind.id >= 2 * config.population_size - 1));
    }

    #[test]
    fn seeded_engines_agree() {
        let track = test_track();
        let mut a = EvolutionEngine::new(test_config(), Some(42));
        let mut b = EvolutionEngine::new(test_config(), Some(42));
        for _ in 0..2 {
            assert_eq!(a.evaluate(&track), b.evaluate(&track));
            a.evolve_generation();
            b.evolve_generation();
        }
    }
}
