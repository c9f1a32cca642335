//! Loopback Price Generator
//!
//! Produces synthetic prices for the subscribed symbols. Each symbol starts
//! at a random price in a configured range and then follows a bounded
//! random walk, one step per tick.

use std::collections::HashMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::price::{PriceBatch, PriceRecord};
use crate::domain::subscription::Symbol;
use crate::infrastructure::config::{ConfigError, GeneratorSettings};

/// Lowest price the walk can reach.
const PRICE_FLOOR: f64 = 0.01;

/// Generator configuration.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorConfig {
    /// Time between ticks.
    pub tick_interval: Duration,
    /// Lower bound of a symbol's first price.
    pub initial_price_min: f64,
    /// Upper bound of a symbol's first price.
    pub initial_price_max: f64,
    /// Largest absolute change per tick.
    pub max_step: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            initial_price_min: 80.0,
            initial_price_max: 300.0,
            max_step: 3.0,
        }
    }
}

impl From<GeneratorSettings> for GeneratorConfig {
    fn from(settings: GeneratorSettings) -> Self {
        Self {
            tick_interval: settings.tick_interval,
            initial_price_min: settings.initial_price_min,
            initial_price_max: settings.initial_price_max,
            max_step: settings.max_step,
        }
    }
}

impl GeneratorConfig {
    /// Check the values with the same rules as the environment settings.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        GeneratorSettings {
            tick_interval: self.tick_interval,
            initial_price_min: self.initial_price_min,
            initial_price_max: self.initial_price_max,
            max_step: self.max_step,
        }
        .validate()
    }
}

/// Random-walk price generator.
///
/// The generator only produces prices while running. It remembers the last
/// price of every symbol it has seen, including symbols that were later
/// unsubscribed, so a re-subscribed symbol continues its walk.
#[derive(Debug)]
pub struct LoopbackGenerator {
    config: GeneratorConfig,
    rng: StdRng,
    latest_prices: HashMap<Symbol, f64>,
    running: bool,
}

impl LoopbackGenerator {
    /// Create a generator seeded from the operating system.
    #[must_use]
    pub fn new(config: GeneratorConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Create a generator with a fixed seed.
    #[must_use]
    pub fn with_seed(config: GeneratorConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GeneratorConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng,
            latest_prices: HashMap::new(),
            running: false,
        }
    }

    /// Generator configuration.
    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Start producing prices on tick.
    pub const fn resume(&mut self) {
        self.running = true;
    }

    /// Stop producing prices. Latest prices are kept.
    pub const fn pause(&mut self) {
        self.running = false;
    }

    /// Whether the generator is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Last generated price for a symbol.
    #[must_use]
    pub fn latest_price(&self, symbol: &str) -> Option<f64> {
        self.latest_prices.get(symbol).copied()
    }

    /// Produce one record per symbol.
    ///
    /// Returns `None` while paused or when there are no symbols.
    pub fn tick<'a, I>(&mut self, symbols: I) -> Option<PriceBatch>
    where
        I: IntoIterator<Item = &'a Symbol>,
    {
        if !self.running {
            return None;
        }

        let batch: PriceBatch = symbols
            .into_iter()
            .map(|symbol| self.next_record(symbol))
            .collect();

        if batch.is_empty() { None } else { Some(batch) }
    }

    /// Advance one symbol's walk by a single step.
    pub fn next_record(&mut self, symbol: &str) -> PriceRecord {
        let previous = match self.latest_prices.get(symbol) {
            Some(&price) => price,
            None => self
                .rng
                .random_range(self.config.initial_price_min..=self.config.initial_price_max),
        };

        let step = self.config.max_step.abs();
        let delta = self.rng.random_range(-step..=step);
        let price = (previous + delta).max(PRICE_FLOOR);

        self.latest_prices.insert(symbol.to_string(), price);
        PriceRecord::new(symbol, price, previous)
    }
}
