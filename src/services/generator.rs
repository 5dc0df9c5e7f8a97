//! Combination generator.
//!
//! Orchestrates the [`Selector`] and the [`ConstraintResolver`] in a bounded
//! retry loop, and fills batches of unique combinations against an explicit
//! [`GenerationContext`].
//!
//! ## Design
//!
//! - All mutable state (quotas, pair usage, usage stats, hash history) lives in
//!   the context and is mutated only when a combination is accepted
//! - The solving strategy sits behind [`CombinationSolver`]
//! - Cancellation is cooperative and checked at the top of every attempt
//! - Exhausting attempts is never an error; batches report their status

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::GenerationConfig;
use crate::models::{
    Combination, GeneratedHashes, Layer, PairUsage, Project, QuotaState, RarityMode, RuleSet,
    TraitCatalog, TraitUsageStats,
};
use crate::services::resolver::{Attempt, ConstraintResolver, DEFAULT_MAX_PASSES};
use crate::services::rules::RuleStore;
use crate::services::selector::Selector;

/// Mutable generation state threaded through every generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationContext {
    /// Remaining exact-count quotas
    pub quotas: QuotaState,
    /// Rule pairing counters
    pub pair_usage: PairUsage,
    /// Per-item usage across preview and export
    pub usage: TraitUsageStats,
    /// Every hash produced for the collection
    pub generated: GeneratedHashes,
}

impl GenerationContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds usage stats and hash history from a project.
    #[must_use]
    pub fn from_project(project: &Project) -> Self {
        Self {
            usage: project.trait_usage_stats.clone(),
            generated: project.generated_combinations.clone(),
            ..Self::default()
        }
    }

    /// Commits an accepted attempt.
    ///
    /// Records usage, consumes quotas when enforced, remembers the hash, and
    /// counts the attempt's rule pairings.
    pub fn accept(&mut self, catalog: &TraitCatalog, attempt: &Attempt, respect_quotas: bool) {
        self.usage.record(&attempt.combination);
        if respect_quotas {
            self.quotas.consume(catalog, &attempt.combination);
        }
        self.generated.insert(attempt.combination.hash());
        for key in attempt.pair_keys() {
            self.pair_usage.increment(key);
        }
    }
}

/// Shared cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an untripped token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the token was tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears the token so it can be reused.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// How the batch loop shares its thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePolicy {
    /// Run the loop without yielding.
    Blocking,
    /// Yield and report progress every `every` attempts.
    Cooperative {
        /// Attempts between yields
        every: usize,
    },
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self::Cooperative { every: 25 }
    }
}

/// Tunables of the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Attempt cap for a single preview combination
    pub preview_max_attempts: usize,
    /// Batch attempt cap is `batch size * multiplier`
    pub batch_attempt_multiplier: usize,
    /// Fixpoint pass cap of the resolver
    pub max_resolver_passes: usize,
    /// Bias selection toward under-used items
    pub balance_usage: bool,
    /// Add the built-in head/body rule and coherence check when rules are on
    pub builtin_rules: bool,
    /// Scheduling policy of the batch loop
    pub schedule: SchedulePolicy,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            preview_max_attempts: 400,
            batch_attempt_multiplier: 30,
            max_resolver_passes: DEFAULT_MAX_PASSES,
            balance_usage: true,
            builtin_rules: true,
            schedule: SchedulePolicy::default(),
        }
    }
}

impl GenerationOptions {
    /// Builds options from the `[generation]` config section.
    #[must_use]
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            preview_max_attempts: config.preview_max_attempts,
            batch_attempt_multiplier: config.batch_attempt_multiplier,
            max_resolver_passes: config.max_resolver_passes,
            balance_usage: config.balance_usage,
            builtin_rules: true,
            schedule: if config.yield_every == 0 {
                SchedulePolicy::Blocking
            } else {
                SchedulePolicy::Cooperative {
                    every: config.yield_every,
                }
            },
        }
    }
}

/// Immutable inputs of a generation run.
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    /// Layers and items
    pub catalog: &'a TraitCatalog,
    /// User rules
    pub rules: &'a RuleSet,
    /// Global rarity mode
    pub rarity_mode: RarityMode,
}

impl<'a> GenerationInput<'a> {
    /// Borrows the inputs of a project.
    #[must_use]
    pub const fn from_project(project: &'a Project) -> Self {
        Self {
            catalog: &project.catalog,
            rules: &project.rules,
            rarity_mode: project.rarity_mode,
        }
    }
}

/// Everything a solver needs to produce one valid attempt.
#[derive(Debug, Clone, Copy)]
pub struct SolveRequest<'a> {
    /// Layers and items
    pub catalog: &'a TraitCatalog,
    /// Rules in effect
    pub rules: &'a RuleStore,
    /// Item selection strategy
    pub selector: Selector<'a>,
    /// Remaining quotas
    pub quotas: &'a QuotaState,
    /// Committed pairing counters
    pub pair_usage: &'a PairUsage,
    /// Whether exact-count quotas are enforced
    pub respect_quotas: bool,
    /// Whether selection is usage-balanced
    pub force_balance: bool,
    /// Fixpoint pass cap of the resolver
    pub max_passes: usize,
}

impl SolveRequest<'_> {
    fn resolver(&self) -> ConstraintResolver<'_> {
        ConstraintResolver::new(
            self.catalog,
            self.rules,
            self.selector,
            self.quotas,
            self.pair_usage,
        )
        .with_max_passes(self.max_passes)
    }
}

/// Strategy producing one rule-compliant combination.
///
/// Implementations must never return an attempt that violates exclusions,
/// coherence, or (when enforced) quotas.
pub trait CombinationSolver: Send {
    /// Tries up to `max_attempts` times; `None` means every attempt failed.
    fn solve(&mut self, request: &SolveRequest<'_>, max_attempts: usize) -> Option<Attempt>;
}

/// Monte-Carlo solver: builds random attempts and discards invalid ones.
pub struct RetrySolver {
    rng: ChaCha8Rng,
}

impl RetrySolver {
    /// Creates a solver with a reproducible random stream.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Creates a solver seeded from the operating system.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Creates a seeded solver when a seed is given.
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    fn pick(&mut self, request: &SolveRequest<'_>, layer: &Layer) -> Option<u64> {
        let item = if request.respect_quotas && layer.exact_count_mode {
            request
                .selector
                .select_with_quota(&mut self.rng, layer, request.quotas)
        } else {
            request
                .selector
                .select_weighted_random(&mut self.rng, layer, request.force_balance)
        };
        item.map(|item| item.id)
    }

    /// One attempt; `None` if it ends up invalid.
    fn try_once(&mut self, request: &SolveRequest<'_>) -> Option<Attempt> {
        let resolver = request.resolver();
        let layers = request.catalog.non_empty_layers();
        let mut attempt = Attempt::new();

        let source_ids = request.rules.source_layer_ids();
        let mut sources: Vec<&Layer> = layers
            .iter()
            .copied()
            .filter(|layer| source_ids.contains(&layer.id))
            .collect();
        sources.sort_by_key(|layer| layer.items.len());

        for layer in sources {
            if attempt.combination.contains_layer(layer.id) {
                continue;
            }
            let item_id = self.pick(request, layer)?;
            attempt.combination.insert(layer.id, item_id);
            resolver.apply_all_matching(&mut self.rng, &mut attempt, request.respect_quotas);
        }

        for layer in &layers {
            if attempt.combination.contains_layer(layer.id) {
                continue;
            }
            let item_id = self.pick(request, layer)?;
            attempt.combination.insert(layer.id, item_id);
        }

        resolver.apply_all_matching(&mut self.rng, &mut attempt, request.respect_quotas);

        if request
            .rules
            .violates_exclusions(request.catalog, &attempt.combination)
        {
            return None;
        }
        if request.respect_quotas && !request.quotas.admits(request.catalog, &attempt.combination) {
            return None;
        }
        if !resolver.ensure_coherence(&mut self.rng, &mut attempt, request.respect_quotas) {
            return None;
        }

        Some(attempt)
    }
}

impl CombinationSolver for RetrySolver {
    fn solve(&mut self, request: &SolveRequest<'_>, max_attempts: usize) -> Option<Attempt> {
        (0..max_attempts).find_map(|_| self.try_once(request))
    }
}

/// Parameters of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRequest {
    /// Number of combinations wanted
    pub size: usize,
    /// Whether rules are applied
    pub use_rules: bool,
    /// Whether exact-count quotas are enforced
    pub respect_quotas: bool,
}

/// Progress snapshot passed to batch callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// Combinations accepted so far
    pub produced: usize,
    /// Combinations requested
    pub requested: usize,
    /// Attempts made so far
    pub attempts: usize,
}

/// Outcome of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every requested combination was produced.
    Complete,
    /// Fewer combinations than requested were produced.
    Partial,
    /// The cancel token was tripped.
    Cancelled,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Partial => write!(f, "partial"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Combinations of a batch plus how the run went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Accepted combinations in acceptance order
    pub combinations: Vec<Combination>,
    /// Combinations requested
    pub requested: usize,
    /// Attempts made
    pub attempts: usize,
    /// Outcome
    pub status: BatchStatus,
    /// Set when the request exceeded the remaining unique capacity
    pub reduced_to: Option<usize>,
}

impl BatchResult {
    /// Requested combinations that were not produced.
    #[must_use]
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.combinations.len())
    }
}

/// Generates single combinations and batches.
pub struct CombinationGenerator {
    solver: Box<dyn CombinationSolver>,
    options: GenerationOptions,
}

impl CombinationGenerator {
    /// Creates a generator with a [`RetrySolver`], seeded when `seed` is set.
    #[must_use]
    pub fn new(options: GenerationOptions, seed: Option<u64>) -> Self {
        Self::with_solver(options, Box::new(RetrySolver::new(seed)))
    }

    /// Creates a generator with a custom solver.
    #[must_use]
    pub fn with_solver(options: GenerationOptions, solver: Box<dyn CombinationSolver>) -> Self {
        Self { solver, options }
    }

    /// Active options.
    #[must_use]
    pub const fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Rules in effect for a run.
    #[must_use]
    pub fn rule_store(&self, input: &GenerationInput<'_>, use_rules: bool) -> RuleStore {
        match (use_rules, self.options.builtin_rules) {
            (false, _) => RuleStore::disabled(),
            (true, true) => RuleStore::new(input.catalog, input.rules),
            (true, false) => RuleStore::without_builtins(input.rules),
        }
    }

    fn request<'a>(
        &self,
        input: &GenerationInput<'a>,
        rules: &'a RuleStore,
        context: &'a GenerationContext,
        respect_quotas: bool,
    ) -> SolveRequest<'a> {
        SolveRequest {
            catalog: input.catalog,
            rules,
            selector: Selector::new(&context.usage, input.rarity_mode),
            quotas: &context.quotas,
            pair_usage: &context.pair_usage,
            respect_quotas,
            force_balance: self.options.balance_usage,
            max_passes: self.options.max_resolver_passes,
        }
    }

    /// Generates one combination for preview.
    ///
    /// Usage stats and pair usage are updated; quotas and hash history are
    /// not. Returns an empty combination when every attempt failed.
    pub fn generate_combination(
        &mut self,
        input: &GenerationInput<'_>,
        context: &mut GenerationContext,
        use_rules: bool,
        respect_quotas: bool,
    ) -> Combination {
        let rules = self.rule_store(input, use_rules);
        let max_attempts = self.options.preview_max_attempts;
        let request = self.request(input, &rules, context, respect_quotas);
        let Some(attempt) = self.solver.solve(&request, max_attempts) else {
            tracing::warn!("No valid combination found after {} attempts", max_attempts);
            return Combination::new();
        };

        context.usage.record(&attempt.combination);
        for key in attempt.pair_keys() {
            context.pair_usage.increment(key);
        }
        attempt.combination
    }

    /// Generates up to `request.size` unique combinations.
    ///
    /// The request is clamped to the catalog's remaining unique capacity:
    /// its theoretical maximum minus the history hashes it can still produce.
    /// Every accepted combination updates the context immediately, so later
    /// attempts see current quotas and usage. `progress` is called on every
    /// acceptance and at each cooperative yield.
    pub fn generate_batch<F>(
        &mut self,
        input: &GenerationInput<'_>,
        context: &mut GenerationContext,
        request: &BatchRequest,
        cancel: &CancelToken,
        mut progress: F,
    ) -> BatchResult
    where
        F: FnMut(BatchProgress),
    {
        let capacity = input
            .catalog
            .theoretical_max()
            .saturating_sub(context.generated.count_within(input.catalog));
        let target = usize::try_from(capacity).map_or(request.size, |cap| request.size.min(cap));
        let reduced_to = (target < request.size).then(|| {
            tracing::warn!(
                "Requested {} combinations but only {} unique combinations remain",
                request.size,
                target
            );
            target
        });

        let rules = self.rule_store(input, request.use_rules);
        let max_attempts = request.size.saturating_mul(self.options.batch_attempt_multiplier);
        let mut combinations = Vec::with_capacity(target);
        let mut attempts = 0;
        let mut cancelled = false;

        tracing::debug!(
            "Generating batch of {} (attempt cap {}, rules: {}, quotas: {})",
            target,
            max_attempts,
            request.use_rules,
            request.respect_quotas
        );

        while combinations.len() < target && attempts < max_attempts {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            attempts += 1;

            let solved = {
                let solve_request = self.request(input, &rules, context, request.respect_quotas);
                self.solver.solve(&solve_request, 1)
            };

            if let Some(attempt) = solved {
                let hash = attempt.combination.hash();
                let duplicate = context.generated.contains(&hash);
                let within_quota = !request.respect_quotas
                    || context.quotas.admits(input.catalog, &attempt.combination);

                if !duplicate && within_quota {
                    context.accept(input.catalog, &attempt, request.respect_quotas);
                    combinations.push(attempt.combination);
                    progress(BatchProgress {
                        produced: combinations.len(),
                        requested: request.size,
                        attempts,
                    });
                }
            }

            if let SchedulePolicy::Cooperative { every } = self.options.schedule {
                if every > 0 && attempts % every == 0 {
                    progress(BatchProgress {
                        produced: combinations.len(),
                        requested: request.size,
                        attempts,
                    });
                    thread::yield_now();
                }
            }
        }

        let status = if cancelled {
            tracing::info!("Batch cancelled after {} combinations", combinations.len());
            BatchStatus::Cancelled
        } else if combinations.len() >= request.size {
            BatchStatus::Complete
        } else {
            tracing::warn!(
                "Batch produced {} of {} combinations in {} attempts",
                combinations.len(),
                request.size,
                attempts
            );
            BatchStatus::Partial
        };

        BatchResult {
            combinations,
            requested: request.size,
            attempts,
            status,
            reduced_to,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::models::{Item, ItemId, LayerId};
    use crate::services::quota::initialize_quotas;

    fn layer(id: LayerId, name: &str, first_item: ItemId, names: &[&str]) -> Layer {
        let items = names
            .iter()
            .enumerate()
            .map(|(offset, name)| Item::new(first_item + offset as u64, *name).with_rarity(10.0))
            .collect();
        Layer::new(id, name, items).unwrap()
    }

    fn small_catalog() -> TraitCatalog {
        TraitCatalog::from_layers(vec![
            layer(1, "Background", 10, &["Sky", "Sea", "Sand"]),
            layer(2, "Eyes", 20, &["Round", "Sleepy"]),
        ])
        .unwrap()
    }

    fn batch(size: usize) -> BatchRequest {
        BatchRequest {
            size,
            use_rules: true,
            respect_quotas: true,
        }
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn test_generate_combination_fills_every_layer() {
        let catalog = small_catalog();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Weighted,
        };
        let mut context = GenerationContext::new();
        let mut generator = CombinationGenerator::new(GenerationOptions::default(), Some(1));

        let combination = generator.generate_combination(&input, &mut context, true, false);
        assert_eq!(combination.len(), 2);
        assert!(context.generated.is_empty(), "preview does not consume history");
        assert_eq!(
            context.usage.count(1, combination.get(1).unwrap()),
            1,
            "preview records usage"
        );
    }

    #[test]
    fn test_generate_combination_empty_catalog() {
        let catalog = TraitCatalog::new();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Weighted,
        };
        let mut context = GenerationContext::new();
        let mut generator = CombinationGenerator::new(GenerationOptions::default(), Some(1));
        let combination = generator.generate_combination(&input, &mut context, true, false);
        assert!(combination.is_empty());
    }

    #[test]
    fn test_batch_is_unique_and_exhausts_capacity() {
        let catalog = small_catalog();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Weighted,
        };
        let mut context = GenerationContext::new();
        let mut generator = CombinationGenerator::new(GenerationOptions::default(), Some(42));

        let result =
            generator.generate_batch(&input, &mut context, &batch(6), &CancelToken::new(), |_| {});
        assert_eq!(result.status, BatchStatus::Complete);
        let hashes: HashSet<String> = result.combinations.iter().map(Combination::hash).collect();
        assert_eq!(hashes.len(), 6);
        assert_eq!(context.generated.len(), 6);

        let again =
            generator.generate_batch(&input, &mut context, &batch(3), &CancelToken::new(), |_| {});
        assert!(again.combinations.is_empty());
        assert_eq!(again.reduced_to, Some(0));
        assert_eq!(again.status, BatchStatus::Partial);
        assert_eq!(again.shortfall(), 3);
    }

    #[test]
    fn test_stale_history_does_not_reduce_capacity() {
        let catalog = small_catalog();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Weighted,
        };
        let mut context = GenerationContext::new();
        // Left over from a removed layer 3 and from another catalog.
        for stale in ["1:10|2:20|3:30", "1:11|2:21|3:31", "1:12|3:30", "7:70|8:80", "1:10|2:99"] {
            context.generated.insert(stale);
        }
        context.generated.insert("1:10|2:20");
        let mut generator = CombinationGenerator::new(GenerationOptions::default(), Some(42));

        let result =
            generator.generate_batch(&input, &mut context, &batch(5), &CancelToken::new(), |_| {});
        assert_eq!(result.reduced_to, None);
        assert_eq!(result.status, BatchStatus::Complete);
        assert_eq!(result.combinations.len(), 5);
        assert!(result.combinations.iter().all(|c| c.hash() != "1:10|2:20"));
    }

    #[test]
    fn test_batch_cancelled_before_start() {
        let catalog = small_catalog();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Weighted,
        };
        let mut context = GenerationContext::new();
        let mut generator = CombinationGenerator::new(GenerationOptions::default(), Some(42));
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = generator.generate_batch(&input, &mut context, &batch(4), &cancel, |_| {});
        assert_eq!(result.status, BatchStatus::Cancelled);
        assert!(result.combinations.is_empty());
        assert_eq!(context, GenerationContext::new(), "nothing committed");
    }

    #[test]
    fn test_batch_cancelled_midway_keeps_accepted_state() {
        let catalog = small_catalog();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Weighted,
        };
        let mut context = GenerationContext::new();
        let mut generator = CombinationGenerator::new(GenerationOptions::default(), Some(42));
        let cancel = CancelToken::new();

        let trip = cancel.clone();
        let result = generator.generate_batch(&input, &mut context, &batch(6), &cancel, |progress| {
            if progress.produced == 2 {
                trip.cancel();
            }
        });
        assert_eq!(result.status, BatchStatus::Cancelled);
        assert_eq!(result.combinations.len(), 2);
        assert_eq!(context.generated.len(), 2);
    }

    #[test]
    fn test_batch_exact_counts_converge() {
        let mut eyes = layer(1, "Eyes", 10, &["A", "B"]);
        eyes.set_count(10, 3).unwrap();
        eyes.set_count(11, 5).unwrap();
        let catalog = TraitCatalog::from_layers(vec![
            eyes.with_exact_count(true),
            layer(2, "Background", 20, &["1", "2", "3", "4", "5", "6", "7", "8"]),
        ])
        .unwrap();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Weighted,
        };
        let mut context = GenerationContext::new();
        context.quotas = initialize_quotas(&catalog, 8);
        let mut generator = CombinationGenerator::new(GenerationOptions::default(), Some(3));

        let result =
            generator.generate_batch(&input, &mut context, &batch(8), &CancelToken::new(), |_| {});
        assert_eq!(result.combinations.len(), 8);
        let a = result.combinations.iter().filter(|c| c.has(1, 10)).count();
        let b = result.combinations.iter().filter(|c| c.has(1, 11)).count();
        assert_eq!((a, b), (3, 5));
        assert_eq!(context.quotas.layer_total(1), 0);
    }

    #[test]
    fn test_blocking_schedule_reports_only_acceptances() {
        let catalog = small_catalog();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Equal,
        };
        let options = GenerationOptions {
            schedule: SchedulePolicy::Blocking,
            ..GenerationOptions::default()
        };
        let mut context = GenerationContext::new();
        let mut generator = CombinationGenerator::new(options, Some(8));
        let mut calls = 0;

        let result = generator.generate_batch(&input, &mut context, &batch(4), &CancelToken::new(), |_| {
            calls += 1;
        });
        assert_eq!(calls, result.combinations.len());
    }

    struct FailingSolver;

    impl CombinationSolver for FailingSolver {
        fn solve(&mut self, _request: &SolveRequest<'_>, _max_attempts: usize) -> Option<Attempt> {
            None
        }
    }

    #[test]
    fn test_batch_with_failing_solver_is_partial() {
        let catalog = small_catalog();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Weighted,
        };
        let mut context = GenerationContext::new();
        let mut generator =
            CombinationGenerator::with_solver(GenerationOptions::default(), Box::new(FailingSolver));

        let result =
            generator.generate_batch(&input, &mut context, &batch(2), &CancelToken::new(), |_| {});
        assert_eq!(result.status, BatchStatus::Partial);
        assert_eq!(result.attempts, 60);
        assert!(result.combinations.is_empty());
    }
}
