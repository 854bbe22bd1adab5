//! Near-miss query generation.
//!
//! Queries are built by sampling distinct assets from a fixed corpus and
//! replacing a fixed number of distinct character positions in each with
//! random alphanumeric symbols. The edit distance of every query to its source
//! asset is therefore bounded by the mutation count, which keeps queries close
//! to real entity names while defeating exact-match caches.
//!
//! Lengths are counted in `char`s so the output is always valid UTF-8.

use std::sync::Arc;

use rand::distributions::{Alphanumeric, Distribution};
use rand::seq::index;
use rand::Rng;

use crate::error::{CoreError, CoreResult};

/// Number of distinct symbols a replaced position can take (`[A-Za-z0-9]`).
pub const ALPHABET_SIZE: usize = 62;

/// Batch size used by the similarity scenario.
pub const DEFAULT_BATCH_SIZE: usize = 2;

/// Replaces `count` distinct positions of `target` using the thread-local RNG.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArgument`] when `count` exceeds the length of `target`.
pub fn mutate(target: &str, count: usize) -> CoreResult<String> {
    mutate_with(&mut rand::thread_rng(), target, count)
}

/// Replaces `count` distinct positions of `target` using `rng`.
///
/// Positions are drawn uniformly without replacement and each replacement
/// symbol is drawn uniformly from the alphanumeric alphabet. A replacement may
/// coincide with the original character.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArgument`] when `count` exceeds the length of `target`.
pub fn mutate_with<R: Rng + ?Sized>(rng: &mut R, target: &str, count: usize) -> CoreResult<String> {
    let length = target.chars().count();
    if count > length {
        return Err(CoreError::invalid_argument(format!(
            "mutation count {count} exceeds length {length} of `{target}`"
        )));
    }

    let positions = index::sample(&mut *rng, length, count);
    let replacements: Vec<(usize, char)> = positions
        .into_iter()
        .map(|position| (position, char::from(Alphanumeric.sample(&mut *rng))))
        .collect();

    apply_replacements(target, &replacements)
}

/// Writes each `(position, symbol)` pair into a copy of `target`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArgument`] when a position lies outside `target`.
pub fn apply_replacements(target: &str, replacements: &[(usize, char)]) -> CoreResult<String> {
    let mut chars: Vec<char> = target.chars().collect();
    for &(position, symbol) in replacements {
        let length = chars.len();
        let slot = chars.get_mut(position).ok_or_else(|| {
            CoreError::invalid_argument(format!(
                "position {position} is outside `{target}` (length {length})"
            ))
        })?;
        *slot = symbol;
    }
    Ok(chars.into_iter().collect())
}

/// Samples two distinct assets and mutates each with the thread-local RNG.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArgument`] when the corpus holds fewer than two
/// entries or a sampled asset is shorter than `count`.
pub fn sample_and_mutate<S: AsRef<str>>(corpus: &[S], count: usize) -> CoreResult<Vec<String>> {
    sample_and_mutate_with(&mut rand::thread_rng(), corpus, count)
}

/// Samples two distinct assets and mutates each using `rng`.
///
/// # Errors
///
/// See [`sample_and_mutate`].
pub fn sample_and_mutate_with<R, S>(rng: &mut R, corpus: &[S], count: usize) -> CoreResult<Vec<String>>
where
    R: Rng + ?Sized,
    S: AsRef<str>,
{
    sample_k_and_mutate_with(rng, corpus, DEFAULT_BATCH_SIZE, count)
}

/// Samples `k` distinct corpus positions and mutates each asset independently.
///
/// Selection is by position, so duplicate-valued entries are independently
/// selectable. The output follows the sampling order, not corpus order.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArgument`] when `k` is zero, the corpus holds
/// fewer than `k` entries, or a sampled asset is shorter than `count`.
pub fn sample_k_and_mutate_with<R, S>(
    rng: &mut R,
    corpus: &[S],
    k: usize,
    count: usize,
) -> CoreResult<Vec<String>>
where
    R: Rng + ?Sized,
    S: AsRef<str>,
{
    if k == 0 {
        return Err(CoreError::invalid_argument("batch size must be at least 1"));
    }
    if corpus.len() < k {
        return Err(CoreError::invalid_argument(format!(
            "asset corpus has {} entries, need at least {k}",
            corpus.len()
        )));
    }

    let picks = index::sample(&mut *rng, corpus.len(), k);
    picks
        .into_iter()
        .map(|i| mutate_with(&mut *rng, corpus[i].as_ref(), count))
        .collect()
}

/// Query batch generator bound to one asset corpus.
///
/// The corpus is shared read-only; each virtual user passes its own RNG.
#[derive(Debug, Clone)]
pub struct QueryGenerator {
    corpus: Arc<[String]>,
    mutation_count: usize,
    batch_size: usize,
}

impl QueryGenerator {
    /// Creates a generator producing pairs of mutated assets.
    ///
    /// # Errors
    ///
    /// See [`QueryGenerator::with_batch_size`].
    pub fn new(corpus: Arc<[String]>, mutation_count: usize) -> CoreResult<Self> {
        Self::with_batch_size(corpus, mutation_count, DEFAULT_BATCH_SIZE)
    }

    /// Creates a generator producing `batch_size` mutated assets per batch.
    ///
    /// Every asset must be at least `mutation_count` characters long, so a
    /// misconfigured corpus fails here rather than mid-run.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for a zero batch size, a corpus
    /// smaller than the batch, or an asset shorter than the mutation count.
    pub fn with_batch_size(
        corpus: Arc<[String]>,
        mutation_count: usize,
        batch_size: usize,
    ) -> CoreResult<Self> {
        if batch_size == 0 {
            return Err(CoreError::invalid_argument("batch size must be at least 1"));
        }
        if corpus.len() < batch_size {
            return Err(CoreError::invalid_argument(format!(
                "asset corpus has {} entries, need at least {batch_size}",
                corpus.len()
            )));
        }
        if let Some(short) = corpus
            .iter()
            .find(|asset| asset.chars().count() < mutation_count)
        {
            return Err(CoreError::invalid_argument(format!(
                "asset `{short}` is shorter than mutation count {mutation_count}"
            )));
        }

        Ok(Self {
            corpus,
            mutation_count,
            batch_size,
        })
    }

    /// Produces the next query batch.
    ///
    /// # Errors
    ///
    /// Only contract violations, which construction already rules out.
    pub fn next_batch<R: Rng + ?Sized>(&self, rng: &mut R) -> CoreResult<Vec<String>> {
        sample_k_and_mutate_with(rng, &self.corpus[..], self.batch_size, self.mutation_count)
    }

    /// Returns the asset corpus.
    #[must_use]
    pub fn corpus(&self) -> &[String] {
        &self.corpus
    }

    /// Returns the number of positions replaced per asset.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.mutation_count
    }

    /// Returns the number of queries per batch.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}
