use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Summary of one finished sieve run.
///
/// Built once by the aggregator after every worker has joined, then never
/// mutated. `elapsed` is the only field that varies between identical runs.
#[derive(Debug, Clone)]
pub struct SieveResult {
    pub prime_count: usize,
    pub prime_sum: u64,
    /// The highest primes found, ascending. At most `top_k` entries; fewer
    /// when the bound holds fewer primes than requested.
    pub last_primes: Vec<usize>,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum SieveError {
    /// Configuration rejected before any allocation or thread spawn.
    InvalidConfig(&'static str),
    /// The primality map could not be allocated for this bound.
    Allocation { bytes: usize },
}

impl fmt::Display for SieveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SieveError::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
            SieveError::Allocation { bytes } => write!(
                f,
                "could not allocate {} bytes for the primality map",
                bytes
            ),
        }
    }
}

impl std::error::Error for SieveError {}

/// Shared bit-packed primality map for 0..=bound.
///
/// - Memory: 1 bit per candidate (packed in u64 words)
/// - Bit i set means "i is unstruck / believed prime"
/// - Workers only ever clear bits (set -> clear), never set them
///
/// The words are atomic because multiple workers strike bits in the same
/// word concurrently; a plain `u64` shared at sub-word granularity would be
/// a data race. `fetch_and` with relaxed ordering is enough: the writes are
/// monotone and idempotent, and the only cross-thread ordering the run needs
/// is the join barrier before aggregation.
pub(crate) struct PrimalityMap {
    words: Vec<AtomicU64>,
    bound: usize,
}

impl PrimalityMap {
    /// Allocate the map for 0..=bound with every candidate bit set, then
    /// clear 0 and 1. Allocation failure is reported, not aborted on.
    fn new(bound: usize) -> Result<Self, SieveError> {
        let word_count = bound / 64 + 1;

        let mut words: Vec<AtomicU64> = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| SieveError::Allocation {
                bytes: word_count * std::mem::size_of::<u64>(),
            })?;
        words.resize_with(word_count, || AtomicU64::new(!0_u64));

        let map = PrimalityMap { words, bound };
        map.clear(0);
        map.clear(1);
        Ok(map)
    }

    /// Read bit idx. During the parallel phase this read may be stale with
    /// respect to another worker's strikes; callers must only use it as a
    /// skip optimization, never for anything correctness depends on.
    #[inline]
    pub(crate) fn is_set(&self, idx: usize) -> bool {
        let word_idx = idx / 64;
        let bit_idx = idx % 64;
        (self.words[word_idx].load(Ordering::Relaxed) & (1_u64 << bit_idx)) != 0
    }

    /// Clear bit idx (mark idx composite). Safe to call from any worker at
    /// any time: all writers agree on the final value.
    #[inline]
    fn clear(&self, idx: usize) {
        let word_idx = idx / 64;
        let bit_idx = idx % 64;
        self.words[word_idx].fetch_and(!(1_u64 << bit_idx), Ordering::Relaxed);
    }
}

/// Compute all primes up to `bound` and summarize them.
///
/// The result (excluding `elapsed`) is a pure function of `bound` and
/// `top_k`; `workers` affects performance only. Fails with `InvalidConfig`
/// for `bound < 2` or `workers == 0`, and with `Allocation` when the map
/// does not fit in memory.
pub fn compute_primes(
    bound: usize,
    workers: usize,
    top_k: usize,
) -> Result<SieveResult, SieveError> {
    if bound < 2 {
        return Err(SieveError::InvalidConfig("bound must be at least 2"));
    }
    if workers < 1 {
        return Err(SieveError::InvalidConfig("worker count must be at least 1"));
    }

    let start = Instant::now();

    let map = sieve_map(bound, workers)?;

    let (prime_count, prime_sum) = tally(&map);
    let last_primes = last_k_primes(&map, top_k);

    Ok(SieveResult {
        prime_count,
        prime_sum,
        last_primes,
        elapsed: start.elapsed(),
    })
}

/// Run the parallel phase: allocate the map and let `workers` threads
/// strike composites in place. Returns the finished, quiescent map.
///
/// Partitioning: worker w owns the seed candidates 2+w, 2+w+W, 2+w+2W, ...
/// up to sqrt(bound). Small seeds do far more striking work than large
/// ones, so splitting the seed range by residue class gives each worker a
/// similar mix of cheap and expensive seeds; a contiguous split would leave
/// the worker holding 2, 3, 5, ... doing nearly all the work.
///
/// Workers may strike overlapping sets of composites (12 is a multiple of
/// both 2 and 3, which can live on different workers). That overlap is
/// benign: every strike clears, never sets, so the end state is the same
/// regardless of interleaving. The `is_set` test on a seed is a best-effort
/// skip: when it reads a stale "still set" for a seed another worker has
/// already struck, this worker redundantly re-strikes multiples that are
/// already clear, which costs time but never correctness.
pub(crate) fn sieve_map(bound: usize, workers: usize) -> Result<PrimalityMap, SieveError> {
    let map = PrimalityMap::new(bound)?;
    let sqrt_bound = bound.isqrt();

    // Scope exit is the join barrier: aggregation happens-after every
    // worker's last strike.
    thread::scope(|scope| {
        for worker_id in 0..workers {
            let map = &map;

            scope.spawn(move || {
                for seed in ((2 + worker_id)..=sqrt_bound).step_by(workers) {
                    if map.is_set(seed) {
                        // Multiples below seed*seed already carry a smaller
                        // factor and were struck by its owner.
                        let mut j = seed * seed;
                        while j <= bound {
                            map.clear(j);
                            j += seed;
                        }
                    }
                }
            });
        }
    });

    Ok(map)
}

/// Forward scan: count every surviving candidate and sum them.
///
/// Word-by-word with trailing_zeros so runs of struck composites cost one
/// comparison per word. The sum for bound 10^8 tops out near 4x10^15,
/// comfortably inside u64.
fn tally(map: &PrimalityMap) -> (usize, u64) {
    let mut count = 0;
    let mut sum: u64 = 0;

    for word_idx in 0..map.words.len() {
        let mut word = map.words[word_idx].load(Ordering::Relaxed);

        while word != 0 {
            let bit_idx = word.trailing_zeros() as usize;
            let num = word_idx * 64 + bit_idx;

            if num > map.bound {
                break; // Padding bits past the bound in the top word
            }

            count += 1;
            sum += num as u64;

            word &= word - 1; // Clear the lowest set bit
        }
    }

    (count, sum)
}

/// Backward scan: collect the top_k highest surviving candidates, then
/// reverse into ascending order. Stops as soon as top_k are found, so for
/// the usual small top_k this touches a handful of words at the top of the
/// map. Fewer than top_k primes below the bound returns all of them.
fn last_k_primes(map: &PrimalityMap, top_k: usize) -> Vec<usize> {
    let mut found = Vec::with_capacity(top_k);
    if top_k == 0 {
        return found;
    }

    'words: for word_idx in (0..map.words.len()).rev() {
        let mut word = map.words[word_idx].load(Ordering::Relaxed);

        // Mask the padding bits past the bound in the top word
        if word_idx == map.words.len() - 1 {
            let top_bit = map.bound % 64;
            if top_bit < 63 {
                word &= (1_u64 << (top_bit + 1)) - 1;
            }
        }

        while word != 0 {
            let bit_idx = 63 - word.leading_zeros() as usize;
            found.push(word_idx * 64 + bit_idx);

            if found.len() == top_k {
                break 'words;
            }

            word &= !(1_u64 << bit_idx); // Clear the highest set bit
        }
    }

    found.reverse();
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Trusted single-threaded reference sieve (one bool per number).
    fn reference_sieve(limit: usize) -> Vec<bool> {
        let mut is_prime = vec![true; limit + 1];
        is_prime[0] = false;
        is_prime[1] = false;

        for i in 2..=limit.isqrt() {
            if is_prime[i] {
                let mut j = i * i;
                while j <= limit {
                    is_prime[j] = false;
                    j += i;
                }
            }
        }

        is_prime
    }

    #[test]
    fn map_matches_reference_for_every_worker_count() {
        for bound in [2, 3, 10, 64, 100, 499, 1000] {
            let reference = reference_sieve(bound);

            for workers in [1, 3, 8, 17] {
                let map = sieve_map(bound, workers).unwrap();

                for idx in 2..=bound {
                    assert_eq!(
                        map.is_set(idx),
                        reference[idx],
                        "bound={} workers={} idx={}",
                        bound,
                        workers,
                        idx
                    );
                }
            }
        }
    }

    #[test]
    fn known_counts_and_sums() {
        let result = compute_primes(100, 4, 10).unwrap();
        assert_eq!(result.prime_count, 25);
        assert_eq!(result.prime_sum, 1060);

        assert_eq!(compute_primes(1000, 4, 10).unwrap().prime_count, 168);
        assert_eq!(compute_primes(10000, 4, 10).unwrap().prime_count, 1229);
    }

    #[test]
    fn result_independent_of_worker_count() {
        let baseline = compute_primes(10000, 1, 10).unwrap();

        for workers in [8, 17] {
            let result = compute_primes(10000, workers, 10).unwrap();
            assert_eq!(result.prime_count, baseline.prime_count);
            assert_eq!(result.prime_sum, baseline.prime_sum);
            assert_eq!(result.last_primes, baseline.last_primes);
        }
    }

    #[test]
    fn repeated_runs_agree() {
        let first = compute_primes(5000, 6, 10).unwrap();
        let second = compute_primes(5000, 6, 10).unwrap();

        assert_eq!(first.prime_count, second.prime_count);
        assert_eq!(first.prime_sum, second.prime_sum);
        assert_eq!(first.last_primes, second.last_primes);
    }

    #[test]
    fn top_primes_ascending() {
        let result = compute_primes(100, 4, 5).unwrap();
        assert_eq!(result.last_primes, vec![73, 79, 83, 89, 97]);
    }

    #[test]
    fn top_k_beyond_prime_count_returns_all() {
        let result = compute_primes(10, 2, 10).unwrap();
        assert_eq!(result.prime_count, 4);
        assert_eq!(result.last_primes, vec![2, 3, 5, 7]);
    }

    #[test]
    fn top_k_zero_returns_none() {
        let result = compute_primes(100, 4, 0).unwrap();
        assert_eq!(result.prime_count, 25);
        assert!(result.last_primes.is_empty());
    }

    #[test]
    fn more_workers_than_seeds() {
        // sqrt(100) = 10, so only seeds 2..=10 exist; most workers idle.
        let result = compute_primes(100, 50, 10).unwrap();
        assert_eq!(result.prime_count, 25);
        assert_eq!(result.prime_sum, 1060);
    }

    #[test]
    fn smallest_valid_bound() {
        let result = compute_primes(2, 1, 10).unwrap();
        assert_eq!(result.prime_count, 1);
        assert_eq!(result.prime_sum, 2);
        assert_eq!(result.last_primes, vec![2]);
    }

    #[test]
    fn rejects_bound_below_two() {
        assert!(matches!(
            compute_primes(1, 4, 10),
            Err(SieveError::InvalidConfig(_))
        ));
        assert!(matches!(
            compute_primes(0, 4, 10),
            Err(SieveError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(matches!(
            compute_primes(100, 0, 10),
            Err(SieveError::InvalidConfig(_))
        ));
    }
}
