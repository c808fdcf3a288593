//! Weighted, non-repeating template selection.
//!
//! Backed rows are sampled without replacement by keying each candidate with
//! `random() * weight` and taking the largest keys. When the backing pool
//! is unreachable or has nothing eligible, selection falls back to the
//! built-in pool in [`crate::pool`]. Every call draws afresh and never
//! returns the same fragment twice; running out of unique fragments just
//! yields a shorter list.

use std::collections::HashSet;

use rand::Rng;

use crate::backend::StateBackend;
use crate::constants::POOL_QUERY_LIMIT;
use crate::pool::{PoolEntry, PoolQuery, fallback_weights};
use crate::time::TimeOfDay;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionCriteria {
    pub time_of_day: TimeOfDay,
    /// The driving value (entropy for micro-events).
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Pool,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub fragments: Vec<String>,
    pub source: SelectionSource,
}

pub fn select(
    backend: &dyn StateBackend,
    criteria: &SelectionCriteria,
    count: usize,
    rng: &mut impl Rng,
) -> Selection {
    let query = PoolQuery {
        time_of_day: criteria.time_of_day,
        value: criteria.value,
        limit: POOL_QUERY_LIMIT,
    };

    let rows = match backend.query_pool(&query) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::debug!("content pool unavailable, using fallback: {e}");
            Vec::new()
        }
    };

    let eligible: Vec<PoolEntry> = rows
        .into_iter()
        .filter(|r| r.eligible(criteria.time_of_day, criteria.value))
        .collect();

    if eligible.is_empty() {
        return Selection {
            fragments: select_fallback(criteria.value, count, rng),
            source: SelectionSource::Fallback,
        };
    }

    Selection {
        fragments: sample_weighted(&eligible, count, rng),
        source: SelectionSource::Pool,
    }
}

/// Weighted sampling without replacement over backed rows.
pub fn sample_weighted(rows: &[PoolEntry], count: usize, rng: &mut impl Rng) -> Vec<String> {
    let mut keyed: Vec<(f64, &PoolEntry)> = rows
        .iter()
        .map(|r| (rng.random::<f64>() * r.weight, r))
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut seen: HashSet<&str> = HashSet::new();
    keyed
        .into_iter()
        .filter(|&(_, r)| seen.insert(r.template.as_str()))
        .take(count)
        .map(|(_, r)| r.template.clone())
        .collect()
}

/// Draw from the built-in pool. Categories are picked in proportion to their
/// unlock multiplier, fragments uniformly within a category.
pub fn select_fallback(value: f64, count: usize, rng: &mut impl Rng) -> Vec<String> {
    let mut pools: Vec<(u32, Vec<&'static str>)> = fallback_weights(value)
        .into_iter()
        .map(|(cat, weight)| (weight, cat.fragments.to_vec()))
        .collect();

    let mut seen: HashSet<&'static str> = HashSet::new();
    let mut out = Vec::with_capacity(count);

    while out.len() < count {
        pools.retain(|(_, frags)| !frags.is_empty());
        let total: u32 = pools.iter().map(|(w, _)| *w).sum();
        if total == 0 {
            break;
        }

        let mut pick = rng.random_range(0..total);
        let mut chosen = 0;
        for (i, (weight, _)) in pools.iter().enumerate() {
            if pick < *weight {
                chosen = i;
                break;
            }
            pick -= *weight;
        }

        let frags = &mut pools[chosen].1;
        let fragment = frags.swap_remove(rng.random_range(0..frags.len()));
        if seen.insert(fragment) {
            out.push(fragment.to_string());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::backend::test_support::DownBackend;
    use crate::pool::{FALLBACK_POOL, TimeScope};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    fn entry(template: &str, weight: f64) -> PoolEntry {
        PoolEntry {
            category: "ambient".into(),
            time_scope: TimeScope::Any,
            min_value: 0.0,
            max_value: 1.0,
            weight,
            template: template.into(),
        }
    }

    fn criteria(value: f64) -> SelectionCriteria {
        SelectionCriteria {
            time_of_day: TimeOfDay::DeepNight,
            value,
        }
    }

    #[test]
    fn test_pool_selection_respects_count_and_uniqueness() {
        let backend = MemoryBackend::with_pool(vec![
            entry("one", 1.0),
            entry("two", 2.0),
            entry("three", 3.0),
            entry("three", 3.0),
            entry("four", 0.5),
        ]);
        let mut rng = rng();
        for k in 0..6 {
            let sel = select(&backend, &criteria(0.2), k, &mut rng);
            assert_eq!(sel.source, SelectionSource::Pool);
            assert!(sel.fragments.len() <= k);
            let unique: HashSet<&String> = sel.fragments.iter().collect();
            assert_eq!(unique.len(), sel.fragments.len());
        }
    }

    #[test]
    fn test_pool_runs_out_returns_shorter() {
        let backend = MemoryBackend::with_pool(vec![entry("only", 1.0), entry("only", 5.0)]);
        let sel = select(&backend, &criteria(0.2), 3, &mut rng());
        assert_eq!(sel.fragments, vec!["only".to_string()]);
    }

    #[test]
    fn test_heavier_rows_win_more_often() {
        let rows = vec![entry("heavy", 50.0), entry("light", 1.0)];
        let mut rng = rng();
        let heavy_first = (0..500)
            .filter(|_| sample_weighted(&rows, 1, &mut rng)[0] == "heavy")
            .count();
        assert!(heavy_first > 400, "heavy won only {heavy_first}/500");
    }

    #[test]
    fn test_unreachable_pool_falls_back() {
        let sel = select(&DownBackend, &criteria(0.0), 2, &mut rng());
        assert_eq!(sel.source, SelectionSource::Fallback);
        assert_eq!(sel.fragments.len(), 2);
    }

    #[test]
    fn test_empty_pool_falls_back() {
        let backend = MemoryBackend::new();
        let sel = select(&backend, &criteria(0.85), 3, &mut rng());
        assert_eq!(sel.source, SelectionSource::Fallback);
        assert_eq!(sel.fragments.len(), 3);
    }

    #[test]
    fn test_fallback_never_repeats_and_exhausts() {
        let unlocked: usize = FALLBACK_POOL.iter().map(|c| c.fragments.len()).sum();
        let frags = select_fallback(1.0, 100, &mut rng());
        assert_eq!(frags.len(), unlocked);
        let unique: HashSet<&String> = frags.iter().collect();
        assert_eq!(unique.len(), frags.len());
    }

    #[test]
    fn test_fallback_calm_excludes_locked_categories() {
        let decay: HashSet<&str> = FALLBACK_POOL
            .iter()
            .filter(|c| c.label == "decay" || c.label == "temporal")
            .flat_map(|c| c.fragments.iter().copied())
            .collect();
        let mut rng = rng();
        for _ in 0..50 {
            for f in select_fallback(0.0, 2, &mut rng) {
                assert!(!decay.contains(f.as_str()), "locked fragment drawn: {f}");
            }
        }
    }

    #[test]
    fn test_fragmenting_draws_decay_twice_as_often() {
        let category_of = |fragment: &str| {
            FALLBACK_POOL
                .iter()
                .find(|c| c.fragments.iter().any(|f| *f == fragment))
                .map(|c| c.label)
                .unwrap()
        };
        let mut rng = rng();
        let mut decay = 0;
        let mut ambient = 0;
        for _ in 0..5000 {
            let drawn = select_fallback(0.85, 1, &mut rng);
            match category_of(&drawn[0]) {
                "decay" => decay += 1,
                "ambient" => ambient += 1,
                _ => {}
            }
        }
        let ratio = decay as f64 / ambient as f64;
        assert!((1.6..=2.4).contains(&ratio), "decay/ambient ratio {ratio}");
    }

    #[test]
    fn test_repeated_calls_redraw() {
        let backend = MemoryBackend::new();
        let mut rng = rng();
        let draws: HashSet<Vec<String>> = (0..20)
            .map(|_| select(&backend, &criteria(0.85), 3, &mut rng).fragments)
            .collect();
        assert!(draws.len() > 1);
    }
}
