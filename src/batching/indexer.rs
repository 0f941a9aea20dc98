//! Splitting a length-sorted window into batch index ranges.

use std::ops::Range;

/// Consecutive chunks of `size` indices; the last chunk may be shorter.
pub fn batch_indexer(len: usize, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Greedy split under a cumulative budget.
///
/// `costs[i]` holds the per-dimension cost of sample `i` (estimated frames,
/// target length). A batch grows while the largest running sum stays within
/// `limit`. A sample that alone exceeds `limit` becomes a singleton batch.
pub fn token_indexer(costs: &[[usize; 2]], limit: usize) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut sums = [0usize; 2];

    for (i, cost) in costs.iter().enumerate() {
        let next = [sums[0] + cost[0], sums[1] + cost[1]];
        if next[0].max(next[1]) <= limit {
            sums = next;
            continue;
        }
        if i > start {
            batches.push(start..i);
            start = i;
        }
        if cost[0].max(cost[1]) > limit {
            batches.push(i..i + 1);
            start = i + 1;
            sums = [0, 0];
        } else {
            sums = *cost;
        }
    }
    if start < costs.len() {
        batches.push(start..costs.len());
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_indexer_chunks() {
        assert_eq!(batch_indexer(7, 3), vec![0..3, 3..6, 6..7]);
        assert_eq!(batch_indexer(6, 3), vec![0..3, 3..6]);
        assert!(batch_indexer(0, 3).is_empty());
    }

    #[test]
    fn test_token_indexer_respects_limit() {
        let costs = [[2, 1], [3, 2], [4, 4], [5, 1], [6, 6]];
        let batches = token_indexer(&costs, 10);
        assert_eq!(batches, vec![0..3, 3..4, 4..5]);
    }

    #[test]
    fn test_token_indexer_uses_larger_dimension() {
        // frames stay small, target lengths decide
        let costs = [[1, 6], [1, 6], [1, 6]];
        assert_eq!(token_indexer(&costs, 12), vec![0..2, 2..3]);
    }

    #[test]
    fn test_token_indexer_oversized_singleton() {
        let costs = [[2, 2], [50, 3], [2, 2], [2, 2]];
        let batches = token_indexer(&costs, 10);
        assert_eq!(batches, vec![0..1, 1..2, 2..4]);
    }

    #[test]
    fn test_token_indexer_exact_fit() {
        let costs = [[5, 0], [5, 0], [5, 0]];
        assert_eq!(token_indexer(&costs, 10), vec![0..2, 2..3]);
    }

    #[test]
    fn test_token_indexer_covers_every_index_once() {
        let costs: Vec<[usize; 2]> = (0..40).map(|i| [i % 7 + 1, (i * 3) % 11]).collect();
        let batches = token_indexer(&costs, 12);
        let flat: Vec<usize> = batches.iter().cloned().flatten().collect();
        assert_eq!(flat, (0..40).collect::<Vec<_>>());
        for range in batches.iter().filter(|r| r.len() > 1) {
            let frames: usize = costs[range.clone()].iter().map(|c| c[0]).sum();
            let text: usize = costs[range.clone()].iter().map(|c| c[1]).sum();
            assert!(frames.max(text) <= 12);
        }
    }
}
