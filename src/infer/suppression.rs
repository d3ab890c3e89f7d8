//! Greedy non-maximum suppression, optionally averaging each cluster.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{DecodedBox, ScoredBox, intersection_over_union};

/// What each cluster of overlapping candidates collapses to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuppressionMode {
    /// Keep the highest-confidence box verbatim.
    #[default]
    TopBox,
    /// Confidence-weighted mean of the seed and every box it suppressed.
    WeightedAverage,
}

impl SuppressionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressionMode::TopBox => "top-box",
            SuppressionMode::WeightedAverage => "weighted-average",
        }
    }
}

impl fmt::Display for SuppressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuppressionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top-box" | "top_box" | "top" => Ok(SuppressionMode::TopBox),
            "weighted-average" | "weighted_average" | "average" => Ok(SuppressionMode::WeightedAverage),
            other => Err(format!("unknown suppression mode {other:?}")),
        }
    }
}

/// One selected box and how many candidates (itself included) it absorbed.
///
/// `representative.anchor` and `representative.confidence` are the seed's, so
/// an averaged box can be traced back to the anchor that won the cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    pub representative: ScoredBox,
    pub members: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SuppressionEngine {
    iou_threshold: f32,
    mode: SuppressionMode,
}

impl SuppressionEngine {
    /// `iou_threshold` must lie in `(0, 1]`.
    pub fn new(iou_threshold: f32, mode: SuppressionMode) -> Self {
        assert!(
            iou_threshold > 0.0 && iou_threshold <= 1.0,
            "iou threshold {iou_threshold} outside (0, 1]"
        );
        Self { iou_threshold, mode }
    }

    pub fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }

    pub fn mode(&self) -> SuppressionMode {
        self.mode
    }

    /// Survivors in selection order: confidence descending, ties by anchor.
    pub fn suppress(&self, candidates: Vec<ScoredBox>) -> Vec<ScoredBox> {
        self.clusters(candidates).into_iter().map(|c| c.representative).collect()
    }

    pub fn clusters(&self, candidates: Vec<ScoredBox>) -> Vec<Cluster> {
        let total = candidates.len();
        let mut pool: Vec<ScoredBox> = candidates.into_iter().filter(|c| !c.bounds.is_degenerate()).collect();
        let degenerate = total - pool.len();
        // Worst first, so `pop` yields the next seed.
        pool.sort_by(|a, b| selection_order(b, a));

        let threshold = self.iou_threshold;
        let mut clusters: Vec<Cluster> = Vec::new();
        let mut members: Vec<ScoredBox> = Vec::new();
        while let Some(seed) = pool.pop() {
            members.clear();
            members.push(seed);
            pool.retain(|other| {
                if intersection_over_union(&seed.bounds, &other.bounds) >= threshold {
                    members.push(*other);
                    false
                } else {
                    true
                }
            });
            let representative = match self.mode {
                SuppressionMode::TopBox => seed,
                SuppressionMode::WeightedAverage => weighted_mean(&members),
            };
            clusters.push(Cluster { representative, members: members.len() });
        }
        if self.mode == SuppressionMode::WeightedAverage {
            clusters = self.absorb_overlapping(clusters);
        }
        trace!(candidates = total, degenerate, survivors = clusters.len(), "suppression pass");
        clusters
    }
}

impl SuppressionEngine {
    /// Averaging moves a representative toward the boxes it absorbed, so it can
    /// end up overlapping a later cluster. `clusters` is in selection order; a
    /// cluster whose representative overlaps an earlier one is folded into it.
    fn absorb_overlapping(&self, clusters: Vec<Cluster>) -> Vec<Cluster> {
        let mut kept: Vec<Cluster> = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let earlier = kept.iter_mut().find(|k| {
                intersection_over_union(&k.representative.bounds, &cluster.representative.bounds) >= self.iou_threshold
            });
            match earlier {
                Some(k) => k.members += cluster.members,
                None => kept.push(cluster),
            }
        }
        kept
    }
}

fn selection_order(a: &ScoredBox, b: &ScoredBox) -> Ordering {
    b.confidence.total_cmp(&a.confidence).then_with(|| a.anchor.cmp(&b.anchor))
}

/// `members[0]` is the seed; its anchor and confidence label the result.
fn weighted_mean(members: &[ScoredBox]) -> ScoredBox {
    let seed = members[0];
    if members.len() == 1 {
        return seed;
    }
    let mut acc = DecodedBox::new(0.0, 0.0, 0.0, 0.0);
    let mut divisor = 0.0f32;
    for m in members {
        let factor = m.confidence;
        divisor += factor;
        acc.center_x += m.bounds.center_x * factor;
        acc.center_y += m.bounds.center_y * factor;
        acc.width += m.bounds.width * factor;
        acc.height += m.bounds.height * factor;
    }
    if !(divisor > 0.0 && divisor.is_finite()) {
        return seed;
    }
    let bounds = DecodedBox::new(acc.center_x / divisor, acc.center_y / divisor, acc.width / divisor, acc.height / divisor);
    ScoredBox { anchor: seed.anchor, bounds, confidence: seed.confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(anchor: usize, cx: f32, cy: f32, size: f32, confidence: f32) -> ScoredBox {
        ScoredBox { anchor, bounds: DecodedBox::new(cx, cy, size, size), confidence }
    }

    fn anchors(boxes: &[ScoredBox]) -> Vec<usize> {
        boxes.iter().map(|b| b.anchor).collect()
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let engine = SuppressionEngine::new(0.4, SuppressionMode::TopBox);
        assert!(engine.suppress(Vec::new()).is_empty());
    }

    #[test]
    fn overlapping_pair_keeps_higher_confidence() {
        let engine = SuppressionEngine::new(0.4, SuppressionMode::TopBox);
        let out = engine.suppress(vec![scored(0, 0.52, 0.5, 0.2, 0.8), scored(1, 0.5, 0.5, 0.2, 0.9)]);
        assert_eq!(anchors(&out), vec![1]);
    }

    #[test]
    fn disjoint_boxes_all_survive_in_confidence_order() {
        let engine = SuppressionEngine::new(0.4, SuppressionMode::TopBox);
        let out = engine.suppress(vec![
            scored(0, 0.1, 0.1, 0.1, 0.6),
            scored(1, 0.5, 0.5, 0.1, 0.9),
            scored(2, 0.9, 0.9, 0.1, 0.7),
        ]);
        assert_eq!(anchors(&out), vec![1, 2, 0]);
    }

    #[test]
    fn confidence_ties_break_by_anchor_index() {
        let engine = SuppressionEngine::new(0.4, SuppressionMode::TopBox);
        let out = engine.suppress(vec![scored(5, 0.5, 0.5, 0.2, 0.9), scored(2, 0.51, 0.5, 0.2, 0.9)]);
        assert_eq!(anchors(&out), vec![2]);

        let apart = engine.suppress(vec![scored(7, 0.1, 0.1, 0.1, 0.9), scored(3, 0.9, 0.9, 0.1, 0.9)]);
        assert_eq!(anchors(&apart), vec![3, 7]);
    }

    #[test]
    fn removal_is_relative_to_the_seed_only() {
        // 0 removes 1; 2 overlaps 1 but barely touches 0, so it survives.
        let engine = SuppressionEngine::new(0.3, SuppressionMode::TopBox);
        let out = engine.suppress(vec![
            scored(0, 0.30, 0.5, 0.2, 0.9),
            scored(1, 0.38, 0.5, 0.2, 0.8),
            scored(2, 0.46, 0.5, 0.2, 0.7),
        ]);
        assert_eq!(anchors(&out), vec![0, 2]);
    }

    #[test]
    fn degenerate_boxes_never_survive_or_suppress() {
        let engine = SuppressionEngine::new(0.3, SuppressionMode::TopBox);
        let out = engine.suppress(vec![
            ScoredBox { anchor: 0, bounds: DecodedBox::new(0.5, 0.5, 0.0, 0.2), confidence: 0.99 },
            ScoredBox { anchor: 1, bounds: DecodedBox::new(0.5, 0.5, 0.2, 0.0), confidence: 0.98 },
            scored(2, 0.5, 0.5, 0.2, 0.6),
        ]);
        assert_eq!(anchors(&out), vec![2]);

        let lonely = engine.suppress(vec![ScoredBox {
            anchor: 0,
            bounds: DecodedBox::new(0.1, 0.1, 0.0, 0.0),
            confidence: 0.9,
        }]);
        assert!(lonely.is_empty());
    }

    #[test]
    fn weighted_average_blends_cluster_geometry() {
        let engine = SuppressionEngine::new(0.4, SuppressionMode::WeightedAverage);
        let clusters = engine.clusters(vec![
            ScoredBox { anchor: 0, bounds: DecodedBox::new(0.50, 0.50, 0.20, 0.20), confidence: 0.75 },
            ScoredBox { anchor: 1, bounds: DecodedBox::new(0.54, 0.50, 0.24, 0.20), confidence: 0.25 },
            scored(2, 0.1, 0.1, 0.05, 0.6),
        ]);
        assert_eq!(clusters.len(), 2);
        let first = clusters[0];
        assert_eq!(first.members, 2);
        assert_eq!(first.representative.anchor, 0);
        assert_eq!(first.representative.confidence, 0.75);
        let b = first.representative.bounds;
        assert!((b.center_x - 0.51).abs() < 1e-6);
        assert!((b.center_y - 0.50).abs() < 1e-6);
        assert!((b.width - 0.21).abs() < 1e-6);
        assert!((b.height - 0.20).abs() < 1e-6);
        assert_eq!(clusters[1].members, 1);
        assert_eq!(clusters[1].representative, scored(2, 0.1, 0.1, 0.05, 0.6));
    }

    #[test]
    fn averaged_representatives_keep_clear_of_each_other() {
        // 0 absorbs 1; the blend drifts right and now overlaps 2.
        let engine = SuppressionEngine::new(0.3, SuppressionMode::WeightedAverage);
        let input = vec![
            scored(0, 0.50, 0.5, 0.2, 0.9),
            scored(1, 0.56, 0.5, 0.2, 0.89),
            scored(2, 0.62, 0.5, 0.2, 0.5),
        ];
        let clusters = engine.clusters(input.clone());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, 3);
        assert_eq!(clusters[0].representative.anchor, 0);

        let out = engine.suppress(input);
        assert_eq!(engine.suppress(out.clone()), out);
    }

    #[test]
    fn top_box_mode_reports_cluster_sizes() {
        let engine = SuppressionEngine::new(0.4, SuppressionMode::TopBox);
        let clusters = engine.clusters(vec![
            scored(0, 0.5, 0.5, 0.2, 0.9),
            scored(1, 0.51, 0.5, 0.2, 0.8),
            scored(2, 0.49, 0.5, 0.2, 0.7),
        ]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, 3);
        assert_eq!(clusters[0].representative.bounds, DecodedBox::new(0.5, 0.5, 0.2, 0.2));
    }

    #[test]
    fn mode_parses_from_config_strings() {
        assert_eq!("top-box".parse::<SuppressionMode>(), Ok(SuppressionMode::TopBox));
        assert_eq!("Weighted_Average".parse::<SuppressionMode>(), Ok(SuppressionMode::WeightedAverage));
        assert!("median".parse::<SuppressionMode>().is_err());
        assert_eq!(SuppressionMode::WeightedAverage.to_string(), "weighted-average");
    }

    #[test]
    #[should_panic(expected = "outside (0, 1]")]
    fn zero_iou_threshold_is_rejected() {
        SuppressionEngine::new(0.0, SuppressionMode::TopBox);
    }
}
