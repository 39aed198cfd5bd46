// Unit tests for recommendation scoring and the confidence filter.
//
// Tests isolated pure functions: calculate_scores against a hand-built
// similarity matrix (the five-channel scenario), reasons ordering, the
// ordering law over similarity strength, and confident_candidates fallback.

use std::collections::BTreeMap;

use affinity::db::models::{ChannelId, ChannelPair, Similarity, Stars};
use affinity::recommend::filter::confident_candidates;
use affinity::recommend::scorer::{calculate_scores, NEUTRAL_RATING};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn sim(a: ChannelId, b: ChannelId, score: f64) -> Similarity {
    Similarity {
        pair: ChannelPair::new(a, b).unwrap(),
        score,
    }
}

fn rated(pairs: &[(ChannelId, u8)]) -> BTreeMap<ChannelId, Stars> {
    pairs
        .iter()
        .map(|&(id, s)| (id, Stars::new(s).unwrap()))
        .collect()
}

fn five_channel_matrix() -> Vec<Similarity> {
    vec![
        sim(0, 1, 0.5),
        sim(0, 2, -0.5),
        sim(0, 3, 0.6),
        sim(1, 4, -0.1),
        sim(2, 4, 0.9),
        sim(3, 4, 0.2),
    ]
}

// ============================================================
// Five-channel scenario
// ============================================================

#[test]
fn five_channel_predicted_scores() {
    let scored = calculate_scores(&five_channel_matrix(), &rated(&[(0, 5), (4, 3)]));

    assert_eq!(scored.scores.len(), 3);
    assert!(close(
        scored.scores[&1],
        ((2.5 * 0.5 + 0.5 * -0.1) / 0.6) + 2.5
    ));
    assert!(close(
        scored.scores[&2],
        ((2.5 * -0.5 + 0.5 * 0.9) / 1.4) + 2.5
    ));
    assert!(close(
        scored.scores[&3],
        ((2.5 * 0.6 + 0.5 * 0.2) / 0.8) + 2.5
    ));
}

#[test]
fn five_channel_rated_channels_not_predicted() {
    let scored = calculate_scores(&five_channel_matrix(), &rated(&[(0, 5), (4, 3)]));
    assert!(!scored.scores.contains_key(&0));
    assert!(!scored.scores.contains_key(&4));
}

#[test]
fn five_channel_reasons_ascending() {
    let scored = calculate_scores(&five_channel_matrix(), &rated(&[(0, 5), (4, 3)]));
    let reasons = &scored.reasons[&1];
    let ids: Vec<ChannelId> = reasons.iter().map(|r| r.channel_id).collect();
    assert_eq!(ids, vec![4, 0]);
    assert!(close(reasons[0].score, -0.05));
    assert!(close(reasons[1].score, 1.25));
}

#[test]
fn five_channel_contribution_counts() {
    let scored = calculate_scores(&five_channel_matrix(), &rated(&[(0, 5), (4, 3)]));
    for id in [1, 2, 3] {
        assert_eq!(scored.num_scores[&id], 2);
    }
}

// ============================================================
// Ordering and edge cases
// ============================================================

#[test]
fn stronger_similarity_predicts_higher() {
    // Channels 2 and 3 share the disliked neighbour equally, but 2 is closer
    // to the liked channel.
    let sims = [sim(1, 2, 0.8), sim(1, 3, 0.4), sim(5, 2, 0.3), sim(5, 3, 0.3)];
    let scored = calculate_scores(&sims, &rated(&[(1, 5), (5, 1)]));
    assert!(scored.scores[&2] > scored.scores[&3]);
}

#[test]
fn negative_similarity_to_liked_channel_predicts_low() {
    let scored = calculate_scores(&[sim(1, 2, -0.7)], &rated(&[(1, 5)]));
    assert!(close(scored.scores[&2], 0.0));
}

#[test]
fn neutral_rating_predicts_midpoint() {
    let scored = calculate_scores(&[sim(1, 2, 0.9)], &rated(&[(1, 3)]));
    assert!(scored.scores[&2] > NEUTRAL_RATING);
    assert!(close(scored.scores[&2], 3.0));
}

#[test]
fn no_ratings_no_scores() {
    let scored = calculate_scores(&five_channel_matrix(), &BTreeMap::new());
    assert!(scored.scores.is_empty());
    assert!(scored.reasons.is_empty());
}

#[test]
fn unrelated_rows_are_ignored() {
    let scored = calculate_scores(&[sim(7, 8, 0.9)], &rated(&[(1, 5)]));
    assert!(scored.scores.is_empty());
}

// ============================================================
// Confidence filter
// ============================================================

#[test]
fn confidence_filter_falls_back_when_nothing_confident() {
    let scored = calculate_scores(&five_channel_matrix(), &rated(&[(0, 5), (4, 3)]));
    assert_eq!(confident_candidates(&scored), vec![1, 2, 3]);
}

#[test]
fn confidence_filter_needs_four_contributions() {
    // Channel 9 is a neighbour of four rated channels, channel 8 of one.
    let sims = [
        sim(1, 9, 0.5),
        sim(2, 9, 0.5),
        sim(3, 9, 0.5),
        sim(4, 9, 0.5),
        sim(1, 8, 0.5),
    ];
    let scored = calculate_scores(&sims, &rated(&[(1, 4), (2, 4), (3, 4), (4, 4)]));
    assert_eq!(scored.num_scores[&9], 4);
    assert_eq!(confident_candidates(&scored), vec![9]);
}
