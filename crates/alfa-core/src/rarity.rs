//! Percentile rarity tiers.

use crate::scoring::asset_score;
use crate::{Asset, Rarity};

/// Tier for a 1-based `rank` out of `count`, using inclusive percentile bounds
/// 2 / 10 / 25 / 50. Rank 1 is always LEGENDARY.
pub fn rarity_for_rank(rank: usize, count: usize) -> Rarity {
    if rank <= 1 {
        return Rarity::Legendary;
    }
    // percentile = rank / count * 100, compared without floating point
    let scaled = rank.saturating_mul(100);
    if scaled <= count.saturating_mul(2) {
        Rarity::Legendary
    } else if scaled <= count.saturating_mul(10) {
        Rarity::Epic
    } else if scaled <= count.saturating_mul(25) {
        Rarity::Rare
    } else if scaled <= count.saturating_mul(50) {
        Rarity::Uncommon
    } else {
        Rarity::Common
    }
}

/// Reassigns `current_rarity` by score rank. Output keeps input order; ties rank in input order.
pub fn classify_rarity(assets: &[Asset]) -> Vec<Asset> {
    let count = assets.len();
    if count == 0 {
        return Vec::new();
    }

    let scores: Vec<f64> = assets.iter().map(asset_score).collect();
    let mut order: Vec<usize> = (0..count).collect();
    order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));

    let mut ranks = vec![0usize; count];
    for (position, index) in order.into_iter().enumerate() {
        ranks[index] = position + 1;
    }

    assets
        .iter()
        .zip(ranks)
        .map(|(asset, rank)| Asset {
            current_rarity: rarity_for_rank(rank, count),
            ..asset.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{asset, now, pin};
    use crate::LifecycleStage;

    fn ranked(n: usize) -> Vec<Asset> {
        (0..n)
            .map(|i| {
                asset(
                    &format!("SKU-{i:05}"),
                    LifecycleStage::Incubation,
                    now(),
                    vec![pin(&format!("P{i}"), 0, i as u64, 0)],
                )
            })
            .collect()
    }

    #[test]
    fn empty_catalog_yields_empty() {
        assert!(classify_rarity(&[]).is_empty());
    }

    #[test]
    fn single_asset_is_legendary() {
        let out = classify_rarity(&ranked(1));
        assert_eq!(out[0].current_rarity, Rarity::Legendary);
    }

    #[test]
    fn top_asset_is_legendary_even_in_small_catalogs() {
        let out = classify_rarity(&ranked(10));
        // highest clicks is the last element
        assert_eq!(out[9].current_rarity, Rarity::Legendary);
        assert_eq!(out[8].current_rarity, Rarity::Rare);
        let legendary = out.iter().filter(|a| a.current_rarity == Rarity::Legendary).count();
        assert_eq!(legendary, 1);
    }

    #[test]
    fn hundred_assets_follow_percentile_bands() {
        let out = classify_rarity(&ranked(100));
        let count = |r: Rarity| out.iter().filter(|a| a.current_rarity == r).count();
        assert_eq!(count(Rarity::Legendary), 2);
        assert_eq!(count(Rarity::Epic), 8);
        assert_eq!(count(Rarity::Rare), 15);
        assert_eq!(count(Rarity::Uncommon), 25);
        assert_eq!(count(Rarity::Common), 50);
    }

    #[test]
    fn legendary_never_exceeds_two_percent_ceiling() {
        for n in 1..=250usize {
            let out = classify_rarity(&ranked(n));
            let legendary = out.iter().filter(|a| a.current_rarity == Rarity::Legendary).count();
            let ceiling = (n * 2).div_ceil(100);
            assert!(legendary <= ceiling.max(1), "n={n} legendary={legendary}");
        }
    }

    #[test]
    fn ties_rank_in_input_order() {
        let tied: Vec<Asset> = (0..4)
            .map(|i| asset(&format!("SKU-{i}"), LifecycleStage::Incubation, now(), vec![]))
            .collect();
        let out = classify_rarity(&tied);
        assert_eq!(out[0].current_rarity, Rarity::Legendary);
        assert_eq!(out[1].current_rarity, Rarity::Uncommon);
        assert_eq!(out[2].current_rarity, Rarity::Common);
    }

    #[test]
    fn input_order_is_preserved() {
        let input = ranked(5);
        let out = classify_rarity(&input);
        let in_skus: Vec<_> = input.iter().map(|a| &a.sku_id).collect();
        let out_skus: Vec<_> = out.iter().map(|a| &a.sku_id).collect();
        assert_eq!(in_skus, out_skus);
    }
}
