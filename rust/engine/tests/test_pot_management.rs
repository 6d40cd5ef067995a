use std::collections::BTreeSet;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use shortdeck_engine::player::PlayerId;
use shortdeck_engine::pot::compute_side_pots;

fn players(n: usize) -> Vec<PlayerId> {
    (0..n).map(|i| PlayerId::new(format!("p{i}"))).collect()
}

#[test]
fn ascending_all_ins_make_one_layer_per_level() {
    let ids = players(5);
    let levels = [50u64, 120, 300, 700, 1000];
    let commitments: Vec<(PlayerId, u64)> = ids.iter().cloned().zip(levels).collect();

    let pots = compute_side_pots(&commitments, &BTreeSet::new());

    assert_eq!(pots.len(), levels.len());
    assert_eq!(pots.iter().map(|p| p.amount).sum::<u64>(), levels.iter().sum::<u64>());
    let mut prev = 0;
    for (i, pot) in pots.iter().enumerate() {
        assert_eq!(pot.amount, (levels[i] - prev) * (levels.len() - i) as u64);
        assert_eq!(pot.eligible, ids[i..].to_vec());
        prev = levels[i];
    }
}

#[test]
fn random_commitments_conserve_chips_with_nested_eligibility() {
    let mut rng = ChaCha20Rng::seed_from_u64(2024);
    for _ in 0..500 {
        let n = rng.random_range(2..=10);
        let ids = players(n);
        let commitments: Vec<(PlayerId, u64)> = ids
            .iter()
            .map(|id| (id.clone(), rng.random_range(1..=1000)))
            .collect();
        let mut folded: BTreeSet<PlayerId> = ids
            .iter()
            .filter(|_| rng.random_bool(0.3))
            .cloned()
            .collect();
        if folded.len() == n {
            folded.remove(&ids[0]);
        }

        let pots = compute_side_pots(&commitments, &folded);
        let total: u64 = commitments.iter().map(|(_, c)| c).sum();
        assert_eq!(pots.iter().map(|p| p.amount).sum::<u64>(), total);

        for pot in &pots {
            assert!(!pot.eligible.is_empty());
            assert!(pot.eligible.iter().all(|id| !folded.contains(id)));
        }
        for pair in pots.windows(2) {
            assert!(pair[1].eligible.iter().all(|id| pair[0].eligible.contains(id)));
            assert!(pair[1].eligible.len() < pair[0].eligible.len());
        }
    }
}

#[test]
fn contribution_order_does_not_change_layers() {
    let a = PlayerId::new("a");
    let b = PlayerId::new("b");
    let c = PlayerId::new("c");
    let forward = compute_side_pots(
        &[(a.clone(), 500), (b.clone(), 1000), (c.clone(), 200)],
        &BTreeSet::new(),
    );
    let backward = compute_side_pots(&[(c, 200), (b, 1000), (a, 500)], &BTreeSet::new());

    let amounts = |pots: &[shortdeck_engine::pot::SidePot]| -> Vec<u64> {
        pots.iter().map(|p| p.amount).collect()
    };
    assert_eq!(amounts(&forward), vec![600, 600, 500]);
    assert_eq!(amounts(&forward), amounts(&backward));
}
