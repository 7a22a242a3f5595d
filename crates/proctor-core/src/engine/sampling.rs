use crate::config::SamplingPolicy;
use crate::model::Report;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Picks the reports to face-match out of one student's snapshots for an
/// activity. The selection comes back in id order.
pub fn sample(mut reports: Vec<Report>, policy: SamplingPolicy, rng: &mut StdRng) -> Vec<Report> {
    let mut picked = match policy {
        SamplingPolicy::All => reports,
        SamplingPolicy::Random(n) => {
            if reports.len() > n {
                reports.shuffle(rng);
                reports.truncate(n);
            }
            reports
        }
        SamplingPolicy::MostRecent(n) => {
            reports.sort_by(|a, b| (b.timemodified, b.id).cmp(&(a.timemodified, a.id)));
            reports.truncate(n);
            reports
        }
    };
    picked.sort_by_key(|r| r.id);
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MatchFlag;

    fn reports(n: i64) -> Vec<Report> {
        (1..=n)
            .map(|id| Report {
                id,
                courseid: 1,
                cmid: 2,
                userid: 3,
                snapshot_reference: format!("snap-{}.png", id),
                match_score: None,
                match_flag: MatchFlag::Unscored,
                timemodified: 1_000 + id,
            })
            .collect()
    }

    #[test]
    fn all_keeps_everything() {
        let mut rng = rng_for(Some(1));
        assert_eq!(sample(reports(7), SamplingPolicy::All, &mut rng).len(), 7);
    }

    #[test]
    fn random_takes_n_distinct_in_id_order() {
        let mut rng = rng_for(Some(42));
        let picked = sample(reports(10), SamplingPolicy::Random(3), &mut rng);
        assert_eq!(picked.len(), 3);
        assert!(picked.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn random_is_reproducible_with_seed() {
        let a = sample(reports(20), SamplingPolicy::Random(4), &mut rng_for(Some(7)));
        let b = sample(reports(20), SamplingPolicy::Random(4), &mut rng_for(Some(7)));
        assert_eq!(a, b);
    }

    #[test]
    fn most_recent_prefers_newest() {
        let mut rng = rng_for(None);
        let picked = sample(reports(6), SamplingPolicy::MostRecent(2), &mut rng);
        let ids: Vec<i64> = picked.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 6]);
    }

    #[test]
    fn limit_above_population_keeps_all() {
        let mut rng = rng_for(Some(3));
        assert_eq!(sample(reports(2), SamplingPolicy::Random(5), &mut rng).len(), 2);
    }
}
