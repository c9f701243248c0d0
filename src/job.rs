//! Units of dispatchable work
//!
//! Each job kind is its own struct carrying exactly the fields its work
//! function needs; the pool only sees them through this trait.

/// One unit of work handed to a pool lane.
pub trait Job: Send {
    /// Cost reported to the progress aggregator once the job succeeds.
    /// Kinds that do not track volume keep the default of zero.
    fn cost(&self) -> u64 {
        0
    }

    /// Short label used in error messages and the audit log.
    fn describe(&self) -> String;
}

/// Sum of the costs of a batch, computed once before dispatch.
pub fn total_cost<J: Job>(jobs: &[J]) -> u64 {
    jobs.iter().map(Job::cost).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Weighted(u64);

    impl Job for Weighted {
        fn cost(&self) -> u64 {
            self.0
        }
        fn describe(&self) -> String {
            format!("weighted {}", self.0)
        }
    }

    struct Plain;

    impl Job for Plain {
        fn describe(&self) -> String {
            "plain".into()
        }
    }

    #[test]
    fn total_cost_sums_every_job() {
        let jobs = vec![Weighted(1024), Weighted(0), Weighted(7)];
        assert_eq!(total_cost(&jobs), 1031);
    }

    #[test]
    fn cost_defaults_to_zero() {
        assert_eq!(Plain.cost(), 0);
        assert_eq!(total_cost::<Plain>(&[]), 0);
    }
}
