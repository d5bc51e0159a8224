//! Per-worker bandwidth share
//!
//! The total budget is split evenly once, at startup. A worker that
//! finishes early does not hand its share to the others.

use std::fmt;

/// KB/s per Mbit/s (1 Mbit/s = 125,000 B/s)
const KBS_PER_MBPS: u64 = 125;

/// Bandwidth ceiling applied to every worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthShare {
    /// No `--bwlimit` is passed
    Unlimited,
    /// Per-worker limit
    Limited {
        /// Share in Mbit/s
        mbps: u64,
        /// Same share in KB/s, the unit rsync's `--bwlimit` takes
        kbs: u64,
    },
}

impl BandwidthShare {
    /// Split a total budget in Mbit/s between `workers`
    ///
    /// `None` or zero means no limit. The KB/s value is the floored Mbit/s
    /// share converted, so both always describe the same ceiling. A budget
    /// smaller than the worker count still yields at least 1 KB/s per
    /// worker, never "unlimited".
    pub fn allocate(total_mbps: Option<u64>, workers: usize) -> Self {
        match total_mbps {
            None | Some(0) => BandwidthShare::Unlimited,
            Some(total) => {
                let mbps = per_worker_share(total, workers);
                let kbs = mbps.saturating_mul(KBS_PER_MBPS).max(1);
                BandwidthShare::Limited { mbps, kbs }
            }
        }
    }

    /// Value for rsync's `--bwlimit`, in KB/s (0 = unlimited)
    pub fn limit_kbs(&self) -> u64 {
        match self {
            BandwidthShare::Unlimited => 0,
            BandwidthShare::Limited { kbs, .. } => *kbs,
        }
    }

    /// Check if a limit applies
    pub fn is_limited(&self) -> bool {
        matches!(self, BandwidthShare::Limited { .. })
    }
}

impl fmt::Display for BandwidthShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BandwidthShare::Unlimited => write!(f, "unlimited"),
            BandwidthShare::Limited { mbps, kbs } => {
                write!(f, "{} Mbit/s ({} KB/s) per worker", mbps, kbs)
            }
        }
    }
}

/// `floor(total / workers)`, in whatever unit `total` is given
pub fn per_worker_share(total: u64, workers: usize) -> u64 {
    total / workers.max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_worker_share_floor() {
        assert_eq!(per_worker_share(800, 4), 200);
        assert_eq!(per_worker_share(10, 3), 3);
        assert_eq!(per_worker_share(400, 4), 100);
    }

    #[test]
    fn test_allocate_converts_to_kbs() {
        let share = BandwidthShare::allocate(Some(800), 4);
        assert_eq!(share, BandwidthShare::Limited { mbps: 200, kbs: 25_000 });
        assert_eq!(share.limit_kbs(), 25_000);
        assert!(share.is_limited());
    }

    #[test]
    fn test_allocate_without_budget() {
        assert_eq!(BandwidthShare::allocate(None, 8), BandwidthShare::Unlimited);
        assert_eq!(BandwidthShare::allocate(Some(0), 8), BandwidthShare::Unlimited);
        assert_eq!(BandwidthShare::allocate(None, 8).limit_kbs(), 0);
    }

    #[test]
    fn test_uneven_split_agrees_with_display() {
        let share = BandwidthShare::allocate(Some(10), 3);
        assert_eq!(share, BandwidthShare::Limited { mbps: 3, kbs: 375 });
        assert_eq!(share.to_string(), "3 Mbit/s (375 KB/s) per worker");
    }

    #[test]
    fn test_huge_budget_saturates() {
        let share = BandwidthShare::allocate(Some(u64::MAX / 2), 4);
        assert_eq!(share.limit_kbs(), u64::MAX);

        let share = BandwidthShare::allocate(Some(u64::MAX), 1);
        assert_eq!(share.limit_kbs(), u64::MAX);
    }

    #[test]
    fn test_tiny_budget_stays_limited() {
        let share = BandwidthShare::allocate(Some(1), 500);
        assert_eq!(share.limit_kbs(), 1);
        assert!(share.is_limited());
    }
}
