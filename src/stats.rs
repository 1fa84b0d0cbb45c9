use std::collections::HashMap;
use std::time::Instant;

/// Retention horizon for the global sol/s computation.
const GLOBAL_HORIZON: usize = 30;
/// Read-window for the per-GPU sol/s computation.
const PER_GPU_WINDOW: usize = 10;

/// Cumulative counters reported by one solver instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceCounters {
    pub sols_found: u64,
    pub shares_found: u64,
}

/// One sample of all devices' cumulative counters at a point in time.
#[derive(Debug, Clone)]
struct Sample {
    at: Instant,
    counters: HashMap<String, DeviceCounters>,
}

/// A bounded ring of samples, one inserted every 5 seconds. Samples are
/// pushed at the front; the tail is dropped once there are more than
/// `GLOBAL_HORIZON` of them.
#[derive(Debug, Default)]
pub struct StatsWindow {
    samples: std::collections::VecDeque<Sample>,
}

/// A computed stats line, ready to print.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub global_sols_per_sec: f64,
    /// (gpu_id, sol/s), sorted by gpu_id ascending.
    pub per_gpu_sols_per_sec: Vec<(u32, f64)>,
    pub shares_reported: u64,
}

impl StatsWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Records a snapshot of current per-devid counters, dropping the
    /// oldest sample once the window exceeds 30 entries.
    pub fn push(&mut self, at: Instant, counters: HashMap<String, DeviceCounters>) {
        self.samples.push_front(Sample { at, counters });
        while self.samples.len() > GLOBAL_HORIZON {
            self.samples.pop_back();
        }
        debug_assert!(self.samples.len() <= GLOBAL_HORIZON);
    }

    /// Computes the aggregate rates described in the spec's stats section.
    /// Returns `None` until at least two samples exist (a rate needs a delta).
    pub fn compute(&self) -> Option<StatsSnapshot> {
        let newest = self.samples.front()?;
        if self.samples.len() < 2 {
            return None;
        }

        let oldest_30 = self.samples.back()?;
        let dt_global = duration_secs(newest.at, oldest_30.at);
        let global_sols_per_sec = if dt_global > 0.0 {
            (total_sols(&newest.counters) as f64 - total_sols(&oldest_30.counters) as f64)
                / dt_global
        } else {
            0.0
        };

        let per_gpu_reference = self
            .samples
            .get(PER_GPU_WINDOW.min(self.samples.len() - 1))
            .unwrap_or(oldest_30);
        let dt_gpu = duration_secs(newest.at, per_gpu_reference.at);

        let mut gpu_ids: Vec<u32> = newest
            .counters
            .keys()
            .filter_map(|devid| gpu_id_of(devid))
            .collect();
        gpu_ids.sort_unstable();
        gpu_ids.dedup();

        let per_gpu_sols_per_sec = gpu_ids
            .into_iter()
            .map(|gpu| {
                let newest_sum = sum_sols_for_gpu(&newest.counters, gpu);
                let ref_sum = sum_sols_for_gpu(&per_gpu_reference.counters, gpu);
                let rate = if dt_gpu > 0.0 {
                    (newest_sum as f64 - ref_sum as f64) / dt_gpu
                } else {
                    0.0
                };
                (gpu, rate)
            })
            .collect();

        let shares_reported = newest.counters.values().map(|c| c.shares_found).sum();

        Some(StatsSnapshot {
            global_sols_per_sec,
            per_gpu_sols_per_sec,
            shares_reported,
        })
    }
}

impl StatsSnapshot {
    /// `Total <global> sol/s [dev<gpu> <rate>, …] <shares> share(s)`
    pub fn format_line(&self) -> String {
        let devices = self
            .per_gpu_sols_per_sec
            .iter()
            .map(|(gpu, rate)| format!("dev{gpu} {rate:.1}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Total {:.1} sol/s [{}] {} share(s)",
            self.global_sols_per_sec, devices, self.shares_reported
        )
    }
}

fn total_sols(counters: &HashMap<String, DeviceCounters>) -> u64 {
    counters.values().map(|c| c.sols_found).sum()
}

fn sum_sols_for_gpu(counters: &HashMap<String, DeviceCounters>, gpu: u32) -> u64 {
    counters
        .iter()
        .filter(|(devid, _)| gpu_id_of(devid) == Some(gpu))
        .map(|(_, c)| c.sols_found)
        .sum()
}

fn gpu_id_of(devid: &str) -> Option<u32> {
    devid.split('.').next()?.parse().ok()
}

fn duration_secs(newer: Instant, older: Instant) -> f64 {
    newer.saturating_duration_since(older).as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn counters(sols: u64, shares: u64) -> DeviceCounters {
        DeviceCounters {
            sols_found: sols,
            shares_found: shares,
        }
    }

    #[test]
    fn window_caps_at_30_samples() {
        let mut window = StatsWindow::new();
        let t0 = Instant::now();
        for i in 0..40 {
            let mut c = HashMap::new();
            c.insert("0.0".to_string(), counters(i, 0));
            window.push(t0 + Duration::from_secs(5 * i), c);
        }
        assert_eq!(window.len(), 30);
    }

    #[test]
    fn empty_window_computes_none() {
        let window = StatsWindow::new();
        assert!(window.compute().is_none());
    }

    #[test]
    fn single_sample_computes_none() {
        let mut window = StatsWindow::new();
        let mut c = HashMap::new();
        c.insert("0.0".to_string(), counters(0, 0));
        window.push(Instant::now(), c);
        assert!(window.compute().is_none());
    }

    #[test]
    fn two_devids_one_gpu_scenario_s6() {
        // Two devids 0.0 and 0.1 on gpu 0, cumulative sols [0,100,200,300,400]
        // at 5-second intervals each. After >=15s: Total 20.0 sol/s [dev0 20.0] 0 shares.
        let mut window = StatsWindow::new();
        let t0 = Instant::now();
        let totals = [0u64, 100, 200, 300, 400];
        for (i, total) in totals.iter().enumerate() {
            let mut c = HashMap::new();
            // Split evenly across the two devids; only the sum matters.
            c.insert("0.0".to_string(), counters(total / 2, 0));
            c.insert("0.1".to_string(), counters(total - total / 2, 0));
            window.push(t0 + Duration::from_secs(5 * i as u64), c);
        }

        let snapshot = window.compute().unwrap();
        assert!((snapshot.global_sols_per_sec - 20.0).abs() < 1e-9);
        assert_eq!(snapshot.per_gpu_sols_per_sec, vec![(0, 20.0)]);
        assert_eq!(snapshot.shares_reported, 0);
        assert_eq!(snapshot.format_line(), "Total 20.0 sol/s [dev0 20.0] 0 share(s)");
    }

    #[test]
    fn per_gpu_rates_sorted_by_gpu_id() {
        let mut window = StatsWindow::new();
        let t0 = Instant::now();
        for i in 0..3u64 {
            let mut c = HashMap::new();
            c.insert("2.0".to_string(), counters(i * 10, 0));
            c.insert("1.0".to_string(), counters(i * 5, 0));
            window.push(t0 + Duration::from_secs(5 * i), c);
        }
        let snapshot = window.compute().unwrap();
        let gpu_ids: Vec<u32> = snapshot.per_gpu_sols_per_sec.iter().map(|(g, _)| *g).collect();
        assert_eq!(gpu_ids, vec![1, 2]);
    }
}
