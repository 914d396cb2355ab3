use std::time::Duration;

/// Spacing between outbound calls so that `calls_per_address * address_count`
/// calls stay under `max_calls_per_second`, never below `floor_delay_secs`.
pub fn compute_delay(
    address_count: usize,
    calls_per_address: usize,
    max_calls_per_second: f64,
    floor_delay_secs: f64,
) -> f64 {
    let total_calls = (calls_per_address * address_count) as f64;
    if total_calls <= max_calls_per_second {
        return floor_delay_secs;
    }
    let required_total_time = total_calls / max_calls_per_second;
    let intervals = total_calls - 1.0;
    if intervals <= 0.0 {
        return floor_delay_secs;
    }
    (required_total_time / intervals).max(floor_delay_secs)
}

/// Call budget shared by every fetch in one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBudget {
    pub delay_secs: f64,
}

impl RateBudget {
    pub fn for_batch(
        address_count: usize,
        calls_per_address: usize,
        max_calls_per_second: f64,
        floor_delay_secs: f64,
    ) -> Self {
        Self {
            delay_secs: compute_delay(
                address_count,
                calls_per_address,
                max_calls_per_second,
                floor_delay_secs,
            ),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_secs.max(0.0))
    }
}
