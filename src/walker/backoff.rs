// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::time::Duration;

/// Delay after the first failed step.
pub const INITIAL_FAILURE_DELAY: Duration = Duration::from_secs(1);
/// Upper bound of the failure delay.
pub const MAX_FAILURE_DELAY: Duration = Duration::from_secs(60);

/// Interval between the start of the previous step and the start of the next one.
///
/// A successful step resets the interval to `min_step_interval`. Consecutive failures double
/// it, starting at [`INITIAL_FAILURE_DELAY`] and capped at [`MAX_FAILURE_DELAY`].
pub fn next_delay(previous: Duration, succeeded: bool, min_step_interval: Duration) -> Duration {
    if succeeded {
        min_step_interval
    } else if previous < INITIAL_FAILURE_DELAY {
        INITIAL_FAILURE_DELAY
    } else {
        previous.saturating_mul(2).min(MAX_FAILURE_DELAY)
    }
}
