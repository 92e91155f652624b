//! Pure probe predicates, kept separate from the HTTP transport so they
//! can be tested without spinning up a server.

use std::time::Duration;

/// `metric-collection-timely` liveness: fails only once the last
/// scrape-loop tick is older than `1.1 * resolution`. A tick that ended
/// in a scrape error still counts, since it started on time — this takes
/// `last_tick_age` (time since the last tick *started*), not any
/// success/failure outcome.
pub fn collection_is_timely(last_tick_age: Duration, resolution: Duration) -> bool {
    last_tick_age <= resolution.mul_f64(1.1)
}
