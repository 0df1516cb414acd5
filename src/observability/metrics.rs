//! Connection and drain metrics.
//!
//! # Metrics
//! - `grace_connections_accepted_total` (counter): connections accepted
//! - `grace_connections_active` (gauge): connections still being dispatched
//! - `grace_dispatch_errors_total` (counter): dispatches that failed or panicked
//! - `grace_drain_forced_total` (counter): drains cut short by the grace period
//!
//! Only the `metrics` facade is used; without an installed recorder every
//! call is a no-op.

pub fn connection_accepted() {
    ::metrics::counter!("grace_connections_accepted_total").increment(1);
}

pub fn connection_opened() {
    ::metrics::gauge!("grace_connections_active").increment(1.0);
}

pub fn connection_closed() {
    ::metrics::gauge!("grace_connections_active").decrement(1.0);
}

pub fn dispatch_error() {
    ::metrics::counter!("grace_dispatch_errors_total").increment(1);
}

pub fn drain_forced() {
    ::metrics::counter!("grace_drain_forced_total").increment(1);
}
