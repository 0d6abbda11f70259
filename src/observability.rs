use biometrics::{Collector, Counter};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("confab.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("confab.client.request_errors");

pub(crate) static STREAM_DELTAS: Counter = Counter::new("confab.stream.deltas");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("confab.stream.errors");

pub(crate) static TURNS_COMPLETED: Counter = Counter::new("confab.session.turns_completed");
pub(crate) static TURNS_CANCELLED: Counter = Counter::new("confab.session.turns_cancelled");
pub(crate) static TURNS_ERRORED: Counter = Counter::new("confab.session.turns_errored");

pub(crate) static SUMMARIZE_ATTEMPTS: Counter = Counter::new("confab.summarize.attempts");
pub(crate) static SUMMARIZE_APPLIED: Counter = Counter::new("confab.summarize.applied");
pub(crate) static SUMMARIZE_CONFLICTS: Counter = Counter::new("confab.summarize.conflicts");
pub(crate) static SUMMARIZE_FAILURES: Counter = Counter::new("confab.summarize.failures");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);

    collector.register_counter(&STREAM_DELTAS);
    collector.register_counter(&STREAM_ERRORS);

    collector.register_counter(&TURNS_COMPLETED);
    collector.register_counter(&TURNS_CANCELLED);
    collector.register_counter(&TURNS_ERRORED);

    collector.register_counter(&SUMMARIZE_ATTEMPTS);
    collector.register_counter(&SUMMARIZE_APPLIED);
    collector.register_counter(&SUMMARIZE_CONFLICTS);
    collector.register_counter(&SUMMARIZE_FAILURES);
}
