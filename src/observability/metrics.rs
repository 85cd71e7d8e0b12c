use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub rides_requested_total: IntCounter,
    pub ride_transitions_total: IntCounterVec,
    pub accept_conflicts_total: IntCounter,
    pub notifications_total: IntCounterVec,
    pub matching_candidates: Histogram,
    pub matching_latency_seconds: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let rides_requested_total =
            IntCounter::new("rides_requested_total", "Total rides created")
                .expect("valid rides_requested_total metric");

        let ride_transitions_total = IntCounterVec::new(
            Opts::new(
                "ride_transitions_total",
                "Ride status transitions by target status and outcome",
            ),
            &["to", "outcome"],
        )
        .expect("valid ride_transitions_total metric");

        let accept_conflicts_total = IntCounter::new(
            "accept_conflicts_total",
            "Accept attempts that lost the race for a ride",
        )
        .expect("valid accept_conflicts_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "notifications_total",
                "Notification attempts by channel and outcome",
            ),
            &["channel", "outcome"],
        )
        .expect("valid notifications_total metric");

        let matching_candidates = Histogram::with_opts(
            HistogramOpts::new(
                "matching_candidates",
                "Number of candidate drivers found per ride request",
            )
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        )
        .expect("valid matching_candidates metric");

        let matching_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "matching_latency_seconds",
                "Latency of ride request matching in seconds",
            ),
            &["outcome"],
        )
        .expect("valid matching_latency_seconds metric");

        registry
            .register(Box::new(rides_requested_total.clone()))
            .expect("register rides_requested_total");
        registry
            .register(Box::new(ride_transitions_total.clone()))
            .expect("register ride_transitions_total");
        registry
            .register(Box::new(accept_conflicts_total.clone()))
            .expect("register accept_conflicts_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(matching_candidates.clone()))
            .expect("register matching_candidates");
        registry
            .register(Box::new(matching_latency_seconds.clone()))
            .expect("register matching_latency_seconds");

        Self {
            registry,
            rides_requested_total,
            ride_transitions_total,
            accept_conflicts_total,
            notifications_total,
            matching_candidates,
            matching_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
