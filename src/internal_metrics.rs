use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

macro_rules! metrics {
    (
        $pub_container:ty {
            $field:ident: $internal_container:ident {
                $(
                    $(#[$meta:meta])*
                    $metric:ident: Counter,
                )*
            }
        }
    ) => {
        #[derive(Default)]
        pub(crate) struct $internal_container {
            $(
                $(#[$meta])*
                pub(crate) $metric: Counter,
            )*
        }

        impl $internal_container {
            pub fn sample(&self) -> impl Iterator<Item = (&'static str, usize)> + 'static {
                let $internal_container { $($metric),* } = self;

                [$(
                    (stringify!($metric), $metric.sample()),
                )*]
                .into_iter()
            }
        }

        impl $pub_container {
            $(
                $(#[$meta])*
                pub fn $metric(&self) -> usize {
                    self.$field.$metric.sample()
                }
            )*
        }
    };
}

#[derive(Default)]
pub(crate) struct Counter(AtomicUsize);

impl Counter {
    pub fn increment(&self) {
        self.increment_by(1);
    }

    pub fn increment_by(&self, by: usize) {
        self.0.fetch_add(by, Ordering::Relaxed);
    }

    pub fn sample(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

metrics!(
    ClientMetrics {
        metrics: InternalMetrics {
            /**
            A connection to the collector was established successfully.
            */
            transport_conn_established: Counter,
            /**
            A connection to the collector could not be established.
            */
            transport_conn_failed: Counter,
            /**
            An event was normalized and acknowledged by the collector.
            */
            event_sent: Counter,
            /**
            An event could not be delivered and was dropped.
            */
            event_send_failed: Counter,
            /**
            An event was discarded because it had no usable service field.
            */
            event_missing_service: Counter,
            /**
            A diagnostic frame describing a dropped event was delivered.
            */
            diagnostic_sent: Counter,
            /**
            A diagnostic frame describing a dropped event was itself dropped.
            */
            diagnostic_failed: Counter,
        }
    }
);

/**
Metrics produced by a [`Client`](crate::Client) about its own activity.

These counters don't sample any metrics you emit; they count the client's
own connection attempts and delivery outcomes. Get a handle through
[`Client::metrics`](crate::Client::metrics).
*/
pub struct ClientMetrics {
    pub(crate) metrics: Arc<InternalMetrics>,
}

impl ClientMetrics {
    /**
    Enumerate every counter as a `(name, value)` pair.
    */
    pub fn sample(&self) -> impl Iterator<Item = (&'static str, usize)> + 'static {
        self.metrics.sample()
    }
}
