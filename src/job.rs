use std::{sync::Arc, time::Instant};

use crate::{client::Client, identity::snake_case, payload::Payload};

/**
A unit of background work, as a job framework describes it.

Implement this for whatever a framework's middleware hands you at dispatch
time. The queue and worker kind only need to be human-readable names; the
middleware snake-normalizes both when it builds the service name.
*/
pub trait Job {
    /**
    The name of the queue the job was pulled from.
    */
    fn queue(&self) -> &str;

    /**
    The name of the worker type executing the job.
    */
    fn kind(&self) -> &str;

    /**
    The job's own instrumentation option.

    `Some(false)` opts the job out of instrumentation entirely. `None` and
    `Some(true)` both mean instrument.
    */
    fn instrument(&self) -> Option<bool> {
        None
    }
}

/**
A middleware that times background jobs and emits one event per run.

Each instrumented job produces an event with service
`"{framework}.{queue}.{worker_kind}"` (every part snake-normalized), the
framework name as a tag, and the elapsed wall time in seconds as the
metric:

```no_run
use std::sync::Arc;

struct ChargeJob;

impl mettric::Job for ChargeJob {
    fn queue(&self) -> &str {
        "default"
    }

    fn kind(&self) -> &str {
        "ChargeWorker"
    }
}

let client = Arc::new(mettric::client().app("billing").connect().unwrap());
let middleware = mettric::JobMiddleware::new(client, "sidekiq");

middleware.call(&ChargeJob, || {
    // run the job
});
```

Emission failures never affect the wrapped work: the job runs exactly
once and its return value always comes back, whatever the collector is
doing.
*/
pub struct JobMiddleware {
    client: Arc<Client>,
    framework: String,
}

impl JobMiddleware {
    /**
    Create a middleware emitting through `client` under the given
    framework name.
    */
    pub fn new(client: Arc<Client>, framework: impl Into<String>) -> Self {
        JobMiddleware {
            client,
            framework: snake_case(&framework.into()),
        }
    }

    /**
    Run `work` for `job`, emitting a timed event unless the job opts out.
    */
    pub fn call<T>(&self, job: &impl Job, work: impl FnOnce() -> T) -> T {
        if job.instrument() == Some(false) {
            return work();
        }

        let service = format!(
            "{}.{}.{}",
            self.framework,
            snake_case(job.queue()),
            snake_case(job.kind())
        );

        let started = Instant::now();

        let value = work();

        let mut payload = Payload::new();
        payload.insert("service", service);
        payload.insert("tags", [self.framework.as_str()]);
        payload.insert("metric", started.elapsed().as_secs_f64());

        // Same silence policy as any other emission: a failed event never
        // fails the job
        let _ = self.client.append(payload);

        value
    }
}
