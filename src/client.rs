use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    connection::Connection,
    error::Error,
    identity::{snake_case, IdentityProvider, SystemIdentity},
    internal_metrics::{ClientMetrics, InternalMetrics},
    payload::Payload,
    value::Value,
};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5555;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/**
The tag the client adds to every canonical event it emits.
*/
pub const LIBRARY_TAG: &str = "mettric";

// Diagnostic frames bypass normalization, so this is not namespaced
const ERROR_SERVICE: &str = "mettric error";

/**
Create a builder for a [`Client`].

The builder will use its [`SystemIdentity`] and the default endpoint of
`localhost:5555` with a 5 second timeout unless told otherwise:

```no_run
let client = mettric::client()
    .app("billing")
    .env("prod")
    .connect()
    .unwrap();

client.append(mettric::payload! {
    service: "charge.created",
    tags: ["stripe"],
}).unwrap();
```
*/
pub fn client() -> ClientBuilder {
    ClientBuilder::new()
}

/**
An external error tracker the client forwards dropped-event failures to.

When a transport failure is swallowed by [`Client::append`], an installed
tracker receives the failure and the raw payload that couldn't be
delivered. The client ignores the tracker's outcome entirely; a tracker
must not panic.
*/
pub trait ErrorTracker {
    /**
    Record that `payload` was dropped because of `error`.
    */
    fn notify(&self, error: &Error, payload: &Payload);
}

/**
A builder for a [`Client`].

Use [`client`] to begin one. Every option is optional: the endpoint falls
back to `localhost:5555`, and identity fields fall back to the configured
[`IdentityProvider`].
*/
pub struct ClientBuilder {
    host: String,
    port: u16,
    timeout: Duration,
    app: Option<String>,
    reporting_host: Option<String>,
    env: Option<String>,
    identity: Box<dyn IdentityProvider>,
    error_tracker: Option<Box<dyn ErrorTracker + Send + Sync>>,
}

impl ClientBuilder {
    fn new() -> Self {
        ClientBuilder {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            app: None,
            reporting_host: None,
            env: None,
            identity: Box::new(SystemIdentity),
            error_tracker: None,
        }
    }

    /**
    Set the collector's hostname or address.
    */
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /**
    Set the collector's port.
    */
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /**
    Set the timeout applied to connecting and to each frame write and read.
    */
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /**
    Set the logical application name used to namespace every service.
    */
    pub fn app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    /**
    Set the host this client reports as, overriding whatever the caller
    puts in individual events.
    */
    pub fn reporting_host(mut self, reporting_host: impl Into<String>) -> Self {
        self.reporting_host = Some(reporting_host.into());
        self
    }

    /**
    Set the deployment environment tag. An empty value means events carry
    no environment tag.
    */
    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    /**
    Set the provider used to resolve any identity fields not set
    explicitly on the builder.
    */
    pub fn identity(mut self, provider: impl IdentityProvider + 'static) -> Self {
        self.identity = Box::new(provider);
        self
    }

    /**
    Install an [`ErrorTracker`] to forward swallowed transport failures to.
    */
    pub fn error_tracker(mut self, tracker: impl ErrorTracker + Send + Sync + 'static) -> Self {
        self.error_tracker = Some(Box::new(tracker));
        self
    }

    /**
    Resolve and validate the client's identity and open its transport
    session.

    The app name is checked before the reporting host. The session dials
    lazily, so an unreachable collector won't fail here; it will surface
    as swallowed delivery failures later.
    */
    pub fn connect(self) -> Result<Client, Error> {
        let ClientBuilder {
            host,
            port,
            timeout,
            app,
            reporting_host,
            env,
            identity,
            error_tracker,
        } = self;

        let app = snake_case(&app.unwrap_or_else(|| identity.app()));
        if app.is_empty() {
            return Err(Error::MissingAppName);
        }

        let reporting_host = snake_case(&reporting_host.unwrap_or_else(|| identity.reporting_host()));
        if reporting_host.is_empty() {
            return Err(Error::MissingHostName);
        }

        let env = snake_case(&env.unwrap_or_else(|| identity.env()));

        let metrics = Arc::new(InternalMetrics::default());
        let connection = Connection::connect(host, port, timeout, metrics.clone());

        Ok(Client {
            app,
            host: reporting_host,
            env,
            connection,
            error_tracker,
            metrics,
        })
    }
}

/**
A metrics-emission client: one identity, one connection to the collector.

A client is created through [`client`]. It holds three immutable identity
strings resolved at construction and a single lazily dialed TCP session.
Share one across threads with an [`Arc`]; all sends are serialized
internally so concurrent [`Client::append`] calls never interleave frames.

Dropping the client closes its connection.
*/
pub struct Client {
    app: String,
    host: String,
    env: String,
    connection: Connection,
    error_tracker: Option<Box<dyn ErrorTracker + Send + Sync>>,
    metrics: Arc<InternalMetrics>,
}

impl Client {
    /**
    The application name every service is namespaced under.
    */
    pub fn app(&self) -> &str {
        &self.app
    }

    /**
    The host every event reports as.
    */
    pub fn host(&self) -> &str {
        &self.host
    }

    /**
    The deployment environment tag, or an empty string if none applies.
    */
    pub fn env(&self) -> &str {
        &self.env
    }

    /**
    Normalize an event payload and send it to the collector.

    Normalization produces the canonical wire shape:

    - `service` becomes `"{app}.{service}"`. A missing, empty, or blank
      service fails with [`Error::MissingService`] before anything is sent.
    - `tags` becomes an ordered, de-duplicated sequence of strings: the
      caller's tags, then [`LIBRARY_TAG`], then the environment tag if one
      applies. Each appears exactly once even if the caller already
      supplied it.
    - `metric` defaults to `1` when the caller didn't set one.
    - `host` is overwritten with the client's reporting host.
    - every other field passes through unchanged.

    Any transport failure is absorbed rather than returned: the client
    best-effort emits a diagnostic event describing the failure, forwards
    the failure and the raw payload to the [`ErrorTracker`] if one is
    installed, and reports success. Metrics emission never breaks the
    calling application; a collector outage shows up in
    [`Client::metrics`] and in the tracker, not as an error here.
    */
    pub fn append(&self, payload: Payload) -> Result<(), Error> {
        let canonical = self.standardize(&payload)?;

        match self.connection.send(&canonical) {
            Ok(()) => {
                self.metrics.event_sent.increment();
            }
            Err(err) => {
                self.metrics.event_send_failed.increment();
                self.report_failure(Error::Transport(err), &payload);
            }
        }

        Ok(())
    }

    /**
    Run `work`, then append `payload` with `metric` set to the elapsed
    wall time in seconds.

    Shares [`Client::append`]'s failure policy: transport failures are
    absorbed and the work's outcome is unaffected by them.
    */
    pub fn time<T>(&self, mut payload: Payload, work: impl FnOnce() -> T) -> Result<T, Error> {
        let started = Instant::now();

        let value = work();

        payload.insert("metric", started.elapsed().as_secs_f64());
        self.append(payload)?;

        Ok(value)
    }

    /**
    Send an arbitrary frame to the collector and return its response.

    No normalization is applied and, unlike [`Client::append`], transport
    failures propagate. This is the escape hatch for collector features
    beyond event emission, like querying its state.
    */
    pub fn raw(&self, payload: Payload) -> Result<serde_json::Value, Error> {
        self.connection.roundtrip(&payload).map_err(Error::from)
    }

    /**
    Whether the transport session currently holds an established
    connection. No probe is sent; a stale stream is only discovered by the
    next send.
    */
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /**
    Close the transport session. Safe to call more than once; a later
    [`Client::append`] reopens it.
    */
    pub fn close(&self) {
        self.connection.close();
    }

    /**
    A handle to the client's self-instrumentation counters.
    */
    pub fn metrics(&self) -> ClientMetrics {
        ClientMetrics {
            metrics: self.metrics.clone(),
        }
    }

    fn standardize(&self, payload: &Payload) -> Result<Payload, Error> {
        let mut out = payload.clone();

        let service = match out.get("service").and_then(Value::as_text) {
            Some(service) if !service.trim().is_empty() => service.into_owned(),
            _ => {
                self.metrics.event_missing_service.increment();
                return Err(Error::MissingService);
            }
        };

        let mut tags = Vec::new();

        if let Some(value) = out.get("tags") {
            value.collect_tags(&mut tags);
        }

        tags.push(LIBRARY_TAG.to_owned());

        if !self.env.is_empty() {
            tags.push(self.env.clone());
        }

        let mut deduped: Vec<Value> = Vec::with_capacity(tags.len());

        for tag in tags {
            if !deduped.iter().any(|seen| seen.as_str() == Some(tag.as_str())) {
                deduped.push(Value::String(tag));
            }
        }

        out.insert("tags", Value::Seq(deduped));

        if !out.contains_key("metric") {
            out.insert("metric", 1);
        }

        out.insert("host", self.host.as_str());
        out.insert("service", format!("{}.{}", self.app, service));

        Ok(out)
    }

    fn report_failure(&self, error: Error, payload: &Payload) {
        log::debug!("dropped a metrics event: {}", error);

        let mut diagnostic = Payload::new();
        diagnostic.insert("service", ERROR_SERVICE);
        diagnostic.insert("description", error.to_string());

        // Failures of the diagnostic itself are discarded outright
        match self.connection.send(&diagnostic) {
            Ok(()) => self.metrics.diagnostic_sent.increment(),
            Err(_) => self.metrics.diagnostic_failed.increment(),
        }

        if let Some(ref tracker) = self.error_tracker {
            tracker.notify(&error, payload);
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.connection.close();
    }
}
