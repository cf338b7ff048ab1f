/*!
Emit application metrics to a collector over a persistent TCP connection.

Application code describes what happened; this crate normalizes the
description, tags it, and delivers it, so callers never touch wire formats,
naming conventions, or connection lifecycle. Events go out as length
prefixed JSON frames, like:

```text
{"service":"billing.charge.created","metric":1,"tags":["stripe","mettric","prod"],"host":"web_1"}
```

# Getting started

Add `mettric` to your `Cargo.toml`:

```toml
[dependencies.mettric]
version = "0.1.0"
```

Create a client once, then append events from anywhere:

```no_run
let client = mettric::client()
    .host("collector.internal")
    .app("billing")
    .env("prod")
    .connect()
    .unwrap();

client.append(mettric::payload! {
    service: "charge.created",
    tags: ["stripe"],
}).unwrap();
```

The only required event field is `service`. Everything else is optional
and passes through to the collector as-is.

# Normalization

Every appended event is rewritten into a canonical shape before it leaves
the process:

- `service` is namespaced under the client's app name:
  `"charge.created"` becomes `"billing.charge.created"`.
- `tags` always contains the [`LIBRARY_TAG`] and, when one is configured,
  the deployment environment, each exactly once, after whatever tags the
  caller supplied.
- `metric` defaults to `1`, so plain occurrences count without ceremony.
- `host` is forced to the client's reporting host.

See [`Client::append`] for the full rules.

# When emission fails

A metrics client embedded in an application must never take the
application down with it. Construction-time validation errors and events
with no `service` fail loudly, because they are bugs in the calling code.
Everything transport-shaped is absorbed: [`Client::append`] reports
success, best-effort emits a diagnostic event describing the failure, and
forwards the failure to an [`ErrorTracker`] if one is installed. The
client's own counters ([`Client::metrics`]) record what was dropped.

There is no buffering, no retry, and no reconnect loop: a dead connection
is dropped and the next append dials again. An outage costs the events
emitted during it, nothing more.

# Instrumenting background jobs

[`JobMiddleware`] wraps a job framework's dispatch path, timing each job
and emitting one event per run under
`"{framework}.{queue}.{worker_kind}"`. Jobs opt out through their own
[`Job::instrument`] option.

# Resolving identity

The app name, reporting host, and environment fall back to an
[`IdentityProvider`] for anything not set on the builder. The default
[`SystemIdentity`] reads `METTRIC_APP`, `METTRIC_REPORTING_HOST` (then
`HOSTNAME`, then the OS hostname file), and `METTRIC_ENV`. Frameworks
with their own notion of application identity supply their own provider.
*/

#![deny(missing_docs)]

mod client;
mod connection;
mod error;
mod identity;
mod internal_metrics;
mod job;
mod payload;
mod value;

pub use self::{
    client::{client, Client, ClientBuilder, ErrorTracker, LIBRARY_TAG},
    error::{Error, TransportError},
    identity::{IdentityProvider, SystemIdentity},
    internal_metrics::ClientMetrics,
    job::{Job, JobMiddleware},
    payload::Payload,
    value::Value,
};
