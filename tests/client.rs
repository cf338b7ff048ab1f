/*!
Integration tests running a real client against an in-process collector.

The mock collector speaks the crate's wire protocol: length prefixed JSON
frames, one acknowledgement per frame.
*/

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use mettric::{client, payload, Client, Error, ErrorTracker, IdentityProvider, Payload};

struct Collector {
    addr: SocketAddr,
    frames: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl Collector {
    fn frames(&self) -> Vec<serde_json::Value> {
        self.frames.lock().unwrap().clone()
    }
}

fn collector(reject_events: bool) -> Collector {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let frames = Arc::new(Mutex::new(Vec::new()));

    let recorded = frames.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else {
                break;
            };

            serve(stream, &recorded, reject_events);
        }
    });

    Collector { addr, frames }
}

fn serve(mut stream: TcpStream, frames: &Arc<Mutex<Vec<serde_json::Value>>>, reject_events: bool) {
    loop {
        let mut len = [0u8; 4];
        if stream.read_exact(&mut len).is_err() {
            break;
        }

        let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
        if stream.read_exact(&mut body).is_err() {
            break;
        }

        let frame: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let is_query = frame.get("query").is_some();

        frames.lock().unwrap().push(frame);

        let reply = if is_query {
            serde_json::json!({"ok": true, "events": [{"service": "billing.charge.created"}]})
        } else if reject_events {
            serde_json::json!({"ok": false, "error": "rejected by test collector"})
        } else {
            serde_json::json!({"ok": true})
        };

        let body = serde_json::to_vec(&reply).unwrap();
        if stream.write_all(&(body.len() as u32).to_be_bytes()).is_err() {
            break;
        }
        if stream.write_all(&body).is_err() {
            break;
        }
    }
}

fn connect(collector: &Collector) -> Client {
    client()
        .host("127.0.0.1")
        .port(collector.addr.port())
        .timeout(Duration::from_secs(5))
        .app("billing")
        .reporting_host("web-1")
        .env("prod")
        .connect()
        .unwrap()
}

fn unreachable_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[test]
fn append_sends_the_canonical_frame() {
    let collector = collector(false);
    let client = connect(&collector);

    client
        .append(payload! {
            service: "charge.created",
            tags: ["stripe"],
        })
        .unwrap();

    let frames = collector.frames();
    assert_eq!(1, frames.len());

    let frame = &frames[0];
    assert_eq!(Some("billing.charge.created"), frame["service"].as_str());
    assert_eq!(
        serde_json::json!(["stripe", "mettric", "prod"]),
        frame["tags"]
    );
    assert_eq!(Some(1), frame["metric"].as_i64());
    assert_eq!(Some("web_1"), frame["host"].as_str());

    assert_eq!(1, client.metrics().event_sent());
}

#[test]
fn library_and_env_tags_are_not_duplicated() {
    let collector = collector(false);
    let client = connect(&collector);

    client
        .append(payload! {
            service: "charge.created",
            tags: ["prod", "mettric", "stripe"],
        })
        .unwrap();

    let frames = collector.frames();
    assert_eq!(
        serde_json::json!(["prod", "mettric", "stripe"]),
        frames[0]["tags"]
    );
}

#[test]
fn missing_service_is_raised_and_nothing_is_sent() {
    let collector = collector(false);
    let client = connect(&collector);

    assert!(matches!(
        client.append(Payload::new()),
        Err(Error::MissingService)
    ));
    assert!(matches!(
        client.append(payload! { service: "  " }),
        Err(Error::MissingService)
    ));

    assert!(collector.frames().is_empty());
    assert!(!client.is_connected());
}

#[test]
fn collector_rejections_are_swallowed_and_reported_diagnostically() {
    let collector = collector(true);
    let client = connect(&collector);

    let result = client.append(payload! { service: "charge.created" });

    assert!(result.is_ok());

    let frames = collector.frames();
    assert_eq!(2, frames.len());

    let diagnostic = &frames[1];
    assert_eq!(Some("mettric error"), diagnostic["service"].as_str());
    assert!(diagnostic["description"]
        .as_str()
        .unwrap()
        .contains("rejected by test collector"));

    assert_eq!(1, client.metrics().event_send_failed());
    assert_eq!(1, client.metrics().diagnostic_failed());
}

#[test]
fn an_unreachable_collector_is_swallowed() {
    let client = client()
        .host("127.0.0.1")
        .port(unreachable_port())
        .timeout(Duration::from_millis(500))
        .app("billing")
        .reporting_host("web-1")
        .env("prod")
        .connect()
        .unwrap();

    let result = client.append(payload! { service: "charge.created" });

    assert!(result.is_ok());
    assert_eq!(1, client.metrics().event_send_failed());
    assert_eq!(1, client.metrics().diagnostic_failed());
    // One dial per attempted frame: the event, then the diagnostic
    assert_eq!(2, client.metrics().transport_conn_failed());
}

#[test]
fn the_error_tracker_receives_the_failure_and_the_raw_payload() {
    struct CapturingTracker {
        notified: Arc<Mutex<Vec<(String, Payload)>>>,
    }

    impl ErrorTracker for CapturingTracker {
        fn notify(&self, error: &Error, payload: &Payload) {
            self.notified
                .lock()
                .unwrap()
                .push((error.to_string(), payload.clone()));
        }
    }

    let notified = Arc::new(Mutex::new(Vec::new()));
    let collector = collector(true);

    let client = client()
        .host("127.0.0.1")
        .port(collector.addr.port())
        .app("billing")
        .reporting_host("web-1")
        .env("prod")
        .error_tracker(CapturingTracker {
            notified: notified.clone(),
        })
        .connect()
        .unwrap();

    client
        .append(payload! { service: "charge.created" })
        .unwrap();

    let notified = notified.lock().unwrap();
    assert_eq!(1, notified.len());

    let (error, payload) = &notified[0];
    assert!(error.contains("rejected by test collector"));

    // The tracker sees the raw payload, not the canonical one
    assert_eq!(
        Some("charge.created"),
        payload.get("service").and_then(|v| v.as_str())
    );
    assert!(!payload.contains_key("host"));
}

#[test]
fn construction_fails_on_unresolvable_identity() {
    struct NoIdentity;

    impl IdentityProvider for NoIdentity {
        fn app(&self) -> String {
            String::new()
        }

        fn reporting_host(&self) -> String {
            String::new()
        }

        fn env(&self) -> String {
            String::new()
        }
    }

    let result = client().identity(NoIdentity).connect();
    assert!(matches!(result, Err(Error::MissingAppName)));

    let result = client().identity(NoIdentity).app("billing").connect();
    assert!(matches!(result, Err(Error::MissingHostName)));
}

#[test]
fn close_is_idempotent_and_the_session_reopens_on_demand() {
    let collector = collector(false);
    let client = connect(&collector);

    assert!(!client.is_connected());

    client.append(payload! { service: "charge.created" }).unwrap();
    assert!(client.is_connected());

    client.close();
    client.close();
    assert!(!client.is_connected());

    client.append(payload! { service: "charge.settled" }).unwrap();
    assert!(client.is_connected());
    assert_eq!(2, collector.frames().len());
}

#[test]
fn raw_frames_bypass_normalization_and_return_the_response() {
    let collector = collector(false);
    let client = connect(&collector);

    let response = client
        .raw(payload! { query: "service = \"billing.charge.created\"" })
        .unwrap();

    assert_eq!(Some(true), response["ok"].as_bool());
    assert!(response["events"].is_array());

    // The query frame went out untouched: no namespacing, no tags
    let frames = collector.frames();
    assert_eq!(1, frames.len());
    assert!(frames[0].get("service").is_none());
    assert!(frames[0].get("tags").is_none());
}

#[test]
fn timed_appends_carry_the_elapsed_seconds() {
    let collector = collector(false);
    let client = connect(&collector);

    let value = client
        .time(payload! { service: "report.generate" }, || {
            thread::sleep(Duration::from_millis(20));
            7
        })
        .unwrap();

    assert_eq!(7, value);

    let frames = collector.frames();
    let metric = frames[0]["metric"].as_f64().unwrap();

    assert!(metric >= 0.02, "{}", metric);
    assert_eq!(
        Some("billing.report.generate"),
        frames[0]["service"].as_str()
    );
}

#[test]
fn job_middleware_emits_one_timed_event_per_run() {
    struct ChargeJob;

    impl mettric::Job for ChargeJob {
        fn queue(&self) -> &str {
            "default"
        }

        fn kind(&self) -> &str {
            "ChargeWorker"
        }
    }

    let collector = collector(false);
    let client = Arc::new(connect(&collector));
    let middleware = mettric::JobMiddleware::new(client, "Sidekiq");

    let value = middleware.call(&ChargeJob, || "done");

    assert_eq!("done", value);

    let frames = collector.frames();
    assert_eq!(1, frames.len());

    let frame = &frames[0];
    assert_eq!(
        Some("billing.sidekiq.default.charge_worker"),
        frame["service"].as_str()
    );
    assert_eq!(
        serde_json::json!(["sidekiq", "mettric", "prod"]),
        frame["tags"]
    );
    assert!(frame["metric"].is_f64());
    assert_eq!(Some("web_1"), frame["host"].as_str());
}

#[test]
fn concurrent_appends_never_interleave_frames() {
    let collector = collector(false);
    let client = Arc::new(connect(&collector));

    let threads = (0..8)
        .map(|i| {
            let client = client.clone();
            thread::spawn(move || {
                for j in 0..5 {
                    client
                        .append(payload! {
                            service: "charge.created",
                            attempt: (i * 10 + j) as i64,
                        })
                        .unwrap();
                }
            })
        })
        .collect::<Vec<_>>();

    for thread in threads {
        thread.join().unwrap();
    }

    // The mock parses every frame; interleaved writes would have broken it
    let frames = collector.frames();
    assert_eq!(40, frames.len());
    assert!(frames
        .iter()
        .all(|frame| frame["service"].as_str() == Some("billing.charge.created")));

    assert_eq!(40, client.metrics().event_sent());
}
