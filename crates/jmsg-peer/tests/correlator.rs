#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::oneshot;

use jmsg_core::error::{ErrorCode, Fault, JmsgError};
use jmsg_core::protocol::envelope::Envelope;
use jmsg_peer::{Continuation, Correlator, Expect, HandlerTable};

const TEST_TIMEOUT: Duration = Duration::from_millis(100);

/// Two correlators that deliver to each other synchronously.
fn create_pair() -> (Correlator, Correlator) {
    let left_slot: Arc<OnceLock<Correlator>> = Arc::new(OnceLock::new());
    let right_slot: Arc<OnceLock<Correlator>> = Arc::new(OnceLock::new());

    let to_right = Arc::clone(&right_slot);
    let left = Correlator::new(
        move |env, handle| {
            if let Some(right) = to_right.get() {
                right.dispatch(env, handle);
            }
        },
        HandlerTable::new(),
    );
    let to_left = Arc::clone(&left_slot);
    let right = Correlator::new(
        move |env, handle| {
            if let Some(left) = to_left.get() {
                left.dispatch(env, handle);
            }
        },
        HandlerTable::new(),
    );

    left_slot.set(left.clone()).unwrap();
    right_slot.set(right.clone()).unwrap();
    left.set_timeout(TEST_TIMEOUT);
    right.set_timeout(TEST_TIMEOUT);
    (left, right)
}

/// A correlator whose transmissions are recorded instead of delivered.
fn recording() -> (Correlator, Arc<Mutex<Vec<Envelope>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&sent);
    let c = Correlator::new(move |env, _| log.lock().unwrap().push(env), HandlerTable::new());
    c.set_timeout(TEST_TIMEOUT);
    (c, sent)
}

fn code_of(fault: &Option<Fault>) -> Option<String> {
    fault.as_ref().and_then(|f| f.code().map(str::to_string))
}

fn left_cb(seen: Arc<Mutex<Vec<u64>>>) -> Expect {
    Expect::reply(move |err, value, reply, _| {
        assert!(err.is_none(), "left side got error: {err:?}");
        let n = value.as_u64().unwrap();
        seen.lock().unwrap().push(n);
        let next = if n < 3 { left_cb(seen) } else { Expect::Nothing };
        reply.ok_then(json!(n + 1), next);
    })
}

fn right_cb(seen: Arc<Mutex<Vec<u64>>>) -> Expect {
    Expect::reply(move |err, value, reply, _| {
        assert!(err.is_none(), "right side got error: {err:?}");
        let n = value.as_u64().unwrap();
        seen.lock().unwrap().push(n);
        let next = if n < 4 { right_cb(seen) } else { Expect::Nothing };
        reply.ok_then(json!(n + 1), next);
    })
}

#[tokio::test(start_paused = true)]
async fn action_reply_chain() {
    let (left, right) = create_pair();
    let actions = Arc::new(AtomicUsize::new(0));
    let left_seen = Arc::new(Mutex::new(Vec::new()));
    let right_seen = Arc::new(Mutex::new(Vec::new()));

    {
        let actions = Arc::clone(&actions);
        let right_seen = Arc::clone(&right_seen);
        right.handlers().insert("beep", move |value, reply, _| {
            actions.fetch_add(1, Ordering::SeqCst);
            let n = value.as_u64().unwrap();
            reply.ok_then(json!(n + 1), right_cb(Arc::clone(&right_seen)));
        });
    }

    left.send("beep", Some(json!(0)), left_cb(Arc::clone(&left_seen)));

    assert_eq!(actions.load(Ordering::SeqCst), 1);
    assert_eq!(*left_seen.lock().unwrap(), vec![1, 3]);
    assert_eq!(*right_seen.lock().unwrap(), vec![2, 4]);
    assert_eq!(left.pending_count(), 0);
    assert_eq!(right.pending_count(), 0);

    // Nothing left to time out.
    tokio::time::sleep(TEST_TIMEOUT * 3).await;
    assert_eq!(left_seen.lock().unwrap().len(), 2);
    assert_eq!(right_seen.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out() {
    let (left, right) = create_pair();
    let got_event = Arc::new(AtomicUsize::new(0));
    {
        let got_event = Arc::clone(&got_event);
        right.handlers().insert("beep", move |value, _reply, _| {
            assert_eq!(value, Value::Null);
            got_event.fetch_add(1, Ordering::SeqCst);
        });
    }

    let (tx, rx) = oneshot::channel();
    left.send(
        "beep",
        None,
        Expect::reply(move |err, value, reply, _| {
            let _ = tx.send((err, value, reply.expects_reply()));
        }),
    );
    assert_eq!(left.pending_count(), 1);

    let (err, value, expects_reply) = rx.await.unwrap();
    assert_eq!(got_event.load(Ordering::SeqCst), 1);
    assert_eq!(err, Some(Fault::Local(JmsgError::Timeout)));
    assert_eq!(err.unwrap().message(), "Timeout");
    assert_eq!(value, Value::Null);
    assert!(!expects_reply);
    assert_eq!(left.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_action_and_reply_to_event() {
    let (left, right) = create_pair();
    let log = Arc::new(Mutex::new(Vec::new()));

    {
        let log = Arc::clone(&log);
        left.request("beep", Value::Null, move |err, _, _, _| {
            let err = err.expect("missing handler must error");
            assert!(err.is(ErrorCode::NoSuchAction));
            log.lock().unwrap().push(err.message().into_owned());
        });
    }

    {
        let log = Arc::clone(&log);
        right.handlers().insert("beep", move |_, reply: Continuation, _| {
            log.lock().unwrap().push("received".to_string());
            let log = Arc::clone(&log);
            reply.ok_then(
                Value::Null,
                Expect::reply(move |err, _, _, _| {
                    assert!(err.as_ref().unwrap().is(ErrorCode::NoReplyExpected));
                    log.lock().unwrap().push(err.unwrap().message().into_owned());
                }),
            );
        });
    }
    left.send("beep", None, Expect::Nothing);

    assert_eq!(
        *log.lock().unwrap(),
        vec!["No such action", "received", "No reply expected"]
    );
    assert_eq!(left.pending_count(), 0);
    assert_eq!(right.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn close_resolves_pending_exactly_once() {
    let (left, right) = create_pair();
    let good_calls = Arc::new(AtomicUsize::new(0));
    let bad_calls = Arc::new(AtomicUsize::new(0));
    let results = Arc::new(Mutex::new(Vec::new()));

    {
        let good_calls = Arc::clone(&good_calls);
        right.handlers().insert("good", move |_, reply: Continuation, _| {
            good_calls.fetch_add(1, Ordering::SeqCst);
            reply.ok(Value::Null);
        });
        let bad_calls = Arc::clone(&bad_calls);
        right.handlers().insert("bad", move |_, _, _| {
            bad_calls.fetch_add(1, Ordering::SeqCst);
        });
    }

    for action in ["good", "bad"] {
        let results = Arc::clone(&results);
        left.request(action, Value::Null, move |err, _, _, _| {
            results.lock().unwrap().push((action, code_of(&err)));
        });
    }
    assert_eq!(left.pending_count(), 1);

    left.close(None);
    assert!(left.is_closed());

    {
        let results = Arc::clone(&results);
        left.request("good", Value::Null, move |err, _, _, _| {
            results.lock().unwrap().push(("after-close", code_of(&err)));
        });
    }
    left.event("good", Value::Null);

    // A cancelled timer must not fire later.
    tokio::time::sleep(TEST_TIMEOUT * 5).await;

    assert_eq!(good_calls.load(Ordering::SeqCst), 1);
    assert_eq!(bad_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *results.lock().unwrap(),
        vec![
            ("good", None),
            ("bad", Some("CONNECTION_CLOSED".to_string())),
            ("after-close", Some("CONNECTION_CLOSED".to_string())),
        ]
    );
    assert_eq!(left.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn close_delivers_supplied_error() {
    let (c, sent) = recording();
    let (tx, rx) = oneshot::channel();
    c.request("beep", json!(1), move |err, _, _, _| {
        let _ = tx.send(err);
    });
    assert_eq!(sent.lock().unwrap().len(), 1);

    c.close(Some(Fault::Local(JmsgError::Internal("boom".into()))));
    let err = rx.await.unwrap().unwrap();
    assert_eq!(err.message(), "internal: boom");
    assert!(err.is(ErrorCode::Internal));

    c.closed().await;
}

#[tokio::test(start_paused = true)]
async fn late_reply_gets_unknown_sequence_number() {
    let (left, right) = create_pair();
    let stashed: Arc<Mutex<Option<Continuation>>> = Arc::new(Mutex::new(None));
    {
        let stashed = Arc::clone(&stashed);
        right.handlers().insert("slow", move |_, reply, _| {
            *stashed.lock().unwrap() = Some(reply);
        });
    }

    let (tx, rx) = oneshot::channel();
    left.request("slow", Value::Null, move |err, _, _, _| {
        let _ = tx.send(err);
    });
    let err = rx.await.unwrap().unwrap();
    assert!(err.is(ErrorCode::Timeout));

    let (tx, rx) = oneshot::channel();
    let reply = stashed.lock().unwrap().take().unwrap();
    reply.ok_then(
        json!("too late"),
        Expect::reply(move |err, _, _, _| {
            let _ = tx.send(err);
        }),
    );
    let err = rx.await.unwrap().unwrap();
    assert!(err.is(ErrorCode::UnknownSequenceNumber));
    assert_eq!(err.message(), "Unknown sequence number");
    assert_eq!(left.pending_count(), 0);
    assert_eq!(right.pending_count(), 0);
}

#[tokio::test]
async fn stray_replies_and_unknown_events() {
    let (c, sent) = recording();

    // No reply requested: silently dropped.
    c.dispatch(Envelope::reply(42, None, Some(json!(1))), None);
    c.dispatch(Envelope::action("nope", None), None);
    c.dispatch(Envelope::default(), None);
    assert!(sent.lock().unwrap().is_empty());

    let mut stray = Envelope::reply(42, None, None);
    stray.seq = Some(7);
    c.dispatch(stray, None);

    let mut unknown = Envelope::action("nope", None);
    unknown.seq = Some(8);
    c.dispatch(unknown, None);

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].reply_to, Some(7));
    assert_eq!(sent[0].seq, None);
    assert_eq!(sent[0].error.as_ref().unwrap()["code"], "UNKNOWN_SEQ");
    assert_eq!(sent[1].reply_to, Some(8));
    assert_eq!(sent[1].error.as_ref().unwrap()["message"], "No such action");
    assert_eq!(sent[1].error.as_ref().unwrap()["stack"], "Error: No such action");
}

#[tokio::test]
async fn handler_lookup_is_exact() {
    let (c, sent) = recording();
    c.handlers().insert("beep", |_, reply: Continuation, _| reply.ok(json!("ok")));
    assert!(c.handlers().contains("beep"));
    assert!(!c.handlers().contains("Beep"));
    assert_eq!(c.handlers().len(), 1);

    for (seq, name) in [(1, "Beep"), (2, "toString"), (3, "beep "), (4, "beep")] {
        let mut env = Envelope::action(name, None);
        env.seq = Some(seq);
        c.dispatch(env, None);
    }

    assert!(c.handlers().remove("beep"));
    assert!(c.handlers().is_empty());
    let mut env = Envelope::action("beep", None);
    env.seq = Some(5);
    c.dispatch(env, None);

    let sent = sent.lock().unwrap();
    let codes: Vec<_> = sent
        .iter()
        .map(|e| e.error.as_ref().map(|e| e["code"].as_str().unwrap().to_string()))
        .collect();
    assert_eq!(
        codes,
        vec![
            Some("NO_SUCH_ACTION".to_string()),
            Some("NO_SUCH_ACTION".to_string()),
            Some("NO_SUCH_ACTION".to_string()),
            None,
            Some("NO_SUCH_ACTION".to_string()),
        ]
    );
    assert_eq!(sent[3].value, Some(json!("ok")));
}

#[tokio::test(start_paused = true)]
async fn sequence_numbers_are_monotonic() {
    let (c, sent) = recording();
    for _ in 0..3 {
        c.request("beep", Value::Null, |_, _, _, _| {});
    }
    c.dispatch(Envelope::reply(2, None, None), None);
    c.request("beep", Value::Null, |_, _, _, _| {});
    c.event("beep", Value::Null);

    let seqs: Vec<_> = sent.lock().unwrap().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![Some(1), Some(2), Some(3), Some(4), None]);
    assert_eq!(c.pending_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn timeout_change_applies_to_new_calls_only() {
    let (c, _sent) = recording();
    let fired = Arc::new(Mutex::new(Vec::new()));

    for (name, timeout) in [("short", TEST_TIMEOUT), ("long", TEST_TIMEOUT * 10)] {
        c.set_timeout(timeout);
        let fired = Arc::clone(&fired);
        c.request(name, Value::Null, move |err, _, _, _| {
            assert!(err.unwrap().is(ErrorCode::Timeout));
            fired.lock().unwrap().push(name);
        });
    }
    assert_eq!(c.timeout(), TEST_TIMEOUT * 10);

    tokio::time::sleep(TEST_TIMEOUT * 2).await;
    assert_eq!(*fired.lock().unwrap(), vec!["short"]);
    assert_eq!(c.pending_count(), 1);

    tokio::time::sleep(TEST_TIMEOUT * 10).await;
    assert_eq!(*fired.lock().unwrap(), vec!["short", "long"]);
    assert_eq!(c.pending_count(), 0);
}

#[tokio::test]
async fn handles_travel_with_envelopes() {
    let (left, right) = create_pair();
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    right.handlers().insert("take", move |value, _, handle| {
        let port = handle.and_then(|h| {
            let port = h.downcast_ref::<u16>().copied();
            port
        });
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send((value, port));
        }
    });

    left.send_with_handle("take", Some(json!("sock")), Expect::Nothing, Some(Arc::new(8080u16)));
    assert_eq!(rx.await.unwrap(), (json!("sock"), Some(8080)));
}

#[tokio::test]
async fn dropping_last_correlator_resolves_pending() {
    let (c, _sent) = recording();
    let (tx, rx) = oneshot::channel();
    c.request("beep", Value::Null, move |err, _, _, _| {
        let _ = tx.send(err);
    });

    drop(c);
    let err = rx.await.unwrap().unwrap();
    assert!(err.is(ErrorCode::ConnectionClosed));
}

#[tokio::test(start_paused = true)]
async fn falsy_reply_error_means_success() {
    let (c, _sent) = recording();
    let results = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..5 {
        let results = Arc::clone(&results);
        c.request("beep", Value::Null, move |err, value, _, _| {
            let message = err.as_ref().map(|e| e.message().into_owned());
            results.lock().unwrap().push((message, value));
        });
    }

    let errors = [json!(false), json!(0), json!(""), json!(null), json!({ "message": "boom" })];
    for (seq, e) in (1..).zip(errors) {
        c.dispatch(Envelope::reply(seq, Some(e), Some(json!(seq))), None);
    }

    assert_eq!(
        *results.lock().unwrap(),
        vec![
            (None, json!(1)),
            (None, json!(2)),
            (None, json!(3)),
            (None, json!(4)),
            (Some("boom".to_string()), json!(5)),
        ]
    );
    assert_eq!(c.pending_count(), 0);
}

// Registered from a plain thread: the call must still time out.
#[test]
fn timeout_fires_without_a_runtime() {
    let (c, _sent) = recording();
    c.set_timeout(Duration::from_millis(10));

    let (tx, rx) = std::sync::mpsc::channel();
    c.request("beep", Value::Null, move |err, _, _, _| {
        let _ = tx.send(err);
    });

    let err = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(err.unwrap().is(ErrorCode::Timeout));
    assert_eq!(c.pending_count(), 0);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}
