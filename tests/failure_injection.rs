//! Failure injection: failing and panicking handlers never take the worker down.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use http_front::pipeline::{handler_fn, Flow};
use rand::Rng;

mod common;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Injected {
    None,
    Error,
    Panic,
}

impl Injected {
    fn header(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Error => "error",
            Self::Panic => "panic",
        }
    }
}

#[tokio::test]
async fn random_handler_failures_yield_one_500_each() {
    let completed = Arc::new(AtomicU32::new(0));
    let after_runs = completed.clone();

    let (mut component, base) = common::start_component(common::test_config(), |builder| {
        builder.routes(move |routes| {
            let after_runs = after_runs.clone();
            routes.route(
                "/trial",
                vec![
                    // First step answers, second may fail mid-chain.
                    handler_fn(|ctx| {
                        ctx.respond(StatusCode::OK, "partial");
                        Ok(Flow::Next)
                    }),
                    handler_fn(|ctx| match ctx.header("x-inject") {
                        Some("error") => Err("injected failure".into()),
                        Some("panic") => panic!("injected panic"),
                        _ => {
                            ctx.respond(StatusCode::OK, "done");
                            Ok(Flow::Next)
                        }
                    }),
                    handler_fn(move |_| {
                        after_runs.fetch_add(1, Ordering::SeqCst);
                        Ok(Flow::Next)
                    }),
                ],
            );
        })
    })
    .await;

    let plan: Vec<Injected> = {
        let mut rng = rand::thread_rng();
        (0..100)
            .map(|_| match rng.gen_range(0..3) {
                0 => Injected::None,
                1 => Injected::Error,
                _ => Injected::Panic,
            })
            .collect()
    };

    let client = common::client();
    let mut failures = 0;
    for injected in &plan {
        let res = client
            .get(format!("{base}/trial"))
            .header("x-inject", injected.header())
            .send()
            .await
            .expect("worker stays up");

        if *injected == Injected::None {
            assert_eq!(res.status(), 200);
            assert_eq!(res.text().await.unwrap(), "done");
        } else {
            failures += 1;
            assert_eq!(res.status(), 500);
            let body: serde_json::Value = res.json().await.unwrap();
            assert_eq!(body["error"], "HandlerFailure");
        }
    }

    let successes = plan.iter().filter(|i| **i == Injected::None).count() as u32;
    assert_eq!(completed.load(Ordering::SeqCst), successes);
    assert_eq!(failures + successes as usize, plan.len());

    // Still serving after every failure.
    let res = client
        .get(format!("{base}/trial"))
        .header("x-inject", "none")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    component.stop(false).await.unwrap();
}
