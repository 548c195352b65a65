use crate::{flow::SaveSubscriptionFlow, GlobalConfig};
use push_client::{SAVE_SUBSCRIPTION_URL, SERVICE_WORKER_URL};
use serde::Serialize;
use snafu::{ResultExt, Snafu};
use std::{convert::Infallible, error::Error as _};
use tracing::{error, info};
use warp::{
    filters::BoxedFilter,
    http::{header, StatusCode},
    hyper::body::Bytes,
    reject, reply, Filter, Rejection, Reply,
};

const MAX_SUBSCRIPTION_BYTES: u64 = 16 * 1024;

const SERVICE_WORKER_SCRIPT: &str = r#"importScripts('/pkg/push_client.js');

const ready = wasm_bindgen('/pkg/push_client_bg.wasm');

self.addEventListener('push', event => {
    event.waitUntil(ready.then(() => wasm_bindgen.onPush(self, event)));
});
"#;

pub(crate) async fn serve(config: GlobalConfig, save_flow: SaveSubscriptionFlow) {
    let routes = routes(config, save_flow);

    info!("Starting web server at {}", &config.listen_address);
    warp::serve(routes).run(config.listen_address).await
}

fn routes(config: GlobalConfig, save_flow: SaveSubscriptionFlow) -> BoxedFilter<(impl Reply,)> {
    let root = warp::path::end()
        .and(warp::get())
        .map(move || reply::html(html::root(config.vapid_public_key.as_deref()).into_string()));

    let assets = warp::path("pkg").and(warp::fs::dir(config.asset_directory.clone()));

    let routes = root
        .or(service_worker())
        .or(assets)
        .or(save_subscription(save_flow));

    routes.recover(report_invalid).boxed()
}

fn service_worker() -> BoxedFilter<(impl Reply,)> {
    warp::path(SERVICE_WORKER_URL.trim_start_matches('/'))
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            let r = reply::with_header(
                SERVICE_WORKER_SCRIPT,
                header::CONTENT_TYPE,
                "application/javascript; charset=utf-8",
            );
            reply::with_header(r, header::CACHE_CONTROL, "no-cache")
        })
        .boxed()
}

#[derive(Debug, Serialize)]
struct Saved {
    success: bool,
}

fn save_subscription(flow: SaveSubscriptionFlow) -> BoxedFilter<(impl Reply,)> {
    warp::path(SAVE_SUBSCRIPTION_URL.trim_start_matches('/'))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_SUBSCRIPTION_BYTES))
        .and(warp::body::bytes())
        .and_then(move |body: Bytes| {
            let mut flow = flow.clone();
            async move {
                flow.save(&body).await.context(UnableToSaveSubscriptionSnafu)?;

                Ok::<_, Rejection>(reply::with_status(
                    reply::json(&Saved { success: true }),
                    StatusCode::CREATED,
                ))
            }
        })
        .boxed()
}

#[derive(Debug, Serialize)]
struct Failure {
    error: String,
}

async fn report_invalid(r: Rejection) -> Result<impl Reply, Infallible> {
    let internal = || {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            String::from("An internal error occurred"),
        )
    };

    let (status, message) = if let Some(e) = r.find::<Error>() {
        match e {
            Error::UnableToSaveSubscription { source } if source.is_client_error() => {
                (StatusCode::BAD_REQUEST, source.to_string())
            }
            Error::UnableToSaveSubscription { source } => {
                match source.source() {
                    Some(cause) => error!("Unhandled web UI error: {}: {}", source, cause),
                    None => error!("Unhandled web UI error: {}", source),
                }
                internal()
            }
        }
    } else if r.find::<reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            String::from("Method not allowed"),
        )
    } else if r.find::<reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            String::from("The subscription is too large"),
        )
    } else if r.find::<reject::LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            String::from("A content-length is required"),
        )
    } else if r.is_not_found() {
        (StatusCode::NOT_FOUND, String::from("Not found"))
    } else {
        error!("Unhandled web UI error: {:?}", r);
        internal()
    };

    Ok(reply::with_status(
        reply::json(&Failure { error: message }),
        status,
    ))
}

#[derive(Debug, Snafu)]
enum Error {
    UnableToSaveSubscription { source: crate::flow::Error },
}

impl warp::reject::Reject for Error {}

mod html {
    use maud::{html, Markup, PreEscaped};

    const CLIENT_SCRIPT: &str = "/pkg/push_client.js";
    const CLIENT_MODULE: &str = "/pkg/push_client_bg.wasm";

    pub fn root(vapid_public_key: Option<&str>) -> Markup {
        page(|| {
            html! {
                h1 { "Push notifications" }
                @if vapid_public_key.is_some() {
                    p { "Allow notifications when your browser asks to receive updates on this device." }
                } @else {
                    p { "Push notifications are not configured on this server." }
                }
                script src=(CLIENT_SCRIPT) {}
                script { (PreEscaped(start_script(vapid_public_key))) }
            }
        })
    }

    fn start_script(vapid_public_key: Option<&str>) -> String {
        let key = match vapid_public_key {
            Some(k) => serde_json::Value::from(k).to_string(),
            None => String::from("null"),
        };
        // Keep the literal from closing the surrounding element
        let key = key.replace("</", "<\\/");

        format!(
            "wasm_bindgen('{}').then(() => wasm_bindgen.start({}));",
            CLIENT_MODULE, key
        )
    }

    fn page(body: impl FnOnce() -> Markup) -> Markup {
        html! {
            (maud::DOCTYPE)
                html {
                    head {
                        meta charset="utf-8";
                        title { "Push Relay" }
                    }
                    body {
                        (body())
                    }
                }
        }
    }

}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::Config,
        database::{self, test::memory_db, DbHandle},
        flow::BootFlow,
    };
    use warp::test::request;

    const VAPID_KEY: &str =
        "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U";

    const SUBSCRIPTION: &str = r#"{"endpoint":"https://push.example.com/send/abc","expirationTime":null,"keys":{"auth":"tBHItJI5svbpez7KI4CCXg","p256dh":"BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U"}}"#;

    async fn app(vapid_public_key: Option<&str>) -> (BoxedFilter<(impl Reply,)>, DbHandle) {
        let config = Config {
            database_url: ":memory:".into(),
            listen_address: ([127, 0, 0, 1], 0).into(),
            vapid_public_key: vapid_public_key.map(Into::into),
            asset_directory: "push-client/pkg".into(),
        };
        let config = &*Box::leak(Box::new(config));

        let (db, _task) = database::spawn(memory_db());
        BootFlow::new(db.clone()).boot().await.unwrap();

        (routes(config, SaveSubscriptionFlow::new(db.clone())), db)
    }

    fn body_json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn root_starts_the_client_with_the_key() {
        let (routes, _db) = app(Some(VAPID_KEY)).await;

        let res = request().path("/").reply(&routes).await;

        assert_eq!(res.status(), StatusCode::OK);
        let body = String::from_utf8(res.body().to_vec()).unwrap();
        assert!(body.contains(r#"<script src="/pkg/push_client.js">"#));
        assert!(body.contains(&format!("wasm_bindgen.start(\"{}\")", VAPID_KEY)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn root_without_a_key_starts_the_client_with_null() {
        let (routes, _db) = app(None).await;

        let res = request().path("/").reply(&routes).await;

        let body = String::from_utf8(res.body().to_vec()).unwrap();
        assert!(body.contains("wasm_bindgen.start(null)"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serves_the_service_worker_script() {
        let (routes, _db) = app(Some(VAPID_KEY)).await;

        let res = request().path("/service-worker.js").reply(&routes).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()[header::CONTENT_TYPE],
            "application/javascript; charset=utf-8"
        );
        assert_eq!(res.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(res.body().as_ref(), SERVICE_WORKER_SCRIPT.as_bytes());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn saves_a_subscription() {
        let (routes, mut db) = app(Some(VAPID_KEY)).await;

        let res = request()
            .method("POST")
            .path("/save-subscription")
            .header("content-type", "application/json")
            .body(SUBSCRIPTION)
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(body_json(res.body()), serde_json::json!({ "success": true }));

        let saved = db.subscriptions().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].endpoint.0.as_str(), "https://push.example.com/send/abc");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resubscribing_replaces_the_subscription() {
        let (routes, mut db) = app(Some(VAPID_KEY)).await;

        for _ in 0..2 {
            let res = request()
                .method("POST")
                .path("/save-subscription")
                .body(SUBSCRIPTION)
                .reply(&routes)
                .await;
            assert_eq!(res.status(), StatusCode::CREATED);
        }

        assert_eq!(db.subscriptions().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_body_is_a_bad_request() {
        let (routes, mut db) = app(Some(VAPID_KEY)).await;

        let res = request()
            .method("POST")
            .path("/save-subscription")
            .body("")
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(res.body()),
            serde_json::json!({ "error": "No subscription data received" })
        );
        assert!(db.subscriptions().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_object_is_missing_data() {
        let (routes, _db) = app(Some(VAPID_KEY)).await;

        let res = request()
            .method("POST")
            .path("/save-subscription")
            .body("{}")
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(res.body()),
            serde_json::json!({ "error": "No subscription data received" })
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_subscription_is_a_bad_request() {
        let (routes, _db) = app(Some(VAPID_KEY)).await;

        let res = request()
            .method("POST")
            .path("/save-subscription")
            .body(r#"{"endpoint":"https://push.example.com/x"}"#)
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn oversized_body_is_rejected() {
        let (routes, _db) = app(Some(VAPID_KEY)).await;

        let res = request()
            .method("POST")
            .path("/save-subscription")
            .body(vec![b' '; MAX_SUBSCRIPTION_BYTES as usize + 1])
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_requires_post() {
        let (routes, _db) = app(Some(VAPID_KEY)).await;

        let res = request()
            .method("GET")
            .path("/save-subscription")
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_paths_are_not_found() {
        let (routes, _db) = app(Some(VAPID_KEY)).await;

        let res = request().path("/send-push-test").reply(&routes).await;

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
