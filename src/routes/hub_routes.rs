use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::FormRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use futures::stream;

use crate::errors::HubError;
use crate::services::hub::{HubController, HubForm, HubRequest, ResponseGate};

/// The single hub endpoint.
pub fn routes(hub: Arc<HubController>) -> Router {
    Router::new()
        .route("/", post(handle_hub))
        .with_state(hub)
}

//
// ─────────────────────────────────────────────────────────────
// POST /
// hub.mode = subscribe | unsubscribe  -> 202, verification runs detached
// hub.mode = publish                  -> 200 with delivery report
// ─────────────────────────────────────────────────────────────
//
async fn handle_hub(
    State(hub): State<Arc<HubController>>,
    form: Result<Form<HubForm>, FormRejection>,
) -> Result<Response, HubError>
{
    let Form(form) = form.map_err(form_rejection)?;

    match form.validate(hub.default_lease_seconds())? {
        HubRequest::Intent(intent) => {
            tracing::debug!(
                mode = %intent.mode,
                topic = %intent.topic,
                callback = %intent.callback,
                "Scheduling intent verification"
            );
            let gate = hub.schedule(intent);
            Ok(accepted(gate))
        }
        HubRequest::Publish { topic } => {
            let report = hub.publish(&topic).await?;
            Ok(Json(report).into_response())
        }
    }
}

/// 202 whose body releases `gate` once the server starts writing it out,
/// or when the response is dropped unsent.
fn accepted(gate: ResponseGate) -> Response {
    let body = stream::once(async move {
        drop(gate);
        Ok::<_, Infallible>(Bytes::from_static(b"Accepted, verification pending"))
    });

    (
        StatusCode::ACCEPTED,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}

fn form_rejection(rejection: FormRejection) -> HubError {
    match rejection {
        FormRejection::InvalidFormContentType(_) => HubError::UnsupportedContentType,
        other => HubError::MalformedForm(other.body_text()),
    }
}

#[cfg(test)]
mod tests {
    use axum_test::TestServer;

    use super::*;
    use crate::config::AppConfig;
    use crate::state::subscriptions::SubscriptionStore;

    fn server() -> TestServer {
        let cfg = AppConfig::from_json(r#"{ "port": 8080, "request_timeout_secs": 1 }"#).unwrap();
        let hub = Arc::new(HubController::from_config(&cfg, Arc::new(SubscriptionStore::in_memory())));
        TestServer::new(routes(hub)).unwrap()
    }

    #[tokio::test]
    async fn json_body_is_a_bad_request() {
        let resp = server()
            .post("/")
            .json(&serde_json::json!({ "hub.mode": "subscribe" }))
            .await;

        resp.assert_status(StatusCode::BAD_REQUEST);
        assert!(resp.text().contains("application/x-www-form-urlencoded"));
    }

    #[tokio::test]
    async fn plain_text_body_is_a_bad_request() {
        let resp = server().post("/").text("hub.mode=subscribe").await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_mode_is_a_bad_request() {
        let resp = server().post("/").form(&[("hub.mode", "renew")]).await;

        resp.assert_status(StatusCode::BAD_REQUEST);
        assert!(resp.text().contains("renew"));
    }

    #[tokio::test]
    async fn invalid_lease_is_a_bad_request() {
        let resp = server()
            .post("/")
            .form(&[
                ("hub.mode", "subscribe"),
                ("hub.topic", "https://example.com/feed"),
                ("hub.callback", "https://sub.example/cb"),
                ("hub.lease_seconds", "soon"),
            ])
            .await;

        resp.assert_status(StatusCode::BAD_REQUEST);
        assert!(resp.text().contains("hub.lease_seconds"));
    }

    #[tokio::test]
    async fn unparsable_callback_is_a_bad_request() {
        let resp = server()
            .post("/")
            .form(&[
                ("hub.mode", "subscribe"),
                ("hub.topic", "https://example.com/feed"),
                ("hub.callback", "nope"),
            ])
            .await;

        resp.assert_status(StatusCode::BAD_REQUEST);
        assert!(resp.text().contains("hub.callback"));
    }

    #[tokio::test]
    async fn form_with_charset_is_accepted() {
        let resp = server()
            .post("/")
            .bytes("hub.mode=unsubscribe&hub.topic=https%3A%2F%2Fexample.com%2Ffeed&hub.callback=http%3A%2F%2F127.0.0.1%3A9%2Fcb".into())
            .content_type("application/x-www-form-urlencoded; charset=utf-8")
            .await;

        resp.assert_status(StatusCode::ACCEPTED);
        assert_eq!(resp.text(), "Accepted, verification pending");
    }

    #[tokio::test]
    async fn unreachable_topic_publish_is_a_bad_gateway() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let topic = format!("http://{addr}/feed");
        let resp = server()
            .post("/")
            .form(&[("hub.mode", "publish"), ("hub.topic", topic.as_str())])
            .await;

        resp.assert_status(StatusCode::BAD_GATEWAY);
    }
}
