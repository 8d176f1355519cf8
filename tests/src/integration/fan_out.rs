//! # Publish → Bus → SSE Fan-out
//!
//! A message published over HTTP reaches every open stream, each in
//! publish order, and channel streams see only their channel.

#[cfg(test)]
mod tests {
    use crate::integration::support::{authed, get, json, relay, test_config};
    use axum::body::BodyDataStream;
    use axum::http::{Method, StatusCode};
    use axum::Router;
    use futures::StreamExt;
    use relay_bus::EventEnvelope;
    use relay_gateway::stream::HELLO_CHUNK;
    use std::time::Duration;
    use tokio::time::timeout;
    use tower::ServiceExt;

    async fn open_stream(app: &Router, uri: &str) -> BodyDataStream {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");

        let mut body = response.into_body().into_data_stream();
        assert_eq!(next_frame(&mut body).await, HELLO_CHUNK);
        body
    }

    async fn next_frame(body: &mut BodyDataStream) -> String {
        let chunk = timeout(Duration::from_secs(2), body.next())
            .await
            .expect("frame timeout")
            .expect("stream ended")
            .expect("body error");
        String::from_utf8(chunk.to_vec()).unwrap()
    }

    /// Parse `data: <json>\n\n`.
    fn frame_json(frame: &str) -> serde_json::Value {
        let data = frame
            .strip_prefix("data: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .expect("data frame");
        serde_json::from_str(data).unwrap()
    }

    #[tokio::test]
    async fn test_publish_reaches_every_stream_in_order() {
        let (service, app) = relay(test_config());
        let mut streams = Vec::new();
        for _ in 0..3 {
            streams.push(open_stream(&app, "/stream").await);
        }
        assert_eq!(service.state().bus.subscriber_count(), Some(3));

        // The first publish opens the channel and emits a system event.
        for n in 0..3 {
            let body = format!(r#"{{"n":{n}}}"#);
            let response = app
                .clone()
                .oneshot(authed(Method::POST, "/publish/news", &body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        for stream in &mut streams {
            let opened = frame_json(&next_frame(stream).await);
            assert_eq!(opened["type"], "system");
            assert_eq!(opened["payload"]["channel"], "news");

            for n in 0..3 {
                let event = frame_json(&next_frame(stream).await);
                assert_eq!(event["type"], "message");
                assert_eq!(event["payload"]["n"], n);
                assert_eq!(event["payload"]["channel"], "news");
            }
        }
    }

    #[tokio::test]
    async fn test_channel_stream_filters() {
        let (_service, app) = relay(test_config());
        let mut sports = open_stream(&app, "/stream/sports").await;

        for channel in ["news", "sports"] {
            let uri = format!("/publish/{channel}");
            let response = app
                .clone()
                .oneshot(authed(Method::POST, &uri, r#"{"text":"x"}"#))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        // Only sports events: its opening notice, then its message.
        let opened = frame_json(&next_frame(&mut sports).await);
        assert_eq!(opened["type"], "system");
        assert_eq!(opened["payload"]["channel"], "sports");

        let message = frame_json(&next_frame(&mut sports).await);
        assert_eq!(message["type"], "message");
        assert_eq!(message["payload"]["channel"], "sports");
    }

    #[tokio::test]
    async fn test_operator_broadcast_reaches_streams() {
        let (_service, app) = relay(test_config());
        let mut stream = open_stream(&app, "/stream").await;

        let response = app
            .clone()
            .oneshot(authed(
                Method::POST,
                "/ops/broadcast",
                r#"{"type":"maintenance","payload":{"minutes":5}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["type"], "maintenance");

        let event = frame_json(&next_frame(&mut stream).await);
        assert_eq!(event["type"], "maintenance");
        assert_eq!(event["payload"]["minutes"], 5);
    }

    #[tokio::test]
    async fn test_closed_stream_releases_subscription() {
        let (service, app) = relay(test_config());
        let stream = open_stream(&app, "/stream").await;
        assert_eq!(service.state().bus.subscriber_count(), Some(1));

        drop(stream);
        timeout(Duration::from_secs(2), async {
            while service.state().streams.active() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("stream not released");
        assert_eq!(service.state().bus.subscriber_count(), Some(0));
    }

    #[tokio::test]
    async fn test_recent_events_newest_first() {
        let (_service, app) = relay(test_config());
        for n in 0..4 {
            let body = format!(r#"{{"n":{n}}}"#);
            app.clone()
                .oneshot(authed(Method::POST, "/publish/news", &body))
                .await
                .unwrap();
        }

        let response = app
            .clone()
            .oneshot(get("/events/recent?limit=2&channel=news"))
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["events"][0]["payload"]["n"], 3);
        assert_eq!(body["events"][1]["payload"]["n"], 2);
    }

    #[tokio::test]
    async fn test_recent_limit_follows_configured_ring() {
        let mut config = test_config();
        config.bus.recent_events = 150;
        let (service, app) = relay(config);
        for n in 0..160 {
            service
                .state()
                .bus
                .publish(EventEnvelope::new("message").field("n", n))
                .await
                .unwrap();
        }

        let response = app
            .clone()
            .oneshot(get("/events/recent?limit=500"))
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["count"], 150);
        assert_eq!(body["events"][0]["payload"]["n"], 159);
        assert_eq!(body["events"][149]["payload"]["n"], 10);
    }

    #[tokio::test]
    async fn test_stream_after_shutdown_is_unavailable() {
        let (mut service, app) = relay(test_config());
        service.shutdown().await;

        let response = app.clone().oneshot(get("/stream")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(response).await["error"], "unavailable");
    }
}
