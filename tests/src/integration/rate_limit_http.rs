//! # Rate-Limit Decisions over HTTP
//!
//! Per-channel publish buckets, the scoped ops window, auth ordering and
//! permissive fallback as seen by a client.

#[cfg(test)]
mod tests {
    use crate::integration::support::{authed, get, header, json, relay, request, test_config, TOKEN};
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use relay_gateway::RelayConfig;
    use relay_ratelimit::StoreMode;
    use tower::ServiceExt;

    fn ops_config(limit: u64) -> RelayConfig {
        let mut config = test_config();
        config.rate_limit.ops_limit = limit;
        config.rate_limit.ops_window_secs = 3600;
        config
    }

    #[tokio::test]
    async fn test_publish_bucket_drains_then_429() {
        let (_service, app) = relay(test_config());

        for expected in [4, 3, 2, 1, 0] {
            let response = app
                .clone()
                .oneshot(authed(Method::POST, "/publish/news", "{}"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(header(&response, "x-ratelimit-limit"), Some("5"));
            let body = json(response).await;
            assert_eq!(body["ok"], true);
            assert_eq!(body["remaining"], expected);
            assert_eq!(body["capacity"], 5);
        }

        let denied = app
            .clone()
            .oneshot(authed(Method::POST, "/publish/news", "{}"))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        // One token at 0.5/s.
        assert_eq!(header(&denied, "retry-after"), Some("2"));
        assert_eq!(header(&denied, "x-ratelimit-remaining"), Some("0"));
        let body = json(denied).await;
        assert_eq!(body["error"], "rate_limited");
        assert_eq!(body["retry_in_s"], 2);
    }

    #[tokio::test]
    async fn test_buckets_are_per_channel_and_client() {
        let (_service, app) = relay(test_config());
        for _ in 0..5 {
            app.clone()
                .oneshot(authed(Method::POST, "/publish/news", "{}"))
                .await
                .unwrap();
        }

        let other_channel = app
            .clone()
            .oneshot(authed(Method::POST, "/publish/sports", "{}"))
            .await
            .unwrap();
        assert_eq!(other_channel.status(), StatusCode::OK);

        let other_client = request(Method::POST, "/publish/news")
            .header("x-forwarded-for", "203.0.113.99")
            .header("x-api-key", TOKEN)
            .body(Body::from("{}"))
            .unwrap();
        let response = app.clone().oneshot(other_client).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unauthorized_publish_consumes_nothing() {
        let (_service, app) = relay(test_config());

        for key in [None, Some("wrong")] {
            let mut builder = request(Method::POST, "/publish/news");
            if let Some(key) = key {
                builder = builder.header("x-api-key", key);
            }
            let response = app
                .clone()
                .oneshot(builder.body(Body::from("{}")).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(json(response).await["error"], "unauthorized");
        }

        let response = app
            .clone()
            .oneshot(authed(Method::POST, "/publish/news", "{}"))
            .await
            .unwrap();
        assert_eq!(json(response).await["remaining"], 4);
    }

    #[tokio::test]
    async fn test_bearer_token_accepted() {
        let (_service, app) = relay(test_config());
        let req = request(Method::POST, "/publish/news")
            .header("authorization", format!("Bearer {TOKEN}"))
            .body(Body::from(r#"{"text":"hi"}"#))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_publish_body_is_400() {
        let (_service, app) = relay(test_config());
        for (uri, body) in [
            ("/publish/news", "not json"),
            ("/publish/news", "[1,2,3]"),
            ("/publish/bad%20name", "{}"),
        ] {
            let response = app
                .clone()
                .oneshot(authed(Method::POST, uri, body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri} {body}");
            assert_eq!(json(response).await["error"], "bad_request");
        }
    }

    #[tokio::test]
    async fn test_ops_limit_check_reports_before_and_after() {
        let (_service, app) = relay(ops_config(10));

        // The middleware takes one unit before the endpoint's own cost.
        let first = app
            .clone()
            .oneshot(authed(Method::POST, "/ops/ratelimit/test?cost=3", ""))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(header(&first, "x-ratelimit-remaining"), Some("6"));
        let body = json(first).await;
        assert_eq!(body["algorithm"], "fixed_window");
        assert_eq!(body["before"], 9);
        assert_eq!(body["after"], 6);

        let second = app
            .clone()
            .oneshot(authed(Method::POST, "/ops/ratelimit/test?cost=3", ""))
            .await
            .unwrap();
        let body = json(second).await;
        assert_eq!(body["before"], 5);
        assert_eq!(body["after"], 2);

        let third = app
            .clone()
            .oneshot(authed(Method::POST, "/ops/ratelimit/test?cost=3", ""))
            .await
            .unwrap();
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(header(&third, "retry-after").is_some());
    }

    #[tokio::test]
    async fn test_ops_limit_check_rejects_bad_cost() {
        let (_service, app) = relay(ops_config(10));
        let response = app
            .oneshot(authed(Method::POST, "/ops/ratelimit/test?cost=0", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ops_window_blocks_before_handler() {
        let (service, app) = relay(ops_config(2));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(authed(Method::POST, "/ops/broadcast", r#"{"type":"ping"}"#))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let denied = app
            .clone()
            .oneshot(authed(Method::POST, "/ops/broadcast", r#"{"type":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(header(&denied, "retry-after").is_some());

        // Only the two admitted broadcasts were published.
        assert_eq!(service.state().bus.recent(10, None).len(), 2);
    }

    #[tokio::test]
    async fn test_unscoped_routes_carry_no_headers() {
        let (_service, app) = relay(ops_config(1));
        for _ in 0..3 {
            let response = app.clone().oneshot(get("/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(header(&response, "x-ratelimit-limit").is_none());
        }
    }

    #[tokio::test]
    async fn test_without_store_limits_are_permissive() {
        let mut config = ops_config(1);
        config.rate_limit.store = StoreMode::Redis;
        let (_service, app) = relay(config);

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(authed(Method::POST, "/ops/ratelimit/test", ""))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(header(&response, "x-ratelimit-remaining"), Some("unlimited"));
        }

        let health = json(app.oneshot(get("/health")).await.unwrap()).await;
        assert_eq!(health["rate_limit"]["store"], "redis");
        assert_eq!(health["rate_limit"]["limiter_degraded"], true);
    }
}
