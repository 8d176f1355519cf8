//! # Channel Limits
//!
//! Reading, updating and first-use announcement of per-channel bucket
//! limits.

#[cfg(test)]
mod tests {
    use crate::integration::support::{authed, get, json, relay, request, test_config};
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_defaults_on_first_read() {
        let (_service, app) = relay(test_config());
        let response = app
            .oneshot(get("/channels/news/limits"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["channel"], "news");
        assert_eq!(body["capacity"], 5);
        assert_eq!(body["refill_per_sec"], 0.5);
    }

    #[tokio::test]
    async fn test_first_use_announced_once() {
        let (service, app) = relay(test_config());
        for _ in 0..3 {
            app.clone()
                .oneshot(get("/channels/news/limits"))
                .await
                .unwrap();
        }

        let announcements: Vec<_> = service
            .state()
            .bus
            .recent(10, Some("news"))
            .into_iter()
            .filter(|e| e.event_type == "system")
            .collect();
        assert_eq!(announcements.len(), 1);
        assert_eq!(
            announcements[0].payload["message"],
            "New channel `news` opened"
        );
        assert_eq!(announcements[0].payload["capacity"], 5);
    }

    #[tokio::test]
    async fn test_update_changes_publish_capacity() {
        let (_service, app) = relay(test_config());

        let response = app
            .clone()
            .oneshot(authed(
                Method::PUT,
                "/channels/news/limits",
                r#"{"capacity":2,"refill_per_sec":0.1}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["ok"], true);

        let read = json(
            app.clone()
                .oneshot(get("/channels/news/limits"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(read["capacity"], 2);

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(authed(Method::POST, "/publish/news", "{}"))
                .await
                .unwrap();
            statuses.push(response.status());
        }
        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        );
    }

    #[tokio::test]
    async fn test_legacy_refill_rate_field_accepted() {
        let (_service, app) = relay(test_config());
        let response = app
            .clone()
            .oneshot(authed(
                Method::PUT,
                "/channels/news/limits",
                r#"{"capacity":8,"refill_rate":2.0}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["refill_per_sec"], 2.0);
    }

    #[tokio::test]
    async fn test_invalid_limits_rejected() {
        let (_service, app) = relay(test_config());
        for body in [
            r#"{"capacity":0,"refill_per_sec":1.0}"#,
            r#"{"capacity":3,"refill_per_sec":0}"#,
            r#"{"capacity":3}"#,
        ] {
            let response = app
                .clone()
                .oneshot(authed(Method::PUT, "/channels/news/limits", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        }
    }

    #[tokio::test]
    async fn test_update_requires_token() {
        let (_service, app) = relay(test_config());
        let req = request(Method::PUT, "/channels/news/limits")
            .body(Body::from(r#"{"capacity":50,"refill_per_sec":5.0}"#))
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let read = json(app.oneshot(get("/channels/news/limits")).await.unwrap()).await;
        assert_eq!(read["capacity"], 5);
    }
}
