//! Cross-crate flows driven through the gateway router.
//!
//! Every test builds a relay on the in-memory stack (local bus, memory
//! limiters) and calls the router in-process.

pub mod channels;
pub mod fan_out;
pub mod rate_limit_http;

#[cfg(test)]
pub(crate) mod support {
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use axum::response::Response;
    use axum::Router;
    use relay_gateway::{RelayConfig, RelayService};
    use relay_ratelimit::StoreMode;
    use serde_json::Value;

    pub const TOKEN: &str = "test-token";
    pub const CLIENT_IP: &str = "198.51.100.20";

    pub fn test_config() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.rate_limit.store = StoreMode::Memory;
        config.auth.publish_token = Some(TOKEN.to_string());
        config
    }

    /// Service and router over the in-memory stack.
    pub fn relay(config: RelayConfig) -> (RelayService, Router) {
        let service = RelayService::new(config).expect("valid config");
        let router = service.router();
        (service, router)
    }

    pub fn request(method: Method, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", CLIENT_IP)
    }

    pub fn authed(method: Method, uri: &str, body: &str) -> Request<Body> {
        request(method, uri)
            .header("x-api-key", TOKEN)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn get(uri: &str) -> Request<Body> {
        request(Method::GET, uri).body(Body::empty()).unwrap()
    }

    pub async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }
}
