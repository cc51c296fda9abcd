//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;

use http_front::cluster::Role;
use http_front::{HttpComponent, HttpComponentBuilder, HttpConfig};

/// Config bound to an ephemeral localhost port.
pub fn test_config() -> HttpConfig {
    let mut config = HttpConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.timeouts.grace_period_ms = 1_000;
    config
}

/// Build, start and after-start a single-process component.
pub async fn start_component(
    config: HttpConfig,
    configure: impl FnOnce(HttpComponentBuilder) -> HttpComponentBuilder,
) -> (HttpComponent, String) {
    let builder = HttpComponent::builder(config).role(Role::Single);
    let mut component = configure(builder).build().await.expect("component builds");
    component.start().await.expect("component starts");
    component.after_start().await.expect("after_start succeeds");

    let addr: SocketAddr = component.local_addr().expect("component is listening");
    (component, format!("http://{addr}"))
}

/// Non-pooled client so every request opens a fresh connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .expect("client builds")
}
