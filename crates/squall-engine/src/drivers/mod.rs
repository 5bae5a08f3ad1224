use crate::{DriverRegistry, EngineConfig};
use std::sync::Arc;

pub mod http;
pub mod schema;

pub use http::HttpChaosDriver;
pub use schema::{known_action, required_parameters, ParamKind, ParamSpec};

/// Builds the production registry: one HTTP driver per configured service
/// endpoint, each validating against the built-in parameter schemas.
pub fn http_registry(config: &EngineConfig, client: reqwest::Client) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    for (service, endpoint) in &config.services {
        registry.register_service(
            service.clone(),
            Arc::new(HttpChaosDriver::new(
                client.clone(),
                service.clone(),
                endpoint.clone(),
            )),
        );
    }
    registry
}
