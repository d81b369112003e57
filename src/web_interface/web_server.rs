use log::info;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use warp::Filter;

use super::routes::{
    container_action_route, container_logs_route, create_container_route,
    delete_container_route, list_containers_route, stats_route,
};
use crate::configuration::ServerConfig;
use crate::error_handling::types::WebError;
use crate::tenancy::ContainerService;

/// Web server for the container JSON API
pub struct WebServer {
    service: Arc<ContainerService>,
    addr: SocketAddr,
}

impl WebServer {
    /// Create a new WebServer bound to the configured address
    pub fn new(service: Arc<ContainerService>, config: &ServerConfig) -> Result<Self, WebError> {
        Ok(Self {
            service,
            addr: bind_address(config)?,
        })
    }

    /// Serve requests until the process is stopped
    pub async fn start(&self) -> Result<(), WebError> {
        let routes = list_containers_route(self.service.clone())
            .or(create_container_route(self.service.clone()))
            .or(container_action_route(self.service.clone()))
            .or(delete_container_route(self.service.clone()))
            .or(container_logs_route(self.service.clone()))
            .or(stats_route(self.service.clone()))
            .with(warp::log("berth::web"));

        info!("Serving container API on http://{}", self.addr);
        warp::serve(routes).run(self.addr).await;
        Ok(())
    }
}

fn bind_address(config: &ServerConfig) -> Result<SocketAddr, WebError> {
    let ip: IpAddr = config
        .bind_address
        .parse()
        .map_err(|_| WebError::BadBindAddress(config.bind_address.clone()))?;
    Ok(SocketAddr::new(ip, config.port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_address_from_config() {
        let config = ServerConfig {
            bind_address: "127.0.0.1".into(),
            port: 5050,
            public_host: "localhost".into(),
        };
        assert_eq!(
            bind_address(&config).unwrap(),
            "127.0.0.1:5050".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn hostname_is_not_a_bind_address() {
        let config = ServerConfig {
            bind_address: "example.com".into(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            bind_address(&config),
            Err(WebError::BadBindAddress(_))
        ));
    }
}
