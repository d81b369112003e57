use log::{error, warn};
use std::convert::Infallible;
use std::sync::Arc;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::{ActionResponse, ApiError, ContainerView, CreateContainerRequest, LogsResponse};
use crate::error_handling::types::ServiceError;
use crate::storage::User;
use crate::tenancy::ContainerService;

/// Header carrying the authenticated user id, set by the upstream auth layer.
pub const CALLER_HEADER: &str = "x-user-id";

/// HTTP status returned for a failed intent.
pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Unauthorized => StatusCode::FORBIDDEN,
        ServiceError::PortsExhausted(_) | ServiceError::InvalidName(_) => StatusCode::BAD_REQUEST,
        ServiceError::NameTaken(_) => StatusCode::CONFLICT,
        ServiceError::Provision(_)
        | ServiceError::OperationFailed(_)
        | ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_error(message: &str, status: StatusCode) -> reply::Response {
    reply::with_status(
        reply::json(&ApiError {
            error: message.to_string(),
        }),
        status,
    )
    .into_response()
}

/// Logs the detailed error and replies with its public message only.
fn error_reply(err: &ServiceError) -> reply::Response {
    let status = status_for(err);
    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected: {}", err);
    }
    json_error(err.public_message(), status)
}

/// Parses the caller header into a user id.
pub fn parse_caller(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
}

async fn authenticate(
    service: &ContainerService,
    caller: Option<String>,
) -> Result<User, reply::Response> {
    let unauthenticated = || json_error("Authentication required", StatusCode::UNAUTHORIZED);
    let Some(id) = parse_caller(caller.as_deref()) else {
        return Err(unauthenticated());
    };
    match service.user(id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(unauthenticated()),
        Err(e) => Err(error_reply(&e)),
    }
}

fn with_service(
    service: Arc<ContainerService>,
) -> impl Filter<Extract = (Arc<ContainerService>,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

fn caller() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Clone {
    warp::header::optional::<String>(CALLER_HEADER)
}

/// Lifecycle actions addressed at a single container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
}

async fn list_handler(
    service: Arc<ContainerService>,
    caller: Option<String>,
) -> Result<reply::Response, Rejection> {
    let user = match authenticate(&service, caller).await {
        Ok(u) => u,
        Err(res) => return Ok(res),
    };
    match service.list_containers(&user).await {
        Ok(records) => {
            let views: Vec<ContainerView> = records
                .iter()
                .map(|r| ContainerView::from_record(r, service.url_for(r)))
                .collect();
            Ok(reply::json(&views).into_response())
        }
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn create_handler(
    service: Arc<ContainerService>,
    caller: Option<String>,
    body: CreateContainerRequest,
) -> Result<reply::Response, Rejection> {
    let user = match authenticate(&service, caller).await {
        Ok(u) => u,
        Err(res) => return Ok(res),
    };
    match service.create_container(&user, body.name.as_deref()).await {
        Ok(record) => {
            let view = ContainerView::from_record(&record, service.url_for(&record));
            Ok(reply::with_status(reply::json(&view), StatusCode::CREATED).into_response())
        }
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn action_handler(
    id: i64,
    action: Action,
    service: Arc<ContainerService>,
    caller: Option<String>,
) -> Result<reply::Response, Rejection> {
    let user = match authenticate(&service, caller).await {
        Ok(u) => u,
        Err(res) => return Ok(res),
    };
    let result = match action {
        Action::Start => service.start(&user, id).await,
        Action::Stop => service.stop(&user, id).await,
    };
    match result {
        Ok(status) => Ok(reply::json(&ActionResponse {
            success: true,
            status: Some(status),
        })
        .into_response()),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn delete_handler(
    id: i64,
    service: Arc<ContainerService>,
    caller: Option<String>,
) -> Result<reply::Response, Rejection> {
    let user = match authenticate(&service, caller).await {
        Ok(u) => u,
        Err(res) => return Ok(res),
    };
    match service.delete(&user, id).await {
        Ok(()) => Ok(reply::json(&ActionResponse {
            success: true,
            status: None,
        })
        .into_response()),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn logs_handler(
    id: i64,
    service: Arc<ContainerService>,
    caller: Option<String>,
) -> Result<reply::Response, Rejection> {
    let user = match authenticate(&service, caller).await {
        Ok(u) => u,
        Err(res) => return Ok(res),
    };
    match service.logs(&user, id).await {
        Ok(logs) => Ok(reply::json(&LogsResponse { logs }).into_response()),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// GET /api/containers
pub fn list_containers_route(
    service: Arc<ContainerService>,
) -> impl Filter<Extract = (reply::Response,), Error = Rejection> + Clone {
    warp::path!("api" / "containers")
        .and(warp::get())
        .and(with_service(service))
        .and(caller())
        .and_then(list_handler)
}

/// POST /api/containers
///
/// The body is optional; a missing or unreadable body means "no name".
pub fn create_container_route(
    service: Arc<ContainerService>,
) -> impl Filter<Extract = (reply::Response,), Error = Rejection> + Clone {
    let body = warp::body::content_length_limit(4 * 1024)
        .and(warp::body::json::<CreateContainerRequest>())
        .or(warp::any().map(CreateContainerRequest::default))
        .unify();
    warp::path!("api" / "containers")
        .and(warp::post())
        .and(with_service(service))
        .and(caller())
        .and(body)
        .and_then(create_handler)
}

/// POST /api/containers/:id/start and /stop
pub fn container_action_route(
    service: Arc<ContainerService>,
) -> impl Filter<Extract = (reply::Response,), Error = Rejection> + Clone {
    let start = warp::path!("api" / "containers" / i64 / "start").map(|id: i64| (id, Action::Start));
    let stop = warp::path!("api" / "containers" / i64 / "stop").map(|id: i64| (id, Action::Stop));
    start
        .or(stop)
        .unify()
        .untuple_one()
        .and(warp::post())
        .and(with_service(service))
        .and(caller())
        .and_then(action_handler)
}

/// DELETE /api/containers/:id
pub fn delete_container_route(
    service: Arc<ContainerService>,
) -> impl Filter<Extract = (reply::Response,), Error = Rejection> + Clone {
    warp::path!("api" / "containers" / i64)
        .and(warp::delete())
        .and(with_service(service))
        .and(caller())
        .and_then(delete_handler)
}

/// GET /api/containers/:id/logs
pub fn container_logs_route(
    service: Arc<ContainerService>,
) -> impl Filter<Extract = (reply::Response,), Error = Rejection> + Clone {
    warp::path!("api" / "containers" / i64 / "logs")
        .and(warp::get())
        .and(with_service(service))
        .and(caller())
        .and_then(logs_handler)
}

/// GET /api/stats
pub fn stats_route(
    service: Arc<ContainerService>,
) -> impl Filter<Extract = (reply::Response,), Error = Rejection> + Clone {
    warp::path!("api" / "stats")
        .and(warp::get())
        .map(move || reply::json(&service.reconciler().stats()).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::{AllocationError, StorageError};

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_for(&ServiceError::Unauthorized),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&ServiceError::PortsExhausted(
                AllocationError::PortsExhausted {
                    start: 8000,
                    end: 8003
                }
            )),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ServiceError::InvalidName("-x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ServiceError::NameTaken("site1".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&ServiceError::Provision("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&ServiceError::Storage(StorageError::ReadFailed("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn caller_header_parsing() {
        assert_eq!(parse_caller(Some("42")), Some(42));
        assert_eq!(parse_caller(Some(" 7 ")), Some(7));
        assert_eq!(parse_caller(Some("0")), None);
        assert_eq!(parse_caller(Some("-3")), None);
        assert_eq!(parse_caller(Some("alice")), None);
        assert_eq!(parse_caller(None), None);
    }
}
