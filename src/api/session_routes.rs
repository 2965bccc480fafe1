use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::analysis::FrameRequest;
use crate::auth::{self, LoginRequest};
use crate::error::{HiveError, Result};
use crate::session::{PushedFrameCapture, SessionController, SettingsPatch};
use super::session_websocket;

/// Largest accepted request body; uploaded frames are base64 JPEG data URLs
const MAX_BODY_BYTES: u64 = 8 * 1024 * 1024;

/// Everything a route needs to serve a session
#[derive(Clone)]
pub struct AppContext {
    pub controller: Arc<SessionController>,
    pub frames: PushedFrameCapture,
    pub analysis_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PeerNodeRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CoachRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// All HTTP and WebSocket routes of the service
pub fn routes(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    health_check()
        .or(config_endpoint(ctx.clone()))
        .or(session_websocket_route(ctx.clone()))
        .or(login_route())
        .or(session_route(ctx.clone()))
        .or(connection_routes(ctx.clone()))
        .or(selection_route(ctx.clone()))
        .or(peer_node_route(ctx.clone()))
        .or(coach_route(ctx.clone()))
        .or(analysis_route(ctx.clone()))
        .or(settings_routes(ctx.clone()))
        .or(frame_route(ctx))
        .recover(handle_rejection)
}

pub fn health_check() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("hivemind" / "health")
        .and(warp::get())
        .map(|| {
            warp::reply::json(&serde_json::json!({
                "status": "healthy",
                "service": "HiveMind",
                "version": env!("CARGO_PKG_VERSION")
            }))
        })
}

pub fn config_endpoint(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("hivemind" / "config")
        .and(warp::get())
        .and(with_context(ctx))
        .map(|ctx: AppContext| {
            warp::reply::json(&serde_json::json!({
                "ANALYSIS_URL": ctx.analysis_url,
            }))
        })
}

pub fn session_websocket_route(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("hivemind" / "ws")
        .and(warp::ws())
        .and(with_context(ctx))
        .map(|ws: warp::ws::Ws, ctx: AppContext| {
            ws.on_upgrade(move |websocket| {
                session_websocket::handle_session_websocket(websocket, ctx.controller)
            })
        })
}

pub fn login_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("login")
        .and(warp::post())
        .and(json_body::<LoginRequest>())
        .map(|request: LoginRequest| json_result(auth::login(request)))
}

pub fn session_route(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("session")
        .and(warp::get())
        .and(warp::query::<SearchQuery>())
        .and(with_context(ctx))
        .then(|query: SearchQuery, ctx: AppContext| async move {
            let view = ctx
                .controller
                .snapshot(query.search.as_deref().unwrap_or_default())
                .await;
            warp::reply::json(&view)
        })
}

pub fn connection_routes(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let connect = warp::path!("session" / "connect")
        .and(warp::post())
        .and(with_context(ctx.clone()))
        .then(|ctx: AppContext| async move {
            let result = ctx.controller.connect().await;
            view_result(&ctx, result).await
        });

    let disconnect = warp::path!("session" / "disconnect")
        .and(warp::post())
        .and(with_context(ctx))
        .then(|ctx: AppContext| async move {
            let result = ctx.controller.disconnect().await;
            view_result(&ctx, result).await
        });

    connect.or(disconnect)
}

pub fn selection_route(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("session" / "students" / u32 / "select")
        .and(warp::post())
        .and(with_context(ctx))
        .then(|student_id: u32, ctx: AppContext| async move {
            let result = ctx.controller.toggle_selection(student_id).await;
            view_result(&ctx, result).await
        })
}

pub fn peer_node_route(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("session" / "peer-nodes")
        .and(warp::post())
        .and(json_body::<PeerNodeRequest>())
        .and(with_context(ctx))
        .then(|request: PeerNodeRequest, ctx: AppContext| async move {
            let result = ctx.controller.create_peer_node(&request.name).await;
            view_result(&ctx, result).await
        })
}

pub fn coach_route(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("session" / "coach")
        .and(warp::post())
        .and(json_body::<CoachRequest>())
        .and(with_context(ctx))
        .then(|request: CoachRequest, ctx: AppContext| async move {
            let result = ctx.controller.send_coach_message(&request.message).await;
            view_result(&ctx, result).await
        })
}

pub fn analysis_route(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("session" / "analysis")
        .and(warp::post())
        .and(with_context(ctx))
        .then(|ctx: AppContext| async move {
            let result = ctx.controller.run_analysis().await;
            view_result(&ctx, result).await
        })
}

pub fn settings_routes(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let get = warp::path!("session" / "settings")
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .then(|ctx: AppContext| async move { warp::reply::json(&ctx.controller.settings().await) });

    let put = warp::path!("session" / "settings")
        .and(warp::put())
        .and(json_body::<SettingsPatch>())
        .and(with_context(ctx))
        .then(|patch: SettingsPatch, ctx: AppContext| async move {
            json_result(ctx.controller.update_settings(patch).await)
        });

    get.or(put)
}

pub fn frame_route(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("session" / "frame")
        .and(warp::post())
        .and(json_body::<FrameRequest>())
        .and(with_context(ctx))
        .map(|request: FrameRequest, ctx: AppContext| {
            let accepted = ctx.frames.push_frame(request.frame);
            let status = if accepted {
                StatusCode::ACCEPTED
            } else {
                StatusCode::CONFLICT
            };
            warp::reply::with_status(
                warp::reply::json(&serde_json::json!({ "accepted": accepted })),
                status,
            )
        })
}

fn with_context(ctx: AppContext) -> impl Filter<Extract = (AppContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Replies with the fresh session view, or the error that prevented the action
async fn view_result(ctx: &AppContext, result: Result<()>) -> warp::reply::WithStatus<warp::reply::Json> {
    match result {
        Ok(()) => warp::reply::with_status(
            warp::reply::json(&ctx.controller.snapshot("").await),
            StatusCode::OK,
        ),
        Err(e) => error_reply(&e),
    }
}

fn json_result<T: Serialize>(result: Result<T>) -> warp::reply::WithStatus<warp::reply::Json> {
    match result {
        Ok(value) => warp::reply::with_status(warp::reply::json(&value), StatusCode::OK),
        Err(e) => error_reply(&e),
    }
}

fn error_reply(error: &HiveError) -> warp::reply::WithStatus<warp::reply::Json> {
    let status = match error {
        HiveError::StudentNotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %error, "Request failed");
    } else {
        tracing::debug!(error = %error, "Request rejected");
    }
    warp::reply::with_status(
        warp::reply::json(&ErrorBody {
            error: error.to_string(),
        }),
        status,
    )
}

async fn handle_rejection(rejection: Rejection) -> std::result::Result<impl Reply, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        tracing::warn!(rejection = ?rejection, "Unhandled rejection");
        (StatusCode::BAD_REQUEST, "Bad request".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { error: message }),
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AttentivenessSource, Attentiveness};
    use crate::config::SessionConfig;
    use crate::session::RandomTelemetry;
    use async_trait::async_trait;
    use std::time::Duration;

    struct OfflineSource;

    #[async_trait]
    impl AttentivenessSource for OfflineSource {
        async fn measure(&self, _frame: &str) -> Result<f64> {
            Err(HiveError::AnalysisStatus(502))
        }
    }

    fn context() -> AppContext {
        let frames = PushedFrameCapture::new(true);
        let config = SessionConfig {
            tick_interval: Duration::from_secs(60),
            poll_interval: Duration::from_millis(20),
            ..SessionConfig::default()
        };
        let controller = SessionController::new(
            config,
            Arc::new(RandomTelemetry),
            Arc::new(OfflineSource),
            Arc::new(frames.clone()),
        );
        AppContext {
            controller: Arc::new(controller),
            frames,
            analysis_url: "http://localhost:8000/process_frame".to_string(),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let resp = warp::test::request()
            .method("GET")
            .path("/hivemind/health")
            .reply(&routes(context()))
            .await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "HiveMind");
    }

    #[tokio::test]
    async fn test_login() {
        let api = routes(context());
        let ok = warp::test::request()
            .method("POST")
            .path("/login")
            .json(&serde_json::json!({ "id": "T-1", "password": "pw", "role": "teacher" }))
            .reply(&api)
            .await;
        assert_eq!(ok.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(ok.body()).unwrap();
        assert_eq!(body["username"], "T-1");
        assert_eq!(body["role"], "teacher");

        let rejected = warp::test::request()
            .method("POST")
            .path("/login")
            .json(&serde_json::json!({ "id": "", "password": "pw" }))
            .reply(&api)
            .await;
        assert_eq!(rejected.status(), 400);
        let body: serde_json::Value = serde_json::from_slice(rejected.body()).unwrap();
        assert_eq!(body["error"], "Please enter both ID and password");
    }

    #[tokio::test]
    async fn test_session_search() {
        let resp = warp::test::request()
            .method("GET")
            .path("/session?search=deadlocks")
            .reply(&routes(context()))
            .await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        // Topic index 1 repeats every 8 students in a 16 student roster
        assert_eq!(body["students"].as_array().unwrap().len(), 2);
        assert_eq!(body["stats"]["total_students"], 16);
    }

    #[tokio::test]
    async fn test_peer_node_flow() {
        let api = routes(context());

        let empty = warp::test::request()
            .method("POST")
            .path("/session/peer-nodes")
            .json(&serde_json::json!({ "name": "Limits Crew" }))
            .reply(&api)
            .await;
        assert_eq!(empty.status(), 400);

        let select = warp::test::request()
            .method("POST")
            .path("/session/students/4/select")
            .reply(&api)
            .await;
        assert_eq!(select.status(), 200);

        let created = warp::test::request()
            .method("POST")
            .path("/session/peer-nodes")
            .json(&serde_json::json!({ "name": "Limits Crew" }))
            .reply(&api)
            .await;
        assert_eq!(created.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(created.body()).unwrap();
        assert_eq!(body["peer_nodes"][0]["name"], "Limits Crew");
        assert_eq!(body["peer_nodes"][0]["members"][0]["id"], 4);
        assert!(body["selected"].as_array().unwrap().is_empty());

        let missing = warp::test::request()
            .method("POST")
            .path("/session/students/404/select")
            .reply(&api)
            .await;
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn test_settings_roundtrip_masks_keys() {
        let api = routes(context());
        let resp = warp::test::request()
            .method("PUT")
            .path("/session/settings")
            .json(&serde_json::json!({ "openai_api_key": "sk-live", "auto_detection": false }))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 200);
        let text = String::from_utf8_lossy(resp.body()).to_string();
        assert!(!text.contains("sk-live"));

        let resp = warp::test::request()
            .method("GET")
            .path("/session/settings")
            .reply(&api)
            .await;
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["openai_api_key_set"], true);
        assert_eq!(body["auto_detection"], false);
    }

    #[tokio::test]
    async fn test_connect_polls_and_frames_accepted() {
        let ctx = context();
        let api = routes(ctx.clone());

        let early = warp::test::request()
            .method("POST")
            .path("/session/frame")
            .json(&serde_json::json!({ "frame": "data:image/jpeg;base64,AA==" }))
            .reply(&api)
            .await;
        assert_eq!(early.status(), 409);

        let connected = warp::test::request()
            .method("POST")
            .path("/session/connect")
            .reply(&api)
            .await;
        assert_eq!(connected.status(), 200);

        let frame = warp::test::request()
            .method("POST")
            .path("/session/frame")
            .json(&serde_json::json!({ "frame": "data:image/jpeg;base64,AA==" }))
            .reply(&api)
            .await;
        assert_eq!(frame.status(), 202);

        tokio::time::sleep(Duration::from_millis(80)).await;
        let view = ctx.controller.snapshot("").await;
        assert_eq!(view.attentiveness, Attentiveness::Unavailable);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["attentiveness"], "-");

        ctx.controller.disconnect().await.unwrap();
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |e: HiveError| error_reply(&e).into_response().status();
        assert_eq!(status(HiveError::StudentNotFound(3)), StatusCode::NOT_FOUND);
        assert_eq!(status(HiveError::InvalidPeerNode), StatusCode::BAD_REQUEST);

        let bad_json = serde_json::from_str::<u8>("x").unwrap_err();
        assert_eq!(
            status(HiveError::SerializationFailed(bad_json)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_bad_json_is_a_json_error() {
        let resp = warp::test::request()
            .method("POST")
            .path("/session/coach")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&routes(context()))
            .await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    }
}
