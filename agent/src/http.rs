//! Control HTTP Server (C9, §6): the 7-endpoint REST surface every pod
//! exposes. Single worker, matching the teacher's `node_api::run` shape.

use actix_web::{web, App, HttpResponse, HttpServer, Responder};

use shared::api::{ClusterSnapshot, InfoResponse, LogResponse, OkResponse, StateResponse};

use crate::errors::AgentError;
use crate::lifecycle::Lifecycle;
use crate::logging::LogBuffer;
use crate::registry::Registry;

/// Shared handler state, cloned cheaply per worker (teacher's `State` alias).
pub type State = web::Data<PodState>;

pub struct PodState {
    pub lifecycle: Lifecycle,
    pub registry: std::sync::Arc<Registry>,
    pub log_buffer: LogBuffer,
}

/// Binds the control port and serves until the process exits. A single
/// worker is deliberate: every RPC round-trips through the lifecycle
/// actor's mpsc channel anyway, so concurrency here buys nothing (§5).
pub async fn run(state: State, port: u16) -> std::io::Result<()> {
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/info", web::post().to(info))
            .route("/log", web::post().to(log))
            .route("/reset", web::post().to(reset))
            .route("/control/on", web::post().to(control_on))
            .route("/control/off", web::post().to(control_off))
            .route("/control/check", web::post().to(control_check))
            .route("/control/kill", web::post().to(control_kill))
    })
    .bind(("0.0.0.0", port))?
    .workers(1)
    .run()
    .await
}

async fn info(state: State) -> impl Responder {
    let descriptor = state.registry.descriptor().await;
    let idling = matches!(
        descriptor.process,
        shared::model::ProcessState::Dead | shared::model::ProcessState::Failed
    );
    let body = InfoResponse {
        node: descriptor.node,
        task: descriptor.task,
        ip: descriptor.ip,
        public: descriptor.public,
        application: descriptor.application,
        cluster: descriptor.cluster,
        process: descriptor.process,
        state: descriptor.state,
    };
    if idling {
        HttpResponse::Gone().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}

async fn log(state: State) -> impl Responder {
    HttpResponse::Ok().json(LogResponse {
        lines: state.log_buffer.lines(),
    })
}

async fn reset(state: State) -> impl Responder {
    match state.lifecycle.reset().await {
        Ok(()) => HttpResponse::Ok().json(OkResponse::default()),
        Err(err) => respond_err(&err),
    }
}

async fn control_on(state: State, body: web::Json<ClusterSnapshot>) -> impl Responder {
    match state.lifecycle.on(body.into_inner()).await {
        Ok(process) => HttpResponse::Ok().json(StateResponse::new(process)),
        Err(err) => respond_err(&err),
    }
}

async fn control_off(state: State) -> impl Responder {
    match state.lifecycle.off().await {
        Ok(process) => HttpResponse::Ok().json(StateResponse::new(process)),
        Err(err) => respond_err(&err),
    }
}

async fn control_check(state: State, body: web::Json<ClusterSnapshot>) -> impl Responder {
    match state.lifecycle.check(body.into_inner()).await {
        Ok(()) => HttpResponse::Ok().json(OkResponse::default()),
        Err(err) => respond_err(&err),
    }
}

async fn control_kill(state: State) -> impl Responder {
    let process = state.lifecycle.kill().await;
    HttpResponse::Ok().json(StateResponse::new(process))
}

fn respond_err(err: &AgentError) -> HttpResponse {
    tracing::warn!(error = %err, "control RPC failed");
    err.to_http_response()
}
