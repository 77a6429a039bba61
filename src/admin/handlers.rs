use axum::{extract::State, Json};
use serde::Serialize;

use crate::lifecycle::{EnsureOutcome, ServiceController, StatusSnapshot};
use crate::poller::ServiceState;

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub action: &'static str,
    /// Whether the call changed anything.
    pub changed: bool,
    pub state: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<EnsureOutcome>,
}

impl ActionResponse {
    fn new(action: &'static str, changed: bool, state: ServiceState) -> Self {
        Self {
            action,
            changed,
            state,
            outcome: None,
        }
    }
}

pub async fn get_status(State(controller): State<ServiceController>) -> Json<StatusSnapshot> {
    Json(controller.snapshot().await)
}

pub async fn post_start(State(controller): State<ServiceController>) -> Json<ActionResponse> {
    let changed = controller.start().await;
    Json(ActionResponse::new("start", changed, controller.state()))
}

pub async fn post_stop(State(controller): State<ServiceController>) -> Json<ActionResponse> {
    let changed = controller.stop().await;
    Json(ActionResponse::new("stop", changed, controller.state()))
}

pub async fn post_toggle(State(controller): State<ServiceController>) -> Json<ActionResponse> {
    let state = controller.toggle().await;
    Json(ActionResponse::new("toggle", true, state))
}

pub async fn post_restart(State(controller): State<ServiceController>) -> Json<ActionResponse> {
    controller.restart().await;
    Json(ActionResponse::new("restart", true, controller.state()))
}

pub async fn post_ensure(State(controller): State<ServiceController>) -> Json<ActionResponse> {
    let outcome = controller.ensure_running().await;
    Json(ActionResponse {
        outcome: Some(outcome),
        ..ActionResponse::new("ensure", outcome != EnsureOutcome::Healthy, controller.state())
    })
}
