use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod guards;
pub mod handlers;
pub mod middleware;
pub mod session;

pub fn router(state: AppState) -> Router<AppState> {
    handlers::routes(state)
}
