//! 现场点位网关 HTTP 接口
//!
//! 路由、handlers 与应用状态装配；二进制入口见 `main.rs`。

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod utils;

pub use state::{AppState, StateOptions};

use axum::{Router, middleware::from_fn};
use tower_http::trace::TraceLayer;

/// 完整应用：路由 + 请求追踪 ID。
pub fn app(state: AppState) -> Router {
    routes::create_api_router()
        .with_state(state)
        // 注入 request_id/trace_id
        .layer(from_fn(middleware::request_context))
        .layer(TraceLayer::new_for_http())
}
