//! # 医院 Web 服务模块
//!
//! 基于 axum 的 HTTP 接口：令牌签发与校验、按角色的访问控制、
//! 以及排期、付款、处方和报表等业务端点。

pub mod auth;
pub mod gate;
pub mod handlers;
pub mod password;
pub mod response;
pub mod server;
pub mod state;

pub use auth::TokenIssuer;
pub use server::WebServer;
pub use state::AppState;
