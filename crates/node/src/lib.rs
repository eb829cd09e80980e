//! CineRaft - 多副本电影订票服务
//!
//! Raft 共识驱动确定性订票状态机，客户端 RPC 经 Leader 写入、
//! 任意副本读取。

pub mod auth;
pub mod chat;
pub mod config;
pub mod network;
pub mod node;
pub mod server;
pub mod state_machine;

pub use auth::AuthManager;
pub use chat::ChatClient;
pub use config::{default_catalog, Args, ConfigError, NodeConfig, PeerEntry};
pub use network::{run_peer_listener, PeerTransport};
pub use node::{unix_ms, NodeStatus, TicketNode};
pub use server::ClientServer;
pub use state_machine::TicketStateMachine;
