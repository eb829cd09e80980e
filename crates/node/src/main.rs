//! CineRaft 节点入口
//!
//! 退出码：0 正常；1 配置错误；2 监听地址绑定失败；3 持久化存储损坏。

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use cineraft::{
    run_peer_listener, Args, AuthManager, ChatClient, ClientServer, NodeConfig, TicketNode,
};
use raft::{FileStorage, FileStorageOptions};

const EXIT_CONFIG: u8 = 1;
const EXIT_BIND: u8 = 2;
const EXIT_STORE: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to install tracing subscriber");
    }

    let config = match NodeConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    info!("Starting CineRaft node {}", config.node_id);
    info!("Client RPC on {}, raft RPC on {}", config.listen_addr, config.raft_addr);

    // 存储恢复：损坏即终止，集群靠多数派容忍该节点缺席
    let storage = match FileStorage::open(FileStorageOptions::with_base_dir(&config.data_dir)) {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            error!("Persistent store unusable: {}", e);
            return ExitCode::from(EXIT_STORE);
        }
    };

    // 先绑定监听器：对端在选举开始前就能连上来
    let client_listener = match TcpListener::bind(config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind client listener on {}: {}", config.listen_addr, e);
            return ExitCode::from(EXIT_BIND);
        }
    };
    let peer_listener = match TcpListener::bind(config.raft_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind raft listener on {}: {}", config.raft_addr, e);
            return ExitCode::from(EXIT_BIND);
        }
    };

    let auth = Arc::new(AuthManager::new(config.auth_secret.clone()));
    let chat = ChatClient::new(config.assistant_addr.clone());

    let node = match TicketNode::new(config, storage).await {
        Ok(node) => node,
        Err(e) => {
            error!("Failed to initialize node: {}", e);
            return ExitCode::from(EXIT_STORE);
        }
    };

    node.start();

    let driver = node.driver().clone();
    tokio::spawn(async move {
        run_peer_listener(peer_listener, driver).await;
    });

    let server = ClientServer::new(node.clone(), auth, chat);
    tokio::spawn(async move {
        server.run(client_listener).await;
    });

    info!("CineRaft node is ready");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    node.shutdown().await;
    ExitCode::SUCCESS
}
