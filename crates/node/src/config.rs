//! 节点配置
//!
//! 命令行参数解析与校验。校验失败由 main 以退出码 1 终止。

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::warn;

use bookingstore::Movie;

/// CineRaft 节点参数
#[derive(Parser, Debug)]
#[command(name = "cineraft")]
#[command(about = "CineRaft - replicated movie ticket booking service")]
pub struct Args {
    /// 节点 ID
    #[arg(long)]
    pub node_id: String,

    /// 客户端 RPC 监听地址
    #[arg(long, default_value = "127.0.0.1:7001")]
    pub listen_addr: String,

    /// Raft 节点间 RPC 监听地址
    #[arg(long, default_value = "127.0.0.1:8001")]
    pub raft_addr: String,

    /// 其他节点，格式 id@raft_host:raft_port@client_host:client_port，可多次指定
    #[arg(long = "peer")]
    pub peers: Vec<String>,

    /// 选举超时下界（毫秒）
    #[arg(long, default_value_t = 150)]
    pub election_timeout_min: u64,

    /// 选举超时上界（毫秒）
    #[arg(long, default_value_t = 300)]
    pub election_timeout_max: u64,

    /// 心跳间隔（毫秒）
    #[arg(long, default_value_t = 50)]
    pub heartbeat_interval: u64,

    /// 单次节点间 RPC 的截止时间（毫秒）
    #[arg(long, default_value_t = 100)]
    pub rpc_deadline: u64,

    /// 客户端提案等待提交并应用的超时（毫秒）
    #[arg(long, default_value_t = 5000)]
    pub propose_timeout: u64,

    /// 占座有效期（毫秒）
    #[arg(long, default_value_t = 120_000)]
    pub seat_hold_ttl: u64,

    /// 幂等缓存每客户端保留的结果条数
    #[arg(long, default_value_t = 64)]
    pub apply_cache_size: usize,

    /// 外部助手服务地址（不配置则 Chat 不可用）
    #[arg(long)]
    pub assistant_addr: Option<String>,

    /// 数据目录
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// 日志级别
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// 令牌签名密钥
    #[arg(long, default_value = "cineraft-dev-secret")]
    pub auth_secret: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid peer spec '{0}', expected id@raft_host:port@client_host:port")]
    InvalidPeer(String),

    #[error("invalid address '{0}': {1}")]
    InvalidAddr(String, String),

    #[error("election timeout range invalid: min {0}ms must be < max {1}ms")]
    InvalidElectionRange(u64, u64),

    #[error("heartbeat interval {0}ms must be < election timeout min {1}ms")]
    InvalidHeartbeat(u64, u64),

    #[error("duplicate peer id '{0}'")]
    DuplicatePeer(String),
}

/// 一个对端节点的地址
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub id: String,
    pub raft_addr: SocketAddr,
    pub client_addr: SocketAddr,
}

/// 校验后的节点配置
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    pub listen_addr: SocketAddr,
    pub raft_addr: SocketAddr,
    pub peers: Vec<PeerEntry>,
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    pub heartbeat_interval: Duration,
    pub rpc_deadline: Duration,
    pub propose_timeout: Duration,
    pub seat_hold_ttl: Duration,
    pub apply_cache_size: usize,
    pub assistant_addr: Option<String>,
    pub data_dir: PathBuf,
    pub log_level: String,
    pub auth_secret: String,
    /// 启动时由 Leader 播种的影片目录
    pub seed_movies: Vec<Movie>,
}

impl NodeConfig {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let listen_addr = parse_addr(&args.listen_addr)?;
        let raft_addr = parse_addr(&args.raft_addr)?;

        let mut peers = Vec::new();
        for spec in &args.peers {
            let entry = parse_peer(spec)?;
            if entry.id == args.node_id || peers.iter().any(|p: &PeerEntry| p.id == entry.id) {
                return Err(ConfigError::DuplicatePeer(entry.id));
            }
            peers.push(entry);
        }

        if args.election_timeout_min >= args.election_timeout_max {
            return Err(ConfigError::InvalidElectionRange(
                args.election_timeout_min,
                args.election_timeout_max,
            ));
        }
        if args.election_timeout_max < 2 * args.election_timeout_min {
            warn!(
                "election timeout max {}ms < 2x min {}ms, split votes become more likely",
                args.election_timeout_max, args.election_timeout_min
            );
        }
        if args.heartbeat_interval >= args.election_timeout_min {
            return Err(ConfigError::InvalidHeartbeat(
                args.heartbeat_interval,
                args.election_timeout_min,
            ));
        }
        if args.heartbeat_interval > args.election_timeout_min / 2 {
            warn!(
                "heartbeat interval {}ms > half of election timeout min {}ms",
                args.heartbeat_interval, args.election_timeout_min
            );
        }

        Ok(Self {
            node_id: args.node_id,
            listen_addr,
            raft_addr,
            peers,
            election_timeout_min: Duration::from_millis(args.election_timeout_min),
            election_timeout_max: Duration::from_millis(args.election_timeout_max),
            heartbeat_interval: Duration::from_millis(args.heartbeat_interval),
            rpc_deadline: Duration::from_millis(args.rpc_deadline),
            propose_timeout: Duration::from_millis(args.propose_timeout),
            seat_hold_ttl: Duration::from_millis(args.seat_hold_ttl),
            apply_cache_size: args.apply_cache_size,
            assistant_addr: args.assistant_addr,
            data_dir: args.data_dir,
            log_level: args.log_level,
            auth_secret: args.auth_secret,
            seed_movies: default_catalog(),
        })
    }

    pub fn peer_ids(&self) -> Vec<String> {
        self.peers.iter().map(|p| p.id.clone()).collect()
    }
}

fn parse_addr(s: &str) -> Result<SocketAddr, ConfigError> {
    s.parse()
        .map_err(|e: std::net::AddrParseError| ConfigError::InvalidAddr(s.to_string(), e.to_string()))
}

fn parse_peer(spec: &str) -> Result<PeerEntry, ConfigError> {
    let parts: Vec<&str> = spec.split('@').collect();
    let [id, raft, client] = parts.as_slice() else {
        return Err(ConfigError::InvalidPeer(spec.to_string()));
    };
    if id.is_empty() {
        return Err(ConfigError::InvalidPeer(spec.to_string()));
    }
    Ok(PeerEntry {
        id: id.to_string(),
        raft_addr: parse_addr(raft)?,
        client_addr: parse_addr(client)?,
    })
}

/// 默认影片目录
pub fn default_catalog() -> Vec<Movie> {
    vec![
        Movie {
            id: "movie1".to_string(),
            title: "The Matrix Reloaded".to_string(),
            total_seats: 100,
            price_cents: 1500,
            showtime: "2025-11-20 19:00".to_string(),
        },
        Movie {
            id: "movie2".to_string(),
            title: "Inception Dreams".to_string(),
            total_seats: 80,
            price_cents: 1200,
            showtime: "2025-11-20 21:00".to_string(),
        },
        Movie {
            id: "movie3".to_string(),
            title: "Interstellar Journey".to_string(),
            total_seats: 120,
            price_cents: 1800,
            showtime: "2025-11-21 18:00".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn base_args(extra: &[&str]) -> Args {
        let mut argv = vec![
            "cineraft",
            "--node-id",
            "node1",
            "--listen-addr",
            "127.0.0.1:7001",
            "--raft-addr",
            "127.0.0.1:8001",
        ];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn parses_peer_spec() {
        let args = base_args(&[
            "--peer",
            "node2@127.0.0.1:8002@127.0.0.1:7002",
            "--peer",
            "node3@127.0.0.1:8003@127.0.0.1:7003",
        ]);
        let config = NodeConfig::from_args(args).unwrap();
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.peers[0].id, "node2");
        assert_eq!(config.peers[0].client_addr.port(), 7002);
    }

    #[test]
    fn rejects_bad_peer_spec() {
        let args = base_args(&["--peer", "node2@127.0.0.1:8002"]);
        assert!(matches!(
            NodeConfig::from_args(args),
            Err(ConfigError::InvalidPeer(_))
        ));
    }

    #[test]
    fn rejects_duplicate_peer() {
        let args = base_args(&[
            "--peer",
            "node2@127.0.0.1:8002@127.0.0.1:7002",
            "--peer",
            "node2@127.0.0.1:8004@127.0.0.1:7004",
        ]);
        assert!(matches!(
            NodeConfig::from_args(args),
            Err(ConfigError::DuplicatePeer(_))
        ));
    }

    #[test]
    fn rejects_inverted_election_range() {
        let args = base_args(&[
            "--election-timeout-min",
            "300",
            "--election-timeout-max",
            "150",
        ]);
        assert!(matches!(
            NodeConfig::from_args(args),
            Err(ConfigError::InvalidElectionRange(_, _))
        ));
    }

    #[test]
    fn rejects_heartbeat_longer_than_election_timeout() {
        let args = base_args(&["--heartbeat-interval", "200"]);
        assert!(matches!(
            NodeConfig::from_args(args),
            Err(ConfigError::InvalidHeartbeat(_, _))
        ));
    }
}
