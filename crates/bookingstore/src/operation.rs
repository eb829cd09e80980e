//! 订票命令类型定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{Movie, UserId};

/// 订票操作类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum BookingCommand {
    /// 初始化影片目录。幂等：仅在目录为空时生效。
    SeedMovies { movies: Vec<Movie> },
    /// 原子占座：全部成功或全部失败，占座带过期时间
    HoldSeats {
        user_id: UserId,
        movie_id: String,
        seats: Vec<u32>,
        ttl_ms: u64,
    },
    /// 确认支付：Held -> Booked，订单 Pending -> Paid
    ConfirmPayment { booking_id: String, method: String },
    /// 取消订单：释放座位，订单 -> Cancelled
    CancelBooking {
        booking_id: String,
        user_id: UserId,
    },
    /// 周期性过期回收：释放所有已过期的占座并取消对应订单。
    /// 由 Leader 定期提议，保证所有副本在同一日志位置做相同回收。
    ExpireHolds,
}

/// 命令信封：幂等键与 Leader 盖戳的应用时间
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandEnvelope {
    /// 发起方客户端（None 表示节点内部命令）
    pub client_id: Option<String>,
    /// 客户端请求序号，与 client_id 构成幂等键
    pub request_seq: u64,
    /// 提议时由 Leader 写入的时间戳（unix 毫秒）。
    /// 副本应用时只使用该值，绝不读本地时钟。
    pub apply_time_ms: u64,
    pub command: BookingCommand,
}

impl CommandEnvelope {
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("command envelope is always serializable")
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        bincode::deserialize(data).map_err(|e| DecodeError(e.to_string()))
    }
}

#[derive(Debug, Error)]
#[error("undecodable booking command: {0}")]
pub struct DecodeError(pub String);

/// 命令被拒绝的原因
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RejectReason {
    /// 请求的座位不存在或不可用
    SeatUnavailable,
    /// 影片不存在
    MovieNotFound,
    /// 订单不存在
    BookingNotFound,
    /// 非订单所有者
    NotOwner,
    /// 订单不在待支付状态
    NotPending,
    /// 订单不可取消
    NotCancellable,
    /// 占座已过期
    Expired,
}

/// 命令执行结果。同一 (client_id, request_seq) 的重放返回缓存结果。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CommandOutcome {
    Seeded {
        movies: u32,
    },
    Held {
        booking_id: String,
        total_cents: u64,
    },
    Paid {
        confirmation: String,
    },
    Cancelled,
    ExpiredHolds {
        released_seats: u32,
        cancelled_bookings: u32,
    },
    Rejected(RejectReason),
}

impl CommandOutcome {
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("command outcome is always serializable")
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        bincode::deserialize(data).map_err(|e| DecodeError(e.to_string()))
    }
}
