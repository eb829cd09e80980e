//! 客户端 RPC 消息
//!
//! 写操作携带 (client_id, request_seq) 幂等键；写响应附带 applied_index
//! 以支持写后读。被路由到非 Leader 时返回 `NotLeader` 与 Leader 的
//! 客户端地址提示。

use serde::{Deserialize, Serialize};

use bookingstore::{Booking, MovieListing, Seat};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientRequest {
    Login {
        username: String,
        password: String,
    },
    Logout {
        token: String,
    },
    ListMovies {
        token: String,
    },
    SeatMap {
        token: String,
        movie_id: String,
    },
    BookSeats {
        token: String,
        movie_id: String,
        seats: Vec<u32>,
        client_id: String,
        request_seq: u64,
    },
    ConfirmPayment {
        token: String,
        booking_id: String,
        method: String,
        client_id: String,
        request_seq: u64,
    },
    CancelBooking {
        token: String,
        booking_id: String,
        client_id: String,
        request_seq: u64,
    },
    MyBookings {
        token: String,
    },
    Chat {
        token: String,
        prompt: String,
    },
}

/// 客户端可见的结构化错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unauthorized,
    NotLeader,
    LeadershipLost,
    Timeout,
    SeatUnavailable,
    NotFound,
    NotOwner,
    NotPending,
    NotCancellable,
    Expired,
    ShuttingDown,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientResponse {
    LoggedIn {
        token: String,
        expires_at_ms: u64,
    },
    LoggedOut,
    Movies {
        movies: Vec<MovieListing>,
        applied_index: u64,
    },
    Seats {
        seats: Vec<Seat>,
        applied_index: u64,
    },
    Booked {
        booking_id: String,
        total_cents: u64,
        applied_index: u64,
    },
    PaymentConfirmed {
        confirmation: String,
        applied_index: u64,
    },
    Cancelled {
        applied_index: u64,
    },
    Bookings {
        bookings: Vec<Booking>,
        applied_index: u64,
    },
    ChatReply {
        text: String,
    },
    Error {
        code: ErrorCode,
        message: String,
        /// NotLeader 时为 Leader 的客户端地址（host:port），仅供参考
        leader_hint: Option<String>,
    },
}

impl ClientResponse {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ClientResponse::Error {
            code,
            message: message.into(),
            leader_hint: None,
        }
    }

    pub fn not_leader(message: impl Into<String>, leader_hint: Option<String>) -> Self {
        ClientResponse::Error {
            code: ErrorCode::NotLeader,
            message: message.into(),
            leader_hint,
        }
    }
}
