//! 订票领域状态机
//!
//! 确定性的电影 / 座位 / 订单存储：命令通过共识日志按序到达，
//! `apply` 的结果只取决于命令内容（含 Leader 盖戳的 apply_time），
//! 不读本地时钟。

mod operation;
mod store;

pub use operation::{
    BookingCommand, CommandEnvelope, CommandOutcome, DecodeError, RejectReason,
};
pub use store::{
    Booking, BookingId, BookingState, BookingStore, Movie, MovieId, MovieListing, Seat,
    SeatStatus, UserId,
};
