//! 客户端 RPC 服务器
//!
//! 每个连接一个任务：解析请求帧、校验令牌、读写分流。写操作构造
//! 确定性命令信封（Leader 在此盖 apply_time 戳）提交共识，等待应用
//! 后返回状态机结果；读操作直接用本地快照。路由到非 Leader 的写
//! 请求返回 NotLeader 与 Leader 客户端地址提示。

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use bookingstore::{BookingCommand, CommandEnvelope, CommandOutcome, RejectReason};
use raft::ClientError;
use ticket_protocol::{
    decode, encode, read_frame, write_frame, ClientRequest, ClientResponse, ErrorCode,
};

use crate::auth::AuthManager;
use crate::chat::{ChatClient, ChatError};
use crate::node::{unix_ms, TicketNode};

pub struct ClientServer {
    node: TicketNode,
    auth: Arc<AuthManager>,
    chat: ChatClient,
}

impl ClientServer {
    pub fn new(node: TicketNode, auth: Arc<AuthManager>, chat: ChatClient) -> Arc<Self> {
        Arc::new(Self { node, auth, chat })
    }

    /// 接入循环。监听器绑定完成即可服务。
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        let local_addr = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        info!("Client server listening on {}", local_addr);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("New client connection from {}", addr);
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream).await {
                            debug!("Client connection from {} closed: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Failed to accept client connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<(), String> {
        loop {
            let payload = read_frame(&mut stream).await.map_err(|e| e.to_string())?;

            let response = match decode::<ClientRequest>(&payload) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => ClientResponse::error(
                    ErrorCode::Internal,
                    format!("undecodable request: {}", e),
                ),
            };

            let bytes = encode(&response).map_err(|e| e.to_string())?;
            write_frame(&mut stream, &bytes)
                .await
                .map_err(|e| e.to_string())?;
        }
    }

    async fn handle_request(&self, request: ClientRequest) -> ClientResponse {
        match request {
            ClientRequest::Login { username, password } => {
                match self.auth.authenticate(&username, &password, unix_ms()) {
                    Some((token, expires_at_ms)) => ClientResponse::LoggedIn {
                        token,
                        expires_at_ms,
                    },
                    None => {
                        ClientResponse::error(ErrorCode::Unauthorized, "invalid credentials")
                    }
                }
            }

            ClientRequest::Logout { token } => {
                self.auth.logout(&token);
                ClientResponse::LoggedOut
            }

            ClientRequest::ListMovies { token } => match self.principal(&token) {
                Err(resp) => resp,
                Ok(_) => ClientResponse::Movies {
                    movies: self.node.store().list_movies(),
                    applied_index: self.node.last_applied(),
                },
            },

            ClientRequest::SeatMap { token, movie_id } => match self.principal(&token) {
                Err(resp) => resp,
                Ok(_) => match self.node.store().seat_map(&movie_id) {
                    Some(seats) => ClientResponse::Seats {
                        seats,
                        applied_index: self.node.last_applied(),
                    },
                    None => ClientResponse::error(
                        ErrorCode::NotFound,
                        format!("movie {} not found", movie_id),
                    ),
                },
            },

            ClientRequest::MyBookings { token } => match self.principal(&token) {
                Err(resp) => resp,
                Ok(username) => ClientResponse::Bookings {
                    bookings: self.node.store().bookings_of(&username),
                    applied_index: self.node.last_applied(),
                },
            },

            ClientRequest::BookSeats {
                token,
                movie_id,
                seats,
                client_id,
                request_seq,
            } => match self.principal(&token) {
                Err(resp) => resp,
                Ok(username) => {
                    let command = BookingCommand::HoldSeats {
                        user_id: username,
                        movie_id,
                        seats,
                        ttl_ms: self.node.config.seat_hold_ttl.as_millis() as u64,
                    };
                    match self.propose(client_id, request_seq, command).await {
                        Err(resp) => resp,
                        Ok((applied_index, CommandOutcome::Held { booking_id, total_cents })) => {
                            ClientResponse::Booked {
                                booking_id,
                                total_cents,
                                applied_index,
                            }
                        }
                        Ok((_, outcome)) => self.unexpected_outcome(outcome),
                    }
                }
            },

            ClientRequest::ConfirmPayment {
                token,
                booking_id,
                method,
                client_id,
                request_seq,
            } => match self.principal(&token) {
                Err(resp) => resp,
                Ok(_) => {
                    let command = BookingCommand::ConfirmPayment { booking_id, method };
                    match self.propose(client_id, request_seq, command).await {
                        Err(resp) => resp,
                        Ok((applied_index, CommandOutcome::Paid { confirmation })) => {
                            ClientResponse::PaymentConfirmed {
                                confirmation,
                                applied_index,
                            }
                        }
                        Ok((_, outcome)) => self.unexpected_outcome(outcome),
                    }
                }
            },

            ClientRequest::CancelBooking {
                token,
                booking_id,
                client_id,
                request_seq,
            } => match self.principal(&token) {
                Err(resp) => resp,
                Ok(username) => {
                    let command = BookingCommand::CancelBooking {
                        booking_id,
                        user_id: username,
                    };
                    match self.propose(client_id, request_seq, command).await {
                        Err(resp) => resp,
                        Ok((applied_index, CommandOutcome::Cancelled)) => {
                            ClientResponse::Cancelled { applied_index }
                        }
                        Ok((_, outcome)) => self.unexpected_outcome(outcome),
                    }
                }
            },

            ClientRequest::Chat { token, prompt } => match self.principal(&token) {
                Err(resp) => resp,
                Ok(username) => {
                    let context = self.chat_context(&username);
                    match self.chat.chat(prompt, context).await {
                        Ok(text) => ClientResponse::ChatReply { text },
                        Err(ChatError::Timeout) => {
                            ClientResponse::error(ErrorCode::Timeout, "assistant timeout")
                        }
                        Err(e) => ClientResponse::error(ErrorCode::Internal, e.to_string()),
                    }
                }
            },
        }
    }

    /// 校验令牌并返回主体
    fn principal(&self, token: &str) -> Result<String, ClientResponse> {
        self.auth.validate(token, unix_ms()).ok_or_else(|| {
            ClientResponse::error(ErrorCode::Unauthorized, "invalid or expired token")
        })
    }

    /// 写路径：盖戳、提交共识、把领域结果或错误翻译成响应
    async fn propose(
        &self,
        client_id: String,
        request_seq: u64,
        command: BookingCommand,
    ) -> Result<(u64, CommandOutcome), ClientResponse> {
        let envelope = CommandEnvelope {
            client_id: Some(client_id),
            request_seq,
            apply_time_ms: unix_ms(),
            command,
        };

        match self.node.propose(envelope).await {
            Ok((index, CommandOutcome::Rejected(reason))) => {
                Err(self.rejection(reason, index))
            }
            Ok(ok) => Ok(ok),
            Err(e) => Err(self.client_error(e)),
        }
    }

    fn rejection(&self, reason: RejectReason, _applied_index: u64) -> ClientResponse {
        let (code, message) = match reason {
            RejectReason::SeatUnavailable => {
                (ErrorCode::SeatUnavailable, "requested seats unavailable")
            }
            RejectReason::MovieNotFound => (ErrorCode::NotFound, "movie not found"),
            RejectReason::BookingNotFound => (ErrorCode::NotFound, "booking not found"),
            RejectReason::NotOwner => (ErrorCode::NotOwner, "not the booking owner"),
            RejectReason::NotPending => (ErrorCode::NotPending, "booking is not pending"),
            RejectReason::NotCancellable => {
                (ErrorCode::NotCancellable, "booking cannot be cancelled")
            }
            RejectReason::Expired => (ErrorCode::Expired, "seat hold expired"),
        };
        ClientResponse::error(code, message)
    }

    fn client_error(&self, error: ClientError) -> ClientResponse {
        match error {
            ClientError::NotLeader(hint) => {
                let hint_addr = hint.and_then(|id| self.node.client_addr_of(&id));
                ClientResponse::not_leader("not the leader, retry against the hint", hint_addr)
            }
            ClientError::LeadershipLost => ClientResponse::error(
                ErrorCode::LeadershipLost,
                "leadership lost before commit, retry",
            ),
            ClientError::Timeout => {
                ClientResponse::error(ErrorCode::Timeout, "proposal timed out")
            }
            ClientError::ShuttingDown => {
                ClientResponse::error(ErrorCode::ShuttingDown, "node is shutting down")
            }
            other => ClientResponse::error(ErrorCode::Internal, other.to_string()),
        }
    }

    fn unexpected_outcome(&self, outcome: CommandOutcome) -> ClientResponse {
        warn!("Unexpected state machine outcome: {:?}", outcome);
        ClientResponse::error(ErrorCode::Internal, "unexpected state machine outcome")
    }

    /// 助手上下文：当前目录与用户订单的摘要
    fn chat_context(&self, username: &str) -> String {
        let movies = self.node.store().list_movies();
        let bookings = self.node.store().bookings_of(username);
        let mut context = format!("User: {}\n", username);
        context.push_str(&format!("Available movies: {}\n", movies.len()));
        for movie in &movies {
            context.push_str(&format!(
                "- {} ({}): {} of {} seats free, {} cents\n",
                movie.title, movie.showtime, movie.available_seats, movie.total_seats,
                movie.price_cents
            ));
        }
        context.push_str(&format!("User's bookings: {}\n", bookings.len()));
        context
    }
}
