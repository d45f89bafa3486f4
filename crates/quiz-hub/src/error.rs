use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("ticket not found or already consumed")]
    InvalidTicket,

    #[error("ticket expired")]
    TicketExpired,

    #[error("user {0} is not connected to any shard")]
    NotConnected(i64),
}
