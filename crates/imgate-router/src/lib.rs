//! Delivery router: the three-way dispatch shared by sends and acks, the
//! per-type strategies (`C2C_SEND`, `C2C_ACK`, `WITHDRAW_MSG_SEND`,
//! `GET_BATCH_MSG_IDS`) registered into the dispatcher, and the local
//! fan-out adapter the peer-RPC server delegates to.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod ack;
pub mod batch;
pub mod dispatch;
pub mod error;
pub mod fanout;
pub mod send;
pub mod types;
pub mod withdraw;

pub use ack::AckStrategy;
pub use batch::{BatchMsgIdSource, BatchStrategy, NoopBatchMsgIdSource};
pub use dispatch::{offline_send_event, three_way_dispatch, DispatchContext, DispatchOutcome};
pub use error::{AckValidationError, SendValidationError};
pub use fanout::SessionTableFanOut;
pub use send::SendStrategy;
pub use withdraw::WithdrawStrategy;
