//! JSON-RPC 2.0 plumbing: wire codec, auth signing, response log and the
//! id-correlating session.

pub mod auth;
pub mod codec;
pub mod log;
pub mod session;

pub use codec::{Params, RpcErrorBody, RpcResponse, decode, encode, next_request_id};
pub use log::{LoggedResponse, ResponseLog};
pub use session::{AuthResult, RpcSession};
