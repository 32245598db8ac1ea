//! # XML-RPC Query Protocol
//!
//! Installers and search tools query the index with XML-RPC calls posted as
//! `text/xml`. [`codec`] turns the request body into a [`MethodCall`] and a
//! result back into a `methodResponse`; [`dispatch`] maps the call onto the
//! closed set of query commands.

pub mod codec;
pub mod dispatch;
pub mod value;

pub use codec::{parse_method_call, parse_method_response, render_response, CodecError};
pub use dispatch::{dispatch, QueryCommand, RpcResponse};
pub use value::Value;

/// Malformed XML or envelope.
pub const PARSE_ERROR: i32 = -32700;
/// Unknown method name.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Wrong number or types of arguments.
pub const INVALID_PARAMS: i32 = -32602;
/// Failure while executing a known method.
pub const INTERNAL_ERROR: i32 = -32500;

/// A decoded remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub params: Vec<Value>,
}

/// Failure envelope returned in place of a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

impl Fault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }
}
