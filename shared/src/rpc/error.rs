use thiserror::Error;

use meridian_serde::SerdeErr;

use crate::{replication::identity::NetId, rpc::registry::InvokeType};

/// Setup errors while building an `RpcRegistry`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcRegistryError {
    #[error("Function {function_index} is already registered for component {component}")]
    DuplicateFunction {
        component: &'static str,
        function_index: u16,
    },
}

/// What a handler reports when it cannot complete a call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcHandlerError {
    /// The arguments could not be parsed
    #[error("Malformed arguments: {0}")]
    Deserialize(#[from] SerdeErr),

    /// The handler ran and refused the call. A caller awaiting a reply gets
    /// the reason back.
    #[error("Call failed: {0}")]
    Failed(String),
}

/// Why an incoming call was not invoked
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcDispatchError {
    /// The target may have been destroyed while the call was in flight
    #[error("Rpc target object {net_id} not found")]
    ObjectNotFound { net_id: NetId },

    #[error("Object {net_id} has {count} components, but the call targets component {component_index}")]
    ComponentIndexOutOfRange {
        net_id: NetId,
        component_index: u8,
        count: usize,
    },

    #[error("Function {function_index} is not registered on component {component_index} of object {net_id}")]
    UnknownFunction {
        net_id: NetId,
        component_index: u8,
        function_index: u16,
    },

    #[error("Function {function_index} is a {found:?} but was received as a {expected:?}")]
    InvokeTypeMismatch {
        function_index: u16,
        expected: InvokeType,
        found: InvokeType,
    },

    #[error("Function {function_index} on object {net_id} requires authority and the caller is not the owner")]
    NotOwner { net_id: NetId, function_index: u16 },

    #[error("Failed to read arguments of function {function_index}: {error}")]
    Deserialize { function_index: u16, error: SerdeErr },

    #[error("Function {function_index} failed: {reason}")]
    HandlerFailed { function_index: u16, reason: String },
}

impl RpcDispatchError {
    /// Expected under normal network races, logged and dropped
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RpcDispatchError::ObjectNotFound { .. } | RpcDispatchError::NotOwner { .. }
        )
    }

    /// Only a misbehaving or mismatched peer produces these
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            RpcDispatchError::ComponentIndexOutOfRange { .. }
                | RpcDispatchError::UnknownFunction { .. }
                | RpcDispatchError::InvokeTypeMismatch { .. }
                | RpcDispatchError::Deserialize { .. }
        )
    }
}

/// Outcome handed to a reply continuation that did not get a result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcReplyError {
    #[error("No reply arrived within the reply timeout")]
    TimedOut,

    #[error("The connection closed before a reply arrived")]
    Disconnected,

    #[error("The remote handler failed: {reason}")]
    Failed { reason: String },

    #[error("Malformed reply payload: {0}")]
    Malformed(#[from] SerdeErr),
}
