use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    marker::PhantomData,
};

use meridian_serde::{BitReader, BitWrite};

use crate::{
    replication::{identity::NetId, replicate::Replicate, serializer::ComponentSlot},
    rpc::error::{RpcDispatchError, RpcHandlerError, RpcRegistryError},
};

/// Direction of a remote call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeType {
    /// Client to server
    ServerRpc,
    /// Server to client
    ClientRpc,
}

/// What a handler knows about the call it is serving
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RpcContext {
    pub net_id: NetId,
    pub component_index: u8,
    /// The caller owns the target object. Always false for client calls.
    pub caller_is_owner: bool,
}

/// A call addressed to one component of one object
#[derive(Clone, Copy, Debug)]
pub struct RpcTarget {
    pub net_id: NetId,
    pub component_index: u8,
    pub function_index: u16,
}

trait RpcHandler: Send + Sync {
    fn call(
        &self,
        component: &mut dyn Replicate,
        args: &mut BitReader,
        reply: &mut dyn BitWrite,
        context: &RpcContext,
    ) -> Result<(), RpcHandlerError>;
}

struct TypedHandler<C, F> {
    handler: F,
    phantom_c: PhantomData<fn(&mut C)>,
}

impl<C, F> RpcHandler for TypedHandler<C, F>
where
    C: Replicate,
    F: Fn(&mut C, &mut BitReader, &mut dyn BitWrite, &RpcContext) -> Result<(), RpcHandlerError>
        + Send
        + Sync,
{
    fn call(
        &self,
        component: &mut dyn Replicate,
        args: &mut BitReader,
        reply: &mut dyn BitWrite,
        context: &RpcContext,
    ) -> Result<(), RpcHandlerError> {
        match component.as_any_mut().downcast_mut::<C>() {
            Some(component) => (self.handler)(component, args, reply, context),
            // entries are keyed by TypeId, so this is always a C
            None => Err(RpcHandlerError::Failed(format!(
                "component is not a {}",
                type_name::<C>()
            ))),
        }
    }
}

struct RpcEntry {
    invoke_type: InvokeType,
    require_authority: bool,
    handler: Box<dyn RpcHandler>,
}

/// Handlers for remote calls, keyed by component type and function index
#[derive(Default)]
pub struct RpcRegistry {
    entries: HashMap<(TypeId, u16), RpcEntry>,
}

impl RpcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client to server call on component `C`.
    ///
    /// # Panics
    ///
    /// Panics if `function_index` is already registered for `C`.
    pub fn add_server_rpc<C, F>(&mut self, function_index: u16, require_authority: bool, handler: F)
    where
        C: Replicate,
        F: Fn(&mut C, &mut BitReader, &mut dyn BitWrite, &RpcContext) -> Result<(), RpcHandlerError>
            + Send
            + Sync
            + 'static,
    {
        if let Err(error) =
            self.try_add_server_rpc::<C, F>(function_index, require_authority, handler)
        {
            panic!("{}", error);
        }
    }

    pub fn try_add_server_rpc<C, F>(
        &mut self,
        function_index: u16,
        require_authority: bool,
        handler: F,
    ) -> Result<(), RpcRegistryError>
    where
        C: Replicate,
        F: Fn(&mut C, &mut BitReader, &mut dyn BitWrite, &RpcContext) -> Result<(), RpcHandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.insert::<C, F>(function_index, InvokeType::ServerRpc, require_authority, handler)
    }

    /// Registers a server to client call on component `C`.
    ///
    /// # Panics
    ///
    /// Panics if `function_index` is already registered for `C`.
    pub fn add_client_rpc<C, F>(&mut self, function_index: u16, handler: F)
    where
        C: Replicate,
        F: Fn(&mut C, &mut BitReader, &mut dyn BitWrite, &RpcContext) -> Result<(), RpcHandlerError>
            + Send
            + Sync
            + 'static,
    {
        if let Err(error) = self.try_add_client_rpc::<C, F>(function_index, handler) {
            panic!("{}", error);
        }
    }

    pub fn try_add_client_rpc<C, F>(
        &mut self,
        function_index: u16,
        handler: F,
    ) -> Result<(), RpcRegistryError>
    where
        C: Replicate,
        F: Fn(&mut C, &mut BitReader, &mut dyn BitWrite, &RpcContext) -> Result<(), RpcHandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.insert::<C, F>(function_index, InvokeType::ClientRpc, false, handler)
    }

    fn insert<C, F>(
        &mut self,
        function_index: u16,
        invoke_type: InvokeType,
        require_authority: bool,
        handler: F,
    ) -> Result<(), RpcRegistryError>
    where
        C: Replicate,
        F: Fn(&mut C, &mut BitReader, &mut dyn BitWrite, &RpcContext) -> Result<(), RpcHandlerError>
            + Send
            + Sync
            + 'static,
    {
        let key = (TypeId::of::<C>(), function_index);
        if self.entries.contains_key(&key) {
            return Err(RpcRegistryError::DuplicateFunction {
                component: type_name::<C>(),
                function_index,
            });
        }

        self.entries.insert(
            key,
            RpcEntry {
                invoke_type,
                require_authority,
                handler: Box::new(TypedHandler {
                    handler,
                    phantom_c: PhantomData::<fn(&mut C)>,
                }),
            },
        );
        Ok(())
    }

    pub fn is_registered<C: Replicate>(&self, function_index: u16) -> bool {
        self.entries
            .contains_key(&(TypeId::of::<C>(), function_index))
    }
}

/// Invokes the handler for an incoming call.
///
/// `slots` is `None` when no object with the target NetId exists. Reply
/// bytes written by the handler go to `reply`.
pub fn dispatch_rpc(
    registry: &RpcRegistry,
    expected: InvokeType,
    slots: Option<&mut [ComponentSlot]>,
    target: RpcTarget,
    caller_is_owner: bool,
    args: &mut BitReader,
    reply: &mut dyn BitWrite,
) -> Result<(), RpcDispatchError> {
    let RpcTarget {
        net_id,
        component_index,
        function_index,
    } = target;

    let slots = slots.ok_or(RpcDispatchError::ObjectNotFound { net_id })?;
    let count = slots.len();
    let slot = slots.get_mut(component_index as usize).ok_or(
        RpcDispatchError::ComponentIndexOutOfRange {
            net_id,
            component_index,
            count,
        },
    )?;

    let type_id = slot.component.as_any().type_id();
    let entry = registry.entries.get(&(type_id, function_index)).ok_or(
        RpcDispatchError::UnknownFunction {
            net_id,
            component_index,
            function_index,
        },
    )?;

    if entry.invoke_type != expected {
        return Err(RpcDispatchError::InvokeTypeMismatch {
            function_index,
            expected,
            found: entry.invoke_type,
        });
    }

    if entry.invoke_type == InvokeType::ServerRpc && entry.require_authority && !caller_is_owner {
        return Err(RpcDispatchError::NotOwner {
            net_id,
            function_index,
        });
    }

    let context = RpcContext {
        net_id,
        component_index,
        caller_is_owner,
    };
    let result = entry
        .handler
        .call(slot.component.as_mut(), args, reply, &context);
    result.map_err(|error| match error {
        RpcHandlerError::Deserialize(error) => RpcDispatchError::Deserialize {
            function_index,
            error,
        },
        RpcHandlerError::Failed(reason) => RpcDispatchError::HandlerFailed {
            function_index,
            reason,
        },
    })
}
