use meridian_serde::{BitReader, BitWrite};

use crate::{
    messages::{message::Message, message_kinds::MessageKinds, system_messages::*},
    replication::replicate::Replicate,
    rpc::{
        error::RpcHandlerError,
        registry::{RpcContext, RpcRegistry},
    },
};

pub mod error;
pub use error::ProtocolError;

// Protocol Plugin
pub trait ProtocolPlugin {
    fn build(&self, protocol: &mut Protocol);
}

/// Everything both ends have to agree on: message types and remote call
/// handlers. Built once at startup and handed to the server or client,
/// which locks it.
pub struct Protocol {
    pub message_kinds: MessageKinds,
    pub rpc_registry: RpcRegistry,
    locked: bool,
}

impl Default for Protocol {
    fn default() -> Self {
        let mut message_kinds = MessageKinds::new();
        message_kinds.add_message::<SceneReadyMessage>();
        message_kinds.add_message::<SceneNotReadyMessage>();
        message_kinds.add_message::<SpawnMessage>();
        message_kinds.add_message::<ObjectDestroyMessage>();
        message_kinds.add_message::<ObjectHideMessage>();
        message_kinds.add_message::<RemoveAuthorityMessage>();
        message_kinds.add_message::<UpdateVarsMessage>();
        message_kinds.add_message::<UpdateBatchMessage>();
        message_kinds.add_message::<RpcMessage>();
        message_kinds.add_message::<RpcWithReplyMessage>();
        message_kinds.add_message::<RpcReply>();
        message_kinds.add_message::<NetworkPingMessage>();
        message_kinds.add_message::<NetworkPongMessage>();

        Self {
            message_kinds,
            rpc_registry: RpcRegistry::new(),
            locked: false,
        }
    }
}

impl Protocol {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn add_plugin<P: ProtocolPlugin>(&mut self, plugin: P) -> &mut Self {
        self.check_lock();
        plugin.build(self);
        self
    }

    pub fn add_message<M: Message>(&mut self) -> &mut Self {
        self.check_lock();
        self.message_kinds.add_message::<M>();
        self
    }

    pub fn add_server_rpc<C, F>(
        &mut self,
        function_index: u16,
        require_authority: bool,
        handler: F,
    ) -> &mut Self
    where
        C: Replicate,
        F: Fn(&mut C, &mut BitReader, &mut dyn BitWrite, &RpcContext) -> Result<(), RpcHandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.check_lock();
        self.rpc_registry
            .add_server_rpc::<C, F>(function_index, require_authority, handler);
        self
    }

    pub fn add_client_rpc<C, F>(&mut self, function_index: u16, handler: F) -> &mut Self
    where
        C: Replicate,
        F: Fn(&mut C, &mut BitReader, &mut dyn BitWrite, &RpcContext) -> Result<(), RpcHandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.check_lock();
        self.rpc_registry.add_client_rpc::<C, F>(function_index, handler);
        self
    }

    // Non-panicking builder methods

    pub fn try_add_plugin<P: ProtocolPlugin>(
        &mut self,
        plugin: P,
    ) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        plugin.build(self);
        Ok(self)
    }

    pub fn try_add_message<M: Message>(&mut self) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.message_kinds.try_add_message::<M>()?;
        Ok(self)
    }

    pub fn try_add_server_rpc<C, F>(
        &mut self,
        function_index: u16,
        require_authority: bool,
        handler: F,
    ) -> Result<&mut Self, ProtocolError>
    where
        C: Replicate,
        F: Fn(&mut C, &mut BitReader, &mut dyn BitWrite, &RpcContext) -> Result<(), RpcHandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.try_check_lock()?;
        self.rpc_registry
            .try_add_server_rpc::<C, F>(function_index, require_authority, handler)?;
        Ok(self)
    }

    pub fn try_add_client_rpc<C, F>(
        &mut self,
        function_index: u16,
        handler: F,
    ) -> Result<&mut Self, ProtocolError>
    where
        C: Replicate,
        F: Fn(&mut C, &mut BitReader, &mut dyn BitWrite, &RpcContext) -> Result<(), RpcHandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.try_check_lock()?;
        self.rpc_registry
            .try_add_client_rpc::<C, F>(function_index, handler)?;
        Ok(self)
    }

    pub fn try_lock(&mut self) -> Result<(), ProtocolError> {
        self.try_check_lock()?;
        self.locked = true;
        Ok(())
    }

    pub fn lock(&mut self) {
        self.check_lock();
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Checks if protocol is locked without panicking
    /// Returns Err if protocol is locked
    pub fn try_check_lock(&self) -> Result<(), ProtocolError> {
        if self.locked {
            Err(ProtocolError::AlreadyLocked)
        } else {
            Ok(())
        }
    }

    /// # Panics
    ///
    /// Panics if the protocol is locked.
    pub fn check_lock(&self) {
        if let Err(error) = self.try_check_lock() {
            panic!("{}", error);
        }
    }

    pub fn build(&mut self) -> Self {
        std::mem::take(self)
    }
}
