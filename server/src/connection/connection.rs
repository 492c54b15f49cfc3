use std::{net::SocketAddr, time::Instant};

use log::warn;

use meridian_shared::{
    BaseConnection, BatchError, ConfigError, ConnectionConfig, ConnectionError, MessageKinds,
    NetId, UpdateBatchMessage, UpdateBatcher, UpdateVarsMessage,
};

use crate::{error::ServerError, server::BatchConfig, user::UserKey};

pub struct Connection {
    pub user_key: UserKey,
    pub base: BaseConnection,
    batcher: Option<UpdateBatcher>,
}

impl Connection {
    pub fn new(
        connection_config: &ConnectionConfig,
        batch_config: &BatchConfig,
        address: SocketAddr,
        user_key: &UserKey,
        now: Instant,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            user_key: *user_key,
            base: BaseConnection::new(address, connection_config, now)?,
            batcher: batch_config
                .enabled
                .then(|| UpdateBatcher::new(batch_config.max_batch_bytes)),
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.base.address()
    }

    // Updates

    /// Queues one object's update, batching it when batching is enabled.
    /// An update larger than the batch limit is not sent at all.
    pub fn queue_update(
        &mut self,
        message_kinds: &MessageKinds,
        net_id: NetId,
        payload: &[u8],
    ) -> Result<(), ServerError> {
        let Some(batcher) = self.batcher.as_mut() else {
            return self
                .queue_update_vars(message_kinds, net_id, payload)
                .map_err(|error| self.error(error));
        };

        match batcher.try_push(net_id, payload) {
            Ok(None) => Ok(()),
            Ok(Some(full)) => self
                .base
                .queue_message(message_kinds, &UpdateBatchMessage { payload: full })
                .map_err(|error| self.error(error)),
            Err(error @ BatchError::PayloadTooLarge { .. }) => {
                warn!("dropping update for {}: {}", self.user_key, error);
                Err(ServerError::Batch { net_id, error })
            }
            Err(BatchError::Malformed(error)) => Err(self.error(ConnectionError::Malformed(error))),
        }
    }

    /// Sends whatever the batcher still holds
    pub fn flush_updates(&mut self, message_kinds: &MessageKinds) -> Result<(), ServerError> {
        let Some(batch) = self.batcher.as_mut().and_then(UpdateBatcher::finish) else {
            return Ok(());
        };
        self.base
            .queue_message(message_kinds, &UpdateBatchMessage { payload: batch })
            .map_err(|error| self.error(error))
    }

    pub fn error(&self, error: ConnectionError) -> ServerError {
        ServerError::Connection {
            address: self.address(),
            error,
        }
    }

    fn queue_update_vars(
        &mut self,
        message_kinds: &MessageKinds,
        net_id: NetId,
        payload: &[u8],
    ) -> Result<(), ConnectionError> {
        self.base.queue_message(
            message_kinds,
            &UpdateVarsMessage {
                net_id,
                payload: payload.into(),
            },
        )
    }
}
