//! Components, messages and remote calls shared by the end-to-end tests

use std::any::Any;

use meridian_shared::{
    BitReader, BitWrite, Message, PrefabHash, Property, Protocol, ProtocolPlugin, Replicate,
    ReplicatedField, RpcHandlerError, Serde, SerdeErr, SyncFrom, SyncList, SyncSettings, SyncTo,
};

pub const PLAYER_PREFAB: PrefabHash = PrefabHash(0xABCD);
pub const CRATE_PREFAB: PrefabHash = PrefabHash(0x0C4A);

/// Function indexes of the remote calls registered by `protocol`
pub mod rpc {
    /// Server call on `Health`: subtract the `i32` argument, reply with
    /// the remaining health
    pub const DAMAGE: u16 = 0;
    /// Server call on `Health` that requires authority: add the argument
    pub const HEAL: u16 = 1;
    /// Server call on `Health` whose handler always fails
    pub const REFUSE: u16 = 2;
    /// Client call on `Position`: count the flash, reply with the count
    pub const FLASH: u16 = 0;
}

macro_rules! impl_replicate {
    ($type:ident, $settings:expr, [$($field:ident),*]) => {
        impl Replicate for $type {
            fn sync_settings(&self) -> SyncSettings {
                $settings
            }

            fn fields(&self) -> Vec<&dyn ReplicatedField> {
                vec![$(&self.$field as &dyn ReplicatedField),*]
            }

            fn fields_mut(&mut self) -> Vec<&mut dyn ReplicatedField> {
                vec![$(&mut self.$field as &mut dyn ReplicatedField),*]
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }
    };
}

// Position
/// Server-driven position, sent to the owner and every observer
#[derive(Default)]
pub struct Position {
    pub x: Property<f32>,
    pub y: Property<f32>,
    pub z: Property<f32>,
    /// Bumped by the `FLASH` client call, never replicated
    pub flashes: u32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x: Property::new(x),
            y: Property::new(y),
            z: Property::new(z),
            flashes: 0,
        }
    }
}

impl_replicate!(Position, SyncSettings::default(), [x, y, z]);

// Health
/// Server-driven, sent to the owner only
pub struct Health {
    pub value: Property<i32>,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            value: Property::new(100),
        }
    }
}

impl_replicate!(
    Health,
    SyncSettings::new(SyncFrom::SERVER, SyncTo::OWNER),
    [value]
);

// PlayerInput
/// Written by the owning client, relayed by the server to other observers
#[derive(Default)]
pub struct PlayerInput {
    pub sequence: Property<u32>,
    pub label: Property<String>,
    pub emotes: SyncList<u32>,
}

impl_replicate!(
    PlayerInput,
    SyncSettings::new(SyncFrom::OWNER, SyncTo::SERVER | SyncTo::OBSERVERS_ONLY),
    [sequence, label, emotes]
);

// Aim
/// Written by the owning client and kept by the server, never relayed
#[derive(Default)]
pub struct Aim {
    pub yaw: Property<f32>,
}

impl_replicate!(
    Aim,
    SyncSettings::new(SyncFrom::OWNER, SyncTo::SERVER),
    [yaw]
);

// Chat
#[derive(Clone, Debug, PartialEq)]
pub struct Chat {
    pub text: String,
}

impl Chat {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl Serde for Chat {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.text.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            text: String::de(reader)?,
        })
    }
}

impl Message for Chat {
    fn name() -> &'static str {
        "test::Chat"
    }
}

// Protocol
pub struct TestPlugin;

impl ProtocolPlugin for TestPlugin {
    fn build(&self, protocol: &mut Protocol) {
        protocol
            .add_message::<Chat>()
            .add_server_rpc::<Health, _>(rpc::DAMAGE, false, |health, args, reply, _| {
                let amount = i32::de(args)?;
                health.value.set(*health.value - amount);
                health.value.get().ser(reply);
                Ok(())
            })
            .add_server_rpc::<Health, _>(rpc::HEAL, true, |health, args, _, _| {
                let amount = i32::de(args)?;
                health.value.set(*health.value + amount);
                Ok(())
            })
            .add_server_rpc::<Health, _>(rpc::REFUSE, false, |_, _, _, _| {
                Err(RpcHandlerError::Failed("not today".to_string()))
            })
            .add_client_rpc::<Position, _>(rpc::FLASH, |position, _, reply, _| {
                position.flashes += 1;
                position.flashes.ser(reply);
                Ok(())
            });
    }
}

pub fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol.add_plugin(TestPlugin);
    protocol
}

/// Components of the player prefab: position, health, input, aim
pub fn player_components() -> Vec<Box<dyn Replicate>> {
    vec![
        Box::new(Position::default()),
        Box::new(Health::default()),
        Box::new(PlayerInput::default()),
        Box::new(Aim::default()),
    ]
}

pub fn crate_components() -> Vec<Box<dyn Replicate>> {
    vec![Box::new(Position::default())]
}
