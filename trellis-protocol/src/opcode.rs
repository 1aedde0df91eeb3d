//! Opcode space shared by every node
//!
//! A flat integer enumeration identifying the semantic operation and the
//! implicit payload shape of a message. Opcodes the core does not know
//! are preserved as [`Opcode::Other`] so intermediate nodes can still
//! route them to the collaborator layer or forward them unchanged.

/// Semantic operation carried by a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Opcode {
    /// Loopback / diagnostics
    Test,
    /// Sender's schema snapshot changed; payload carries its signature
    SchemaChanged,
    /// Request the peer's schema; payload carries our signature
    GetSchema,
    /// Request one round of live readings
    GetReadings,
    /// Request the bridge's wireless signal quality
    GetSignalQuality,
    /// Request the bridge's bus registration status
    GetBusStatus,
    /// Full schema snapshot (postcard bytes)
    SchemaData,
    /// Live readings in schema field order, trailing signature
    ReadingsData,
    /// Wireless signal quality report (0–3)
    SignalQuality,
    /// Bus registration status report
    BusStatus,
    /// Pulse the power relay
    PowerCycle,
    /// Pulse the reset line
    ResetLine,
    /// Liveness probe
    Ping,
    /// Liveness reply
    Pong,
    /// Ask the bridge to (re-)register on the bus
    Register,
    /// Bridge registration announcement (id + snapshot)
    RegistrationData,
    /// Bus-side acknowledgment of a registration
    Registered,
    /// Generic acknowledgment
    Ok,
    /// Signatures matched; peer's schema is current
    SchemaOk,
    /// Opcode outside the core's vocabulary, preserved for routing
    Other(u8),
}

// Wire format values
const OP_TEST: u8 = 0;
const OP_SCHEMA_CHANGED: u8 = 1;
const OP_GET_SCHEMA: u8 = 11;
const OP_GET_READINGS: u8 = 12;
const OP_GET_SIGNAL_QUALITY: u8 = 13;
const OP_GET_BUS_STATUS: u8 = 14;
const OP_SCHEMA_DATA: u8 = 21;
const OP_READINGS_DATA: u8 = 22;
const OP_SIGNAL_QUALITY: u8 = 23;
const OP_BUS_STATUS: u8 = 24;
const OP_POWER_CYCLE: u8 = 50;
const OP_RESET_LINE: u8 = 51;
const OP_PING: u8 = 66;
const OP_PONG: u8 = 99;
const OP_REGISTER: u8 = 150;
const OP_REGISTRATION_DATA: u8 = 151;
const OP_REGISTERED: u8 = 160;
const OP_OK: u8 = 200;
const OP_SCHEMA_OK: u8 = 201;

impl Opcode {
    /// Parse an opcode from its wire format byte (total; unknown bytes
    /// become [`Opcode::Other`])
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            OP_TEST => Opcode::Test,
            OP_SCHEMA_CHANGED => Opcode::SchemaChanged,
            OP_GET_SCHEMA => Opcode::GetSchema,
            OP_GET_READINGS => Opcode::GetReadings,
            OP_GET_SIGNAL_QUALITY => Opcode::GetSignalQuality,
            OP_GET_BUS_STATUS => Opcode::GetBusStatus,
            OP_SCHEMA_DATA => Opcode::SchemaData,
            OP_READINGS_DATA => Opcode::ReadingsData,
            OP_SIGNAL_QUALITY => Opcode::SignalQuality,
            OP_BUS_STATUS => Opcode::BusStatus,
            OP_POWER_CYCLE => Opcode::PowerCycle,
            OP_RESET_LINE => Opcode::ResetLine,
            OP_PING => Opcode::Ping,
            OP_PONG => Opcode::Pong,
            OP_REGISTER => Opcode::Register,
            OP_REGISTRATION_DATA => Opcode::RegistrationData,
            OP_REGISTERED => Opcode::Registered,
            OP_OK => Opcode::Ok,
            OP_SCHEMA_OK => Opcode::SchemaOk,
            other => Opcode::Other(other),
        }
    }

    /// Convert to wire format byte
    pub fn to_byte(self) -> u8 {
        match self {
            Opcode::Test => OP_TEST,
            Opcode::SchemaChanged => OP_SCHEMA_CHANGED,
            Opcode::GetSchema => OP_GET_SCHEMA,
            Opcode::GetReadings => OP_GET_READINGS,
            Opcode::GetSignalQuality => OP_GET_SIGNAL_QUALITY,
            Opcode::GetBusStatus => OP_GET_BUS_STATUS,
            Opcode::SchemaData => OP_SCHEMA_DATA,
            Opcode::ReadingsData => OP_READINGS_DATA,
            Opcode::SignalQuality => OP_SIGNAL_QUALITY,
            Opcode::BusStatus => OP_BUS_STATUS,
            Opcode::PowerCycle => OP_POWER_CYCLE,
            Opcode::ResetLine => OP_RESET_LINE,
            Opcode::Ping => OP_PING,
            Opcode::Pong => OP_PONG,
            Opcode::Register => OP_REGISTER,
            Opcode::RegistrationData => OP_REGISTRATION_DATA,
            Opcode::Registered => OP_REGISTERED,
            Opcode::Ok => OP_OK,
            Opcode::SchemaOk => OP_SCHEMA_OK,
            Opcode::Other(byte) => byte,
        }
    }
}
