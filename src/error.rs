//! Error types for KNX operations.
//!
//! Every category is a structured error carrying a backtrace and a private
//! kind. Callers inspect errors through the `is_*` helpers instead of
//! matching on the kind enums, which keeps the variants free to grow.

use core::fmt;
use std::backtrace::Backtrace;

/// Result type alias for KNX operations.
pub type Result<T> = core::result::Result<T, KnxError>;

// =============================================================================
// Error Kind Enums (Internal)
// =============================================================================

/// Protocol error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProtocolErrorKind {
    InvalidFrame,
    UnsupportedVersion,
    UnsupportedServiceType,
    PayloadTooLarge,
    InvalidMessageCode,
}

/// Connection error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionErrorKind {
    Refused,
    Timeout,
    Lost,
}

/// Transport error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportErrorKind {
    SendFailed,
    Closed,
}

/// Addressing error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddressingErrorKind {
    InvalidIndividualAddress,
    InvalidGroupAddress,
    OutOfRange,
}

/// Translation error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TranslationErrorKind {
    InvalidLength,
    ValueOutOfRange,
    TypeMismatch,
    UnsupportedType,
    InvalidText,
}

/// Link error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkErrorKind {
    Transport,
    Handshake,
    UnsupportedMedium,
    Closed,
}

/// Security error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SecurityErrorKind {
    Authentication,
    Integrity,
    Replay,
    SessionTimeout,
    SessionClosed,
}

/// Keyring error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyringErrorKind {
    Io,
    Format,
    Password,
    MissingKey,
}

// =============================================================================
// Main Error Type
// =============================================================================

/// KNX error types.
///
/// This is the main error type returned by all operations of the crate.
#[derive(Debug)]
pub enum KnxError {
    /// Protocol-related errors (frame parsing, version, etc.)
    Protocol(ProtocolError),
    /// Tunnel connection errors (connect refused, heartbeat lost, etc.)
    Connection(ConnectionError),
    /// Transport collaborator failures
    Transport(TransportError),
    /// Addressing errors (invalid address format, etc.)
    Addressing(AddressingError),
    /// Value does not fit the datapoint type
    Translation(TranslationError),
    /// Network link failures
    Link(LinkError),
    /// Secure session failures
    Security(SecurityError),
    /// Keyring loading and decryption failures
    Keyring(KeyringError),
    /// No read response within the configured bound
    ReadTimeout(ReadTimeoutError),
    /// Invalid configuration entry
    Config(ConfigError),
    /// Operation not valid in the current state
    InvalidState,
    /// Generic operation timeout
    Timeout,
}

// =============================================================================
// Structured Error Types
// =============================================================================

/// Protocol error with backtrace
#[derive(Debug)]
pub struct ProtocolError {
    kind: ProtocolErrorKind,
    backtrace: Backtrace,
}

impl ProtocolError {
    pub(crate) fn new(kind: ProtocolErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if this is an invalid frame error
    pub fn is_invalid_frame(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::InvalidFrame)
    }

    /// Check if this is an unsupported version error
    pub fn is_unsupported_version(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::UnsupportedVersion)
    }

    /// Captured backtrace
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

/// Connection error with backtrace
#[derive(Debug)]
pub struct ConnectionError {
    kind: ConnectionErrorKind,
    status: Option<u8>,
    backtrace: Backtrace,
}

impl ConnectionError {
    pub(crate) fn new(kind: ConnectionErrorKind) -> Self {
        Self {
            kind,
            status: None,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::Timeout)
    }

    /// Check if connection was refused
    pub fn is_refused(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::Refused)
    }

    /// Check if connection was lost
    pub fn is_lost(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::Lost)
    }

    /// KNXnet/IP status code reported by the server, if any
    pub fn status(&self) -> Option<u8> {
        self.status
    }
}

/// Transport error with backtrace
#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    backtrace: Backtrace,
}

impl TransportError {
    pub(crate) fn new(kind: TransportErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the transport has been closed
    pub fn is_closed(&self) -> bool {
        matches!(self.kind, TransportErrorKind::Closed)
    }
}

/// Addressing error with backtrace
#[derive(Debug)]
pub struct AddressingError {
    kind: AddressingErrorKind,
    backtrace: Backtrace,
}

impl AddressingError {
    pub(crate) fn new(kind: AddressingErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if address is out of range
    pub fn is_out_of_range(&self) -> bool {
        matches!(self.kind, AddressingErrorKind::OutOfRange)
    }
}

/// Datapoint translation error with backtrace
#[derive(Debug)]
pub struct TranslationError {
    kind: TranslationErrorKind,
    backtrace: Backtrace,
}

impl TranslationError {
    pub(crate) fn new(kind: TranslationErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if value is out of range
    pub fn is_out_of_range(&self) -> bool {
        matches!(self.kind, TranslationErrorKind::ValueOutOfRange)
    }

    /// Check if the ASDU had the wrong length
    pub fn is_invalid_length(&self) -> bool {
        matches!(self.kind, TranslationErrorKind::InvalidLength)
    }

    /// Check if the datapoint type is not supported
    pub fn is_unsupported_type(&self) -> bool {
        matches!(self.kind, TranslationErrorKind::UnsupportedType)
    }
}

/// Link error with the underlying cause
#[derive(Debug)]
pub struct LinkError {
    kind: LinkErrorKind,
    source: Option<Box<KnxError>>,
    backtrace: Backtrace,
}

impl LinkError {
    pub(crate) fn new(kind: LinkErrorKind, source: Option<KnxError>) -> Self {
        Self {
            kind,
            source: source.map(Box::new),
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the link was closed
    pub fn is_closed(&self) -> bool {
        matches!(self.kind, LinkErrorKind::Closed)
    }

    /// Check if the secure handshake failed
    pub fn is_handshake(&self) -> bool {
        matches!(self.kind, LinkErrorKind::Handshake)
    }

    /// Check if the requested medium cannot be used
    pub fn is_unsupported_medium(&self) -> bool {
        matches!(self.kind, LinkErrorKind::UnsupportedMedium)
    }

    /// The error that caused the link failure
    pub fn cause(&self) -> Option<&KnxError> {
        self.source.as_deref()
    }
}

/// Secure session error with backtrace
#[derive(Debug)]
pub struct SecurityError {
    kind: SecurityErrorKind,
    backtrace: Backtrace,
}

impl SecurityError {
    pub(crate) fn new(kind: SecurityErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the frame was a replay
    pub fn is_replay(&self) -> bool {
        matches!(self.kind, SecurityErrorKind::Replay)
    }
}

/// Keyring error with backtrace
#[derive(Debug)]
pub struct KeyringError {
    kind: KeyringErrorKind,
    io: Option<std::io::Error>,
    backtrace: Backtrace,
}

impl KeyringError {
    pub(crate) fn new(kind: KeyringErrorKind) -> Self {
        Self {
            kind,
            io: None,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the keyring password was wrong
    pub fn is_wrong_password(&self) -> bool {
        matches!(self.kind, KeyringErrorKind::Password)
    }

    /// Check if a required key was absent
    pub fn is_missing_key(&self) -> bool {
        matches!(self.kind, KeyringErrorKind::MissingKey)
    }
}

/// Read response timeout
#[derive(Debug)]
pub struct ReadTimeoutError {
    destination: u16,
    backtrace: Backtrace,
}

impl ReadTimeoutError {
    /// Raw group address the read was sent to
    pub fn destination(&self) -> u16 {
        self.destination
    }
}

/// Configuration error naming the offending key
#[derive(Debug)]
pub struct ConfigError {
    key: String,
    backtrace: Backtrace,
}

impl ConfigError {
    /// Configuration key that could not be used
    pub fn key(&self) -> &str {
        &self.key
    }
}

// =============================================================================
// Convenience Constructors for KnxError
// =============================================================================

impl KnxError {
    // Protocol errors
    pub(crate) fn invalid_frame() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::InvalidFrame))
    }

    pub(crate) fn unsupported_version() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::UnsupportedVersion))
    }

    pub(crate) fn unsupported_service_type() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::UnsupportedServiceType))
    }

    pub(crate) fn payload_too_large() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::PayloadTooLarge))
    }

    pub(crate) fn invalid_message_code() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::InvalidMessageCode))
    }

    // Connection errors
    pub(crate) fn connection_refused(status: u8) -> Self {
        let mut err = ConnectionError::new(ConnectionErrorKind::Refused);
        err.status = Some(status);
        Self::Connection(err)
    }

    pub(crate) fn connection_timeout() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Timeout))
    }

    pub(crate) fn connection_lost() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Lost))
    }

    // Transport errors
    pub(crate) fn send_failed() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::SendFailed))
    }

    pub(crate) fn transport_closed() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::Closed))
    }

    // Addressing errors
    pub(crate) fn invalid_group_address() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::InvalidGroupAddress))
    }

    pub(crate) fn invalid_individual_address() -> Self {
        Self::Addressing(AddressingError::new(
            AddressingErrorKind::InvalidIndividualAddress,
        ))
    }

    pub(crate) fn address_out_of_range() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::OutOfRange))
    }

    // Translation errors
    pub(crate) fn invalid_asdu_length() -> Self {
        Self::Translation(TranslationError::new(TranslationErrorKind::InvalidLength))
    }

    pub(crate) fn dpt_value_out_of_range() -> Self {
        Self::Translation(TranslationError::new(TranslationErrorKind::ValueOutOfRange))
    }

    pub(crate) fn dpt_type_mismatch() -> Self {
        Self::Translation(TranslationError::new(TranslationErrorKind::TypeMismatch))
    }

    pub(crate) fn unsupported_dpt() -> Self {
        Self::Translation(TranslationError::new(TranslationErrorKind::UnsupportedType))
    }

    pub(crate) fn invalid_dpt_text() -> Self {
        Self::Translation(TranslationError::new(TranslationErrorKind::InvalidText))
    }

    // Link errors
    pub(crate) fn link_transport(cause: KnxError) -> Self {
        Self::Link(LinkError::new(LinkErrorKind::Transport, Some(cause)))
    }

    pub(crate) fn link_handshake(cause: KnxError) -> Self {
        Self::Link(LinkError::new(LinkErrorKind::Handshake, Some(cause)))
    }

    pub(crate) fn unsupported_medium() -> Self {
        Self::Link(LinkError::new(LinkErrorKind::UnsupportedMedium, None))
    }

    pub(crate) fn link_closed() -> Self {
        Self::Link(LinkError::new(LinkErrorKind::Closed, None))
    }

    // Security errors
    pub(crate) fn authentication_failed() -> Self {
        Self::Security(SecurityError::new(SecurityErrorKind::Authentication))
    }

    pub(crate) fn integrity_failed() -> Self {
        Self::Security(SecurityError::new(SecurityErrorKind::Integrity))
    }

    pub(crate) fn replayed_frame() -> Self {
        Self::Security(SecurityError::new(SecurityErrorKind::Replay))
    }

    pub(crate) fn session_timeout() -> Self {
        Self::Security(SecurityError::new(SecurityErrorKind::SessionTimeout))
    }

    pub(crate) fn session_closed() -> Self {
        Self::Security(SecurityError::new(SecurityErrorKind::SessionClosed))
    }

    // Keyring errors
    pub(crate) fn keyring_io(err: std::io::Error) -> Self {
        let mut keyring = KeyringError::new(KeyringErrorKind::Io);
        keyring.io = Some(err);
        Self::Keyring(keyring)
    }

    pub(crate) fn keyring_format() -> Self {
        Self::Keyring(KeyringError::new(KeyringErrorKind::Format))
    }

    pub(crate) fn keyring_password() -> Self {
        Self::Keyring(KeyringError::new(KeyringErrorKind::Password))
    }

    pub(crate) fn keyring_missing_key() -> Self {
        Self::Keyring(KeyringError::new(KeyringErrorKind::MissingKey))
    }

    pub(crate) fn invalid_config(key: &str) -> Self {
        Self::Config(ConfigError {
            key: key.to_owned(),
            backtrace: Backtrace::capture(),
        })
    }

    pub(crate) fn read_timeout(destination: u16) -> Self {
        Self::ReadTimeout(ReadTimeoutError {
            destination,
            backtrace: Backtrace::capture(),
        })
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// Value or ASDU did not match the datapoint type
    pub fn is_translation_error(&self) -> bool {
        matches!(self, Self::Translation(_))
    }

    /// Any network link failure, including a closed link
    pub fn is_link_error(&self) -> bool {
        matches!(self, Self::Link(_))
    }

    /// Operation attempted on a closed link
    pub fn is_link_closed(&self) -> bool {
        matches!(self, Self::Link(e) if e.is_closed())
    }

    /// Secure handshake rejected the peer or the credentials
    pub fn is_authentication_error(&self) -> bool {
        matches!(self, Self::Security(e) if e.kind == SecurityErrorKind::Authentication)
    }

    /// A wrapped frame failed tag or sequence validation
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            Self::Security(e)
                if matches!(e.kind, SecurityErrorKind::Integrity | SecurityErrorKind::Replay)
        )
    }

    /// Keep-alive acknowledgment missed
    pub fn is_session_timeout(&self) -> bool {
        matches!(self, Self::Security(e) if e.kind == SecurityErrorKind::SessionTimeout)
    }

    /// Secure session is no longer usable
    pub fn is_session_closed(&self) -> bool {
        matches!(self, Self::Security(e) if e.kind == SecurityErrorKind::SessionClosed)
    }

    /// No read response in time
    pub fn is_read_timeout(&self) -> bool {
        matches!(self, Self::ReadTimeout(_))
    }

    /// Keyring could not be opened or decrypted
    pub fn is_keyring_error(&self) -> bool {
        matches!(self, Self::Keyring(_))
    }

    /// Configuration entry was rejected
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Backtrace captured where the error was created
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            Self::Protocol(e) => Some(&e.backtrace),
            Self::Connection(e) => Some(&e.backtrace),
            Self::Transport(e) => Some(&e.backtrace),
            Self::Addressing(e) => Some(&e.backtrace),
            Self::Translation(e) => Some(&e.backtrace),
            Self::Link(e) => Some(&e.backtrace),
            Self::Security(e) => Some(&e.backtrace),
            Self::Keyring(e) => Some(&e.backtrace),
            Self::ReadTimeout(e) => Some(&e.backtrace),
            Self::Config(e) => Some(&e.backtrace),
            Self::InvalidState | Self::Timeout => None,
        }
    }
}

// =============================================================================
// Display Implementation
// =============================================================================

impl fmt::Display for KnxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnxError::Protocol(e) => write!(f, "Protocol error: {:?}", e.kind),
            KnxError::Connection(e) => match e.status {
                Some(status) => write!(f, "Connection error: {:?} (status 0x{status:02X})", e.kind),
                None => write!(f, "Connection error: {:?}", e.kind),
            },
            KnxError::Transport(e) => write!(f, "Transport error: {:?}", e.kind),
            KnxError::Addressing(e) => write!(f, "Addressing error: {:?}", e.kind),
            KnxError::Translation(e) => write!(f, "Translation error: {:?}", e.kind),
            KnxError::Link(e) => match &e.source {
                Some(cause) => write!(f, "Link error: {:?}: {cause}", e.kind),
                None => write!(f, "Link error: {:?}", e.kind),
            },
            KnxError::Security(e) => write!(f, "Security error: {:?}", e.kind),
            KnxError::Keyring(e) => match &e.io {
                Some(io) => write!(f, "Keyring error: {:?}: {io}", e.kind),
                None => write!(f, "Keyring error: {:?}", e.kind),
            },
            KnxError::ReadTimeout(e) => {
                write!(f, "No read response from group 0x{:04X}", e.destination)
            }
            KnxError::Config(e) => write!(f, "Invalid configuration value for {}", e.key),
            KnxError::InvalidState => write!(f, "Invalid state"),
            KnxError::Timeout => write!(f, "Operation timeout"),
        }
    }
}

impl std::error::Error for KnxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KnxError::Link(e) => e
                .source
                .as_deref()
                .map(|cause| cause as &(dyn std::error::Error + 'static)),
            KnxError::Keyring(e) => e
                .io
                .as_ref()
                .map(|io| io as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}
