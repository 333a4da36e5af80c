//! Process events and listeners.

use async_trait::async_trait;

use crate::addressing::{GroupAddress, IndividualAddress};
use crate::dpt::{Asdu, DatapointType, DptValue};
use crate::error::{KnxError, Result};
use crate::protocol::cemi::{GroupService, LDataFrame};

/// A group telegram seen on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEvent {
    /// Sender
    pub source: IndividualAddress,
    /// Addressed group
    pub destination: GroupAddress,
    /// Write, read request or read response
    pub service: GroupService,
    /// Encoded value; empty for read requests
    pub asdu: Asdu,
}

impl ProcessEvent {
    /// Event for a group telegram; `None` for anything else
    pub fn from_frame(frame: &LDataFrame) -> Option<Self> {
        Some(Self {
            source: frame.source,
            destination: frame.destination_group()?,
            service: frame.group_service()?,
            asdu: frame.data.clone(),
        })
    }

    /// Decode the carried value as `dpt`
    pub fn value(&self, dpt: &DatapointType) -> Result<DptValue> {
        dpt.decode(&self.asdu)
    }
}

/// A listener failure, reported on the communicator's error channel
#[derive(Debug)]
pub struct ListenerError {
    /// Event the listener was handling
    pub event: ProcessEvent,
    /// What went wrong
    pub error: KnxError,
}

/// Receives process events from a
/// [`ProcessCommunicator`](super::ProcessCommunicator).
///
/// Calls happen one at a time, in bus order. A listener that blocks stalls
/// delivery to every listener of the communicator.
#[async_trait]
pub trait ProcessListener: Send + Sync {
    /// A group value write
    async fn group_write(&self, event: &ProcessEvent) -> Result<()>;

    /// A group value read request
    async fn group_read_request(&self, _event: &ProcessEvent) -> Result<()> {
        Ok(())
    }

    /// A group value read response
    async fn group_read_response(&self, _event: &ProcessEvent) -> Result<()> {
        Ok(())
    }

    /// The communicator stopped dispatching to this listener
    fn detached(&self) {}
}
