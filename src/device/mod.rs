//! Device side of process communication.
//!
//! A [`KnxDevice`] owns a [`DeviceServiceLogic`] and plugs it into a
//! [`ProcessCommunicator`]: writes update the device's datapoints and read
//! requests are answered on the communicator's link.
//!
//! ```rust,no_run
//! use knx_link::device::{Datapoint, DatapointModel, DeviceServiceLogic, KnxDevice};
//! use knx_link::{ga, IndividualAddress, ProcessCommunicator};
//!
//! # fn demo(pc: &ProcessCommunicator) -> knx_link::Result<()> {
//! let model = DatapointModel::new()
//!     .with(Datapoint::with_dpt_id(ga!(1 / 0 / 3), "Kitchen light", "1.001")?)?;
//! let device = KnxDevice::new("actuator", IndividualAddress::new(1, 1, 20)?, DeviceServiceLogic::new(model));
//! device.attach(pc);
//! # Ok(())
//! # }
//! ```

pub mod datapoint;
pub mod logic;

pub use datapoint::{Datapoint, DatapointModel};
pub use logic::{CachedValue, DeviceServiceLogic, ValueProvider, ValueSink};

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::addressing::{GroupAddress, IndividualAddress};
use crate::dpt::DptValue;
use crate::error::Result;
use crate::knx_log;
use crate::link::NetworkLink;
use crate::process::{ProcessCommunicator, ProcessEvent, ProcessListener};

/// Listener answering on behalf of one device
struct DeviceListener {
    name: String,
    logic: Arc<Mutex<DeviceServiceLogic>>,
    link: NetworkLink,
}

impl DeviceListener {
    async fn serve(&self, event: &ProcessEvent) -> Result<()> {
        let response = self
            .logic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle(event)?;
        if let Some(frame) = response {
            knx_log!(debug, "{} answers read of {}", self.name, event.destination);
            self.link.send(&frame).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessListener for DeviceListener {
    async fn group_write(&self, event: &ProcessEvent) -> Result<()> {
        self.serve(event).await
    }

    async fn group_read_request(&self, event: &ProcessEvent) -> Result<()> {
        self.serve(event).await
    }

    fn detached(&self) {
        knx_log!(info, "Device {} detached", self.name);
    }
}

/// A device with datapoints, reachable through process communication
pub struct KnxDevice {
    name: String,
    address: IndividualAddress,
    logic: Arc<Mutex<DeviceServiceLogic>>,
    listener: Mutex<Option<Arc<dyn ProcessListener>>>,
}

impl core::fmt::Debug for KnxDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KnxDevice")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("logic", &self.logic)
            .finish_non_exhaustive()
    }
}

impl KnxDevice {
    /// Device `name` at `address`; responses carry `address` as source
    pub fn new(name: impl Into<String>, address: IndividualAddress, logic: DeviceServiceLogic) -> Self {
        Self {
            name: name.into(),
            address,
            logic: Arc::new(Mutex::new(logic.with_address(address))),
            listener: Mutex::new(None),
        }
    }

    /// Name given at construction, used in log output
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source address of the telegrams this device sends
    pub fn address(&self) -> IndividualAddress {
        self.address
    }

    /// Current value of the datapoint at `address`
    pub fn value(&self, address: &GroupAddress) -> Option<DptValue> {
        self.logic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .value(address)
    }

    /// Serve `pc`'s events.
    ///
    /// Only the latest attachment is remembered for [`detach`](Self::detach).
    pub fn attach(&self, pc: &ProcessCommunicator) {
        let listener: Arc<dyn ProcessListener> = Arc::new(DeviceListener {
            name: self.name.clone(),
            logic: Arc::clone(&self.logic),
            link: pc.link().clone(),
        });
        pc.add_listener(Arc::clone(&listener));
        let previous = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(listener);
        if previous.is_some() {
            knx_log!(debug, "Device {} re-attached", self.name);
        }
        knx_log!(info, "Device {} ({}) attached", self.name, self.address);
    }

    /// Stop serving `pc`; returns whether the device was attached to it
    pub fn detach(&self, pc: &ProcessCommunicator) -> bool {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match listener {
            Some(listener) => {
                let removed = pc.remove_listener(&listener);
                listener.detached();
                removed
            }
            None => false,
        }
    }
}
