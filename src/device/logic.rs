//! Service logic answering group traffic for a datapoint model.
//!
//! Writes to a known datapoint are decoded with its translator, handed to
//! the datapoint's [`ValueSink`] and cached. Read requests ask the
//! datapoint's [`ValueProvider`] for the current value and produce a read
//! response. Traffic for addresses outside the model is ignored; the bus is
//! shared and every device sees telegrams meant for others.

use std::collections::HashMap;
use std::sync::Arc;

use crate::addressing::{GroupAddress, IndividualAddress};
use crate::device::datapoint::{Datapoint, DatapointModel};
use crate::dpt::DptValue;
use crate::error::Result;
use crate::knx_log;
use crate::process::ProcessEvent;
use crate::protocol::cemi::{GroupService, LDataFrame};

/// Supplies the value reported for a read request
pub trait ValueProvider: Send + Sync {
    /// Value of `datapoint`; `cached` is the last value written to it
    fn value(&self, datapoint: &Datapoint, cached: Option<&DptValue>) -> Result<DptValue>;
}

/// Receives values written to a datapoint
pub trait ValueSink: Send + Sync {
    /// `value` was written to `datapoint`
    fn update(&self, datapoint: &Datapoint, value: &DptValue) -> Result<()>;
}

impl<F> ValueProvider for F
where
    F: Fn(&Datapoint, Option<&DptValue>) -> Result<DptValue> + Send + Sync,
{
    fn value(&self, datapoint: &Datapoint, cached: Option<&DptValue>) -> Result<DptValue> {
        self(datapoint, cached)
    }
}

impl<F> ValueSink for F
where
    F: Fn(&Datapoint, &DptValue) -> Result<()> + Send + Sync,
{
    fn update(&self, datapoint: &Datapoint, value: &DptValue) -> Result<()> {
        self(datapoint, value)
    }
}

/// Reports the cached value, or the type's zero value before the first write
#[derive(Debug, Clone, Copy, Default)]
pub struct CachedValue;

impl ValueProvider for CachedValue {
    fn value(&self, datapoint: &Datapoint, cached: Option<&DptValue>) -> Result<DptValue> {
        Ok(cached.copied().unwrap_or_else(|| datapoint.dpt().default_value()))
    }
}

/// Authoritative local values for a set of datapoints
pub struct DeviceServiceLogic {
    address: IndividualAddress,
    model: DatapointModel,
    providers: HashMap<GroupAddress, Arc<dyn ValueProvider>>,
    sinks: HashMap<GroupAddress, Arc<dyn ValueSink>>,
    default_provider: Arc<dyn ValueProvider>,
}

impl core::fmt::Debug for DeviceServiceLogic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceServiceLogic")
            .field("address", &self.address)
            .field("model", &self.model)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("sinks", &self.sinks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl DeviceServiceLogic {
    /// Logic over `model`, answering from cached values
    pub fn new(model: DatapointModel) -> Self {
        Self {
            address: IndividualAddress::from(0xFFFF),
            model,
            providers: HashMap::new(),
            sinks: HashMap::new(),
            default_provider: Arc::new(CachedValue),
        }
    }

    /// Source address of the produced responses
    #[must_use]
    pub fn with_address(mut self, address: IndividualAddress) -> Self {
        self.address = address;
        self
    }

    /// Provider used for datapoints without their own
    #[must_use]
    pub fn with_default_provider(mut self, provider: Arc<dyn ValueProvider>) -> Self {
        self.default_provider = provider;
        self
    }

    /// Provider for the datapoint at `address`
    #[must_use]
    pub fn with_provider(mut self, address: GroupAddress, provider: Arc<dyn ValueProvider>) -> Self {
        self.providers.insert(address, provider);
        self
    }

    /// Sink for the datapoint at `address`
    #[must_use]
    pub fn with_sink(mut self, address: GroupAddress, sink: Arc<dyn ValueSink>) -> Self {
        self.sinks.insert(address, sink);
        self
    }

    /// Source address for group responses
    pub fn address(&self) -> IndividualAddress {
        self.address
    }

    /// Datapoints this logic answers for
    pub fn model(&self) -> &DatapointModel {
        &self.model
    }

    /// Mutable access for adding or removing datapoints at runtime
    pub fn model_mut(&mut self) -> &mut DatapointModel {
        &mut self.model
    }

    /// Current value at `address`, as last written
    pub fn value(&self, address: &GroupAddress) -> Option<DptValue> {
        self.model.value(address)
    }

    /// React to one process event.
    ///
    /// Returns the read response to send, if any. Events for unknown
    /// addresses and read responses yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// A translation error if a written value does not decode as the
    /// datapoint's type, or the error of a failing provider or sink. The
    /// cached value is left unchanged.
    pub fn handle(&mut self, event: &ProcessEvent) -> Result<Option<LDataFrame>> {
        let address = event.destination;
        let Some(datapoint) = self.model.get(&address) else {
            knx_log!(trace, "No datapoint at {}, ignoring {:?}", address, event.service);
            return Ok(None);
        };

        match event.service {
            GroupService::Write => {
                let value = datapoint.dpt().decode(&event.asdu)?;
                if let Some(sink) = self.sinks.get(&address) {
                    sink.update(datapoint, &value)?;
                }
                knx_log!(debug, "{} ({}) = {}", address, datapoint.name(), datapoint.dpt().format(&value));
                self.model.set_value(&address, value);
                Ok(None)
            }
            GroupService::Read => {
                let cached = self.model.value(&address);
                let provider = self.providers.get(&address).unwrap_or(&self.default_provider);
                let value = provider.value(datapoint, cached.as_ref())?;
                let dpt = datapoint.dpt();
                let asdu = dpt.encode(&value)?;
                let response =
                    LDataFrame::group(GroupService::Response, self.address, address, &asdu, dpt.is_compact())?;
                Ok(Some(response))
            }
            GroupService::Response => Ok(None),
        }
    }
}
