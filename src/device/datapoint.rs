//! Datapoints and the model that owns them.

use std::collections::BTreeMap;

use crate::addressing::GroupAddress;
use crate::dpt::{DatapointType, DptValue};
use crate::error::{KnxError, Result};

/// A named, typed communication object reachable through a group address.
///
/// Immutable once created; the current value is kept by the
/// [`DatapointModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datapoint {
    address: GroupAddress,
    name: String,
    dpt: DatapointType,
}

impl Datapoint {
    /// Datapoint of type `dpt`
    pub fn new(address: GroupAddress, name: impl Into<String>, dpt: DatapointType) -> Self {
        Self {
            address,
            name: name.into(),
            dpt,
        }
    }

    /// Datapoint whose type is given by identifier (`"1.001"`, `"DPST-9-1"`)
    pub fn with_dpt_id(address: GroupAddress, name: impl Into<String>, dpt_id: &str) -> Result<Self> {
        Ok(Self::new(address, name, DatapointType::parse(dpt_id)?))
    }

    /// Group address the datapoint is reachable through
    pub fn address(&self) -> GroupAddress {
        self.address
    }

    /// Human readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Translator for this datapoint's values
    pub fn dpt(&self) -> &DatapointType {
        &self.dpt
    }

    /// Canonical type identifier, e.g. `"9.001"`
    pub fn dpt_id(&self) -> &'static str {
        self.dpt.identifier()
    }

    /// Main number of the datapoint type
    pub fn main_number(&self) -> u16 {
        self.dpt.main_number()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    datapoint: Datapoint,
    value: Option<DptValue>,
}

/// Datapoints of a device, at most one per group address
#[derive(Debug, Clone, Default)]
pub struct DatapointModel {
    entries: BTreeMap<GroupAddress, Entry>,
}

impl DatapointModel {
    /// Model without datapoints
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a datapoint.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the address already has a datapoint.
    pub fn add(&mut self, datapoint: Datapoint) -> Result<()> {
        if self.entries.contains_key(&datapoint.address) {
            return Err(KnxError::InvalidState);
        }
        self.entries.insert(
            datapoint.address,
            Entry {
                datapoint,
                value: None,
            },
        );
        Ok(())
    }

    /// Builder form of [`add`](Self::add)
    pub fn with(mut self, datapoint: Datapoint) -> Result<Self> {
        self.add(datapoint)?;
        Ok(self)
    }

    /// Datapoint registered at `address`
    pub fn get(&self, address: &GroupAddress) -> Option<&Datapoint> {
        self.entries.get(address).map(|entry| &entry.datapoint)
    }

    /// Whether `address` has a datapoint
    pub fn contains(&self, address: &GroupAddress) -> bool {
        self.entries.contains_key(address)
    }

    /// Unregister a datapoint, dropping its value
    pub fn remove(&mut self, address: &GroupAddress) -> Option<Datapoint> {
        self.entries.remove(address).map(|entry| entry.datapoint)
    }

    /// Datapoints in address order
    pub fn iter(&self) -> impl Iterator<Item = &Datapoint> {
        self.entries.values().map(|entry| &entry.datapoint)
    }

    /// Number of datapoints
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no datapoint is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last value written to `address`, if any
    pub fn value(&self, address: &GroupAddress) -> Option<DptValue> {
        self.entries.get(address).and_then(|entry| entry.value)
    }

    /// Store a value; returns false for unknown addresses
    pub(crate) fn set_value(&mut self, address: &GroupAddress, value: DptValue) -> bool {
        match self.entries.get_mut(address) {
            Some(entry) => {
                entry.value = Some(value);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switch() -> Datapoint {
        Datapoint::with_dpt_id(GroupAddress::from(0x0803), "Kitchen light", "1.001").unwrap()
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let mut model = DatapointModel::new();
        model.add(switch()).unwrap();
        let other = Datapoint::with_dpt_id(GroupAddress::from(0x0803), "Dimmer", "5.001").unwrap();
        assert!(matches!(model.add(other), Err(KnxError::InvalidState)));
        assert_eq!(model.get(&GroupAddress::from(0x0803)).unwrap().name(), "Kitchen light");
    }

    #[test]
    fn test_values_follow_registration() {
        let mut model = DatapointModel::new().with(switch()).unwrap();
        let address = GroupAddress::from(0x0803);
        assert_eq!(model.value(&address), None);
        assert!(model.set_value(&address, DptValue::Bool(true)));
        assert_eq!(model.value(&address), Some(DptValue::Bool(true)));
        assert!(!model.set_value(&GroupAddress::from(0x0804), DptValue::Bool(true)));

        assert_eq!(model.remove(&address).map(|dp| dp.main_number()), Some(1));
        assert!(model.is_empty());
    }

    #[test]
    fn test_model_lookup() {
        let temperature = Datapoint::with_dpt_id(GroupAddress::from(0x1900), "Kitchen temperature", "9.001").unwrap();
        assert_eq!(temperature.address(), GroupAddress::from(0x1900));
        assert_eq!(temperature.name(), "Kitchen temperature");
        assert_eq!(temperature.dpt_id(), "9.001");

        let model = DatapointModel::new().with(switch()).unwrap().with(temperature).unwrap();
        assert_eq!(model.len(), 2);
        assert!(model.contains(&GroupAddress::from(0x1900)));
        assert!(!model.contains(&GroupAddress::from(0x1901)));
        assert_eq!(model.get(&GroupAddress::from(0x0803)).map(Datapoint::dpt_id), Some("1.001"));
        assert!(model.get(&GroupAddress::from(0x1901)).is_none());
    }

    #[test]
    fn test_unknown_dpt() {
        assert!(Datapoint::with_dpt_id(GroupAddress::from(1), "x", "99.001").is_err());
    }
}
