//! Typed group communication on top of a [`NetworkLink`].
//!
//! [`ProcessCommunicator`] turns values into group telegrams and incoming
//! group telegrams into [`ProcessEvent`]s. Events go to a broadcast channel
//! and to every registered [`ProcessListener`], one listener after the
//! other. A failing listener does not stop the others; its error is sent to
//! the error channel instead.
//!
//! ## Example
//!
//! ```rust,no_run
//! use knx_link::{ga, ProcessCommunicator};
//! use knx_link::dpt::DptValue;
//!
//! # async fn demo(link: knx_link::link::NetworkLink) -> knx_link::Result<()> {
//! let pc = ProcessCommunicator::new(link);
//! pc.write_bool(ga!(1 / 0 / 3), true).await?;
//! pc.write(ga!(1 / 2 / 10), &DptValue::Float(21.5), "9.001").await?;
//!
//! let on = pc.read_bool(ga!(1 / 0 / 3)).await?;
//! let temperature = pc.read_float(ga!(1 / 2 / 10), "9.001").await?;
//! # let _ = (on, temperature);
//! # Ok(())
//! # }
//! ```

pub mod event;

pub use event::{ListenerError, ProcessEvent, ProcessListener};

use core::fmt;
use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::addressing::GroupAddress;
use crate::dpt::{Asdu, DatapointType, Dpt1, DptValue};
use crate::error::{KnxError, Result};
use crate::knx_log;
use crate::link::{LinkEvent, NetworkLink};
use crate::protocol::cemi::{GroupService, LDataFrame};

const EVENT_CAPACITY: usize = 64;

struct Inner {
    link: NetworkLink,
    response_timeout: Duration,
    events: broadcast::Sender<ProcessEvent>,
    listeners: RwLock<Vec<Arc<dyn ProcessListener>>>,
    errors: mpsc::UnboundedSender<ListenerError>,
    error_receiver: std::sync::Mutex<Option<mpsc::UnboundedReceiver<ListenerError>>>,
    dispatcher: std::sync::Mutex<Option<JoinHandle<()>>>,
    detached: AtomicBool,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read().map_or(0, |listeners| listeners.len());
        f.debug_struct("ProcessCommunicator")
            .field("link", &self.link)
            .field("response_timeout", &self.response_timeout)
            .field("listeners", &listeners)
            .field("detached", &self.detached)
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn dispatch(&self, event: ProcessEvent) {
        let _ = self.events.send(event.clone());

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            let result = match event.service {
                GroupService::Write => listener.group_write(&event).await,
                GroupService::Read => listener.group_read_request(&event).await,
                GroupService::Response => listener.group_read_response(&event).await,
            };
            if let Err(error) = result {
                knx_log!(
                    warn,
                    "Listener failed on {:?} to {}: {}",
                    event.service,
                    event.destination,
                    error
                );
                let _ = self.errors.send(ListenerError {
                    event: event.clone(),
                    error,
                });
            }
        }
    }
}

/// Group reads and writes over one link.
///
/// Cloning is cheap; clones share listeners and channels.
#[derive(Debug, Clone)]
pub struct ProcessCommunicator {
    inner: Arc<Inner>,
}

impl ProcessCommunicator {
    /// Attach to `link`, using the link's response timeout for reads.
    ///
    /// Must be called inside a tokio runtime; dispatching runs on its own
    /// task.
    pub fn new(link: NetworkLink) -> Self {
        let response_timeout = link.response_timeout();
        Self::with_response_timeout(link, response_timeout)
    }

    /// Attach to `link` with an explicit bound for read responses
    pub fn with_response_timeout(link: NetworkLink, response_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (errors, error_receiver) = mpsc::unbounded_channel();
        let link_events = link.subscribe();
        let inner = Arc::new(Inner {
            link,
            response_timeout,
            events,
            listeners: RwLock::new(Vec::new()),
            errors,
            error_receiver: std::sync::Mutex::new(Some(error_receiver)),
            dispatcher: std::sync::Mutex::new(None),
            detached: AtomicBool::new(false),
        });

        let handle = tokio::spawn(dispatch_loop(Arc::downgrade(&inner), link_events));
        *inner.dispatcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Self { inner }
    }

    /// Link the communicator sends on
    pub fn link(&self) -> &NetworkLink {
        &self.inner.link
    }

    /// Bound for read responses
    pub fn response_timeout(&self) -> Duration {
        self.inner.response_timeout
    }

    /// Register a listener
    pub fn add_listener(&self, listener: Arc<dyn ProcessListener>) {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Unregister a listener; returns whether it was registered
    pub fn remove_listener(&self, listener: &Arc<dyn ProcessListener>) -> bool {
        let mut listeners = self.inner.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|registered| !Arc::ptr_eq(registered, listener));
        listeners.len() != before
    }

    /// Receive every process event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.inner.events.subscribe()
    }

    /// Listener failures. Only the first call gets the receiver.
    pub fn take_error_receiver(&self) -> Option<mpsc::UnboundedReceiver<ListenerError>> {
        self.inner
            .error_receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Write `value` to `address`, encoded as `dpt_id`.
    ///
    /// # Errors
    ///
    /// A translation error if the value does not fit the type; a link error
    /// if the telegram cannot be sent.
    pub async fn write(&self, address: GroupAddress, value: &DptValue, dpt_id: &str) -> Result<()> {
        let dpt = DatapointType::parse(dpt_id)?;
        self.send_value(GroupService::Write, address, value, &dpt).await
    }

    /// Write a DPT 1.001 switch value
    pub async fn write_bool(&self, address: GroupAddress, value: bool) -> Result<()> {
        let dpt = DatapointType::Boolean(Dpt1::Switch);
        self.send_value(GroupService::Write, address, &DptValue::Bool(value), &dpt)
            .await
    }

    /// Answer a read request for `address` with `value`
    pub async fn respond(&self, address: GroupAddress, value: &DptValue, dpt_id: &str) -> Result<()> {
        let dpt = DatapointType::parse(dpt_id)?;
        self.send_value(GroupService::Response, address, value, &dpt).await
    }

    /// Read `address` and decode the response as `dpt_id`.
    ///
    /// Sends a read request and waits for the first read response from the
    /// same group. Responses arriving after the timeout are ignored.
    ///
    /// # Errors
    ///
    /// A read timeout if no response arrives within the response timeout
    /// (the link stays open); a translation error if the response does not
    /// decode as `dpt_id`.
    pub async fn read(&self, address: GroupAddress, dpt_id: &str) -> Result<DptValue> {
        let dpt = DatapointType::parse(dpt_id)?;
        let asdu = self.read_asdu(address).await?;
        dpt.decode(&asdu)
    }

    /// Read a DPT 1.001 switch value
    pub async fn read_bool(&self, address: GroupAddress) -> Result<bool> {
        let value = self.read(address, "1.001").await?;
        value.as_bool().ok_or_else(KnxError::dpt_type_mismatch)
    }

    /// Read an unsigned value (DPT 5.xxx or 7.xxx)
    pub async fn read_unsigned(&self, address: GroupAddress, dpt_id: &str) -> Result<u32> {
        let value = self.read(address, dpt_id).await?;
        value.as_unsigned().ok_or_else(KnxError::dpt_type_mismatch)
    }

    /// Read a signed value (DPT 13.xxx)
    pub async fn read_signed(&self, address: GroupAddress, dpt_id: &str) -> Result<i32> {
        let value = self.read(address, dpt_id).await?;
        value.as_signed().ok_or_else(KnxError::dpt_type_mismatch)
    }

    /// Read a float value (DPT 9.xxx)
    pub async fn read_float(&self, address: GroupAddress, dpt_id: &str) -> Result<f32> {
        let value = self.read(address, dpt_id).await?;
        value.as_float().ok_or_else(KnxError::dpt_type_mismatch)
    }

    /// Stop dispatching and notify every listener. Later calls do nothing.
    pub fn detach(&self) {
        if self.inner.detached.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self
            .inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        let listeners = core::mem::take(
            &mut *self.inner.listeners.write().unwrap_or_else(PoisonError::into_inner),
        );
        for listener in listeners {
            listener.detached();
        }
        knx_log!(debug, "Process communicator detached");
    }

    /// Whether `detach` was called
    pub fn is_detached(&self) -> bool {
        self.inner.detached.load(Ordering::Acquire)
    }

    async fn send_value(
        &self,
        service: GroupService,
        address: GroupAddress,
        value: &DptValue,
        dpt: &DatapointType,
    ) -> Result<()> {
        let asdu = dpt.encode(value)?;
        let frame = LDataFrame::group(
            service,
            self.inner.link.individual_address(),
            address,
            &asdu,
            dpt.is_compact(),
        )?;
        self.inner.link.send(&frame).await
    }

    async fn read_asdu(&self, address: GroupAddress) -> Result<Asdu> {
        // Subscribe first so a fast response is not missed
        let mut responses = self.inner.events.subscribe();
        let request = LDataFrame::group(
            GroupService::Read,
            self.inner.link.individual_address(),
            address,
            &[],
            true,
        )?;
        self.inner.link.send(&request).await?;

        let response = async {
            loop {
                match responses.recv().await {
                    Ok(event) if event.service == GroupService::Response && event.destination == address => {
                        return Ok(event.asdu);
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return Err(KnxError::link_closed()),
                }
            }
        };
        match timeout(self.inner.response_timeout, response).await {
            Ok(asdu) => asdu,
            Err(_) => {
                knx_log!(debug, "No read response from {} within {:?}", address, self.inner.response_timeout);
                Err(KnxError::read_timeout(address.raw()))
            }
        }
    }
}

async fn dispatch_loop(inner: Weak<Inner>, mut link_events: broadcast::Receiver<LinkEvent>) {
    loop {
        let event = match link_events.recv().await {
            Ok(LinkEvent::Indication(frame)) => match ProcessEvent::from_frame(&frame) {
                Some(event) => event,
                None => continue,
            },
            Ok(LinkEvent::Disconnected(reason)) => {
                knx_log!(info, "Link down ({:?}), process dispatch ends", reason);
                return;
            }
            Ok(LinkEvent::Connected | LinkEvent::FrameDropped(_)) => continue,
            Err(RecvError::Lagged(missed)) => {
                knx_log!(warn, "Process dispatch lagged, {} link events lost", missed);
                continue;
            }
            Err(RecvError::Closed) => return,
        };

        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.dispatch(event).await;
    }
}
