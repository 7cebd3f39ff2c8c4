//! Discovery orchestration
//!
//! A [`DeviceManager`] owns the USB and Ethernet contexts and runs at most
//! one discovery at a time over them. Results are ordered by transport:
//! libusb, FTDI, Ethernet, then HTTP.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tether_core::{
    DeviceIdentification, EthernetDeviceInfo, EthernetIdentification, EthernetProtocol,
    UsbIdentification,
};
use tether_net::{
    dedupe, EthernetCommunication, HostProbe, HttpCommunication, Interface, NeighborResolver,
    ScannerConfig, SystemResolver, DEFAULT_HTTP_PORT,
};
use tether_usb::{ftdi, libusb, FtdiCommunication, LibUsbCommunication, UsbContext};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::EthernetContext;
use crate::device::DeviceCommunication;
use crate::error::DiscoveryError;
use crate::session::{DiscoverySession, DiscoveryStatus};
use crate::settings::Settings;

/// Spawn a session task on the ambient runtime, or on a runtime driven by a
/// dedicated thread until the task finishes
fn spawn_session<F>(task: F) -> Result<JoinHandle<()>, DiscoveryError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(runtime) = Handle::try_current() {
        return Ok(runtime.spawn(task));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let handle = runtime.spawn(async move {
        task.await;
        let _ = done_tx.send(());
    });

    // A panicking task drops the sender, which also ends the thread
    std::thread::Builder::new()
        .name("tether-discovery".to_string())
        .spawn(move || {
            runtime.block_on(async {
                let _ = done_rx.await;
            });
        })?;

    Ok(handle)
}

/// Builder for [`DeviceManager`]
pub struct DeviceManagerBuilder {
    usb: bool,
    ethernet: bool,
    scanner: ScannerConfig,
    resolver: Option<Arc<dyn NeighborResolver>>,
    probe: Option<Arc<dyn HostProbe>>,
    interfaces: Option<Vec<Interface>>,
}

impl Default for DeviceManagerBuilder {
    fn default() -> Self {
        Self {
            usb: true,
            ethernet: true,
            scanner: ScannerConfig::default(),
            resolver: None,
            probe: None,
            interfaces: None,
        }
    }
}

impl DeviceManagerBuilder {
    pub fn usb(mut self, enabled: bool) -> Self {
        self.usb = enabled;
        self
    }

    pub fn ethernet(mut self, enabled: bool) -> Self {
        self.ethernet = enabled;
        self
    }

    pub fn scanner_config(mut self, config: ScannerConfig) -> Self {
        self.scanner = config;
        self
    }

    /// Resolver for peer MAC addresses and hostnames
    pub fn resolver(mut self, resolver: Arc<dyn NeighborResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Replace the socket probe used by Ethernet scans
    pub fn probe(mut self, probe: Arc<dyn HostProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Scan from these interfaces instead of the host's own
    pub fn interfaces(mut self, interfaces: Vec<Interface>) -> Self {
        self.interfaces = Some(interfaces);
        self
    }

    pub fn build(self) -> DeviceManager {
        let usb = if self.usb {
            match UsbContext::new() {
                Ok(context) => Some(context),
                Err(e) => {
                    warn!(error = %e, "USB discovery unavailable");
                    None
                }
            }
        } else {
            None
        };

        let resolver = self.resolver.unwrap_or_else(|| Arc::new(SystemResolver));
        let mut ethernet = match self.probe {
            Some(probe) => EthernetContext::with_probe(resolver, self.scanner, probe),
            None => EthernetContext::new(resolver, self.scanner),
        };
        if let Some(interfaces) = self.interfaces {
            ethernet = ethernet.with_interfaces(interfaces);
        }

        info!(
            usb = usb.is_some(),
            ethernet = self.ethernet,
            max_concurrent_probes = ethernet.scanner().max_concurrent(),
            "Device manager ready"
        );

        DeviceManager {
            usb: Mutex::new(usb),
            ethernet,
            ethernet_enabled: self.ethernet,
            discovery: tokio::sync::Mutex::new(()),
            shut_down: AtomicBool::new(false),
        }
    }
}

/// Criteria grouped by transport
#[derive(Default)]
struct CriteriaSet {
    usb: Vec<UsbIdentification>,
    ethernet: Vec<EthernetIdentification>,
    http: Vec<EthernetIdentification>,
}

impl CriteriaSet {
    fn split(criteria: &[DeviceIdentification]) -> Self {
        let mut set = Self::default();
        for criterion in criteria {
            match criterion {
                DeviceIdentification::Usb(c) => set.usb.push(c.clone()),
                DeviceIdentification::Ethernet(c) => set.ethernet.push(c.clone()),
                DeviceIdentification::Http(c) => {
                    let mut c = c.clone();
                    if c.port == 0 {
                        c.port = DEFAULT_HTTP_PORT;
                    }
                    c.protocol = EthernetProtocol::Tcp;
                    set.http.push(c);
                }
            }
        }
        set
    }
}

/// Owner of the native contexts and entry point for discovery
pub struct DeviceManager {
    usb: Mutex<Option<UsbContext>>,
    ethernet: EthernetContext,
    ethernet_enabled: bool,
    /// Held for the whole of one discovery
    discovery: tokio::sync::Mutex<()>,
    shut_down: AtomicBool,
}

impl DeviceManager {
    pub fn builder() -> DeviceManagerBuilder {
        DeviceManagerBuilder::default()
    }

    /// Manager with default contexts and both transports enabled
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::builder()
            .usb(settings.discovery.usb)
            .ethernet(settings.discovery.ethernet)
            .scanner_config(settings.discovery.scanner_config())
            .build()
    }

    pub fn ethernet_context(&self) -> &EthernetContext {
        &self.ethernet
    }

    pub fn usb_available(&self) -> bool {
        self.usb_context().is_some()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn usb_context(&self) -> Option<UsbContext> {
        self.usb.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Discover devices matching any of `criteria`.
    ///
    /// Waits for any discovery already in progress on this manager.
    pub async fn discover(
        &self,
        criteria: &[DeviceIdentification],
    ) -> Result<Vec<DeviceCommunication>, DiscoveryError> {
        let mut devices = Vec::new();
        let mut collect = |batch: Vec<DeviceCommunication>| devices.extend(batch);
        self.run(criteria, &mut collect, &|_: DiscoveryStatus| {}).await?;
        Ok(devices)
    }

    /// Blocking form of [`discover`](Self::discover) for callers without a
    /// runtime. Fails with [`DiscoveryError::NestedRuntime`] inside one.
    pub fn get_devices(
        &self,
        criteria: &[DeviceIdentification],
    ) -> Result<Vec<DeviceCommunication>, DiscoveryError> {
        if Handle::try_current().is_ok() {
            return Err(DiscoveryError::NestedRuntime);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.discover(criteria))
    }

    /// Run discovery on a background task.
    ///
    /// `on_status` sees every phase, starting with `Queued`. `on_devices` is
    /// called once per transport that found something. Inside a tokio runtime
    /// the session is a task on that runtime; otherwise it gets a dedicated
    /// thread with its own runtime.
    pub fn get_devices_async<D, S>(
        self: &Arc<Self>,
        criteria: Vec<DeviceIdentification>,
        mut on_devices: D,
        on_status: S,
    ) -> Result<DiscoverySession, DiscoveryError>
    where
        D: FnMut(Vec<DeviceCommunication>) + Send + 'static,
        S: Fn(DiscoveryStatus) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let (status_tx, status_rx) = watch::channel(DiscoveryStatus::Queued);
        let report = move |status: DiscoveryStatus| {
            status_tx.send_replace(status);
            on_status(status);
        };

        let manager = Arc::clone(self);
        let handle = spawn_session(async move {
            debug!(session = %id, criteria = criteria.len(), "Discovery session queued");
            report(DiscoveryStatus::Queued);

            if let Err(e) = manager.run(&criteria, &mut on_devices, &report).await {
                warn!(session = %id, error = %e, "Discovery session aborted");
                report(DiscoveryStatus::Completed);
            }
        })?;

        Ok(DiscoverySession::new(id, status_rx, handle))
    }

    /// Refuse new discoveries, wait for the running one, then release the
    /// USB context
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let _guard = self.discovery.lock().await;
        let released = self
            .usb
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        info!(usb = released.is_some(), "Device manager shut down");
    }

    async fn run<D, S>(
        &self,
        criteria: &[DeviceIdentification],
        on_devices: &mut D,
        on_status: &S,
    ) -> Result<(), DiscoveryError>
    where
        D: FnMut(Vec<DeviceCommunication>) + Send,
        S: Fn(DiscoveryStatus) + Sync,
    {
        if self.is_shut_down() {
            return Err(DiscoveryError::ShutDown);
        }
        let _guard = self.discovery.lock().await;
        if self.is_shut_down() {
            return Err(DiscoveryError::ShutDown);
        }

        let set = CriteriaSet::split(criteria);
        info!(
            usb = set.usb.len(),
            ethernet = set.ethernet.len(),
            http = set.http.len(),
            "Starting discovery"
        );

        on_status(DiscoveryStatus::EnumeratingUsb);
        let usb = self.discover_usb(set.usb).await;
        let usb_count = usb.len();
        if !usb.is_empty() {
            on_devices(usb);
        }

        on_status(DiscoveryStatus::EnumeratingEthernet);
        let mut ethernet_count = 0;
        let wants_ethernet = !(set.ethernet.is_empty() && set.http.is_empty());
        if wants_ethernet && !self.ethernet_enabled {
            debug!("Ethernet discovery disabled, skipping Ethernet and HTTP criteria");
        } else if wants_ethernet {
            let interfaces = self.ethernet.interfaces();
            debug!(interfaces = interfaces.len(), "Interfaces available for scanning");

            let resolver = self.ethernet.resolver();
            let ethernet: Vec<DeviceCommunication> = self
                .scan(&interfaces, &set.ethernet)
                .await
                .into_iter()
                .map(|info| EthernetCommunication::new(info, resolver.clone()).into())
                .collect();
            ethernet_count += ethernet.len();
            if !ethernet.is_empty() {
                on_devices(ethernet);
            }

            let http: Vec<DeviceCommunication> = self
                .scan(&interfaces, &set.http)
                .await
                .into_iter()
                .map(|info| HttpCommunication::new(info).into())
                .collect();
            ethernet_count += http.len();
            if !http.is_empty() {
                on_devices(http);
            }
        }

        info!(usb = usb_count, ethernet = ethernet_count, "Discovery complete");
        on_status(DiscoveryStatus::Completed);
        Ok(())
    }

    async fn discover_usb(&self, criteria: Vec<UsbIdentification>) -> Vec<DeviceCommunication> {
        if criteria.is_empty() {
            return Vec::new();
        }
        let Some(context) = self.usb_context() else {
            debug!("USB discovery unavailable, skipping USB criteria");
            return Vec::new();
        };

        let task = tokio::task::spawn_blocking(move || {
            let mut devices: Vec<DeviceCommunication> = libusb::devices(&context, &criteria)
                .into_iter()
                .map(|info| LibUsbCommunication::new(context.clone(), info).into())
                .collect();
            devices.extend(
                ftdi::devices(&context, &criteria)
                    .into_iter()
                    .map(|info| FtdiCommunication::new(context.clone(), info).into()),
            );
            devices
        });

        match task.await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "USB enumeration task failed");
                Vec::new()
            }
        }
    }

    async fn scan(
        &self,
        interfaces: &[Interface],
        criteria: &[EthernetIdentification],
    ) -> Vec<EthernetDeviceInfo> {
        let mut found = Vec::new();
        for criterion in criteria {
            found.extend(self.ethernet.scanner().discover(interfaces, criterion).await);
        }
        dedupe(found)
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tether_core::{IpAddress, MacAddress};

    struct TableProbe {
        hosts: HashMap<(IpAddress, u16), MacAddress>,
    }

    impl HostProbe for TableProbe {
        fn probe(&self, ip: IpAddress, port: u16, protocol: EthernetProtocol) -> Option<EthernetDeviceInfo> {
            let mac = *self.hosts.get(&(ip, port))?;
            Some(EthernetDeviceInfo {
                hostname: format!("host-{}", ip),
                ip,
                mac,
                port,
                protocol,
            })
        }
    }

    fn manager(hosts: &[(&str, u16)]) -> DeviceManager {
        let hosts = hosts
            .iter()
            .enumerate()
            .map(|(i, (ip, port))| ((ip.parse().unwrap(), *port), MacAddress([0x02, 0, 0, 0, 0, i as u8 + 1])))
            .collect();
        DeviceManager::builder()
            .usb(false)
            .interfaces(Vec::new())
            .probe(Arc::new(TableProbe { hosts }))
            .build()
    }

    #[test]
    fn test_split_applies_http_defaults() {
        let set = CriteriaSet::split(&[
            UsbIdentification::new(0x0403, 0x6010).into(),
            EthernetIdentification::host("10.0.0.2", 502, EthernetProtocol::Udp).into(),
            DeviceIdentification::Http(EthernetIdentification::host("10.0.0.3", 0, EthernetProtocol::Udp)),
        ]);
        assert_eq!(set.usb.len(), 1);
        assert_eq!(set.ethernet[0].protocol, EthernetProtocol::Udp);
        assert_eq!(set.http[0].port, 80);
        assert_eq!(set.http[0].protocol, EthernetProtocol::Tcp);
    }

    #[tokio::test]
    async fn test_transport_order() {
        let manager = manager(&[("10.0.0.2", 502), ("10.0.0.3", 80)]);
        let devices = manager
            .discover(&[
                DeviceIdentification::Http(EthernetIdentification::host("10.0.0.3", 0, EthernetProtocol::Tcp)),
                EthernetIdentification::host("10.0.0.2", 502, EthernetProtocol::Tcp).into(),
            ])
            .await
            .unwrap();

        let kinds: Vec<_> = devices.iter().map(|d| d.kind().name()).collect();
        assert_eq!(kinds, vec!["ethernet", "http"]);
    }

    #[tokio::test]
    async fn test_duplicate_criteria_are_merged() {
        let manager = manager(&[("10.0.0.2", 502)]);
        let criterion: DeviceIdentification =
            EthernetIdentification::host("10.0.0.2", 502, EthernetProtocol::Tcp).into();
        let devices = manager
            .discover(&[criterion.clone(), criterion])
            .await
            .unwrap();
        assert_eq!(devices.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_omitted() {
        let manager = manager(&[("10.0.0.2", 502)]);
        let devices = manager
            .discover(&[EthernetIdentification::host("10.0.0.9", 502, EthernetProtocol::Tcp).into()])
            .await
            .unwrap();
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn test_ethernet_disabled() {
        let manager = DeviceManager::builder()
            .usb(false)
            .ethernet(false)
            .probe(Arc::new(TableProbe {
                hosts: HashMap::from([(("10.0.0.2".parse().unwrap(), 502), MacAddress([2, 0, 0, 0, 0, 1]))]),
            }))
            .build();
        let devices = manager
            .discover(&[EthernetIdentification::host("10.0.0.2", 502, EthernetProtocol::Tcp).into()])
            .await
            .unwrap();
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn test_async_session_reports_phases() {
        let manager = Arc::new(manager(&[("10.0.0.2", 502)]));
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let batches = Arc::new(Mutex::new(Vec::new()));

        let status_sink = statuses.clone();
        let device_sink = batches.clone();
        let session = manager.get_devices_async(
            vec![EthernetIdentification::host("10.0.0.2", 502, EthernetProtocol::Tcp).into()],
            move |devices: Vec<DeviceCommunication>| device_sink.lock().unwrap().push(devices.len()),
            move |status| status_sink.lock().unwrap().push(status),
        )
        .unwrap();
        session.wait().await.unwrap();

        assert_eq!(
            *statuses.lock().unwrap(),
            vec![
                DiscoveryStatus::Queued,
                DiscoveryStatus::EnumeratingUsb,
                DiscoveryStatus::EnumeratingEthernet,
                DiscoveryStatus::Completed,
            ]
        );
        assert_eq!(*batches.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_discovery() {
        let manager = manager(&[]);
        manager.shutdown().await;
        assert!(manager.is_shut_down());
        assert!(!manager.usb_available());
        assert!(matches!(
            manager.discover(&[]).await,
            Err(DiscoveryError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn test_get_devices_refuses_inside_runtime() {
        let manager = manager(&[]);
        assert!(matches!(
            manager.get_devices(&[]),
            Err(DiscoveryError::NestedRuntime)
        ));
    }

    #[test]
    fn test_get_devices_blocking() {
        let manager = manager(&[("10.0.0.2", 502)]);
        let devices = manager
            .get_devices(&[EthernetIdentification::host("10.0.0.2", 502, EthernetProtocol::Tcp).into()])
            .unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].to_string(), "[ethernet] host-10.0.0.2 10.0.0.2:502 (TCP) [02:00:00:00:00:01]");
    }

    #[test]
    fn test_async_session_without_runtime() {
        let manager = Arc::new(manager(&[("10.0.0.2", 502)]));
        let (status_tx, status_rx) = std::sync::mpsc::channel();
        let found = Arc::new(Mutex::new(0));

        let device_sink = found.clone();
        let session = manager
            .get_devices_async(
                vec![EthernetIdentification::host("10.0.0.2", 502, EthernetProtocol::Tcp).into()],
                move |devices: Vec<DeviceCommunication>| *device_sink.lock().unwrap() += devices.len(),
                move |status| {
                    let _ = status_tx.send(status);
                },
            )
            .unwrap();

        let mut statuses = Vec::new();
        while statuses.last() != Some(&DiscoveryStatus::Completed) {
            statuses.push(status_rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap());
        }
        assert_eq!(statuses[0], DiscoveryStatus::Queued);
        assert_eq!(*found.lock().unwrap(), 1);

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(session.wait()).unwrap();
    }
}
