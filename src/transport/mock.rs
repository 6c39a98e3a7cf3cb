//! Scriptable transport double.
//!
//! Test-only [`DeviceTransport`] implementation. Tests script device
//! notifications, per-step failures, device values, and service channel
//! traffic, then assert on the ordered call log and captured sends.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, DeviceId};
use crate::options::InstallOptions;
use crate::protocol::frame;
use crate::registry::Device;

use super::connection::ServiceConnection;
use super::interface::{
    CapabilityQuery, DeviceTransport, NotificationReceiver, ProgressSink, TransportNotification,
};

// ============================================================================
// Types
// ============================================================================

/// One scripted read result on a mock service channel.
enum MockChunk {
    /// Bytes delivered to the reader.
    Data(Vec<u8>),
    /// End of stream.
    Eof,
    /// An I/O error surfaced to the reader.
    Err(io::ErrorKind),
}

/// Reader half of a mock channel: scripted chunks plus carry-over bytes.
struct ChannelReader {
    rx: mpsc::UnboundedReceiver<MockChunk>,
    pending: VecDeque<u8>,
}

/// One mock service channel.
struct Channel {
    reader: Arc<tokio::sync::Mutex<ChannelReader>>,
    inbound: mpsc::UnboundedSender<MockChunk>,
    sent: Arc<Mutex<Vec<u8>>>,
    fd: i32,
    invalidated: bool,
}

/// Scripted behavior knobs.
#[derive(Default)]
struct MockState {
    fail_connect: Option<String>,
    fail_pair: Option<String>,
    fail_validate: Option<String>,
    fail_session: Option<String>,
    fail_mount: Option<String>,
    fail_service: Option<String>,
    fail_transfer: Option<String>,
    fail_install: Option<String>,
    /// First N sends on any channel accept nothing (would-block).
    send_block_count: usize,
    values: FxHashMap<String, String>,
    calls: Vec<String>,
    started_services: Vec<String>,
    responder: Option<Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>>,
}

// ============================================================================
// MockTransport
// ============================================================================

/// Scriptable [`DeviceTransport`] double.
pub struct MockTransport {
    notify_tx: mpsc::UnboundedSender<TransportNotification>,
    notify_rx: Mutex<Option<NotificationReceiver>>,
    state: Mutex<MockState>,
    channels: Mutex<FxHashMap<ConnectionId, Channel>>,
    next_conn: AtomicU64,
}

impl MockTransport {
    /// Creates a mock wrapped in the shared handle the engine expects.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
            state: Mutex::new(MockState::default()),
            channels: Mutex::new(FxHashMap::default()),
            next_conn: AtomicU64::new(1),
        })
    }

    // ========================================================================
    // Notification scripting
    // ========================================================================

    /// Queues a connect notification.
    pub fn notify_connected(&self, device: Device) {
        let _ = self.notify_tx.send(TransportNotification::Connected(device));
    }

    /// Queues a disconnect notification.
    pub fn notify_disconnected(&self, id: DeviceId) {
        let _ = self.notify_tx.send(TransportNotification::Disconnected(id));
    }

    /// Queues an unknown-code notification.
    pub fn notify_unknown(&self, code: u32) {
        let _ = self.notify_tx.send(TransportNotification::Unknown(code));
    }

    // ========================================================================
    // Behavior scripting
    // ========================================================================

    /// Makes the next connect call fail.
    pub fn fail_connect(&self, message: &str) {
        self.state.lock().fail_connect = Some(message.to_owned());
    }

    /// Makes the next pair call fail.
    pub fn fail_pair(&self, message: &str) {
        self.state.lock().fail_pair = Some(message.to_owned());
    }

    /// Makes the next pairing validation fail.
    pub fn fail_validate(&self, message: &str) {
        self.state.lock().fail_validate = Some(message.to_owned());
    }

    /// Makes the next session start fail.
    pub fn fail_session(&self, message: &str) {
        self.state.lock().fail_session = Some(message.to_owned());
    }

    /// Makes the next disk image mount fail.
    pub fn fail_mount(&self, message: &str) {
        self.state.lock().fail_mount = Some(message.to_owned());
    }

    /// Makes the next service start fail.
    pub fn fail_service(&self, message: &str) {
        self.state.lock().fail_service = Some(message.to_owned());
    }

    /// Makes the next transfer fail midway.
    pub fn fail_transfer(&self, message: &str) {
        self.state.lock().fail_transfer = Some(message.to_owned());
    }

    /// Makes the next install fail midway.
    pub fn fail_install(&self, message: &str) {
        self.state.lock().fail_install = Some(message.to_owned());
    }

    /// Makes the first `count` channel sends accept nothing.
    pub fn block_sends(&self, count: usize) {
        self.state.lock().send_block_count = count;
    }

    /// Sets a device value returned by `copy_value`.
    pub fn set_value(&self, key: &str, value: &str) {
        self.state.lock().values.insert(key.to_owned(), value.to_owned());
    }

    /// Installs a responder invoked on every channel send; returned chunks
    /// are queued for the reader.
    pub fn set_responder(&self, responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static) {
        self.state.lock().responder = Some(Box::new(responder));
    }

    // ========================================================================
    // Channel scripting
    // ========================================================================

    /// Opens a pre-established service channel (bypassing service start).
    #[must_use]
    pub fn open_channel(&self) -> ServiceConnection {
        let id = ConnectionId::from_raw(self.next_conn.fetch_add(1, Ordering::Relaxed));
        self.insert_channel(id);
        ServiceConnection::new(id)
    }

    /// Queues bytes for the reader of a channel.
    pub fn push_data(&self, id: ConnectionId, bytes: &[u8]) {
        self.push_chunk(id, MockChunk::Data(bytes.to_vec()));
    }

    /// Queues one encoded protocol frame for the reader of a channel.
    pub fn push_frame(&self, id: ConnectionId, payload: &[u8]) {
        self.push_chunk(id, MockChunk::Data(frame::encode(payload)));
    }

    /// Queues end-of-stream for the reader of a channel.
    pub fn push_eof(&self, id: ConnectionId) {
        self.push_chunk(id, MockChunk::Eof);
    }

    /// Queues an I/O error for the reader of a channel.
    pub fn push_io_error(&self, id: ConnectionId, kind: io::ErrorKind) {
        self.push_chunk(id, MockChunk::Err(kind));
    }

    // ========================================================================
    // Assertions
    // ========================================================================

    /// Returns every byte sent on a channel so far.
    #[must_use]
    pub fn sent_bytes(&self, id: ConnectionId) -> Vec<u8> {
        self.channels
            .lock()
            .get(&id)
            .map(|c| c.sent.lock().clone())
            .unwrap_or_default()
    }

    /// Returns the ordered transport call log.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Returns the service names started so far.
    #[must_use]
    pub fn started_services(&self) -> Vec<String> {
        self.state.lock().started_services.clone()
    }

    /// Returns whether a channel has been invalidated.
    #[must_use]
    pub fn is_invalidated(&self, id: ConnectionId) -> bool {
        self.channels
            .lock()
            .get(&id)
            .is_some_and(|c| c.invalidated)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn insert_channel(&self, id: ConnectionId) {
        let (inbound, rx) = mpsc::unbounded_channel();
        let channel = Channel {
            reader: Arc::new(tokio::sync::Mutex::new(ChannelReader {
                rx,
                pending: VecDeque::new(),
            })),
            inbound,
            sent: Arc::new(Mutex::new(Vec::new())),
            fd: 30 + id.as_raw() as i32,
            invalidated: false,
        };
        self.channels.lock().insert(id, channel);
    }

    fn push_chunk(&self, id: ConnectionId, chunk: MockChunk) {
        if let Some(channel) = self.channels.lock().get(&id) {
            let _ = channel.inbound.send(chunk);
        }
    }

    fn record(&self, call: &str) {
        self.state.lock().calls.push(call.to_owned());
    }

    fn take_failure(&self, pick: impl FnOnce(&mut MockState) -> Option<String>) -> Option<String> {
        let mut state = self.state.lock();
        pick(&mut state)
    }
}

// ============================================================================
// DeviceTransport Implementation
// ============================================================================

#[async_trait]
impl DeviceTransport for MockTransport {
    fn subscribe(&self) -> Result<NotificationReceiver> {
        self.record("subscribe");
        self.notify_rx
            .lock()
            .take()
            .ok_or_else(|| Error::config("mock notifications already subscribed"))
    }

    fn unsubscribe(&self) {
        self.record("unsubscribe");
    }

    async fn connect(&self, device: &Device) -> Result<()> {
        self.record("connect");
        match self.take_failure(|s| s.fail_connect.take()) {
            Some(msg) => Err(Error::connect(device.id.clone(), msg)),
            None => Ok(()),
        }
    }

    async fn pair(&self, device: &Device) -> Result<()> {
        self.record("pair");
        match self.take_failure(|s| s.fail_pair.take()) {
            Some(msg) => Err(Error::pairing(device.id.clone(), msg)),
            None => Ok(()),
        }
    }

    async fn validate_pairing(&self, device: &Device) -> Result<()> {
        self.record("validate_pairing");
        match self.take_failure(|s| s.fail_validate.take()) {
            Some(msg) => Err(Error::pairing_validation(device.id.clone(), msg)),
            None => Ok(()),
        }
    }

    async fn start_session(&self, device: &Device) -> Result<()> {
        self.record("start_session");
        match self.take_failure(|s| s.fail_session.take()) {
            Some(msg) => Err(Error::session_start(device.id.clone(), msg)),
            None => Ok(()),
        }
    }

    async fn stop_session(&self, _device: &Device) -> Result<()> {
        self.record("stop_session");
        Ok(())
    }

    async fn disconnect(&self, _device: &Device) -> Result<()> {
        self.record("disconnect");
        Ok(())
    }

    async fn copy_value(&self, _device: &Device, key: &str) -> Result<Option<String>> {
        self.record("copy_value");
        Ok(self.state.lock().values.get(key).cloned())
    }

    async fn capability_version_check(
        &self,
        _device: &Device,
        query: &CapabilityQuery,
    ) -> Result<bool> {
        self.record("capability_version_check");
        let state = self.state.lock();
        let Some(value) = state.values.get(&query.key) else {
            return Ok(false);
        };
        let major: u32 = value
            .split('.')
            .next()
            .and_then(|m| m.parse().ok())
            .unwrap_or(0);
        Ok(major >= query.minimum_version)
    }

    async fn mount_disk_image(
        &self,
        _device: &Device,
        _image: &Path,
        _signature: &Path,
    ) -> Result<()> {
        self.record("mount_disk_image");
        match self.take_failure(|s| s.fail_mount.take()) {
            Some(msg) => Err(Error::mount(msg)),
            None => Ok(()),
        }
    }

    async fn start_secure_service(
        &self,
        _device: &Device,
        name: &str,
    ) -> Result<ServiceConnection> {
        self.record("start_secure_service");
        if let Some(msg) = self.take_failure(|s| s.fail_service.take()) {
            return Err(Error::service_start(name, msg));
        }
        self.state.lock().started_services.push(name.to_owned());
        Ok(self.open_channel())
    }

    async fn transfer_app(
        &self,
        _device: &Device,
        _bundle: &Path,
        _options: &InstallOptions,
        progress: ProgressSink,
    ) -> Result<()> {
        self.record("transfer_app");
        progress(0, "Copying");
        progress(25, "Copying");
        if let Some(msg) = self.take_failure(|s| s.fail_transfer.take()) {
            return Err(Error::transfer(msg));
        }
        progress(50, "Copying");
        Ok(())
    }

    async fn install_app(
        &self,
        _device: &Device,
        _bundle: &Path,
        _options: &InstallOptions,
        progress: ProgressSink,
    ) -> Result<()> {
        self.record("install_app");
        progress(75, "Installing");
        if let Some(msg) = self.take_failure(|s| s.fail_install.take()) {
            return Err(Error::install(msg));
        }
        progress(100, "Installing");
        Ok(())
    }

    async fn send(&self, conn: &ServiceConnection, bytes: &[u8]) -> Result<usize> {
        let replies = {
            let mut state = self.state.lock();
            if state.send_block_count > 0 {
                state.send_block_count -= 1;
                return Ok(0);
            }
            state
                .responder
                .as_mut()
                .map(|responder| responder(bytes))
                .unwrap_or_default()
        };

        {
            let channels = self.channels.lock();
            let channel = channels
                .get(&conn.id())
                .ok_or_else(|| Error::protocol(format!("send on unknown channel {conn}")))?;
            channel.sent.lock().extend_from_slice(bytes);
            for reply in replies {
                let _ = channel.inbound.send(MockChunk::Data(reply));
            }
        }

        Ok(bytes.len())
    }

    async fn receive(&self, conn: &ServiceConnection, buf: &mut [u8]) -> Result<usize> {
        let reader = {
            let channels = self.channels.lock();
            let channel = channels
                .get(&conn.id())
                .ok_or_else(|| Error::protocol(format!("receive on unknown channel {conn}")))?;
            Arc::clone(&channel.reader)
        };

        let mut reader = reader.lock().await;
        if reader.pending.is_empty() {
            match reader.rx.recv().await {
                Some(MockChunk::Data(chunk)) => reader.pending.extend(chunk),
                Some(MockChunk::Eof) | None => return Ok(0),
                Some(MockChunk::Err(kind)) => {
                    return Err(Error::Io(io::Error::new(kind, "scripted error")));
                }
            }
        }

        let n = buf.len().min(reader.pending.len());
        for slot in buf.iter_mut().take(n) {
            *slot = reader.pending.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn socket_descriptor(&self, conn: &ServiceConnection) -> Result<i32> {
        self.channels
            .lock()
            .get(&conn.id())
            .map(|c| c.fd)
            .ok_or_else(|| Error::protocol(format!("descriptor for unknown channel {conn}")))
    }

    fn invalidate(&self, conn: &ServiceConnection) {
        if let Some(channel) = self.channels.lock().get_mut(&conn.id()) {
            channel.invalidated = true;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::DeviceHandle;
    use crate::registry::DeviceInterface;

    fn device() -> Device {
        Device::new(
            "d1",
            DeviceInterface::Wired,
            true,
            DeviceHandle::from_raw(1),
        )
    }

    #[tokio::test]
    async fn test_scripted_connect_failure_is_one_shot() {
        let mock = MockTransport::shared();
        mock.fail_connect("nope");

        assert!(mock.connect(&device()).await.is_err());
        assert!(mock.connect(&device()).await.is_ok());
    }

    #[tokio::test]
    async fn test_channel_send_receive_roundtrip() {
        let mock = MockTransport::shared();
        let conn = mock.open_channel();

        mock.push_data(conn.id(), b"hello");
        let mut buf = [0u8; 16];
        let n = mock.receive(&conn, &mut buf).await.expect("receive");
        assert_eq!(&buf[..n], b"hello");

        mock.send(&conn, b"world").await.expect("send");
        assert_eq!(mock.sent_bytes(conn.id()), b"world");
    }

    #[tokio::test]
    async fn test_receive_splits_large_chunks() {
        let mock = MockTransport::shared();
        let conn = mock.open_channel();

        mock.push_data(conn.id(), b"abcdef");
        let mut buf = [0u8; 4];
        let n = mock.receive(&conn, &mut buf).await.expect("receive");
        assert_eq!(&buf[..n], b"abcd");
        let n = mock.receive(&conn, &mut buf).await.expect("receive");
        assert_eq!(&buf[..n], b"ef");
    }

    #[tokio::test]
    async fn test_receive_eof() {
        let mock = MockTransport::shared();
        let conn = mock.open_channel();
        mock.push_eof(conn.id());

        let mut buf = [0u8; 4];
        assert_eq!(mock.receive(&conn, &mut buf).await.expect("eof"), 0);
    }

    #[tokio::test]
    async fn test_blocked_sends_accept_nothing() {
        let mock = MockTransport::shared();
        let conn = mock.open_channel();
        mock.block_sends(2);

        assert_eq!(mock.send(&conn, b"x").await.expect("send"), 0);
        assert_eq!(mock.send(&conn, b"x").await.expect("send"), 0);
        assert_eq!(mock.send(&conn, b"x").await.expect("send"), 1);
    }

    #[tokio::test]
    async fn test_capability_check_parses_major_version() {
        let mock = MockTransport::shared();
        mock.set_value("ProductVersion", "14.2");

        let query = CapabilityQuery::secure_proxy_service();
        assert!(
            mock.capability_version_check(&device(), &query)
                .await
                .expect("check")
        );

        mock.set_value("ProductVersion", "13.7");
        assert!(
            !mock
                .capability_version_check(&device(), &query)
                .await
                .expect("check")
        );
    }

    #[tokio::test]
    async fn test_responder_replies_to_sends() {
        let mock = MockTransport::shared();
        let conn = mock.open_channel();
        mock.set_responder(|bytes| {
            if bytes == b"ping" {
                vec![b"pong".to_vec()]
            } else {
                Vec::new()
            }
        });

        mock.send(&conn, b"ping").await.expect("send");
        let mut buf = [0u8; 8];
        let n = mock.receive(&conn, &mut buf).await.expect("receive");
        assert_eq!(&buf[..n], b"pong");
    }
}
