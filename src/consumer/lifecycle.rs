//! Consumer session lifecycle
//!
//! A fragmented session moves through
//!
//! ```text
//! Idle ─► Registered ─► Initialized ─► Streaming ─► Exiting ─► Deregistered
//! ```
//!
//! [`open_fragmented`] covers everything up to Streaming and hands back a
//! [`FragmentedSession`] whose [`run`](FragmentedSession::run) waits on the
//! exit signal. Deregistration is tied to [`Registration`]'s `Drop`, so it
//! happens on every path, including the handler future being dropped.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::exit::{exit_signal, ExitReceiver, ExitSender};
use super::fragmented::FragmentedConsumer;
use super::keyframe::KeyframeConsumer;
use super::{Consumer, ConsumerInfo};
use crate::error::{Error, Result};
use crate::fmp4::{patch_video_rotate, patch_video_scale};
use crate::media::MediaSelection;
use crate::registry::Stream;

/// Scoped consumer registration; removes the consumer on drop
pub struct Registration {
    stream: Arc<Stream>,
    consumer: Arc<dyn Consumer>,
}

impl Registration {
    /// Add `consumer` to `stream`
    pub fn register(stream: Arc<Stream>, consumer: Arc<dyn Consumer>) -> Result<Self> {
        stream.add_consumer(Arc::clone(&consumer))?;
        Ok(Self { stream, consumer })
    }

    pub fn stream(&self) -> &Arc<Stream> {
        &self.stream
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.stream.remove_consumer(&self.consumer);
    }
}

/// Body channel to the client
///
/// The first failed write pushes [`Error::ClientWrite`] onto the exit signal
/// and disables the channel; later writes are no-ops.
pub struct OutputChannel {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    exit: ExitSender,
}

impl OutputChannel {
    pub fn new(tx: mpsc::Sender<Bytes>, exit: ExitSender) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            exit,
        }
    }

    /// Queue one payload. Returns `false` if the channel is (now) closed.
    pub async fn write(&self, data: Bytes) -> bool {
        let Some(tx) = self.tx.lock().clone() else {
            return false;
        };

        if tx.send(data).await.is_err() {
            self.fail(Error::ClientWrite("client disconnected".into()));
            return false;
        }
        true
    }

    /// Disable the channel and report `err` as the session outcome
    pub fn fail(&self, err: Error) {
        if self.tx.lock().take().is_some() {
            self.exit.send(Err(err));
        }
    }

    /// Disable the channel and end the session cleanly
    pub fn close(&self) {
        if self.tx.lock().take().is_some() {
            self.exit.send(Ok(()));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().as_ref().map_or(true, |tx| tx.is_closed())
    }

    fn sender(&self) -> Option<mpsc::Sender<Bytes>> {
        self.tx.lock().clone()
    }
}

/// Optional stream deadline; pushes a clean exit when it fires
#[derive(Debug)]
pub struct DeadlineTimer {
    handle: JoinHandle<()>,
}

impl DeadlineTimer {
    pub fn arm(after: Duration, exit: ExitSender) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if exit.send(Ok(())) {
                tracing::debug!(after = ?after, "Stream deadline reached");
            }
        });
        Self { handle }
    }

    /// Stop the timer; it never fires afterwards
    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Parameters for a fragmented MP4 session
#[derive(Debug, Clone)]
pub struct FragmentedRequest {
    pub info: ConsumerInfo,
    pub selection: MediaSelection,
    /// Clockwise rotation in degrees (90, 180, 270)
    pub rotate: Option<i32>,
    /// Horizontal and vertical scale factors
    pub scale: Option<(i32, i32)>,
    /// Stop cleanly after this long
    pub duration: Option<Duration>,
    /// Payloads queued per client before backpressure
    pub buffer: usize,
}

impl FragmentedRequest {
    pub fn new(info: ConsumerInfo, selection: MediaSelection) -> Self {
        Self {
            info,
            selection,
            rotate: None,
            scale: None,
            duration: None,
            buffer: 64,
        }
    }
}

/// What the HTTP layer needs to start the response
#[derive(Debug)]
pub struct SessionStart {
    pub mime_type: String,
    /// Init segment first, then one fragment per sample
    pub body: mpsc::Receiver<Bytes>,
}

/// A registered, streaming fragmented consumer
pub struct FragmentedSession {
    registration: Registration,
    consumer: Arc<FragmentedConsumer>,
    exit: ExitReceiver,
    timer: Option<DeadlineTimer>,
    watch: JoinHandle<()>,
    stop: ExitSender,
}

impl FragmentedSession {
    pub fn stream(&self) -> &Arc<Stream> {
        self.registration.stream()
    }

    pub fn consumer(&self) -> &Arc<FragmentedConsumer> {
        &self.consumer
    }

    /// Handle that ends the session from outside; sending `Ok(())` is a
    /// clean stop
    pub fn stopper(&self) -> ExitSender {
        self.stop.clone()
    }

    /// Wait for the first exit value, then cancel the timer and deregister
    pub async fn run(self) -> Result<()> {
        let FragmentedSession {
            registration,
            consumer,
            exit,
            timer,
            watch,
            stop: _,
        } = self;

        let result = exit.wait().await;

        if let Some(timer) = timer {
            timer.cancel();
        }
        watch.abort();
        drop(consumer);
        drop(registration);

        result
    }
}

/// Register a fragmented consumer on `stream`, write its init segment and
/// start streaming.
///
/// Errors before streaming leave nothing registered.
pub async fn open_fragmented(
    stream: Arc<Stream>,
    request: FragmentedRequest,
) -> Result<(SessionStart, FragmentedSession)> {
    let (exit_tx, exit_rx) = exit_signal();
    let (body_tx, body_rx) = mpsc::channel(request.buffer.max(1));

    let consumer = Arc::new(FragmentedConsumer::new(
        request.info,
        request.selection,
        OutputChannel::new(body_tx, exit_tx.clone()),
    ));

    let registration = Registration::register(stream, consumer.clone())?;

    let mut init = consumer.init()?;
    if let Some(degrees) = request.rotate {
        patch_video_rotate(&mut init, degrees);
    }
    if let Some((sx, sy)) = request.scale {
        patch_video_scale(&mut init, sx, sy);
    }

    if !consumer.output().write(init.freeze()).await {
        return Err(Error::ClientWrite("init segment not delivered".into()));
    }
    let mime_type = consumer.mime_type();
    consumer.start();

    let watch = watch_disconnect(consumer.output().sender(), exit_tx.clone());
    let timer = request
        .duration
        .filter(|d| !d.is_zero())
        .map(|d| DeadlineTimer::arm(d, exit_tx.clone()));

    Ok((
        SessionStart {
            mime_type,
            body: body_rx,
        },
        FragmentedSession {
            registration,
            consumer,
            exit: exit_rx,
            timer,
            watch,
            stop: exit_tx,
        },
    ))
}

/// End the session as soon as the client drops the body, without waiting
/// for the next write
fn watch_disconnect(tx: Option<mpsc::Sender<Bytes>>, exit: ExitSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Some(tx) = tx {
            tx.closed().await;
        }
        exit.send(Err(Error::ClientWrite("client disconnected".into())));
    })
}

/// A single-keyframe MP4 payload
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub data: Bytes,
    pub mime_type: String,
}

/// Register a keyframe consumer, wait for its one delivery and deregister
pub async fn capture_keyframe(stream: Arc<Stream>, info: ConsumerInfo) -> Result<Snapshot> {
    let (tx, rx) = oneshot::channel();
    let consumer = Arc::new(KeyframeConsumer::new(info, tx));

    let _registration = Registration::register(stream, consumer.clone())?;

    let data = rx
        .await
        .map_err(|_| Error::StreamClosed("no keyframe before the stream closed".into()))??;

    Ok(Snapshot {
        data,
        mime_type: consumer.mime_type(),
    })
}
