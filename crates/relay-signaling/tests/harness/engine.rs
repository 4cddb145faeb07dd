//! In-memory media engine

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_signaling::{
    Error, MediaEngine, MediaTransport, Result, SinkEndpoint, SourceEndpoint, TransportSignal,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Engine endpoint recording every call made on it
pub struct FakeEndpoint {
    id: String,
    signals: broadcast::Sender<TransportSignal>,
    closes: AtomicUsize,
    releases: AtomicUsize,
    offers: Mutex<Vec<String>>,
    answers: Mutex<Vec<String>>,
}

impl FakeEndpoint {
    fn new(id: String) -> Arc<Self> {
        let (signals, _) = broadcast::channel(32);
        Arc::new(Self {
            id,
            signals,
            closes: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            offers: Mutex::new(Vec::new()),
            answers: Mutex::new(Vec::new()),
        })
    }

    /// Emit a transport signal to every subscriber
    pub fn signal(&self, signal: TransportSignal) {
        let _ = self.signals.send(signal);
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Offers passed to `process_offer`
    pub fn offers(&self) -> Vec<String> {
        self.offers.lock().clone()
    }

    /// Answers passed to `process_answer`
    pub fn answers(&self) -> Vec<String> {
        self.answers.lock().clone()
    }
}

impl MediaTransport for FakeEndpoint {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportSignal> {
        self.signals.subscribe()
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceEndpoint for FakeEndpoint {
    async fn process_offer(&self, offer_sdp: &str) -> Result<String> {
        self.offers.lock().push(offer_sdp.to_string());
        Ok(format!("answer-from-{}", self.id))
    }
}

#[async_trait]
impl SinkEndpoint for FakeEndpoint {
    async fn create_offer(&self) -> Result<String> {
        Ok(format!("offer-from-{}", self.id))
    }

    async fn process_answer(&self, answer_sdp: &str) -> Result<()> {
        self.answers.lock().push(answer_sdp.to_string());
        Ok(())
    }

    fn release_consumers(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Media engine handing out [`FakeEndpoint`]s
#[derive(Default)]
pub struct FakeEngine {
    sources: Mutex<Vec<Arc<FakeEndpoint>>>,
    sinks: Mutex<Vec<Arc<FakeEndpoint>>>,
    delay: Mutex<Option<Duration>>,
    fail: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delay every endpoint creation
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Make endpoint creation fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sources(&self) -> Vec<Arc<FakeEndpoint>> {
        self.sources.lock().clone()
    }

    pub fn sinks(&self) -> Vec<Arc<FakeEndpoint>> {
        self.sinks.lock().clone()
    }

    async fn prepare(&self) -> Result<()> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::MediaEngineError("worker unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn create_incoming_endpoint(&self) -> Result<Arc<dyn SourceEndpoint>> {
        self.prepare().await?;
        let mut sources = self.sources.lock();
        let endpoint = FakeEndpoint::new(format!("in-{}", sources.len()));
        sources.push(Arc::clone(&endpoint));
        Ok(endpoint)
    }

    async fn create_outgoing_endpoint(
        &self,
        _source: Arc<dyn SourceEndpoint>,
    ) -> Result<Arc<dyn SinkEndpoint>> {
        self.prepare().await?;
        let mut sinks = self.sinks.lock();
        let endpoint = FakeEndpoint::new(format!("out-{}", sinks.len()));
        sinks.push(Arc::clone(&endpoint));
        Ok(endpoint)
    }
}
