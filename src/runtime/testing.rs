//! Mock implementations for testing
//!
//! In-memory stand-ins for every I/O seam, plus a ready-wired engine.

use super::traits::*;
use crate::catalog::{CatalogNode, CatalogResolver};
use crate::connection::{Credentials, DeliveryReceipt, TransportError, TransportEvent};
use crate::db::{Order, OrderMessage, OrderStatus};
use crate::finalizer::OrderFinalizer;
use crate::notify::NotifyError;
use crate::router::CommandRouter;
use crate::session::SessionStore;
use crate::state_machine::EngineContext;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

fn injected_failure() -> StoreError {
    StoreError::Unavailable("injected failure".to_string())
}

// ============================================================================
// Catalog
// ============================================================================

/// Catalog held in a vector; insertion order is listing order
#[derive(Default)]
pub struct InMemoryCatalog {
    nodes: Mutex<Vec<CatalogNode>>,
    fail_next: AtomicBool,
}

impl InMemoryCatalog {
    pub fn new(nodes: Vec<CatalogNode>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn insert(&self, node: CatalogNode) {
        self.nodes.lock().unwrap().push(node);
    }

    pub fn set_price(&self, id: &str, price: Option<f64>) {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes.iter_mut().find(|n| n.id == id).unwrap();
        node.price = price;
    }

    /// Make the next lookup fail
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn children(&self, parent_id: Option<&str>) -> Result<Vec<CatalogNode>, StoreError> {
        self.check()?;
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.parent_id.as_deref() == parent_id)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<CatalogNode>, StoreError> {
        self.check()?;
        Ok(self.nodes.lock().unwrap().iter().find(|n| n.id == id).cloned())
    }
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<Vec<Order>>,
    fail_next: AtomicBool,
    fail_status_write: AtomicBool,
}

impl InMemoryOrderStore {
    /// Make the next `append_message` fail after staging the entry but
    /// before the status write
    pub fn fail_status_write(&self) {
        self.fail_status_write.store(true, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<Order> {
        self.orders.lock().unwrap().clone()
    }

    pub fn get_sync(&self, id: &str) -> Order {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .unwrap()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(())
    }

    fn with_order<T>(&self, id: &str, f: impl FnOnce(&mut Order) -> T) -> Result<T, StoreError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(f(order))
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        self.check()?;
        self.orders.lock().unwrap().push(order.clone());
        Ok(())
    }

    async fn find_active_by_user(
        &self,
        user_id: &str,
        statuses: &[OrderStatus],
    ) -> Result<Option<Order>, StoreError> {
        self.check()?;
        // Later pushes are more recent
        Ok(self
            .orders
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|o| o.user_id == user_id && statuses.contains(&o.status))
            .cloned())
    }

    async fn append_message(
        &self,
        order_id: &str,
        entry: &OrderMessage,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        self.check()?;
        let fail_status = self.fail_status_write.swap(false, Ordering::SeqCst);
        self.with_order(order_id, |o| {
            // Staged on a copy and committed only when both writes succeed
            let mut staged = o.clone();
            staged.messages.push(entry.clone());
            if fail_status {
                return Err(injected_failure());
            }
            staged.status = status;
            *o = staged;
            Ok(())
        })?
    }

    async fn set_status(&self, order_id: &str, status: OrderStatus) -> Result<(), StoreError> {
        self.check()?;
        self.with_order(order_id, |o| o.status = status)
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        self.check()?;
        Ok(self.orders.lock().unwrap().iter().find(|o| o.id == order_id).cloned())
    }
}

// ============================================================================
// Help and notifications
// ============================================================================

pub struct StaticHelp {
    text: String,
    failing: AtomicBool,
}

impl StaticHelp {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl HelpSource for StaticHelp {
    async fn help_text(&self) -> Result<String, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(self.text.clone())
    }
}

/// Records every notification; can be told to fail after recording
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    /// Wait until at least `count` notifications arrived
    pub async fn wait_for(&self, count: usize) {
        for _ in 0..200 {
            if self.messages.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} notifications, got {:?}", self.messages());
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        self.messages.lock().unwrap().push(text.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected { status: 503 });
        }
        Ok(())
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// Message sender that records instead of delivering
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub async fn wait_for(&self, count: usize) -> Vec<(String, String)> {
        for _ in 0..400 {
            if self.sent.lock().unwrap().len() >= count {
                return self.sent();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} sends, got {:?}", self.sent());
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, conversation_id: &str, content: &str) -> Option<DeliveryReceipt> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((conversation_id.to_string(), content.to_string()));
        Some(DeliveryReceipt {
            message_id: format!("msg-{}", sent.len()),
        })
    }
}

/// Scriptable transport
pub struct MockTransport {
    connect_results: Mutex<VecDeque<Result<(), TransportError>>>,
    connects: Mutex<Vec<Option<Credentials>>>,
    send_results: Mutex<VecDeque<Result<(), TransportError>>>,
    sent: Mutex<Vec<(String, String)>>,
    logouts: AtomicUsize,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        Self {
            connect_results: Mutex::new(VecDeque::new()),
            connects: Mutex::new(Vec::new()),
            send_results: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            logouts: AtomicUsize::new(0),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next `connect` returns this; the default is success
    pub fn queue_connect(&self, result: Result<(), TransportError>) {
        self.connect_results.lock().unwrap().push_back(result);
    }

    pub fn queue_send_error(&self, error: TransportError) {
        self.send_results.lock().unwrap().push_back(Err(error));
    }

    pub fn connects(&self) -> Vec<Option<Credentials>> {
        self.connects.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    pub fn event_sender(&self) -> mpsc::Sender<TransportEvent> {
        self.events_tx.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, credentials: Option<&Credentials>) -> Result<(), TransportError> {
        self.connects.lock().unwrap().push(credentials.cloned());
        self.connect_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn send(&self, conversation_id: &str, content: &str) -> Result<DeliveryReceipt, TransportError> {
        self.send_results.lock().unwrap().pop_front().unwrap_or(Ok(()))?;
        let mut sent = self.sent.lock().unwrap();
        sent.push((conversation_id.to_string(), content.to_string()));
        Ok(DeliveryReceipt {
            message_id: format!("mock-{}", sent.len()),
        })
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx.lock().unwrap().take()
    }
}

// ============================================================================
// Wired engine
// ============================================================================

/// Engine context over in-memory collaborators, with handles to inspect them
pub struct EngineFixture {
    pub catalog: Arc<InMemoryCatalog>,
    pub orders: Arc<InMemoryOrderStore>,
    pub help: Arc<StaticHelp>,
    pub notifier: Arc<RecordingNotifier>,
    pub ctx: Arc<EngineContext>,
}

impl EngineFixture {
    pub const HELP: &'static str = "Reply with a number to pick a service.";

    pub fn with_nodes(nodes: Vec<CatalogNode>) -> Self {
        let catalog = Arc::new(InMemoryCatalog::new(nodes));
        let orders = Arc::new(InMemoryOrderStore::default());
        let help = Arc::new(StaticHelp::new(Self::HELP));
        let notifier = Arc::new(RecordingNotifier::default());

        let resolver = CatalogResolver::new(catalog.clone());
        let finalizer = OrderFinalizer::new(resolver.clone(), orders.clone(), notifier.clone(), "$");
        let ctx = Arc::new(EngineContext {
            catalog: resolver,
            orders: orders.clone(),
            help: help.clone(),
            finalizer,
            currency: "$".to_string(),
        });

        Self {
            catalog,
            orders,
            help,
            notifier,
            ctx,
        }
    }

    /// Two roots: a zero-priced "Design" and a $25 "Logos"
    pub fn design_and_logos() -> Self {
        Self::with_nodes(vec![
            CatalogNode::new("design", "Design").with_price(0.0),
            CatalogNode::new("logos", "Logos").with_price(25.0),
        ])
    }

    /// Design > Logos > {Basic, Premium}, plus an empty Printing root
    pub fn nested() -> Self {
        Self::with_nodes(Self::nested_nodes())
    }

    pub fn nested_nodes() -> Vec<CatalogNode> {
        vec![
            CatalogNode::new("design", "Design"),
            CatalogNode::new("printing", "Printing"),
            CatalogNode::new("logos", "Logos").with_parent("design"),
            CatalogNode::new("basic", "Basic Logo").with_parent("logos").with_price(25.0),
            CatalogNode::new("premium", "Premium Logo").with_parent("logos").with_price(75.0),
        ]
    }

    pub fn router(&self) -> CommandRouter {
        CommandRouter::new(Arc::clone(&self.ctx), Arc::new(SessionStore::new()))
    }

    /// Place an order directly; returns its id
    pub async fn place_order(&self, user: &str, node_id: &str) -> String {
        let node = self.catalog.find_by_id(node_id).await.unwrap().unwrap();
        self.ctx.finalizer.finalize(user, &node).await.unwrap().id
    }
}
