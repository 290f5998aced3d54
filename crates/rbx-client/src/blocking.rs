//! Blocking adapter.
//!
//! Runs the same connection state machine on an owned background tokio
//! runtime, so synchronous callers get explicit `start()`/`stop()`
//! lifecycle control and REST calls that block until a result or
//! timeout. Registration and read-model queries are lock-based and need
//! no adaptation.

use crate::client::RabbitX;
use crate::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use rbx_core::{OrderRecord, PositionRecord, Topic};
use rbx_rest::{AccountInfo, AmendOrder, CreateOrder, MarketInfo};
use rbx_ws::{Handler, HandlerId, SessionState, WsClient, WsConfig, WsResult};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

pub struct BlockingClient {
    runtime: tokio::runtime::Runtime,
    client: RabbitX,
    ws: Arc<WsClient>,
    ws_task: Mutex<Option<JoinHandle<WsResult<()>>>>,
}

impl BlockingClient {
    pub fn new(client: RabbitX) -> ClientResult<Self> {
        let config = WsConfig::for_network(client.network());
        Self::with_ws_config(client, config)
    }

    pub fn with_ws_config(client: RabbitX, config: WsConfig) -> ClientResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let ws = Arc::new(client.ws_with_config(config));
        Ok(Self {
            runtime,
            client,
            ws,
            ws_task: Mutex::new(None),
        })
    }

    /// Start the realtime connection on the background runtime.
    pub fn start(&self) {
        let mut task = self.ws_task.lock();
        if task.is_some() {
            warn!("realtime connection already started");
            return;
        }
        let ws = self.ws.clone();
        *task = Some(self.runtime.spawn(async move { ws.run().await }));
    }

    /// Stop the realtime connection and wait for the session to wind
    /// down. Terminal errors from the session are returned here.
    pub fn stop(&self) -> ClientResult<()> {
        self.ws.stop();
        let task = self.ws_task.lock().take();
        if let Some(task) = task {
            self.runtime
                .block_on(task)
                .map_err(|e| ClientError::Runtime(e.to_string()))??;
        }
        Ok(())
    }

    pub fn register_handler(&self, topic: Topic, handler: impl Into<Handler>) -> HandlerId {
        self.ws.register_handler(topic, handler)
    }

    pub fn unregister_handler(&self, topic: &Topic, id: HandlerId) {
        self.ws.unregister_handler(topic, id)
    }

    pub fn session_state(&self) -> SessionState {
        self.ws.state()
    }

    pub fn is_live(&self) -> bool {
        self.ws.is_live()
    }

    // REST passthroughs: block until the venue answers or the transport
    // times out.

    pub fn account_info(&self) -> ClientResult<AccountInfo> {
        Ok(self.runtime.block_on(self.client.account.info())?)
    }

    pub fn positions(&self) -> ClientResult<Vec<PositionRecord>> {
        Ok(self.runtime.block_on(self.client.account.positions())?)
    }

    pub fn markets(&self) -> ClientResult<Vec<MarketInfo>> {
        Ok(self.runtime.block_on(self.client.markets.list())?)
    }

    pub fn orders(&self, market_id: Option<&str>) -> ClientResult<Vec<OrderRecord>> {
        Ok(self.runtime.block_on(self.client.orders.list(market_id))?)
    }

    pub fn create_order(&self, order: &CreateOrder) -> ClientResult<OrderRecord> {
        Ok(self.runtime.block_on(self.client.orders.create(order))?)
    }

    pub fn amend_order(&self, amend: &AmendOrder) -> ClientResult<OrderRecord> {
        Ok(self.runtime.block_on(self.client.orders.amend(amend))?)
    }

    pub fn cancel_order(&self, market_id: &str, order_id: &str) -> ClientResult<OrderRecord> {
        Ok(self
            .runtime
            .block_on(self.client.orders.cancel(market_id, order_id))?)
    }

    pub fn cancel_all_orders(&self) -> ClientResult<()> {
        Ok(self.runtime.block_on(self.client.orders.cancel_all())?)
    }
}

impl Drop for BlockingClient {
    fn drop(&mut self) {
        // Releases the session and its dispatch workers even when the
        // caller forgot to stop().
        self.ws.stop();
    }
}
