use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, FlowSettledEvent, Handler, WatchParkedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub flow_settled_producer: Vec<EventProducer<FlowSettledEvent>>,
    pub watch_parked_producer: Vec<EventProducer<WatchParkedEvent>>,
}

impl EventProducers {
    pub async fn publish_flow_settled(&self, event: FlowSettledEvent) {
        for producer in &self.flow_settled_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_watch_parked(&self, event: WatchParkedEvent) {
        for producer in &self.watch_parked_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_flow_settled: Option<EventHandler<FlowSettledEvent>>,
    pub on_watch_parked: Option<EventHandler<WatchParkedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_flow_settled = hooks.on_flow_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_watch_parked = hooks.on_watch_parked.map(|f| EventHandler::new(buffer_size, f));
        Self { on_flow_settled, on_watch_parked }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_flow_settled {
            result.flow_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_watch_parked {
            result.watch_parked_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task per registered hook. Each task ends once all producers have been dropped.
    pub fn start_handlers(self) {
        if let Some(handler) = self.on_flow_settled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_watch_parked {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_flow_settled: Option<Handler<FlowSettledEvent>>,
    pub on_watch_parked: Option<Handler<WatchParkedEvent>>,
}

impl EventHooks {
    pub fn on_flow_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(FlowSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_flow_settled = Some(Arc::new(f));
        self
    }

    pub fn on_watch_parked<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(WatchParkedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_watch_parked = Some(Arc::new(f));
        self
    }
}
