use std::sync::{
    mpsc::{self, Receiver, Sender},
    Mutex,
};

/// Event fan-out via `mpsc`: senders accumulate in a `Vec` and are pruned
/// automatically once their receiver is dropped.
pub trait EventEmitter {
    type Event: Clone;
    fn emit_event(&self, event: Self::Event);
    fn register_event_receiver(&self) -> Receiver<Self::Event>;
}

#[derive(Debug, Clone)]
pub struct BasicMessageEvent {
    pub message_id: String,
    pub connection_id: Option<String>,
    pub from_did: Option<String>,
    pub content: String,
    pub lang: Option<String>,
    pub created_time: Option<i64>,
    pub encrypted: bool,
    pub attachments_count: usize,
}

/// Thread-safe holder of `basicmessage.received` subscribers, used by
/// `DbnFramework` and the basic message handler.
pub struct BasicMessageEventBus {
    senders: Mutex<Vec<Sender<BasicMessageEvent>>>,
}

impl Default for BasicMessageEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicMessageEventBus {
    pub fn new() -> Self {
        Self { senders: Mutex::new(vec![]) }
    }
}

impl EventEmitter for BasicMessageEventBus {
    type Event = BasicMessageEvent;

    fn emit_event(&self, event: BasicMessageEvent) {
        let mut senders = self.senders.lock().expect("event bus mutex poisoned");
        senders.retain(|tx| match tx.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                debug!("Removing deallocated basicmessage.received listener");
                false
            }
        });
    }

    fn register_event_receiver(&self) -> Receiver<BasicMessageEvent> {
        let (tx, rx) = mpsc::channel();
        self.senders.lock().expect("event bus mutex poisoned").push(tx);
        rx
    }
}
