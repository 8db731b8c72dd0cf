//! Named-channel publish/subscribe between pages and application code.

use log::trace;
use serde_json::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Handle returned by [`EventCenter::on`], used to unsubscribe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type Callback = Rc<dyn Fn(&Value)>;

struct Subscriber {
    id: Subscription,
    callback: Callback,
    once: bool,
}

#[derive(Default)]
pub struct EventCenter {
    channels: HashMap<String, Vec<Subscriber>>,
    next_id: u64,
}

impl EventCenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe<F>(&mut self, channel: &str, callback: F, once: bool) -> Subscription
    where
        F: Fn(&Value) + 'static,
    {
        self.next_id += 1;
        let id = Subscription(self.next_id);
        self.channels.entry(channel.to_owned()).or_default().push(Subscriber {
            id,
            callback: Rc::new(callback),
            once,
        });
        id
    }

    pub fn on<F>(&mut self, channel: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + 'static,
    {
        self.subscribe(channel, callback, false)
    }

    /// Like [`EventCenter::on`], dropped after its first delivery.
    pub fn once<F>(&mut self, channel: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + 'static,
    {
        self.subscribe(channel, callback, true)
    }

    /// Remove one subscription; `None` removes every subscriber of the channel.
    pub fn off(&mut self, channel: &str, subscription: Option<Subscription>) -> bool {
        match subscription {
            None => self.channels.remove(channel).is_some(),
            Some(id) => {
                let Some(subscribers) = self.channels.get_mut(channel) else {
                    return false;
                };
                let before = subscribers.len();
                subscribers.retain(|subscriber| subscriber.id != id);
                before != subscribers.len()
            }
        }
    }

    /// Call every subscriber of `channel` in subscription order. Returns how
    /// many were called.
    pub fn trigger(&mut self, channel: &str, payload: &Value) -> usize {
        let Some(subscribers) = self.channels.get_mut(channel) else {
            return 0;
        };
        let callbacks: Vec<Callback> = subscribers.iter().map(|subscriber| Rc::clone(&subscriber.callback)).collect();
        subscribers.retain(|subscriber| !subscriber.once);
        trace!("`{channel}` delivered to {} subscribers", callbacks.len());
        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }

    pub fn has_subscribers(&self, channel: &str) -> bool {
        self.channels.get(channel).is_some_and(|subscribers| !subscribers.is_empty())
    }
}
