use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

type Callback<M> = Arc<dyn Fn(&M) -> Result<(), String> + Send + Sync>;

/// Ordered, append-only list of message subscribers
///
/// Callbacks run one after another on the driver. A callback that panics or returns an
/// error is logged and skipped; the remaining callbacks still see the message.
pub(crate) struct Hub<M> {
    subscribers: RwLock<Vec<Callback<M>>>,
}

impl<M: 'static> Hub<M> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        self.register(Arc::new(move |message: &M| {
            callback(message);
            Ok(())
        }));
    }

    pub(crate) fn try_subscribe<F, E>(&self, callback: F)
    where
        F: Fn(&M) -> Result<(), E> + Send + Sync + 'static,
        E: std::fmt::Display,
    {
        self.register(Arc::new(move |message: &M| {
            callback(message).map_err(|e| e.to_string())
        }));
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Invoke every subscriber in registration order, returning how many failed
    pub(crate) fn dispatch(&self, message: &M) -> usize {
        // Snapshot so callbacks may register further subscribers.
        let subscribers: Vec<Callback<M>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut faults = 0;
        for (index, subscriber) in subscribers.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| subscriber(message)));
            let fault = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(reason)) => reason,
                Err(payload) => panic_message(payload.as_ref()),
            };
            warn!(subscriber = index, %fault, "subscriber failed");
            faults += 1;
        }
        faults
    }

    fn register(&self, callback: Callback<M>) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic".to_string()
    }
}
