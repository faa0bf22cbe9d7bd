//! Event fan-out
//!
//! Subscribes the dispatcher, every plugin listener and every cron task for
//! one command index, and tears all of it down again before the next index
//! is wired up. The subscription set after a reload depends only on the new
//! index, however many reloads came before it.

use crate::message::{Event, EventFilter};
use crate::plugin::{CronContext, ListenerContext, RegisteredPlugin};
use crate::registry::CommandIndex;
use crate::scheduler::{CronHandle, CronJob, Scheduler};
use crate::transport::{EventHandler, HandlerId, TransportClient};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Delivers events to one plugin's listener
struct ListenerHandler {
    plugin: Arc<RegisteredPlugin>,
    client: Arc<dyn TransportClient>,
}

#[async_trait]
impl EventHandler for ListenerHandler {
    async fn handle(&self, event: Event) {
        let cx = ListenerContext {
            edited: event.is_edit(),
            message: event.message().clone(),
            client: self.client.clone(),
        };
        let plugin = self.plugin.clone();
        let result = tokio::spawn(async move { plugin.plugin.listen(cx).await }).await;

        let error = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{:#}", e),
            Err(e) if e.is_panic() => "listener panicked".to_string(),
            Err(e) => e.to_string(),
        };
        tracing::error!(plugin = %self.plugin.name, error = %error, "Listener failed");
    }
}

fn cron_job(plugin: Arc<RegisteredPlugin>, task: String, client: Arc<dyn TransportClient>) -> CronJob {
    Arc::new(move || {
        let plugin = plugin.clone();
        let cx = CronContext {
            task: task.clone(),
            client: client.clone(),
        };
        Box::pin(async move {
            let task = cx.task.clone();
            if let Err(e) = plugin.plugin.run_cron(cx).await {
                let error = format!("{:#}", e);
                tracing::error!(plugin = %plugin.name, task = %task, error = %error, "Cron task failed");
            }
        })
    })
}

#[derive(Default)]
struct Active {
    handlers: Vec<HandlerId>,
    cron: Vec<CronHandle>,
}

/// Counts of what a rebuild wired up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanoutSummary {
    pub handlers: usize,
    pub cron_tasks: usize,
}

/// Owns every transport subscription and cron task the host made
pub struct EventFanout {
    client: Arc<dyn TransportClient>,
    scheduler: Arc<dyn Scheduler>,
    edit_allowlist: Vec<String>,
    active: Mutex<Active>,
}

impl EventFanout {
    pub fn new(
        client: Arc<dyn TransportClient>,
        scheduler: Arc<dyn Scheduler>,
        edit_allowlist: Vec<String>,
    ) -> Self {
        Self {
            client,
            scheduler,
            edit_allowlist,
            active: Mutex::new(Active::default()),
        }
    }

    /// Drop every previous subscription, then subscribe `dispatcher` and the
    /// plugins of `index`
    pub async fn rebuild(
        &self,
        index: &CommandIndex,
        dispatcher: Arc<dyn EventHandler>,
    ) -> FanoutSummary {
        let mut active = self.active.lock().await;
        self.release(&mut active).await;

        for filter in [EventFilter::NewMessage, EventFilter::EditedMessage] {
            let id = self
                .client
                .add_event_handler(dispatcher.clone(), filter)
                .await;
            active.handlers.push(id);
        }

        for plugin in index.plugins() {
            if plugin.has_listener {
                let handler: Arc<dyn EventHandler> = Arc::new(ListenerHandler {
                    plugin: plugin.clone(),
                    client: self.client.clone(),
                });
                let id = self
                    .client
                    .add_event_handler(handler.clone(), EventFilter::NewMessage)
                    .await;
                active.handlers.push(id);

                let forced = self.edit_allowlist.iter().any(|n| *n == plugin.name);
                if !plugin.listener_ignore_edited || forced {
                    let id = self
                        .client
                        .add_event_handler(handler, EventFilter::EditedMessage)
                        .await;
                    active.handlers.push(id);
                }
            }

            for task in &plugin.cron {
                let id = format!("{}:{}", plugin.name, task.name);
                let job = cron_job(plugin.clone(), task.name.clone(), self.client.clone());
                match self.scheduler.schedule(&id, &task.schedule, job) {
                    Ok(handle) => active.cron.push(handle),
                    Err(e) => {
                        tracing::warn!(plugin = %plugin.name, task = %task.name, error = %e, "Cron task not scheduled")
                    }
                }
            }
        }

        FanoutSummary {
            handlers: active.handlers.len(),
            cron_tasks: active.cron.len(),
        }
    }

    /// Drop every subscription and cron task
    pub async fn teardown(&self) {
        let mut active = self.active.lock().await;
        self.release(&mut active).await;
    }

    async fn release(&self, active: &mut Active) {
        for id in active.handlers.drain(..) {
            if !self.client.remove_event_handler(id).await {
                tracing::debug!(handler = ?id, "Handler was already removed");
            }
        }
        // dropping the handles cancels the tasks
        active.cron.clear();
    }

    pub async fn summary(&self) -> FanoutSummary {
        let active = self.active.lock().await;
        FanoutSummary {
            handlers: active.handlers.len(),
            cron_tasks: active.cron.len(),
        }
    }
}
