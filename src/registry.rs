use std::{collections::HashMap, future::Future, sync::Arc};

use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    errors::Result,
    net::{ToHosts, Transport},
    policies::ClientPolicy,
    Client, Host,
};

/// Shares one [`Client`] per cluster between independent parts of an application.
///
/// Clients are keyed by their seed hosts, regardless of order and duplicates, so
/// `"a:3000,b:3000"` and `"b:3000,a:3000"` resolve to the same client. The registry is an
/// ordinary value; create one and pass it around wherever clients are needed.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, Arc<Client>>>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the client for the hosts, connecting a new one if there is none yet or the cached
    /// one was closed. The policy is only used when a new client is created.
    pub async fn connect(
        &self,
        policy: &ClientPolicy,
        hosts: &(impl ToHosts + ?Sized),
    ) -> Result<Arc<Client>> {
        self.get_or_connect(hosts, |hosts| async move { Client::new(policy, &hosts).await })
            .await
    }

    /// Same as [`Self::connect`], but new clients talk to the nodes through the given transport.
    pub async fn connect_with_transport(
        &self,
        policy: &ClientPolicy,
        hosts: &(impl ToHosts + ?Sized),
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Client>> {
        self.get_or_connect(hosts, |hosts| async move {
            Client::with_transport(policy, &hosts, transport).await
        })
        .await
    }

    async fn get_or_connect<F, Fut>(
        &self,
        hosts: &(impl ToHosts + ?Sized),
        connect: F,
    ) -> Result<Arc<Client>>
    where
        F: FnOnce(Vec<Host>) -> Fut,
        Fut: Future<Output = Result<Client>>,
    {
        let hosts = hosts.to_hosts()?;
        let id = registry_key(&hosts);

        if let Some(client) = self.cached(&id).await {
            return Ok(client);
        }

        // Connect without holding the lock.
        debug!(hosts = %id, "connecting new shared client");
        let client = Arc::new(connect(hosts).await?);

        let mut clients = self.clients.lock().await;
        if let Some(existing) = clients.get(&id).filter(|c| !c.is_closed()) {
            let existing = Arc::clone(existing);
            drop(clients);
            debug!(hosts = %id, "lost connect race, closing the new client");
            client.close().await;
            return Ok(existing);
        }
        clients.insert(id, Arc::clone(&client));

        Ok(client)
    }

    /// Cached client for the key, dropping it when it was closed in the meantime.
    async fn cached(&self, id: &str) -> Option<Arc<Client>> {
        let mut clients = self.clients.lock().await;
        let client = clients.get(id).cloned()?;
        if client.is_closed() {
            debug!(hosts = %id, "dropping closed shared client");
            clients.remove(id);
            return None;
        }
        Some(client)
    }

    /// Close and forget the client for the hosts. Returns whether there was one.
    pub async fn remove(&self, hosts: &(impl ToHosts + ?Sized)) -> Result<bool> {
        let id = registry_key(&hosts.to_hosts()?);
        let client = self.clients.lock().await.remove(&id);

        match client {
            Some(client) => {
                client.close().await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close and forget all clients.
    pub async fn close_all(&self) {
        let clients = std::mem::take(&mut *self.clients.lock().await);
        for client in clients.into_values() {
            client.close().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}

fn registry_key(hosts: &[Host]) -> String {
    let mut hosts = hosts.iter().map(Host::address).collect::<Vec<_>>();
    hosts.sort_unstable();
    hosts.dedup();
    hosts.join(",")
}
