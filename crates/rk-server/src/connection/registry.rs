//! Registry of admitted participants and packet routing between them

use std::collections::HashMap;

use futures::future::join_all;
use rk_protocol::{Packet, PacketKind, PUBLIC_ROOM};
use thiserror::Error;
use tokio::sync::Mutex;

use super::handle::{ConnectionHandle, ConnectionId, DeliveryError};

/// Admission was refused; the connection never entered the registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmitError {
    #[error("username {0} is already connected")]
    UsernameTaken(String),

    #[error("empty username")]
    EmptyUsername,

    /// No room in the newcomer's queue for its roster
    #[error(transparent)]
    Unreachable(#[from] DeliveryError),
}

/// A packet could not be routed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// The sender has been answered with `Error{}`
    #[error("no connected user named {0}")]
    UnknownRecipient(String),

    #[error("{0} packets are not routed")]
    NotRoutable(PacketKind),
}

/// Live mapping of username to connection
///
/// Every operation that reads and then mutates the mapping runs under one
/// lock. Sends to peers always happen after the lock is released, with the
/// single exception of the newcomer's roster, whose queue slot is reserved
/// before the lock is taken so that it is never dropped and is the first
/// packet the newcomer sees after admission.
pub struct Registry {
    clients: Mutex<HashMap<String, ConnectionHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a connection under its verified username.
    ///
    /// The newcomer receives `UserListInit` with everyone admitted before it;
    /// those peers each receive `UserJoined`.
    pub async fn admit(&self, handle: ConnectionHandle) -> Result<(), AdmitError> {
        let username = handle.username().to_string();
        if username.is_empty() {
            return Err(AdmitError::EmptyUsername);
        }

        let roster_slot = handle.reserve().await?;

        let peers = {
            let mut clients = self.clients.lock().await;
            if clients.contains_key(&username) {
                return Err(AdmitError::UsernameTaken(username));
            }

            let mut users: Vec<String> = clients.keys().cloned().collect();
            users.sort();
            let peers: Vec<ConnectionHandle> = clients.values().cloned().collect();

            roster_slot.send(Packet::UserListInit { users });
            clients.insert(username.clone(), handle.clone());
            peers
        };

        tracing::info!(user = %username, peers = peers.len(), "Admitted");
        fan_out(&peers, Packet::UserJoined { user: username }).await;
        Ok(())
    }

    /// Remove `username` and announce `UserLeft` to everyone remaining.
    ///
    /// Returns false, and announces nothing, when the name is not registered.
    pub async fn evict(&self, username: &str) -> bool {
        self.remove(username, None).await
    }

    /// Like [`Registry::evict`], but only if the registered entry is `handle`'s
    /// own connection
    pub async fn evict_connection(&self, handle: &ConnectionHandle) -> bool {
        self.remove(handle.username(), Some(handle.id())).await
    }

    async fn remove(&self, username: &str, expected: Option<ConnectionId>) -> bool {
        if username.is_empty() {
            return false;
        }

        let remaining = {
            let mut clients = self.clients.lock().await;
            let owned = match clients.get(username) {
                Some(entry) => expected.map_or(true, |id| entry.id() == id),
                None => false,
            };
            if !owned {
                return false;
            }
            clients.remove(username);
            clients.values().cloned().collect::<Vec<_>>()
        };

        tracing::info!(user = %username, remaining = remaining.len(), "Evicted");
        fan_out(
            &remaining,
            Packet::UserLeft {
                user: username.to_string(),
            },
        )
        .await;
        true
    }

    /// Route a `Message` from an admitted sender.
    ///
    /// Public messages go to every admitted connection except the sender's;
    /// directed messages go to exactly one peer. Returns how many peers the
    /// message was queued for.
    pub async fn route(&self, packet: Packet) -> Result<usize, RouteError> {
        let (sender, receiver) = match &packet {
            Packet::Message {
                sender, receiver, ..
            } => (sender.clone(), receiver.clone()),
            other => return Err(RouteError::NotRoutable(other.kind())),
        };

        if receiver == PUBLIC_ROOM {
            let recipients: Vec<ConnectionHandle> = {
                let clients = self.clients.lock().await;
                clients
                    .iter()
                    .filter(|(name, _)| **name != sender)
                    .map(|(_, handle)| handle.clone())
                    .collect()
            };
            tracing::debug!(from = %sender, recipients = recipients.len(), "Broadcasting");
            return Ok(fan_out(&recipients, packet).await);
        }

        let (target, origin) = {
            let clients = self.clients.lock().await;
            (clients.get(&receiver).cloned(), clients.get(&sender).cloned())
        };

        match target {
            Some(target) => {
                tracing::debug!(from = %sender, to = %receiver, "Direct message");
                match target.send(packet).await {
                    Ok(()) => Ok(1),
                    Err(e) => {
                        tracing::warn!(to = %receiver, error = %e, "Delivery failed");
                        Ok(0)
                    }
                }
            }
            None => {
                tracing::warn!(from = %sender, to = %receiver, "Unknown recipient");
                if let Some(origin) = origin {
                    if let Err(e) = origin.send(Packet::Error).await {
                        tracing::warn!(to = %sender, error = %e, "Could not report unknown recipient");
                    }
                }
                Err(RouteError::UnknownRecipient(receiver))
            }
        }
    }

    /// Admitted usernames, sorted
    pub async fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.clients.lock().await.contains_key(username)
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deliver `packet` to every handle concurrently; failures are logged and
/// skipped. Returns the number of successful deliveries.
async fn fan_out(recipients: &[ConnectionHandle], packet: Packet) -> usize {
    let sends = recipients.iter().map(|handle| {
        let packet = packet.clone();
        async move {
            match handle.send(packet).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(to = %handle.username(), error = %e, "Delivery failed");
                    false
                }
            }
        }
    });
    join_all(sends).await.into_iter().filter(|ok| *ok).count()
}
