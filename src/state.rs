//! Tracking of the state seen through a gateway connection.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::messages::MessageCache;
use crate::model::{ChannelId, Event, LiveChannel, LiveServer, ServerId, UpdateSource};

/// Known state composed from the events of a gateway connection.
///
/// Servers become tracked when their `ServerCreate` event arrives and are
/// kept current by feeding every later event to [`State::update`]. Events
/// apply with [`UpdateSource::Stream`] precedence, so a concurrently issued
/// snapshot refresh can never roll streamed state back.
///
/// The tracker assumes one writer: all mutation funnels through `&mut self`
/// on the event-processing path, while any number of readers may share
/// `&State` between updates. The borrow checker makes each update one
/// atomic transition as far as those readers are concerned.
#[derive(Debug, Clone)]
pub struct State {
    servers: BTreeMap<ServerId, LiveServer>,
    message_cache_size: usize,
}

impl State {
    /// Create an empty tracker that keeps no local message backlog.
    ///
    /// Every message download is delegated to the fetch collaborator.
    pub fn new() -> State {
        State::with_message_cache(0)
    }

    /// Create an empty tracker whose text channels each keep a backlog
    /// window of up to `size` messages.
    pub fn with_message_cache(size: usize) -> State {
        State {
            servers: BTreeMap::new(),
            message_cache_size: size,
        }
    }

    /// Look up a tracked server.
    pub fn server(&self, id: ServerId) -> Option<&LiveServer> {
        self.servers.get(&id)
    }

    /// Mutable access to a tracked server, for the fetch-driven paths
    /// (member refresh) that live outside event dispatch.
    pub fn server_mut(&mut self, id: ServerId) -> Option<&mut LiveServer> {
        self.servers.get_mut(&id)
    }

    /// All tracked servers.
    pub fn servers(&self) -> impl Iterator<Item = &LiveServer> {
        self.servers.values()
    }

    /// Find the server a channel belongs to, along with the channel itself.
    pub fn find_channel(&self, channel: ChannelId) -> Option<(&LiveServer, &LiveChannel)> {
        self.servers
            .values()
            .find_map(|server| server.channel(channel).map(|found| (server, found)))
    }

    /// Update the state according to the change described in the given event.
    pub fn update(&mut self, event: &Event) {
        match *event {
            Event::ServerCreate(ref model) => {
                let server = LiveServer::new(model.clone(), self.message_cache_size, true);
                self.servers.insert(server.id, server);
            }
            Event::ServerUpdate(ref update) => match self.servers.get_mut(&update.id) {
                Some(server) => server.update(update),
                None => untracked(update.id, "server update"),
            },
            Event::ServerDelete(server_id) => {
                self.servers.remove(&server_id);
            }

            Event::ServerMemberAdd(server_id, ref member) => {
                match self.servers.get_mut(&server_id) {
                    Some(server) => {
                        server.add_member(member.clone());
                    }
                    None => untracked(server_id, "member add"),
                }
            }
            Event::ServerMemberUpdate {
                server_id,
                user_id,
                ref update,
            } => match self.servers.get_mut(&server_id) {
                Some(server) => {
                    server.update_member(user_id, update, UpdateSource::Stream);
                }
                None => untracked(server_id, "member update"),
            },
            Event::ServerMemberRemove(server_id, user_id) => {
                match self.servers.get_mut(&server_id) {
                    Some(server) => {
                        server.remove_member(user_id);
                    }
                    None => untracked(server_id, "member remove"),
                }
            }
            Event::ServerMembersChunk(server_id, ref members) => {
                match self.servers.get_mut(&server_id) {
                    Some(server) => {
                        for member in members {
                            server.add_member(member.clone());
                        }
                    }
                    None => untracked(server_id, "member chunk"),
                }
            }

            Event::ServerRoleCreate(server_id, ref role)
            | Event::ServerRoleUpdate(server_id, ref role) => {
                match self.servers.get_mut(&server_id) {
                    Some(server) => server.add_role(role.clone()),
                    None => untracked(server_id, "role update"),
                }
            }
            Event::ServerRoleDelete(server_id, role_id) => {
                match self.servers.get_mut(&server_id) {
                    Some(server) => {
                        server.remove_role(role_id);
                    }
                    None => untracked(server_id, "role delete"),
                }
            }

            Event::ChannelCreate(ref channel) | Event::ChannelUpdate(ref channel) => {
                match channel.server_id() {
                    Some(server_id) => match self.servers.get_mut(&server_id) {
                        Some(server) => {
                            server.add_channel(channel.clone());
                        }
                        None => untracked(server_id, "channel update"),
                    },
                    None => warn!("channel {} carries no server; dropping", channel.id()),
                }
            }
            Event::ChannelDelete(ref channel) => {
                let id = *channel.id();
                for server in self.servers.values_mut() {
                    if server.remove_channel(id).is_some() {
                        return;
                    }
                }
                debug!("delete for untracked channel {}", id);
            }

            Event::MessageCreate(ref message) => {
                if let Some(messages) = self.message_cache_mut(message.channel_id) {
                    messages.add(message.clone());
                }
            }
            Event::MessageUpdate(ref update) => {
                if let Some(messages) = self.message_cache_mut(update.channel_id) {
                    messages.update(update);
                }
            }
            Event::MessageDelete {
                channel_id,
                message_id,
            } => {
                if let Some(messages) = self.message_cache_mut(channel_id) {
                    messages.remove(message_id);
                }
            }
            Event::MessageDeleteBulk {
                channel_id,
                ref ids,
            } => {
                if let Some(messages) = self.message_cache_mut(channel_id) {
                    for &id in ids {
                        messages.remove(id);
                    }
                }
            }

            Event::PresenceUpdate {
                server_id,
                ref presence,
            } => {
                // Friends-list presences carry no server and no member state.
                if let Some(server_id) = server_id {
                    match self.servers.get_mut(&server_id) {
                        Some(server) => {
                            server.update_member_presence(presence, UpdateSource::Stream);
                        }
                        None => untracked(server_id, "presence update"),
                    }
                }
            }
        }
    }

    fn message_cache_mut(&mut self, channel: ChannelId) -> Option<&mut MessageCache> {
        self.servers.values_mut().find_map(|server| {
            server
                .channel_mut(channel)
                .and_then(|channel| channel.messages_mut())
        })
    }
}

impl Default for State {
    fn default() -> State {
        State::new()
    }
}

fn untracked(server: ServerId, action: &str) {
    debug!("{} for untracked server {}", action, server);
}
