//! Data models for `live` resources, i.e. those that are merged and
//! maintained from an active gateway connection.
//!
//! Types in this category come in two flavors: wire records ([`Server`],
//! [`Member`], [`MemberUpdate`], ...) decoded straight from gateway or REST
//! payloads, and the tracked entities built from them ([`LiveServer`],
//! [`LiveMember`], [`LiveChannel`]). Wire records say what changed; tracked
//! entities hold the merged result and the state derived from it.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::messages::MessageCache;
use crate::permissions;
use crate::serial::Optional;

use super::{
    ChannelId, ChannelType, MessageId, PermissionOverwrite, Permissions, Role, RoleId,
    ServerChannel, ServerId, TextChannel, User, UserId, VoiceChannel,
};

/// Where an update to a tracked entity originated.
///
/// The source decides precedence. Entities whose authoritative state is
/// maintained by the gateway ignore `Snapshot` payloads, because a fetch
/// issued concurrently with the event stream may complete after newer
/// streamed state has already been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// The entity is being built from its first payload. Always applies.
    Creation,
    /// The payload is the result of an on-demand fetch.
    Snapshot,
    /// The payload was pushed over the gateway. Always applies.
    Stream,
}

// Wire records

/// Full server payload, as sent when a server becomes available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    /// The ID of the server.
    pub id: ServerId,
    /// The name of the server (2-100 characters).
    pub name: String,
    /// The icon hash of the server.
    pub icon: Option<String>,
    /// The owner of the server.
    pub owner_id: UserId,
    /// The total amount of members in the server.
    #[serde(default)]
    pub member_count: u64,
    /// When the current user joined this server.
    pub joined_at: DateTime<FixedOffset>,
    /// A list of all roles in the server.
    pub roles: Vec<Role>,
    /// The server's members.
    #[serde(default)]
    pub members: Vec<Member>,
    /// Non-thread channels in the server.
    #[serde(default)]
    pub channels: Vec<ServerChannel>,
}

/// Partial server payload carried by server update events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerUpdate {
    /// The ID of the server.
    pub id: ServerId,
    /// The new name, when it changed.
    #[serde(default)]
    pub name: Optional<String>,
    /// The new icon hash, when it changed.
    #[serde(default)]
    pub icon: Optional<Option<String>>,
    /// The new owner, when ownership was transferred.
    #[serde(default)]
    pub owner_id: Optional<UserId>,
}

/// Information about a member of a server.
///
/// This is the full payload, sent when a member joins, arrives in a member
/// chunk, or is fetched on demand. Partial changes travel as
/// [`MemberUpdate`] instead. Full payloads always carry the role list and
/// join date; the nickname keeps its own presence marker.
///
/// https://discord.com/developers/docs/resources/guild#guild-member-object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// The user this member structure concerns.
    ///
    /// This field is set to `None` when received as part of a message event.
    pub user: Option<User>,
    /// The user's server nickname.
    #[serde(default)]
    pub nick: Optional<Option<String>>,
    /// The roles granted to the user.
    pub roles: Vec<RoleId>,
    /// When the user joined this server.
    pub joined_at: DateTime<FixedOffset>,
}

/// Partial member payload carried by member update events.
///
/// Every field carries its own presence marker; only present fields are
/// merged into the tracked member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberUpdate {
    /// The roles granted to the user, when they changed.
    #[serde(default)]
    pub roles: Optional<Vec<RoleId>>,
    /// The user's server nickname, when it changed. `Present(None)` clears it.
    #[serde(default)]
    pub nick: Optional<Option<String>>,
    /// When the user joined this server.
    #[serde(default)]
    pub joined_at: Optional<DateTime<FixedOffset>>,
}

/// Presence-style member payload: role list and nickname only.
///
/// Old gateway versions piggyback member changes onto presence pushes, which
/// never carry a join date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presence {
    /// The user this presence belongs to.
    pub user_id: UserId,
    /// The roles granted to the user, when they changed.
    #[serde(default)]
    pub roles: Optional<Vec<RoleId>>,
    /// The user's server nickname, when it changed.
    #[serde(default)]
    pub nick: Optional<Option<String>>,
}

/// Message transmitted over a text channel.
///
/// https://discord.com/developers/docs/resources/channel#message-object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The ID of the message.
    pub id: MessageId,
    /// The ID of the channel the message was sent in.
    pub channel_id: ChannelId,

    /// The user that created the message.
    pub author: User,
    /// The content of the message.
    pub content: String,

    /// When the message was sent.
    pub timestamp: DateTime<FixedOffset>,
    /// The last time the message was edited, if it was ever.
    pub edited_timestamp: Option<DateTime<FixedOffset>>,

    /// Whether the message should be read out loud on clients focused on the channel.
    #[serde(default)]
    pub tts: bool,
    /// Whether this message is pinned for all to see.
    #[serde(default)]
    pub pinned: bool,
}

/// Partial message payload carried by message update events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageUpdate {
    /// The ID of the message.
    pub id: MessageId,
    /// The ID of the channel the message was sent in.
    pub channel_id: ChannelId,
    /// The new content, when it changed.
    #[serde(default)]
    pub content: Optional<String>,
    /// The new edit timestamp, when it changed.
    #[serde(default)]
    pub edited_timestamp: Optional<Option<DateTime<FixedOffset>>>,
    /// The new pin state, when it changed.
    #[serde(default)]
    pub pinned: Optional<bool>,
}

/// On-demand member fetches, backed by a REST client.
pub trait MemberFetcher {
    /// Fetch the current member payload for a user, or `None` if the user
    /// is not a member of the server.
    async fn fetch_member(&self, server: ServerId, user: UserId) -> Result<Option<Member>>;
}

// Tracked entities

/// A tracked member of a [`LiveServer`].
///
/// The member's server-wide permissions are cached next to the role list.
/// Both are replaced together whenever the role list changes, so a reader
/// holding `&LiveMember` never observes a new role list paired with a stale
/// bitmask or the other way around.
#[derive(Debug, Clone)]
pub struct LiveMember {
    /// The server the member belongs to.
    pub server_id: ServerId,
    /// The underlying platform-wide user identity. Supplied by the identity
    /// service and never mutated here.
    pub user: User,
    /// The user's server nickname.
    pub nick: Option<String>,
    /// When the user joined the server.
    pub joined_at: DateTime<FixedOffset>,

    roles: Vec<RoleId>,
    permissions: Permissions,
    attached: bool,
}

impl LiveMember {
    /// Build a member from its first full payload.
    ///
    /// Pass `attached` as true when the member's state will be maintained by
    /// the gateway; such members ignore later `Snapshot` payloads and refuse
    /// on-demand refreshes.
    pub fn new(
        server_id: ServerId,
        user: User,
        model: &Member,
        roles: &BTreeMap<RoleId, Role>,
        attached: bool,
    ) -> LiveMember {
        let mut member = LiveMember {
            server_id,
            user,
            nick: None,
            joined_at: model.joined_at,
            roles: Vec::new(),
            permissions: Permissions::empty(),
            attached,
        };
        member.update(model, roles, UpdateSource::Creation);
        member
    }

    /// Apply a full member payload.
    ///
    /// The join date and role list are always part of the full payload and
    /// are applied unconditionally; the nickname only when present.
    pub fn update(&mut self, model: &Member, roles: &BTreeMap<RoleId, Role>, source: UpdateSource) {
        if source == UpdateSource::Snapshot && self.attached {
            return;
        }

        self.joined_at = model.joined_at;
        if let Optional::Present(ref nick) = model.nick {
            self.nick = nick.clone();
        }
        self.update_roles(&model.roles, roles);
    }

    /// Apply a partial member payload, merging only the fields it carries.
    pub fn update_partial(
        &mut self,
        model: &MemberUpdate,
        roles: &BTreeMap<RoleId, Role>,
        source: UpdateSource,
    ) {
        if source == UpdateSource::Snapshot && self.attached {
            return;
        }

        if let Optional::Present(joined_at) = model.joined_at {
            self.joined_at = joined_at;
        }
        if let Optional::Present(ref nick) = model.nick {
            self.nick = nick.clone();
        }
        if let Optional::Present(ref ids) = model.roles {
            self.update_roles(ids, roles);
        }
    }

    /// Apply a presence-style payload: role list and nickname only.
    pub fn update_presence(
        &mut self,
        model: &Presence,
        roles: &BTreeMap<RoleId, Role>,
        source: UpdateSource,
    ) {
        if source == UpdateSource::Snapshot && self.attached {
            return;
        }

        if let Optional::Present(ref ids) = model.roles {
            self.update_roles(ids, roles);
        }
        if let Optional::Present(ref nick) = model.nick {
            self.nick = nick.clone();
        }
    }

    /// Rebuild the role list from a wire role set and recompute the cached
    /// server-wide permissions.
    ///
    /// `@everyone` always ends up as the first element whether or not the
    /// payload carried it. Identifiers that no longer resolve are dropped;
    /// the role may have been deleted while the payload was in flight.
    fn update_roles(&mut self, ids: &[RoleId], roles: &BTreeMap<RoleId, Role>) {
        let everyone = self.server_id.everyone();
        let mut list = Vec::with_capacity(ids.len() + 1);
        list.push(everyone);
        for &id in ids {
            if id == everyone {
                continue;
            }
            if roles.contains_key(&id) {
                list.push(id);
            } else {
                debug!(
                    "member {} on {} refers to non-existent role {}",
                    self.user.id, self.server_id, id
                );
            }
        }

        self.roles = list;
        let permissions = permissions::resolve_server(self, roles);
        self.permissions = permissions;
    }

    /// Recompute the cached permissions against the given role table.
    pub(crate) fn refresh_permissions(&mut self, roles: &BTreeMap<RoleId, Role>) {
        let permissions = permissions::resolve_server(self, roles);
        self.permissions = permissions;
    }

    /// Drop a deleted role from the role list, recomputing permissions.
    pub(crate) fn strip_role(&mut self, role: RoleId, roles: &BTreeMap<RoleId, Role>) {
        if let Some(index) = self.roles.iter().position(|&held| held == role) {
            self.roles.remove(index);
            let permissions = permissions::resolve_server(self, roles);
            self.permissions = permissions;
        }
    }

    /// The member's ID, equal to the ID of the underlying user.
    pub fn id(&self) -> UserId {
        self.user.id
    }

    /// The roles held by this member.
    ///
    /// The implicit `@everyone` role is always the first element.
    pub fn roles(&self) -> &[RoleId] {
        &self.roles
    }

    /// Whether the member holds the given role.
    pub fn holds_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }

    /// The member's server-wide permissions.
    ///
    /// Cached; recomputed whenever the role list changes.
    pub fn server_permissions(&self) -> Permissions {
        self.permissions
    }

    /// Whether the gateway owns this member's state.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Get this member's nickname if present or their username otherwise.
    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or(&self.user.name)
    }
}

/// A tracked channel of a [`LiveServer`].
///
/// Text channels carry the message cache holding their recent backlog.
#[derive(Debug, Clone)]
pub enum LiveChannel {
    /// A text channel in a server.
    Text {
        /// The channel configuration as last seen on the wire.
        channel: TextChannel,
        /// Recent messages seen in the channel.
        messages: MessageCache,
    },
    /// A voice channel in a server.
    Voice {
        /// The channel configuration as last seen on the wire.
        channel: VoiceChannel,
    },
}

impl LiveChannel {
    pub(crate) fn new(record: ServerChannel, cache_size: usize) -> LiveChannel {
        match record {
            ServerChannel::Text { channel, .. } => {
                let messages = MessageCache::new(channel.id, cache_size);
                LiveChannel::Text { channel, messages }
            }
            ServerChannel::Voice { channel, .. } => LiveChannel::Voice { channel },
        }
    }

    /// Merge a channel update, keeping the message cache intact.
    pub(crate) fn update(&mut self, record: ServerChannel) {
        let id = self.id();
        match (&mut *self, record) {
            (LiveChannel::Text { channel, .. }, ServerChannel::Text { channel: new, .. }) => {
                *channel = new;
            }
            (LiveChannel::Voice { channel }, ServerChannel::Voice { channel: new, .. }) => {
                *channel = new;
            }
            _ => warn!("channel {} changed type in an update; ignoring", id),
        }
    }

    /// Access the ID of the channel this `enum` represents.
    pub fn id(&self) -> ChannelId {
        match self {
            Self::Text { channel, .. } => channel.id,
            Self::Voice { channel } => channel.id,
        }
    }

    /// The name of the channel.
    pub fn name(&self) -> &str {
        match self {
            Self::Text { channel, .. } => &channel.name,
            Self::Voice { channel } => &channel.name,
        }
    }

    /// Get the type of the channel that is stored in the enum.
    pub fn kind(&self) -> ChannelType {
        match self {
            Self::Text { .. } => ChannelType::Text,
            Self::Voice { .. } => ChannelType::Voice,
        }
    }

    /// The permission overwrites attached to the channel.
    pub fn permission_overwrites(&self) -> &[PermissionOverwrite] {
        match self {
            Self::Text { channel, .. } => channel.permission_overwrites.as_ref(),
            Self::Voice { channel } => channel.permission_overwrites.as_ref(),
        }
    }

    /// The message cache of a text channel.
    pub fn messages(&self) -> Option<&MessageCache> {
        match self {
            Self::Text { messages, .. } => Some(messages),
            Self::Voice { .. } => None,
        }
    }

    pub(crate) fn messages_mut(&mut self) -> Option<&mut MessageCache> {
        match self {
            Self::Text { messages, .. } => Some(messages),
            Self::Voice { .. } => None,
        }
    }
}

/// Live server information, built from a full server payload and maintained
/// by subsequent events.
///
/// The server owns every member, role, and channel tracked under it; they
/// are addressed by ID and cannot outlive it. All mutation goes through
/// `&mut self`, which keeps each update a single atomic transition as far
/// as readers are concerned: a shared borrow can never observe a
/// half-applied merge.
#[derive(Debug, Clone)]
pub struct LiveServer {
    /// The ID of the server.
    pub id: ServerId,
    /// The name of the server (2-100 characters).
    pub name: String,
    /// The icon hash of the server.
    pub icon: Option<String>,
    /// The owner of the server.
    pub owner_id: UserId,
    /// The total amount of members in the server, as reported by the
    /// gateway. May exceed the number of tracked members on large servers.
    pub member_count: u64,
    /// When the current user joined this server.
    pub joined_at: DateTime<FixedOffset>,

    roles: BTreeMap<RoleId, Role>,
    members: BTreeMap<UserId, LiveMember>,
    channels: BTreeMap<ChannelId, LiveChannel>,
    message_cache_size: usize,
    attached: bool,
}

impl LiveServer {
    /// Build a tracked server from its full payload.
    ///
    /// Text channels get message caches holding up to `message_cache_size`
    /// messages each; zero disables local message storage. Pass `attached`
    /// as true when the server will be maintained by the gateway.
    pub fn new(model: Server, message_cache_size: usize, attached: bool) -> LiveServer {
        let mut roles = BTreeMap::new();
        for role in model.roles {
            roles.insert(role.id, role);
        }
        if !roles.contains_key(&model.id.everyone()) {
            warn!("server payload for {} lacks the @everyone role", model.id);
        }

        let mut server = LiveServer {
            id: model.id,
            name: model.name,
            icon: model.icon,
            owner_id: model.owner_id,
            member_count: model.member_count,
            joined_at: model.joined_at,
            roles,
            members: BTreeMap::new(),
            channels: BTreeMap::new(),
            message_cache_size,
            attached,
        };
        for member in model.members {
            server.add_member(member);
        }
        for channel in model.channels {
            server.add_channel(channel);
        }
        server
    }

    /// Merge a partial server payload into the server's own properties.
    pub fn update(&mut self, model: &ServerUpdate) {
        if let Optional::Present(ref name) = model.name {
            self.name = name.clone();
        }
        if let Optional::Present(ref icon) = model.icon {
            self.icon = icon.clone();
        }
        if let Optional::Present(owner_id) = model.owner_id {
            self.owner_id = owner_id;
        }
    }

    /// Whether the gateway owns this server's state.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    // Member collection

    /// Track a member from its full payload, or merge the payload into the
    /// already tracked member.
    ///
    /// Payloads without a user identity cannot be tracked and are dropped.
    pub fn add_member(&mut self, model: Member) -> Option<&LiveMember> {
        let user = match model.user {
            Some(ref user) => user.clone(),
            None => {
                warn!("member payload without user on {}; dropping", self.id);
                return None;
            }
        };

        let id = user.id;
        let roles = &self.roles;
        match self.members.entry(id) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().update(&model, roles, UpdateSource::Stream);
            }
            Entry::Vacant(entry) => {
                entry.insert(LiveMember::new(self.id, user, &model, roles, self.attached));
            }
        }
        self.members.get(&id)
    }

    /// Stop tracking a member, returning the final state if it was tracked.
    pub fn remove_member(&mut self, user: UserId) -> Option<LiveMember> {
        self.members.remove(&user)
    }

    /// Merge a partial member payload into a tracked member.
    ///
    /// Returns `None` without effect when the member is not tracked; the
    /// partial payload does not carry enough to start tracking one.
    pub fn update_member(
        &mut self,
        user: UserId,
        model: &MemberUpdate,
        source: UpdateSource,
    ) -> Option<&LiveMember> {
        let roles = &self.roles;
        if let Some(member) = self.members.get_mut(&user) {
            member.update_partial(model, roles, source);
        } else {
            debug!("member update for untracked user {} on {}", user, self.id);
            return None;
        }
        self.members.get(&user)
    }

    /// Merge a presence-style payload into a tracked member.
    pub fn update_member_presence(
        &mut self,
        model: &Presence,
        source: UpdateSource,
    ) -> Option<&LiveMember> {
        let roles = &self.roles;
        if let Some(member) = self.members.get_mut(&model.user_id) {
            member.update_presence(model, roles, source);
        } else {
            return None;
        }
        self.members.get(&model.user_id)
    }

    /// Refresh a member from an on-demand fetch.
    ///
    /// Members maintained by the gateway cannot be refreshed this way and
    /// yield [`Error::NotSupported`], which is distinct from a fetch
    /// failure. `Ok(None)` means the collaborator reported the user is no
    /// longer a member; the tracked member is left as it was.
    pub async fn refresh_member<F: MemberFetcher>(
        &mut self,
        fetcher: &F,
        user: UserId,
    ) -> Result<Option<&LiveMember>> {
        {
            let member = self
                .members
                .get(&user)
                .ok_or(Error::Other("member is not tracked on this server"))?;
            if member.is_attached() {
                return Err(Error::NotSupported(
                    "member state is maintained by the gateway",
                ));
            }
        }

        let model = match fetcher.fetch_member(self.id, user).await? {
            Some(model) => model,
            None => return Ok(None),
        };

        let roles = &self.roles;
        if let Some(member) = self.members.get_mut(&user) {
            member.update(&model, roles, UpdateSource::Snapshot);
        }
        Ok(self.members.get(&user))
    }

    /// Look up a tracked member.
    pub fn member(&self, user: UserId) -> Option<&LiveMember> {
        self.members.get(&user)
    }

    /// All tracked members of the server.
    pub fn members(&self) -> impl Iterator<Item = &LiveMember> {
        self.members.values()
    }

    // Role collection

    /// Insert or replace a role definition.
    ///
    /// Cached member permissions are recomputed, since the role's grants
    /// may have changed under them.
    pub fn add_role(&mut self, role: Role) {
        self.roles.insert(role.id, role);

        let roles = &self.roles;
        for member in self.members.values_mut() {
            member.refresh_permissions(roles);
        }
    }

    /// Delete a role, stripping it from every member that held it.
    ///
    /// The `@everyone` role cannot be deleted.
    pub fn remove_role(&mut self, role: RoleId) -> Option<Role> {
        if role == self.id.everyone() {
            warn!("ignoring deletion of the @everyone role on {}", self.id);
            return None;
        }

        let removed = self.roles.remove(&role)?;
        let roles = &self.roles;
        for member in self.members.values_mut() {
            member.strip_role(role, roles);
        }
        Some(removed)
    }

    /// Look up a role definition.
    pub fn role(&self, role: RoleId) -> Option<&Role> {
        self.roles.get(&role)
    }

    /// The `@everyone` role of the server.
    pub fn everyone_role(&self) -> Option<&Role> {
        self.roles.get(&self.id.everyone())
    }

    /// All roles of the server.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    // Channel collection

    /// Track a channel from its wire record, or merge the record into the
    /// already tracked channel.
    pub fn add_channel(&mut self, record: ServerChannel) -> &LiveChannel {
        let id = *record.id();
        match self.channels.entry(id) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().update(record);
            }
            Entry::Vacant(entry) => {
                entry.insert(LiveChannel::new(record, self.message_cache_size));
            }
        }
        &self.channels[&id]
    }

    /// Stop tracking a channel, dropping its message cache with it.
    pub fn remove_channel(&mut self, channel: ChannelId) -> Option<LiveChannel> {
        self.channels.remove(&channel)
    }

    /// Look up a tracked channel.
    pub fn channel(&self, channel: ChannelId) -> Option<&LiveChannel> {
        self.channels.get(&channel)
    }

    pub(crate) fn channel_mut(&mut self, channel: ChannelId) -> Option<&mut LiveChannel> {
        self.channels.get_mut(&channel)
    }

    /// All tracked channels of the server.
    pub fn channels(&self) -> impl Iterator<Item = &LiveChannel> {
        self.channels.values()
    }

    // Derived views

    /// A member's server-wide permissions.
    ///
    /// The owner holds every permission. Untracked users resolve through
    /// `@everyone` alone.
    pub fn server_permissions_for(&self, user: UserId) -> Permissions {
        if user == self.owner_id {
            return Permissions::all();
        }
        match self.members.get(&user) {
            Some(member) => member.server_permissions(),
            None => self.everyone_permissions(),
        }
    }

    /// Calculate the effective permissions for a specific user in a specific
    /// channel on this server.
    ///
    /// Looking up a channel that is not part of this server is a caller
    /// error and yields [`Error::UnknownChannel`].
    pub fn permissions_for(&self, channel: ChannelId, user: UserId) -> Result<Permissions> {
        let channel = self
            .channels
            .get(&channel)
            .ok_or(Error::UnknownChannel(channel))?;

        // Owner has all permissions
        if user == self.owner_id {
            return Ok(Permissions::all());
        }

        match self.members.get(&user) {
            Some(member) => Ok(permissions::resolve_channel(
                member,
                channel.permission_overwrites(),
                &self.roles,
                member.server_permissions(),
            )),
            None => Ok(self.everyone_permissions()),
        }
    }

    /// The members able to observe the given channel, computed fresh from
    /// the current permission state.
    ///
    /// Text channels require `READ_MESSAGES`, voice channels
    /// `VOICE_CONNECT`. The result is not cached anywhere; permission state
    /// can change without any membership-specific event being emitted.
    pub fn channel_members(&self, channel: ChannelId) -> Result<Vec<&LiveMember>> {
        let channel = self
            .channels
            .get(&channel)
            .ok_or(Error::UnknownChannel(channel))?;
        let required = match channel.kind() {
            ChannelType::Text => Permissions::READ_MESSAGES,
            ChannelType::Voice => Permissions::VOICE_CONNECT,
        };

        Ok(self
            .members
            .values()
            .filter(|member| {
                let resolved = if member.id() == self.owner_id {
                    Permissions::all()
                } else {
                    permissions::resolve_channel(
                        member,
                        channel.permission_overwrites(),
                        &self.roles,
                        member.server_permissions(),
                    )
                };
                resolved.contains(required)
            })
            .collect())
    }

    fn everyone_permissions(&self) -> Permissions {
        match self.everyone_role() {
            Some(everyone) => everyone.permissions,
            None => {
                warn!(
                    "Missing @everyone role in permissions lookup on {} ({})",
                    self.name, self.id
                );
                Permissions::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::Eq;

    fn when() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2016-03-01T10:00:00Z").unwrap()
    }

    fn user(id: u64, name: &str) -> User {
        User {
            id: UserId(id),
            name: name.into(),
            discriminator: 1234,
            avatar: None,
            bot: false,
        }
    }

    fn role(id: u64, position: i64, permissions: Permissions) -> Role {
        Role {
            id: RoleId(id),
            name: format!("role-{}", id),
            color: 0,
            hoist: false,
            position,
            mentionable: false,
            permissions,
        }
    }

    fn member_model(id: u64, name: &str, roles: Vec<RoleId>) -> Member {
        Member {
            user: Some(user(id, name)),
            nick: Optional::Absent,
            roles,
            joined_at: when(),
        }
    }

    fn text_channel(id: u64, overwrites: Vec<PermissionOverwrite>) -> ServerChannel {
        ServerChannel::Text {
            channel: TextChannel {
                id: ChannelId(id),
                server_id: Some(ServerId(1)),
                name: "general".into(),
                position: 0,
                permission_overwrites: overwrites,
                topic: None,
                last_message: None,
            },
            kind: Eq,
        }
    }

    fn server_model() -> Server {
        Server {
            id: ServerId(1),
            name: "testing".into(),
            icon: None,
            owner_id: UserId(10),
            member_count: 2,
            joined_at: when(),
            roles: vec![
                role(1, 0, Permissions::READ_MESSAGES),
                role(2, 1, Permissions::READ_MESSAGES | Permissions::KICK_MEMBERS),
            ],
            members: vec![
                member_model(10, "owner", vec![]),
                member_model(11, "mod", vec![RoleId(2)]),
            ],
            channels: vec![text_channel(5, vec![])],
        }
    }

    fn server() -> LiveServer {
        LiveServer::new(server_model(), 0, true)
    }

    #[test]
    fn everyone_role_is_always_held_first() {
        let server = server();
        let member = server.member(UserId(11)).unwrap();
        assert_eq!(member.roles(), &[RoleId(1), RoleId(2)]);

        let plain = server.member(UserId(10)).unwrap();
        assert_eq!(plain.roles(), &[RoleId(1)]);
    }

    #[test]
    fn unresolvable_roles_are_dropped_silently() {
        let mut server = server();
        let update = MemberUpdate {
            roles: Optional::Present(vec![RoleId(2), RoleId(99)]),
            nick: Optional::Absent,
            joined_at: Optional::Absent,
        };
        let member = server
            .update_member(UserId(11), &update, UpdateSource::Stream)
            .unwrap();
        assert_eq!(member.roles(), &[RoleId(1), RoleId(2)]);
    }

    #[test]
    fn cached_permissions_follow_the_role_list() {
        let mut server = server();
        assert_eq!(
            server.member(UserId(11)).unwrap().server_permissions(),
            Permissions::READ_MESSAGES | Permissions::KICK_MEMBERS
        );

        let update = MemberUpdate {
            roles: Optional::Present(vec![]),
            nick: Optional::Absent,
            joined_at: Optional::Absent,
        };
        let member = server
            .update_member(UserId(11), &update, UpdateSource::Stream)
            .unwrap();
        assert_eq!(member.server_permissions(), Permissions::READ_MESSAGES);
    }

    #[test]
    fn stream_updates_are_idempotent() {
        let mut server = server();
        let update = MemberUpdate {
            roles: Optional::Present(vec![RoleId(2)]),
            nick: Optional::Present(Some("kit".into())),
            joined_at: Optional::Absent,
        };

        server.update_member(UserId(11), &update, UpdateSource::Stream);
        let (roles, nick, permissions) = {
            let member = server.member(UserId(11)).unwrap();
            (
                member.roles().to_vec(),
                member.nick.clone(),
                member.server_permissions(),
            )
        };

        server.update_member(UserId(11), &update, UpdateSource::Stream);
        let member = server.member(UserId(11)).unwrap();
        assert_eq!(member.roles(), &roles[..]);
        assert_eq!(member.nick, nick);
        assert_eq!(member.server_permissions(), permissions);
    }

    #[test]
    fn snapshot_does_not_override_attached_members() {
        let mut server = server();
        let update = MemberUpdate {
            roles: Optional::Absent,
            nick: Optional::Present(Some("stale".into())),
            joined_at: Optional::Absent,
        };
        server.update_member(UserId(11), &update, UpdateSource::Snapshot);
        assert_eq!(server.member(UserId(11)).unwrap().nick, None);

        // The same payload over the stream applies.
        server.update_member(UserId(11), &update, UpdateSource::Stream);
        assert_eq!(
            server.member(UserId(11)).unwrap().nick,
            Some("stale".to_owned())
        );
    }

    #[test]
    fn snapshot_applies_to_detached_members() {
        let mut server = LiveServer::new(server_model(), 0, false);
        let update = MemberUpdate {
            roles: Optional::Absent,
            nick: Optional::Present(Some("fresh".into())),
            joined_at: Optional::Absent,
        };
        server.update_member(UserId(11), &update, UpdateSource::Snapshot);
        assert_eq!(
            server.member(UserId(11)).unwrap().nick,
            Some("fresh".to_owned())
        );
    }

    #[test]
    fn absent_nickname_keeps_present_nickname_clears() {
        let mut server = server();
        let set = MemberUpdate {
            roles: Optional::Absent,
            nick: Optional::Present(Some("kit".into())),
            joined_at: Optional::Absent,
        };
        server.update_member(UserId(11), &set, UpdateSource::Stream);

        let keep = MemberUpdate {
            roles: Optional::Absent,
            nick: Optional::Absent,
            joined_at: Optional::Absent,
        };
        server.update_member(UserId(11), &keep, UpdateSource::Stream);
        assert_eq!(
            server.member(UserId(11)).unwrap().nick,
            Some("kit".to_owned())
        );

        let clear = MemberUpdate {
            roles: Optional::Absent,
            nick: Optional::Present(None),
            joined_at: Optional::Absent,
        };
        server.update_member(UserId(11), &clear, UpdateSource::Stream);
        assert_eq!(server.member(UserId(11)).unwrap().nick, None);
    }

    #[test]
    fn deleting_a_role_strips_it_from_members() {
        let mut server = server();
        server.remove_role(RoleId(2));

        let member = server.member(UserId(11)).unwrap();
        assert_eq!(member.roles(), &[RoleId(1)]);
        assert_eq!(member.server_permissions(), Permissions::READ_MESSAGES);
    }

    #[test]
    fn updating_a_role_refreshes_cached_permissions() {
        let mut server = server();
        server.add_role(role(
            1,
            0,
            Permissions::READ_MESSAGES | Permissions::ADD_REACTIONS,
        ));

        assert!(server
            .member(UserId(11))
            .unwrap()
            .server_permissions()
            .contains(Permissions::ADD_REACTIONS));
    }

    #[test]
    fn unknown_channel_is_a_caller_error() {
        let server = server();
        match server.permissions_for(ChannelId(999), UserId(11)) {
            Err(Error::UnknownChannel(id)) => assert_eq!(id, ChannelId(999)),
            other => panic!("expected UnknownChannel, got {:?}", other),
        }
    }

    #[test]
    fn owner_resolves_to_all_permissions() {
        let server = server();
        let resolved = server.permissions_for(ChannelId(5), UserId(10)).unwrap();
        assert_eq!(resolved, Permissions::all());
    }

    #[test]
    fn channel_members_follow_overwrites() {
        let mut server = server();
        // Hide the channel from @everyone; the mod role sees it again.
        server.add_channel(text_channel(
            5,
            vec![
                PermissionOverwrite::role(
                    ServerId(1).everyone(),
                    Permissions::empty(),
                    Permissions::READ_MESSAGES,
                ),
                PermissionOverwrite::role(
                    RoleId(2),
                    Permissions::READ_MESSAGES,
                    Permissions::empty(),
                ),
            ],
        ));

        let visible = server.channel_members(ChannelId(5)).unwrap();
        let mut ids: Vec<UserId> = visible.iter().map(|member| member.id()).collect();
        ids.sort();
        // The owner bypasses the deny, the mod is re-allowed through their role.
        assert_eq!(ids, vec![UserId(10), UserId(11)]);

        // A third member with no extra roles is hidden.
        server.add_member(member_model(12, "guest", vec![]));
        let visible = server.channel_members(ChannelId(5)).unwrap();
        assert!(!visible.iter().any(|member| member.id() == UserId(12)));
    }

    struct StubFetcher(Member);

    impl MemberFetcher for StubFetcher {
        async fn fetch_member(&self, _: ServerId, _: UserId) -> Result<Option<Member>> {
            Ok(Some(self.0.clone()))
        }
    }

    #[tokio::test]
    async fn refreshing_an_attached_member_is_not_supported() {
        let mut server = server();
        let fetcher = StubFetcher(member_model(11, "mod", vec![]));
        match server.refresh_member(&fetcher, UserId(11)).await {
            Err(Error::NotSupported(_)) => {}
            other => panic!("expected NotSupported, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn refreshing_a_detached_member_applies_the_snapshot() {
        let mut server = LiveServer::new(server_model(), 0, false);
        let mut model = member_model(11, "mod", vec![]);
        model.nick = Optional::Present(Some("refreshed".into()));

        let fetcher = StubFetcher(model);
        let member = server
            .refresh_member(&fetcher, UserId(11))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(member.nick, Some("refreshed".to_owned()));
        assert_eq!(member.roles(), &[RoleId(1)]);
    }
}
