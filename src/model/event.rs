//! Events delivered by the gateway.

use super::{
    ChannelId, Member, MemberUpdate, Message, MessageId, MessageUpdate, Presence, Role, RoleId,
    Server, ServerChannel, ServerId, ServerUpdate, UserId,
};

/// Event received over a gateway connection, after decoding.
///
/// Only the events the state tracker consumes are represented here; the
/// decoding collaborator is expected to skip anything else.
#[derive(Debug, Clone)]
pub enum Event {
    /// A server has become available: at session start, on join, or when an
    /// outage ends.
    ServerCreate(Server),
    /// A server's own properties have changed.
    ServerUpdate(ServerUpdate),
    /// A server has become unavailable, or the current user left it.
    ServerDelete(ServerId),

    /// A user joined a server.
    ServerMemberAdd(ServerId, Member),
    /// A member's properties have changed.
    ServerMemberUpdate {
        /// The server the member belongs to.
        server_id: ServerId,
        /// The member concerned.
        user_id: UserId,
        /// The fields that changed.
        update: MemberUpdate,
    },
    /// A user left or was removed from a server.
    ServerMemberRemove(ServerId, UserId),
    /// A requested slice of a server's full member list.
    ServerMembersChunk(ServerId, Vec<Member>),

    /// A role was created in a server.
    ServerRoleCreate(ServerId, Role),
    /// A role's definition has changed.
    ServerRoleUpdate(ServerId, Role),
    /// A role was deleted.
    ServerRoleDelete(ServerId, RoleId),

    /// A channel was created in a server.
    ChannelCreate(ServerChannel),
    /// A channel's configuration has changed.
    ChannelUpdate(ServerChannel),
    /// A channel was deleted.
    ChannelDelete(ServerChannel),

    MessageCreate(Message),
    /// A message has been edited, either by the user or the system.
    MessageUpdate(MessageUpdate),
    MessageDelete {
        channel_id: ChannelId,
        message_id: MessageId,
    },
    MessageDeleteBulk {
        channel_id: ChannelId,
        ids: Vec<MessageId>,
    },

    /// A member's presence-level state (roles, nickname) has changed.
    PresenceUpdate {
        /// The server concerned; absent for friends-list presences.
        server_id: Option<ServerId>,
        /// The partial member payload.
        presence: Presence,
    },
}
