//! Data models for resources that rarely change on their own.
//!
//! The name `frozen` comes from the fact that data modeled
//! in this module only changes through explicit update events,
//! like role definitions and channel configurations.
//!
//! Resources that do not fit into the above description i.e.
//! instances of them are merged and maintained by the state tracker,
//! are defined in the sister module `live`.

use std::fmt;

use bitflags::bitflags;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::serial::Eq;

// IDs

macro_rules! snowflake {
    ($(#[$attr:meta] $name:ident;)*) => {
        $(
            #[$attr]
            ///
            /// Identifiers can be debug-printed using the `{:?}` specifier, or their
            /// raw number value printed using the `{}` specifier.
            /// Some identifiers have `mention()` methods as well.
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Debug, Ord, PartialOrd)]
            #[derive(Serialize, Deserialize)]
            pub struct $name(#[serde(deserialize_with = "crate::serial::deserialize_id")] pub u64);

            impl $name {
                /// Get the creation date of the object referred to by this ID.
                ///
                /// Discord generates identifiers using a scheme based on [Twitter Snowflake]
                /// (https://github.com/twitter/snowflake/tree/b3f6a3c6ca8e1b6847baa6ff42bf72201e2c2231#snowflake).
                pub fn creation_date(&self) -> DateTime<Utc> {
                    let naive = NaiveDateTime::from_timestamp((1420070400 + (self.0 >> 22) / 1000) as i64, 0);
                    DateTime::from_utc(naive, Utc)
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    }
}

snowflake! {
    /// An identifier for a User
    UserId;
    /// An identifier for a Server
    ServerId;
    /// An identifier for a Channel
    ChannelId;
    /// An identifier for a Message
    MessageId;
    /// An identifier for a Role
    RoleId;
}

impl ServerId {
    /// The ID of the implicit `@everyone` role of this server.
    ///
    /// The `@everyone` role shares its ID with the server it belongs to.
    pub fn everyone(&self) -> RoleId {
        RoleId(self.0)
    }
}

// Users

/// Frozen user information, as supplied by the identity service.
///
/// Users in Discord are generally considered the base entity.
/// Users can spawn across the entire platform, be members of servers,
/// participate in text and voice chat, and much more.
///
/// https://discord.com/developers/docs/resources/user#user-object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// The user's ID
    pub id: UserId,

    /// The user's username, not unique across the platform.
    #[serde(rename = "username")]
    pub name: String,
    /// The user's Discord-tag
    #[serde(deserialize_with = "crate::serial::deserialize_discrim")]
    pub discriminator: u16,

    /// The user's avatar hash
    pub avatar: Option<String>,

    /// Whether the user belongs to an OAuth2 application
    #[serde(default)]
    pub bot: bool,
}

impl User {
    /// Return a `Mention` which will ping this user.
    #[inline(always)]
    pub fn mention(&self) -> Mention {
        self.id.mention()
    }

    /// Returns the formatted URL of the user's icon.
    ///
    /// Returns None if the user does not have an avatar.
    pub fn avatar_url(&self) -> Option<String> {
        self.avatar
            .as_ref()
            .map(|avatar_hash| format!(cdn_concat!("/avatars/{}/{}.jpg"), self.id, avatar_hash))
    }
}

// Roles

/// Roles represent a set of permissions attached to a group of users.
/// Roles have names, colors, and can be "pinned" to the side bar,
/// causing their members to be listed separately.
///
/// Roles can have separate permission profiles for the global context (server) and channel context.
/// The `@everyone` role has the same ID as the server it belongs to.
///
/// https://discord.com/developers/docs/topics/permissions#role-object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// The ID of the role.
    pub id: RoleId,
    /// The name of the role.
    pub name: String,

    /// Color in `0xRRGGBB` form
    pub color: u64,

    /// If this role is pinned in the user listing
    pub hoist: bool,

    /// Position of this role. Higher positions override lower ones.
    pub position: i64,

    /// Whether this role can be mentioned.
    #[serde(default)] // default to false
    pub mentionable: bool,

    /// The permissions granted by this role.
    pub permissions: Permissions,
}

impl Role {
    /// Return a `Mention` which will ping members of this role.
    #[inline(always)]
    pub fn mention(&self) -> Mention {
        self.id.mention()
    }
}

// Permissions

bitflags! {
    /// Set of permissions assignable to a Role or PermissionOverwrite
    #[derive(Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Permissions: u64 {
        const CREATE_INVITE = 1;
        const KICK_MEMBERS = 1 << 1;
        const BAN_MEMBERS = 1 << 2;
        /// Grant all permissions, bypassing channel-specific permissions
        const ADMINISTRATOR = 1 << 3;
        /// Modify roles below their own
        const MANAGE_ROLES = 1 << 28;
        /// Create channels or edit existing ones
        const MANAGE_CHANNELS = 1 << 4;
        /// Change the server's name or move regions
        const MANAGE_SERVER = 1 << 5;
        /// Change their own nickname
        const CHANGE_NICKNAMES = 1 << 26;
        /// Change the nickname of other users
        const MANAGE_NICKNAMES = 1 << 27;
        /// Manage the emojis in a a server.
        const MANAGE_EMOJIS = 1 << 30;
        /// Manage channel webhooks
        const MANAGE_WEBHOOKS = 1 << 29;

        const READ_MESSAGES = 1 << 10;
        const SEND_MESSAGES = 1 << 11;
        /// Send text-to-speech messages to those focused on the channel
        const SEND_TTS_MESSAGES = 1 << 12;
        /// Delete messages by other users
        const MANAGE_MESSAGES = 1 << 13;
        const EMBED_LINKS = 1 << 14;
        const ATTACH_FILES = 1 << 15;
        const READ_HISTORY = 1 << 16;
        /// Trigger a push notification for an entire channel with "@everyone"
        const MENTION_EVERYONE = 1 << 17;
        /// Use emojis from other servers
        const EXTERNAL_EMOJIS = 1 << 18;
        /// Add emoji reactions to messages
        const ADD_REACTIONS = 1 << 6;

        const VOICE_CONNECT = 1 << 20;
        const VOICE_SPEAK = 1 << 21;
        const VOICE_MUTE_MEMBERS = 1 << 22;
        const VOICE_DEAFEN_MEMBERS = 1 << 23;
        /// Move users out of this channel into another
        const VOICE_MOVE_MEMBERS = 1 << 24;
        /// When denied, members must use push-to-talk
        const VOICE_USE_VOICE_ACTIVITY = 1 << 25;
    }
}

/// A channel-specific permission overwrite for a role or member.
///
/// Within a channel, role overwrites are evaluated before member overwrites,
/// so an overwrite targeting a member directly always has the final say.
///
/// https://discord.com/developers/docs/resources/channel#overwrite-object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionOverwrite {
    /// A permission overwrite targeting users with a given role.
    Role {
        /// The ID of the role this overwrite is about.
        id: RoleId,

        /// Permissions to allow for this role.
        #[serde(default)]
        allow: Permissions,
        /// Permissions to deny for this role.
        #[serde(default)]
        deny: Permissions,

        #[doc(hidden)]
        #[serde(rename = "type")]
        kind: Eq<0>,
    },

    /// A permission overwrite targeting a specific user.
    Member {
        /// The ID of the member this overwrite is about.
        id: UserId,

        /// Permissions to allow for this member.
        #[serde(default)]
        allow: Permissions,
        /// Permissions to deny for this member.
        #[serde(default)]
        deny: Permissions,

        #[doc(hidden)]
        #[serde(rename = "type")]
        kind: Eq<1>,
    },
}

impl PermissionOverwrite {
    /// Construct an overwrite targeting users with a given role.
    pub fn role(id: RoleId, allow: Permissions, deny: Permissions) -> PermissionOverwrite {
        PermissionOverwrite::Role {
            id,
            allow,
            deny,
            kind: Eq,
        }
    }

    /// Construct an overwrite targeting a specific user.
    pub fn member(id: UserId, allow: Permissions, deny: Permissions) -> PermissionOverwrite {
        PermissionOverwrite::Member {
            id,
            allow,
            deny,
            kind: Eq,
        }
    }

    /// The ID of the entity this overwrite targets.
    pub fn target(&self) -> PermissionOverwriteId {
        match *self {
            PermissionOverwrite::Role { id, .. } => PermissionOverwriteId::Role(id),
            PermissionOverwrite::Member { id, .. } => PermissionOverwriteId::Member(id),
        }
    }
}

/// The ID of a permission overwrite entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PermissionOverwriteId {
    /// The permission overwrite concerns a member.
    Member(UserId),
    /// The permission overwrite concerns a role.
    Role(RoleId),
}

// Channels

/// The type of a channel, as found in the `type` field of channel payloads.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ChannelType {
    /// A text channel in a server
    Text = 0,
    /// A voice channel
    Voice = 2,
}

/// A textual channel of a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChannel {
    /// The ID of the channel, unique across the server.
    pub id: ChannelId,

    /// The ID of the server this channel belongs to.
    #[serde(rename = "guild_id")]
    pub server_id: Option<ServerId>,

    /// The name of the channel.
    pub name: String,

    /// The order of the channel in relation to others.
    ///
    /// This value is only useful with access to the rest of the channels.
    pub position: i32,

    /// Permission overwrites for members or whole roles.
    #[serde(default)]
    pub permission_overwrites: Vec<PermissionOverwrite>,

    /// The topic of the channel (0-1024 characters).
    pub topic: Option<String>,

    /// The ID of the last message sent (may not point to an existing or valid message).
    #[serde(rename = "last_message_id")]
    pub last_message: Option<MessageId>,
}

/// A voice channel of a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceChannel {
    /// The ID of the channel, unique across the server.
    pub id: ChannelId,

    /// The ID of the server this channel belongs to.
    #[serde(rename = "guild_id")]
    pub server_id: Option<ServerId>,

    /// The name of the channel.
    pub name: String,

    /// The order of the channel in relation to others.
    ///
    /// This value is only useful with access to the rest of the channels.
    pub position: i32,

    /// Permission overwrites for members or whole roles.
    #[serde(default)]
    pub permission_overwrites: Vec<PermissionOverwrite>,

    /// The bitrate (in bits) of the channel.
    pub bitrate: u32,

    /// The user limit on the channel for non streaming users.
    pub user_limit: u16,
}

/// A channel that can be found in a server.
///
/// This type is meant to be used primarily when deserializing
/// channel payloads received from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerChannel {
    /// A text channel in a server.
    Text {
        /// The text channel data of the channel.
        #[serde(flatten)]
        channel: TextChannel,

        #[doc(hidden)]
        #[serde(rename = "type")]
        kind: Eq<0>,
    },

    /// A voice channel in a server.
    Voice {
        /// The voice channel info.
        #[serde(flatten)]
        channel: VoiceChannel,

        #[doc(hidden)]
        #[serde(rename = "type")]
        kind: Eq<2>,
    },
}

impl ServerChannel {
    /// Access the ID of the channel this `enum` represents.
    pub fn id(&self) -> &ChannelId {
        match self {
            Self::Text { channel, .. } => &channel.id,
            Self::Voice { channel, .. } => &channel.id,
        }
    }

    /// The ID of the server the channel belongs to, if present in the payload.
    pub fn server_id(&self) -> Option<ServerId> {
        match self {
            Self::Text { channel, .. } => channel.server_id,
            Self::Voice { channel, .. } => channel.server_id,
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
            Self::Voice { channel, .. } => channel.permission_overwrites.as_ref(),
        }
    }
}

// Mentions

/// A mention targeted at a specific user, channel, or other entity.
///
/// A mention can be constructed by calling `.mention()` on a mentionable item
/// or an ID type which refers to it, and can be formatted into a string using
/// the `format!` macro:
///
/// ```ignore
/// let message = format!("Hey, {}, ping!", user.mention());
/// ```
///
/// If a `String` is required, call `mention.to_string()`.
pub struct Mention {
    prefix: &'static str,
    id: u64,
}

impl fmt::Display for Mention {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.prefix)?;
        fmt::Display::fmt(&self.id, f)?;
        fmt::Write::write_char(f, '>')
    }
}

impl UserId {
    /// Return a `Mention` which will ping this user.
    #[inline(always)]
    pub fn mention(&self) -> Mention {
        Mention {
            prefix: "<@",
            id: self.0,
        }
    }
}

impl RoleId {
    /// Return a `Mention` which will ping members of this role.
    #[inline(always)]
    pub fn mention(&self) -> Mention {
        Mention {
            prefix: "<@&",
            id: self.0,
        }
    }
}

impl ChannelId {
    /// Return a `Mention` which will link to this channel.
    #[inline(always)]
    pub fn mention(&self) -> Mention {
        Mention {
            prefix: "<#",
            id: self.0,
        }
    }
}

#[test]
fn mention_test() {
    assert_eq!(UserId(1234).mention().to_string(), "<@1234>");
    assert_eq!(RoleId(1234).mention().to_string(), "<@&1234>");
    assert_eq!(ChannelId(1234).mention().to_string(), "<#1234>");
}
