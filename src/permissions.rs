//! Effective permission resolution.
//!
//! Resolution composes role grants with channel overwrites into a single
//! bitmask. Both entry points are pure: they read the member, role table,
//! and overwrite list they are given and mutate none of them. The cached
//! result on [`LiveMember`] is maintained by the update merger, not here.

use std::collections::BTreeMap;

use tracing::warn;

use crate::model::{LiveMember, PermissionOverwrite, Permissions, Role, RoleId};

/// Compute a member's server-wide permissions.
///
/// The result is the union of the permission sets of every role the member
/// holds, including `@everyone`. Holding `ADMINISTRATOR` through any role
/// short-circuits to the full permission set.
pub fn resolve_server(member: &LiveMember, roles: &BTreeMap<RoleId, Role>) -> Permissions {
    let mut permissions = Permissions::empty();

    for role_id in member.roles() {
        if let Some(role) = roles.get(role_id) {
            permissions |= role.permissions;
        } else {
            warn!(
                "member {} on {} holds non-existent role {}",
                member.id(),
                member.server_id,
                role_id
            );
        }
    }

    // Administrators have all permissions everywhere
    if permissions.contains(Permissions::ADMINISTRATOR) {
        return Permissions::all();
    }
    permissions
}

/// Apply a channel's overwrites on top of a member's server-wide permissions.
///
/// Role overwrites whose target the member holds are applied first, in
/// ascending role position, each clearing its deny mask before setting its
/// allow mask. Later application wins, so higher-ranked roles override
/// lower-ranked ones, and the member overwrite pass that follows always has
/// the final say.
pub fn resolve_channel(
    member: &LiveMember,
    overwrites: &[PermissionOverwrite],
    roles: &BTreeMap<RoleId, Role>,
    server_permissions: Permissions,
) -> Permissions {
    // Administrators are not subject to overwrites
    if server_permissions.contains(Permissions::ADMINISTRATOR) {
        return Permissions::all();
    }

    let mut permissions = server_permissions;

    let mut role_overwrites: Vec<(i64, Permissions, Permissions)> = overwrites
        .iter()
        .filter_map(|overwrite| match *overwrite {
            PermissionOverwrite::Role {
                id, allow, deny, ..
            } if member.holds_role(id) => roles.get(&id).map(|role| (role.position, allow, deny)),
            _ => None,
        })
        .collect();
    // Stable sort: overwrites of equally ranked roles keep insertion order.
    role_overwrites.sort_by_key(|&(position, ..)| position);
    for (_, allow, deny) in role_overwrites {
        permissions = (permissions & !deny) | allow;
    }

    for overwrite in overwrites {
        if let PermissionOverwrite::Member {
            id, allow, deny, ..
        } = overwrite
        {
            if *id == member.id() {
                permissions = (permissions & !*deny) | *allow;
            }
        }
    }

    permissions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Member, ServerId, User, UserId};
    use crate::serial::Optional;
    use chrono::{DateTime, FixedOffset};

    fn when() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2016-03-01T10:00:00Z").unwrap()
    }

    fn user(id: u64) -> User {
        User {
            id: UserId(id),
            name: format!("user-{}", id),
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

    fn role_table(roles: Vec<Role>) -> BTreeMap<RoleId, Role> {
        roles.into_iter().map(|role| (role.id, role)).collect()
    }

    fn member(id: u64, role_ids: Vec<RoleId>, roles: &BTreeMap<RoleId, Role>) -> LiveMember {
        let model = Member {
            user: Some(user(id)),
            nick: Optional::Absent,
            roles: role_ids,
            joined_at: when(),
        };
        LiveMember::new(ServerId(1), user(id), &model, roles, true)
    }

    #[test]
    fn server_resolution_unions_role_grants() {
        let roles = role_table(vec![
            role(1, 0, Permissions::READ_MESSAGES),
            role(2, 1, Permissions::READ_MESSAGES | Permissions::KICK_MEMBERS),
        ]);
        let member = member(7, vec![RoleId(2)], &roles);

        assert_eq!(
            resolve_server(&member, &roles),
            Permissions::READ_MESSAGES | Permissions::KICK_MEMBERS
        );
    }

    #[test]
    fn administrator_short_circuits_to_everything() {
        let roles = role_table(vec![
            role(1, 0, Permissions::empty()),
            role(2, 1, Permissions::ADMINISTRATOR),
        ]);
        let member = member(7, vec![RoleId(2)], &roles);

        assert_eq!(resolve_server(&member, &roles), Permissions::all());
        // Overwrites cannot take anything away from an administrator.
        let overwrites = [PermissionOverwrite::role(
            RoleId(2),
            Permissions::empty(),
            Permissions::READ_MESSAGES,
        )];
        assert_eq!(
            resolve_channel(&member, &overwrites, &roles, Permissions::all()),
            Permissions::all()
        );
    }

    #[test]
    fn role_overwrite_denies_server_grant() {
        let roles = role_table(vec![
            role(1, 0, Permissions::READ_MESSAGES),
            role(2, 1, Permissions::READ_MESSAGES | Permissions::KICK_MEMBERS),
        ]);
        let member = member(7, vec![RoleId(2)], &roles);
        let server_permissions = resolve_server(&member, &roles);

        let overwrites = [PermissionOverwrite::role(
            RoleId(2),
            Permissions::empty(),
            Permissions::KICK_MEMBERS,
        )];
        assert_eq!(
            resolve_channel(&member, &overwrites, &roles, server_permissions),
            Permissions::READ_MESSAGES
        );
    }

    #[test]
    fn role_overwrites_apply_in_ascending_position_order() {
        let roles = role_table(vec![
            role(1, 0, Permissions::READ_MESSAGES),
            role(2, 1, Permissions::empty()),
            role(3, 2, Permissions::empty()),
        ]);
        let member = member(7, vec![RoleId(2), RoleId(3)], &roles);

        // Listed deny-last, but the higher-ranked role's allow must win.
        let overwrites = [
            PermissionOverwrite::role(RoleId(3), Permissions::SEND_MESSAGES, Permissions::empty()),
            PermissionOverwrite::role(RoleId(2), Permissions::empty(), Permissions::SEND_MESSAGES),
        ];
        let resolved = resolve_channel(&member, &overwrites, &roles, Permissions::READ_MESSAGES);
        assert!(resolved.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn member_overwrite_has_final_say() {
        let roles = role_table(vec![
            role(1, 0, Permissions::READ_MESSAGES),
            role(2, 5, Permissions::empty()),
        ]);
        let member = member(7, vec![RoleId(2)], &roles);

        // The member-targeted deny sits before a high-ranked role allow in
        // insertion order, and still wins.
        let overwrites = [
            PermissionOverwrite::member(
                UserId(7),
                Permissions::empty(),
                Permissions::SEND_MESSAGES,
            ),
            PermissionOverwrite::role(RoleId(2), Permissions::SEND_MESSAGES, Permissions::empty()),
        ];
        let resolved = resolve_channel(&member, &overwrites, &roles, Permissions::READ_MESSAGES);
        assert!(!resolved.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn everyone_overwrite_applies_to_all_members() {
        let roles = role_table(vec![role(1, 0, Permissions::READ_MESSAGES)]);
        let member = member(7, vec![], &roles);

        let overwrites = [PermissionOverwrite::role(
            ServerId(1).everyone(),
            Permissions::empty(),
            Permissions::READ_MESSAGES,
        )];
        let resolved = resolve_channel(&member, &overwrites, &roles, Permissions::READ_MESSAGES);
        assert_eq!(resolved, Permissions::empty());
    }
}
