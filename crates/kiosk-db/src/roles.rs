use kiosk_types::models::{Role, StaffEntry, UserId};
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::Database;

impl Database {
    /// Current role of `user`. Unlisted users are plain users; the configured
    /// owner is always the owner, whatever the table says.
    pub fn role_of(&self, user: UserId) -> Result<Role> {
        if user == self.owner() {
            return Ok(Role::Owner);
        }
        self.with_conn(|conn| role_of(conn, user))
    }

    pub fn list_staff(&self) -> Result<Vec<StaffEntry>> {
        self.with_conn(list_staff)
    }

    pub fn grant_role(&self, user: UserId, role: Role) -> Result<()> {
        let owner = self.owner();
        self.with_tx(|conn| grant_role(conn, owner, user, role))?;
        info!("Granted {} to user {}", role.as_str(), user);
        Ok(())
    }

    pub fn revoke_role(&self, user: UserId) -> Result<()> {
        let owner = self.owner();
        self.with_tx(|conn| revoke_role(conn, owner, user))?;
        info!("Revoked staff role of user {}", user);
        Ok(())
    }
}

/// Makes `owner` the one and only owner row. Stale owner rows left by an
/// earlier configuration are demoted to admin.
pub fn seed_owner(conn: &Connection, owner: UserId) -> Result<()> {
    let demoted = conn.execute(
        "UPDATE staff SET role = 'admin' WHERE role = 'owner' AND user_id != ?1",
        [owner.0],
    )?;
    if demoted > 0 {
        warn!("Demoted {} previous owner(s) to admin", demoted);
    }
    conn.execute(
        "INSERT INTO staff (user_id, role) VALUES (?1, 'owner')
         ON CONFLICT(user_id) DO UPDATE SET role = 'owner'",
        [owner.0],
    )?;
    Ok(())
}

pub fn role_of(conn: &Connection, user: UserId) -> Result<Role> {
    let stored: Option<String> = conn
        .query_row("SELECT role FROM staff WHERE user_id = ?1", [user.0], |row| row.get(0))
        .optional()?;
    match stored {
        None => Ok(Role::User),
        Some(s) => Role::parse(&s)
            .ok_or_else(|| StoreError::Corrupt(format!("staff {}: role '{}'", user, s))),
    }
}

/// Staff ordered owner, admin, moderator, then by id.
pub fn list_staff(conn: &Connection) -> Result<Vec<StaffEntry>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, role FROM staff
         ORDER BY CASE role WHEN 'owner' THEN 0 WHEN 'admin' THEN 1 ELSE 2 END, user_id",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(id, role)| {
            let role = Role::parse(&role)
                .ok_or_else(|| StoreError::Corrupt(format!("staff {}: role '{}'", id, role)))?;
            Ok(StaffEntry {
                user_id: UserId(id),
                role,
            })
        })
        .collect()
}

pub fn grant_role(conn: &Connection, owner: UserId, user: UserId, role: Role) -> Result<()> {
    if user == owner {
        return Err(StoreError::OwnerImmutable);
    }
    if !Role::GRANTABLE.contains(&role) {
        return Err(StoreError::InvalidInput("only admin or moderator can be granted"));
    }
    conn.execute(
        "INSERT INTO staff (user_id, role) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO UPDATE SET role = excluded.role",
        rusqlite::params![user.0, role.as_str()],
    )?;
    Ok(())
}

/// Returns the user to the plain `user` role. Revoking a non-staff user is a
/// no-op.
pub fn revoke_role(conn: &Connection, owner: UserId, user: UserId) -> Result<()> {
    if user == owner {
        return Err(StoreError::OwnerImmutable);
    }
    conn.execute("DELETE FROM staff WHERE user_id = ?1", [user.0])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: UserId = UserId(1000);

    fn db() -> Database {
        Database::open_in_memory(OWNER).unwrap()
    }

    #[test]
    fn owner_is_always_owner() {
        let db = db();
        assert_eq!(db.role_of(OWNER).unwrap(), Role::Owner);
        assert_eq!(db.role_of(UserId(1)).unwrap(), Role::User);
        assert_eq!(
            db.list_staff().unwrap(),
            vec![StaffEntry {
                user_id: OWNER,
                role: Role::Owner
            }]
        );
    }

    #[test]
    fn owner_cannot_be_revoked_or_regranted() {
        let db = db();
        assert!(matches!(db.revoke_role(OWNER), Err(StoreError::OwnerImmutable)));
        assert!(matches!(db.grant_role(OWNER, Role::Moderator), Err(StoreError::OwnerImmutable)));
        assert_eq!(db.role_of(OWNER).unwrap(), Role::Owner);
    }

    #[test]
    fn only_admin_and_moderator_are_grantable() {
        let db = db();
        assert!(matches!(
            db.grant_role(UserId(5), Role::Owner),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            db.grant_role(UserId(5), Role::User),
            Err(StoreError::InvalidInput(_))
        ));
        assert_eq!(db.role_of(UserId(5)).unwrap(), Role::User);
    }

    #[test]
    fn grant_then_revoke_takes_effect_immediately() {
        let db = db();
        db.grant_role(UserId(5), Role::Moderator).unwrap();
        assert_eq!(db.role_of(UserId(5)).unwrap(), Role::Moderator);

        db.grant_role(UserId(5), Role::Admin).unwrap();
        assert_eq!(db.role_of(UserId(5)).unwrap(), Role::Admin);

        db.revoke_role(UserId(5)).unwrap();
        assert_eq!(db.role_of(UserId(5)).unwrap(), Role::User);

        // Revoking again is harmless.
        db.revoke_role(UserId(5)).unwrap();
    }

    #[test]
    fn roster_is_ordered_by_rank_then_id() {
        let db = db();
        db.grant_role(UserId(9), Role::Moderator).unwrap();
        db.grant_role(UserId(3), Role::Moderator).unwrap();
        db.grant_role(UserId(7), Role::Admin).unwrap();

        let roster: Vec<_> = db
            .list_staff()
            .unwrap()
            .into_iter()
            .map(|e| (e.user_id.0, e.role))
            .collect();
        assert_eq!(
            roster,
            vec![
                (1000, Role::Owner),
                (7, Role::Admin),
                (3, Role::Moderator),
                (9, Role::Moderator),
            ]
        );
    }

    #[test]
    fn reseeding_demotes_a_stale_owner() {
        let db = db();
        db.with_tx(|conn| seed_owner(conn, UserId(2000))).unwrap();
        db.with_tx(|conn| seed_owner(conn, OWNER)).unwrap();

        assert_eq!(db.role_of(OWNER).unwrap(), Role::Owner);
        assert_eq!(db.role_of(UserId(2000)).unwrap(), Role::Admin);
    }
}
