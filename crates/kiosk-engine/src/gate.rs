use kiosk_types::models::Role;

use crate::error::EngineError;

/// `actor` may perform an action that requires `required`.
pub fn allowed(actor: Role, required: Role) -> bool {
    actor.rank() >= required.rank()
}

pub fn require(actor: Role, required: Role) -> Result<(), EngineError> {
    if allowed(actor, required) {
        Ok(())
    } else {
        Err(EngineError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_sixteen_pairs_follow_rank() {
        let expected = [
            // (actor, required, allowed)
            (Role::User, Role::User, true),
            (Role::User, Role::Moderator, false),
            (Role::User, Role::Admin, false),
            (Role::User, Role::Owner, false),
            (Role::Moderator, Role::User, true),
            (Role::Moderator, Role::Moderator, true),
            (Role::Moderator, Role::Admin, false),
            (Role::Moderator, Role::Owner, false),
            (Role::Admin, Role::User, true),
            (Role::Admin, Role::Moderator, true),
            (Role::Admin, Role::Admin, true),
            (Role::Admin, Role::Owner, false),
            (Role::Owner, Role::User, true),
            (Role::Owner, Role::Moderator, true),
            (Role::Owner, Role::Admin, true),
            (Role::Owner, Role::Owner, true),
        ];
        for (actor, required, ok) in expected {
            assert_eq!(allowed(actor, required), ok, "{actor:?} -> {required:?}");
        }
    }

    #[test]
    fn require_maps_denial_to_unauthorized() {
        assert!(require(Role::Admin, Role::Moderator).is_ok());
        assert!(matches!(
            require(Role::Moderator, Role::Admin),
            Err(EngineError::Unauthorized)
        ));
    }
}
