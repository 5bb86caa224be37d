use super::principal::{Principal, Role};
use crate::error::{AppError, AppResult};

/// Role gate applied after token verification.
pub fn require_role(principal: &Principal, role: Role) -> AppResult<()> {
    match role {
        Role::User => Ok(()),
        Role::Admin if principal.is_admin() => Ok(()),
        Role::Admin => Err(AppError::access_denied("admin_only", "admin role required")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_gate() {
        let user = Principal { subject: "9876543210".into(), role: Role::User };
        let admin = Principal { subject: "9123456780".into(), role: Role::Admin };
        assert!(require_role(&user, Role::User).is_ok());
        assert!(matches!(require_role(&user, Role::Admin), Err(AppError::AccessDenied { .. })));
        assert!(require_role(&admin, Role::Admin).is_ok());
    }
}
