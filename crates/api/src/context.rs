use authkit_accounts::User;
use authkit_auth::Principal;

/// The authenticated caller, inserted into request extensions by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub user: User,
    pub principal: Principal,
}
