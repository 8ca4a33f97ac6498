//! Behaviour every [`Store`] backend must share.
//!
//! Each check takes an empty store. Backends run the suite through
//! [`store_contract_tests!`], which expands to one `#[tokio::test]` per check.

use chrono::{DateTime, Duration, TimeZone, Utc};

use authkit_accounts::{
    AdminUserUpdate, NewPermission, NewRole, Permission, ProfileUpdate, Role, User, UserFilter,
};
use authkit_core::{PageRequest, PermissionId, RoleId};

use super::{
    CODENAME_TAKEN, EMAIL_TAKEN, ROLE_NAME_TAKEN, Store, StoreError, USERNAME_TAKEN,
};

/// Expand the contract suite for one backend. `$open` is an async expression
/// yielding `Option<impl Store>`; `None` skips the test.
macro_rules! store_contract_tests {
    ($open:expr) => {
        store_contract_tests!(@each $open;
            duplicate_identities_conflict_with_fixed_messages,
            list_users_is_newest_first_and_windowed,
            update_user_writes_only_given_columns,
            update_user_rejects_taken_email,
            login_does_not_revive_a_deactivated_user,
            reset_token_is_single_use,
            verification_happens_once,
            deleting_role_and_permission_cascades,
            role_grants_drop_inactive_permissions_and_order_by_priority,
            unknown_ids_are_filtered_on_write,
            default_role_prefers_highest_active_priority,
            stats_count_flags,
        );
    };
    (@each $open:expr; $($check:ident),* $(,)?) => {
        $(
            #[tokio::test]
            async fn $check() {
                let Some(store) = $open.await else {
                    return;
                };
                crate::store::contract::$check(&store).await;
            }
        )*
    };
}

pub(crate) use store_contract_tests;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn user(email: &str, offset_secs: i64) -> User {
    User::new(email.to_string(), "hash".to_string(), t0() + Duration::seconds(offset_secs))
}

fn permission(codename: &str) -> Permission {
    let (resource, action) = codename.split_once('.').unwrap();
    NewPermission {
        name: codename.to_string(),
        codename: codename.to_string(),
        description: None,
        resource: resource.to_string(),
        action: action.to_string(),
        is_active: true,
    }
    .into_permission(t0())
}

fn role(name: &str, priority: i32, permission_ids: Vec<PermissionId>) -> Role {
    NewRole {
        name: name.to_string(),
        description: None,
        is_default: false,
        is_active: true,
        priority,
        permission_ids: Vec::new(),
    }
    .into_role(permission_ids, t0())
}

fn deactivate() -> AdminUserUpdate {
    AdminUserUpdate {
        is_active: Some(false),
        ..AdminUserUpdate::default()
    }
}

fn profile(update: ProfileUpdate) -> AdminUserUpdate {
    AdminUserUpdate {
        profile: update,
        ..AdminUserUpdate::default()
    }
}

pub(crate) async fn duplicate_identities_conflict_with_fixed_messages(store: &dyn Store) {
    let mut a = user("a@example.com", 0);
    a.username = Some("alice".into());
    store.insert_user(&a).await.unwrap();

    let dup_email = user("a@example.com", 1);
    assert_eq!(store.insert_user(&dup_email).await, Err(StoreError::Conflict(EMAIL_TAKEN)));

    let mut dup_name = user("b@example.com", 1);
    dup_name.username = Some("alice".into());
    assert_eq!(store.insert_user(&dup_name).await, Err(StoreError::Conflict(USERNAME_TAKEN)));

    // Two users without a username never collide.
    store.insert_user(&user("c@example.com", 2)).await.unwrap();
    store.insert_user(&user("d@example.com", 3)).await.unwrap();

    store.insert_permission(&permission("user.read")).await.unwrap();
    assert_eq!(
        store.insert_permission(&permission("user.read")).await,
        Err(StoreError::Conflict(CODENAME_TAKEN))
    );

    store.insert_role(&role("reader", 10, vec![])).await.unwrap();
    assert_eq!(
        store.insert_role(&role("reader", 20, vec![])).await,
        Err(StoreError::Conflict(ROLE_NAME_TAKEN))
    );
}

pub(crate) async fn list_users_is_newest_first_and_windowed(store: &dyn Store) {
    for i in 0..5 {
        store.insert_user(&user(&format!("u{i}@example.com"), i)).await.unwrap();
    }
    let page = PageRequest::new(Some(1), Some(2)).unwrap();
    let (items, total) = store.list_users(&UserFilter::default(), page).await.unwrap();
    assert_eq!(total, 5);
    let emails: Vec<_> = items.iter().map(|u| u.email.as_str()).collect();
    assert_eq!(emails, vec!["u3@example.com", "u2@example.com"]);

    let search = UserFilter {
        search: Some("U4@".into()),
        ..UserFilter::default()
    };
    let (items, total) = store.list_users(&search, PageRequest::default()).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(items[0].email, "u4@example.com");

    let past_end = PageRequest::new(Some(10), Some(2)).unwrap();
    let (items, total) = store.list_users(&UserFilter::default(), past_end).await.unwrap();
    assert!(items.is_empty());
    assert_eq!(total, 5);
}

pub(crate) async fn update_user_writes_only_given_columns(store: &dyn Store) {
    let r = role("user", 10, vec![]);
    store.insert_role(&r).await.unwrap();
    let mut u = user("a@example.com", 0);
    u.role_ids = vec![r.id];
    store.insert_user(&u).await.unwrap();

    // A reset token issued after the caller read the user must survive.
    let expires = t0() + Duration::hours(1);
    store.set_password_reset(u.id, "reset-1", expires).await.unwrap();

    let at = t0() + Duration::minutes(5);
    let update = profile(ProfileUpdate {
        first_name: Some("Ann".into()),
        ..ProfileUpdate::default()
    });
    let updated = store.update_user(u.id, &update, at).await.unwrap().unwrap();
    assert_eq!(updated.first_name.as_deref(), Some("Ann"));
    assert_eq!(updated.updated_at, Some(at));

    let stored = store.get_user(u.id).await.unwrap().unwrap();
    assert_eq!(stored.first_name.as_deref(), Some("Ann"));
    assert_eq!(stored.role_ids, vec![r.id]);
    assert_eq!(stored.password_reset_token.as_deref(), Some("reset-1"));
    assert_eq!(stored.password_reset_token_expires, Some(expires));
    assert!(stored.is_active);

    let missing = store
        .update_user(authkit_core::UserId::new(), &update, at)
        .await
        .unwrap();
    assert!(missing.is_none());
}

pub(crate) async fn update_user_rejects_taken_email(store: &dyn Store) {
    let a = user("a@example.com", 0);
    let b = user("b@example.com", 1);
    store.insert_user(&a).await.unwrap();
    store.insert_user(&b).await.unwrap();

    let update = profile(ProfileUpdate {
        email: Some("a@example.com".into()),
        ..ProfileUpdate::default()
    });
    assert_eq!(
        store.update_user(b.id, &update, t0()).await,
        Err(StoreError::Conflict(EMAIL_TAKEN))
    );
    assert_eq!(store.get_user(b.id).await.unwrap().unwrap().email, "b@example.com");
}

pub(crate) async fn login_does_not_revive_a_deactivated_user(store: &dyn Store) {
    let u = user("a@example.com", 0);
    store.insert_user(&u).await.unwrap();

    let at = t0() + Duration::minutes(1);
    assert!(store.record_login(u.id, at).await.unwrap());
    assert_eq!(store.get_user(u.id).await.unwrap().unwrap().last_login, Some(at));

    store.update_user(u.id, &deactivate(), at).await.unwrap();
    assert!(!store.record_login(u.id, at + Duration::minutes(1)).await.unwrap());

    let stored = store.get_user(u.id).await.unwrap().unwrap();
    assert!(!stored.is_active);
    assert_eq!(stored.last_login, Some(at));
}

pub(crate) async fn reset_token_is_single_use(store: &dyn Store) {
    let u = user("a@example.com", 0);
    store.insert_user(&u).await.unwrap();
    store
        .set_password_reset(u.id, "reset-1", t0() + Duration::hours(1))
        .await
        .unwrap();

    assert!(!store.consume_password_reset(u.id, "other", "new-hash", t0()).await.unwrap());
    assert!(store.consume_password_reset(u.id, "reset-1", "new-hash", t0()).await.unwrap());
    assert!(!store.consume_password_reset(u.id, "reset-1", "newer-hash", t0()).await.unwrap());

    let stored = store.get_user(u.id).await.unwrap().unwrap();
    assert_eq!(stored.hashed_password, "new-hash");
    assert!(stored.password_reset_token.is_none());
    assert!(stored.password_reset_token_expires.is_none());

    store.set_password_reset(u.id, "reset-2", t0()).await.unwrap();
    let late = t0() + Duration::seconds(1);
    assert!(!store.consume_password_reset(u.id, "reset-2", "late-hash", late).await.unwrap());

    store.set_password(u.id, "changed-hash", late).await.unwrap();
    let stored = store.get_user(u.id).await.unwrap().unwrap();
    assert_eq!(stored.hashed_password, "changed-hash");
    assert_eq!(stored.updated_at, Some(late));
}

pub(crate) async fn verification_happens_once(store: &dyn Store) {
    let u = user("a@example.com", 0);
    store.insert_user(&u).await.unwrap();
    store.set_verification_token(u.id, "verify-1", t0()).await.unwrap();
    assert_eq!(
        store.get_user(u.id).await.unwrap().unwrap().verification_token.as_deref(),
        Some("verify-1")
    );

    assert!(store.mark_verified(u.id, t0()).await.unwrap());
    assert!(!store.mark_verified(u.id, t0()).await.unwrap());

    // A verified account does not take new tokens.
    store.set_verification_token(u.id, "verify-2", t0()).await.unwrap();
    let stored = store.get_user(u.id).await.unwrap().unwrap();
    assert!(stored.is_verified);
    assert!(stored.verification_token.is_none());
}

pub(crate) async fn deleting_role_and_permission_cascades(store: &dyn Store) {
    let p = permission("user.read");
    store.insert_permission(&p).await.unwrap();
    let r = role("reader", 20, vec![p.id]);
    store.insert_role(&r).await.unwrap();
    let mut u = user("a@example.com", 0);
    u.role_ids = vec![r.id];
    store.insert_user(&u).await.unwrap();

    assert!(store.delete_permission(p.id).await.unwrap());
    assert!(store.get_role(r.id).await.unwrap().unwrap().permission_ids.is_empty());

    assert!(store.delete_role(r.id).await.unwrap());
    assert!(store.get_user(u.id).await.unwrap().unwrap().role_ids.is_empty());
    assert!(!store.delete_role(r.id).await.unwrap());
}

pub(crate) async fn role_grants_drop_inactive_permissions_and_order_by_priority(store: &dyn Store) {
    let read = permission("user.read");
    let mut list = permission("user.list");
    list.is_active = false;
    store.insert_permission(&read).await.unwrap();
    store.insert_permission(&list).await.unwrap();

    let low = role("low", 10, vec![read.id]);
    let high = role("high", 50, vec![read.id, list.id]);
    store.insert_role(&low).await.unwrap();
    store.insert_role(&high).await.unwrap();

    let mut u = user("a@example.com", 0);
    u.role_ids = vec![low.id, high.id];
    store.insert_user(&u).await.unwrap();

    let grants = store.role_grants(u.id).await.unwrap();
    assert_eq!(grants.len(), 2);
    assert_eq!(grants[0].name, "high");
    assert!(grants[0].grants("user.read"));
    assert!(!grants[0].grants("user.list"));
}

pub(crate) async fn unknown_ids_are_filtered_on_write(store: &dyn Store) {
    let p = permission("user.read");
    store.insert_permission(&p).await.unwrap();
    let r = role("reader", 20, vec![p.id, PermissionId::new()]);
    store.insert_role(&r).await.unwrap();
    assert_eq!(store.get_role(r.id).await.unwrap().unwrap().permission_ids, vec![p.id]);

    let u = user("a@example.com", 0);
    store.insert_user(&u).await.unwrap();
    store.set_user_roles(u.id, &[r.id, RoleId::new(), r.id]).await.unwrap();
    assert_eq!(store.get_user(u.id).await.unwrap().unwrap().role_ids, vec![r.id]);
}

pub(crate) async fn default_role_prefers_highest_active_priority(store: &dyn Store) {
    let mut a = role("basic", 10, vec![]);
    a.is_default = true;
    let mut b = role("plus", 20, vec![]);
    b.is_default = true;
    b.is_active = false;
    store.insert_role(&a).await.unwrap();
    store.insert_role(&b).await.unwrap();
    assert_eq!(store.default_role().await.unwrap().unwrap().name, "basic");
}

pub(crate) async fn stats_count_flags(store: &dyn Store) {
    let mut a = user("a@example.com", 0);
    a.is_verified = true;
    a.is_superuser = true;
    let mut b = user("b@example.com", 1);
    b.is_active = false;
    store.insert_user(&a).await.unwrap();
    store.insert_user(&b).await.unwrap();

    let stats = store.user_stats().await.unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.active_users, 1);
    assert_eq!(stats.verified_users, 1);
    assert_eq!(stats.superusers, 1);
}
