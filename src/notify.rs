//! Outbound deliveries to people.
//!
//! There is no push or mail provider behind this service. Every delivery is
//! emitted as a structured `tracing` event on the `notify` target so an
//! external collector can forward it.

use crate::data::account::Account;
use crate::role::Role;

/// Push to every back office user.
pub fn push_to_admins(title: &str, body: &str, kind: &str, room_id: &str, sender_id: &str, sender: Role) {
    tracing::info!(
        target: "notify",
        channel = "push",
        audience = "admins",
        title,
        body,
        kind,
        room_id,
        sender_id,
        sender = %sender,
        "admin push notification"
    );
}

/// Push to the account's device. Returns `false` when it has none registered.
pub fn push_to_account(account: &Account, title: &str, body: &str, kind: &str) -> bool {
    let device_token = match account.push_target() {
        Some(it) => it,
        None => {
            tracing::debug!(target: "notify", "account {} has no device token", account.id);
            return false;
        }
    };

    tracing::info!(
        target: "notify",
        channel = "push",
        account_id = %account.id,
        device_token,
        platform = account.platform.as_deref().unwrap_or_default(),
        title,
        body,
        kind,
        "account push notification"
    );
    true
}

pub fn email_account(account: &Account, message: &str) {
    tracing::info!(
        target: "notify",
        channel = "email",
        account_id = %account.id,
        name = account.full_name.as_deref().unwrap_or_default(),
        email = %account.email,
        phone = account.phone_number.as_deref().unwrap_or_default(),
        message,
        "e-mail notification"
    );
}
