//! User-facing notification texts. The chat front-end owns localisation; the
//! reconcilers only need these three messages.

use chrono::{DateTime, Utc};

pub fn expiry_warning(email: &str, expiry: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days_left = (expiry - now).num_days().max(0);
    format!(
        "⚠️ Your VPN subscription is about to expire\n\
         Client: {email}\n\
         Days left: {days_left}\n\
         Expires: {}\n\
         Renew it to keep your access!",
        expiry.format("%Y-%m-%d %H:%M UTC")
    )
}

pub fn subscription_activated(days: i32, link: Option<&str>) -> String {
    match link {
        Some(link) => format!(
            "✅ Subscription activated!\n\
             Duration: {days} days\n\n\
             Subscription link (updates automatically):\n{link}"
        ),
        None => format!(
            "✅ Payment received, {days} days credited.\n\
             Your access is being set up, the link will appear in your subscriptions shortly."
        ),
    }
}

pub fn subscription_expired(email: &str) -> String {
    format!("⛔ Subscription {email} has expired and its access was revoked.")
}
