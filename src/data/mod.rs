pub mod account;
pub mod chat;
pub mod notification;
pub mod offer;
pub mod promo;
pub mod request;
pub mod staff;
pub mod support;
pub mod user_notification;
