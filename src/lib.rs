#![doc = include_str!("../README.md")]

pub mod cache;
pub mod config;
pub mod cookie;
pub mod envelope;
pub mod error;
pub mod person;
pub mod service;
pub mod session;
pub mod value;

// Re-exports for convenient access
pub use cache::ResponseCache;
pub use config::Config;
pub use cookie::{Cookie, Expiry, parse_cookie_source};
pub use envelope::RawEnvelope;
pub use error::Error;
pub use person::{
    Person, PersonId, decode_all, decode_authenticated_person, decode_person, find_by_full_name,
    find_by_nickname,
};
pub use service::Service;
pub use session::Session;
pub use value::PathError;
