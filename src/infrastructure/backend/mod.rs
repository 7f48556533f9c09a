//! Backend clients

mod http;

pub use self::http::{BackendTarget, HttpBackend};
