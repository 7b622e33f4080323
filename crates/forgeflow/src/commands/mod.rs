pub mod certs;
pub mod configure;
pub mod credentials;
pub mod provision;
pub mod status;
pub mod teardown;
pub mod validate;
