pub mod billing;
pub mod config;
pub mod gateway;
pub mod normalize;
pub mod rates;
pub mod secrets;
pub mod store;
pub mod subscription;
