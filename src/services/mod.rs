pub mod dispatcher;
pub mod hub;
pub mod verifier;
