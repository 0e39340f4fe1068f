pub mod data;
pub mod error;
pub mod handler;
pub mod jwks;
pub mod session;
pub mod verifier;

#[cfg(test)]
pub mod test_support;
