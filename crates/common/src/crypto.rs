//! Sealed-box envelope encryption used between sensors and the server.
//!
//! The sender generates an ephemeral X25519 secret, performs Diffie-Hellman
//! with the server's static public key, expands the shared secret with
//! HKDF-SHA256 and encrypts the reading with Ascon-AEAD128.
mod sealed_box;

pub use sealed_box::*;
