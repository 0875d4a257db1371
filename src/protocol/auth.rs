//! `mysql_native_password` authentication.
//!
//! ```text
//! SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))
//! ```

use sha1::{Digest, Sha1};

use super::constant::MYSQL_NATIVE_PASSWORD;
use crate::error::{Error, Result};

/// Length of the scramble used by `mysql_native_password`.
pub const SCRAMBLE_LEN: usize = 20;

/// Compute the auth response for the plugin the server asked for.
///
/// Only `mysql_native_password` is supported.
pub fn auth_response(plugin_name: &str, password: &str, auth_plugin_data: &[u8]) -> Result<Vec<u8>> {
    if plugin_name != MYSQL_NATIVE_PASSWORD {
        return Err(Error::AuthPlugin(plugin_name.to_string()));
    }
    let scramble = &auth_plugin_data[..auth_plugin_data.len().min(SCRAMBLE_LEN)];
    Ok(native_password(password.as_bytes(), scramble))
}

/// Scramble `password` with the server's 20-byte `scramble`.
///
/// An empty password yields an empty response.
pub fn native_password(password: &[u8], scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1: [u8; 20] = Sha1::digest(password).into();
    let stage2: [u8; 20] = Sha1::digest(stage1).into();

    let mut hasher = Sha1::new();
    hasher.update(scramble);
    hasher.update(stage2);
    let mask: [u8; 20] = hasher.finalize().into();

    stage1.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect()
}
