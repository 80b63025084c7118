//! Stable device fingerprint for license binding.
//!
//! The fingerprint is a salted SHA-256 over a platform-derived identifier:
//! machine-id on Linux, the hardware UUID on macOS, the registry
//! MachineGuid on Windows, and a random UUID anywhere else. It is generated
//! once and persisted in the settings document; later calls reuse it.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Fingerprint for a raw host identity under `salt`.
pub fn fingerprint_from(salt: &str, raw_identity: &str) -> String {
    sha256_hex(format!("{}::{}", salt, raw_identity).as_bytes())
}

/// Compute a fresh fingerprint for this host.
pub fn stable_fingerprint(salt: &str) -> String {
    fingerprint_from(salt, &raw_identity())
}

/// Raw identity string: platform identifier plus hostname.
pub fn raw_identity() -> String {
    let host = get_hostname();
    match platform_identifier() {
        Some(id) => format!("{}::{}", id, host),
        None => format!("{}::{}::{}", std::env::consts::OS, host, uuid::Uuid::new_v4()),
    }
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Platform-specific stable machine identifier.
fn platform_identifier() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("reg")
            .args([
                "query",
                r"HKLM\SOFTWARE\Microsoft\Cryptography",
                "/v",
                "MachineGuid",
            ])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("MachineGuid"))
                    .and_then(|l| l.split_whitespace().last())
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_is_salted() {
        let a = fingerprint_from("salt-a", "machine::host");
        let b = fingerprint_from("salt-b", "machine::host");
        assert_ne!(a, b);
        assert_eq!(a, fingerprint_from("salt-a", "machine::host"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_raw_identity_contains_hostname_component() {
        let raw = raw_identity();
        assert!(raw.contains("::"));
    }
}
