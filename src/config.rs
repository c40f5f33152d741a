//! Process configuration and SSH algorithm preference tables.
//!
//! Network gear routinely ships SSH stacks that predate modern algorithm
//! defaults, so the preference tables below lean toward breadth: legacy
//! Diffie-Hellman groups, CBC ciphers, and plain HMAC variants stay enabled
//! alongside the current recommendations.

use once_cell::sync::OnceCell;
use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};

/// Process-wide settings populated once at startup from CLI flags.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Encoding detection confidence threshold handed to the output decoder.
    pub confidence: u32,
    /// When true, captured command output is persisted under `log_cfg_dir`.
    pub log_cfg_flag: bool,
    /// Directory for the captured-output side channel.
    pub log_cfg_dir: String,
    /// When true, the ingress reuses device sessions through the pool.
    pub pool_sessions: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            confidence: 30,
            log_cfg_flag: false,
            log_cfg_dir: "/var/log/netd".to_string(),
            pool_sessions: false,
        }
    }
}

static APP_CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// Installs the process configuration. Later calls are ignored.
pub fn init(config: AppConfig) {
    let _ = APP_CONFIG.set(config);
}

/// The active configuration, or defaults when the binary never called
/// [`init`] (library and test usage).
pub fn get() -> AppConfig {
    APP_CONFIG.get().cloned().unwrap_or_default()
}

/// Key exchange algorithms in preference order, newest first.
pub const KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA256,
    kex::DH_GEX_SHA1,
    kex::DH_G14_SHA256,
    kex::DH_G14_SHA1,
    kex::DH_G1_SHA1,
    kex::DH_G15_SHA512,
    kex::DH_G16_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
];

/// Ciphers in preference order, with CBC modes retained for old firmware.
pub static CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_192_CBC,
    cipher::AES_128_CBC,
];

/// MAC algorithms, ETM variants preferred.
pub const MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1,
];

/// Compression preferences. `NONE` first keeps latency predictable on slow
/// control planes.
pub const COMPRESSION_ALGORITHMS: &[compression::Name] = &[
    compression::NONE,
    compression::ZLIB,
    compression::ZLIB_LEGACY,
];

/// Host key algorithms, including RSA-SHA1 for devices that never learned
/// rsa-sha2.
pub const KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
    Algorithm::Dsa,
];
