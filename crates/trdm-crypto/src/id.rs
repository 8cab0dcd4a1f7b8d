use rand::RngCore;

/// Prefixes for `wsu:Id` / `Id` attribute values in a secured envelope.
pub struct IdPrefix;

impl IdPrefix {
    pub const BODY: &'static str = "id";
    pub const X509: &'static str = "X509";
    pub const TIMESTAMP: &'static str = "TS";
    pub const SIGNATURE: &'static str = "SIG";
    pub const KEY_INFO: &'static str = "KI";
    pub const SECURITY_TOKEN_REF: &'static str = "STR";
}

/// A fresh element id: `<prefix>-<16 hex chars>`.
///
/// Ids start with a letter so they are valid XML `NCName`s.
pub fn generate_id(prefix: &str) -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{prefix}-{}", hex::encode(bytes))
}
