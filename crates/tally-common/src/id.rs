/// Length of short hex ids generated from UUID v7 (e.g., "0196a3b4").
const SHORT_ID_LEN: usize = 8;

/// Generate a transaction UUID (hyphenated v4).
///
/// Transaction ids must carry no timestamp component — a time-ordered id
/// would let observers correlate transactions built in the same batch,
/// defeating certificate unlinkability.
pub fn generate_tx_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a short 8-character hex id from UUID v7.
///
/// Takes the last 8 hex characters of the UUID, which come from the
/// random portion — unique even when multiple ids are generated within
/// the same millisecond. Used for log correlation, never for identity.
pub fn generate_short_id() -> String {
    let full = uuid::Uuid::now_v7().simple().to_string();
    full[full.len() - SHORT_ID_LEN..].to_string()
}
