pub mod adapter;
pub mod config;
pub mod inference;
pub mod server;
pub mod upload;

/// File naming helpers for transient storage
pub mod util {
    use rand::Rng;
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Longest sanitized file name kept in a transient file name
    const MAX_NAME_LEN: usize = 64;

    /// Build a collision-resistant file name: `<unix millis>-<random>-<name>`.
    /// The random suffix keeps concurrent uploads within the same millisecond
    /// apart
    pub fn unique_file_name(original: &str) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let suffix: u64 = rand::thread_rng().gen();
        format!("{millis}-{suffix:016x}-{}", sanitize(original))
    }

    /// Keep only characters that are safe in a file name on every platform
    pub fn sanitize(name: &str) -> String {
        // Drop any directory part a client may have sent
        let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
        let clean: String = base
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            .take(MAX_NAME_LEN)
            .collect();

        match clean.trim_start_matches('.') {
            "" => "upload".to_string(),
            s => s.to_string(),
        }
    }

}
