use std::time::Duration;

/// Policy knobs for the messaging core.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Roles treated as administrators on every channel.
    pub admin_roles: Vec<String>,
    /// Roles allowed to create channels.
    pub creator_roles: Vec<String>,
    /// How long a send waits for a command lookup before persisting it as pending.
    pub lookup_inline: Duration,
    /// Upper bound on a deferred lookup.
    pub lookup_deadline: Duration,
    pub max_body_chars: usize,
    pub max_attachment_bytes: u64,
    /// Default and maximum page size for history reads.
    pub history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            admin_roles: vec!["admin".into(), "owner".into()],
            creator_roles: vec!["admin".into(), "owner".into(), "manager".into()],
            lookup_inline: Duration::from_millis(750),
            lookup_deadline: Duration::from_secs(10),
            max_body_chars: 4000,
            max_attachment_bytes: 50 * 1024 * 1024,
            history_limit: 200,
        }
    }
}
