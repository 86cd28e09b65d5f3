use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const GITHUB_HOST: &str = "github.com";

/// Accepted remote URL shapes, tried in order.
static REMOTE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // https://github.com/owner/repo(.git)
        Regex::new(r"^https?://(?:[^@/\s]+@)?([^/:\s]+)(?::\d+)?/([^/\s]+)/([^/\s]+?)(?:\.git)?$")
            .unwrap(),
        // ssh://git@github.com/owner/repo(.git)
        Regex::new(r"^ssh://git@([^/:\s]+)(?::\d+)?/([^/\s]+)/([^/\s]+?)(?:\.git)?$").unwrap(),
        // git@github.com:owner/repo(.git)
        Regex::new(r"^git@([^:/\s]+):([^/\s]+)/([^/\s]+?)(?:\.git)?$").unwrap(),
    ]
});

/// Host, owner and repository name extracted from a git remote URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

impl RemoteDescriptor {
    pub fn is_github(&self) -> bool {
        self.host.eq_ignore_ascii_case(GITHUB_HOST)
    }
}

/// Parse a remote URL. Returns `None` for any shape other than the three
/// supported forms; the caller decides how to report it.
pub fn parse_remote_url(url: &str) -> Option<RemoteDescriptor> {
    let url = url.trim();

    REMOTE_PATTERNS.iter().find_map(|re| {
        let caps = re.captures(url)?;
        Some(RemoteDescriptor {
            host: caps[1].to_string(),
            owner: caps[2].to_string(),
            repo: caps[3].to_string(),
        })
    })
}
