use serde::{Deserialize, Serialize};

const RENAME_ARROW: &str = " -> ";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl FileStatus {
    /// Map a two-character porcelain code. Unknown codes count as modifications.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "??" | "A" => FileStatus::Added,
            "M" | "MM" => FileStatus::Modified,
            "D" => FileStatus::Deleted,
            c if c.starts_with('R') => FileStatus::Renamed,
            _ => FileStatus::Modified,
        }
    }
}

/// One working-tree delta reported by `git status --short`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
}

/// Parse `git status --short` output. Never fails; malformed lines are skipped.
pub fn parse_status(porcelain_output: &str) -> Vec<FileChange> {
    porcelain_output.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<FileChange> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return None;
    }

    let code = line.get(..2)?;
    let raw_path = line.get(3..)?.trim();
    if raw_path.is_empty() {
        return None;
    }

    let status = FileStatus::from_code(code);

    if status == FileStatus::Renamed {
        if let Some((old, new)) = raw_path.split_once(RENAME_ARROW) {
            return Some(FileChange {
                path: unquote(new),
                status,
                old_path: Some(unquote(old)),
            });
        }
    }

    Some(FileChange {
        path: unquote(raw_path),
        status,
        old_path: None,
    })
}

/// Git wraps paths with unusual characters in C-style quotes.
fn unquote(path: &str) -> String {
    let path = path.trim();
    let Some(inner) = path
        .strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
    else {
        return path.to_string();
    };

    // Escapes are byte-level: `\303\251` is the UTF-8 encoding of `é`
    let bytes = inner.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let octal = bytes
            .get(i + 1..i + 4)
            .filter(|d| d.iter().all(|b| (b'0'..=b'7').contains(b)));
        if let Some(digits) = octal {
            let value = digits
                .iter()
                .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
            out.push(value as u8);
            i += 4;
            continue;
        }

        match bytes.get(i + 1) {
            Some(b'a') => out.push(0x07),
            Some(b'b') => out.push(0x08),
            Some(b't') => out.push(b'\t'),
            Some(b'n') => out.push(b'\n'),
            Some(b'v') => out.push(0x0b),
            Some(b'f') => out.push(0x0c),
            Some(b'r') => out.push(b'\r'),
            Some(&other) => out.push(other),
            None => out.push(b'\\'),
        }
        i += 2;
    }
    String::from_utf8_lossy(&out).into_owned()
}
