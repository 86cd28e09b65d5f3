use std::fmt;

/// A git invocation, kept as an argument vector so no shell ever parses user text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommand {
    args: Vec<String>,
}

impl GitCommand {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn status_short() -> Self {
        Self::new(["status", "--short"])
    }

    pub fn show_current_branch() -> Self {
        Self::new(["branch", "--show-current"])
    }

    pub fn remote_origin_url() -> Self {
        Self::new(["config", "--get", "remote.origin.url"])
    }

    pub fn origin_head() -> Self {
        Self::new(["symbolic-ref", "--short", "refs/remotes/origin/HEAD"])
    }

    pub fn remote_show_origin() -> Self {
        Self::new(["remote", "show", "origin"])
    }

    pub fn add_all() -> Self {
        Self::new(["add", "."])
    }

    pub fn commit(message: &str) -> Self {
        Self::new(["commit", "-m", message])
    }

    pub fn push(branch: &str) -> Self {
        Self::new(["push", "origin", branch])
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Subcommand name, e.g. `push`
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Render as a single shell-safe command line, e.g. `git commit -m "say \"hi\""`.
    pub fn to_command_line(&self) -> String {
        let mut line = String::from("git");
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote_arg(arg));
        }
        line
    }
}

impl fmt::Display for GitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_command_line())
    }
}

const SHELL_SPECIAL: &[char] = &[
    '"', '\'', '\\', '$', '`', ';', '&', '|', '<', '>', '(', ')', '*', '?', '!', '#',
];

fn quote_arg(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || SHELL_SPECIAL.contains(&c));
    if !needs_quotes {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
