// Git plumbing: command model, runners, output parsers and remote detection
mod command;
pub mod remote;
pub mod resolver;
mod runner;
pub mod status;

use std::path::Path;

pub use command::GitCommand;
pub use remote::{parse_remote_url, RemoteDescriptor};
pub use resolver::{RemoteResolver, ResolveWarning, ResolvedRemote};
pub use runner::{CommandOutput, CommandRunner, ProcessCommandRunner};
pub use status::{parse_status, FileChange, FileStatus};

use crate::error::{AppError, AppResult};

/// Branch currently checked out in the working tree
pub async fn current_branch(runner: &dyn CommandRunner, local_path: &Path) -> AppResult<String> {
    let command = GitCommand::show_current_branch();
    let branch = runner
        .execute(&command, local_path, None)
        .await
        .into_result(&command)?;

    if branch.is_empty() {
        return Err(AppError::command(
            command.to_command_line(),
            "detached HEAD: no branch is checked out",
        ));
    }
    Ok(branch)
}

/// Uncommitted changes in the working tree
pub async fn working_tree_changes(
    runner: &dyn CommandRunner,
    local_path: &Path,
) -> AppResult<Vec<FileChange>> {
    let command = GitCommand::status_short();
    let output = runner.execute(&command, local_path, None).await;
    if !output.success {
        return Err(AppError::command(
            command.to_command_line(),
            output.failure_message(),
        ));
    }
    // stdout is parsed untrimmed: the leading column of the first line is significant
    Ok(parse_status(&output.stdout))
}
