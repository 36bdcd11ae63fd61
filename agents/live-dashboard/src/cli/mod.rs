//! CLI module for the FormPulse dashboard
//!
//! Offline checks of forms and answers, replay of recorded push-channel
//! messages, response export, and the online `watch`, `submit` and `serve`
//! commands. `--quiet` suppresses results; the exit code still reports them.

pub mod commands;
pub mod output;

pub use commands::{FormPulseCli, FormPulseCommands};
pub use output::{ExportFormat, ExportOutput, FormOutput, OutputFormat, ReportOutput, SnapshotOutput};

use crate::error::{DashboardError, Result};

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Answers failed validation, or a submission was blocked
    ValidationError = 1,
    /// Completed with warnings (malformed messages, degraded session)
    ValidationWarning = 2,
    /// Invalid input or arguments
    InvalidInput = 3,
    /// File not found or inaccessible
    FileError = 4,
    /// Malformed form definition
    SchemaError = 5,
    /// Forms API or push channel unreachable or failing
    ApiError = 6,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Determine exit code from validation result
    pub fn from_validation_result(has_errors: bool, has_warnings: bool) -> Self {
        if has_errors {
            ExitCode::ValidationError
        } else if has_warnings {
            ExitCode::ValidationWarning
        } else {
            ExitCode::Success
        }
    }

    /// Exit code for a command that failed with `err`
    pub fn from_error(err: &DashboardError) -> Self {
        match err {
            DashboardError::Validation(_) => ExitCode::ValidationError,
            DashboardError::Schema(_) => ExitCode::SchemaError,
            DashboardError::FileError(_) => ExitCode::FileError,
            DashboardError::HttpError(_) | DashboardError::ApiStatus { .. } | DashboardError::ChannelError(_) => {
                ExitCode::ApiError
            }
            err if err.is_user_error() => ExitCode::InvalidInput,
            _ => ExitCode::InternalError,
        }
    }
}

/// Run the CLI with the given arguments and return the exit code
pub async fn run(cli: FormPulseCli) -> Result<ExitCode> {
    let quiet = cli.quiet;
    match cli.command {
        FormPulseCommands::CheckForm { form, format } => {
            commands::execute_check_form(form, output::visible(format, quiet))
        }
        FormPulseCommands::CheckAnswers {
            form,
            answers,
            format,
            strict,
        } => commands::execute_check_answers(form, answers, output::visible(format, quiet), strict),
        FormPulseCommands::Replay {
            form,
            events,
            snapshot,
            form_id,
            format,
        } => commands::execute_replay(form, events, snapshot, form_id, output::visible(format, quiet)),
        FormPulseCommands::Export {
            ref form_id,
            ref events,
            ref output,
            format,
        } => {
            let config = match events {
                Some(_) => None,
                None => Some(commands::load_config(&cli)?),
            };
            commands::execute_export(config, form_id.clone(), events.clone(), output.clone(), format, quiet).await
        }
        ref online => {
            let config = commands::load_config(&cli)?;
            match online {
                FormPulseCommands::Watch { form_id, format } => {
                    commands::execute_watch(config, form_id.clone(), output::visible(*format, quiet)).await
                }
                FormPulseCommands::Submit { form_id, answers } => {
                    commands::execute_submit(config, form_id.clone(), answers.clone(), quiet).await
                }
                FormPulseCommands::Serve { form_id, listen } => {
                    commands::execute_serve(config, form_id.clone(), listen.clone()).await
                }
                _ => Err(DashboardError::InternalError("Unhandled command".to_string())),
            }
        }
    }
}
