//! FormPulse dashboard CLI
//!
//! # Usage
//!
//! ```bash
//! # Check a form definition
//! formpulse check-form --form feedback.yaml
//!
//! # Check answers before submitting them
//! formpulse check-answers --form feedback.yaml --answers answers.json
//!
//! # Aggregate recorded push-channel messages
//! formpulse replay --form feedback.yaml --events events.jsonl --snapshot summary.json
//!
//! # Follow a published form
//! formpulse watch 65f0c0ffee --api-base http://localhost:8080
//!
//! # Export its responses, one row per answer
//! formpulse export 65f0c0ffee --output responses.csv
//!
//! # Serve its live snapshot over HTTP
//! formpulse serve 65f0c0ffee --listen 0.0.0.0:9400
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Validation failed, or a submission was blocked
//! - 2: Completed with warnings
//! - 3: Invalid input or arguments
//! - 4: File not found or inaccessible
//! - 5: Malformed form definition
//! - 6: Forms API or push channel failure
//! - 10: Internal error

use clap::Parser;
use live_dashboard::telemetry::{init_tracing, level_for_verbosity};
use live_dashboard::{run_cli, FormPulseCli};

#[tokio::main]
async fn main() {
    let cli = FormPulseCli::parse();
    init_tracing(level_for_verbosity(cli.verbose, cli.quiet));

    let exit_code = run_cli(cli).await;
    std::process::exit(exit_code.into());
}
