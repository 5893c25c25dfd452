use std::process::ExitCode;

use tracing::error;

mod app;

fn main() -> ExitCode {
    let app = match app::bootstrap::build_app() {
        Ok(app) => app,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };
    app::loop_runner::run(app)
}
