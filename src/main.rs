use std::process::ExitCode;

use pidone::config::Config;
use pidone::signals::SignalIntake;
use pidone::supervisor::Supervisor;
use pidone::{launch, log_error};

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().collect();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            log_error!("{err}");
            return ExitCode::from(1);
        }
    };

    let commands = match launch::resolve(&argv, &config.command_dir) {
        Ok(commands) => commands,
        Err(err) => {
            log_error!("{err}");
            return ExitCode::from(1);
        }
    };

    // Signal handling must be installed before any child exists: PID 1's
    // default disposition for SIGTERM is to ignore it, and we cannot let a
    // shutdown request slip by unseen while we're still forking children.
    let intake = match SignalIntake::install() {
        Ok(intake) => intake,
        Err(err) => {
            log_error!("Failed to install signal handlers: {err}");
            return ExitCode::from(1);
        }
    };

    let mut supervisor = Supervisor::new(intake, config);
    if let Err(err) = supervisor.launch(&commands) {
        log_error!("{err}");
        return ExitCode::from(1);
    }

    let code = supervisor.run();
    ExitCode::from(code as u8)
}
