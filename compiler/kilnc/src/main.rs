//! Kiln CLI
//!
//! Builds executables, shared libraries and system images from Kiln programs.

use kilnc::{init_tracing, parse_args, CliAction, USAGE};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let action = match parse_args(&args) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Run 'kiln --help' for usage.");
            std::process::exit(1);
        }
    };

    match action {
        CliAction::Help => print!("{USAGE}"),
        CliAction::Build(request) => {
            init_tracing(request.verbose);
            if let Err(e) = kilnc::run(*request) {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
    }
}
